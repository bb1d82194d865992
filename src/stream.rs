//! Encoded frame stream.
//!
//! The processing loop publishes one JPEG per iteration into a `FrameFeed`.
//! HTTP clients hold a `FrameSubscriber` and wait for frames newer than the
//! last one they sent; slow clients skip frames instead of queueing them.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;

/// Multipart boundary used by the video feed.
pub const BOUNDARY: &str = "frame";

pub fn encode_jpeg(frame: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality)
        .encode_image(frame)
        .context("jpeg encode failed")?;
    Ok(buf)
}

/// One `multipart/x-mixed-replace` part carrying `jpeg`.
pub fn multipart_part(jpeg: &[u8]) -> Vec<u8> {
    let header = format!("--{}\r\nContent-Type: image/jpeg\r\n\r\n", BOUNDARY);
    let mut part = Vec::with_capacity(header.len() + jpeg.len() + 2);
    part.extend_from_slice(header.as_bytes());
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    part
}

#[derive(Default)]
struct FeedSlot {
    seq: u64,
    jpeg: Option<Arc<Vec<u8>>>,
    closed: bool,
}

/// Latest-frame slot shared between the loop and stream clients.
#[derive(Clone, Default)]
pub struct FrameFeed {
    shared: Arc<(Mutex<FeedSlot>, Condvar)>,
}

/// What a subscriber got from one wait.
#[derive(Debug)]
pub enum FeedEvent {
    Frame(Arc<Vec<u8>>),
    Timeout,
    Closed,
}

impl FrameFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, jpeg: Vec<u8>) {
        let (lock, cvar) = &*self.shared;
        if let Ok(mut slot) = lock.lock() {
            slot.seq += 1;
            slot.jpeg = Some(Arc::new(jpeg));
        }
        cvar.notify_all();
    }

    /// Wake all subscribers and end their streams.
    pub fn close(&self) {
        let (lock, cvar) = &*self.shared;
        if let Ok(mut slot) = lock.lock() {
            slot.closed = true;
        }
        cvar.notify_all();
    }

    /// Frames published so far.
    pub fn published(&self) -> u64 {
        self.shared.0.lock().map(|slot| slot.seq).unwrap_or(0)
    }

    /// Subscribe; the current frame, if any, is delivered first.
    pub fn subscribe(&self) -> FrameSubscriber {
        FrameSubscriber {
            shared: Arc::clone(&self.shared),
            seen: 0,
        }
    }
}

pub struct FrameSubscriber {
    shared: Arc<(Mutex<FeedSlot>, Condvar)>,
    seen: u64,
}

impl FrameSubscriber {
    /// Wait up to `timeout` for a frame newer than the last one returned.
    pub fn next_timeout(&mut self, timeout: Duration) -> FeedEvent {
        let (lock, cvar) = &*self.shared;
        let deadline = Instant::now() + timeout;
        let Ok(mut slot) = lock.lock() else {
            return FeedEvent::Closed;
        };
        loop {
            if slot.closed {
                return FeedEvent::Closed;
            }
            if slot.seq > self.seen {
                if let Some(jpeg) = slot.jpeg.clone() {
                    self.seen = slot.seq;
                    return FeedEvent::Frame(jpeg);
                }
            }
            let now = Instant::now();
            if now >= deadline {
                return FeedEvent::Timeout;
            }
            slot = match cvar.wait_timeout(slot, deadline - now) {
                Ok((guard, _)) => guard,
                Err(_) => return FeedEvent::Closed,
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use std::thread;

    #[test]
    fn encodes_a_decodable_jpeg() {
        let frame = RgbImage::from_pixel(32, 24, Rgb([200, 10, 10]));
        let jpeg = encode_jpeg(&frame, 80).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 24));
    }

    #[test]
    fn multipart_part_is_framed() {
        let part = multipart_part(b"JPEG");
        assert_eq!(
            part,
            b"--frame\r\nContent-Type: image/jpeg\r\n\r\nJPEG\r\n".to_vec()
        );
    }

    #[test]
    fn subscriber_skips_to_latest_frame() {
        let feed = FrameFeed::new();
        let mut sub = feed.subscribe();
        feed.publish(vec![1]);
        feed.publish(vec![2]);
        match sub.next_timeout(Duration::from_millis(10)) {
            FeedEvent::Frame(jpeg) => assert_eq!(*jpeg, vec![2]),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            sub.next_timeout(Duration::from_millis(10)),
            FeedEvent::Timeout
        ));
    }

    #[test]
    fn close_wakes_waiting_subscriber() {
        let feed = FrameFeed::new();
        let mut sub = feed.subscribe();
        let closer = feed.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            closer.close();
        });
        assert!(matches!(
            sub.next_timeout(Duration::from_secs(5)),
            FeedEvent::Closed
        ));
        handle.join().unwrap();
        assert!(matches!(
            feed.subscribe().next_timeout(Duration::ZERO),
            FeedEvent::Closed
        ));
    }
}
