use crate::pipeline::{LoadError, PipelineHandle};
use crate::stream::{multipart_part, FeedEvent, BOUNDARY};
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use url::form_urlencoded;

const MAX_HEADER_BYTES: usize = 8192;
const MAX_JSON_BODY_BYTES: usize = 64 * 1024;
const DEFAULT_MAX_UPLOAD_BYTES: u64 = 500 * 1024 * 1024;
const FEED_POLL: Duration = Duration::from_millis(500);

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:5001".to_string(),
            upload_dir: PathBuf::from("uploads"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("api server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct ApiServer {
    cfg: ApiConfig,
    pipeline: PipelineHandle,
}

impl ApiServer {
    pub fn new(cfg: ApiConfig, pipeline: PipelineHandle) -> Self {
        Self { cfg, pipeline }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self.cfg.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;
        std::fs::create_dir_all(&self.cfg.upload_dir).with_context(|| {
            format!("create upload dir {}", self.cfg.upload_dir.display())
        })?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let cfg = Arc::new(self.cfg);
        let pipeline = self.pipeline;
        let join = std::thread::spawn(move || {
            if let Err(err) = run_api(listener, cfg, pipeline, shutdown_thread) {
                log::error!("control api stopped: {}", err);
            }
        });

        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_api(
    listener: TcpListener,
    cfg: Arc<ApiConfig>,
    pipeline: PipelineHandle,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => {
                let cfg = cfg.clone();
                let pipeline = pipeline.clone();
                let shutdown = shutdown.clone();
                std::thread::spawn(move || {
                    if let Err(err) = handle_connection(stream, &cfg, &pipeline, &shutdown) {
                        log::warn!("control api request failed: {:#}", err);
                    }
                });
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

#[derive(Deserialize)]
struct SourceRequest {
    #[serde(default)]
    path: String,
}

fn handle_connection(
    mut stream: TcpStream,
    cfg: &ApiConfig,
    pipeline: &PipelineHandle,
    shutdown: &AtomicBool,
) -> Result<()> {
    stream.set_nonblocking(false)?;
    let mut request = read_request(&mut stream)?;

    if request.method == "OPTIONS" {
        return write_response(&mut stream, 204, "text/plain", b"");
    }

    let allowed = match request.path.as_str() {
        "/health" | "/logs" | "/get_logs" | "/video_feed" => "GET",
        "/playback/toggle" | "/toggle_playback" | "/source" | "/upload" => "POST",
        _ => return write_json_response(&mut stream, 404, r#"{"error":"not_found"}"#),
    };
    if request.method != allowed {
        return write_json_response(&mut stream, 405, r#"{"error":"method_not_allowed"}"#);
    }

    match request.path.as_str() {
        "/health" => write_json_response(&mut stream, 200, r#"{"status":"ok"}"#),
        "/logs" | "/get_logs" => {
            let payload = serde_json::to_vec(&pipeline.current_log())?;
            write_response(&mut stream, 200, "application/json", &payload)
        }
        "/playback/toggle" | "/toggle_playback" => {
            let is_paused = pipeline.toggle_pause();
            let payload = serde_json::to_vec(&serde_json::json!({ "is_paused": is_paused }))?;
            write_response(&mut stream, 200, "application/json", &payload)
        }
        "/source" => {
            let body = read_body(&mut stream, &mut request, MAX_JSON_BODY_BYTES)?;
            let path = serde_json::from_slice::<SourceRequest>(&body)
                .map(|req| req.path)
                .unwrap_or_default();
            match pipeline.load_source(&path) {
                Ok(()) => write_json_response(&mut stream, 200, r#"{"message":"source loaded"}"#),
                Err(err) => write_load_error(&mut stream, err),
            }
        }
        "/upload" => handle_upload(&mut stream, &request, cfg, pipeline),
        "/video_feed" => stream_video(&mut stream, pipeline, shutdown),
        _ => write_json_response(&mut stream, 404, r#"{"error":"not_found"}"#),
    }
}

fn handle_upload(
    stream: &mut TcpStream,
    request: &HttpRequest,
    cfg: &ApiConfig,
    pipeline: &PipelineHandle,
) -> Result<()> {
    let filename = request.query.get("filename").cloned().unwrap_or_default();
    let length = request.content_length();
    if filename.trim().is_empty() || length == 0 {
        return write_json_response(stream, 400, r#"{"error":"no_file"}"#);
    }
    if length > cfg.max_upload_bytes {
        return write_json_response(stream, 413, r#"{"error":"too_large"}"#);
    }

    let target = upload_target(&cfg.upload_dir, &filename);
    let prefix = &request.body_prefix[..request.body_prefix.len().min(length as usize)];
    save_upload(&mut *stream, prefix, length, &target)?;
    log::info!("upload saved to {} ({} bytes)", target.display(), length);

    match pipeline.load_source(&target.to_string_lossy()) {
        Ok(()) => write_json_response(stream, 200, r#"{"message":"video uploaded"}"#),
        Err(err) => write_load_error(stream, err),
    }
}

/// Write `length` body bytes to `target` through a `.part` file.
///
/// The partial file is removed on every failure.
fn save_upload<R: Read>(body: &mut R, prefix: &[u8], length: u64, target: &Path) -> Result<()> {
    let partial = target.with_extension("part");
    let written = write_partial(body, prefix, length, &partial).and_then(|()| {
        // A source still decoding the previous upload keeps its own inode.
        std::fs::rename(&partial, target)
            .with_context(|| format!("move upload to {}", target.display()))
    });
    if written.is_err() {
        std::fs::remove_file(&partial).ok();
    }
    written
}

fn write_partial<R: Read>(body: &mut R, prefix: &[u8], length: u64, partial: &Path) -> Result<()> {
    let mut file = std::fs::File::create(partial)
        .with_context(|| format!("create {}", partial.display()))?;
    file.write_all(prefix)
        .with_context(|| format!("write {}", partial.display()))?;
    let remaining = length.saturating_sub(prefix.len() as u64);
    let copied = std::io::copy(&mut body.take(remaining), &mut file)
        .with_context(|| format!("write {}", partial.display()))?;
    if copied < remaining {
        return Err(anyhow!("upload truncated after {} bytes", copied));
    }
    Ok(())
}

/// `upload.<ext>` inside `dir`, keeping only an alphanumeric extension.
fn upload_target(dir: &Path, filename: &str) -> PathBuf {
    let ext: String = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    if ext.is_empty() {
        dir.join("upload")
    } else {
        dir.join(format!("upload.{}", ext.to_ascii_lowercase()))
    }
}

fn stream_video(
    stream: &mut TcpStream,
    pipeline: &PipelineHandle,
    shutdown: &AtomicBool,
) -> Result<()> {
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: multipart/x-mixed-replace; boundary={}\r\nCache-Control: no-store\r\nAccess-Control-Allow-Origin: *\r\nConnection: close\r\n\r\n",
        BOUNDARY
    );
    stream.write_all(header.as_bytes())?;

    let mut subscriber = pipeline.subscribe();
    loop {
        match subscriber.next_timeout(FEED_POLL) {
            FeedEvent::Frame(jpeg) => {
                if stream.write_all(&multipart_part(&jpeg)).is_err() {
                    log::debug!("video feed client disconnected");
                    break;
                }
            }
            FeedEvent::Timeout => {
                if shutdown.load(Ordering::SeqCst) || pipeline.is_shutdown() {
                    break;
                }
            }
            FeedEvent::Closed => break,
        }
    }
    Ok(())
}

fn write_load_error(stream: &mut TcpStream, err: LoadError) -> Result<()> {
    log::warn!("source rejected: {}", err);
    match err {
        LoadError::NoFile => write_json_response(stream, 400, r#"{"error":"no_file"}"#),
        LoadError::NotFound(_) => write_json_response(stream, 400, r#"{"error":"file_not_found"}"#),
        LoadError::Open(_) => write_json_response(stream, 400, r#"{"error":"unreadable_source"}"#),
        LoadError::Stopped => write_json_response(stream, 503, r#"{"error":"stopped"}"#),
    }
}

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;
    let mut buf = [0u8; 1024];
    let mut data = Vec::new();
    let header_end = loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("connection closed before request headers"));
        }
        data.extend_from_slice(&buf[..n]);
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        if data.len() > MAX_HEADER_BYTES {
            return Err(anyhow!("request too large"));
        }
    };
    let body_prefix = data.split_off(header_end + 4);
    let text = String::from_utf8_lossy(&data);
    let mut lines = text.split("\r\n");
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_lowercase(), v.trim().to_string());
        }
    }
    let (path, query) = match raw_path.split_once('?') {
        Some((path, query)) => (path, parse_query(query)),
        None => (raw_path, HashMap::new()),
    };
    Ok(HttpRequest {
        method: method.to_string(),
        path: path.to_string(),
        query,
        headers,
        body_prefix,
    })
}

/// Read a whole `Content-Length` body of at most `limit` bytes.
fn read_body(stream: &mut TcpStream, request: &mut HttpRequest, limit: usize) -> Result<Vec<u8>> {
    let length = request.content_length() as usize;
    if length > limit {
        return Err(anyhow!("request body too large ({} bytes)", length));
    }
    let mut body = std::mem::take(&mut request.body_prefix);
    body.truncate(length);
    if body.len() < length {
        let mut rest = vec![0u8; length - body.len()];
        stream.read_exact(&mut rest).context("read request body")?;
        body.extend_from_slice(&rest);
    }
    Ok(body)
}

fn parse_query(query: &str) -> HashMap<String, String> {
    form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect()
}

fn write_json_response(stream: &mut TcpStream, status: u16, body: &str) -> Result<()> {
    write_response(stream, status, "application/json", body.as_bytes())
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        204 => "HTTP/1.1 204 No Content",
        400 => "HTTP/1.1 400 Bad Request",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        413 => "HTTP/1.1 413 Payload Too Large",
        503 => "HTTP/1.1 503 Service Unavailable",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\nAccess-Control-Allow-Origin: *\r\nAccess-Control-Allow-Methods: GET, POST, OPTIONS\r\nAccess-Control-Allow-Headers: Content-Type\r\nConnection: close\r\n\r\n",
        status_line = status_line,
        content_type = content_type,
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    Ok(())
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    query: HashMap<String, String>,
    headers: HashMap<String, String>,
    /// Body bytes that arrived together with the headers.
    body_prefix: Vec<u8>,
}

impl HttpRequest {
    fn content_length(&self) -> u64 {
        self.headers
            .get("content-length")
            .and_then(|value| value.parse().ok())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_target_keeps_clean_extension() {
        let dir = Path::new("uploads");
        assert_eq!(upload_target(dir, "clip.MP4"), dir.join("upload.mp4"));
        assert_eq!(upload_target(dir, "../../evil.m/p4"), dir.join("upload"));
        assert_eq!(upload_target(dir, "noext"), dir.join("upload"));
    }

    #[test]
    fn query_values_are_decoded() {
        let query = parse_query("filename=my%20clip.mp4&x=a+b&bad=%zz");
        assert_eq!(query["filename"], "my clip.mp4");
        assert_eq!(query["x"], "a b");
        assert_eq!(query["bad"], "%zz");
    }

    struct BrokenBody;

    impl Read for BrokenBody {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset"))
        }
    }

    #[test]
    fn failed_upload_leaves_no_partial_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let target = dir.path().join("upload.mp4");

        assert!(save_upload(&mut BrokenBody, b"head", 64, &target).is_err());
        assert!(!dir.path().join("upload.part").exists());
        assert!(!target.exists());

        let mut short: &[u8] = b"tail";
        let err = save_upload(&mut short, b"head", 64, &target).unwrap_err();
        assert!(err.to_string().contains("truncated"));
        assert!(!dir.path().join("upload.part").exists());
    }

    #[test]
    fn complete_upload_is_renamed_into_place() {
        let dir = tempfile::TempDir::new().unwrap();
        let target = dir.path().join("upload.mp4");
        let mut rest: &[u8] = b" body";
        save_upload(&mut rest, b"head", 9, &target).unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"head body");
        assert!(!dir.path().join("upload.part").exists());
    }
}
