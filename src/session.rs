//! Per-source stabilization state.
//!
//! A `Session` owns everything that persists between scan cycles: both vote
//! buffers, the presence counter, the deduplication state, the event log and
//! the overlay carried onto non-scan frames. It is owned by exactly one
//! processing loop and never shared.

use chrono::NaiveDateTime;

use crate::config::StabilizerSettings;
use crate::events::{LogDeduplicator, PlateEvent, PlateLog};
use crate::lines::split_lines;
use crate::overlay::OverlayItem;
use crate::presence::PresenceTracker;
use crate::scan::{PlateScan, ScanError};
use crate::vote::VoteBuffer;

/// Outcome of one scan cycle.
#[derive(Clone, Debug)]
pub enum CycleReport {
    Completed(CycleSummary),
    /// Plate detection failed; session state is unchanged.
    Skipped { error: ScanError },
}

impl CycleReport {
    pub fn events(&self) -> &[PlateEvent] {
        match self {
            CycleReport::Completed(summary) => &summary.events,
            CycleReport::Skipped { .. } => &[],
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CycleSummary {
    /// Plate boxes returned by the plate detector.
    pub plates: usize,
    /// Plates whose character stage failed.
    pub failed_plates: usize,
    /// Events accepted into the log this cycle, in acceptance order.
    pub events: Vec<PlateEvent>,
    pub cleared_history: bool,
    pub hid_boxes: bool,
}

pub struct Session {
    settings: StabilizerSettings,
    top: VoteBuffer,
    bottom: VoteBuffer,
    presence: PresenceTracker,
    dedup: LogDeduplicator,
    log: PlateLog,
    overlay: Vec<OverlayItem>,
}

impl Session {
    pub fn new(settings: &StabilizerSettings) -> Self {
        Self {
            settings: settings.clone(),
            top: VoteBuffer::new(settings.history_capacity, settings.vote_threshold),
            bottom: VoteBuffer::new(settings.history_capacity, settings.vote_threshold),
            presence: PresenceTracker::new(settings.clear_after_cycles, settings.hide_after_cycles),
            dedup: LogDeduplicator::new(settings.relog_after_secs, settings.min_plate_chars),
            log: PlateLog::new(settings.log_capacity),
            overlay: Vec::new(),
        }
    }

    /// Fold one scan cycle's detections into the session.
    pub fn apply_cycle(
        &mut self,
        scan: Result<Vec<PlateScan>, ScanError>,
        now: NaiveDateTime,
    ) -> CycleReport {
        let plates = match scan {
            Ok(plates) => plates,
            Err(error) => return CycleReport::Skipped { error },
        };

        let actions = self.presence.observe(!plates.is_empty());
        if actions.clear_history {
            self.top.clear();
            self.bottom.clear();
            self.dedup.forget_text();
        }

        let mut summary = CycleSummary {
            plates: plates.len(),
            cleared_history: actions.clear_history,
            hid_boxes: actions.hide_boxes,
            ..CycleSummary::default()
        };
        let mut overlay = Vec::new();

        for plate in plates {
            let characters = match plate.characters {
                Ok(characters) => characters,
                Err(err) => {
                    log::warn!("{}", err);
                    summary.failed_plates += 1;
                    continue;
                }
            };

            if let Some(lines) = split_lines(&characters, self.settings.line_gap_px) {
                self.top.append(&lines.top);
                self.bottom.append(&lines.bottom);
            }

            let best_top = self.top.stabilize();
            let best_bottom = self.bottom.stabilize();
            let full_text = format!("{} {}", best_top, best_bottom).trim().to_string();
            if full_text.is_empty() || best_top.chars().count() < self.settings.min_top_chars {
                continue;
            }

            if let Some(event) = self.dedup.offer(&full_text, now, &mut self.log) {
                log::info!("plate {} at {}", event.text, event.time);
                summary.events.push(event);
            }
            overlay.push(OverlayItem {
                bbox: plate.bbox,
                text: full_text,
            });
        }

        if summary.plates > 0 {
            self.overlay = overlay;
        } else if actions.hide_boxes {
            self.overlay.clear();
        }

        CycleReport::Completed(summary)
    }

    /// Forget all per-source state. The event log is kept.
    pub fn reset(&mut self) {
        self.top.clear();
        self.bottom.clear();
        self.presence.reset();
        self.dedup.reset();
        self.overlay.clear();
    }

    pub fn settings(&self) -> &StabilizerSettings {
        &self.settings
    }

    pub fn log(&self) -> &PlateLog {
        &self.log
    }

    pub fn overlay(&self) -> &[OverlayItem] {
        &self.overlay
    }

    pub fn absent_cycles(&self) -> u32 {
        self.presence.absent_cycles()
    }

    pub fn top_history(&self) -> &VoteBuffer {
        &self.top
    }

    pub fn bottom_history(&self) -> &VoteBuffer {
        &self.bottom
    }

    pub fn last_logged_text(&self) -> &str {
        self.dedup.last_text()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::PixelBox;
    use crate::lines::CharacterDetection;
    use chrono::{Duration, NaiveDate};

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(17, 0, 0)
            .unwrap()
    }

    fn plate(top: &[&str], province: &str) -> PlateScan {
        let mut chars: Vec<CharacterDetection> = top
            .iter()
            .enumerate()
            .map(|(i, label)| CharacterDetection::new(*label, 10.0 + 20.0 * i as f32, 20.0))
            .collect();
        chars.push(CharacterDetection::new(province, 40.0, 70.0));
        PlateScan::read(PixelBox::new(100, 200, 260, 260), chars)
    }

    fn plate_1kk_1234() -> PlateScan {
        plate(&["1", "A01", "A01", "1", "2", "3", "4"], "BKK")
    }

    fn plate_2kh_9876() -> PlateScan {
        plate(&["2", "A02", "A02", "9", "8", "7", "6"], "CMI")
    }

    fn seen_plate(
        session: &mut Session,
        make: fn() -> PlateScan,
        cycles: usize,
        at: NaiveDateTime,
    ) -> Vec<PlateEvent> {
        (0..cycles)
            .flat_map(|_| session.apply_cycle(Ok(vec![make()]), at).events().to_vec())
            .collect()
    }

    fn seen(session: &mut Session, cycles: usize, at: NaiveDateTime) -> Vec<PlateEvent> {
        seen_plate(session, plate_1kk_1234, cycles, at)
    }

    fn absent(session: &mut Session, cycles: usize, at: NaiveDateTime) -> Vec<CycleReport> {
        (0..cycles)
            .map(|_| session.apply_cycle(Ok(Vec::new()), at))
            .collect()
    }

    #[test]
    fn reading_is_logged_once_votes_agree() {
        let mut session = Session::new(&StabilizerSettings::default());
        assert!(seen(&mut session, 6, t0()).is_empty());
        assert!(session.overlay().is_empty());

        let events = seen(&mut session, 1, t0());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].text, "1กก1234 กรุงเทพมหานคร");
        assert_eq!(session.overlay().len(), 1);
        assert_eq!(session.overlay()[0].bbox, PixelBox::new(100, 200, 260, 260));
    }

    #[test]
    fn steady_plate_is_not_relogged_within_window() {
        let mut session = Session::new(&StabilizerSettings::default());
        seen(&mut session, 7, t0());
        assert!(seen(&mut session, 5, t0() + Duration::seconds(5)).is_empty());
        assert_eq!(seen(&mut session, 1, t0() + Duration::seconds(11)).len(), 1);
        assert_eq!(session.log().len(), 2);
    }

    #[test]
    fn ten_absent_cycles_keep_history_eleven_clear_it() {
        let mut session = Session::new(&StabilizerSettings::default());
        seen(&mut session, 7, t0());

        let reports = absent(&mut session, 10, t0());
        assert!(reports.iter().all(|r| match r {
            CycleReport::Completed(s) => !s.cleared_history,
            CycleReport::Skipped { .. } => false,
        }));
        assert_eq!(session.top_history().len(), 7);

        let reports = absent(&mut session, 1, t0());
        assert!(matches!(&reports[0], CycleReport::Completed(s) if s.cleared_history));
        assert!(session.top_history().is_empty());
        assert!(session.bottom_history().is_empty());
        assert_eq!(session.last_logged_text(), "");
    }

    #[test]
    fn overlay_survives_short_gaps_and_hides_after_five() {
        let mut session = Session::new(&StabilizerSettings::default());
        seen(&mut session, 7, t0());
        absent(&mut session, 5, t0());
        assert_eq!(session.overlay().len(), 1);
        absent(&mut session, 1, t0());
        assert!(session.overlay().is_empty());
    }

    #[test]
    fn returning_plate_after_clear_waits_for_new_votes() {
        let mut session = Session::new(&StabilizerSettings::default());
        seen(&mut session, 7, t0());
        absent(&mut session, 11, t0());

        let later = t0() + Duration::seconds(3);
        assert!(seen(&mut session, 6, later).is_empty());
        let events = seen(&mut session, 1, later);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].text, "1กก1234 กรุงเทพมหานคร");
        assert_eq!(session.log().len(), 2);
    }

    #[test]
    fn next_plate_after_clear_is_logged_inside_window() {
        let mut session = Session::new(&StabilizerSettings::default());
        seen(&mut session, 7, t0());
        absent(&mut session, 11, t0());

        let events = seen_plate(&mut session, plate_2kh_9876, 7, t0() + Duration::seconds(4));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].text, "2ขข9876 เชียงใหม่");
        assert_eq!(events[0].time, "17:00:04");
        assert_eq!(session.last_logged_text(), "2ขข9876 เชียงใหม่");
    }

    #[test]
    fn skipped_cycle_leaves_state_alone() {
        let mut session = Session::new(&StabilizerSettings::default());
        seen(&mut session, 7, t0());
        absent(&mut session, 3, t0());
        let report = session.apply_cycle(Err(ScanError::PlateDetection("boom".into())), t0());
        assert!(matches!(report, CycleReport::Skipped { .. }));
        assert_eq!(session.absent_cycles(), 3);
        assert_eq!(session.overlay().len(), 1);
    }

    #[test]
    fn failed_character_stage_skips_only_that_plate() {
        let mut session = Session::new(&StabilizerSettings::default());
        let failed = PlateScan {
            bbox: PixelBox::new(0, 0, 10, 10),
            characters: Err(ScanError::CharacterDetection {
                plate_index: 0,
                reason: "oom".into(),
            }),
        };
        let report = session.apply_cycle(Ok(vec![failed, plate_1kk_1234()]), t0());
        match report {
            CycleReport::Completed(summary) => {
                assert_eq!(summary.plates, 2);
                assert_eq!(summary.failed_plates, 1);
            }
            CycleReport::Skipped { .. } => panic!("cycle should complete"),
        }
        assert_eq!(session.top_history().len(), 1);
        assert_eq!(session.absent_cycles(), 0);
    }

    #[test]
    fn short_top_row_is_neither_shown_nor_logged() {
        let mut session = Session::new(&StabilizerSettings::default());
        let plate = PlateScan::read(
            PixelBox::new(0, 0, 50, 20),
            vec![CharacterDetection::new("7", 0.0, 5.0)],
        );
        for _ in 0..8 {
            let report = session.apply_cycle(Ok(vec![plate.clone()]), t0());
            assert!(report.events().is_empty());
        }
        assert!(session.overlay().is_empty());
    }

    #[test]
    fn reset_keeps_the_log() {
        let mut session = Session::new(&StabilizerSettings::default());
        seen(&mut session, 7, t0());
        session.reset();
        assert_eq!(session.log().len(), 1);
        assert!(session.top_history().is_empty());
        assert!(session.overlay().is_empty());
        assert_eq!(seen(&mut session, 7, t0() + Duration::seconds(1)).len(), 1);
    }
}
