//! Line splitting of character detections.
//!
//! Thai plates carry two text rows: the registration (e.g. `1กก 1234`) on top
//! and the province underneath. The character model returns an unordered bag
//! of glyph boxes per plate crop, so rows are recovered from the vertical
//! spread of the box centres.

use std::cmp::Ordering;

use crate::labels::decode_label;

/// Vertical spread (pixels) below which all characters are one row.
pub const DEFAULT_LINE_GAP_PX: f32 = 30.0;

/// One character box within a single plate crop.
#[derive(Clone, Debug, PartialEq)]
pub struct CharacterDetection {
    /// Raw class label as emitted by the character model.
    pub label: String,
    /// Left edge of the box, in crop pixels.
    pub x_left: f32,
    /// Vertical centre of the box, in crop pixels.
    pub y_center: f32,
}

impl CharacterDetection {
    pub fn new(label: impl Into<String>, x_left: f32, y_center: f32) -> Self {
        Self {
            label: label.into(),
            x_left,
            y_center,
        }
    }
}

/// Decoded text of the two plate rows. Either row may be empty.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LineReadings {
    pub top: String,
    pub bottom: String,
}

/// Split detections into top/bottom rows and decode each left-to-right.
///
/// Returns `None` when there are no detections at all.
pub fn split_lines(detections: &[CharacterDetection], line_gap_px: f32) -> Option<LineReadings> {
    let first = detections.first()?;
    let (min_y, max_y) = detections
        .iter()
        .fold((first.y_center, first.y_center), |(lo, hi), d| {
            (lo.min(d.y_center), hi.max(d.y_center))
        });

    let mut top: Vec<&CharacterDetection> = Vec::new();
    let mut bottom: Vec<&CharacterDetection> = Vec::new();
    if max_y - min_y < line_gap_px {
        top.extend(detections);
    } else {
        let midpoint = min_y + (max_y - min_y) * 0.5;
        for d in detections {
            if d.y_center < midpoint {
                top.push(d);
            } else {
                bottom.push(d);
            }
        }
    }

    Some(LineReadings {
        top: read_row(top),
        bottom: read_row(bottom),
    })
}

fn read_row(mut row: Vec<&CharacterDetection>) -> String {
    row.sort_by(|a, b| left_to_right(a, b));
    row.iter().map(|d| decode_label(&d.label)).collect()
}

// Column order, with row position as the tie-break so equal x values are
// ordered the same way on every run.
fn left_to_right(a: &CharacterDetection, b: &CharacterDetection) -> Ordering {
    a.x_left
        .total_cmp(&b.x_left)
        .then_with(|| a.y_center.total_cmp(&b.y_center))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(label: &str, x: f32, y: f32) -> CharacterDetection {
        CharacterDetection::new(label, x, y)
    }

    #[test]
    fn empty_input_has_no_text() {
        assert_eq!(split_lines(&[], DEFAULT_LINE_GAP_PX), None);
    }

    #[test]
    fn two_clusters_become_two_rows() {
        let dets = vec![
            det("BKK", 40.0, 80.0),
            det("2", 30.0, 12.0),
            det("1", 10.0, 10.0),
            det("A01", 20.0, 11.0),
            det("9", 60.0, 82.0),
        ];
        let lines = split_lines(&dets, DEFAULT_LINE_GAP_PX).unwrap();
        assert_eq!(lines.top, "1ก2");
        assert_eq!(lines.bottom, "กรุงเทพมหานคร9");
    }

    #[test]
    fn tight_cluster_is_a_single_row() {
        let dets = vec![
            det("4", 40.0, 13.0),
            det("3", 30.0, 12.0),
            det("1", 10.0, 10.0),
            det("2", 20.0, 11.0),
        ];
        let lines = split_lines(&dets, DEFAULT_LINE_GAP_PX).unwrap();
        assert_eq!(lines.top, "1234");
        assert_eq!(lines.bottom, "");
    }

    #[test]
    fn spread_exactly_at_gap_splits() {
        let dets = vec![det("1", 0.0, 0.0), det("2", 0.0, 30.0)];
        let lines = split_lines(&dets, DEFAULT_LINE_GAP_PX).unwrap();
        assert_eq!(lines.top, "1");
        assert_eq!(lines.bottom, "2");
    }

    #[test]
    fn midpoint_goes_to_bottom_row() {
        let dets = vec![
            det("1", 0.0, 0.0),
            det("2", 5.0, 20.0),
            det("3", 10.0, 40.0),
        ];
        let lines = split_lines(&dets, DEFAULT_LINE_GAP_PX).unwrap();
        assert_eq!(lines.top, "1");
        assert_eq!(lines.bottom, "23");
    }

    #[test]
    fn repeated_runs_produce_identical_rows() {
        let dets = vec![
            det("7", 50.0, 12.0),
            det("7", 50.0, 10.0),
            det("A10", 5.0, 11.0),
            det("CMI", 30.0, 70.0),
        ];
        let first = split_lines(&dets, DEFAULT_LINE_GAP_PX);
        let mut reversed = dets.clone();
        reversed.reverse();
        assert_eq!(first, split_lines(&dets, DEFAULT_LINE_GAP_PX));
        assert_eq!(first, split_lines(&reversed, DEFAULT_LINE_GAP_PX));
    }
}
