//! Bulk import of labelled coordinates from plain text.
//!
//! ```text
//! Floresta
//! -61.9345, -9.1523
//! [-61.9512, -9.1678]
//!
//! Pastagem
//! Point([-61.9934, -9.1289])
//! ```
//!
//! A line equal to a class name switches the current class (initially
//! Floresta). Any other non-empty line must hold at least two numbers: the
//! first is longitude, the second latitude. Imported points are appended to
//! the collection, never replacing what was collected by hand.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::collection::SampleCollection;
use super::label::ClassLabel;
use crate::geometry::LonLat;

/// Accepted coordinate window. Defaults to mainland Brazil.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImportBounds {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl Default for ImportBounds {
    fn default() -> Self {
        Self {
            min_lon: -75.0,
            max_lon: -30.0,
            min_lat: -35.0,
            max_lat: 5.0,
        }
    }
}

impl ImportBounds {
    fn contains(&self, p: LonLat) -> bool {
        p.lon >= self.min_lon && p.lon <= self.max_lon && p.lat >= self.min_lat && p.lat <= self.max_lat
    }
}

/// Why a line was skipped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ImportIssue {
    /// Fewer than two numbers on the line.
    NotACoordinate { line: usize, text: String },
    OutOfBounds { line: usize, lon: f64, lat: f64 },
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportSummary {
    pub imported: BTreeMap<ClassLabel, usize>,
    pub issues: Vec<ImportIssue>,
}

impl ImportSummary {
    pub fn total(&self) -> usize {
        self.imported.values().sum()
    }
}

/// Parse `text` and append its points to `collection`.
pub fn import_samples(
    collection: &mut SampleCollection,
    text: &str,
    bounds: &ImportBounds,
) -> ImportSummary {
    let mut summary = ImportSummary::default();
    let mut current = ClassLabel::Forest;
    let mut parsed: Vec<(ClassLabel, LonLat)> = Vec::new();

    for (i, raw) in text.lines().enumerate() {
        let line_no = i + 1;
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(label) = ClassLabel::from_name(line) {
            current = label;
            continue;
        }
        let numbers = scan_numbers(line);
        if numbers.len() < 2 {
            summary.issues.push(ImportIssue::NotACoordinate {
                line: line_no,
                text: line.to_string(),
            });
            continue;
        }
        let p = LonLat::new(numbers[0], numbers[1]);
        if !bounds.contains(p) {
            summary.issues.push(ImportIssue::OutOfBounds {
                line: line_no,
                lon: p.lon,
                lat: p.lat,
            });
            continue;
        }
        parsed.push((current, p));
    }

    for (label, p) in parsed {
        collection.add(label, p);
        *summary.imported.entry(label).or_default() += 1;
    }

    tracing::info!(
        imported = summary.total(),
        skipped = summary.issues.len(),
        "sample import finished"
    );
    summary
}

/// Every decimal number in `s`, in order. Accepts an optional leading `-`,
/// digits, and an optional fractional part (`-61.93`, `9`, `9.`).
fn scan_numbers(s: &str) -> Vec<f64> {
    let bytes = s.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let start = i;
        if bytes[i] == b'-' {
            i += 1;
        }
        let digits_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i == digits_start {
            i = start + 1;
            continue;
        }
        if i < bytes.len() && bytes[i] == b'.' {
            i += 1;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
        }
        if let Ok(v) = s[start..i].parse::<f64>() {
            out.push(v);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_numbers_handles_wrapped_forms() {
        assert_eq!(scan_numbers("-61.93, -9.15"), vec![-61.93, -9.15]);
        assert_eq!(scan_numbers("[-61.93, -9.15]"), vec![-61.93, -9.15]);
        assert_eq!(
            scan_numbers("ee.Geometry.Point([-61.93, -9.15])"),
            vec![-61.93, -9.15]
        );
        assert_eq!(scan_numbers("9. 10"), vec![9.0, 10.0]);
        assert!(scan_numbers("no numbers - here").is_empty());
    }

    #[test]
    fn label_lines_switch_class() {
        let text = "Floresta\n-61.93, -9.15\n-61.95, -9.16\n\nPastagem\n-61.99, -9.12\n";
        let mut c = SampleCollection::new();
        let s = import_samples(&mut c, text, &ImportBounds::default());
        assert_eq!(c.count(ClassLabel::Forest), 2);
        assert_eq!(c.count(ClassLabel::Pasture), 1);
        assert_eq!(s.total(), 3);
        assert!(s.issues.is_empty());
    }

    #[test]
    fn unlabelled_points_default_to_forest() {
        let mut c = SampleCollection::new();
        import_samples(&mut c, "-61.93, -9.15\n-61.99, -9.12", &ImportBounds::default());
        assert_eq!(c.count(ClassLabel::Forest), 2);
        assert_eq!(c.populated().len(), 1);
    }

    #[test]
    fn bad_lines_are_reported_with_line_numbers() {
        let text = "Água\nnot a point\n10.0, 50.0\n-61.9, -9.1";
        let mut c = SampleCollection::new();
        let s = import_samples(&mut c, text, &ImportBounds::default());
        assert_eq!(c.count(ClassLabel::Water), 1);
        assert_eq!(s.issues.len(), 2);
        assert!(matches!(s.issues[0], ImportIssue::NotACoordinate { line: 2, .. }));
        assert!(matches!(s.issues[1], ImportIssue::OutOfBounds { line: 3, .. }));
    }

    #[test]
    fn import_merges_with_existing_points() {
        let mut c = SampleCollection::new();
        c.add(ClassLabel::Forest, LonLat::new(-61.0, -9.0));
        import_samples(&mut c, "-61.0, -9.0", &ImportBounds::default());
        assert_eq!(c.count(ClassLabel::Forest), 2);
    }
}
