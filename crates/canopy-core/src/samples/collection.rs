use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::label::ClassLabel;
use crate::geometry::LonLat;

/// Labelled sample points for one period.
///
/// Every label is always present as a key, possibly with no points. Points
/// keep their insertion order and are never deduplicated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleCollection {
    points: BTreeMap<ClassLabel, Vec<LonLat>>,
}

impl Default for SampleCollection {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleCollection {
    pub fn new() -> Self {
        Self {
            points: ClassLabel::ALL.iter().map(|&l| (l, Vec::new())).collect(),
        }
    }

    pub fn add(&mut self, label: ClassLabel, point: LonLat) {
        self.points.entry(label).or_default().push(point);
    }

    pub fn extend(&mut self, label: ClassLabel, points: impl IntoIterator<Item = LonLat>) {
        self.points.entry(label).or_default().extend(points);
    }

    /// Remove every point, keeping all labels.
    pub fn clear(&mut self) {
        for pts in self.points.values_mut() {
            pts.clear();
        }
    }

    pub fn points(&self, label: ClassLabel) -> &[LonLat] {
        self.points.get(&label).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn count(&self, label: ClassLabel) -> usize {
        self.points(label).len()
    }

    pub fn total(&self) -> usize {
        self.points.values().map(Vec::len).sum()
    }

    /// Labels with at least one point, in ordinal order.
    pub fn populated(&self) -> Vec<ClassLabel> {
        self.points
            .iter()
            .filter(|(_, pts)| !pts.is_empty())
            .map(|(&l, _)| l)
            .collect()
    }

    /// Size of the smallest non-empty class; 0 when nothing is populated.
    pub fn min_class_size(&self) -> usize {
        self.points
            .values()
            .map(Vec::len)
            .filter(|&n| n > 0)
            .min()
            .unwrap_or(0)
    }

    /// Iterate (label, point) in ordinal order, points in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (ClassLabel, LonLat)> + '_ {
        self.points
            .iter()
            .flat_map(|(&l, pts)| pts.iter().map(move |&p| (l, p)))
    }

    /// Populated classes with fewer than `threshold` points.
    pub fn sparse_classes(&self, threshold: usize) -> Vec<(ClassLabel, usize)> {
        self.points
            .iter()
            .map(|(&l, pts)| (l, pts.len()))
            .filter(|&(_, n)| n > 0 && n < threshold)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicates_are_kept() {
        let mut c = SampleCollection::new();
        let p = LonLat::new(-62.0, -9.0);
        c.add(ClassLabel::Forest, p);
        c.add(ClassLabel::Forest, p);
        assert_eq!(c.count(ClassLabel::Forest), 2);
    }

    #[test]
    fn min_class_size_ignores_empty_classes() {
        let mut c = SampleCollection::new();
        assert_eq!(c.min_class_size(), 0);
        c.extend(ClassLabel::Forest, vec![LonLat::new(0.0, 0.0); 12]);
        c.extend(ClassLabel::Water, vec![LonLat::new(0.0, 0.0); 4]);
        assert_eq!(c.min_class_size(), 4);
        assert_eq!(c.populated(), vec![ClassLabel::Forest, ClassLabel::Water]);
        assert_eq!(c.sparse_classes(5), vec![(ClassLabel::Water, 4)]);
    }

    #[test]
    fn clear_keeps_labels() {
        let mut c = SampleCollection::new();
        c.add(ClassLabel::Pasture, LonLat::new(0.0, 0.0));
        c.clear();
        assert_eq!(c.total(), 0);
        assert_eq!(c.points(ClassLabel::Pasture).len(), 0);
    }
}
