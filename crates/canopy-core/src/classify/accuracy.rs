use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::provider::ClassPair;
use crate::samples::ClassLabel;

/// Square error matrix over ordinals `0..=max observed`.
/// Rows are reference classes, columns are predictions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfusionMatrix {
    pub names: Vec<String>,
    pub counts: Vec<Vec<u64>>,
}

impl ConfusionMatrix {
    /// None when there are no pairs.
    pub fn from_pairs(pairs: &[ClassPair], class_names: &BTreeMap<u8, ClassLabel>) -> Option<Self> {
        let max = pairs.iter().map(|p| p.reference.max(p.predicted)).max()? as usize;
        let size = max + 1;
        let mut counts = vec![vec![0u64; size]; size];
        for p in pairs {
            counts[p.reference as usize][p.predicted as usize] += 1;
        }
        let names = (0..size)
            .map(|i| match class_names.get(&(i as u8)) {
                Some(label) => label.name().to_string(),
                None => format!("Classe {i}"),
            })
            .collect();
        Some(Self { names, counts })
    }

    pub fn size(&self) -> usize {
        self.counts.len()
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().flatten().sum()
    }

    pub fn overall_accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        let diagonal: u64 = (0..self.size()).map(|i| self.counts[i][i]).sum();
        diagonal as f64 / total as f64
    }

    /// Cohen's kappa. When chance agreement is already total (one class on
    /// both axes), kappa is 1 for perfect agreement and 0 otherwise.
    pub fn kappa(&self) -> f64 {
        let total = self.total() as f64;
        if total == 0.0 {
            return 0.0;
        }
        let po = self.overall_accuracy();
        let pe: f64 = (0..self.size())
            .map(|i| {
                let row: u64 = self.counts[i].iter().sum();
                let col: u64 = self.counts.iter().map(|r| r[i]).sum();
                (row as f64 / total) * (col as f64 / total)
            })
            .sum();
        if (1.0 - pe).abs() < 1e-12 {
            return if po >= 1.0 { 1.0 } else { 0.0 };
        }
        (po - pe) / (1.0 - pe)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum KappaQuality {
    Excellent,
    Good,
    Moderate,
    Poor,
}

impl KappaQuality {
    pub fn from_kappa(kappa: f64) -> Self {
        if kappa >= 0.8 {
            KappaQuality::Excellent
        } else if kappa >= 0.6 {
            KappaQuality::Good
        } else if kappa >= 0.4 {
            KappaQuality::Moderate
        } else {
            KappaQuality::Poor
        }
    }
}

impl fmt::Display for KappaQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            KappaQuality::Excellent => "Excellent",
            KappaQuality::Good => "Good",
            KappaQuality::Moderate => "Moderate",
            KappaQuality::Poor => "Poor",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccuracyReport {
    pub matrix: ConfusionMatrix,
    pub overall_accuracy: f64,
    pub kappa: f64,
    pub quality: KappaQuality,
    pub samples: u64,
}

impl AccuracyReport {
    pub fn from_matrix(matrix: ConfusionMatrix) -> Self {
        let kappa = matrix.kappa();
        Self {
            overall_accuracy: matrix.overall_accuracy(),
            kappa,
            quality: KappaQuality::from_kappa(kappa),
            samples: matrix.total(),
            matrix,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn pair(reference: u8, predicted: u8) -> ClassPair {
        ClassPair { reference, predicted }
    }

    fn names() -> BTreeMap<u8, ClassLabel> {
        [(0, ClassLabel::Forest), (2, ClassLabel::Water)].into_iter().collect()
    }

    #[test]
    fn matrix_is_square_to_max_ordinal() {
        let m = ConfusionMatrix::from_pairs(&[pair(0, 0), pair(2, 0), pair(2, 2)], &names()).unwrap();
        assert_eq!(m.size(), 3);
        assert_eq!(m.names, vec!["Floresta", "Classe 1", "Água"]);
        assert_eq!(m.counts[2][0], 1);
        assert_eq!(m.counts[1], vec![0, 0, 0]);
    }

    #[test]
    fn empty_pairs_have_no_matrix() {
        assert!(ConfusionMatrix::from_pairs(&[], &names()).is_none());
    }

    #[test]
    fn kappa_known_value() {
        // 20 pairs: reference 0 → 9 correct, 1 wrong; reference 2 → 8 correct, 2 wrong.
        let mut pairs = Vec::new();
        pairs.extend(std::iter::repeat(pair(0, 0)).take(9));
        pairs.push(pair(0, 2));
        pairs.extend(std::iter::repeat(pair(2, 2)).take(8));
        pairs.extend(std::iter::repeat(pair(2, 0)).take(2));
        let report = AccuracyReport::from_matrix(ConfusionMatrix::from_pairs(&pairs, &names()).unwrap());
        assert_relative_eq!(report.overall_accuracy, 0.85, epsilon = 1e-12);
        // pe = 0.5*0.55 + 0.5*0.45 = 0.5
        assert_relative_eq!(report.kappa, 0.7, epsilon = 1e-12);
        assert_eq!(report.quality, KappaQuality::Good);
        assert_eq!(report.samples, 20);
    }

    #[test]
    fn single_class_perfect_agreement() {
        let m = ConfusionMatrix::from_pairs(&[pair(0, 0), pair(0, 0)], &names()).unwrap();
        assert_eq!(m.kappa(), 1.0);
    }

    #[test]
    fn quality_thresholds() {
        assert_eq!(KappaQuality::from_kappa(0.80), KappaQuality::Excellent);
        assert_eq!(KappaQuality::from_kappa(0.79), KappaQuality::Good);
        assert_eq!(KappaQuality::from_kappa(0.60), KappaQuality::Good);
        assert_eq!(KappaQuality::from_kappa(0.40), KappaQuality::Moderate);
        assert_eq!(KappaQuality::from_kappa(0.39), KappaQuality::Poor);
    }
}
