use std::fmt;

use serde::{Deserialize, Serialize};

/// Land-cover classes, in their fixed ordinal order.
///
/// The ordinal is the raster value the classifier emits; it never depends on
/// which classes happen to have samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ClassLabel {
    Forest,
    Pasture,
    Water,
    OtherVegetation,
    BareSoil,
    Burned,
    Agriculture,
}

impl ClassLabel {
    pub const ALL: [ClassLabel; 7] = [
        ClassLabel::Forest,
        ClassLabel::Pasture,
        ClassLabel::Water,
        ClassLabel::OtherVegetation,
        ClassLabel::BareSoil,
        ClassLabel::Burned,
        ClassLabel::Agriculture,
    ];

    pub fn ordinal(self) -> u8 {
        self as u8
    }

    pub fn from_ordinal(ordinal: u8) -> Option<Self> {
        Self::ALL.get(ordinal as usize).copied()
    }

    /// Display name, as used in sample files and exported column headers.
    pub fn name(self) -> &'static str {
        match self {
            ClassLabel::Forest => "Floresta",
            ClassLabel::Pasture => "Pastagem",
            ClassLabel::Water => "Água",
            ClassLabel::OtherVegetation => "Outra Vegetação",
            ClassLabel::BareSoil => "Solo Exposto",
            ClassLabel::Burned => "Queimada",
            ClassLabel::Agriculture => "Agricultura",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|l| l.name() == name)
    }

    /// Palette colour for classified-raster rendering.
    pub fn color(self) -> &'static str {
        match self {
            ClassLabel::Forest => "#00FF00",
            ClassLabel::Pasture => "#FFFF00",
            ClassLabel::Water => "#00FFFF",
            ClassLabel::OtherVegetation => "#FF00FF",
            ClassLabel::BareSoil => "#FF8C00",
            ClassLabel::Burned => "#FF0000",
            ClassLabel::Agriculture => "#FFD700",
        }
    }
}

impl fmt::Display for ClassLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// The two analysis periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Anterior,
    Posterior,
}

impl Period {
    pub const BOTH: [Period; 2] = [Period::Anterior, Period::Posterior];

    /// Seed for the train/validation split. Distinct per period.
    pub fn split_seed(self) -> u64 {
        match self {
            Period::Anterior => 0,
            Period::Posterior => 42,
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Period::Anterior => "anterior",
            Period::Posterior => "posterior",
        })
    }
}

impl std::str::FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "anterior" => Ok(Period::Anterior),
            "posterior" => Ok(Period::Posterior),
            other => Err(format!("unknown period `{other}` (expected anterior|posterior)")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinals_follow_declaration_order() {
        for (i, l) in ClassLabel::ALL.iter().enumerate() {
            assert_eq!(l.ordinal() as usize, i);
            assert_eq!(ClassLabel::from_ordinal(i as u8), Some(*l));
        }
        assert_eq!(ClassLabel::from_ordinal(7), None);
    }

    #[test]
    fn names_roundtrip() {
        for l in ClassLabel::ALL {
            assert_eq!(ClassLabel::from_name(l.name()), Some(l));
        }
        assert_eq!(ClassLabel::from_name("Água"), Some(ClassLabel::Water));
        assert_eq!(ClassLabel::from_name("agua"), None);
    }

    #[test]
    fn period_seeds_differ() {
        assert_ne!(Period::Anterior.split_seed(), Period::Posterior.split_seed());
    }
}
