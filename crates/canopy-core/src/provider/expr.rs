//! Expression graphs sent to the provider.
//!
//! The core describes band algebra and categorical raster algebra as values;
//! providers decide how (and where) to evaluate them.

use std::ops::{Add, Div, Mul, Sub};

use geo::MultiPolygon;
use serde::{Deserialize, Serialize};

use super::ImageHandle;

// ── Band algebra ──────────────────────────────────────────────────────────

/// Continuous per-pixel expression over the bands of one scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BandExpr {
    /// A raw source band, by archive name (e.g. `SR_B4`).
    Band(String),
    Constant(f64),
    Add(Box<BandExpr>, Box<BandExpr>),
    Sub(Box<BandExpr>, Box<BandExpr>),
    Mul(Box<BandExpr>, Box<BandExpr>),
    Div(Box<BandExpr>, Box<BandExpr>),
}

impl BandExpr {
    pub fn band(name: &str) -> Self {
        BandExpr::Band(name.to_string())
    }

    pub fn constant(v: f64) -> Self {
        BandExpr::Constant(v)
    }

    /// `(a - b) / (a + b)`
    pub fn normalized_difference(a: BandExpr, b: BandExpr) -> Self {
        (a.clone() - b.clone()) / (a + b)
    }

    /// Names of every source band referenced by this expression.
    pub fn source_bands(&self, out: &mut Vec<String>) {
        match self {
            BandExpr::Band(name) => {
                if !out.contains(name) {
                    out.push(name.clone());
                }
            }
            BandExpr::Constant(_) => {}
            BandExpr::Add(a, b) | BandExpr::Sub(a, b) | BandExpr::Mul(a, b) | BandExpr::Div(a, b) => {
                a.source_bands(out);
                b.source_bands(out);
            }
        }
    }

    /// Evaluate against a band lookup. Used by in-memory providers.
    ///
    /// None means masked: a band is missing at this pixel, or a division
    /// produced a non-finite value (zero denominator).
    pub fn eval(&self, lookup: &dyn Fn(&str) -> Option<f64>) -> Option<f64> {
        Some(match self {
            BandExpr::Band(name) => lookup(name)?,
            BandExpr::Constant(v) => *v,
            BandExpr::Add(a, b) => a.eval(lookup)? + b.eval(lookup)?,
            BandExpr::Sub(a, b) => a.eval(lookup)? - b.eval(lookup)?,
            BandExpr::Mul(a, b) => a.eval(lookup)? * b.eval(lookup)?,
            BandExpr::Div(a, b) => {
                let q = a.eval(lookup)? / b.eval(lookup)?;
                if !q.is_finite() {
                    return None;
                }
                q
            }
        })
    }
}

macro_rules! band_op {
    ($trait:ident, $method:ident, $variant:ident) => {
        impl $trait for BandExpr {
            type Output = BandExpr;
            fn $method(self, rhs: BandExpr) -> BandExpr {
                BandExpr::$variant(Box::new(self), Box::new(rhs))
            }
        }

        impl $trait<f64> for BandExpr {
            type Output = BandExpr;
            fn $method(self, rhs: f64) -> BandExpr {
                BandExpr::$variant(Box::new(self), Box::new(BandExpr::Constant(rhs)))
            }
        }
    };
}

band_op!(Add, add, Add);
band_op!(Sub, sub, Sub);
band_op!(Mul, mul, Mul);
band_op!(Div, div, Div);

/// One output band of a stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedBand {
    pub name: String,
    pub expr: BandExpr,
}

/// Ordered list of output bands evaluated over one scene (or mosaic).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BandStackSpec {
    pub bands: Vec<NamedBand>,
}

impl BandStackSpec {
    pub fn push(&mut self, name: &str, expr: BandExpr) {
        self.bands.push(NamedBand {
            name: name.to_string(),
            expr,
        });
    }

    pub fn names(&self) -> Vec<String> {
        self.bands.iter().map(|b| b.name.clone()).collect()
    }
}

// ── Categorical raster algebra ────────────────────────────────────────────

/// Integer-valued raster expression over previously produced rasters.
///
/// Comparison and logic nodes yield 1/0. Masked input cells stay masked,
/// except in [`RasterExpr::Where`], where a masked condition keeps the base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RasterExpr {
    Source(ImageHandle),
    Constant(i32),
    Remap {
        input: Box<RasterExpr>,
        from: Vec<i32>,
        to: Vec<i32>,
        default: i32,
    },
    Eq(Box<RasterExpr>, Box<RasterExpr>),
    And(Box<RasterExpr>, Box<RasterExpr>),
    Where {
        base: Box<RasterExpr>,
        condition: Box<RasterExpr>,
        value: i32,
    },
    Clip {
        input: Box<RasterExpr>,
        region: MultiPolygon<f64>,
    },
}

impl RasterExpr {
    pub fn source(handle: &ImageHandle) -> Self {
        RasterExpr::Source(handle.clone())
    }

    pub fn remap(self, from: Vec<i32>, to: Vec<i32>, default: i32) -> Self {
        RasterExpr::Remap {
            input: Box::new(self),
            from,
            to,
            default,
        }
    }

    pub fn eq_value(self, v: i32) -> Self {
        RasterExpr::Eq(Box::new(self), Box::new(RasterExpr::Constant(v)))
    }

    pub fn and(self, other: RasterExpr) -> Self {
        RasterExpr::And(Box::new(self), Box::new(other))
    }

    /// Replace cells where `condition` is non-zero with `value`.
    pub fn overwrite_where(self, condition: RasterExpr, value: i32) -> Self {
        RasterExpr::Where {
            base: Box::new(self),
            condition: Box::new(condition),
            value,
        }
    }

    pub fn clip(self, region: MultiPolygon<f64>) -> Self {
        RasterExpr::Clip {
            input: Box::new(self),
            region,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn operators_build_the_tree() {
        let e = (BandExpr::band("SR_B4") * 0.0000275) - 0.2;
        let v = e.eval(&|name| (name == "SR_B4").then_some(10_000.0)).unwrap();
        assert_relative_eq!(v, 0.075, epsilon = 1e-12);
    }

    #[test]
    fn normalized_difference_value() {
        let e = BandExpr::normalized_difference(BandExpr::band("a"), BandExpr::band("b"));
        let v = e
            .eval(&|n| match n {
                "a" => Some(0.4),
                "b" => Some(0.1),
                _ => None,
            })
            .unwrap();
        assert_relative_eq!(v, 0.6, epsilon = 1e-12);
    }

    #[test]
    fn missing_band_yields_none() {
        let e = BandExpr::band("SR_B9") + 1.0;
        assert!(e.eval(&|_| None).is_none());
    }

    #[test]
    fn zero_denominator_is_masked() {
        let e = BandExpr::normalized_difference(BandExpr::band("a"), BandExpr::band("b"));
        assert!(e.eval(&|_| Some(0.0)).is_none());
        let opposite = |n: &str| Some(if n == "a" { 0.3 } else { -0.3 });
        assert!(e.eval(&opposite).is_none());
    }

    #[test]
    fn source_bands_are_unique() {
        let e = BandExpr::normalized_difference(BandExpr::band("a"), BandExpr::band("b"));
        let mut names = Vec::new();
        e.source_bands(&mut names);
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }
}
