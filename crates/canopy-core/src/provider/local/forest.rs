//! Random forest of CART trees for the in-memory provider.
//!
//! Each tree is grown on a bag of rows drawn without replacement, considers
//! ⌊√features⌋ random features per split, splits on Gini impurity and stops
//! when a child would hold fewer than `min_leaf_population` rows.

use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;

use crate::config::RandomForestParams;
use crate::error::{CanopyError, Result};
use crate::provider::PixelTable;

use super::Deadline;

const MAX_DEPTH: usize = 32;

#[derive(Debug, Clone)]
enum Node {
    Leaf(u8),
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn predict(&self, values: &[f64]) -> u8 {
        let mut node = self;
        loop {
            match node {
                Node::Leaf(class) => return *class,
                Node::Split { feature, threshold, left, right } => {
                    node = if values[*feature] <= *threshold { left } else { right };
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct RandomForest {
    trees: Vec<Node>,
    n_features: usize,
}

struct Grower<'a> {
    table: &'a PixelTable,
    n_classes: usize,
    n_features: usize,
    features_per_split: usize,
    min_leaf: usize,
    rng: StdRng,
}

impl RandomForest {
    pub(crate) fn fit(table: &PixelTable, params: &RandomForestParams, deadline: &Deadline) -> Result<Self> {
        if table.rows.is_empty() {
            return Err(CanopyError::provider("train_classifier", "empty training table"));
        }
        let n_features = table.band_names.len();
        if n_features == 0 || table.rows.iter().any(|r| r.values.len() != n_features) {
            return Err(CanopyError::provider(
                "train_classifier",
                "training rows do not match the band list",
            ));
        }

        let n_rows = table.rows.len();
        let bag_size = ((n_rows as f64 * params.bag_fraction).round() as usize).clamp(1, n_rows);
        let n_classes = table.rows.iter().map(|r| r.class as usize).max().unwrap_or(0) + 1;

        let mut grower = Grower {
            table,
            n_classes,
            n_features,
            features_per_split: ((n_features as f64).sqrt().floor() as usize).max(1),
            min_leaf: params.min_leaf_population.max(1),
            rng: StdRng::seed_from_u64(params.seed),
        };

        let mut trees = Vec::with_capacity(params.n_trees.max(1));
        for _ in 0..params.n_trees.max(1) {
            deadline.check()?;
            let bag = index::sample(&mut grower.rng, n_rows, bag_size).into_vec();
            trees.push(grower.grow(bag, 0));
        }

        Ok(Self { trees, n_features })
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Majority vote over all trees; ties go to the lowest ordinal.
    pub fn predict(&self, values: &[f64]) -> u8 {
        let mut votes = [0usize; 256];
        for tree in &self.trees {
            votes[tree.predict(values) as usize] += 1;
        }
        let mut best = 0usize;
        for (class, &n) in votes.iter().enumerate() {
            if n > votes[best] {
                best = class;
            }
        }
        best as u8
    }
}

impl Grower<'_> {
    fn counts(&self, rows: &[usize]) -> Vec<usize> {
        let mut counts = vec![0usize; self.n_classes];
        for &i in rows {
            counts[self.table.rows[i].class as usize] += 1;
        }
        counts
    }

    fn majority(counts: &[usize]) -> u8 {
        let mut best = 0usize;
        for (class, &n) in counts.iter().enumerate() {
            if n > counts[best] {
                best = class;
            }
        }
        best as u8
    }

    fn grow(&mut self, rows: Vec<usize>, depth: usize) -> Node {
        let counts = self.counts(&rows);
        let parent_impurity = gini(&counts, rows.len());
        if depth >= MAX_DEPTH || parent_impurity == 0.0 || rows.len() < 2 * self.min_leaf {
            return Node::Leaf(Self::majority(&counts));
        }

        let candidates = index::sample(&mut self.rng, self.n_features, self.features_per_split);
        let mut best: Option<(usize, f64, f64)> = None;
        for feature in candidates.iter() {
            if let Some((threshold, impurity)) = self.best_threshold(&rows, feature) {
                if best.map_or(true, |(_, _, b)| impurity < b) {
                    best = Some((feature, threshold, impurity));
                }
            }
        }

        match best {
            Some((feature, threshold, impurity)) if impurity < parent_impurity - 1e-12 => {
                let (left, right): (Vec<usize>, Vec<usize>) = rows
                    .into_iter()
                    .partition(|&i| self.table.rows[i].values[feature] <= threshold);
                Node::Split {
                    feature,
                    threshold,
                    left: Box::new(self.grow(left, depth + 1)),
                    right: Box::new(self.grow(right, depth + 1)),
                }
            }
            _ => Node::Leaf(Self::majority(&counts)),
        }
    }

    /// Best (threshold, weighted gini) on one feature honouring the leaf size.
    fn best_threshold(&self, rows: &[usize], feature: usize) -> Option<(f64, f64)> {
        let mut sorted: Vec<(f64, u8)> = rows
            .iter()
            .map(|&i| (self.table.rows[i].values[feature], self.table.rows[i].class))
            .collect();
        sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

        let n = sorted.len();
        let mut left = vec![0usize; self.n_classes];
        let mut right = vec![0usize; self.n_classes];
        for &(_, c) in &sorted {
            right[c as usize] += 1;
        }

        let mut best: Option<(f64, f64)> = None;
        for k in 1..n {
            let (v_prev, c_prev) = sorted[k - 1];
            left[c_prev as usize] += 1;
            right[c_prev as usize] -= 1;
            if k < self.min_leaf || n - k < self.min_leaf {
                continue;
            }
            let v = sorted[k].0;
            if v <= v_prev {
                continue;
            }
            let impurity =
                (k as f64 * gini(&left, k) + (n - k) as f64 * gini(&right, n - k)) / n as f64;
            if best.map_or(true, |(_, b)| impurity < b) {
                best = Some(((v_prev + v) / 2.0, impurity));
            }
        }
        best
    }
}

fn gini(counts: &[usize], total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let t = total as f64;
    1.0 - counts.iter().map(|&c| (c as f64 / t).powi(2)).sum::<f64>()
}
