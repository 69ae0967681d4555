//! Random forest binary classifier.
//!
//! Each tree is a CART classifier grown on a bootstrap sample with Gini
//! impurity. At every split the candidate features are visited in a random
//! order until `⌊√n_features⌋` non-constant ones have been evaluated. Trees
//! are stored as flat node arenas; leaves hold the fraction of positive
//! (on-time) samples that reached them, and the forest probability is the
//! mean of those fractions.

#![allow(missing_docs)]

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::core::errors::{FleetError, Result};

/// Growth parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 24,
            min_samples_split: 2,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Leaf {
        positive_fraction: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone)]
struct DecisionTree {
    nodes: Vec<Node>,
}

struct Candidate {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

/// Shared, read-only inputs for growing one tree.
struct Grower<'a> {
    x: &'a [Vec<f64>],
    y: &'a [u8],
    params: &'a ForestParams,
    max_features: usize,
}

fn gini(n: usize, positives: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let p = positives as f64 / n as f64;
    2.0 * p * (1.0 - p)
}

impl Grower<'_> {
    fn positives(&self, indices: &[usize]) -> usize {
        indices.iter().filter(|&&i| self.y[i] == 1).count()
    }

    fn grow(&self, indices: Vec<usize>, rng: &mut StdRng) -> DecisionTree {
        let mut tree = DecisionTree { nodes: Vec::new() };
        self.build(&mut tree, indices, 0, rng);
        tree
    }

    fn build(&self, tree: &mut DecisionTree, indices: Vec<usize>, depth: usize, rng: &mut StdRng) -> usize {
        let n = indices.len();
        let positives = self.positives(&indices);
        let id = tree.nodes.len();
        tree.nodes.push(Node::Leaf {
            positive_fraction: if n == 0 { 0.0 } else { positives as f64 / n as f64 },
        });

        let pure = positives == 0 || positives == n;
        if pure || n < self.params.min_samples_split || depth >= self.params.max_depth {
            return id;
        }
        let Some(split) = self.best_split(&indices, rng) else {
            return id;
        };
        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| self.x[i][split.feature] <= split.threshold);
        if left.is_empty() || right.is_empty() {
            return id;
        }

        let left = self.build(tree, left, depth + 1, rng);
        let right = self.build(tree, right, depth + 1, rng);
        tree.nodes[id] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        id
    }

    fn best_split(&self, indices: &[usize], rng: &mut StdRng) -> Option<Candidate> {
        let n_features = self.x[indices[0]].len();
        let mut features: Vec<usize> = (0..n_features).collect();
        features.shuffle(rng);

        let mut best: Option<Candidate> = None;
        let mut evaluated = 0;
        for feature in features {
            if evaluated == self.max_features {
                break;
            }
            let mut column: Vec<(f64, u8)> = indices
                .iter()
                .map(|&i| (self.x[i][feature], self.y[i]))
                .collect();
            column.sort_by(|a, b| a.0.total_cmp(&b.0));
            if column[0].0 == column[column.len() - 1].0 {
                continue;
            }
            evaluated += 1;

            let n = column.len();
            let total_pos = column.iter().filter(|(_, label)| *label == 1).count();
            let mut left_pos = 0;
            for pos in 1..n {
                left_pos += usize::from(column[pos - 1].1 == 1);
                let (lo, hi) = (column[pos - 1].0, column[pos].0);
                if lo >= hi {
                    continue;
                }
                let right_n = n - pos;
                let impurity = (pos as f64).mul_add(
                    gini(pos, left_pos),
                    right_n as f64 * gini(right_n, total_pos - left_pos),
                ) / n as f64;
                if best.as_ref().is_none_or(|b| impurity < b.impurity) {
                    let mid = lo + (hi - lo) / 2.0;
                    best = Some(Candidate {
                        feature,
                        threshold: if mid < hi { mid } else { lo },
                        impurity,
                    });
                }
            }
        }
        best
    }
}

impl DecisionTree {
    fn positive_fraction(&self, row: &[f64]) -> f64 {
        let mut id = 0;
        loop {
            match &self.nodes[id] {
                Node::Leaf { positive_fraction } => return *positive_fraction,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    id = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }
}

/// Trained ensemble.
#[derive(Debug, Clone)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    n_features: usize,
}

impl RandomForest {
    /// Grow `params.n_trees` trees on bootstrap samples of `(x, y)`.
    ///
    /// Labels are 0/1. Tree `i` draws from an RNG seeded with `seed + i`, so
    /// the forest is a pure function of its inputs.
    pub fn fit(x: &[Vec<f64>], y: &[u8], params: &ForestParams) -> Result<Self> {
        if x.is_empty() {
            return Err(FleetError::InsufficientData {
                context: "random forest",
                details: "no training rows".to_string(),
            });
        }
        if x.len() != y.len() {
            return Err(FleetError::ShapeMismatch {
                expected: x.len(),
                actual: y.len(),
            });
        }
        let n_features = x[0].len();
        if let Some(row) = x.iter().find(|row| row.len() != n_features) {
            return Err(FleetError::ShapeMismatch {
                expected: n_features,
                actual: row.len(),
            });
        }

        let grower = Grower {
            x,
            y,
            params,
            max_features: ((n_features as f64).sqrt().floor() as usize).max(1),
        };
        let n = x.len();
        let trees = (0..params.n_trees as u64)
            .map(|i| {
                let mut rng = StdRng::seed_from_u64(params.seed.wrapping_add(i));
                let bootstrap: Vec<usize> = (0..n).map(|_| rng.random_range(0..n)).collect();
                grower.grow(bootstrap, &mut rng)
            })
            .collect();

        Ok(Self { trees, n_features })
    }

    #[must_use]
    pub const fn n_features(&self) -> usize {
        self.n_features
    }

    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Probability of the positive class for `row`.
    pub fn predict_proba(&self, row: &[f64]) -> Result<f64> {
        if row.len() != self.n_features {
            return Err(FleetError::ShapeMismatch {
                expected: self.n_features,
                actual: row.len(),
            });
        }
        if self.trees.is_empty() {
            return Ok(0.0);
        }
        let sum: f64 = self.trees.iter().map(|t| t.positive_fraction(row)).sum();
        Ok((sum / self.trees.len() as f64).clamp(0.0, 1.0))
    }

    /// Hard label: 1 when the positive class is strictly more likely.
    pub fn predict(&self, row: &[f64]) -> Result<u8> {
        Ok(u8::from(self.predict_proba(row)? > 0.5))
    }
}
