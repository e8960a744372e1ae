//! CART regression tree with variance-reduction splits

use crate::error::{ForecastError, Result};
use rand::rngs::StdRng;
use rand::seq::index::sample;

/// Growth limits of a single tree
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features drawn (without replacement) at each split
    pub max_features: usize,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// A fitted regression tree, stored as a flat node arena
#[derive(Debug, Clone, PartialEq)]
pub struct RegressionTree {
    nodes: Vec<Node>,
    importances: Vec<f64>,
}

struct Grower<'a> {
    rows: &'a [Vec<f64>],
    targets: &'a [f64],
    params: TreeParams,
    width: usize,
    nodes: Vec<Node>,
    importances: Vec<f64>,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    gain: f64,
    left: Vec<usize>,
    right: Vec<usize>,
}

impl RegressionTree {
    /// Grow a tree on the samples listed in `indices` (repeats allowed)
    pub fn fit(
        rows: &[Vec<f64>],
        targets: &[f64],
        indices: &[usize],
        params: TreeParams,
        rng: &mut StdRng,
    ) -> Result<Self> {
        if indices.is_empty() {
            return Err(ForecastError::ModelError(
                "Cannot grow a tree on zero samples".to_string(),
            ));
        }
        let width = rows.first().map_or(0, Vec::len);
        if width == 0 {
            return Err(ForecastError::ModelError(
                "Cannot grow a tree without features".to_string(),
            ));
        }

        let mut grower = Grower {
            rows,
            targets,
            params: TreeParams {
                max_features: params.max_features.clamp(1, width),
                ..params
            },
            width,
            nodes: Vec::new(),
            importances: vec![0.0; width],
        };
        grower.grow(indices.to_vec(), 0, rng);

        Ok(Self {
            nodes: grower.nodes,
            importances: grower.importances,
        })
    }

    /// Predict one row
    pub fn predict(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let v = row.get(*feature).copied().unwrap_or(0.0);
                    idx = if v <= *threshold { *left } else { *right };
                }
            }
        }
    }

    /// Total weighted impurity decrease per feature (not normalised)
    pub fn importances(&self) -> &[f64] {
        &self.importances
    }

    /// Number of nodes, leaves included
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

impl<'a> Grower<'a> {
    fn grow(&mut self, indices: Vec<usize>, depth: usize, rng: &mut StdRng) -> usize {
        let id = self.nodes.len();
        let n = indices.len() as f64;
        let sum: f64 = indices.iter().map(|&i| self.targets[i]).sum();
        let mean = sum / n;
        self.nodes.push(Node::Leaf { value: mean });

        let sse: f64 = indices
            .iter()
            .map(|&i| (self.targets[i] - mean).powi(2))
            .sum();

        let p = self.params;
        if depth >= p.max_depth
            || indices.len() < p.min_samples_split
            || indices.len() < 2 * p.min_samples_leaf.max(1)
            || sse <= 1e-12
        {
            return id;
        }

        let best = match self.best_split(&indices, sse, rng) {
            Some(best) => best,
            None => return id,
        };

        self.importances[best.feature] += best.gain;
        let left = self.grow(best.left, depth + 1, rng);
        let right = self.grow(best.right, depth + 1, rng);
        self.nodes[id] = Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left,
            right,
        };
        id
    }

    fn best_split(&self, indices: &[usize], sse: f64, rng: &mut StdRng) -> Option<BestSplit> {
        let min_leaf = self.params.min_samples_leaf.max(1);
        let n = indices.len();
        let mut best: Option<(usize, f64, f64, usize)> = None;
        let mut sorted = indices.to_vec();

        for feature in sample(rng, self.width, self.params.max_features).into_iter() {
            sorted.sort_by(|&a, &b| self.rows[a][feature].total_cmp(&self.rows[b][feature]));

            let total: f64 = sorted.iter().map(|&i| self.targets[i]).sum();
            let total_sq: f64 = sorted.iter().map(|&i| self.targets[i].powi(2)).sum();
            let mut left_sum = 0.0;
            let mut left_sq = 0.0;

            for k in 1..n {
                let y = self.targets[sorted[k - 1]];
                left_sum += y;
                left_sq += y * y;

                if k < min_leaf || n - k < min_leaf {
                    continue;
                }
                let lo = self.rows[sorted[k - 1]][feature];
                let hi = self.rows[sorted[k]][feature];
                if lo >= hi {
                    continue;
                }

                let right_sum = total - left_sum;
                let right_sq = total_sq - left_sq;
                let left_sse = left_sq - left_sum * left_sum / k as f64;
                let right_sse = right_sq - right_sum * right_sum / (n - k) as f64;
                let gain = sse - (left_sse + right_sse);

                if gain > 1e-12 && best.map_or(true, |(_, _, g, _)| gain > g) {
                    best = Some((feature, (lo + hi) / 2.0, gain, k));
                }
            }
        }

        let (feature, threshold, gain, _) = best?;
        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .copied()
            .partition(|&i| self.rows[i][feature] <= threshold);

        if left.is_empty() || right.is_empty() {
            return None;
        }

        Some(BestSplit {
            feature,
            threshold,
            gain,
            left,
            right,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn params(max_depth: usize) -> TreeParams {
        TreeParams {
            max_depth,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: 2,
        }
    }

    #[test]
    fn test_step_function() {
        let rows: Vec<Vec<f64>> = (0..20).map(|i| vec![i as f64, 0.0]).collect();
        let targets: Vec<f64> = (0..20).map(|i| if i < 10 { 1.0 } else { 5.0 }).collect();
        let indices: Vec<usize> = (0..20).collect();
        let mut rng = StdRng::seed_from_u64(1);

        let tree = RegressionTree::fit(&rows, &targets, &indices, params(3), &mut rng).unwrap();

        assert_eq!(tree.predict(&[2.0, 0.0]), 1.0);
        assert_eq!(tree.predict(&[15.0, 0.0]), 5.0);
        assert!(tree.importances()[0] > 0.0);
        assert_eq!(tree.importances()[1], 0.0);
    }

    #[test]
    fn test_depth_zero_is_mean() {
        let rows = vec![vec![0.0], vec![1.0], vec![2.0]];
        let targets = vec![1.0, 2.0, 6.0];
        let mut rng = StdRng::seed_from_u64(1);

        let tree = RegressionTree::fit(&rows, &targets, &[0, 1, 2], params(0), &mut rng).unwrap();
        assert_eq!(tree.node_count(), 1);
        assert_eq!(tree.predict(&[5.0]), 3.0);
    }

    #[test]
    fn test_min_leaf_respected() {
        let rows: Vec<Vec<f64>> = (0..6).map(|i| vec![i as f64]).collect();
        let targets = vec![0.0, 0.0, 0.0, 0.0, 0.0, 100.0];
        let mut rng = StdRng::seed_from_u64(1);
        let p = TreeParams {
            min_samples_leaf: 3,
            ..params(5)
        };

        let tree = RegressionTree::fit(&rows, &targets, &[0, 1, 2, 3, 4, 5], p, &mut rng).unwrap();
        // The only admissible split is 3/3
        assert!((tree.predict(&[5.0]) - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_indices() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(RegressionTree::fit(&[vec![1.0]], &[1.0], &[], params(2), &mut rng).is_err());
    }
}
