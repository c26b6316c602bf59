use ndarray::{ArrayView1, ArrayView2};
use rand::{seq::SliceRandom, Rng};
use serde::{Deserialize, Serialize};

/// Arena node of a fitted tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        /// Fraction of class-1 samples that reached the leaf.
        p_positive: f64,
    },
}

/// Binary CART classifier (Gini impurity, fully grown).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

/// Growth parameters shared by every tree in a forest.
#[derive(Debug, Clone, Copy)]
pub struct TreeParams {
    /// Candidate features drawn per node.
    pub max_features: usize,
    /// Smallest node that may be split.
    pub min_samples_split: usize,
}

impl DecisionTree {
    /// Grows a tree on the given sample indices (duplicates allowed, as produced by bootstrapping).
    ///
    /// The tree is a pure function of `(x, y, samples, params)` and the RNG stream.
    pub fn fit<R: Rng>(
        x: ArrayView2<'_, f64>,
        y: &[u8],
        samples: &[usize],
        params: TreeParams,
        rng: &mut R,
    ) -> Self {
        let features = (0..x.ncols()).collect();
        let mut tree = Self { nodes: Vec::new() };
        let mut builder = Builder {
            x,
            y,
            params,
            features,
        };
        let mut root = samples.to_vec();
        builder.grow(&mut tree.nodes, &mut root, rng);
        tree
    }

    /// Probability of class 1 for one feature row.
    #[must_use]
    pub fn predict_proba(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => idx = if row[*feature] <= *threshold { *left } else { *right },
                Node::Leaf { p_positive } => return *p_positive,
            }
        }
    }

    /// Total node count.
    #[must_use]
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Longest root-to-leaf path, in edges.
    #[must_use]
    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match &nodes[idx] {
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
                Node::Leaf { .. } => 0,
            }
        }
        if self.nodes.is_empty() {
            0
        } else {
            walk(&self.nodes, 0)
        }
    }
}

struct Builder<'a, 'b> {
    x: ArrayView2<'a, f64>,
    y: &'b [u8],
    params: TreeParams,
    features: Vec<usize>,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

impl Builder<'_, '_> {
    /// Appends the subtree for `samples` and returns its node index.
    #[allow(clippy::cast_precision_loss)]
    fn grow<R: Rng>(&mut self, nodes: &mut Vec<Node>, samples: &mut [usize], rng: &mut R) -> usize {
        let positives = samples.iter().filter(|&&s| self.y[s] == 1).count();
        let id = nodes.len();
        nodes.push(Node::Leaf {
            p_positive: if samples.is_empty() {
                0.0
            } else {
                positives as f64 / samples.len() as f64
            },
        });
        let pure = positives == 0 || positives == samples.len();
        if pure || samples.len() < self.params.min_samples_split {
            return id;
        }
        let Some(best) = self.best_split(samples, rng) else {
            return id;
        };
        let (left, right) = partition(samples, |s| self.x[[s, best.feature]] <= best.threshold);
        let left_id = self.grow(nodes, left, rng);
        let right_id = self.grow(nodes, right, rng);
        nodes[id] = Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left: left_id,
            right: right_id,
        };
        id
    }

    /// Visits features in a random order, evaluating at least `max_features` of them and
    /// continuing past that only while no valid split has been found.
    fn best_split<R: Rng>(&mut self, samples: &[usize], rng: &mut R) -> Option<BestSplit> {
        self.features.shuffle(rng);
        let mut best: Option<BestSplit> = None;
        let mut scratch: Vec<(f64, u8)> = Vec::with_capacity(samples.len());
        for (visited, &feature) in self.features.iter().enumerate() {
            if visited >= self.params.max_features && best.is_some() {
                break;
            }
            scratch.clear();
            scratch.extend(samples.iter().map(|&s| (self.x[[s, feature]], self.y[s])));
            scratch.sort_by(|a, b| a.0.total_cmp(&b.0));
            if let Some((threshold, impurity)) = best_threshold(&scratch) {
                if best.as_ref().map_or(true, |b| impurity < b.impurity) {
                    best = Some(BestSplit {
                        feature,
                        threshold,
                        impurity,
                    });
                }
            }
        }
        best
    }
}

/// Lowest weighted Gini impurity over all cut points between distinct sorted values.
#[allow(clippy::cast_precision_loss)]
fn best_threshold(sorted: &[(f64, u8)]) -> Option<(f64, f64)> {
    let n = sorted.len();
    let total_pos = sorted.iter().filter(|(_, label)| *label == 1).count();
    let mut left_pos = 0;
    let mut best: Option<(f64, f64)> = None;
    for i in 0..n.saturating_sub(1) {
        if sorted[i].1 == 1 {
            left_pos += 1;
        }
        let (lo, hi) = (sorted[i].0, sorted[i + 1].0);
        if lo >= hi {
            continue;
        }
        let n_left = i + 1;
        let n_right = n - n_left;
        let impurity = (n_left as f64 * gini(left_pos, n_left)
            + n_right as f64 * gini(total_pos - left_pos, n_right))
            / n as f64;
        if best.map_or(true, |(_, b)| impurity < b) {
            let mid = lo + (hi - lo) / 2.0;
            let threshold = if mid < hi { mid } else { lo };
            best = Some((threshold, impurity));
        }
    }
    best
}

#[allow(clippy::cast_precision_loss)]
fn gini(positives: usize, n: usize) -> f64 {
    let p = positives as f64 / n as f64;
    2.0 * p * (1.0 - p)
}

/// Stable in-place partition; returns `(matching, rest)`.
fn partition(samples: &mut [usize], pred: impl Fn(usize) -> bool) -> (&mut [usize], &mut [usize]) {
    let mut left: Vec<usize> = Vec::with_capacity(samples.len());
    let mut right: Vec<usize> = Vec::with_capacity(samples.len());
    for &s in samples.iter() {
        if pred(s) {
            left.push(s);
        } else {
            right.push(s);
        }
    }
    let split = left.len();
    for (slot, s) in samples.iter_mut().zip(left.into_iter().chain(right)) {
        *slot = s;
    }
    samples.split_at_mut(split)
}
