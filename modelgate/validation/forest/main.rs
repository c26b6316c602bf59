//! Bootstrap random forest of CART trees.
//!
//! Every tree draws its own seed from a master ChaCha8 stream, so a forest is a
//! pure function of the training matrix, the labels and the forest seed.

/// CART decision tree.
pub mod tree;

use gate_logging::LogLevel;
use ndarray::{ArrayView1, ArrayView2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    error::{GateError, GateResult},
    telemetry::{self, ValidationTelemetry},
};
use tree::{DecisionTree, TreeParams};

/// Forest hyperparameters. Fixed per run; there is no search over them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForestParams {
    /// Number of trees.
    pub n_estimators: usize,
    /// Master seed.
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            seed: 42,
        }
    }
}

/// Fitted binary random forest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    params: ForestParams,
    trees: Vec<DecisionTree>,
    n_features: usize,
}

impl RandomForest {
    /// Fits `n_estimators` trees on bootstrap samples with `floor(sqrt(n_features))`
    /// candidate features per node.
    pub fn fit(
        x: ArrayView2<'_, f64>,
        y: &[u8],
        params: ForestParams,
        telemetry: Option<&ValidationTelemetry>,
    ) -> GateResult<Self> {
        let (rows, n_features) = x.dim();
        if rows == 0 || n_features == 0 {
            return Err(GateError::Training(format!(
                "cannot fit forest on a {rows}x{n_features} matrix"
            )));
        }
        if rows != y.len() {
            return Err(GateError::Training(format!(
                "{rows} feature rows but {} labels",
                y.len()
            )));
        }
        if params.n_estimators == 0 {
            return Err(GateError::Training("n_estimators must be at least 1".into()));
        }
        let tree_params = TreeParams {
            max_features: max_features(n_features),
            min_samples_split: 2,
        };
        let mut master = ChaCha8Rng::seed_from_u64(params.seed);
        let trees: Vec<DecisionTree> = (0..params.n_estimators)
            .map(|_| {
                let mut rng = ChaCha8Rng::seed_from_u64(master.gen());
                let bootstrap: Vec<usize> = (0..rows).map(|_| rng.gen_range(0..rows)).collect();
                DecisionTree::fit(x, y, &bootstrap, tree_params, &mut rng)
            })
            .collect();
        let forest = Self {
            params,
            trees,
            n_features,
        };
        telemetry::log(
            telemetry,
            LogLevel::Debug,
            "forest.fitted",
            json!({
                "trees": forest.trees.len(),
                "max_features": tree_params.max_features,
                "avg_depth": forest.avg_depth(),
                "nodes": forest.total_nodes(),
            }),
        );
        Ok(forest)
    }

    /// Mean class-1 probability across trees for one row.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn predict_proba_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        let total: f64 = self.trees.iter().map(|tree| tree.predict_proba(row)).sum();
        total / self.trees.len() as f64
    }

    /// Class per row; ties go to class 0.
    pub fn predict(&self, x: ArrayView2<'_, f64>) -> GateResult<Vec<u8>> {
        if x.ncols() != self.n_features {
            return Err(GateError::Artifact(format!(
                "forest expects {} features, got {}",
                self.n_features,
                x.ncols()
            )));
        }
        Ok(x
            .rows()
            .into_iter()
            .map(|row| u8::from(self.predict_proba_row(row) > 0.5))
            .collect())
    }

    /// Number of trees.
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Average tree depth.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn avg_depth(&self) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        let total: usize = self.trees.iter().map(DecisionTree::depth).sum();
        total as f64 / self.trees.len() as f64
    }

    /// Total node count across trees.
    #[must_use]
    pub fn total_nodes(&self) -> usize {
        self.trees.iter().map(DecisionTree::n_nodes).sum()
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn max_features(n_features: usize) -> usize {
    ((n_features as f64).sqrt().floor() as usize).max(1)
}
