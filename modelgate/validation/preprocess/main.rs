//! Column-wise preprocessing: median imputation + standard scaling for numeric
//! columns, mode imputation + one-hot encoding for categorical columns.

/// Numeric column group.
pub mod numeric;
/// Categorical column group.
pub mod categorical;

use gate_logging::LogLevel;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use serde_json::json;

pub use categorical::{CategoricalColumn, FittedCategorical};
pub use numeric::{FittedNumeric, NumericColumn};

use crate::{
    dataset::record::TitanicRecord,
    error::{GateError, GateResult},
    telemetry::{self, ValidationTelemetry},
};

/// Declarative preprocessing definition. Holds no fitted state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreprocessorSpec {
    /// Numeric columns, in output order.
    pub numeric: Vec<NumericColumn>,
    /// Categorical columns, in output order after the numeric block.
    pub categorical: Vec<CategoricalColumn>,
}

/// The reference column groups: {Age, Pclass, SibSp, Parch, Fare} and {Sex, Embarked}.
#[must_use]
pub fn build_preprocessor() -> PreprocessorSpec {
    PreprocessorSpec {
        numeric: vec![
            NumericColumn::Age,
            NumericColumn::Pclass,
            NumericColumn::SibSp,
            NumericColumn::Parch,
            NumericColumn::Fare,
        ],
        categorical: vec![CategoricalColumn::Sex, CategoricalColumn::Embarked],
    }
}

impl PreprocessorSpec {
    /// Learns imputation values, scaling parameters and category sets from training rows.
    pub fn fit(&self, rows: &[TitanicRecord]) -> GateResult<FittedPreprocessor> {
        self.fit_with_telemetry(rows, None)
    }

    /// [`Self::fit`] with optional telemetry.
    pub fn fit_with_telemetry(
        &self,
        rows: &[TitanicRecord],
        telemetry: Option<&ValidationTelemetry>,
    ) -> GateResult<FittedPreprocessor> {
        if rows.is_empty() {
            return Err(GateError::Training(
                "cannot fit preprocessor on zero rows".into(),
            ));
        }
        let numeric = self
            .numeric
            .iter()
            .map(|&column| FittedNumeric::fit(column, rows))
            .collect::<GateResult<Vec<_>>>()?;
        let categorical = self
            .categorical
            .iter()
            .map(|&column| FittedCategorical::fit(column, rows))
            .collect::<GateResult<Vec<_>>>()?;
        let fitted = FittedPreprocessor {
            numeric,
            categorical,
        };
        telemetry::log(
            telemetry,
            LogLevel::Debug,
            "preprocess.fitted",
            json!({ "rows": rows.len(), "features": fitted.feature_names() }),
        );
        Ok(fitted)
    }
}

/// Fitted transformer producing a fixed-width feature matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedPreprocessor {
    numeric: Vec<FittedNumeric>,
    categorical: Vec<FittedCategorical>,
}

impl FittedPreprocessor {
    /// Output width.
    #[must_use]
    pub fn width(&self) -> usize {
        self.numeric.len() + self.categorical.iter().map(FittedCategorical::width).sum::<usize>()
    }

    /// Output column names (`Age`, ..., `Sex_female`, `Embarked_S`, ...).
    #[must_use]
    pub fn feature_names(&self) -> Vec<String> {
        self.numeric
            .iter()
            .map(|n| n.column().name().to_string())
            .chain(self.categorical.iter().flat_map(FittedCategorical::feature_names))
            .collect()
    }

    /// Transforms rows into a `rows x width` matrix. Unknown categories encode as zeros.
    #[must_use]
    pub fn transform(&self, rows: &[TitanicRecord]) -> Array2<f64> {
        let mut matrix = Array2::zeros((rows.len(), self.width()));
        for (mut out, record) in matrix.rows_mut().into_iter().zip(rows) {
            let mut col = 0;
            for numeric in &self.numeric {
                out[col] = numeric.apply(record);
                col += 1;
            }
            for categorical in &self.categorical {
                if let Some(hot) = categorical.index_of(record) {
                    out[col + hot] = 1.0;
                }
                col += categorical.width();
            }
        }
        matrix
    }
}
