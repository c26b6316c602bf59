use serde::{Deserialize, Serialize};

use crate::{
    dataset::record::TitanicRecord,
    error::{GateError, GateResult},
};

/// Numeric input column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NumericColumn {
    /// Passenger age (nullable).
    Age,
    /// Ticket class treated as a number.
    Pclass,
    /// Siblings/spouses aboard.
    SibSp,
    /// Parents/children aboard.
    Parch,
    /// Ticket fare (nullable).
    Fare,
}

impl NumericColumn {
    /// Header name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Age => "Age",
            Self::Pclass => "Pclass",
            Self::SibSp => "SibSp",
            Self::Parch => "Parch",
            Self::Fare => "Fare",
        }
    }

    /// Raw value, `None` when missing.
    #[must_use]
    pub fn value(self, record: &TitanicRecord) -> Option<f64> {
        match self {
            Self::Age => record.age,
            Self::Pclass => Some(f64::from(record.pclass)),
            Self::SibSp => Some(f64::from(record.sib_sp)),
            Self::Parch => Some(f64::from(record.parch)),
            Self::Fare => record.fare,
        }
    }
}

/// Median imputer followed by a standard scaler, fitted on training rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedNumeric {
    column: NumericColumn,
    median: f64,
    mean: f64,
    scale: f64,
}

impl FittedNumeric {
    /// Fits median, mean and population standard deviation. A constant column keeps scale 1.
    #[allow(clippy::cast_precision_loss)]
    pub fn fit(column: NumericColumn, rows: &[TitanicRecord]) -> GateResult<Self> {
        let mut observed: Vec<f64> = rows.iter().filter_map(|r| column.value(r)).collect();
        let median = median(&mut observed).ok_or_else(|| {
            GateError::Training(format!("column {} has no observed values", column.name()))
        })?;
        let imputed: Vec<f64> = rows
            .iter()
            .map(|r| column.value(r).unwrap_or(median))
            .collect();
        let n = imputed.len() as f64;
        let mean = imputed.iter().sum::<f64>() / n;
        let variance = imputed.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let std = variance.sqrt();
        let scale = if std > f64::EPSILON { std } else { 1.0 };
        Ok(Self {
            column,
            median,
            mean,
            scale,
        })
    }

    /// Source column.
    #[must_use]
    pub const fn column(&self) -> NumericColumn {
        self.column
    }

    /// Imputes then standardises one value.
    #[must_use]
    pub fn apply(&self, record: &TitanicRecord) -> f64 {
        let value = self.column.value(record).unwrap_or(self.median);
        (value - self.mean) / self.scale
    }
}

/// Median of the values (mean of the two middle values for even counts).
fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}
