use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    dataset::record::TitanicRecord,
    error::{GateError, GateResult},
};

/// Categorical input column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CategoricalColumn {
    /// Passenger sex.
    Sex,
    /// Port of embarkation (nullable).
    Embarked,
}

impl CategoricalColumn {
    /// Header name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sex => "Sex",
            Self::Embarked => "Embarked",
        }
    }

    /// Raw category, `None` when missing.
    #[must_use]
    pub fn value(self, record: &TitanicRecord) -> Option<&str> {
        match self {
            Self::Sex => Some(record.sex.as_str()).filter(|s| !s.is_empty()),
            Self::Embarked => record.embarked.as_deref(),
        }
    }
}

/// Most-frequent imputer followed by a one-hot encoder over sorted training categories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FittedCategorical {
    column: CategoricalColumn,
    mode: String,
    categories: Vec<String>,
}

impl FittedCategorical {
    /// Fits the mode (ties go to the smallest category) and the category list.
    pub fn fit(column: CategoricalColumn, rows: &[TitanicRecord]) -> GateResult<Self> {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for value in rows.iter().filter_map(|r| column.value(r)) {
            *counts.entry(value).or_default() += 1;
        }
        // BTreeMap iterates in ascending order, so keeping strictly greater counts picks the
        // smallest category among ties.
        let mode = counts
            .iter()
            .fold(None::<(&str, usize)>, |best, (&value, &count)| match best {
                Some((_, top)) if top >= count => best,
                _ => Some((value, count)),
            })
            .map(|(value, _)| value.to_string())
            .ok_or_else(|| {
                GateError::Training(format!("column {} has no observed values", column.name()))
            })?;
        let categories = counts.keys().map(|value| (*value).to_string()).collect();
        Ok(Self {
            column,
            mode,
            categories,
        })
    }

    /// Number of one-hot columns.
    #[must_use]
    pub fn width(&self) -> usize {
        self.categories.len()
    }

    /// One-hot column names, e.g. `Embarked_S`.
    #[must_use]
    pub fn feature_names(&self) -> Vec<String> {
        self.categories
            .iter()
            .map(|category| format!("{}_{category}", self.column.name()))
            .collect()
    }

    /// Position of the record's (imputed) category, `None` for categories unseen in training.
    #[must_use]
    pub fn index_of(&self, record: &TitanicRecord) -> Option<usize> {
        let value = self.column.value(record).unwrap_or(self.mode.as_str());
        self.categories
            .binary_search_by(|category| category.as_str().cmp(value))
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn embarked(port: Option<&str>) -> TitanicRecord {
        TitanicRecord {
            pclass: 3,
            sex: "male".into(),
            age: None,
            sib_sp: 0,
            parch: 0,
            fare: None,
            embarked: port.map(Into::into),
            survived: 0,
        }
    }

    #[test]
    fn mode_prefers_most_frequent_then_smallest() {
        let rows = vec![
            embarked(Some("S")),
            embarked(Some("Q")),
            embarked(Some("S")),
            embarked(None),
        ];
        let fitted = FittedCategorical::fit(CategoricalColumn::Embarked, &rows).unwrap();
        assert_eq!(fitted.mode, "S");
        assert_eq!(fitted.index_of(&embarked(None)), Some(1));

        let tied = vec![embarked(Some("S")), embarked(Some("C"))];
        let fitted = FittedCategorical::fit(CategoricalColumn::Embarked, &tied).unwrap();
        assert_eq!(fitted.mode, "C");
    }

    #[test]
    fn unknown_category_has_no_index() {
        let rows = vec![embarked(Some("S"))];
        let fitted = FittedCategorical::fit(CategoricalColumn::Embarked, &rows).unwrap();
        assert_eq!(fitted.index_of(&embarked(Some("X"))), None);
        assert_eq!(fitted.feature_names(), vec!["Embarked_S"]);
    }

    #[test]
    fn all_missing_column_is_rejected() {
        let rows = vec![embarked(None)];
        assert!(FittedCategorical::fit(CategoricalColumn::Embarked, &rows).is_err());
    }
}
