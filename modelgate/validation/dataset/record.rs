use serde::{Deserialize, Serialize};

use crate::error::{GateError, GateResult};

/// Cache column order. The header row must name every column (case-insensitive).
pub const COLUMNS: [&str; 8] = [
    "Pclass", "Sex", "Age", "SibSp", "Parch", "Fare", "Embarked", "Survived",
];

/// Label column name.
pub const LABEL: &str = "Survived";

/// One passenger row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TitanicRecord {
    /// Ticket class, 1 to 3.
    pub pclass: u8,
    /// Sex category as written in the source.
    pub sex: String,
    /// Age in years, when known.
    pub age: Option<f64>,
    /// Siblings/spouses aboard.
    pub sib_sp: u32,
    /// Parents/children aboard.
    pub parch: u32,
    /// Ticket fare, when known.
    pub fare: Option<f64>,
    /// Port of embarkation, when known.
    pub embarked: Option<String>,
    /// Binary label.
    pub survived: u8,
}

impl TitanicRecord {
    /// Parses one row given its raw cells in [`COLUMNS`] order. `row` is 1-based for messages.
    pub fn from_fields(row: usize, fields: [&str; 8]) -> GateResult<Self> {
        let [pclass, sex, age, sib_sp, parch, fare, embarked, survived] = fields.map(str::trim);
        let pclass = parse_count(row, "Pclass", pclass)?;
        if !(1..=3).contains(&pclass) {
            return Err(schema(row, "Pclass", pclass, "expected 1, 2 or 3"));
        }
        if is_missing(sex) {
            return Err(schema(row, "Sex", sex, "value required"));
        }
        Ok(Self {
            pclass: u8::try_from(pclass).map_err(|_| schema(row, "Pclass", pclass, "out of range"))?,
            sex: sex.to_string(),
            age: parse_optional_float(row, "Age", age)?,
            sib_sp: parse_count(row, "SibSp", sib_sp)?,
            parch: parse_count(row, "Parch", parch)?,
            fare: parse_optional_float(row, "Fare", fare)?,
            embarked: (!is_missing(embarked)).then(|| embarked.to_string()),
            survived: parse_label(row, survived)?,
        })
    }

    /// Renders the row in [`COLUMNS`] order; missing values become empty cells.
    #[must_use]
    pub fn to_fields(&self) -> [String; 8] {
        [
            self.pclass.to_string(),
            self.sex.clone(),
            self.age.map(|v| v.to_string()).unwrap_or_default(),
            self.sib_sp.to_string(),
            self.parch.to_string(),
            self.fare.map(|v| v.to_string()).unwrap_or_default(),
            self.embarked.clone().unwrap_or_default(),
            self.survived.to_string(),
        ]
    }
}

fn is_missing(raw: &str) -> bool {
    matches!(raw, "" | "?" | "NA" | "NaN" | "nan" | "null")
}

fn schema(row: usize, column: &str, raw: impl std::fmt::Display, why: &str) -> GateError {
    GateError::Schema(format!("row {row}, column {column}: '{raw}' {why}"))
}

fn parse_optional_float(row: usize, column: &str, raw: &str) -> GateResult<Option<f64>> {
    if is_missing(raw) {
        return Ok(None);
    }
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(Some(value)),
        _ => Err(schema(row, column, raw, "is not a number")),
    }
}

/// Non-negative integer, accepting float spellings such as `3.0`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn parse_count(row: usize, column: &str, raw: &str) -> GateResult<u32> {
    let value: f64 = raw
        .parse()
        .map_err(|_| schema(row, column, raw, "is not an integer"))?;
    if value.fract() != 0.0 || !(0.0..=f64::from(u32::MAX)).contains(&value) {
        return Err(schema(row, column, raw, "is not a non-negative integer"));
    }
    Ok(value as u32)
}

fn parse_label(row: usize, raw: &str) -> GateResult<u8> {
    match raw.to_ascii_lowercase().as_str() {
        "0" | "0.0" | "false" => Ok(0),
        "1" | "1.0" | "true" => Ok(1),
        _ => Err(schema(row, LABEL, raw, "is not coercible to 0/1")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_complete_row() {
        let record =
            TitanicRecord::from_fields(1, ["3", "male", "22", "1", "0", "7.25", "S", "0"]).unwrap();
        assert_eq!(record.pclass, 3);
        assert_eq!(record.age, Some(22.0));
        assert_eq!(record.embarked.as_deref(), Some("S"));
        assert_eq!(record.survived, 0);
    }

    #[test]
    fn treats_blank_cells_as_missing() {
        let record =
            TitanicRecord::from_fields(2, ["1.0", "female", "", "0", "0", "?", " ", "1.0"]).unwrap();
        assert_eq!(record.pclass, 1);
        assert_eq!(record.age, None);
        assert_eq!(record.fare, None);
        assert_eq!(record.embarked, None);
        assert_eq!(record.survived, 1);
    }

    #[test]
    fn rejects_bad_label_and_class() {
        let err = TitanicRecord::from_fields(5, ["3", "male", "1", "0", "0", "1", "S", "2"])
            .unwrap_err();
        assert!(err.to_string().contains("row 5, column Survived"));
        assert!(TitanicRecord::from_fields(6, ["4", "male", "1", "0", "0", "1", "S", "0"]).is_err());
        assert!(TitanicRecord::from_fields(7, ["1", "", "1", "0", "0", "1", "S", "0"]).is_err());
        assert!(TitanicRecord::from_fields(8, ["1", "male", "1", "-1", "0", "1", "S", "0"]).is_err());
    }

    #[test]
    fn fields_render_missing_as_empty() {
        let record =
            TitanicRecord::from_fields(1, ["2", "female", "", "0", "2", "26.5", "", "1"]).unwrap();
        let fields = record.to_fields();
        assert_eq!(fields[2], "");
        assert_eq!(fields[5], "26.5");
        assert_eq!(fields[6], "");
    }
}
