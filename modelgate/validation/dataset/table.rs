use std::{fs::File, io::Read, path::Path};

use serde::{Deserialize, Serialize};

use super::record::{TitanicRecord, COLUMNS};
use crate::error::{GateError, GateResult};

/// Ordered, schema-validated table of passenger records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    /// Rows in file order.
    pub records: Vec<TitanicRecord>,
}

impl Dataset {
    /// Wraps already validated records.
    #[must_use]
    pub const fn new(records: Vec<TitanicRecord>) -> Self {
        Self { records }
    }

    /// Reads a CSV file with a header row.
    pub fn read_csv(path: impl AsRef<Path>) -> GateResult<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        Self::from_csv_reader(file).map_err(|err| match err {
            GateError::Schema(msg) => GateError::Schema(format!("{}: {msg}", path.display())),
            other => other,
        })
    }

    /// Parses CSV text with a header row. Header names are matched case-insensitively
    /// against [`COLUMNS`]; extra columns (e.g. `Name`, `Ticket`) are dropped.
    pub fn from_csv_reader(reader: impl Read) -> GateResult<Self> {
        let mut csv = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .trim(csv::Trim::All)
            .from_reader(reader);
        let headers = csv.headers()?.clone();
        let mut positions = [0_usize; COLUMNS.len()];
        for (slot, column) in positions.iter_mut().zip(COLUMNS) {
            *slot = headers
                .iter()
                .position(|name| name.eq_ignore_ascii_case(column))
                .ok_or_else(|| GateError::Schema(format!("missing column '{column}'")))?;
        }

        let mut records = Vec::new();
        for (idx, row) in csv.records().enumerate() {
            let row = row?;
            let fields = positions.map(|pos| row.get(pos).unwrap_or(""));
            records.push(TitanicRecord::from_fields(idx + 1, fields)?);
        }
        if records.is_empty() {
            return Err(GateError::Schema("dataset has no rows".into()));
        }
        Ok(Self { records })
    }

    /// Parses CSV from an in-memory string.
    pub fn from_csv_str(text: &str) -> GateResult<Self> {
        Self::from_csv_reader(text.as_bytes())
    }

    /// Serialises the table in [`COLUMNS`] order with a header row.
    pub fn to_csv_bytes(&self) -> GateResult<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(COLUMNS)?;
        for record in &self.records {
            writer.write_record(record.to_fields())?;
        }
        writer
            .into_inner()
            .map_err(|err| GateError::Io(err.into_error()))
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Label column.
    #[must_use]
    pub fn labels(&self) -> Vec<u8> {
        self.records.iter().map(|record| record.survived).collect()
    }

    /// Rows selected by index, in the given order.
    #[must_use]
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            records: indices.iter().map(|&idx| self.records[idx].clone()).collect(),
        }
    }

    /// Fraction of rows labelled 1.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn positive_rate(&self) -> f64 {
        if self.records.is_empty() {
            return 0.0;
        }
        let positives = self.records.iter().filter(|r| r.survived == 1).count();
        positives as f64 / self.records.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KAGGLE_SAMPLE: &str = "\
PassengerId,Survived,Pclass,Name,Sex,Age,SibSp,Parch,Ticket,Fare,Cabin,Embarked
1,0,3,\"Braund, Mr. Owen Harris\",male,22,1,0,A/5 21171,7.25,,S
2,1,1,\"Cumings, Mrs. John Bradley (Florence Briggs Thayer)\",female,38,1,0,PC 17599,71.2833,C85,C
6,0,3,\"Moran, Mr. James\",male,,0,0,330877,8.4583,,Q
62,1,1,\"Icard, Miss. Amelie\",female,38,0,0,113572,80,B28,
";

    #[test]
    fn selects_fixed_columns_from_wider_source() {
        let dataset = Dataset::from_csv_str(KAGGLE_SAMPLE).unwrap();
        assert_eq!(dataset.len(), 4);
        assert_eq!(dataset.records[1].sex, "female");
        assert_eq!(dataset.records[2].age, None);
        assert_eq!(dataset.records[3].embarked, None);
        assert_eq!(dataset.labels(), vec![0, 1, 0, 1]);
        assert!((dataset.positive_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn header_match_is_case_insensitive() {
        let text = "pclass,survived,sex,age,sibsp,parch,fare,embarked\n1,1,female,29,0,0,211.3375,S\n";
        let dataset = Dataset::from_csv_str(text).unwrap();
        assert_eq!(dataset.records[0].fare, Some(211.3375));
    }

    #[test]
    fn missing_column_is_a_schema_error() {
        let err = Dataset::from_csv_str("Pclass,Sex\n1,male\n").unwrap_err();
        assert!(matches!(err, GateError::Schema(msg) if msg.contains("Age")));
    }

    #[test]
    fn csv_rendering_is_lossless() {
        let dataset = Dataset::from_csv_str(KAGGLE_SAMPLE).unwrap();
        let bytes = dataset.to_csv_bytes().unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.starts_with("Pclass,Sex,Age,SibSp,Parch,Fare,Embarked,Survived\n"));
        let reread = Dataset::from_csv_reader(bytes.as_slice()).unwrap();
        assert_eq!(reread, dataset);
    }

    #[test]
    fn select_keeps_requested_order() {
        let dataset = Dataset::from_csv_str(KAGGLE_SAMPLE).unwrap();
        let picked = dataset.select(&[3, 0]);
        assert_eq!(picked.labels(), vec![1, 0]);
    }
}
