//! Seeded Titanic-shaped fixtures so tests never touch the network.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::{
    dataset::{provider::RemoteSource, record::TitanicRecord, table::Dataset},
    error::{GateError, GateResult},
    model::Model,
};

/// Passengers whose survival follows sex, class and age with 2% label noise.
pub fn synthetic_dataset(rows: usize, seed: u64) -> Dataset {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let records = (0..rows)
        .map(|_| {
            let pclass: u8 = match rng.gen_range(0..10) {
                0..=2 => 1,
                3..=4 => 2,
                _ => 3,
            };
            let female = rng.gen_bool(0.4);
            let age = if rng.gen_bool(0.15) {
                None
            } else {
                Some(f64::from(rng.gen_range(1_u32..70)))
            };
            let base_fare = match pclass {
                1 => 80.0,
                2 => 25.0,
                _ => 9.0,
            };
            let fare = Some((base_fare * rng.gen_range(0.6..1.6) * 100.0_f64).round() / 100.0);
            let embarked = match rng.gen_range(0..100) {
                0 => None,
                1..=20 => Some("C".to_string()),
                21..=30 => Some("Q".to_string()),
                _ => Some("S".to_string()),
            };
            let child = age.is_some_and(|a| a < 10.0);
            let mut survived = u8::from((female && pclass <= 2) || child);
            if rng.gen_bool(0.02) {
                survived = 1 - survived;
            }
            TitanicRecord {
                pclass,
                sex: if female { "female" } else { "male" }.to_string(),
                age,
                sib_sp: rng.gen_range(0..3),
                parch: rng.gen_range(0..3),
                fare,
                embarked,
                survived,
            }
        })
        .collect();
    Dataset::new(records)
}

/// Same feature distribution as [`synthetic_dataset`] with coin-flip labels.
pub fn random_label_dataset(rows: usize, seed: u64) -> Dataset {
    let mut dataset = synthetic_dataset(rows, seed);
    let mut rng = ChaCha8Rng::seed_from_u64(seed ^ 0x5eed);
    for record in &mut dataset.records {
        record.survived = u8::from(rng.gen_bool(0.5));
    }
    dataset
}

/// Kaggle-style CSV (extra columns, quoted names) for [`synthetic_dataset`].
pub fn synthetic_csv(rows: usize, seed: u64) -> String {
    let dataset = synthetic_dataset(rows, seed);
    let mut out =
        String::from("PassengerId,Survived,Pclass,Name,Sex,Age,SibSp,Parch,Ticket,Fare,Cabin,Embarked\n");
    for (idx, record) in dataset.records.iter().enumerate() {
        let [pclass, sex, age, sib_sp, parch, fare, embarked, survived] = record.to_fields();
        out.push_str(&format!(
            "{},{survived},{pclass},\"Passenger, No. {idx}\",{sex},{age},{sib_sp},{parch},T{idx},{fare},,{embarked}\n",
            idx + 1
        ));
    }
    out
}

/// Remote source that counts fetches.
pub struct CountingSource {
    body: Option<String>,
    pub fetches: Arc<AtomicUsize>,
}

impl CountingSource {
    pub fn new(body: String) -> Self {
        Self {
            body: Some(body),
            fetches: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing() -> Self {
        Self {
            body: None,
            fetches: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl RemoteSource for CountingSource {
    fn describe(&self) -> String {
        "memory://titanic.csv".into()
    }

    fn fetch(&self) -> anyhow::Result<String> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.body
            .clone()
            .ok_or_else(|| anyhow::anyhow!("network offline"))
    }
}

/// Model that ignores features and answers with a fixed label, or with the true label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FixedModel {
    /// Always predicts this class.
    Constant(u8),
    /// Predicts the recorded label.
    Oracle,
}

impl Model for FixedModel {
    fn fit(&mut self, _rows: &Dataset) -> GateResult<()> {
        Ok(())
    }

    fn predict(&self, rows: &[TitanicRecord]) -> GateResult<Vec<u8>> {
        Ok(rows
            .iter()
            .map(|row| match self {
                Self::Constant(class) => *class,
                Self::Oracle => row.survived,
            })
            .collect())
    }

    fn serialize(&self) -> GateResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    fn deserialize(bytes: &[u8]) -> GateResult<Self> {
        serde_json::from_slice(bytes).map_err(|err| GateError::Artifact(err.to_string()))
    }
}
