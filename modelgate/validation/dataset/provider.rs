use std::{fmt, time::Duration};

use anyhow::Context;
use gate_logging::LogLevel;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::table::Dataset;
use crate::{
    artifact::write_atomic,
    config::{DatasetConfig, RemoteConfig},
    error::{GateError, GateResult},
    telemetry::{self, ValidationTelemetry},
};

/// Source of the canonical dataset as CSV text.
pub trait RemoteSource: Send + Sync {
    /// Human readable location used in logs and errors.
    fn describe(&self) -> String;

    /// Downloads the full CSV document.
    fn fetch(&self) -> anyhow::Result<String>;
}

/// Blocking HTTP source.
pub struct HttpSource {
    url: String,
    client: reqwest::blocking::Client,
}

impl fmt::Debug for HttpSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpSource").field("url", &self.url).finish()
    }
}

impl HttpSource {
    /// Builds a client with the configured timeout.
    pub fn new(config: &RemoteConfig) -> GateResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|err| GateError::Config(format!("building http client: {err}")))?;
        Ok(Self {
            url: config.url.clone(),
            client,
        })
    }
}

impl RemoteSource for HttpSource {
    fn describe(&self) -> String {
        self.url.clone()
    }

    fn fetch(&self) -> anyhow::Result<String> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .with_context(|| format!("request to {} failed", self.url))?;
        response
            .error_for_status()
            .with_context(|| format!("{} returned an error status", self.url))?
            .text()
            .with_context(|| format!("reading body from {}", self.url))
    }
}

/// Where a loaded dataset came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadOrigin {
    /// Parsed from the existing cache file.
    Cache,
    /// Fetched remotely and written to the cache.
    Remote,
}

/// Cache-first dataset provider.
pub struct DatasetProvider {
    config: DatasetConfig,
    source: Option<Box<dyn RemoteSource>>,
}

impl fmt::Debug for DatasetProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatasetProvider")
            .field("path", &self.config.path)
            .field("source", &self.source.as_ref().map(|s| s.describe()))
            .finish()
    }
}

impl DatasetProvider {
    /// Provider whose fallback is the configured HTTP source, if any.
    pub fn from_config(config: DatasetConfig) -> GateResult<Self> {
        let source = match &config.remote {
            Some(remote) => Some(Box::new(HttpSource::new(remote)?) as Box<dyn RemoteSource>),
            None => None,
        };
        Ok(Self { config, source })
    }

    /// Provider with an explicit fallback source.
    #[must_use]
    pub fn with_source(config: DatasetConfig, source: Option<Box<dyn RemoteSource>>) -> Self {
        Self { config, source }
    }

    /// Cache path.
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        &self.config.path
    }

    /// True when the cache file is present.
    #[must_use]
    pub fn is_cached(&self) -> bool {
        self.config.path.is_file()
    }

    /// Returns a fresh copy of the dataset, fetching and caching it on first use.
    pub fn load(&self, telemetry: Option<&ValidationTelemetry>) -> GateResult<Dataset> {
        self.load_with_origin(telemetry).map(|(dataset, _)| dataset)
    }

    /// Like [`Self::load`], also reporting whether the cache or the remote was used.
    pub fn load_with_origin(
        &self,
        telemetry: Option<&ValidationTelemetry>,
    ) -> GateResult<(Dataset, LoadOrigin)> {
        let path = &self.config.path;
        if self.is_cached() {
            let dataset = Dataset::read_csv(path)?;
            telemetry::log(
                telemetry,
                LogLevel::Info,
                "dataset.cache_hit",
                json!({ "path": path, "rows": dataset.len() }),
            );
            return Ok((dataset, LoadOrigin::Cache));
        }

        let unavailable = |reason: String| GateError::DataUnavailable {
            path: path.clone(),
            reason,
        };
        let source = self
            .source
            .as_ref()
            .ok_or_else(|| unavailable("cache absent and no remote fallback configured".into()))?;
        telemetry::log(
            telemetry,
            LogLevel::Info,
            "dataset.fetch",
            json!({ "path": path, "source": source.describe() }),
        );
        let body = source
            .fetch()
            .map_err(|err| unavailable(format!("{err:#}")))?;
        let dataset = Dataset::from_csv_str(&body).map_err(|err| {
            unavailable(format!("{} returned unusable data: {err}", source.describe()))
        })?;
        write_atomic(path, &dataset.to_csv_bytes()?)?;
        telemetry::log(
            telemetry,
            LogLevel::Info,
            "dataset.cached",
            json!({ "path": path, "rows": dataset.len() }),
        );
        Ok((dataset, LoadOrigin::Remote))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testdata::{synthetic_csv, CountingSource};
    use std::sync::{atomic::Ordering, Arc};
    use tempfile::tempdir;

    fn config(dir: &std::path::Path) -> DatasetConfig {
        DatasetConfig {
            path: dir.join("data/nested/Titanic.csv"),
            remote: None,
        }
    }

    #[test]
    fn second_load_reuses_cache_without_refetch_or_rewrite() {
        let dir = tempdir().unwrap();
        let source = CountingSource::new(synthetic_csv(120, 3));
        let fetches = Arc::clone(&source.fetches);
        let provider = DatasetProvider::with_source(config(dir.path()), Some(Box::new(source)));

        let (first, origin) = provider.load_with_origin(None).unwrap();
        assert_eq!(origin, LoadOrigin::Remote);
        assert!(provider.is_cached());
        let written = std::fs::metadata(provider.path()).unwrap().modified().unwrap();
        let bytes = std::fs::read(provider.path()).unwrap();

        let (second, origin) = provider.load_with_origin(None).unwrap();
        assert_eq!(origin, LoadOrigin::Cache);
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert_eq!(
            std::fs::metadata(provider.path()).unwrap().modified().unwrap(),
            written
        );
        assert_eq!(std::fs::read(provider.path()).unwrap(), bytes);
        assert_eq!(first, second);
    }

    #[test]
    fn missing_cache_without_fallback_is_unavailable() {
        let dir = tempdir().unwrap();
        let provider = DatasetProvider::with_source(config(dir.path()), None);
        let err = provider.load(None).unwrap_err();
        assert!(matches!(err, GateError::DataUnavailable { .. }));
    }

    #[test]
    fn fetch_failure_is_unavailable_and_writes_nothing() {
        let dir = tempdir().unwrap();
        let provider =
            DatasetProvider::with_source(config(dir.path()), Some(Box::new(CountingSource::failing())));
        let err = provider.load(None).unwrap_err();
        match err {
            GateError::DataUnavailable { reason, .. } => assert!(reason.contains("offline")),
            other => panic!("unexpected error {other:?}"),
        }
        assert!(!provider.is_cached());
    }

    #[test]
    fn remote_body_that_is_not_titanic_csv_is_unavailable() {
        let dir = tempdir().unwrap();
        let source = CountingSource::new("<html><body>sign in to continue</body></html>".into());
        let provider = DatasetProvider::with_source(config(dir.path()), Some(Box::new(source)));
        let err = provider.load(None).unwrap_err();
        assert!(matches!(err, GateError::DataUnavailable { ref reason, .. } if reason.contains("unusable")));
        assert!(!provider.is_cached());
    }

    #[test]
    fn corrupt_cache_is_a_schema_error() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        std::fs::create_dir_all(config.path.parent().unwrap()).unwrap();
        std::fs::write(&config.path, "PassengerId,Name\n1,Smith\n").unwrap();
        let provider = DatasetProvider::with_source(config, None);
        assert!(matches!(provider.load(None).unwrap_err(), GateError::Schema(_)));
    }

    #[test]
    fn from_config_builds_http_source() {
        let dir = tempdir().unwrap();
        let mut config = config(dir.path());
        config.remote = Some(RemoteConfig {
            url: "https://example.invalid/titanic.csv".into(),
            timeout_ms: 100,
        });
        let provider = DatasetProvider::from_config(config).unwrap();
        assert!(format!("{provider:?}").contains("example.invalid"));
    }
}
