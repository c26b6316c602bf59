use std::{fs, io::Write, path::Path};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;

use crate::{
    error::{GateError, GateResult},
    model::Model,
};

/// Format tag of artifacts written by [`crate::ForestPipeline`].
pub const FOREST_FORMAT: &str = "modelgate.forest-pipeline";

/// Current artifact envelope version.
pub const ARTIFACT_VERSION: u32 = 1;

/// Versioned JSON envelope around a serialized model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    /// Model family tag.
    pub format: String,
    /// Envelope version.
    pub version: u32,
    /// Opaque model payload.
    pub model: Value,
}

impl ModelArtifact {
    /// Wraps a serializable model.
    pub fn wrap<T: Serialize>(format: &str, model: &T) -> GateResult<Self> {
        Ok(Self {
            format: format.to_string(),
            version: ARTIFACT_VERSION,
            model: serde_json::to_value(model)?,
        })
    }

    /// Unwraps the payload after checking the format tag and version.
    pub fn unwrap_as<T: for<'de> Deserialize<'de>>(self, format: &str) -> GateResult<T> {
        if self.format != format {
            return Err(GateError::Artifact(format!(
                "expected {format} artifact, found {}",
                self.format
            )));
        }
        if self.version != ARTIFACT_VERSION {
            return Err(GateError::Artifact(format!(
                "unsupported {format} artifact version {}",
                self.version
            )));
        }
        serde_json::from_value(self.model).map_err(|err| GateError::Artifact(err.to_string()))
    }

    /// Encodes the envelope.
    pub fn to_bytes(&self) -> GateResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes an envelope.
    pub fn from_bytes(bytes: &[u8]) -> GateResult<Self> {
        serde_json::from_slice(bytes).map_err(|err| GateError::Artifact(err.to_string()))
    }
}

/// Replaces `path` with `bytes`: writes a sibling temp file, fsyncs it, renames it into place.
///
/// Readers see either the previous content or the new content, never a partial file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> GateResult<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|err| GateError::Io(err.error))?;
    Ok(())
}

/// Serializes `model` and atomically writes it to `path`.
pub fn save_model<M: Model>(path: &Path, model: &M) -> GateResult<()> {
    write_atomic(path, &model.serialize()?)
}

/// Loads a model from `path`; `Ok(None)` when the file does not exist.
pub fn load_model<M: Model>(path: &Path) -> GateResult<Option<M>> {
    match fs::read(path) {
        Ok(bytes) => M::deserialize(&bytes).map(Some),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testdata::FixedModel;
    use tempfile::tempdir;

    #[test]
    fn atomic_write_replaces_and_leaves_no_temp_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("models/out.json");
        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"second");
        let entries = fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn load_missing_model_is_none() {
        let dir = tempdir().unwrap();
        let loaded: Option<FixedModel> = load_model(&dir.path().join("absent.json")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn saved_model_loads_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.json");
        save_model(&path, &FixedModel::Constant(1)).unwrap();
        let loaded: FixedModel = load_model(&path).unwrap().unwrap();
        assert_eq!(loaded, FixedModel::Constant(1));
    }

    #[test]
    fn envelope_rejects_foreign_format_and_version() {
        let artifact = ModelArtifact::wrap(FOREST_FORMAT, &vec![1, 2, 3]).unwrap();
        let bytes = artifact.to_bytes().unwrap();
        let decoded = ModelArtifact::from_bytes(&bytes).unwrap();
        assert!(decoded.clone().unwrap_as::<Vec<u8>>("other.format").is_err());
        let mut future = decoded;
        future.version = ARTIFACT_VERSION + 1;
        assert!(future.unwrap_as::<Vec<u8>>(FOREST_FORMAT).is_err());
    }
}
