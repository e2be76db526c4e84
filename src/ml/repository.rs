use crate::error::{AppError, Result};
use crate::ml::pipeline::FalseAlarmPipeline;
use crate::models::FeatureInfo;
use parking_lot::RwLock;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Storage for the persisted pipeline artifact
pub trait ModelRepository: Send + Sync {
    /// Load the stored pipeline; `Ok(None)` when nothing has been stored yet
    fn load(&self) -> Result<Option<FalseAlarmPipeline>>;

    /// Store a pipeline, replacing any previous one
    fn save(&self, pipeline: &FalseAlarmPipeline) -> Result<()>;

    /// Delete the stored pipeline; a no-op when nothing is stored
    fn remove(&self) -> Result<()>;

    /// Human-readable location, for logs
    fn location(&self) -> String;
}

/// Pipeline artifact on the local filesystem
#[derive(Debug, Clone)]
pub struct FileModelRepository {
    path: PathBuf,
}

impl FileModelRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ModelRepository for FileModelRepository {
    fn load(&self) -> Result<Option<FalseAlarmPipeline>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        debug!(path = %self.path.display(), bytes = bytes.len(), "Read model artifact");
        FalseAlarmPipeline::from_bytes(&bytes).map(Some)
    }

    fn save(&self, pipeline: &FalseAlarmPipeline) -> Result<()> {
        let bytes = pipeline.to_bytes()?;
        write_atomic(&self.path, &bytes)
    }

    fn remove(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// Pipeline artifact kept in memory, in its serialized form
#[derive(Debug, Default)]
pub struct InMemoryModelRepository {
    artifact: RwLock<Option<Vec<u8>>>,
}

impl InMemoryModelRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.artifact.read().is_none()
    }
}

impl ModelRepository for InMemoryModelRepository {
    fn load(&self) -> Result<Option<FalseAlarmPipeline>> {
        match self.artifact.read().as_deref() {
            Some(bytes) => FalseAlarmPipeline::from_bytes(bytes).map(Some),
            None => Ok(None),
        }
    }

    fn save(&self, pipeline: &FalseAlarmPipeline) -> Result<()> {
        let bytes = pipeline.to_bytes()?;
        *self.artifact.write() = Some(bytes);
        Ok(())
    }

    fn remove(&self) -> Result<()> {
        *self.artifact.write() = None;
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}

/// Read a previously written closed-vocabulary document
pub fn read_feature_info(path: &Path) -> Result<FeatureInfo> {
    let json = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&json)?)
}

/// Bytes written to a sibling temp file, moved over the target on `commit`.
///
/// Dropping an uncommitted file deletes the temp file.
pub(crate) struct StagedFile {
    path: PathBuf,
    tmp_path: PathBuf,
    committed: bool,
}

impl StagedFile {
    pub(crate) fn write(path: &Path, bytes: &[u8]) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let file_name = path
            .file_name()
            .ok_or_else(|| AppError::Configuration(format!("Invalid artifact path: {}", path.display())))?;
        let mut tmp_name = file_name.to_os_string();
        tmp_name.push(".tmp");

        let staged = Self {
            path: path.to_path_buf(),
            tmp_path: path.with_file_name(tmp_name),
            committed: false,
        };
        fs::write(&staged.tmp_path, bytes)?;
        Ok(staged)
    }

    pub(crate) fn commit(mut self) -> Result<()> {
        fs::rename(&self.tmp_path, &self.path)?;
        self.committed = true;
        debug!(path = %self.path.display(), "Wrote artifact");
        Ok(())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.tmp_path);
        }
    }
}

/// Write to a sibling temp file, then rename over the target
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    StagedFile::write(path, bytes)?.commit()
}
