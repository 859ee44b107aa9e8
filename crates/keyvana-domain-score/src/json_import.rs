use crate::model::{Position, PositionSource, ScoreError, ScorePositions};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const POSITIONS_SCHEMA_VERSION: &str = "1";

/// On-disk form of a position list, as exported by the notation renderer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PositionsFile {
    pub schema_version: String,
    pub title: Option<String>,
    pub positions: Vec<Position>,
}

pub fn import_positions_json(data: &[u8]) -> Result<ScorePositions, ScoreError> {
    let file: PositionsFile =
        serde_json::from_slice(data).map_err(|e| ScoreError::Parse(e.to_string()))?;
    if file.schema_version != POSITIONS_SCHEMA_VERSION {
        return Err(ScoreError::Parse(format!(
            "unsupported schema version {}",
            file.schema_version
        )));
    }
    ScorePositions::new(file.positions)
}

pub fn import_positions_path(path: &Path) -> Result<ScorePositions, ScoreError> {
    let data = fs::read(path).map_err(|e| ScoreError::Io(e.to_string()))?;
    import_positions_json(&data)
}

/// A `PositionSource` backed by a JSON file; every call re-reads the file.
#[derive(Clone, Debug)]
pub struct JsonPositionsFile {
    path: PathBuf,
}

impl JsonPositionsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PositionSource for JsonPositionsFile {
    fn derive_positions(&self) -> Result<Vec<Position>, ScoreError> {
        let data = fs::read(&self.path).map_err(|e| ScoreError::Io(e.to_string()))?;
        let file: PositionsFile =
            serde_json::from_slice(&data).map_err(|e| ScoreError::Parse(e.to_string()))?;
        Ok(file.positions)
    }

    fn load(&self) -> Result<ScorePositions, ScoreError> {
        import_positions_path(&self.path)
    }
}
