//! Reading and writing the stage artifacts.
//!
//! Every artifact is UTF-8, pretty-printed with two-space indentation and
//! non-ASCII text kept as-is. Writes replace the whole file.

use crate::error::ArtifactError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info, instrument};

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ArtifactError + '_ {
    move |source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    }
}

async fn ensure_parent(path: &Path) -> Result<(), ArtifactError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await.map_err(io_error(parent))?;
    }
    Ok(())
}

/// Serialize `value` and write it to `path`, creating parent directories.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn write_artifact<T>(path: &Path, value: &T) -> Result<(), ArtifactError>
where
    T: Serialize + ?Sized,
{
    let json = serde_json::to_string_pretty(value).map_err(|source| ArtifactError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    ensure_parent(path).await?;
    fs::write(path, json).await.map_err(io_error(path))?;
    info!("Wrote artifact");
    Ok(())
}

/// Write plain text verbatim (used for the raw report fallback).
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn write_text(path: &Path, text: &str) -> Result<(), ArtifactError> {
    ensure_parent(path).await?;
    fs::write(path, text).await.map_err(io_error(path))?;
    info!(bytes = text.len(), "Wrote text file");
    Ok(())
}

/// Read and decode a JSON artifact.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub async fn read_artifact<T>(path: &Path) -> Result<T, ArtifactError>
where
    T: DeserializeOwned,
{
    let text = fs::read_to_string(path).await.map_err(io_error(path))?;
    let value = serde_json::from_str(&text).map_err(|source| ArtifactError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(bytes = text.len(), "Read artifact");
    Ok(value)
}
