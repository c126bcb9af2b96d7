use crate::error::{Result, StemError};
use directories::ProjectDirs;
use std::path::PathBuf;

pub fn models_cache_dir() -> Result<PathBuf> {
    let proj = ProjectDirs::from("dev", "StemSplitter", "stem-splitter")
        .ok_or(StemError::CacheDirUnavailable)?;
    Ok(proj.cache_dir().join("models"))
}
