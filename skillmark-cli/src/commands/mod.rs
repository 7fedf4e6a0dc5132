pub mod code;
pub mod config;
pub mod grade;
pub mod progress;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use skillmark_grading::InMemoryStore;

/// Location of the JSON store snapshot a command works on.
#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    /// Store snapshot file (defaults to the skillmark data directory)
    #[arg(long, value_name = "PATH")]
    pub store: Option<PathBuf>,
}

impl StoreArgs {
    pub fn path(&self) -> PathBuf {
        self.store
            .clone()
            .unwrap_or_else(skillmark_paths::snapshot_path)
    }

    pub async fn open(&self) -> Result<(Arc<InMemoryStore>, PathBuf)> {
        let path = self.path();
        let store = load_store(&path).await?;
        Ok((store, path))
    }
}

pub async fn load_store(path: &Path) -> Result<Arc<InMemoryStore>> {
    let store = InMemoryStore::load(path)
        .await
        .with_context(|| format!("loading store snapshot {}", path.display()))?;
    Ok(Arc::new(store))
}

pub async fn save_store(store: &InMemoryStore, path: &Path) -> Result<()> {
    store
        .save(path)
        .await
        .with_context(|| format!("saving store snapshot {}", path.display()))
}
