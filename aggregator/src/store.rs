use std::path::{Path, PathBuf};

use anyhow::Context;
use cluster_aggregator_model::{parse_definitions, DefinitionSet};
use cluster_aggregator_runner::prelude::DefinitionStore;
use futures::future::BoxFuture;
use futures::FutureExt;

/// Definitions kept in a TOML file of `[[cluster]]` tables.
///
/// The file is read again on every call, so edits are picked up at the next reconciliation.
#[derive(Debug, Clone)]
pub struct FileDefinitionStore {
    path: PathBuf,
}

impl FileDefinitionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn read(&self) -> anyhow::Result<DefinitionSet> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read definitions from {}", self.path.display()))?;

        parse_definitions(&content)
            .with_context(|| format!("Invalid definitions in {}", self.path.display()))
    }
}

impl DefinitionStore for FileDefinitionStore {
    fn read_all_active_definitions(&self) -> BoxFuture<'_, anyhow::Result<DefinitionSet>> {
        self.read().boxed()
    }
}
