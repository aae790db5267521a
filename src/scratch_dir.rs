use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context};
use tempfile::{Builder, TempDir};

/// Private directory holding the chunks of one sort, removed when dropped.
pub(crate) struct ScratchDir {
    dir: TempDir,
}

impl ScratchDir {
    /// Create a uniquely named directory under `parent`, creating `parent` if needed
    pub(crate) fn new(parent: &Path, prefix: &str) -> Result<ScratchDir, anyhow::Error> {
        fs::create_dir_all(parent)
            .with_context(|| anyhow!("path: {}", parent.display()))?;
        let dir = Builder::new()
            .prefix(prefix)
            .tempdir_in(parent)
            .with_context(|| anyhow!("Failed to create scratch directory in {}", parent.display()))?;
        log::info!("Created scratch directory {}", dir.path().display());
        Ok(
            ScratchDir {
                dir,
            }
        )
    }

    pub(crate) fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Remove the directory and everything left in it, reporting failures that drop would hide
    pub(crate) fn close(self) -> Result<(), anyhow::Error> {
        let path = self.dir.path().to_path_buf();
        self.dir.close()
            .with_context(|| anyhow!("Failed to remove scratch directory {}", path.display()))?;
        log::info!("Removed scratch directory {}", path.display());
        Ok(())
    }
}
