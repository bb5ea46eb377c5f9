//! Directory-backed config renderer.

use std::path::PathBuf;

use async_trait::async_trait;
use herd_converge::render::ConfigRenderer;
use herd_converge::{ClusterParams, Error, NodeSpec};

/// Serves `<dir>/node/<host>.yaml` when present, else `<dir>/<role>.yaml`.
pub struct DirectoryRenderer {
    dir: PathBuf,
}

impl DirectoryRenderer {
    /// Create a new renderer rooted at the config directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn candidates(&self, node: &NodeSpec) -> [PathBuf; 2] {
        [
            self.dir.join("node").join(format!("{}.yaml", node.host)),
            self.dir.join(format!("{}.yaml", node.role)),
        ]
    }
}

#[async_trait]
impl ConfigRenderer for DirectoryRenderer {
    async fn render(&self, _cluster: &ClusterParams, node: &NodeSpec) -> Result<Vec<u8>, Error> {
        for path in self.candidates(node) {
            match tokio::fs::read(&path).await {
                Ok(contents) => return Ok(contents),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(Error::Render(format!("read {}: {e}", path.display()))),
            }
        }

        Err(Error::Render(format!(
            "no configuration for {} in {}",
            node.host,
            self.dir.display()
        )))
    }
}
