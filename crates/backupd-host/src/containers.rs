use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::error::Result;
use crate::exec::ToolCommand;

/// Brings the containers behind a data directory down and back up.
#[async_trait]
pub trait ContainerLifecycle: Send + Sync {
    /// Stop the application rooted at `path`.
    async fn stop(&self, path: &Path) -> Result<()>;

    /// Start the application rooted at `path`.
    async fn start(&self, path: &Path) -> Result<()>;
}

/// [`ContainerLifecycle`] driving `docker compose` in the application's
/// directory.
pub struct DockerCompose {
    program: String,
    timeout: Duration,
}

impl DockerCompose {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    async fn compose(&self, path: &Path, args: &[&str]) -> Result<()> {
        ToolCommand::new(&self.program, self.timeout)
            .arg("compose")
            .args(args.iter().copied())
            .current_dir(path)
            .run()
            .await?
            .check(&self.program)?;
        Ok(())
    }
}

#[async_trait]
impl ContainerLifecycle for DockerCompose {
    async fn stop(&self, path: &Path) -> Result<()> {
        info!(path = %path.display(), "stopping containers");
        self.compose(path, &["down"]).await
    }

    async fn start(&self, path: &Path) -> Result<()> {
        info!(path = %path.display(), "starting containers");
        self.compose(path, &["up", "-d"]).await
    }
}
