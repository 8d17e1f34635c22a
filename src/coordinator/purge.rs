use tracing::info;

use crate::error::AppResult;

use super::Coordinator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgeScope {
    /// Destroy every execution cycle and its statistics.
    Tests,
    /// Destroy the whole project; the store cascades everything.
    All,
}

impl Coordinator {
    pub async fn purge(&self, scope: PurgeScope) -> AppResult<()> {
        let _guard = self.lock_command().await;
        let project = self.project().await?;
        match scope {
            PurgeScope::Tests => {
                self.store().delete_cycles(project.id).await?;
                self.workspace().purge_cycle_artifacts()?;
                info!(project = %project.project_code, "execution history purged");
            }
            PurgeScope::All => {
                self.store().delete_project(project.id).await?;
                self.workspace().remove()?;
                info!(project = %project.project_code, "project purged");
            }
        }
        Ok(())
    }
}
