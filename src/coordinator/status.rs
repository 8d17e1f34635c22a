use futures_util::future::join_all;

use crate::error::AppResult;
use crate::model::LoadAgent;

use super::Coordinator;

impl Coordinator {
    /// Masters still running load, probed in parallel. Empty when no cycle
    /// is current.
    pub async fn status(&self) -> AppResult<Vec<LoadAgent>> {
        let project = self.project().await?;
        if self.cycles().current(&project).await?.is_none() {
            return Ok(Vec::new());
        }

        let clusters = self.load_clusters(&project).await?;
        let manager = self.agents();
        let mut running = Vec::new();
        for cluster in &clusters {
            let agents = self
                .store()
                .agents_for_cluster(cluster.clusterable_id(), cluster.kind())
                .await?;
            let candidates: Vec<LoadAgent> = agents
                .into_iter()
                .filter(|agent| agent.active && agent.is_master() && agent.running_load())
                .collect();
            let probes = candidates.iter().map(|agent| manager.probe_agent(cluster, agent));
            for (agent, alive) in candidates.iter().zip(join_all(probes).await) {
                if alive? {
                    running.push(agent.clone());
                }
            }
        }
        Ok(running)
    }
}
