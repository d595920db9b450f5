use serde::Serialize;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};
use uuid::Uuid;

use crate::database::store::SessionStore;
use crate::error::Result;
use crate::services::state_machine::{SessionEvent, SessionStateMachine};
use crate::utils::time::Clock;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub reaped: Vec<Uuid>,
}

/// Finalizes sessions nobody came back to.
#[derive(Clone)]
pub struct ReaperService {
    store: Arc<dyn SessionStore>,
    machine: SessionStateMachine,
    clock: Arc<dyn Clock>,
}

impl ReaperService {
    pub fn new(
        store: Arc<dyn SessionStore>,
        machine: SessionStateMachine,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            machine,
            clock,
        }
    }

    pub async fn sweep(&self) -> Result<SweepReport> {
        let now = self.clock.now();
        let candidates = self.store.list_in_progress().await?;
        let mut report = SweepReport {
            scanned: candidates.len(),
            reaped: Vec::new(),
        };

        for session in candidates {
            if !self
                .machine
                .clock()
                .is_abandoned(session.started_at, session.duration_minutes, now)
            {
                continue;
            }
            let session_id = session.id;
            match self.machine.fire(session, SessionEvent::Reap, now).await {
                Ok(outcome) if outcome.transitioned => report.reaped.push(session_id),
                Ok(_) => {}
                Err(err) => {
                    error!(session_id = %session_id, error = %err, "failed to reap session");
                }
            }
        }

        if !report.reaped.is_empty() {
            info!(
                scanned = report.scanned,
                reaped = report.reaped.len(),
                "abandoned sessions timed out"
            );
        }
        Ok(report)
    }

    pub async fn schedule(self, cron: &str) -> anyhow::Result<JobScheduler> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| anyhow::anyhow!("failed to create scheduler: {:?}", e))?;
        let job = Job::new_async(cron, move |_id, _lock| {
            let reaper = self.clone();
            Box::pin(async move {
                if let Err(err) = reaper.sweep().await {
                    error!(error = %err, "reaper sweep failed");
                }
            })
        })
        .map_err(|e| anyhow::anyhow!("invalid reaper schedule '{}': {:?}", cron, e))?;
        scheduler
            .add(job)
            .await
            .map_err(|e| anyhow::anyhow!("failed to register reaper job: {:?}", e))?;
        scheduler
            .start()
            .await
            .map_err(|e| anyhow::anyhow!("failed to start scheduler: {:?}", e))?;
        Ok(scheduler)
    }
}
