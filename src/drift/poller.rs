//! Background drift polling — one loop per actively attended project.
//!
//! Fires every `interval` (15 s default), re-reads the project document so
//! canonical edits between ticks are honored, and sends each result on an
//! mpsc channel. Ticks that land while a prior check is still running are
//! skipped, not queued. `stop()` ends the series; an in-flight check runs to
//! completion first.

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use super::DriftStatus;
use crate::providers::Providers;
use crate::registry::AgentRegistry;
use crate::store::DocumentStore;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(15);

pub struct DriftPoller {
    stop_tx: watch::Sender<bool>,
    handle: tokio::task::JoinHandle<()>,
}

impl DriftPoller {
    /// Spawn a polling series for one project.
    pub fn spawn(
        store_root: PathBuf,
        providers: Providers,
        project_name: String,
        interval: Duration,
        tx: mpsc::Sender<DriftStatus>,
    ) -> Self {
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // A slow check must not cause a burst of queued ticks afterwards.
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await; // consume the immediate first tick

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = stop_rx.changed() => {
                        debug!(project = %project_name, "drift poller stopped");
                        return;
                    }
                }
                if let Some(status) = run_check(&store_root, &providers, &project_name).await {
                    if tx.send(status).await.is_err() {
                        // Receiver gone — the subject was deactivated.
                        return;
                    }
                }
            }
        });

        DriftPoller { stop_tx, handle }
    }

    /// End the polling series. An in-flight check finishes first.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        let _ = self.handle.await;
    }
}

/// One poll: skipped (None) when the project is missing its directory or has
/// no agents — there is nothing meaningful to check yet.
async fn run_check(
    store_root: &PathBuf,
    providers: &Providers,
    project_name: &str,
) -> Option<DriftStatus> {
    let store = DocumentStore::new(store_root);
    let project = match store.read_project(project_name) {
        Ok(p) => p,
        Err(e) => {
            warn!(project = %project_name, err = %e, "drift poll: project unreadable — skipping tick");
            return None;
        }
    };
    if project.directory.is_none() || project.agents.is_empty() {
        return None;
    }
    let mode = store.load_settings().skill_sync_mode;
    Some(
        super::check(
            &project,
            AgentRegistry::builtin(),
            mode,
            providers,
            store_root,
        )
        .await,
    )
}
