//! Incremental route update processor

use crate::{Result, UpdaterError};
use corebgp_gobgp::RouteAdapter;
use corebgp_model::{RouteUpdate, UpdateType};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Single consumer of the route update queue.
///
/// Updates are applied one at a time in arrival order. A failed update is
/// logged and skipped, never retried.
pub struct UpdateProcessor {
    adapter: Arc<dyn RouteAdapter>,
}

impl UpdateProcessor {
    pub fn new(adapter: Arc<dyn RouteAdapter>) -> Self {
        Self { adapter }
    }

    /// Apply one update to the speaker
    pub async fn apply(&self, update: &RouteUpdate) -> Result<()> {
        let route = &update.route;
        let outcome = match update.kind {
            UpdateType::Added | UpdateType::Updated => self.adapter.add_paths(std::slice::from_ref(route)).await,
            UpdateType::Deleted => self.adapter.delete_path(route).await,
        };

        outcome.map_err(|source| UpdaterError::Apply {
            kind: update.kind,
            route: route.to_string(),
            source,
        })
    }

    /// Drain `updates` until the queue closes or `cancel` fires.
    ///
    /// Returns the number of updates applied successfully.
    pub async fn run(&self, cancel: CancellationToken, mut updates: mpsc::Receiver<RouteUpdate>) -> usize {
        let mut applied = 0;

        loop {
            let update = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Update processor cancelled");
                    break;
                }
                update = updates.recv() => match update {
                    Some(update) => update,
                    None => {
                        debug!("Update queue closed");
                        break;
                    }
                },
            };

            match self.apply(&update).await {
                Ok(()) => {
                    debug!(kind = %update.kind, route = %update.route, id = update.route.identifier, "Applied route update");
                    applied += 1;
                }
                Err(e) => warn!(error = %e, "Route update failed"),
            }
        }

        info!("Update processor stopped after {} updates", applied);
        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{route, Call, FakeAdapter};

    #[tokio::test]
    async fn test_applies_in_order_and_survives_failures() {
        let adapter = Arc::new(FakeAdapter::with(vec![route("10.0.0.1", 32, "A", 1)]));
        *adapter.broken_next_hop.lock().unwrap() = Some("bad".to_string());
        let processor = UpdateProcessor::new(adapter.clone());

        let (tx, rx) = mpsc::channel(10);
        tx.send(RouteUpdate::deleted(route("10.0.0.1", 32, "A", 1))).await.unwrap();
        tx.send(RouteUpdate::added(route("10.0.0.2", 32, "bad", 1))).await.unwrap();
        tx.send(RouteUpdate::updated(route("10.0.0.3", 32, "C", 1))).await.unwrap();
        drop(tx);

        let applied = processor.run(CancellationToken::new(), rx).await;

        assert_eq!(applied, 2);
        assert_eq!(
            adapter.mutations(),
            vec![
                Call::Delete(route("10.0.0.1", 32, "A", 1)),
                Call::Add(vec![route("10.0.0.2", 32, "bad", 1)]),
                Call::Add(vec![route("10.0.0.3", 32, "C", 1)]),
            ]
        );
        assert_eq!(adapter.installed_sorted(), vec![route("10.0.0.3", 32, "C", 1)]);
    }

    #[tokio::test]
    async fn test_stops_on_cancel() {
        let adapter = Arc::new(FakeAdapter::default());
        let processor = UpdateProcessor::new(adapter.clone());
        let (tx, rx) = mpsc::channel(10);
        let cancel = CancellationToken::new();
        cancel.cancel();

        tx.send(RouteUpdate::added(route("10.0.0.1", 32, "A", 1))).await.unwrap();
        let applied = processor.run(cancel, rx).await;

        assert_eq!(applied, 0);
        assert!(adapter.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_apply_reports_failure() {
        let adapter = Arc::new(FakeAdapter::default());
        *adapter.broken_next_hop.lock().unwrap() = Some("A".to_string());
        let processor = UpdateProcessor::new(adapter);

        let err = processor
            .apply(&RouteUpdate::deleted(route("10.0.0.1", 32, "A", 1)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            UpdaterError::Apply {
                kind: UpdateType::Deleted,
                ..
            }
        ));
    }
}
