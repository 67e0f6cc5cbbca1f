//! Full snapshot reconciliation
//!
//! Fetches the desired routes from the API and the installed routes from the
//! speaker, then withdraws what is no longer wanted and installs what is
//! missing. Running it twice against unchanged inputs changes nothing the
//! second time.

use crate::{Backend, ReconcileMode, Result, UpdaterError};
use corebgp_client::DesiredStateClient;
use corebgp_gobgp::RouteAdapter;
use corebgp_model::{route_map, Announcement, Route, RouteKey, RouteMap};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Routes to change on the speaker
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RouteDiff {
    pub to_add: Vec<Route>,
    pub to_remove: Vec<Route>,
}

impl RouteDiff {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Outcome of one reconciliation pass
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub desired: usize,
    pub installed: usize,
    pub added: usize,
    pub removed: usize,
    pub failed: usize,
}

/// Compare desired and installed routes by key.
///
/// The speaker may hold several paths for one key under different
/// identifiers. At most one of them survives: the path whose attributes match
/// the desired route, or in key-only mode the lowest identifier when none
/// matches. In strict mode a key without a matching path is withdrawn and
/// installed again.
pub fn diff(desired: &RouteMap, actual: &[Route], mode: ReconcileMode) -> RouteDiff {
    let mut installed: HashMap<RouteKey, Vec<&Route>> = HashMap::new();
    for route in actual {
        installed.entry(route.key()).or_default().push(route);
    }

    let mut result = RouteDiff::default();

    for (key, wanted) in desired {
        let mut paths = installed.remove(key).unwrap_or_default();
        paths.sort_by_key(|r| r.identifier);

        let keep = paths
            .iter()
            .position(|p| p.same_attributes(wanted))
            .or_else(|| (mode == ReconcileMode::KeyOnly && !paths.is_empty()).then_some(0));
        if keep.is_none() {
            result.to_add.push(wanted.clone());
        }

        result.to_remove.extend(
            paths
                .into_iter()
                .enumerate()
                .filter(|(i, _)| Some(*i) != keep)
                .map(|(_, p)| p.clone()),
        );
    }

    for paths in installed.into_values() {
        result.to_remove.extend(paths.into_iter().cloned());
    }

    let order = |a: &Route, b: &Route| a.key().cmp(&b.key()).then(a.identifier.cmp(&b.identifier));
    result.to_add.sort_by(order);
    result.to_remove.sort_by(order);
    result
}

/// One-shot reconciler over a client and an adapter
pub struct SnapshotReconciler {
    client: Arc<dyn DesiredStateClient>,
    adapter: Arc<dyn RouteAdapter>,
    mode: ReconcileMode,
    prefix_filters: Vec<String>,
}

impl SnapshotReconciler {
    pub fn new(
        client: Arc<dyn DesiredStateClient>,
        adapter: Arc<dyn RouteAdapter>,
        mode: ReconcileMode,
        prefix_filters: Vec<String>,
    ) -> Self {
        Self {
            client,
            adapter,
            mode,
            prefix_filters,
        }
    }

    /// Run one pass. A failed fetch on either side aborts before any change.
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        self.reconcile_snapshot().await.map(|(report, _)| report)
    }

    /// Run one pass and hand back the announcements it reconciled against
    pub async fn reconcile_snapshot(&self) -> Result<(ReconcileReport, Vec<Announcement>)> {
        let (announcements, actual) = tokio::try_join!(self.fetch_desired(), self.fetch_installed())?;
        let desired = desired_routes(&announcements);

        let changes = diff(&desired, &actual, self.mode);
        let mut report = ReconcileReport {
            desired: desired.len(),
            installed: actual.len(),
            ..Default::default()
        };

        if changes.is_empty() {
            debug!("Speaker already matches {} desired routes", desired.len());
            return Ok((report, announcements));
        }

        // withdraw first so a reinstalled path never coexists with its stale copy
        for route in &changes.to_remove {
            match self.adapter.delete_path(route).await {
                Ok(()) => {
                    debug!("Withdrew {} (id {})", route, route.identifier);
                    report.removed += 1;
                }
                Err(e) => {
                    warn!(route = %route, error = %e, "Failed to withdraw route");
                    report.failed += 1;
                }
            }
        }

        for (cidr, routes) in group_by_prefix(changes.to_add) {
            match self.adapter.add_paths(&routes).await {
                Ok(()) => {
                    debug!("Installed {} paths for {}", routes.len(), cidr);
                    report.added += routes.len();
                }
                Err(e) => {
                    warn!(prefix = %cidr, paths = routes.len(), error = %e, "Failed to install paths");
                    report.failed += routes.len();
                }
            }
        }

        info!(
            added = report.added,
            removed = report.removed,
            failed = report.failed,
            "Reconciliation complete"
        );
        Ok((report, announcements))
    }

    async fn fetch_desired(&self) -> Result<Vec<Announcement>> {
        self.client
            .get_all_announcements()
            .await
            .map_err(|e| UpdaterError::fetch(Backend::Api, e))
    }

    async fn fetch_installed(&self) -> Result<Vec<Route>> {
        let routes = self
            .adapter
            .list_paths(&self.prefix_filters)
            .await
            .map_err(|e| UpdaterError::fetch(Backend::Speaker, e))?;
        debug!("Speaker reports {} installed routes", routes.len());
        Ok(routes)
    }
}

/// Healthy routes of every announcement, skipping unusable prefixes
fn desired_routes(announcements: &[Announcement]) -> RouteMap {
    let mut routes = Vec::new();
    for announcement in announcements {
        match announcement.healthy_routes() {
            Ok(healthy) => routes.extend(healthy),
            Err(e) => warn!(
                announcement = %announcement.id(),
                error = %e,
                "Skipping announcement without a usable prefix"
            ),
        }
    }
    debug!(
        "Fetched {} announcements, {} healthy routes",
        announcements.len(),
        routes.len()
    );
    route_map(routes)
}

/// Split routes into one batch per prefix, identifiers ascending
fn group_by_prefix(routes: Vec<Route>) -> BTreeMap<String, Vec<Route>> {
    let mut groups: BTreeMap<String, Vec<Route>> = BTreeMap::new();
    for route in routes {
        groups.entry(route.cidr()).or_default().push(route);
    }
    for batch in groups.values_mut() {
        batch.sort_by_key(|r| r.identifier);
    }
    groups
}
