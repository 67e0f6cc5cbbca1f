//! Watch events to route updates
//!
//! The translator remembers the last announcement seen for each id during a
//! session, so health transitions and removed next hops turn into withdrawals
//! of exactly the paths that were installed for them. It starts from the
//! snapshot the session reconciled against.

use async_trait::async_trait;
use corebgp_client::EventHandler;
use corebgp_model::{Announcement, AnnouncementId, Route, RouteKey, RouteUpdate, WatchEvent};
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Per-session translator from announcement changes to per next-hop updates
#[derive(Debug, Default)]
pub struct EventTranslator {
    known: HashMap<AnnouncementId, Announcement>,
}

impl EventTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember announcements from a snapshot.
    ///
    /// State already learned from the watch is newer and wins.
    pub fn seed(&mut self, announcements: impl IntoIterator<Item = Announcement>) {
        for announcement in announcements {
            self.known.entry(announcement.id()).or_insert(announcement);
        }
    }

    /// Number of announcements remembered so far
    pub fn tracked(&self) -> usize {
        self.known.len()
    }

    /// Updates to apply for one event, withdrawals before installs
    pub fn translate(&mut self, event: WatchEvent) -> Vec<RouteUpdate> {
        match event {
            WatchEvent::Added(announcement) => self.added(announcement),
            WatchEvent::Updated(announcement) => self.updated(announcement),
            WatchEvent::Deleted(announcement) => self.deleted(announcement),
        }
    }

    fn added(&mut self, announcement: Announcement) -> Vec<RouteUpdate> {
        let updates = healthy(&announcement)
            .into_iter()
            .map(RouteUpdate::added)
            .collect();
        self.known.insert(announcement.id(), announcement);
        updates
    }

    fn updated(&mut self, announcement: Announcement) -> Vec<RouteUpdate> {
        let id = announcement.id();
        let candidates = candidates(&announcement);
        let previous = self.known.insert(id, announcement);

        let Some(previous) = previous else {
            // nothing remembered: state each next hop as it is now
            return candidates
                .into_iter()
                .map(|(route, up)| if up { RouteUpdate::updated(route) } else { RouteUpdate::deleted(route) })
                .collect();
        };

        let mut was_up: HashMap<RouteKey, Route> =
            healthy(&previous).into_iter().map(|r| (r.key(), r)).collect();
        let mut withdrawals = Vec::new();
        let mut installs = Vec::new();

        for (route, _) in candidates.into_iter().filter(|(_, up)| *up) {
            match was_up.remove(&route.key()) {
                Some(old) if old.identifier == route.identifier => installs.push(RouteUpdate::updated(route)),
                Some(old) => {
                    withdrawals.push(RouteUpdate::deleted(old));
                    installs.push(RouteUpdate::added(route));
                }
                None => installs.push(RouteUpdate::added(route)),
            }
        }

        // healthy before, now unhealthy, removed or under a different prefix
        withdrawals.extend(was_up.into_values().map(RouteUpdate::deleted));
        withdrawals.sort_by(|a, b| a.route.key().cmp(&b.route.key()));

        withdrawals.extend(installs);
        withdrawals
    }

    // A deletion without a payload decodes to an empty announcement whose id
    // matches nothing, so the remembered state is only reachable when the
    // tombstone still carries its meta.
    fn deleted(&mut self, announcement: Announcement) -> Vec<RouteUpdate> {
        let remembered = self.known.remove(&announcement.id());

        let source = if announcement.next_hops.is_empty() {
            match &remembered {
                Some(previous) => previous,
                None => {
                    warn!(announcement = %announcement.id(), "Deletion of unknown announcement carries no routes");
                    return Vec::new();
                }
            }
        } else {
            &announcement
        };

        healthy(source).into_iter().map(RouteUpdate::deleted).collect()
    }
}

fn candidates(announcement: &Announcement) -> Vec<(Route, bool)> {
    announcement.candidate_routes().unwrap_or_else(|e| {
        warn!(announcement = %announcement.id(), error = %e, "Announcement has no usable prefix");
        Vec::new()
    })
}

fn healthy(announcement: &Announcement) -> Vec<Route> {
    candidates(announcement)
        .into_iter()
        .filter_map(|(route, up)| up.then_some(route))
        .collect()
}

/// Watch handler feeding translated updates into the processor queue
pub struct UpdateForwarder {
    translator: EventTranslator,
    updates: mpsc::Sender<RouteUpdate>,
    seed: Option<oneshot::Receiver<Vec<Announcement>>>,
}

impl UpdateForwarder {
    pub fn new(updates: mpsc::Sender<RouteUpdate>) -> Self {
        Self {
            translator: EventTranslator::new(),
            updates,
            seed: None,
        }
    }

    /// Hold the first event until the snapshot arrives on `seed`.
    ///
    /// A dropped sender means the snapshot failed; events then translate
    /// without it.
    pub fn with_seed(updates: mpsc::Sender<RouteUpdate>, seed: oneshot::Receiver<Vec<Announcement>>) -> Self {
        Self {
            seed: Some(seed),
            ..Self::new(updates)
        }
    }

    async fn await_seed(&mut self) {
        let Some(seed) = self.seed.take() else {
            return;
        };
        match seed.await {
            Ok(announcements) => {
                debug!(announcements = announcements.len(), "Seeded translator from snapshot");
                self.translator.seed(announcements);
            }
            Err(_) => debug!("No snapshot to seed from"),
        }
    }
}

#[async_trait]
impl EventHandler for UpdateForwarder {
    async fn on_event(&mut self, event: WatchEvent) {
        self.await_seed().await;

        let id = event.announcement().id();
        let kind = event.kind();
        let updates = self.translator.translate(event);
        debug!(announcement = %id, %kind, updates = updates.len(), "Translated watch event");

        for update in updates {
            // blocks while the queue is full
            if self.updates.send(update).await.is_err() {
                debug!("Update queue closed, dropping remaining updates");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{announcement, route};
    use corebgp_model::UpdateType;

    fn kinds(updates: &[RouteUpdate]) -> Vec<(UpdateType, String, u32)> {
        updates
            .iter()
            .map(|u| (u.kind, u.route.next_hop.clone(), u.route.identifier))
            .collect()
    }

    #[test]
    fn test_added_installs_healthy_next_hops() {
        let mut translator = EventTranslator::new();
        let updates = translator.translate(WatchEvent::Added(announcement(
            "web",
            "10.0.0.1/32",
            &[("A", true), ("B", false), ("C", true)],
        )));

        assert_eq!(
            kinds(&updates),
            vec![
                (UpdateType::Added, "A".to_string(), 1),
                (UpdateType::Added, "C".to_string(), 3),
            ]
        );
        assert_eq!(translator.tracked(), 1);
    }

    #[test]
    fn test_health_transitions() {
        let mut translator = EventTranslator::new();
        translator.translate(WatchEvent::Added(announcement(
            "web",
            "10.0.0.1/32",
            &[("A", true), ("B", false)],
        )));

        let updates = translator.translate(WatchEvent::Updated(announcement(
            "web",
            "10.0.0.1/32",
            &[("A", false), ("B", true)],
        )));

        assert_eq!(
            kinds(&updates),
            vec![
                (UpdateType::Deleted, "A".to_string(), 1),
                (UpdateType::Added, "B".to_string(), 2),
            ]
        );
    }

    #[test]
    fn test_removed_next_hop_is_withdrawn_with_old_identifier() {
        let mut translator = EventTranslator::new();
        translator.translate(WatchEvent::Added(announcement(
            "web",
            "10.0.0.1/32",
            &[("A", true), ("B", true)],
        )));

        let updates =
            translator.translate(WatchEvent::Updated(announcement("web", "10.0.0.1/32", &[("B", true)])));

        assert_eq!(
            kinds(&updates),
            vec![
                (UpdateType::Deleted, "A".to_string(), 1),
                (UpdateType::Deleted, "B".to_string(), 2),
                (UpdateType::Added, "B".to_string(), 1),
            ]
        );
    }

    #[test]
    fn test_prefix_change_moves_all_paths() {
        let mut translator = EventTranslator::new();
        translator.translate(WatchEvent::Added(announcement("web", "10.0.0.1/32", &[("A", true)])));

        let updates =
            translator.translate(WatchEvent::Updated(announcement("web", "10.0.0.2/32", &[("A", true)])));

        assert_eq!(updates[0], RouteUpdate::deleted(route("10.0.0.1", 32, "A", 1)));
        assert_eq!(updates[1], RouteUpdate::added(route("10.0.0.2", 32, "A", 1)));
    }

    #[test]
    fn test_update_without_history_states_current_health() {
        let mut translator = EventTranslator::new();
        let updates = translator.translate(WatchEvent::Updated(announcement(
            "web",
            "10.0.0.1/32",
            &[("A", true), ("B", false)],
        )));

        assert_eq!(
            kinds(&updates),
            vec![
                (UpdateType::Updated, "A".to_string(), 1),
                (UpdateType::Deleted, "B".to_string(), 2),
            ]
        );
    }

    #[test]
    fn test_unchanged_update_refreshes() {
        let mut translator = EventTranslator::new();
        let web = announcement("web", "10.0.0.1/32", &[("A", true)]);
        translator.translate(WatchEvent::Added(web.clone()));

        let updates = translator.translate(WatchEvent::Updated(web));
        assert_eq!(kinds(&updates), vec![(UpdateType::Updated, "A".to_string(), 1)]);
    }

    #[test]
    fn test_deleted_withdraws_healthy_next_hops() {
        let mut translator = EventTranslator::new();
        let updates = translator.translate(WatchEvent::Deleted(announcement(
            "web",
            "10.0.0.1/32",
            &[("A", true), ("B", false)],
        )));

        assert_eq!(kinds(&updates), vec![(UpdateType::Deleted, "A".to_string(), 1)]);
    }

    #[test]
    fn test_meta_only_deletion_falls_back_to_remembered_state() {
        let mut translator = EventTranslator::new();
        translator.translate(WatchEvent::Added(announcement("web", "10.0.0.1/32", &[("A", true)])));

        let tombstone = announcement("web", "", &[]);
        let updates = translator.translate(WatchEvent::Deleted(tombstone));

        assert_eq!(updates, vec![RouteUpdate::deleted(route("10.0.0.1", 32, "A", 1))]);
        assert_eq!(translator.tracked(), 0);
    }

    #[test]
    fn test_deletion_without_payload_yields_nothing() {
        let mut translator = EventTranslator::new();
        translator.translate(WatchEvent::Added(announcement("web", "10.0.0.1/32", &[("A", true)])));

        let event = WatchEvent::decode(r#"{"type":"deleted"}"#).unwrap();
        assert_eq!(event.announcement(), &Announcement::default());

        assert!(translator.translate(event).is_empty());
        assert_eq!(translator.tracked(), 1);
    }

    #[test]
    fn test_seeded_translator_withdraws_removed_next_hop() {
        let mut translator = EventTranslator::new();
        translator.seed(vec![announcement("web", "10.0.0.1/32", &[("A", true), ("B", true)])]);
        assert_eq!(translator.tracked(), 1);

        let updates =
            translator.translate(WatchEvent::Updated(announcement("web", "10.0.0.1/32", &[("A", true)])));

        assert_eq!(
            kinds(&updates),
            vec![
                (UpdateType::Deleted, "B".to_string(), 2),
                (UpdateType::Updated, "A".to_string(), 1),
            ]
        );
    }

    #[test]
    fn test_seed_keeps_newer_watch_state() {
        let mut translator = EventTranslator::new();
        translator.translate(WatchEvent::Added(announcement("web", "10.0.0.1/32", &[("A", true)])));
        translator.seed(vec![announcement("web", "10.0.0.1/32", &[("A", true), ("B", true)])]);

        let updates = translator.translate(WatchEvent::Deleted(announcement("web", "", &[])));
        assert_eq!(updates, vec![RouteUpdate::deleted(route("10.0.0.1", 32, "A", 1))]);
    }

    #[test]
    fn test_unparsable_prefix_yields_nothing() {
        let mut translator = EventTranslator::new();
        let updates = translator.translate(WatchEvent::Added(announcement("web", "nope", &[("A", true)])));
        assert!(updates.is_empty());
    }

    #[tokio::test]
    async fn test_forwarder_enqueues_in_order() {
        let (tx, mut rx) = mpsc::channel(10);
        let mut forwarder = UpdateForwarder::new(tx);

        forwarder
            .on_event(WatchEvent::Added(announcement(
                "web",
                "10.0.0.1/32",
                &[("A", true), ("B", true)],
            )))
            .await;
        drop(forwarder);

        assert_eq!(rx.recv().await.unwrap().route.next_hop, "A");
        assert_eq!(rx.recv().await.unwrap().route.next_hop, "B");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_forwarder_waits_for_seed() {
        let (tx, mut rx) = mpsc::channel(10);
        let (seed_tx, seed_rx) = oneshot::channel();
        let mut forwarder = UpdateForwarder::with_seed(tx, seed_rx);

        seed_tx
            .send(vec![announcement("web", "10.0.0.1/32", &[("A", true), ("B", true)])])
            .unwrap();
        forwarder
            .on_event(WatchEvent::Updated(announcement("web", "10.0.0.1/32", &[("A", true)])))
            .await;
        drop(forwarder);

        assert_eq!(rx.recv().await.unwrap(), RouteUpdate::deleted(route("10.0.0.1", 32, "B", 2)));
        assert_eq!(rx.recv().await.unwrap(), RouteUpdate::updated(route("10.0.0.1", 32, "A", 1)));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_forwarder_proceeds_without_seed() {
        let (tx, mut rx) = mpsc::channel(10);
        let (seed_tx, seed_rx) = oneshot::channel::<Vec<Announcement>>();
        let mut forwarder = UpdateForwarder::with_seed(tx, seed_rx);
        drop(seed_tx);

        forwarder
            .on_event(WatchEvent::Added(announcement("web", "10.0.0.1/32", &[("A", true)])))
            .await;

        assert_eq!(rx.recv().await.unwrap(), RouteUpdate::added(route("10.0.0.1", 32, "A", 1)));
    }
}
