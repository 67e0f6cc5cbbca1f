//! In-memory backends for engine tests

use async_trait::async_trait;
use corebgp_client::{ClientError, DesiredStateClient, EventHandler};
use corebgp_gobgp::{AdapterError, RouteAdapter};
use corebgp_model::{Addresses, Announcement, Meta, NextHopStatus, Route, WatchEvent, ORIGIN_IGP};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub fn announcement(name: &str, ip: &str, next_hops: &[(&str, bool)]) -> Announcement {
    Announcement {
        meta: Meta {
            name: name.to_string(),
            project: "test".to_string(),
        },
        addresses: Addresses {
            announced_ip: ip.to_string(),
            ..Default::default()
        },
        next_hops: next_hops.iter().map(|(nh, _)| nh.to_string()).collect(),
        status: next_hops
            .iter()
            .map(|(nh, healthy)| NextHopStatus {
                next_hop: nh.to_string(),
                health: *healthy,
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    }
}

pub fn route(prefix: &str, len: u8, next_hop: &str, identifier: u32) -> Route {
    Route {
        prefix: prefix.to_string(),
        prefix_length: len,
        next_hop: next_hop.to_string(),
        origin: ORIGIN_IGP,
        identifier,
    }
}

#[derive(Default)]
pub struct FakeClient {
    pub announcements: Mutex<Vec<Announcement>>,
    pub events: Mutex<Vec<WatchEvent>>,
    /// Wait this long after the watch opens before delivering events
    pub event_delay: Mutex<Duration>,
    pub unhealthy: AtomicBool,
    pub fail_fetch: AtomicBool,
    /// Return from the watch right after delivering the scripted events
    pub end_watch: AtomicBool,
    pub health_checks: AtomicUsize,
    pub fetches: AtomicUsize,
    pub watches: AtomicUsize,
}

impl FakeClient {
    pub fn with(announcements: Vec<Announcement>) -> Self {
        Self {
            announcements: Mutex::new(announcements),
            ..Default::default()
        }
    }
}

#[async_trait]
impl DesiredStateClient for FakeClient {
    async fn health_check(&self) -> corebgp_client::Result<()> {
        self.health_checks.fetch_add(1, Ordering::SeqCst);
        if self.unhealthy.load(Ordering::SeqCst) {
            return Err(ClientError::Api("api down".to_string()));
        }
        Ok(())
    }

    async fn get_all_announcements(&self) -> corebgp_client::Result<Vec<Announcement>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(ClientError::Status {
                code: 500,
                message: "internal error".to_string(),
            });
        }
        Ok(self.announcements.lock().unwrap().clone())
    }

    async fn watch_announcements(
        &self,
        cancel: &CancellationToken,
        handler: &mut dyn EventHandler,
    ) -> corebgp_client::Result<()> {
        self.watches.fetch_add(1, Ordering::SeqCst);
        let events: Vec<WatchEvent> = self.events.lock().unwrap().drain(..).collect();
        let delay = *self.event_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(delay) => {}
            }
        }
        for event in events {
            handler.on_event(event).await;
        }
        if !self.end_watch.load(Ordering::SeqCst) {
            cancel.cancelled().await;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Add(Vec<Route>),
    Delete(Route),
    List,
}

/// Speaker holding a flat path table
#[derive(Default)]
pub struct FakeAdapter {
    pub installed: Mutex<Vec<Route>>,
    pub calls: Mutex<Vec<Call>>,
    pub fail_probe: AtomicBool,
    pub fail_list: AtomicBool,
    /// Next hop whose installs and withdrawals fail
    pub broken_next_hop: Mutex<Option<String>>,
    pub probes: AtomicUsize,
}

impl FakeAdapter {
    pub fn with(installed: Vec<Route>) -> Self {
        Self {
            installed: Mutex::new(installed),
            ..Default::default()
        }
    }

    pub fn installed_sorted(&self) -> Vec<Route> {
        let mut routes = self.installed.lock().unwrap().clone();
        routes.sort_by(|a, b| a.key().cmp(&b.key()).then(a.identifier.cmp(&b.identifier)));
        routes
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn mutations(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, Call::List))
            .collect()
    }

    fn is_broken(&self, route: &Route) -> bool {
        self.broken_next_hop.lock().unwrap().as_deref() == Some(route.next_hop.as_str())
    }
}

fn failed(op: &'static str) -> AdapterError {
    AdapterError::Timeout {
        op,
        after: Duration::from_secs(1),
    }
}

#[async_trait]
impl RouteAdapter for FakeAdapter {
    async fn probe(&self) -> corebgp_gobgp::Result<()> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if self.fail_probe.load(Ordering::SeqCst) {
            return Err(failed("GetBgp"));
        }
        Ok(())
    }

    async fn add_paths(&self, routes: &[Route]) -> corebgp_gobgp::Result<()> {
        self.calls.lock().unwrap().push(Call::Add(routes.to_vec()));
        for route in routes {
            if self.is_broken(route) {
                return Err(failed("AddPath"));
            }
            let mut installed = self.installed.lock().unwrap();
            installed.retain(|r| !(r.key() == route.key() && r.identifier == route.identifier));
            installed.push(route.clone());
        }
        Ok(())
    }

    async fn delete_path(&self, route: &Route) -> corebgp_gobgp::Result<()> {
        self.calls.lock().unwrap().push(Call::Delete(route.clone()));
        if self.is_broken(route) {
            return Err(failed("DeletePath"));
        }
        self.installed
            .lock()
            .unwrap()
            .retain(|r| !(r.key() == route.key() && r.identifier == route.identifier));
        Ok(())
    }

    async fn list_paths(&self, _prefix_filters: &[String]) -> corebgp_gobgp::Result<Vec<Route>> {
        self.calls.lock().unwrap().push(Call::List);
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(failed("ListPath"));
        }
        Ok(self.installed.lock().unwrap().clone())
    }
}
