//! Connectivity supervision for a running session

use crate::{Backend, Result, UpdaterError};
use corebgp_client::DesiredStateClient;
use corebgp_gobgp::RouteAdapter;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Probes both backends on an interval and ends the session on the first failure
pub struct ConnectivitySupervisor {
    client: Arc<dyn DesiredStateClient>,
    adapter: Arc<dyn RouteAdapter>,
    interval: Duration,
    api_timeout: Duration,
}

impl ConnectivitySupervisor {
    pub fn new(
        client: Arc<dyn DesiredStateClient>,
        adapter: Arc<dyn RouteAdapter>,
        interval: Duration,
        api_timeout: Duration,
    ) -> Self {
        Self {
            client,
            adapter,
            interval,
            api_timeout,
        }
    }

    /// Probe the API, then the speaker
    pub async fn probe_once(&self) -> Result<()> {
        match time::timeout(self.api_timeout, self.client.health_check()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(UpdaterError::connectivity(Backend::Api, e)),
            Err(_) => {
                return Err(UpdaterError::Timeout {
                    backend: Backend::Api,
                    after: self.api_timeout,
                })
            }
        }

        self.adapter
            .probe()
            .await
            .map_err(|e| UpdaterError::connectivity(Backend::Speaker, e))
    }

    /// Probe until a check fails or `session` is cancelled.
    ///
    /// On failure the session token is cancelled and the error returned.
    pub async fn run(&self, session: CancellationToken) -> Option<UpdaterError> {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the session was probed right before it started
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = session.cancelled() => {
                    debug!("Connectivity supervisor stopped");
                    return None;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.probe_once().await {
                        error!(error = %e, "Connectivity lost, ending session");
                        session.cancel();
                        return Some(e);
                    }
                    debug!("Connectivity probes passed");
                }
            }
        }
    }
}
