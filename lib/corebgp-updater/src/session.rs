//! Session lifecycle
//!
//! A session connects both backends, runs one snapshot reconciliation and
//! then applies watch updates until either backend fails or shutdown is
//! requested. A failed session is torn down completely and replaced by a
//! fresh one after the retry interval, so every session starts from a full
//! reconciliation.

use crate::{
    Backend, ConnectivitySupervisor, Result, SnapshotReconciler, UpdateForwarder, UpdateProcessor,
    UpdaterConfig, UpdaterError,
};
use async_trait::async_trait;
use corebgp_client::{ApiClient, DesiredStateClient};
use corebgp_gobgp::{AdapterError, GobgpAdapter, GobgpClient, RouteAdapter, TlsClientConfig};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Connected backends for one session
#[derive(Clone)]
pub struct SessionBackends {
    pub client: Arc<dyn DesiredStateClient>,
    pub adapter: Arc<dyn RouteAdapter>,
}

/// Dials fresh backends at the start of every session
#[async_trait]
pub trait Backends: Send + Sync {
    async fn connect(&self) -> Result<SessionBackends>;
}

/// Production backends: the CoreBGP API over HTTP and GoBGP over gRPC
pub struct NetworkBackends {
    config: UpdaterConfig,
    tls: Option<TlsClientConfig>,
}

impl NetworkBackends {
    /// Validate the configuration and load TLS material once
    pub fn new(config: UpdaterConfig) -> Result<Self> {
        config.validate()?;
        let tls = config.load_tls()?;
        Ok(Self { config, tls })
    }
}

#[async_trait]
impl Backends for NetworkBackends {
    async fn connect(&self) -> Result<SessionBackends> {
        let client = ApiClient::new(&self.config.api_endpoint, self.config.api_timeout)
            .map_err(|e| UpdaterError::Configuration(e.to_string()))?;

        let speaker = GobgpClient::connect(
            &self.config.gobgp_endpoint,
            self.tls.as_ref(),
            self.config.call_timeouts.probe,
        )
        .await
        .map_err(|e| match e {
            AdapterError::InvalidEndpoint(_) => UpdaterError::Configuration(e.to_string()),
            other => UpdaterError::connectivity(Backend::Speaker, other),
        })?;

        Ok(SessionBackends {
            client: Arc::new(client),
            adapter: Arc::new(GobgpAdapter::new(speaker, self.config.call_timeouts.clone())),
        })
    }
}

/// Outer loop: run sessions back to back until shutdown
pub struct SessionLoop<B> {
    backends: B,
    config: UpdaterConfig,
}

impl<B: Backends> SessionLoop<B> {
    pub fn new(backends: B, config: UpdaterConfig) -> Self {
        Self { backends, config }
    }

    /// Run until `shutdown` is cancelled. Only configuration errors escape.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        let mut sessions: u64 = 0;

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            sessions += 1;
            info!(session = sessions, "Starting session");
            match self.run_session(&shutdown).await {
                Ok(()) => info!(session = sessions, "Session ended"),
                Err(e) if e.is_fatal() => {
                    error!(error = %e, "Unrecoverable error, stopping updater");
                    return Err(e);
                }
                Err(e) => warn!(session = sessions, error = %e, "Session failed"),
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = time::sleep(self.config.retry_interval) => {}
            }
        }

        info!("Updater stopped after {} sessions", sessions);
        Ok(())
    }

    /// One session from dialling to full teardown
    pub async fn run_session(&self, shutdown: &CancellationToken) -> Result<()> {
        let session = shutdown.child_token();

        let backends = tokio::select! {
            _ = session.cancelled() => return Ok(()),
            connected = self.backends.connect() => connected?,
        };

        let supervisor = ConnectivitySupervisor::new(
            backends.client.clone(),
            backends.adapter.clone(),
            self.config.probe_interval,
            self.config.api_timeout,
        );
        supervisor.probe_once().await?;
        info!("Both backends reachable");

        let (tx, rx) = mpsc::channel(self.config.update_queue_capacity);
        let (seed_tx, seed_rx) = oneshot::channel();
        let mut tasks = JoinSet::new();

        let reconciler = SnapshotReconciler::new(
            backends.client.clone(),
            backends.adapter.clone(),
            self.config.reconcile_mode,
            self.config.prefix_filters.clone(),
        );
        let token = session.clone();
        tasks.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => debug!("Reconciliation interrupted"),
                outcome = reconciler.reconcile_snapshot() => match outcome {
                    Ok((_, announcements)) => {
                        // the watch task may already have finished
                        let _ = seed_tx.send(announcements);
                    }
                    Err(e) => {
                        error!(error = %e, "Initial reconciliation failed, ending session");
                        token.cancel();
                    }
                }
            }
        });

        let client = backends.client.clone();
        let token = session.clone();
        tasks.spawn(async move {
            let mut forwarder = UpdateForwarder::with_seed(tx, seed_rx);
            match client.watch_announcements(&token, &mut forwarder).await {
                Ok(()) if token.is_cancelled() => {}
                Ok(()) => warn!("Watch stream ended, ending session"),
                Err(e) => {
                    let e = UpdaterError::connectivity(Backend::Api, e);
                    error!(error = %e, "Watch failed, ending session");
                }
            }
            token.cancel();
        });

        let processor = UpdateProcessor::new(backends.adapter.clone());
        let token = session.clone();
        tasks.spawn(async move {
            processor.run(token, rx).await;
        });

        let token = session.clone();
        tasks.spawn(async move {
            supervisor.run(token).await;
        });

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Session task aborted");
                session.cancel();
            }
        }

        Ok(())
    }
}
