//! CoreBGP updater engine
//!
//! Keeps the routes of a BGP speaker converged on the announcements served by
//! the CoreBGP API:
//! - `reconciler`: one-shot full diff between desired and installed routes
//! - `translate`: watch events to per next-hop route updates
//! - `processor`: applies route updates in arrival order
//! - `supervisor`: periodic liveness probes of both backends
//! - `session`: the outer loop tying the above to one cancellable session

pub mod config;
pub mod error;
pub mod processor;
pub mod reconciler;
pub mod session;
pub mod supervisor;
pub mod translate;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{ReconcileMode, TlsPaths, UpdaterConfig};
pub use error::{Backend, Result, UpdaterError};
pub use processor::UpdateProcessor;
pub use reconciler::{diff, ReconcileReport, RouteDiff, SnapshotReconciler};
pub use session::{Backends, NetworkBackends, SessionBackends, SessionLoop};
pub use supervisor::ConnectivitySupervisor;
pub use translate::{EventTranslator, UpdateForwarder};
