//! Client for the CoreBGP API
//!
//! The updater consumes the API through the `DesiredStateClient` trait:
//! health checks, full announcement snapshots and a push watch stream.
//! `ApiClient` implements it over HTTP and WebSocket.

pub mod client;
pub mod error;
pub mod watch;

pub use client::{ApiClient, ApiResponse, DesiredStateClient};
pub use error::{ClientError, Result};
pub use watch::EventHandler;
