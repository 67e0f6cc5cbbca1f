//! GoBGP protocol adapter
//!
//! This library turns domain routes into BGP speaker operations:
//! - `api`: the subset of the GoBGP gRPC messages the updater speaks
//! - `client`: the `SpeakerApi` seam and its tonic transport (`GobgpClient`)
//! - `adapter`: the `RouteAdapter` contract and its GoBGP translation (`GobgpAdapter`)
//! - `tls`: client certificate material for mutual TLS
//!
//! Nothing in this crate retries. Callers own retry policy.

pub mod adapter;
pub mod api;
pub mod client;
pub mod error;
pub mod tls;

pub use adapter::{CallTimeouts, GobgpAdapter, RouteAdapter};
pub use client::{GobgpClient, SpeakerApi};
pub use error::{AdapterError, Result};
pub use tls::TlsClientConfig;
