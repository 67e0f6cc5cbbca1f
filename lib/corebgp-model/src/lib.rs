//! CoreBGP shared data types
//!
//! This library defines the records exchanged between the updater components:
//! - Announcement: desired state for one announced address, as served by the API
//! - Route / RouteKey: one concrete BGP path and its diff identity
//! - RouteUpdate: one incremental change to apply to the speaker
//! - WatchEvent: one decoded message from the announcement watch stream

pub mod announcement;
pub mod error;
pub mod event;
pub mod route;

pub use announcement::{Addresses, Announcement, AnnouncementId, HealthCheck, Meta, NextHopStatus, Subnet};
pub use error::{ModelError, Result};
pub use event::WatchEvent;
pub use route::{route_map, Route, RouteKey, RouteMap, RouteUpdate, UpdateType, ORIGIN_IGP};
