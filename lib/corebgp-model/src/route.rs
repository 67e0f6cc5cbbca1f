//! Routes as installed in the BGP speaker

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// BGP ORIGIN attribute value for IGP
pub const ORIGIN_IGP: u32 = 0;

/// One concrete BGP path
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub prefix: String,
    pub prefix_length: u8,
    pub next_hop: String,
    pub origin: u32,
    /// Path identifier, distinct per next hop of a prefix
    pub identifier: u32,
}

impl Route {
    /// Diff identity: origin and identifier are not part of it
    pub fn key(&self) -> RouteKey {
        RouteKey {
            prefix: self.prefix.clone(),
            prefix_length: self.prefix_length,
            next_hop: self.next_hop.clone(),
        }
    }

    /// Prefix in CIDR notation
    pub fn cidr(&self) -> String {
        format!("{}/{}", self.prefix, self.prefix_length)
    }

    /// Whether the attributes outside the key match
    pub fn same_attributes(&self, other: &Route) -> bool {
        self.origin == other.origin && self.identifier == other.identifier
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} via {}", self.prefix, self.prefix_length, self.next_hop)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouteKey {
    pub prefix: String,
    pub prefix_length: u8,
    pub next_hop: String,
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}-{}", self.prefix, self.prefix_length, self.next_hop)
    }
}

pub type RouteMap = HashMap<RouteKey, Route>;

/// Index routes by key. A later route with the same key replaces an earlier one.
pub fn route_map(routes: impl IntoIterator<Item = Route>) -> RouteMap {
    routes.into_iter().map(|r| (r.key(), r)).collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateType {
    Added,
    Updated,
    Deleted,
}

impl fmt::Display for UpdateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateType::Added => f.write_str("added"),
            UpdateType::Updated => f.write_str("updated"),
            UpdateType::Deleted => f.write_str("deleted"),
        }
    }
}

/// One incremental change derived from a watch event and a next hop
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteUpdate {
    pub kind: UpdateType,
    pub route: Route,
}

impl RouteUpdate {
    pub fn added(route: Route) -> Self {
        Self { kind: UpdateType::Added, route }
    }

    pub fn updated(route: Route) -> Self {
        Self { kind: UpdateType::Updated, route }
    }

    pub fn deleted(route: Route) -> Self {
        Self { kind: UpdateType::Deleted, route }
    }
}
