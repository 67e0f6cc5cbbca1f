//! Announcement records as stored behind the CoreBGP API

use crate::{ModelError, Result, Route, ORIGIN_IGP};
use chrono::{DateTime, Utc};
use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Desired state for one announced address and its candidate next hops.
///
/// Owned by the API layer. The updater only reads it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Announcement {
    #[serde(default)]
    pub meta: Meta,
    #[serde(default)]
    pub addresses: Addresses,
    #[serde(rename = "next-hops", default)]
    pub next_hops: Vec<String>,
    #[serde(rename = "health-check", default)]
    pub health_check: HealthCheck,
    /// Per next-hop health, maintained by the checker
    #[serde(default)]
    pub status: Vec<NextHopStatus>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub project: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Addresses {
    /// Announced address in CIDR notation, e.g. `10.0.0.1/32`
    #[serde(rename = "announced-ip", default)]
    pub announced_ip: String,
    #[serde(default)]
    pub zone: String,
    /// Subnet the announced address was allocated from
    #[serde(rename = "source-subnet", default, skip_serializing_if = "Option::is_none")]
    pub source_subnet: Option<Subnet>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Subnet {
    pub ip: String,
    pub mask: u8,
}

/// Health check parameters. Interpreted by the checker, carried here verbatim.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthCheck {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub method: String,
    /// Seconds between checks
    #[serde(default)]
    pub interval: u64,
    /// Seconds before a single check times out
    #[serde(default)]
    pub timeout: u64,
    #[serde(rename = "grace-period", default)]
    pub grace_period: u64,
}

/// Result of the latest health check for one next hop
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NextHopStatus {
    #[serde(rename = "next-hop")]
    pub next_hop: String,
    #[serde(default)]
    pub health: bool,
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: String,
    /// RFC 3339 time of the check
    #[serde(default)]
    pub timestamp: String,
}

impl NextHopStatus {
    /// Parsed check time, if the checker recorded a valid one
    pub fn checked_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }
}

/// Identity of an announcement: `(project, name)`
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnnouncementId {
    pub project: String,
    pub name: String,
}

impl fmt::Display for AnnouncementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.project, self.name)
    }
}

impl Announcement {
    pub fn id(&self) -> AnnouncementId {
        AnnouncementId {
            project: self.meta.project.clone(),
            name: self.meta.name.clone(),
        }
    }

    /// Parse the announced address into its network.
    ///
    /// A bare address without a mask is treated as a host route.
    pub fn announced_network(&self) -> Result<IpNetwork> {
        let value = self.addresses.announced_ip.trim();
        if value.is_empty() {
            return Err(ModelError::MissingPrefix(self.id().to_string()));
        }
        IpNetwork::from_str(value).map_err(|source| ModelError::InvalidPrefix {
            value: value.to_string(),
            source,
        })
    }

    /// Latest status recorded for the given next hop
    pub fn status_for(&self, next_hop: &str) -> Option<&NextHopStatus> {
        self.status.iter().find(|s| s.next_hop == next_hop)
    }

    /// A next hop without a status entry has never passed a check and is unhealthy.
    pub fn is_healthy(&self, next_hop: &str) -> bool {
        self.status_for(next_hop).map(|s| s.health).unwrap_or(false)
    }

    /// Every candidate route paired with the health of its next hop.
    ///
    /// Identifiers are the 1-based position of the next hop in `next_hops`, so
    /// paths sharing a prefix stay distinct and a withdrawal can target one of them.
    pub fn candidate_routes(&self) -> Result<Vec<(Route, bool)>> {
        let network = self.announced_network()?;
        let prefix = network.network().to_string();

        Ok(self
            .next_hops
            .iter()
            .enumerate()
            .map(|(index, next_hop)| {
                let route = Route {
                    prefix: prefix.clone(),
                    prefix_length: network.prefix(),
                    next_hop: next_hop.clone(),
                    origin: ORIGIN_IGP,
                    identifier: index as u32 + 1,
                };
                (route, self.is_healthy(next_hop))
            })
            .collect())
    }

    /// Routes for the next hops that are currently healthy
    pub fn healthy_routes(&self) -> Result<Vec<Route>> {
        Ok(self
            .candidate_routes()?
            .into_iter()
            .filter_map(|(route, healthy)| healthy.then_some(route))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn announcement(ip: &str, hops: &[(&str, bool)]) -> Announcement {
        Announcement {
            meta: Meta {
                name: "web".to_string(),
                project: "prod".to_string(),
            },
            addresses: Addresses {
                announced_ip: ip.to_string(),
                ..Default::default()
            },
            next_hops: hops.iter().map(|(h, _)| h.to_string()).collect(),
            status: hops
                .iter()
                .map(|(h, healthy)| NextHopStatus {
                    next_hop: h.to_string(),
                    health: *healthy,
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_healthy_routes_skip_unhealthy_next_hops() {
        let ann = announcement(
            "10.0.0.1/32",
            &[("192.0.2.1", true), ("192.0.2.2", false), ("192.0.2.3", true)],
        );
        let routes = ann.healthy_routes().unwrap();

        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].next_hop, "192.0.2.1");
        assert_eq!(routes[0].identifier, 1);
        assert_eq!(routes[1].next_hop, "192.0.2.3");
        assert_eq!(routes[1].identifier, 3);
        assert!(routes.iter().all(|r| r.prefix == "10.0.0.1" && r.prefix_length == 32));
    }

    #[test]
    fn test_next_hop_without_status_is_unhealthy() {
        let mut ann = announcement("10.0.0.1/32", &[("192.0.2.1", true)]);
        ann.next_hops.push("192.0.2.9".to_string());

        assert!(!ann.is_healthy("192.0.2.9"));
        assert_eq!(ann.healthy_routes().unwrap().len(), 1);
    }

    #[test]
    fn test_prefix_is_normalized_to_network() {
        let ann = announcement("10.0.0.17/24", &[("192.0.2.1", true)]);
        let routes = ann.healthy_routes().unwrap();
        assert_eq!(routes[0].prefix, "10.0.0.0");
        assert_eq!(routes[0].prefix_length, 24);
    }

    #[test]
    fn test_bare_address_is_host_route() {
        let ann = announcement("10.0.0.1", &[("192.0.2.1", true)]);
        assert_eq!(ann.healthy_routes().unwrap()[0].prefix_length, 32);
    }

    #[test]
    fn test_invalid_prefix() {
        let ann = announcement("not-an-ip/99", &[("192.0.2.1", true)]);
        assert!(matches!(
            ann.healthy_routes(),
            Err(ModelError::InvalidPrefix { .. })
        ));

        let empty = announcement("", &[("192.0.2.1", true)]);
        assert!(matches!(empty.healthy_routes(), Err(ModelError::MissingPrefix(_))));
    }

    #[test]
    fn test_decode_api_record() {
        let json = r#"{
            "meta": {"name": "web", "project": "prod"},
            "addresses": {"announced-ip": "10.0.0.1/32", "zone": "a"},
            "next-hops": ["192.0.2.1"],
            "health-check": {"path": "/healthz", "port": 8080, "method": "GET", "interval": 5, "timeout": 2, "grace-period": 10},
            "status": [{"next-hop": "192.0.2.1", "health": true, "code": 200, "message": "ok", "timestamp": "2024-05-01T12:00:00Z"}]
        }"#;
        let ann: Announcement = serde_json::from_str(json).unwrap();

        assert_eq!(ann.id().to_string(), "prod/web");
        assert_eq!(ann.health_check.grace_period, 10);
        assert!(ann.is_healthy("192.0.2.1"));
        assert!(ann.status[0].checked_at().is_some());
    }
}
