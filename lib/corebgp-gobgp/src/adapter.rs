//! Translation between domain routes and GoBGP paths

use crate::api::{
    AddPathRequest, DeletePathRequest, Family, GetBgpRequest, IpAddressPrefix, ListPathRequest,
    MpReachNlriAttribute, NextHopAttribute, OriginAttribute, Packed, Path, TableLookupPrefix, AFI_IP6,
    LOOKUP_LONGER, TABLE_TYPE_GLOBAL,
};
use crate::{AdapterError, Result, SpeakerApi};
use async_trait::async_trait;
use corebgp_model::{Route, ORIGIN_IGP};
use ipnetwork::IpNetwork;
use std::future::Future;
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

/// Route operations against the BGP speaker
#[async_trait]
pub trait RouteAdapter: Send + Sync {
    /// Cheap liveness check
    async fn probe(&self) -> Result<()>;

    /// Install paths that share one prefix. The first failure aborts the call.
    async fn add_paths(&self, routes: &[Route]) -> Result<()>;

    /// Withdraw exactly one path, matched by prefix, next hop and identifier
    async fn delete_path(&self, route: &Route) -> Result<()>;

    /// Every installed path covered by one of the filters (CIDR, longest match)
    async fn list_paths(&self, prefix_filters: &[String]) -> Result<Vec<Route>>;
}

/// Upper bounds for single speaker calls
#[derive(Clone, Debug, PartialEq)]
pub struct CallTimeouts {
    pub probe: Duration,
    pub add: Duration,
    pub delete: Duration,
    pub list: Duration,
}

impl Default for CallTimeouts {
    fn default() -> Self {
        Self {
            probe: Duration::from_secs(10),
            add: Duration::from_secs(5),
            delete: Duration::from_secs(10),
            list: Duration::from_secs(10),
        }
    }
}

/// `RouteAdapter` over the GoBGP API
pub struct GobgpAdapter<S> {
    speaker: S,
    timeouts: CallTimeouts,
}

impl<S: SpeakerApi> GobgpAdapter<S> {
    pub fn new(speaker: S, timeouts: CallTimeouts) -> Self {
        Self { speaker, timeouts }
    }

    pub fn speaker(&self) -> &S {
        &self.speaker
    }
}

async fn bounded<T>(op: &'static str, after: Duration, call: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::time::timeout(after, call)
        .await
        .map_err(|_| AdapterError::Timeout { op, after })?
}

fn family_of(address: &str) -> Result<Family> {
    match IpAddr::from_str(address) {
        Ok(IpAddr::V4(_)) => Ok(Family::ipv4_unicast()),
        Ok(IpAddr::V6(_)) => Ok(Family::ipv6_unicast()),
        Err(_) => Err(AdapterError::InvalidPrefix(address.to_string())),
    }
}

fn nlri_for(route: &Route) -> IpAddressPrefix {
    IpAddressPrefix {
        prefix_len: route.prefix_length as u32,
        prefix: route.prefix.clone(),
    }
}

/// IPv4 paths carry NEXT_HOP, IPv6 paths carry it inside MP_REACH_NLRI
fn next_hop_attribute(route: &Route, family: &Family) -> prost_types::Any {
    if family.afi == AFI_IP6 {
        MpReachNlriAttribute {
            family: Some(family.clone()),
            next_hops: vec![route.next_hop.clone()],
            nlris: vec![nlri_for(route).pack()],
        }
        .pack()
    } else {
        NextHopAttribute {
            next_hop: route.next_hop.clone(),
        }
        .pack()
    }
}

/// Full path for installing `route`
pub fn path_for(route: &Route) -> Result<Path> {
    let family = family_of(&route.prefix)?;

    Ok(Path {
        nlri: Some(nlri_for(route).pack()),
        pattrs: vec![
            OriginAttribute { origin: route.origin }.pack(),
            next_hop_attribute(route, &family),
        ],
        family: Some(family),
        identifier: route.identifier,
        ..Default::default()
    })
}

/// Minimal path that identifies `route` for withdrawal
pub fn withdrawal_for(route: &Route) -> Result<Path> {
    let family = family_of(&route.prefix)?;

    Ok(Path {
        nlri: Some(nlri_for(route).pack()),
        pattrs: vec![next_hop_attribute(route, &family)],
        family: Some(family),
        identifier: route.identifier,
        ..Default::default()
    })
}

/// Rebuild a route from one listed path of `destination`.
///
/// Attributes are scanned in order and the first of each kind wins. A path
/// without any next hop attribute yields `None`.
pub fn route_from_path(destination: &IpNetwork, path: &Path) -> Result<Option<Route>> {
    let mut next_hop = None;
    let mut origin = None;

    for attr in &path.pattrs {
        if next_hop.is_none() {
            if let Some(nh) = NextHopAttribute::unpack(attr) {
                next_hop = Some(nh?.next_hop);
                continue;
            }
            if let Some(mp) = MpReachNlriAttribute::unpack(attr) {
                next_hop = mp?.next_hops.into_iter().next();
                continue;
            }
        }
        if origin.is_none() {
            if let Some(o) = OriginAttribute::unpack(attr) {
                origin = Some(o?.origin);
            }
        }
    }

    Ok(next_hop.map(|next_hop| Route {
        prefix: destination.network().to_string(),
        prefix_length: destination.prefix(),
        next_hop,
        origin: origin.unwrap_or(ORIGIN_IGP),
        identifier: path.identifier,
    }))
}

#[async_trait]
impl<S: SpeakerApi> RouteAdapter for GobgpAdapter<S> {
    async fn probe(&self) -> Result<()> {
        let response = bounded("GetBgp", self.timeouts.probe, self.speaker.get_bgp(GetBgpRequest {})).await?;
        if let Some(global) = response.global {
            debug!(asn = global.asn, router_id = %global.router_id, "GoBGP is alive");
        }
        Ok(())
    }

    async fn add_paths(&self, routes: &[Route]) -> Result<()> {
        let Some(first) = routes.first() else {
            return Ok(());
        };
        if let Some(other) = routes.iter().find(|r| r.cidr() != first.cidr()) {
            return Err(AdapterError::MixedPrefixes(first.cidr(), other.cidr()));
        }

        for route in routes {
            let request = AddPathRequest {
                table_type: TABLE_TYPE_GLOBAL,
                path: Some(path_for(route)?),
                ..Default::default()
            };
            bounded("AddPath", self.timeouts.add, self.speaker.add_path(request)).await?;
            debug!(identifier = route.identifier, "Installed path {}", route);
        }

        Ok(())
    }

    async fn delete_path(&self, route: &Route) -> Result<()> {
        let path = withdrawal_for(route)?;
        let request = DeletePathRequest {
            table_type: TABLE_TYPE_GLOBAL,
            family: path.family.clone(),
            path: Some(path),
            ..Default::default()
        };
        bounded("DeletePath", self.timeouts.delete, self.speaker.delete_path(request)).await?;
        debug!(identifier = route.identifier, "Withdrew path {}", route);

        Ok(())
    }

    async fn list_paths(&self, prefix_filters: &[String]) -> Result<Vec<Route>> {
        // one ListPath per address family, each with its own lookups
        let mut v4 = Vec::new();
        let mut v6 = Vec::new();
        for filter in prefix_filters {
            let network =
                IpNetwork::from_str(filter).map_err(|_| AdapterError::InvalidPrefix(filter.clone()))?;
            let lookup = TableLookupPrefix {
                prefix: filter.clone(),
                lookup_type: LOOKUP_LONGER,
            };
            match network {
                IpNetwork::V4(_) => v4.push(lookup),
                IpNetwork::V6(_) => v6.push(lookup),
            }
        }

        let mut requests = Vec::new();
        if !v4.is_empty() || prefix_filters.is_empty() {
            requests.push((Family::ipv4_unicast(), v4));
        }
        if !v6.is_empty() {
            requests.push((Family::ipv6_unicast(), v6));
        }

        let mut routes = Vec::new();
        for (family, prefixes) in requests {
            let request = ListPathRequest {
                table_type: TABLE_TYPE_GLOBAL,
                family: Some(family),
                prefixes,
                ..Default::default()
            };
            let responses = bounded("ListPath", self.timeouts.list, self.speaker.list_path(request)).await?;

            for destination in responses.into_iter().filter_map(|r| r.destination) {
                let network = match IpNetwork::from_str(&destination.prefix) {
                    Ok(network) => network,
                    Err(e) => {
                        warn!(prefix = %destination.prefix, error = %e, "Skipping destination with unparsable prefix");
                        continue;
                    }
                };

                for path in destination.paths.iter().filter(|p| !p.is_withdraw) {
                    match route_from_path(&network, path) {
                        Ok(Some(route)) => routes.push(route),
                        Ok(None) => warn!(prefix = %destination.prefix, "Skipping path without next hop"),
                        Err(e) => warn!(prefix = %destination.prefix, error = %e, "Skipping undecodable path"),
                    }
                }
            }
        }

        debug!("Listed {} installed paths", routes.len());
        Ok(routes)
    }
}
