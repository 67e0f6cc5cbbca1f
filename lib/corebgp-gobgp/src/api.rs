//! GoBGP v3 gRPC messages (package `apipb`) used by the updater.
//!
//! Only the fields the updater reads or writes are declared. Unknown fields
//! sent by the speaker are skipped by the decoder.

use crate::{AdapterError, Result};
use prost::Message;
use prost_types::Any;

pub const AFI_IP: i32 = 1;
pub const AFI_IP6: i32 = 2;
pub const SAFI_UNICAST: i32 = 1;

pub const TABLE_TYPE_GLOBAL: i32 = 0;

pub const LOOKUP_EXACT: i32 = 0;
pub const LOOKUP_LONGER: i32 = 1;

const TYPE_URL_PREFIX: &str = "type.googleapis.com/apipb.";

#[derive(Clone, PartialEq, Message)]
pub struct Family {
    #[prost(int32, tag = "1")]
    pub afi: i32,
    #[prost(int32, tag = "2")]
    pub safi: i32,
}

impl Family {
    pub fn ipv4_unicast() -> Self {
        Self {
            afi: AFI_IP,
            safi: SAFI_UNICAST,
        }
    }

    pub fn ipv6_unicast() -> Self {
        Self {
            afi: AFI_IP6,
            safi: SAFI_UNICAST,
        }
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct Path {
    #[prost(message, optional, tag = "1")]
    pub nlri: Option<Any>,
    #[prost(message, repeated, tag = "2")]
    pub pattrs: Vec<Any>,
    #[prost(bool, tag = "4")]
    pub best: bool,
    #[prost(bool, tag = "5")]
    pub is_withdraw: bool,
    #[prost(message, optional, tag = "9")]
    pub family: Option<Family>,
    #[prost(string, tag = "15")]
    pub neighbor_ip: String,
    #[prost(bytes = "vec", tag = "16")]
    pub uuid: Vec<u8>,
    #[prost(uint32, tag = "18")]
    pub identifier: u32,
    #[prost(uint32, tag = "19")]
    pub local_identifier: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct Destination {
    #[prost(string, tag = "1")]
    pub prefix: String,
    #[prost(message, repeated, tag = "2")]
    pub paths: Vec<Path>,
}

#[derive(Clone, PartialEq, Message)]
pub struct TableLookupPrefix {
    #[prost(string, tag = "1")]
    pub prefix: String,
    #[prost(int32, tag = "2")]
    pub lookup_type: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct Global {
    #[prost(uint32, tag = "1")]
    pub asn: u32,
    #[prost(string, tag = "2")]
    pub router_id: String,
    #[prost(int32, tag = "3")]
    pub listen_port: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct GetBgpRequest {}

#[derive(Clone, PartialEq, Message)]
pub struct GetBgpResponse {
    #[prost(message, optional, tag = "1")]
    pub global: Option<Global>,
}

#[derive(Clone, PartialEq, Message)]
pub struct AddPathRequest {
    #[prost(int32, tag = "1")]
    pub table_type: i32,
    #[prost(string, tag = "2")]
    pub vrf_id: String,
    #[prost(message, optional, tag = "3")]
    pub path: Option<Path>,
}

#[derive(Clone, PartialEq, Message)]
pub struct AddPathResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub uuid: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct DeletePathRequest {
    #[prost(int32, tag = "1")]
    pub table_type: i32,
    #[prost(string, tag = "2")]
    pub vrf_id: String,
    #[prost(message, optional, tag = "3")]
    pub family: Option<Family>,
    #[prost(message, optional, tag = "4")]
    pub path: Option<Path>,
    #[prost(bytes = "vec", tag = "5")]
    pub uuid: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ListPathRequest {
    #[prost(int32, tag = "1")]
    pub table_type: i32,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(message, optional, tag = "3")]
    pub family: Option<Family>,
    #[prost(message, repeated, tag = "4")]
    pub prefixes: Vec<TableLookupPrefix>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ListPathResponse {
    #[prost(message, optional, tag = "1")]
    pub destination: Option<Destination>,
}

// Path attributes and NLRI, carried inside google.protobuf.Any

#[derive(Clone, PartialEq, Message)]
pub struct IpAddressPrefix {
    #[prost(uint32, tag = "1")]
    pub prefix_len: u32,
    #[prost(string, tag = "2")]
    pub prefix: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct OriginAttribute {
    #[prost(uint32, tag = "1")]
    pub origin: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct NextHopAttribute {
    #[prost(string, tag = "1")]
    pub next_hop: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct MpReachNlriAttribute {
    #[prost(message, optional, tag = "1")]
    pub family: Option<Family>,
    #[prost(string, repeated, tag = "2")]
    pub next_hops: Vec<String>,
    #[prost(message, repeated, tag = "3")]
    pub nlris: Vec<Any>,
}

/// Messages that travel packed in an `Any`
pub trait Packed: Message + Default + Sized {
    const TYPE_NAME: &'static str;

    fn type_url() -> String {
        format!("{}{}", TYPE_URL_PREFIX, Self::TYPE_NAME)
    }

    fn pack(&self) -> Any {
        Any {
            type_url: Self::type_url(),
            value: self.encode_to_vec(),
        }
    }

    /// `None` when `any` holds a different message type
    fn unpack(any: &Any) -> Option<Result<Self>> {
        if any.type_url != Self::type_url() {
            return None;
        }
        Some(
            Self::decode(any.value.as_slice()).map_err(|source| AdapterError::Decode {
                kind: Self::TYPE_NAME,
                source,
            }),
        )
    }
}

impl Packed for IpAddressPrefix {
    const TYPE_NAME: &'static str = "IPAddressPrefix";
}

impl Packed for OriginAttribute {
    const TYPE_NAME: &'static str = "OriginAttribute";
}

impl Packed for NextHopAttribute {
    const TYPE_NAME: &'static str = "NextHopAttribute";
}

impl Packed for MpReachNlriAttribute {
    const TYPE_NAME: &'static str = "MpReachNLRIAttribute";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_uses_gobgp_type_urls() {
        let any = NextHopAttribute {
            next_hop: "192.0.2.1".to_string(),
        }
        .pack();
        assert_eq!(any.type_url, "type.googleapis.com/apipb.NextHopAttribute");
        assert_eq!(
            MpReachNlriAttribute::type_url(),
            "type.googleapis.com/apipb.MpReachNLRIAttribute"
        );
    }

    #[test]
    fn test_unpack_checks_type() {
        let any = OriginAttribute { origin: 2 }.pack();

        assert!(NextHopAttribute::unpack(&any).is_none());
        assert_eq!(OriginAttribute::unpack(&any).unwrap().unwrap().origin, 2);
    }

    #[test]
    fn test_unpack_reports_corrupt_payload() {
        let any = Any {
            type_url: IpAddressPrefix::type_url(),
            value: vec![0xff, 0xff, 0xff],
        };
        assert!(matches!(
            IpAddressPrefix::unpack(&any),
            Some(Err(AdapterError::Decode { .. }))
        ));
    }
}
