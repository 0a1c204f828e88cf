// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::error::Error;
use num_enum::TryFromPrimitive;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::net::IpAddr;
use std::str::FromStr;

/// Address family identifiers.
///
/// Ref: RFC 4760 §3, IANA address family numbers.
#[derive(Debug, Eq, PartialEq, TryFromPrimitive, Copy, Clone)]
#[repr(u16)]
pub enum Afi {
    /// IP version 4
    Ip = 1,

    /// IP version 6
    Ip6 = 2,

    /// Layer 2 VPN
    L2Vpn = 25,
}

/// Subsequent address family identifiers.
///
/// Ref: RFC 4760 §3, IANA SAFI namespace.
#[derive(Debug, Eq, PartialEq, TryFromPrimitive, Copy, Clone)]
#[repr(u8)]
pub enum Safi {
    /// Unicast forwarding
    Unicast = 1,

    /// BGP EVPN
    Evpn = 70,

    /// MPLS-labeled VPN address
    MplsVpn = 128,
}

/// The address families a peer may negotiate graceful restart for. `Unspec`
/// stands in for "all families" in End-of-RIB handling.
#[derive(
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    JsonSchema,
)]
#[serde(rename_all = "kebab-case")]
pub enum Family {
    Unspec,
    Ipv4Unicast,
    Ipv6Unicast,
    Ipv4Vpn,
    Ipv6Vpn,
    Evpn,
}

impl Family {
    /// Map an (AFI, SAFI) pair from the wire to a family. `Unspec` has no
    /// code points and is never produced here.
    pub fn from_codes(afi: u16, safi: u8) -> Result<Self, Error> {
        let afi = Afi::try_from(afi)?;
        let safi = Safi::try_from(safi)?;
        match (afi, safi) {
            (Afi::Ip, Safi::Unicast) => Ok(Family::Ipv4Unicast),
            (Afi::Ip6, Safi::Unicast) => Ok(Family::Ipv6Unicast),
            (Afi::Ip, Safi::MplsVpn) => Ok(Family::Ipv4Vpn),
            (Afi::Ip6, Safi::MplsVpn) => Ok(Family::Ipv6Vpn),
            (Afi::L2Vpn, Safi::Evpn) => Ok(Family::Evpn),
            _ => Err(Error::UnsupportedFamily {
                afi: afi as u16,
                safi: safi as u8,
            }),
        }
    }

    pub fn codes(&self) -> Option<(Afi, Safi)> {
        match self {
            Family::Unspec => None,
            Family::Ipv4Unicast => Some((Afi::Ip, Safi::Unicast)),
            Family::Ipv6Unicast => Some((Afi::Ip6, Safi::Unicast)),
            Family::Ipv4Vpn => Some((Afi::Ip, Safi::MplsVpn)),
            Family::Ipv6Vpn => Some((Afi::Ip6, Safi::MplsVpn)),
            Family::Evpn => Some((Afi::L2Vpn, Safi::Evpn)),
        }
    }

    pub fn afi(&self) -> Option<Afi> {
        self.codes().map(|(afi, _)| afi)
    }

    pub fn safi(&self) -> Option<Safi> {
        self.codes().map(|(_, safi)| safi)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Family::Unspec => "unspec",
            Family::Ipv4Unicast => "ipv4-unicast",
            Family::Ipv6Unicast => "ipv6-unicast",
            Family::Ipv4Vpn => "ipv4-vpn",
            Family::Ipv6Vpn => "ipv6-vpn",
            Family::Evpn => "evpn",
        }
    }
}

impl Display for Family {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Well known communities, plus a catch-all for everything else.
///
/// Ref: RFC 1997, RFC 9494 §4.
#[derive(
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    JsonSchema,
)]
pub enum Community {
    /// Do not advertise outside the local AS (0xFFFFFF01).
    NoExport,

    /// Do not advertise to any other peer (0xFFFFFF02).
    NoAdvertise,

    /// Path retained past its GR window under LLGR (0xFFFF0006).
    LlgrStale,

    /// Originator opted this path out of LLGR retention (0xFFFF0007).
    NoLlgr,

    /// Everything that is not a well known community.
    UserDefined(u32),
}

impl From<u32> for Community {
    fn from(value: u32) -> Self {
        match value {
            0xFFFFFF01 => Community::NoExport,
            0xFFFFFF02 => Community::NoAdvertise,
            0xFFFF0006 => Community::LlgrStale,
            0xFFFF0007 => Community::NoLlgr,
            v => Community::UserDefined(v),
        }
    }
}

impl From<Community> for u32 {
    fn from(value: Community) -> Self {
        match value {
            Community::NoExport => 0xFFFFFF01,
            Community::NoAdvertise => 0xFFFFFF02,
            Community::LlgrStale => 0xFFFF0006,
            Community::NoLlgr => 0xFFFF0007,
            Community::UserDefined(v) => v,
        }
    }
}

/// An IP prefix of the form `address/length`.
#[derive(
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    JsonSchema,
)]
pub struct Prefix {
    pub value: IpAddr,
    pub length: u8,
}

impl Display for Prefix {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.value, self.length)
    }
}

impl FromStr for Prefix {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (value, length) = s
            .split_once('/')
            .ok_or_else(|| Error::InvalidPrefix(s.into()))?;
        let value: IpAddr = value
            .parse()
            .map_err(|_| Error::InvalidPrefix(s.into()))?;
        let length: u8 = length
            .parse()
            .map_err(|_| Error::InvalidPrefix(s.into()))?;
        let max = if value.is_ipv4() { 32 } else { 128 };
        if length > max {
            return Err(Error::InvalidPrefix(s.into()));
        }
        Ok(Prefix { value, length })
    }
}

/// Identifies a RIB within the routing daemon, e.g. `inet.0`.
#[derive(
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Clone,
    Hash,
    Serialize,
    Deserialize,
    JsonSchema,
)]
pub struct TableName(pub String);

impl TableName {
    pub fn new(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl Display for TableName {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-path flag bits carried on RIB-In paths.
pub mod path_flags {
    /// Path marked stale during a graceful restart (RFC 4724).
    pub const STALE: u32 = 1 << 0;

    /// Path demoted a second time under long-lived graceful restart
    /// (RFC 9494).
    pub const LLGR_STALE: u32 = 1 << 1;
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn family_code_points() {
        assert_eq!(Family::from_codes(1, 1).unwrap(), Family::Ipv4Unicast);
        assert_eq!(Family::from_codes(2, 1).unwrap(), Family::Ipv6Unicast);
        assert_eq!(Family::from_codes(25, 70).unwrap(), Family::Evpn);

        // valid codes, unsupported combination
        assert!(matches!(
            Family::from_codes(25, 1),
            Err(Error::UnsupportedFamily { afi: 25, safi: 1 })
        ));

        // unknown afi
        assert!(matches!(Family::from_codes(99, 1), Err(Error::Afi(_))));

        for fam in [
            Family::Ipv4Unicast,
            Family::Ipv6Unicast,
            Family::Ipv4Vpn,
            Family::Ipv6Vpn,
            Family::Evpn,
        ] {
            let (afi, safi) = fam.codes().unwrap();
            assert_eq!(fam.afi(), Some(afi));
            assert_eq!(fam.safi(), Some(safi));
            assert_eq!(
                Family::from_codes(afi as u16, safi as u8).unwrap(),
                fam
            );
        }
        assert!(Family::Unspec.codes().is_none());
        assert!(Family::Unspec.afi().is_none());
        assert!(Family::Unspec.safi().is_none());
    }

    #[test]
    fn community_values() {
        assert_eq!(Community::from(0xFFFF0007), Community::NoLlgr);
        assert_eq!(u32::from(Community::LlgrStale), 0xFFFF0006);
        assert_eq!(Community::from(1701), Community::UserDefined(1701));
    }

    #[test]
    fn prefix_parsing() {
        let p: Prefix = "203.0.113.0/24".parse().unwrap();
        assert_eq!(p.length, 24);
        assert_eq!(p.to_string(), "203.0.113.0/24");

        let p6: Prefix = "2001:db8::/32".parse().unwrap();
        assert_eq!(p6.length, 32);

        assert!("203.0.113.0".parse::<Prefix>().is_err());
        assert!("203.0.113.0/33".parse::<Prefix>().is_err());
        assert!("bogus/8".parse::<Prefix>().is_err());
    }
}
