use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use inetnum::addr::Prefix;
use serde_derive::{Deserialize, Serialize};

use super::errors::RibError;

//------------ Scope ---------------------------------------------------------

/// The reachability class of an address, or of a route.
///
/// Scopes are ordered from narrowest to widest, so that a protocol's
/// minimum scope can be checked with a plain comparison.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Host,
    Link,
    Site,
    #[serde(alias = "organization")]
    Org,
    Universe,
    Undefined,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Host => write!(f, "host"),
            Scope::Link => write!(f, "link"),
            Scope::Site => write!(f, "site"),
            Scope::Org => write!(f, "organization"),
            Scope::Universe => write!(f, "universe"),
            Scope::Undefined => write!(f, "undefined"),
        }
    }
}

//------------ AddrClass -----------------------------------------------------

/// What kind of destination an address is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AddrClass {
    Host,
    Multicast,
    Broadcast,
}

//------------ Net -----------------------------------------------------------

/// A network as handed to the routing table by a protocol: an address and
/// a prefix length.
///
/// Unlike [`Prefix`], a `Net` may have bits set beyond its prefix length.
/// Such a net is not a valid prefix, and is refused by the route update
/// path. Everything stored in a table is valid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Net {
    addr: IpAddr,
    len: u8,
}

impl Net {
    pub fn new(addr: IpAddr, len: u8) -> Self {
        Self { addr, len }
    }

    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    pub fn len(&self) -> u8 {
        self.len
    }

    pub fn is_ipv4(&self) -> bool {
        self.addr.is_ipv4()
    }

    pub fn max_len(&self) -> u8 {
        match self.addr {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        }
    }

    /// Whether this is the default route (`/0`) or one of the two halves
    /// of it (`/1`).
    pub fn is_default_or_half(&self) -> bool {
        self.len <= 1 && self.is_valid()
    }

    /// Returns true if the length fits the address family and no bits are
    /// set outside of the mask.
    pub fn is_valid(&self) -> bool {
        if self.len > self.max_len() {
            return false;
        }
        match self.addr {
            IpAddr::V4(a) => u32::from(a) & !mask_v4(self.len) == 0,
            IpAddr::V6(a) => u128::from(a) & !mask_v6(self.len) == 0,
        }
    }

    /// Clear all bits beyond the prefix length.
    pub fn truncate(self) -> Self {
        let len = self.len.min(self.max_len());
        let addr = match self.addr {
            IpAddr::V4(a) => {
                IpAddr::V4(Ipv4Addr::from(u32::from(a) & mask_v4(len)))
            }
            IpAddr::V6(a) => {
                IpAddr::V6(Ipv6Addr::from(u128::from(a) & mask_v6(len)))
            }
        };
        Self { addr, len }
    }

    /// A 32 bit hash derived from the address bits.
    pub fn addr_hash(&self) -> u32 {
        match self.addr {
            IpAddr::V4(a) => fold_u32(u32::from(a)),
            IpAddr::V6(a) => {
                let a = u128::from(a);
                fold_u32(
                    (a as u32)
                        ^ ((a >> 32) as u32)
                        ^ ((a >> 64) as u32)
                        ^ ((a >> 96) as u32),
                )
            }
        }
    }

    /// The hash used to place this net in a FIB bucket.
    pub fn hash(&self) -> u32 {
        self.addr_hash() ^ (self.len as u32).rotate_left(24)
    }

    /// Classify the network address of this net. The default route and its
    /// two halves are always hosts of universal scope.
    pub fn classify(&self) -> Option<(AddrClass, Scope)> {
        if self.len <= 1 {
            return Some((AddrClass::Host, Scope::Universe));
        }
        classify_addr(self.addr)
    }

    pub fn to_prefix(&self) -> Option<Prefix> {
        Prefix::new(self.addr, self.len).ok()
    }
}

impl From<Prefix> for Net {
    fn from(value: Prefix) -> Self {
        Self {
            addr: value.addr(),
            len: value.len(),
        }
    }
}

impl TryFrom<Net> for Prefix {
    type Error = RibError;

    fn try_from(value: Net) -> Result<Self, Self::Error> {
        value.to_prefix().ok_or(RibError::InvalidNet(value))
    }
}

impl FromStr for Net {
    type Err = RibError;

    /// Parse `addr/len`, without requiring the host bits to be clear. A
    /// missing length means a host route.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, len) = match s.split_once('/') {
            Some((addr, len)) => (addr, Some(len)),
            None => (s, None),
        };
        let addr = IpAddr::from_str(addr.trim())
            .map_err(|_| RibError::ParseNet(s.to_string()))?;
        let len = match len {
            Some(len) => len
                .trim()
                .parse::<u8>()
                .map_err(|_| RibError::ParseNet(s.to_string()))?,
            None => match addr {
                IpAddr::V4(_) => 32,
                IpAddr::V6(_) => 128,
            },
        };
        Ok(Self { addr, len })
    }
}

impl fmt::Display for Net {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.len)
    }
}

//------------ Helpers -------------------------------------------------------

fn mask_v4(len: u8) -> u32 {
    u32::MAX.checked_shl(32 - len.min(32) as u32).unwrap_or(0)
}

fn mask_v6(len: u8) -> u128 {
    u128::MAX.checked_shl(128 - len.min(128) as u32).unwrap_or(0)
}

fn fold_u32(mut a: u32) -> u32 {
    a ^= a >> 16;
    a ^= a << 10;
    a
}

fn classify_v4(a: u32) -> Option<(AddrClass, Scope)> {
    let b = a >> 24;
    if b != 0 && b <= 0xdf {
        return Some(if b == 0x7f {
            (AddrClass::Host, Scope::Host)
        } else if a & 0xffff_0000 == 0xa9fe_0000 {
            (AddrClass::Host, Scope::Link)
        } else if b == 0x0a
            || a & 0xffff_0000 == 0xc0a8_0000
            || a & 0xfff0_0000 == 0xac10_0000
        {
            (AddrClass::Host, Scope::Site)
        } else {
            (AddrClass::Host, Scope::Universe)
        });
    }
    if (0xe0..=0xef).contains(&b) {
        return Some((AddrClass::Multicast, Scope::Universe));
    }
    if a == u32::MAX {
        return Some((AddrClass::Broadcast, Scope::Link));
    }
    None
}

fn classify_v6(a: u128) -> Option<(AddrClass, Scope)> {
    let x = (a >> 96) as u32;
    if x & 0xe000_0000 == 0x2000_0000 {
        return Some((AddrClass::Host, Scope::Universe));
    }
    if x & 0xffc0_0000 == 0xfe80_0000 {
        return Some((AddrClass::Host, Scope::Link));
    }
    if x & 0xffc0_0000 == 0xfec0_0000 || x & 0xfe00_0000 == 0xfc00_0000 {
        return Some((AddrClass::Host, Scope::Site));
    }
    if x & 0xff00_0000 == 0xff00_0000 {
        let scope = match (x >> 16) & 0x0f {
            1 => Scope::Host,
            2 => Scope::Link,
            5 => Scope::Site,
            8 => Scope::Org,
            14 => Scope::Universe,
            _ => Scope::Undefined,
        };
        return Some((AddrClass::Multicast, scope));
    }
    if a >> 64 == 0 {
        let a2 = (a >> 32) as u32;
        let a3 = a as u32;
        return match (a2, a3) {
            (0, 1) => Some((AddrClass::Host, Scope::Host)),
            // IPv4 compatible and IPv4 mapped addresses
            (0, _) | (0xffff, _) => classify_v4(a3),
            _ => None,
        };
    }
    Some((AddrClass::Host, Scope::Undefined))
}

/// Classify a single address. Returns `None` for addresses that cannot be
/// a destination at all.
pub fn classify_addr(addr: IpAddr) -> Option<(AddrClass, Scope)> {
    match addr {
        IpAddr::V4(a) => classify_v4(u32::from(a)),
        IpAddr::V6(a) => classify_v6(u128::from(a)),
    }
}

//------------ Tests ---------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn net(s: &str) -> Net {
        Net::from_str(s).unwrap()
    }

    #[test]
    fn validity_of_prefixes() {
        assert!(net("10.0.0.0/24").is_valid());
        assert!(!net("10.0.0.1/24").is_valid());
        assert!(net("10.0.0.1/32").is_valid());
        assert!(!net("10.0.0.0/33").is_valid());
        assert!(net("0.0.0.0/0").is_valid());
        assert!(net("128.0.0.0/1").is_default_or_half());
        assert!(!net("2001:db8::1/64").is_valid());
        assert!(net("2001:db8::/32").is_valid());
        assert_eq!(net("10.1.2.3/8").truncate(), net("10.0.0.0/8"));
    }

    #[test]
    fn classification() {
        assert_eq!(
            net("10.0.0.0/24").classify(),
            Some((AddrClass::Host, Scope::Site))
        );
        assert_eq!(
            net("193.0.0.0/16").classify(),
            Some((AddrClass::Host, Scope::Universe))
        );
        assert_eq!(
            net("127.0.0.0/8").classify(),
            Some((AddrClass::Host, Scope::Host))
        );
        assert_eq!(
            net("224.0.0.0/4").classify(),
            Some((AddrClass::Multicast, Scope::Universe))
        );
        assert_eq!(net("0.0.0.0/8").classify(), None);
        assert_eq!(
            net("0.0.0.0/0").classify(),
            Some((AddrClass::Host, Scope::Universe))
        );
        assert_eq!(
            net("fe80::/64").classify(),
            Some((AddrClass::Host, Scope::Link))
        );
        assert_eq!(
            net("::ffff:10.0.0.0/104").classify(),
            Some((AddrClass::Host, Scope::Site))
        );
    }

    #[test]
    fn prefix_conversion() {
        let pfx = Prefix::from_str("192.0.2.0/24").unwrap();
        let n = Net::from(pfx);
        assert_eq!(n.to_string(), "192.0.2.0/24");
        assert_eq!(Prefix::try_from(n).unwrap(), pfx);
        assert!(Prefix::try_from(net("192.0.2.1/24")).is_err());
        assert_eq!(net("192.0.2.1"), net("192.0.2.1/32"));
        assert!(Net::from_str("192.0.2.0/x").is_err());
    }

    #[test]
    fn hash_depends_on_length() {
        assert_ne!(net("10.0.0.0/8").hash(), net("10.0.0.0/16").hash());
        assert_eq!(
            net("10.0.0.0/8").addr_hash(),
            net("10.0.0.0/16").addr_hash()
        );
    }
}
