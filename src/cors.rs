//! # Origin Authorization
//!
//! Every request passes through [`CorsPolicy::is_allowed`] before its target
//! is parsed. A denied request is answered with 401 and never reaches the
//! router.
//!
//! Two mutually exclusive modes exist:
//!
//! - **Domains**: the `Origin` header must equal one of the configured
//!   entries byte for byte, unless an entry is the wildcard `*`.
//! - **Networks**: the peer address of the TCP connection must be a host
//!   address of one of the configured CIDR networks of its family.
//!
//! IPv4-mapped IPv6 peers (`::ffff:a.b.c.d`) are checked as IPv4, so a
//! dual-stack listener behaves like an IPv4 one.

use ipnet::{Ipv4Net, Ipv6Net};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Wildcard entry accepted in domain mode.
pub const ANY_ORIGIN: &str = "*";

/// CIDR allow-lists, one per address family.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkList {
    pub v4: Vec<Ipv4Net>,
    pub v6: Vec<Ipv6Net>,
}

impl NetworkList {
    /// Whether `addr` is a host address of any IPv4 network.
    ///
    /// Networks wider than /31 reserve their network and broadcast
    /// addresses, which are never treated as hosts.
    #[must_use]
    pub fn contains_v4(&self, addr: Ipv4Addr) -> bool {
        self.v4.iter().any(|net| {
            if !net.contains(&addr) {
                return false;
            }
            net.prefix_len() >= 31 || (addr != net.network() && addr != net.broadcast())
        })
    }

    #[must_use]
    pub fn contains_v6(&self, addr: Ipv6Addr) -> bool {
        self.v6.iter().any(|net| net.contains(&addr))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.v4.is_empty() && self.v6.is_empty()
    }
}

/// How requests are authorized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorsPolicy {
    /// Allow-list of `Origin` header values.
    Domains(Vec<String>),
    /// Allow-list of peer networks.
    Networks(NetworkList),
}

impl CorsPolicy {
    /// Decide whether a request from `peer` carrying `origin` may proceed.
    #[must_use]
    pub fn is_allowed(&self, origin: Option<&str>, peer: IpAddr) -> bool {
        match self {
            CorsPolicy::Domains(entries) => entries
                .iter()
                .any(|entry| entry == ANY_ORIGIN || Some(entry.as_str()) == origin),
            CorsPolicy::Networks(networks) => match canonical(peer) {
                IpAddr::V4(addr) => networks.contains_v4(addr),
                IpAddr::V6(addr) => networks.contains_v6(addr),
            },
        }
    }

    /// Short label for log fields.
    #[must_use]
    pub fn mode(&self) -> &'static str {
        match self {
            CorsPolicy::Domains(_) => "domain",
            CorsPolicy::Networks(_) => "cidr",
        }
    }
}

fn canonical(peer: IpAddr) -> IpAddr {
    match peer {
        IpAddr::V6(v6) => v6
            .to_ipv4_mapped()
            .map_or(IpAddr::V6(v6), IpAddr::V4),
        v4 => v4,
    }
}
