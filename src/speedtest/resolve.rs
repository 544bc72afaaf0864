//! Address-family specific lookups.
//!
//! Only used when the caller forces IPv4 or IPv6: the provider's API is then
//! reached by literal address instead of by name.

use std::fmt;
use std::net::IpAddr;

use trust_dns_resolver::config::LookupIpStrategy;
use trust_dns_resolver::TokioAsyncResolver;

use super::TestUrl;
use crate::error::ResolutionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    V4,
    V6,
}

impl AddressFamily {
    fn strategy(self) -> LookupIpStrategy {
        match self {
            AddressFamily::V4 => LookupIpStrategy::Ipv4Only,
            AddressFamily::V6 => LookupIpStrategy::Ipv6Only,
        }
    }

    pub fn matches(self, addr: &IpAddr) -> bool {
        match self {
            AddressFamily::V4 => addr.is_ipv4(),
            AddressFamily::V6 => addr.is_ipv6(),
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::V4 => f.write_str("IPv4"),
            AddressFamily::V6 => f.write_str("IPv6"),
        }
    }
}

/// First address of `family` for `host`, using the system resolver config.
pub async fn resolve(host: &str, family: AddressFamily) -> Result<IpAddr, ResolutionError> {
    if let Ok(addr) = host.parse::<IpAddr>() {
        return if family.matches(&addr) {
            Ok(addr)
        } else {
            Err(ResolutionError::WrongFamily {
                host: host.to_string(),
                addr,
                family,
            })
        };
    }

    let (config, mut opts) = trust_dns_resolver::system_conf::read_system_conf()
        .map_err(|e| ResolutionError::Config(e.to_string()))?;
    opts.ip_strategy = family.strategy();
    let resolver = TokioAsyncResolver::tokio(config, opts);

    let lookup = resolver
        .lookup_ip(host)
        .await
        .map_err(|e| ResolutionError::Lookup {
            host: host.to_string(),
            family,
            reason: e.to_string(),
        })?;

    lookup
        .iter()
        .find(|addr| family.matches(addr))
        .ok_or_else(|| ResolutionError::NoAddress {
            host: host.to_string(),
            family,
        })
}

/// Log whether a download URL's host has an IPv6 address.
///
/// Purely informational; nothing branches on the outcome.
pub async fn probe_ipv6(url: &TestUrl) {
    let Some(host) = url.host() else {
        return;
    };
    match resolve(&host, AddressFamily::V6).await {
        Ok(addr) => tracing::info!(%host, %addr, "IPv6"),
        Err(e) => tracing::debug!(%host, "no IPv6: {}", e),
    }
}
