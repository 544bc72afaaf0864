//! Error types for the measurement core.
//!
//! None of these escape [`crate::measure`]: every failure ends up as a
//! zero (or reduced) bandwidth figure. They exist so front ends and logs
//! can say *why* a run produced what it did.

use std::net::IpAddr;
use thiserror::Error;

use crate::speedtest::resolve::AddressFamily;

/// Failure to obtain the list of download URLs from the provider.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("no script reference found in landing page")]
    ScriptNotFound,

    #[error("no token found in {0}")]
    TokenNotFound(String),

    #[error("malformed API response: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("cannot address {0} by literal IP")]
    Endpoint(String),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),
}

/// Failure to find an address of the requested family for a host.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("failed to read system resolver config: {0}")]
    Config(String),

    #[error("lookup of {host} ({family}) failed: {reason}")]
    Lookup {
        host: String,
        family: AddressFamily,
        reason: String,
    },

    #[error("{host} has no {family} address")]
    NoAddress { host: String, family: AddressFamily },

    #[error("{host} resolved to {addr}, which is not {family}")]
    WrongFamily {
        host: String,
        addr: IpAddr,
        family: AddressFamily,
    },
}

/// Per-stream download failure. Only ever logged; the stream just stops.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("stream {index}: {source}")]
    Request {
        index: usize,
        #[source]
        source: reqwest::Error,
    },

    #[error("stream {index}: HTTP {status}")]
    Status { index: usize, status: u16 },
}

/// Anything that stops a whole run before sampling begins.
#[derive(Debug, Error)]
pub enum SpeedTestError {
    #[error("discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}
