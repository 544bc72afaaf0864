use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use super::resolve::{self, AddressFamily};
use super::{MeasureOptions, TestUrl};
use crate::error::DiscoveryError;

const LANDING_URL: &str = "https://fast.com/";
const SCRIPT_BASE: &str = "https://fast.com";
const API_BASE: &str = "https://api.fast.com/";
const API_TIMEOUT: Duration = Duration::from_secs(2);

/// The provider never hands out more than this many URLs.
pub const MAX_URLS: usize = 3;

/// Source of download URLs for a run.
#[async_trait]
pub trait UrlProvider: Send + Sync {
    async fn resolve_test_urls(
        &self,
        options: &MeasureOptions,
    ) -> Result<Vec<TestUrl>, DiscoveryError>;
}

/// Fixed list of URLs, e.g. from the command line.
#[derive(Debug, Clone, Default)]
pub struct StaticProvider {
    urls: Vec<TestUrl>,
}

impl StaticProvider {
    pub fn new<I, U>(urls: I) -> Self
    where
        I: IntoIterator<Item = U>,
        U: Into<TestUrl>,
    {
        Self {
            urls: urls.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl UrlProvider for StaticProvider {
    async fn resolve_test_urls(
        &self,
        options: &MeasureOptions,
    ) -> Result<Vec<TestUrl>, DiscoveryError> {
        Ok(self.urls.iter().take(options.url_count()).cloned().collect())
    }
}

/// Where the landing page, its scripts and the URL API live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub landing: String,
    /// Prefix for the script path found on the landing page (no trailing slash).
    pub script_base: String,
    /// API root, with a trailing slash.
    pub api_base: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            landing: LANDING_URL.to_string(),
            script_base: SCRIPT_BASE.to_string(),
            api_base: API_BASE.to_string(),
        }
    }
}

/// Scrapes fast.com for a token and asks its API for download URLs.
#[derive(Debug, Clone)]
pub struct FastComProvider {
    client: reqwest::Client,
    endpoints: Endpoints,
}

impl FastComProvider {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            endpoints: Endpoints::default(),
        }
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    async fn fetch_text(&self, url: &str) -> Result<String, DiscoveryError> {
        let request_err = |source| DiscoveryError::Request {
            url: url.to_string(),
            source,
        };
        let response = self.client.get(url).send().await.map_err(request_err)?;
        let status = response.status();
        if !status.is_success() {
            return Err(DiscoveryError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        response.text().await.map_err(request_err)
    }

    async fn api_base(&self, options: &MeasureOptions) -> Result<String, DiscoveryError> {
        let family = match options.forced_family() {
            Some(family) => family,
            None => return Ok(self.endpoints.api_base.clone()),
        };
        let bad_endpoint = || DiscoveryError::Endpoint(self.endpoints.api_base.clone());
        let base = Url::parse(&self.endpoints.api_base).map_err(|_| bad_endpoint())?;
        let host = base
            .host_str()
            .ok_or_else(bad_endpoint)?
            .trim_matches(&['[', ']'][..])
            .to_string();
        let addr = resolve::resolve(&host, family).await?;
        literal_base(&base, addr).ok_or_else(bad_endpoint)
    }
}

#[async_trait]
impl UrlProvider for FastComProvider {
    async fn resolve_test_urls(
        &self,
        options: &MeasureOptions,
    ) -> Result<Vec<TestUrl>, DiscoveryError> {
        let landing = self.fetch_text(&self.endpoints.landing).await?;
        let script = extract_script_path(&landing).ok_or(DiscoveryError::ScriptNotFound)?;

        let script_url = format!("{}{}", self.endpoints.script_base, script);
        verbose!(options.verbose, %script_url, "javascript url");
        let script_body = self.fetch_text(&script_url).await?;
        let token = extract_token(&script_body)
            .ok_or_else(|| DiscoveryError::TokenNotFound(script_url.clone()))?;
        verbose!(options.verbose, token, "token");

        let base = self.api_base(options).await?;
        let url = api_url(&base, token, options.url_count());
        verbose!(options.verbose, %url, "API url");

        let response = self
            .client
            .get(&url)
            .timeout(API_TIMEOUT)
            .send()
            .await
            .map_err(|source| DiscoveryError::Request {
                url: url.clone(),
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(DiscoveryError::Status {
                url,
                status: status.as_u16(),
            });
        }
        let body = response
            .text()
            .await
            .map_err(|source| DiscoveryError::Request { url, source })?;

        let urls = parse_targets(&body)?;
        verbose!(options.verbose, count = urls.len(), "number of URLs");
        Ok(urls)
    }
}

fn literal_base(base: &Url, addr: IpAddr) -> Option<String> {
    // The API won't do TLS to a bare address, so forced-family lookups use plain HTTP.
    let mut url = base.clone();
    url.set_scheme("http").ok()?;
    url.set_ip_host(addr).ok()?;
    Some(url.to_string())
}

/// Script path from the landing page: the first quoted value on the last
/// line mentioning `script src`.
pub fn extract_script_path(html: &str) -> Option<&str> {
    html.lines()
        .filter(|line| line.contains("script src"))
        .last()
        .and_then(|line| line.split('"').nth(1))
}

/// API token from the (minified) script: the first non-empty quoted value in
/// a comma-separated fragment containing `token:`.
pub fn extract_token(script: &str) -> Option<&str> {
    script
        .split(',')
        .filter(|part| part.contains("token:"))
        .filter_map(|part| part.split('"').nth(1))
        .find(|token| !token.is_empty())
}

pub fn api_url(base: &str, token: &str, url_count: usize) -> String {
    format!(
        "{}netflix/speedtest?https=true&token={}&urlCount={}",
        base, token, url_count
    )
}

#[derive(Debug, Deserialize)]
struct Target {
    url: String,
}

/// Download URLs from the API's JSON array, capped at [`MAX_URLS`].
pub fn parse_targets(body: &str) -> Result<Vec<TestUrl>, DiscoveryError> {
    let targets: Vec<Target> = serde_json::from_str(body)?;
    Ok(targets
        .into_iter()
        .take(MAX_URLS)
        .map(|t| TestUrl::from(t.url))
        .collect())
}

impl MeasureOptions {
    /// Family to force for the API request. IPv4 wins if both are set.
    pub fn forced_family(&self) -> Option<AddressFamily> {
        if self.force_ipv4 {
            Some(AddressFamily::V4)
        } else if self.force_ipv6 {
            Some(AddressFamily::V6)
        } else {
            None
        }
    }
}
