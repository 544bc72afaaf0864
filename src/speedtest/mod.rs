/// `info!` when the run is verbose, `debug!` otherwise.
macro_rules! verbose {
    ($on:expr, $($arg:tt)+) => {
        if $on {
            tracing::info!($($arg)+)
        } else {
            tracing::debug!($($arg)+)
        }
    };
}

pub mod counters;
pub mod discovery;
pub mod download;
pub mod resolve;
pub mod sampler;

use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::SpeedTestError;
use counters::{ByteCounterTable, ByteSource};
use discovery::{FastComProvider, UrlProvider, MAX_URLS};
use download::StreamDownloader;
use sampler::{BandwidthEstimate, SamplerConfig, ThroughputSample, ThroughputSampler};

/// A download endpoint handed out by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TestUrl(String);

impl TestUrl {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn host(&self) -> Option<String> {
        url::Url::parse(&self.0)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.trim_matches(&['[', ']'][..]).to_string()))
    }
}

impl From<String> for TestUrl {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TestUrl {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for TestUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasureOptions {
    pub verbose: bool,
    pub max_time_secs: u64,
    pub force_ipv4: bool,
    pub force_ipv6: bool,
    /// URLs to ask the provider for; clamped to `1..=3`.
    pub url_count: usize,
}

impl Default for MeasureOptions {
    fn default() -> Self {
        Self {
            verbose: false,
            max_time_secs: 15,
            force_ipv4: false,
            force_ipv6: false,
            url_count: MAX_URLS,
        }
    }
}

impl MeasureOptions {
    pub fn url_count(&self) -> usize {
        self.url_count.clamp(1, MAX_URLS)
    }

    pub fn max_time(&self) -> Duration {
        Duration::from_secs(self.max_time_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestPhase {
    Idle,
    Discovering,
    Measuring,
    Complete,
}

/// Progress reported to front ends while a run is in flight.
#[derive(Debug, Clone)]
pub enum TestUpdate {
    Discovered { urls: Vec<TestUrl> },
    Sample(ThroughputSample),
    Complete { estimate: BandwidthEstimate },
    Failed { reason: String },
}

/// One measurement run: discovery, parallel downloads, sampling.
pub struct SpeedTest {
    options: MeasureOptions,
    sampler: SamplerConfig,
    update_tx: Option<mpsc::Sender<TestUpdate>>,
}

impl SpeedTest {
    pub fn new(options: MeasureOptions, sampler: SamplerConfig) -> Self {
        let sampler = sampler.with_max_time(options.max_time());
        Self {
            options,
            sampler,
            update_tx: None,
        }
    }

    pub fn with_progress(mut self, tx: mpsc::Sender<TestUpdate>) -> Self {
        self.update_tx = Some(tx);
        self
    }

    pub fn sampler_config(&self) -> &SamplerConfig {
        &self.sampler
    }

    /// Run against `provider`. Discovery failure is the only error; stream
    /// failures just lower the figure.
    pub async fn run<P: UrlProvider + ?Sized>(
        &self,
        provider: &P,
    ) -> Result<BandwidthEstimate, SpeedTestError> {
        let client = build_client()?;
        let mut urls = provider.resolve_test_urls(&self.options).await?;
        urls.truncate(MAX_URLS);

        verbose!(self.options.verbose, count = urls.len(), "discovered test urls");
        for url in &urls {
            verbose!(self.options.verbose, %url, "test url");
            if self.options.verbose {
                resolve::probe_ipv6(url).await;
            }
        }
        self.notify(TestUpdate::Discovered { urls: urls.clone() }).await;

        if urls.is_empty() {
            return Ok(BandwidthEstimate::ZERO);
        }

        let table = ByteCounterTable::new(urls.len());
        let mut streams = Streams(Vec::with_capacity(urls.len()));
        for (index, url) in urls.into_iter().enumerate() {
            if let Some(slot) = table.slot(index) {
                streams.0.push(StreamDownloader::new(client.clone(), url, slot).spawn());
            }
        }

        let mut sampler = ThroughputSampler::new(self.sampler).verbose(self.options.verbose);
        if let Some(tx) = self.update_tx.clone() {
            sampler = sampler.on_sample(move |sample| {
                let _ = tx.try_send(TestUpdate::Sample(sample.clone()));
            });
        }

        let report = sampler.run(&table).await;
        drop(streams);

        let estimate = report.estimate();
        tracing::info!(
            streams = table.len(),
            peak_kbps = report.peak_kbps,
            total_bytes = table.total(),
            "measured {} Mbps",
            estimate
        );
        Ok(estimate)
    }

    async fn notify(&self, update: TestUpdate) {
        if let Some(tx) = &self.update_tx {
            let _ = tx.send(update).await;
        }
    }
}

/// Downloader tasks of a run. Dropping aborts them without waiting, which
/// also covers a run that is itself cancelled mid-sampling.
struct Streams(Vec<JoinHandle<()>>);

impl Drop for Streams {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

/// HTTP client shared by discovery and the download streams.
pub fn build_client() -> Result<reqwest::Client, SpeedTestError> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(SpeedTestError::Client)
}

/// Measure download bandwidth via fast.com. Never fails: 0.0 means no
/// connectivity (or nothing measurable).
pub async fn measure(options: MeasureOptions) -> f64 {
    let client = match build_client() {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!("speed test failed: {}", e);
            return 0.0;
        }
    };
    measure_with(&FastComProvider::new(client), options, SamplerConfig::default()).await
}

/// [`measure`] against any URL provider and sampler timing.
pub async fn measure_with<P: UrlProvider + ?Sized>(
    provider: &P,
    options: MeasureOptions,
    sampler: SamplerConfig,
) -> f64 {
    match SpeedTest::new(options, sampler).run(provider).await {
        Ok(estimate) => estimate.mbps(),
        Err(e) => {
            tracing::warn!("speed test failed: {}", e);
            0.0
        }
    }
}
