use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::counters::ByteSource;

/// Bytes to bits.
const BITS_PER_BYTE: f64 = 8.0;
/// Application-layer payload to network-layer bits (transport and framing overhead).
const NETWORK_OVERHEAD: f64 = 1.0415;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerConfig {
    /// Pause before the first sample so streams can ramp up.
    pub warmup: Duration,
    /// Time between samples; also the divisor for each sample's rate.
    pub interval: Duration,
    /// Measurement window. The sampler runs `max_time / interval` ticks.
    pub max_time: Duration,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            warmup: Duration::from_secs(1),
            interval: Duration::from_secs(3),
            max_time: Duration::from_secs(15),
        }
    }
}

impl SamplerConfig {
    pub fn with_max_time(mut self, max_time: Duration) -> Self {
        self.max_time = max_time;
        self
    }

    pub fn iterations(&self) -> u32 {
        let interval = self.interval.as_millis();
        if interval == 0 {
            return 0;
        }
        u32::try_from(self.max_time.as_millis() / interval).unwrap_or(u32::MAX)
    }

    /// Expected wall-clock length of a run, saturating at [`Duration::MAX`].
    pub fn total_duration(&self) -> Duration {
        self.interval
            .checked_mul(self.iterations())
            .and_then(|d| d.checked_add(self.warmup))
            .unwrap_or(Duration::MAX)
    }
}

/// Two consecutive readings of the byte total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleWindow {
    pub start: Instant,
    pub end: Instant,
    pub bytes_at_start: u64,
    pub bytes_at_end: u64,
}

impl SampleWindow {
    pub fn delta_bytes(&self) -> u64 {
        self.bytes_at_end.saturating_sub(self.bytes_at_start)
    }

    pub fn elapsed(&self) -> Duration {
        self.end.saturating_duration_since(self.start)
    }
}

/// One tick of the sampler.
#[derive(Debug, Clone, PartialEq)]
pub struct ThroughputSample {
    pub index: u32,
    pub iterations: u32,
    pub window: SampleWindow,
    pub kbps: f64,
    pub per_stream: Vec<u64>,
}

impl ThroughputSample {
    pub fn total_bytes(&self) -> u64 {
        self.window.bytes_at_end
    }

    pub fn mbps(&self) -> f64 {
        kbps_to_mbps(self.kbps)
    }
}

/// Final bandwidth figure in megabits per second, one decimal place.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct BandwidthEstimate(f64);

impl BandwidthEstimate {
    pub const ZERO: Self = Self(0.0);

    pub fn from_peak_kbps(kbps: f64) -> Self {
        Self(round1(kbps_to_mbps(kbps)))
    }

    pub fn mbps(self) -> f64 {
        self.0
    }
}

impl std::fmt::Display for BandwidthEstimate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.1}", self.0)
    }
}

fn kbps_to_mbps(kbps: f64) -> f64 {
    kbps * BITS_PER_BYTE * NETWORK_OVERHEAD / 1024.0
}

/// One decimal place, exact halves to even (`2.25` gives `2.2`).
fn round1(v: f64) -> f64 {
    format!("{:.1}", v).parse().unwrap_or(v)
}

#[derive(Debug, Clone, Default)]
pub struct SampleReport {
    pub samples: Vec<ThroughputSample>,
    pub peak_kbps: f64,
}

impl SampleReport {
    pub fn estimate(&self) -> BandwidthEstimate {
        BandwidthEstimate::from_peak_kbps(self.peak_kbps)
    }
}

type SampleHook = Box<dyn Fn(&ThroughputSample) + Send + Sync>;

/// Polls a [`ByteSource`] at a fixed cadence and keeps the peak rate.
pub struct ThroughputSampler {
    config: SamplerConfig,
    verbose: bool,
    on_sample: Option<SampleHook>,
}

impl ThroughputSampler {
    pub fn new(config: SamplerConfig) -> Self {
        Self {
            config,
            verbose: false,
            on_sample: None,
        }
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Call `hook` with every sample. It runs inline on the sampling task, so
    /// it must not block.
    pub fn on_sample<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ThroughputSample) + Send + Sync + 'static,
    {
        self.on_sample = Some(Box::new(hook));
        self
    }

    /// Also send every sample to `tx`. Sends never wait; a full channel
    /// drops the sample.
    pub fn with_progress(self, tx: mpsc::Sender<ThroughputSample>) -> Self {
        self.on_sample(move |sample| {
            let _ = tx.try_send(sample.clone());
        })
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    pub async fn run<S: ByteSource + ?Sized>(&self, source: &S) -> SampleReport {
        let iterations = self.config.iterations();
        let interval_secs = self.config.interval.as_secs_f64();
        let mut report = SampleReport::default();
        let mut last_total: u64 = 0;
        let mut last_at = Instant::now();

        tokio::time::sleep(self.config.warmup).await;

        for index in 0..iterations {
            let total = source.total();
            let now = Instant::now();
            let window = SampleWindow {
                start: last_at,
                end: now,
                bytes_at_start: last_total,
                bytes_at_end: total.max(last_total),
            };
            let kbps = (window.delta_bytes() as f64 / interval_secs) / 1024.0;

            let sample = ThroughputSample {
                index,
                iterations,
                window,
                kbps,
                per_stream: source.snapshot(),
            };

            if self.verbose {
                tracing::info!(
                    loop_index = index,
                    total_mb = total as f64 / (1024.0 * 1024.0),
                    delta_mb = window.delta_bytes() as f64 / (1024.0 * 1024.0),
                    kbps,
                    "sample {:.1} Mbps",
                    sample.mbps()
                );
            } else {
                tracing::debug!(loop_index = index, total, kbps, "sample");
            }

            if kbps > report.peak_kbps {
                report.peak_kbps = kbps;
            }
            if let Some(hook) = &self.on_sample {
                hook(&sample);
            }
            report.samples.push(sample);

            last_total = window.bytes_at_end;
            last_at = now;
            tokio::time::sleep(self.config.interval).await;
        }

        if self.verbose {
            tracing::info!(
                peak_kbps = report.peak_kbps,
                "highest speed {} Mbps",
                report.estimate()
            );
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays a fixed sequence of totals, one per call to `total()`.
    struct Scripted {
        totals: Mutex<VecDeque<u64>>,
        last: Mutex<u64>,
    }

    impl Scripted {
        fn new(totals: &[u64]) -> Self {
            Self {
                totals: Mutex::new(totals.iter().copied().collect()),
                last: Mutex::new(0),
            }
        }
    }

    impl ByteSource for Scripted {
        fn total(&self) -> u64 {
            let mut last = self.last.lock().unwrap();
            if let Some(next) = self.totals.lock().unwrap().pop_front() {
                *last = next;
            }
            *last
        }

        fn snapshot(&self) -> Vec<u64> {
            vec![*self.last.lock().unwrap()]
        }
    }

    fn cfg() -> SamplerConfig {
        SamplerConfig::default()
    }

    #[test]
    fn default_run_is_five_iterations() {
        let c = cfg();
        assert_eq!(c.iterations(), 5);
        assert_eq!(c.total_duration(), Duration::from_secs(16));
    }

    #[test]
    fn iterations_floor_partial_intervals() {
        assert_eq!(cfg().with_max_time(Duration::from_secs(17)).iterations(), 5);
        assert_eq!(cfg().with_max_time(Duration::from_secs(18)).iterations(), 6);
        assert_eq!(cfg().with_max_time(Duration::from_secs(2)).iterations(), 0);
    }

    #[test]
    fn zero_interval_never_samples() {
        let c = SamplerConfig {
            interval: Duration::ZERO,
            ..cfg()
        };
        assert_eq!(c.iterations(), 0);
    }

    #[test]
    fn huge_windows_saturate() {
        let c = cfg().with_max_time(Duration::from_secs(u64::MAX / 1000));
        assert_eq!(c.iterations(), u32::MAX);
        assert_eq!(c.total_duration(), Duration::from_secs(1) + Duration::from_secs(3) * u32::MAX);

        let c = SamplerConfig {
            warmup: Duration::MAX,
            ..cfg()
        };
        assert_eq!(c.total_duration(), Duration::MAX);
    }

    #[test]
    fn conversion_of_100_kbps() {
        assert_eq!(BandwidthEstimate::from_peak_kbps(100.0).mbps(), 0.8);
    }

    #[test]
    fn conversion_rounds_to_one_decimal() {
        // 12_000 KB/s * 8 * 1.0415 / 1024 = 97.64...
        let est = BandwidthEstimate::from_peak_kbps(12_000.0);
        assert_eq!(est.mbps(), 97.6);
        assert_eq!(est.to_string(), "97.6");
    }

    #[test]
    fn exact_halves_round_to_even() {
        assert_eq!(round1(0.25), 0.2);
        assert_eq!(round1(2.25), 2.2);
        assert_eq!(round1(0.75), 0.8);
        assert_eq!(round1(97.64), 97.6);
    }

    #[test]
    fn zero_peak_is_zero() {
        assert_eq!(BandwidthEstimate::from_peak_kbps(0.0), BandwidthEstimate::ZERO);
        assert_eq!(SampleReport::default().estimate().mbps(), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn peak_is_max_interval_delta() {
        let mb = 1024 * 1024;
        // deltas: 3MB, 9MB, 6MB, 0, 3MB
        let source = Scripted::new(&[3 * mb, 12 * mb, 18 * mb, 18 * mb, 21 * mb]);
        let report = ThroughputSampler::new(cfg()).run(&source).await;

        assert_eq!(report.samples.len(), 5);
        let expected = (9.0 * mb as f64 / 3.0) / 1024.0;
        assert_eq!(report.peak_kbps, expected);
        let max = report
            .samples
            .iter()
            .map(|s| s.kbps)
            .fold(0.0_f64, f64::max);
        assert_eq!(report.peak_kbps, max);
    }

    #[tokio::test(start_paused = true)]
    async fn flat_counters_give_zero() {
        let source = Scripted::new(&[0, 0, 0, 0, 0]);
        let report = ThroughputSampler::new(cfg()).run(&source).await;
        assert_eq!(report.peak_kbps, 0.0);
        assert_eq!(report.estimate(), BandwidthEstimate::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn identical_trajectories_give_identical_estimates() {
        let totals = [500_000, 2_000_000, 2_600_000, 5_000_000, 5_100_000];
        let a = ThroughputSampler::new(cfg()).run(&Scripted::new(&totals)).await;
        let b = ThroughputSampler::new(cfg()).run(&Scripted::new(&totals)).await;
        assert_eq!(a.estimate(), b.estimate());
        assert_eq!(a.peak_kbps, b.peak_kbps);
    }

    #[tokio::test(start_paused = true)]
    async fn samples_are_monotonic_and_windows_ordered() {
        let source = Scripted::new(&[10, 20, 20, 40, 80]);
        let report = ThroughputSampler::new(cfg()).run(&source).await;
        for pair in report.samples.windows(2) {
            assert!(pair[1].total_bytes() >= pair[0].total_bytes());
            assert_eq!(pair[1].window.start, pair[0].window.end);
        }
        for s in &report.samples {
            assert!(s.window.end > s.window.start);
            assert!(s.window.bytes_at_end >= s.window.bytes_at_start);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn run_takes_warmup_plus_intervals() {
        let start = Instant::now();
        let source = Scripted::new(&[]);
        ThroughputSampler::new(cfg()).run(&source).await;
        assert_eq!(start.elapsed(), Duration::from_secs(16));
    }

    #[tokio::test(start_paused = true)]
    async fn progress_receives_every_sample() {
        let (tx, mut rx) = mpsc::channel(16);
        let source = Scripted::new(&[1024, 2048, 4096]);
        let config = cfg().with_max_time(Duration::from_secs(9));
        let report = ThroughputSampler::new(config)
            .with_progress(tx)
            .run(&source)
            .await;

        let mut received = Vec::new();
        while let Ok(s) = rx.try_recv() {
            received.push(s);
        }
        assert_eq!(received, report.samples);
        assert_eq!(received.len(), 3);
        assert_eq!(received[2].iterations, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn full_progress_channel_does_not_stall() {
        let (tx, _rx) = mpsc::channel(1);
        let start = Instant::now();
        let report = ThroughputSampler::new(cfg())
            .with_progress(tx)
            .run(&Scripted::new(&[1, 2, 3, 4, 5]))
            .await;
        assert_eq!(report.samples.len(), 5);
        assert_eq!(start.elapsed(), Duration::from_secs(16));
    }
}
