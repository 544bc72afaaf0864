//! Download bandwidth estimation against fast.com.
//!
//! [`measure`] discovers up to three download URLs, pulls from all of them
//! in parallel for a bounded window, and reports the peak throughput in
//! megabits per second (0.0 when nothing could be measured).

pub mod error;
pub mod logging;
pub mod settings;
pub mod speedtest;

pub use error::{DiscoveryError, ResolutionError, SpeedTestError, StreamError};
pub use speedtest::sampler::{BandwidthEstimate, SamplerConfig};
pub use speedtest::{measure, measure_with, MeasureOptions, SpeedTest, TestUrl};
