//! Device capability profiling and tier-based tuning
//!
//! Classifies the host into a coarse `Low`/`Mid`/`High` tier from a
//! capability snapshot (logical cores, approximate memory, an optional
//! synthetic timing probe) and derives the scheduler tuning for that
//! tier: concurrency limit, visibility debounce, and prefetch margin.
//! Weak devices get fewer simultaneous renders, a longer debounce, and
//! less speculative prefetch; strong devices the opposite.

use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tracing::debug;

/// Coarse device-capability classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DeviceTier {
    Low,
    Mid,
    High,
}

/// Scheduler tuning derived from a [`DeviceTier`].
///
/// Produced once and treated as immutable; safe to share and read from
/// any thread.
#[derive(Debug, Clone, PartialEq)]
pub struct TierConfig {
    /// The tier this configuration was derived from.
    pub tier: DeviceTier,

    /// Maximum simultaneously running render jobs (`K`).
    pub concurrency: usize,

    /// Quiet period before a burst of scroll events collapses into one
    /// visibility pass.
    pub visibility_debounce: Duration,

    /// Expanded-viewport margin as a fraction of viewport height, on
    /// each side. Larger means more speculative prefetch.
    pub viewport_margin_ratio: f32,
}

impl TierConfig {
    /// The tuning table. `concurrency` is strictly monotone in tier.
    pub fn for_tier(tier: DeviceTier) -> Self {
        match tier {
            DeviceTier::Low => Self {
                tier,
                concurrency: 2,
                visibility_debounce: Duration::from_millis(200),
                viewport_margin_ratio: 0.5,
            },
            DeviceTier::Mid => Self {
                tier,
                concurrency: 3,
                visibility_debounce: Duration::from_millis(120),
                viewport_margin_ratio: 1.0,
            },
            DeviceTier::High => Self {
                tier,
                concurrency: 6,
                visibility_debounce: Duration::from_millis(60),
                viewport_margin_ratio: 1.5,
            },
        }
    }
}

/// Raw capability readings. Every field is optional: classification
/// degrades gracefully instead of failing.
#[derive(Debug, Clone, Default)]
pub struct CapabilitySnapshot {
    /// Logical CPU core count.
    pub logical_cores: Option<usize>,

    /// Approximate total memory in GiB.
    pub approx_memory_gb: Option<f64>,

    /// Wall time of the synthetic timing probe, if one was run.
    pub timing_probe: Option<Duration>,
}

impl CapabilitySnapshot {
    /// Read the host's capabilities. Never fails; unavailable readings
    /// are simply absent.
    pub fn detect() -> Self {
        Self {
            logical_cores: std::thread::available_parallelism().ok().map(|n| n.get()),
            approx_memory_gb: detect_memory_gb(),
            timing_probe: None,
        }
    }

    /// Run the synthetic timing probe and record its duration.
    ///
    /// The probe is a short fixed CPU workload; it costs a few
    /// milliseconds on anything modern.
    pub fn with_timing_probe(mut self) -> Self {
        self.timing_probe = Some(run_timing_probe());
        self
    }
}

#[cfg(target_os = "linux")]
fn detect_memory_gb() -> Option<f64> {
    let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
    let line = meminfo.lines().find(|l| l.starts_with("MemTotal:"))?;
    let kib: f64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kib / (1024.0 * 1024.0))
}

#[cfg(not(target_os = "linux"))]
fn detect_memory_gb() -> Option<f64> {
    None
}

const PROBE_ITERATIONS: u64 = 2_000_000;

/// Probe durations above this demote a `High` classification to `Mid`.
const PROBE_SLOW: Duration = Duration::from_millis(50);

fn run_timing_probe() -> Duration {
    let start = Instant::now();
    let mut acc: u64 = 0x9e37_79b9;
    for i in 0..PROBE_ITERATIONS {
        acc = acc.wrapping_mul(6364136223846793005).wrapping_add(i);
    }
    std::hint::black_box(acc);
    start.elapsed()
}

fn classify(snapshot: &CapabilitySnapshot) -> DeviceTier {
    let Some(cores) = snapshot.logical_cores else {
        // Snapshot unusable; conservative default.
        return DeviceTier::Mid;
    };
    let tier = match (cores, snapshot.approx_memory_gb) {
        (cores, Some(memory)) if cores <= 2 || memory < 4.0 => DeviceTier::Low,
        (cores, Some(memory)) if cores >= 8 && memory >= 8.0 => DeviceTier::High,
        (cores, None) if cores <= 2 => DeviceTier::Low,
        (cores, None) if cores >= 8 => DeviceTier::High,
        _ => DeviceTier::Mid,
    };
    match (tier, snapshot.timing_probe) {
        (DeviceTier::High, Some(probe)) if probe > PROBE_SLOW => DeviceTier::Mid,
        _ => tier,
    }
}

static GLOBAL: OnceLock<DeviceProfiler> = OnceLock::new();

/// Memoized device classification.
///
/// Construction is pure in the snapshot and never fails; a process-wide
/// instance is available through [`DeviceProfiler::global`] with an
/// explicit [`DeviceProfiler::init_global`] hook so hosts and tests can
/// install a known profile instead of relying on detection.
///
/// # Example
///
/// ```
/// use resume_review_scheduler::{CapabilitySnapshot, DeviceProfiler, DeviceTier};
///
/// let snapshot = CapabilitySnapshot {
///     logical_cores: Some(2),
///     approx_memory_gb: Some(3.5),
///     timing_probe: None,
/// };
/// let profiler = DeviceProfiler::from_snapshot(&snapshot);
/// assert_eq!(profiler.tier(), DeviceTier::Low);
/// ```
#[derive(Debug, Clone)]
pub struct DeviceProfiler {
    config: TierConfig,
}

impl DeviceProfiler {
    /// Classify a snapshot and derive its tuning.
    pub fn from_snapshot(snapshot: &CapabilitySnapshot) -> Self {
        let tier = classify(snapshot);
        debug!(
            ?tier,
            cores = ?snapshot.logical_cores,
            memory_gb = ?snapshot.approx_memory_gb,
            probe = ?snapshot.timing_probe,
            "classified device"
        );
        Self {
            config: TierConfig::for_tier(tier),
        }
    }

    /// Detect the host's capabilities and classify them.
    pub fn detect() -> Self {
        Self::from_snapshot(&CapabilitySnapshot::detect())
    }

    /// The classified tier.
    pub fn tier(&self) -> DeviceTier {
        self.config.tier
    }

    /// The derived tuning.
    pub fn config(&self) -> &TierConfig {
        &self.config
    }

    /// Install `profiler` as the process-wide instance.
    ///
    /// Returns `false` if one was already installed; the existing
    /// instance wins.
    pub fn init_global(profiler: DeviceProfiler) -> bool {
        GLOBAL.set(profiler).is_ok()
    }

    /// The process-wide instance, detecting capabilities on first use if
    /// none was installed.
    pub fn global() -> &'static DeviceProfiler {
        GLOBAL.get_or_init(DeviceProfiler::detect)
    }
}
