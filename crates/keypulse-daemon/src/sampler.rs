//! Host telemetry sampling.
//!
//! CPU utilization from `sysinfo` needs two refreshes separated by a minimum
//! interval; a single instantaneous read would always report zero. Each
//! consumer (every connection handler, plus the stats broadcast loop) owns
//! its own [`Sampler`], so concurrent streams never share telemetry state
//! and every reading is independently timed.

use keypulse_proto::StatsPacket;
use sysinfo::{CpuRefreshKind, MINIMUM_CPU_UPDATE_INTERVAL, MemoryRefreshKind, RefreshKind, System};

use crate::error::{DaemonError, Result};

/// Reads CPU and memory utilization as fractions in `[0, 1]`.
pub struct Sampler {
    sys: System,
}

impl Sampler {
    #[must_use]
    pub fn new() -> Self {
        let sys = System::new_with_specifics(
            RefreshKind::nothing()
                .with_cpu(CpuRefreshKind::nothing().with_cpu_usage())
                .with_memory(MemoryRefreshKind::nothing().with_ram()),
        );
        Self { sys }
    }

    /// Take one reading. CPU is averaged over the minimum refresh interval,
    /// not read instantaneously.
    ///
    /// # Errors
    ///
    /// Returns [`DaemonError::Sample`] if the host reports no usable memory
    /// information. There is no retry; the calling cycle terminates.
    pub async fn sample(&mut self) -> Result<StatsPacket> {
        self.sys.refresh_cpu_usage();
        tokio::time::sleep(MINIMUM_CPU_UPDATE_INTERVAL).await;
        self.sys.refresh_cpu_usage();
        self.sys.refresh_memory();

        let total = self.sys.total_memory();
        if total == 0 {
            return Err(DaemonError::Sample(
                "host reports zero total memory".to_string(),
            ));
        }

        let cpu = (self.sys.global_cpu_usage() / 100.0).clamp(0.0, 1.0);
        // Memory counts fit f64 precision comfortably for a ratio
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
        let mem = ((self.sys.used_memory() as f64 / total as f64) as f32).clamp(0.0, 1.0);

        Ok(StatsPacket::new(cpu, mem))
    }
}

impl Default for Sampler {
    fn default() -> Self {
        Self::new()
    }
}
