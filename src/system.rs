//! Hardware detection and the sizing rules derived from it.

use std::fmt;

use sysinfo::System;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// CPU and memory figures used to size shards and worker pools.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HardwareProfile {
    pub physical_cores: usize,
    pub logical_cores: usize,
    pub memory_gb: f64,
    pub available_gb: f64,
    /// Global CPU usage in percent
    pub cpu_usage: f32,
}

impl Default for HardwareProfile {
    fn default() -> Self {
        Self {
            physical_cores: 4,
            logical_cores: 4,
            memory_gb: 8.0,
            available_gb: 8.0,
            cpu_usage: 25.0,
        }
    }
}

impl HardwareProfile {
    /// Sample the current machine. Takes a short CPU usage measurement.
    pub fn detect() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();
        sys.refresh_cpu_usage();
        std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        sys.refresh_cpu_usage();

        let fallback = Self::default();
        let logical_cores = match sys.cpus().len() {
            0 => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(fallback.logical_cores),
            n => n,
        };
        let physical_cores = sys
            .physical_core_count()
            .filter(|&n| n > 0)
            .unwrap_or_else(|| (logical_cores / 2).max(2));

        let profile = Self {
            physical_cores,
            logical_cores,
            memory_gb: sys.total_memory() as f64 / GIB,
            available_gb: sys.available_memory() as f64 / GIB,
            cpu_usage: sys.global_cpu_usage(),
        };

        tracing::debug!("Detected hardware: {}", profile);
        profile
    }
}

impl fmt::Display for HardwareProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} physical / {} logical cores, {:.1} GB RAM ({:.1} GB free), CPU {:.0}%",
            self.physical_cores, self.logical_cores, self.memory_gb, self.available_gb, self.cpu_usage
        )
    }
}

/// Number of shard databases for this machine, in `2..=64`.
pub fn optimal_shard_count(hw: &HardwareProfile) -> usize {
    let cores = hw.physical_cores;
    let logical = hw.logical_cores as f64;

    let base = if cores >= 20 {
        logical.min(48.0)
    } else if cores >= 16 {
        logical.min(40.0)
    } else if cores >= 12 {
        logical.min(32.0)
    } else if cores >= 8 {
        (logical * 0.8).min(24.0)
    } else if cores >= 6 {
        (logical * 0.75).min(16.0)
    } else if cores >= 4 {
        (logical * 0.6).min(12.0)
    } else {
        cores.max(2) as f64
    };

    let multiplier = match hw.memory_gb {
        m if m >= 128.0 => 2.2,
        m if m >= 64.0 => 2.0,
        m if m >= 32.0 => 1.7,
        m if m >= 16.0 => 1.4,
        m if m >= 8.0 => 1.0,
        _ => 0.8,
    };

    ((base * multiplier) as usize).clamp(2, 64)
}

/// Indexing worker threads for this machine, in `2..=16`.
///
/// Leaves headroom for other applications when the CPU is already busy
/// or memory is short.
pub fn optimal_thread_count(hw: &HardwareProfile) -> usize {
    let cores = hw.physical_cores as i64;
    let usage = hw.cpu_usage;
    let free = hw.available_gb;

    let threads = if cores >= 16 {
        if usage < 20.0 && free > 8.0 {
            (cores - 2).min(16)
        } else if usage < 40.0 {
            (cores - 4).min(12)
        } else {
            (cores - 6).min(8)
        }
    } else if cores >= 12 {
        if usage < 20.0 && free > 6.0 {
            (cores - 2).min(12)
        } else if usage < 40.0 {
            (cores - 3).min(10)
        } else {
            (cores - 4).min(8)
        }
    } else if cores >= 8 {
        if usage < 25.0 && free > 4.0 {
            (cores - 1).min(10)
        } else if usage < 50.0 {
            (cores - 2).min(8)
        } else {
            (cores - 3).min(6)
        }
    } else if cores >= 6 {
        if usage < 25.0 && free > 3.0 {
            (cores - 1).min(8)
        } else if usage < 50.0 {
            (cores - 1).min(6)
        } else {
            (cores - 2).min(4)
        }
    } else if cores >= 4 {
        if usage < 20.0 && free > 2.0 {
            cores.min(6)
        } else if usage < 40.0 {
            cores.min(5)
        } else {
            (cores - 1).min(3)
        }
    } else {
        (cores - 1).max(2)
    };

    threads.clamp(2, 16) as usize
}
