//! Concurrency planning module for convertd
//!
//! Derives how many conversion jobs may run at once from the machine's core
//! count and the scheduling configuration. Encoders parallelize well on
//! their own, so the derived defaults stay small.

use convertd_config::Config;

/// Concurrency plan derived from configuration and system resources
#[derive(Debug, Clone, PartialEq)]
pub struct ConcurrencyPlan {
    /// Total logical CPU cores available
    pub total_cores: u32,
    /// Cores actually usable given the configured affinity mask
    pub usable_cores: u32,
    /// Maximum number of concurrent conversion jobs
    pub max_concurrent_jobs: u32,
}

impl ConcurrencyPlan {
    /// Derive a concurrency plan from configuration
    ///
    /// Rules:
    /// - Core count comes from the OS.
    /// - An affinity mask narrows the usable core count (out-of-range
    ///   indices are ignored).
    /// - `max_concurrent_jobs`: explicit non-zero config value wins;
    ///   otherwise 2 jobs with 8+ usable cores, 1 below that.
    pub fn derive(cfg: &Config) -> Self {
        let total_cores = num_cpus::get() as u32;

        let usable_cores = if cfg.scheduling.affinity.is_empty() {
            total_cores
        } else {
            let valid = cfg
                .scheduling
                .affinity
                .iter()
                .filter(|&&cpu| cpu < total_cores)
                .count() as u32;
            valid.max(1)
        };

        let max_concurrent_jobs = if cfg.scheduling.max_concurrent_jobs > 0 {
            cfg.scheduling.max_concurrent_jobs
        } else {
            derive_max_jobs(usable_cores)
        };

        Self {
            total_cores,
            usable_cores,
            max_concurrent_jobs,
        }
    }
}

/// Derive max concurrent jobs from usable cores:
/// 2 jobs with 8+ cores, 1 otherwise.
fn derive_max_jobs(cores: u32) -> u32 {
    if cores >= 8 {
        2
    } else {
        1
    }
}

/// Public function to derive a concurrency plan from configuration
pub fn derive_plan(cfg: &Config) -> ConcurrencyPlan {
    ConcurrencyPlan::derive(cfg)
}
