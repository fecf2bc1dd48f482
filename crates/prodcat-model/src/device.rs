//! Compute device selection for tree fitting.
//!
//! The booster runs on the CPU. Before the first real round, a dedicated
//! worker pool is built and a one-round trial fit is run inside it; if
//! either step fails, fitting falls back to a single-threaded pool.

use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::booster::GradientBooster;
use crate::params::BoosterParams;
use prodcat_core::{Error, Result};
use prodcat_infer::CsrMatrix;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Device {
    Parallel { threads: usize },
    Single,
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parallel { threads } => write!(f, "parallel({} threads)", threads),
            Self::Single => write!(f, "single"),
        }
    }
}

/// A tested worker pool that boosting runs inside.
pub struct ComputeDevice {
    device: Device,
    pool: ThreadPool,
}

impl ComputeDevice {
    /// Select a pool of `threads` workers that passes a trial fit, falling
    /// back to one thread.
    pub fn select(threads: usize) -> Result<Self> {
        Self::select_with(threads, trial_fit)
    }

    fn select_with(threads: usize, trial: fn() -> Result<()>) -> Result<Self> {
        if threads > 1 {
            match ThreadPoolBuilder::new().num_threads(threads).build() {
                Ok(pool) => match pool.install(trial) {
                    Ok(()) => {
                        let device = Device::Parallel { threads };
                        info!("Compute device: {}", device);
                        return Ok(Self { device, pool });
                    }
                    Err(e) => warn!("Trial fit on {} threads failed: {}. Using a single thread.", threads, e),
                },
                Err(e) => warn!("Cannot build a {}-thread pool: {}. Using a single thread.", threads, e),
            }
        }
        Self::single()
    }

    pub fn single() -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(1)
            .build()
            .map_err(|e| Error::Internal(format!("cannot build worker pool: {}", e)))?;
        info!("Compute device: {}", Device::Single);
        Ok(Self {
            device: Device::Single,
            pool,
        })
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// Run `op` with this device's pool as the rayon context.
    pub fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        self.pool.install(op)
    }
}

/// Fit one round on a two-row, two-class problem.
fn trial_fit() -> Result<()> {
    let mut x = CsrMatrix::new(2);
    x.push_row(vec![(0, 1.0)]);
    x.push_row(vec![(1, 1.0)]);
    let params = BoosterParams {
        num_rounds: 1,
        subsample: 1.0,
        colsample_bytree: 1.0,
        min_child_weight: 0.0,
        ..Default::default()
    };
    GradientBooster::fit(&x, &[0, 1], 2, &params, None).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_parallel() {
        let dev = ComputeDevice::select(2).unwrap();
        assert_eq!(dev.device(), Device::Parallel { threads: 2 });
        assert_eq!(dev.install(rayon::current_num_threads), 2);
    }

    #[test]
    fn test_select_single() {
        let dev = ComputeDevice::select(1).unwrap();
        assert_eq!(dev.device(), Device::Single);
        assert_eq!(dev.install(rayon::current_num_threads), 1);
    }

    #[test]
    fn test_failed_trial_falls_back() {
        fn failing_trial() -> Result<()> {
            Err(Error::Internal("no usable workers".into()))
        }
        let dev = ComputeDevice::select_with(4, failing_trial).unwrap();
        assert_eq!(dev.device(), Device::Single);
        assert_eq!(dev.install(rayon::current_num_threads), 1);
    }

    #[test]
    fn test_trial_fit() {
        assert!(trial_fit().is_ok());
    }
}
