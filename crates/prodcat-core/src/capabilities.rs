//! Host capability detection used to size the training pool.

use serde::{Deserialize, Serialize};

/// Discovered hardware capabilities of the current device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceCapabilities {
    /// Total system RAM in bytes.
    pub total_ram_bytes: u64,
    /// Number of CPU cores.
    pub cpu_cores: usize,
    /// Whether a CUDA-capable GPU is detected.
    pub has_gpu: bool,
}

impl DeviceCapabilities {
    /// Discover hardware capabilities of the current system.
    pub fn discover() -> Self {
        Self {
            total_ram_bytes: Self::get_total_ram(),
            cpu_cores: num_cpus(),
            has_gpu: Self::detect_gpu(),
        }
    }

    /// Threads to give a CPU-bound worker pool. Always at least one.
    pub fn worker_threads(&self) -> usize {
        self.cpu_cores.max(1)
    }

    fn get_total_ram() -> u64 {
        #[cfg(target_os = "linux")]
        {
            if let Ok(meminfo) = std::fs::read_to_string("/proc/meminfo") {
                for line in meminfo.lines() {
                    if let Some(rest) = line.strip_prefix("MemTotal:") {
                        if let Some(Ok(kb)) = rest.split_whitespace().next().map(str::parse::<u64>) {
                            return kb * 1024;
                        }
                    }
                }
            }
            0
        }
        #[cfg(not(target_os = "linux"))]
        {
            0
        }
    }

    fn detect_gpu() -> bool {
        #[cfg(target_os = "linux")]
        {
            std::path::Path::new("/dev/nvidia0").exists()
                || std::path::Path::new("/dev/nvhost-gpu").exists()
        }
        #[cfg(not(target_os = "linux"))]
        {
            false
        }
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discover() {
        let caps = DeviceCapabilities::discover();
        assert!(caps.cpu_cores >= 1);
        assert!(caps.worker_threads() >= 1);
    }
}
