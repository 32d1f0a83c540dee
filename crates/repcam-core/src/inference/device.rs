//! Device selection for inference.

use candle_core::Device;
use tracing::{info, warn};

/// Execution backend requested for a run.
///
/// Resolved once when the engine is built and never changed mid-run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeviceChoice {
    /// Plain CPU execution.
    #[default]
    Cpu,
    /// GPU execution (Metal on macOS, CUDA elsewhere) when compiled in.
    Accelerated,
}

impl DeviceChoice {
    /// Maps the `--use_gpu` flag onto a choice.
    #[must_use]
    pub const fn from_use_gpu(use_gpu: bool) -> Self {
        if use_gpu {
            Self::Accelerated
        } else {
            Self::Cpu
        }
    }

    /// Returns the device to run on.
    ///
    /// An accelerated request falls back to CPU when no GPU backend is
    /// available in this build or on this machine.
    #[must_use]
    pub fn resolve(self) -> Device {
        if self == Self::Accelerated {
            #[cfg(feature = "metal")]
            {
                if let Ok(device) = Device::new_metal(0) {
                    info!("Using Metal device for inference");
                    return device;
                }
            }

            #[cfg(feature = "cuda")]
            {
                if let Ok(device) = Device::new_cuda(0) {
                    info!("Using CUDA device for inference");
                    return device;
                }
            }

            warn!("GPU requested but no accelerated backend is available, using CPU");
        }

        info!("Using CPU for inference");
        Device::Cpu
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_use_gpu() {
        assert_eq!(DeviceChoice::from_use_gpu(false), DeviceChoice::Cpu);
        assert_eq!(DeviceChoice::from_use_gpu(true), DeviceChoice::Accelerated);
    }

    #[test]
    fn test_cpu_resolves_to_cpu() {
        assert!(DeviceChoice::Cpu.resolve().is_cpu());
    }

    #[test]
    fn test_accelerated_always_resolves() {
        // Falls back to CPU on machines without a GPU
        let _device = DeviceChoice::Accelerated.resolve();
    }
}
