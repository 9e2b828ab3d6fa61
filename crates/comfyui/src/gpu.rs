//! GPU identification for trace records.
//!
//! NVML is probed once per process and the result cached. Hosts
//! without NVIDIA drivers get a sentinel identity instead of an error;
//! GPU identification is never allowed to fail a request.

use std::sync::OnceLock;

use nvml_wrapper::Nvml;

/// Reported when no GPU is available.
pub const FALLBACK_GPU_NAME: &str = "CPU";
/// Reported when no driver is available.
pub const FALLBACK_DRIVER_VERSION: &str = "N/A";

/// Identity of the device generations run on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpuInfo {
    pub name: String,
    pub driver_version: String,
}

impl GpuInfo {
    fn fallback() -> Self {
        Self {
            name: FALLBACK_GPU_NAME.to_string(),
            driver_version: FALLBACK_DRIVER_VERSION.to_string(),
        }
    }
}

/// Identify the primary GPU, probing NVML on first call only.
pub fn gpu_info() -> &'static GpuInfo {
    static INFO: OnceLock<GpuInfo> = OnceLock::new();
    INFO.get_or_init(|| match probe() {
        Ok(info) => {
            tracing::info!(gpu = %info.name, driver = %info.driver_version, "GPU identified");
            info
        }
        Err(e) => {
            tracing::warn!(error = %e, "NVML unavailable, reporting CPU fallback");
            GpuInfo::fallback()
        }
    })
}

fn probe() -> Result<GpuInfo, nvml_wrapper::error::NvmlError> {
    let nvml = Nvml::init()?;
    let device = nvml.device_by_index(0)?;
    Ok(GpuInfo {
        name: device.name()?,
        driver_version: nvml.sys_driver_version()?,
    })
}
