//! Compute target selection

use candle_core::Device;
use protscore_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Compute target a plugin is constructed for.
///
/// Parsed from strings such as `cpu`, `cuda`, `cuda:1`, `metal` or `mps`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DeviceSpec {
    /// CPU inference (always available)
    #[default]
    Cpu,
    /// CUDA GPU inference
    Cuda(usize), // GPU index
    /// Metal (Apple Silicon)
    Metal(usize),
}

impl DeviceSpec {
    /// Create the Candle device for this target
    pub fn to_device(&self) -> Result<Device> {
        match self {
            Self::Cpu => Ok(Device::Cpu),
            Self::Cuda(idx) => Device::new_cuda(*idx)
                .map_err(|e| Error::config(format!("Failed to create CUDA device {}: {}", idx, e))),
            Self::Metal(idx) => Device::new_metal(*idx)
                .map_err(|e| Error::config(format!("Failed to create Metal device {}: {}", idx, e))),
        }
    }

    pub fn is_accelerator(&self) -> bool {
        !matches!(self, Self::Cpu)
    }
}

impl FromStr for DeviceSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.trim().to_lowercase();
        let (kind, index) = match lowered.split_once(':') {
            Some((kind, index)) => {
                let index = index.parse::<usize>().map_err(|_| {
                    Error::config(format!("Invalid device index in '{}'", s))
                })?;
                (kind.to_string(), Some(index))
            }
            None => (lowered.clone(), None),
        };

        match (kind.as_str(), index) {
            ("cpu", None) => Ok(Self::Cpu),
            ("cuda" | "gpu", index) => Ok(Self::Cuda(index.unwrap_or(0))),
            ("metal" | "mps", index) => Ok(Self::Metal(index.unwrap_or(0))),
            _ => Err(Error::config(format!(
                "Unknown compute target '{}' (expected cpu, cuda[:N], metal[:N])",
                s
            ))),
        }
    }
}

impl TryFrom<String> for DeviceSpec {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<DeviceSpec> for String {
    fn from(spec: DeviceSpec) -> Self {
        spec.to_string()
    }
}

impl fmt::Display for DeviceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda(idx) => write!(f, "cuda:{}", idx),
            Self::Metal(idx) => write!(f, "metal:{}", idx),
        }
    }
}
