//! Resource profiles
//!
//! Named CPU/memory presets applied to materialized workloads.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceProfile {
    Minimal,
    #[default]
    Standard,
    Performance,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceQuantities {
    pub cpu: String,
    pub memory: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    pub requests: ResourceQuantities,
    pub limits: ResourceQuantities,
}

impl ResourceProfile {
    pub fn requirements(&self) -> ResourceRequirements {
        let (req_cpu, req_mem, lim_cpu, lim_mem) = match self {
            ResourceProfile::Minimal => ("100m", "128Mi", "500m", "512Mi"),
            ResourceProfile::Standard => ("250m", "512Mi", "1000m", "1Gi"),
            ResourceProfile::Performance => ("500m", "1Gi", "2000m", "2Gi"),
        };
        ResourceRequirements {
            requests: ResourceQuantities {
                cpu: req_cpu.to_string(),
                memory: req_mem.to_string(),
            },
            limits: ResourceQuantities {
                cpu: lim_cpu.to_string(),
                memory: lim_mem.to_string(),
            },
        }
    }
}

impl fmt::Display for ResourceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceProfile::Minimal => write!(f, "minimal"),
            ResourceProfile::Standard => write!(f, "standard"),
            ResourceProfile::Performance => write!(f, "performance"),
        }
    }
}

impl FromStr for ResourceProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "minimal" => Ok(ResourceProfile::Minimal),
            "standard" => Ok(ResourceProfile::Standard),
            "performance" => Ok(ResourceProfile::Performance),
            other => Err(format!("unknown resource profile: {}", other)),
        }
    }
}
