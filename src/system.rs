//! Host resource metrics published on the slow heartbeat and served
//! over the HTTP API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sysinfo::{ComponentExt, CpuExt, DiskExt, System, SystemExt};

const THERMAL_ZONE_PATH: &str = "/sys/class/thermal/thermal_zone0/temp";

/// Small summary suitable for frequent pushes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LightweightSummary {
    pub timestamp: DateTime<Utc>,
    pub cpu_usage: f32,
    pub cpu_temp: Option<f32>,
    pub memory_percent: f32,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CpuSummary {
    pub usage_percent: f32,
    pub usage_per_core: Vec<f32>,
    pub frequency_mhz: u64,
    pub temperature: Option<f32>,
    pub load_average: LoadAverage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadAverage {
    #[serde(rename = "1min")]
    pub one: f64,
    #[serde(rename = "5min")]
    pub five: f64,
    #[serde(rename = "15min")]
    pub fifteen: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySummary {
    pub total: u64,
    pub used: u64,
    pub available: u64,
    pub percent: f32,
    pub swap_total: u64,
    pub swap_used: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskSummary {
    pub mount_point: String,
    pub total: u64,
    pub available: u64,
    pub percent_used: f32,
}

/// Full summary for the system info endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemSummary {
    pub timestamp: DateTime<Utc>,
    pub cpu: CpuSummary,
    pub memory: MemorySummary,
    pub disks: Vec<DiskSummary>,
    pub boot_time: u64,
    pub uptime_seconds: u64,
}

/// Collects host metrics through sysinfo.
///
/// CPU usage is computed from deltas between refreshes, so the first
/// reading after construction reports zero.
pub struct SystemInfoCollector {
    sys: System,
}

impl SystemInfoCollector {
    pub fn new() -> Self {
        Self {
            sys: System::new_all(),
        }
    }

    /// Quick summary for the 1-second broadcast heartbeat.
    pub fn lightweight_summary(&mut self) -> LightweightSummary {
        self.sys.refresh_cpu();
        self.sys.refresh_memory();

        LightweightSummary {
            timestamp: Utc::now(),
            cpu_usage: self.sys.global_cpu_info().cpu_usage(),
            cpu_temp: self.cpu_temperature(),
            memory_percent: memory_percent(&self.sys),
            uptime_seconds: self.sys.uptime(),
        }
    }

    /// Comprehensive summary for on-demand queries.
    pub fn summary(&mut self) -> SystemSummary {
        self.sys.refresh_cpu();
        self.sys.refresh_memory();
        self.sys.refresh_disks();

        let load = self.sys.load_average();
        let cpu = CpuSummary {
            usage_percent: self.sys.global_cpu_info().cpu_usage(),
            usage_per_core: self.sys.cpus().iter().map(|c| c.cpu_usage()).collect(),
            frequency_mhz: self.sys.global_cpu_info().frequency(),
            temperature: self.cpu_temperature(),
            load_average: LoadAverage {
                one: load.one,
                five: load.five,
                fifteen: load.fifteen,
            },
        };

        let memory = MemorySummary {
            total: self.sys.total_memory(),
            used: self.sys.used_memory(),
            available: self.sys.available_memory(),
            percent: memory_percent(&self.sys),
            swap_total: self.sys.total_swap(),
            swap_used: self.sys.used_swap(),
        };

        let disks = self
            .sys
            .disks()
            .iter()
            .map(|d| {
                let total = d.total_space();
                let available = d.available_space();
                DiskSummary {
                    mount_point: d.mount_point().display().to_string(),
                    total,
                    available,
                    percent_used: if total > 0 {
                        (total - available) as f32 / total as f32 * 100.0
                    } else {
                        0.0
                    },
                }
            })
            .collect();

        SystemSummary {
            timestamp: Utc::now(),
            cpu,
            memory,
            disks,
            boot_time: self.sys.boot_time(),
            uptime_seconds: self.sys.uptime(),
        }
    }

    /// CPU temperature from the thermal zone, falling back to sysinfo's
    /// component sensors. Returns None on hosts exposing neither.
    fn cpu_temperature(&mut self) -> Option<f32> {
        if let Ok(raw) = std::fs::read_to_string(THERMAL_ZONE_PATH) {
            if let Ok(millidegrees) = raw.trim().parse::<f32>() {
                return Some(millidegrees / 1000.0);
            }
        }

        self.sys.refresh_components();
        self.sys
            .components()
            .iter()
            .find(|c| c.label().to_lowercase().contains("cpu"))
            .map(|c| c.temperature())
    }
}

impl Default for SystemInfoCollector {
    fn default() -> Self {
        Self::new()
    }
}

fn memory_percent(sys: &System) -> f32 {
    let total = sys.total_memory();
    if total == 0 {
        return 0.0;
    }
    sys.used_memory() as f32 / total as f32 * 100.0
}
