//! Resource usage of the running process

use std::sync::Mutex;

use serde::Serialize;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::warn;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessStats {
    pub pid: u32,
    pub memory_bytes: u64,
    pub virtual_memory_bytes: u64,
    pub uptime_secs: u64,
    /// Consumed CPU time over wall-clock uptime, in percent
    pub cpu_percent: f64,
}

/// Samples the current process through `sysinfo`
pub struct ProcessSampler {
    pid: Option<Pid>,
    system: Mutex<System>,
}

impl Default for ProcessSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSampler {
    pub fn new() -> Self {
        let pid = sysinfo::get_current_pid()
            .inspect_err(|e| warn!("unable to determine own pid: {e}"))
            .ok();
        Self {
            pid,
            system: Mutex::new(System::new()),
        }
    }

    pub fn sample(&self) -> ProcessStats {
        let Some(pid) = self.pid else {
            return ProcessStats::default();
        };

        let Ok(mut system) = self.system.lock() else {
            return ProcessStats::default();
        };
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::everything(),
        );

        let Some(process) = system.process(pid) else {
            return ProcessStats::default();
        };

        let uptime_secs = process.run_time();
        ProcessStats {
            pid: pid.as_u32(),
            memory_bytes: process.memory(),
            virtual_memory_bytes: process.virtual_memory(),
            uptime_secs,
            cpu_percent: cpu_percent(process.accumulated_cpu_time(), uptime_secs),
        }
    }
}

/// CPU time in milliseconds over uptime in seconds, as a percentage
pub fn cpu_percent(cpu_time_ms: u64, uptime_secs: u64) -> f64 {
    if uptime_secs == 0 {
        return 0.0;
    }
    cpu_time_ms as f64 / (uptime_secs as f64 * 1000.0) * 100.0
}
