use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
#[cfg(feature = "cli")]
use std::sync::Mutex;
#[cfg(feature = "cli")]
use sysinfo::{Pid, System};

/// Amostra do estado do sistema em um instante.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemSample {
    pub timestamp: DateTime<Local>,
    pub cpu_percent: f32,
    pub memory_percent: f32,
    pub memory_used_gb: f64,
    pub process_memory_mb: u64,
}

impl SystemSample {
    pub fn empty() -> Self {
        Self {
            timestamp: Local::now(),
            cpu_percent: 0.0,
            memory_percent: 0.0,
            memory_used_gb: 0.0,
            process_memory_mb: 0,
        }
    }
}

#[cfg(feature = "cli")]
pub struct SystemMonitor {
    system: Mutex<System>,
    pid: Option<Pid>,
    peak_memory_mb: Mutex<u64>,
}

#[cfg(feature = "cli")]
impl SystemMonitor {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_memory();
        system.refresh_cpu_usage();

        Self {
            system: Mutex::new(system),
            pid: sysinfo::get_current_pid().ok(),
            peak_memory_mb: Mutex::new(0),
        }
    }

    pub fn sample(&self) -> SystemSample {
        let Ok(mut system) = self.system.lock() else {
            return SystemSample::empty();
        };
        system.refresh_memory();
        system.refresh_cpu_usage();
        if let Some(pid) = self.pid {
            system.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[pid]), true);
        }

        let total = system.total_memory();
        let used = system.used_memory();
        let memory_percent = if total > 0 {
            (used as f64 / total as f64 * 100.0) as f32
        } else {
            0.0
        };

        let process_memory_mb = self
            .pid
            .and_then(|pid| system.process(pid))
            .map(|p| p.memory() / 1024 / 1024)
            .unwrap_or(0);

        if let Ok(mut peak) = self.peak_memory_mb.lock() {
            if process_memory_mb > *peak {
                *peak = process_memory_mb;
            }
        }

        SystemSample {
            timestamp: Local::now(),
            cpu_percent: system.global_cpu_usage(),
            memory_percent,
            memory_used_gb: used as f64 / 1024f64.powi(3),
            process_memory_mb,
        }
    }

    pub fn peak_memory_mb(&self) -> u64 {
        self.peak_memory_mb.lock().map(|p| *p).unwrap_or(0)
    }

    pub fn log_stats(&self, phase: &str) {
        let sample = self.sample();
        tracing::info!(
            "📊 {} - CPU: {:.1}%, Memory: {:.1}% ({:.2}GB), Process: {}MB, Peak: {}MB",
            phase,
            sample.cpu_percent,
            sample.memory_percent,
            sample.memory_used_gb,
            sample.process_memory_mb,
            self.peak_memory_mb()
        );
    }

    pub fn is_enabled(&self) -> bool {
        true
    }
}

#[cfg(feature = "cli")]
impl Default for SystemMonitor {
    fn default() -> Self {
        Self::new()
    }
}

// Sem o feature `cli` as amostras saem zeradas
#[cfg(not(feature = "cli"))]
#[derive(Default)]
pub struct SystemMonitor;

#[cfg(not(feature = "cli"))]
impl SystemMonitor {
    pub fn new() -> Self {
        Self
    }

    pub fn sample(&self) -> SystemSample {
        SystemSample::empty()
    }

    pub fn peak_memory_mb(&self) -> u64 {
        0
    }

    pub fn log_stats(&self, _phase: &str) {}

    pub fn is_enabled(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_is_within_bounds() {
        let monitor = SystemMonitor::new();
        let sample = monitor.sample();
        assert!(sample.memory_percent >= 0.0 && sample.memory_percent <= 100.0);
        assert!(sample.cpu_percent >= 0.0);
        assert!(monitor.peak_memory_mb() >= sample.process_memory_mb || !monitor.is_enabled());
    }
}
