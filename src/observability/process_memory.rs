use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::warn;

/// Process memory counters used by the cache report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessMemory {
    /// memory obtained from the OS (virtual size)
    pub total_bytes: u64,
    /// memory in active use (resident set)
    pub heap_in_use_bytes: u64,
    /// memory returned to the OS; the system allocator does not report this
    pub released_bytes: u64,
}

impl ProcessMemory {
    pub fn system_in_use_bytes(&self) -> u64 {
        self.total_bytes.saturating_sub(self.released_bytes)
    }
}

pub struct ProcessMemorySampler {
    sys: System,
    pid: Option<Pid>,
}

impl Default for ProcessMemorySampler {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessMemorySampler {
    pub fn new() -> Self {
        let pid = sysinfo::get_current_pid()
            .inspect_err(|e| warn!("process memory sampling disabled: {}", e))
            .ok();
        Self { sys: System::new(), pid }
    }

    pub fn sample(&mut self) -> ProcessMemory {
        let Some(pid) = self.pid else {
            return ProcessMemory::default();
        };
        self.sys.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            false,
            ProcessRefreshKind::nothing().with_memory(),
        );

        self.sys
            .process(pid)
            .map(|process| ProcessMemory {
                total_bytes: process.virtual_memory(),
                heap_in_use_bytes: process.memory(),
                released_bytes: 0,
            })
            .unwrap_or_default()
    }
}
