//! Host resource probe for engine tuning defaults.
//!
//! Consumed only to fill in Threads/Hash when they are not explicitly
//! configured; detection failures degrade to conservative defaults.

use std::fs;

#[derive(Debug, Clone, Copy)]
pub struct SystemResources {
    pub cpu_count: usize,
    /// Total memory in MiB; `None` when it could not be determined.
    pub total_ram_mb: Option<u64>,
}

pub fn detect() -> SystemResources {
    SystemResources {
        cpu_count: num_cpus::get(),
        total_ram_mb: read_meminfo_mb(),
    }
}

fn read_meminfo_mb() -> Option<u64> {
    let contents = fs::read_to_string("/proc/meminfo").ok()?;
    parse_meminfo_mb(&contents)
}

fn parse_meminfo_mb(contents: &str) -> Option<u64> {
    for line in contents.lines() {
        if let Some(rest) = line.strip_prefix("MemTotal:") {
            let kb: u64 = rest.split_whitespace().next()?.parse().ok()?;
            return Some(kb / 1024);
        }
    }
    None
}

/// Engine tuning role: short time controls get fewer threads and a smaller
/// hash so moves come back fast; longer controls get the full table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineRole {
    Fast,
    Standard,
}

/// Recommend (Threads, Hash MiB) from detected host resources.
pub fn recommended_threads_and_hash(role: EngineRole, res: &SystemResources) -> (usize, u64) {
    let cpu = if res.cpu_count == 0 { 4 } else { res.cpu_count };
    let ram = res.total_ram_mb.unwrap_or(8192);
    // leave one core for the session and the transport
    let usable = cpu.saturating_sub(1).max(1);

    match role {
        EngineRole::Fast => {
            let hash = if ram <= 4096 {
                256
            } else if ram <= 8192 {
                512
            } else {
                1024
            };
            (usable.min(4), hash)
        }
        EngineRole::Standard => {
            let hash = if ram <= 4096 {
                1024
            } else if ram <= 8192 {
                3072
            } else {
                4096
            };
            (usable.min(7), hash)
        }
    }
}
