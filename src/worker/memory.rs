//! Resident set size of the current process.
//!
//! On Linux the second field of `/proc/self/statm` (resident pages) is scaled by the page
//! size. Other platforms report nothing.

use crate::ipc::MemoryUsage;

const STATM: &str = "/proc/self/statm";

/// Current memory usage, or `None` if it cannot be determined.
pub(crate) fn memory_usage() -> Option<MemoryUsage> {
    resident_set_size().map(|rss| MemoryUsage { rss })
}

#[cfg(target_os = "linux")]
fn resident_set_size() -> Option<u64> {
    let statm = std::fs::read_to_string(STATM).ok()?;
    parse_statm(&statm, page_size()?)
}

#[cfg(not(target_os = "linux"))]
fn resident_set_size() -> Option<u64> {
    None
}

#[cfg(target_os = "linux")]
fn page_size() -> Option<u64> {
    use nix::unistd::{sysconf, SysconfVar};

    match sysconf(SysconfVar::PAGE_SIZE) {
        Ok(Some(size)) if size > 0 => Some(size as u64),
        _ => None,
    }
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_statm(statm: &str, page_size: u64) -> Option<u64> {
    let pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    pages.checked_mul(page_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resident_pages_are_scaled_by_page_size() {
        assert_eq!(parse_statm("5120 768 300 12 0 900 0\n", 4096), Some(768 * 4096));
        assert_eq!(parse_statm("5120\n", 4096), None);
        assert_eq!(parse_statm("5120 lots 1", 4096), None);
        assert_eq!(parse_statm("1 18446744073709551615", 4096), None);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn linux_reports_a_live_rss() {
        let usage = memory_usage().expect("rss");
        assert!(usage.rss > 0);
    }
}
