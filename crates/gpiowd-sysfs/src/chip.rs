//! GPIO chip discovery under the sysfs class directory.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use gpiowd_supervisor::LineId;
use tracing::debug;

/// Range of line numbers served by one `gpiochipN` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChipRange {
    /// First line number.
    pub base: LineId,
    /// Number of lines.
    pub ngpio: u32,
}

impl ChipRange {
    /// Whether `id` falls inside this chip.
    #[must_use]
    pub fn contains(&self, id: LineId) -> bool {
        id.checked_sub(self.base).is_some_and(|offset| offset < self.ngpio)
    }
}

fn read_number<T: FromStr>(path: &Path) -> Option<T> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// List the chips registered under `root`. Unreadable entries are skipped.
#[must_use]
pub fn scan_chips(root: &Path) -> Vec<ChipRange> {
    let Ok(entries) = fs::read_dir(root) else {
        return Vec::new();
    };

    let mut chips: Vec<ChipRange> = entries
        .flatten()
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("gpiochip"))
        .filter_map(|entry| {
            let dir = entry.path();
            let base = read_number(&dir.join("base"))?;
            let ngpio = read_number(&dir.join("ngpio"))?;
            Some(ChipRange { base, ngpio })
        })
        .collect();
    chips.sort_unstable_by_key(|chip| chip.base);

    debug!(root = %root.display(), chips = chips.len(), "Scanned GPIO chips");
    chips
}
