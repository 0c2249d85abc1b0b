//! [`LineProvider`] over the legacy `/sys/class/gpio` interface.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use gpiowd_supervisor::{DigitalLine, Direction, Level, LineError, LineId, LineProvider};
use tracing::{debug, warn};

use crate::chip::scan_chips;

/// Default sysfs class directory.
pub const DEFAULT_ROOT: &str = "/sys/class/gpio";

/// Upper bound on line numbers when no chip information is available.
pub const MAX_GPIO: LineId = 512;

const EXPORT_POLL_ATTEMPTS: u32 = 20;
const EXPORT_POLL_INTERVAL: Duration = Duration::from_millis(5);

fn to_line_error(id: LineId, context: &str, err: &io::Error) -> LineError {
    match err.raw_os_error() {
        Some(libc::EBUSY) => LineError::Busy(id),
        Some(libc::EINVAL) => LineError::Invalid(id),
        _ => LineError::io(id, format!("{context}: {err}")),
    }
}

/// Write a whole attribute value in one `write(2)`, as sysfs expects.
fn write_attr(path: &Path, value: &str) -> io::Result<()> {
    let mut file = OpenOptions::new().write(true).open(path)?;
    file.write_all(value.as_bytes())
}

/// Line provider backed by sysfs.
#[derive(Debug, Clone)]
pub struct SysfsGpio {
    root: PathBuf,
}

impl SysfsGpio {
    /// Provider rooted at [`DEFAULT_ROOT`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_root(DEFAULT_ROOT)
    }

    /// Provider rooted at `root`.
    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Class directory in use.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn line_dir(&self, id: LineId) -> PathBuf {
        self.root.join(format!("gpio{id}"))
    }

    fn wait_for_export(&self, id: LineId) -> Result<(), LineError> {
        let direction = self.line_dir(id).join("direction");
        for _ in 0..EXPORT_POLL_ATTEMPTS {
            if direction.exists() {
                return Ok(());
            }
            thread::sleep(EXPORT_POLL_INTERVAL);
        }
        Err(LineError::io(id, "exported line did not appear"))
    }
}

impl Default for SysfsGpio {
    fn default() -> Self {
        Self::new()
    }
}

impl LineProvider for SysfsGpio {
    type Line = SysfsLine;

    fn is_valid(&self, id: LineId) -> bool {
        let chips = scan_chips(&self.root);
        if chips.is_empty() {
            id < MAX_GPIO
        } else {
            chips.iter().any(|chip| chip.contains(id))
        }
    }

    fn acquire(
        &self,
        id: LineId,
        label: &'static str,
        direction: Direction,
    ) -> Result<SysfsLine, LineError> {
        write_attr(&self.root.join("export"), &id.to_string())
            .map_err(|e| to_line_error(id, "export", &e))?;
        debug!(line = id, label, "Exported line");

        // From here on, dropping the handle unexports the line.
        let line = SysfsLine {
            id,
            label,
            root: self.root.clone(),
            dir: self.line_dir(id),
        };
        self.wait_for_export(id)?;

        let setting = match direction {
            Direction::Input => "in",
            Direction::Output {
                initial: Level::Low,
            } => "low",
            Direction::Output {
                initial: Level::High,
            } => "high",
        };
        write_attr(&line.dir.join("direction"), setting)
            .map_err(|e| to_line_error(id, "direction", &e))?;

        Ok(line)
    }
}

/// Exported sysfs line. Unexported on drop.
#[derive(Debug)]
pub struct SysfsLine {
    id: LineId,
    label: &'static str,
    root: PathBuf,
    dir: PathBuf,
}

impl DigitalLine for SysfsLine {
    fn id(&self) -> LineId {
        self.id
    }

    fn get_level(&mut self) -> Result<Level, LineError> {
        let raw = fs::read_to_string(self.dir.join("value"))
            .map_err(|e| to_line_error(self.id, "read value", &e))?;
        match raw.trim() {
            "0" => Ok(Level::Low),
            "1" => Ok(Level::High),
            other => Err(LineError::io(
                self.id,
                format!("unexpected value {other:?}"),
            )),
        }
    }

    fn set_level(&mut self, level: Level) -> Result<(), LineError> {
        let value = if level.is_high() { "1" } else { "0" };
        write_attr(&self.dir.join("value"), value).map_err(|e| match e.raw_os_error() {
            Some(libc::EPERM) => LineError::NotOutput(self.id),
            _ => to_line_error(self.id, "write value", &e),
        })
    }
}

impl Drop for SysfsLine {
    fn drop(&mut self) {
        if let Err(e) = write_attr(&self.root.join("unexport"), &self.id.to_string()) {
            warn!(line = self.id, label = self.label, error = %e, "Failed to unexport line");
        } else {
            debug!(line = self.id, label = self.label, "Unexported line");
        }
    }
}
