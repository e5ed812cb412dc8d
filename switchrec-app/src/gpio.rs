//! Switch inputs and indicator LEDs over the sysfs GPIO interface.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use tracing::debug;

/// A two-position switch.
pub trait SwitchInput {
    fn is_on(&mut self) -> io::Result<bool>;
}

/// An on/off status indicator.
pub trait Indicator {
    fn set(&mut self, on: bool) -> io::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    fn as_str(self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
        }
    }
}

/// One exported pin under `<root>/gpio<N>`.
#[derive(Debug)]
pub struct SysfsPin {
    value_path: PathBuf,
}

impl SysfsPin {
    /// Export `number` (if not already exported) and set its direction.
    ///
    /// Pull resistors cannot be configured through sysfs; the switches are
    /// expected to be wired with external pull-downs or a device-tree overlay.
    pub fn open(root: &Path, number: u32, direction: Direction) -> io::Result<Self> {
        let pin_dir = root.join(format!("gpio{number}"));
        if !pin_dir.exists() {
            fs::write(root.join("export"), number.to_string())?;
            // udev applies permissions asynchronously after export.
            for _ in 0..20 {
                if pin_dir.join("direction").exists() {
                    break;
                }
                thread::sleep(Duration::from_millis(10));
            }
        }
        fs::write(pin_dir.join("direction"), direction.as_str())?;
        debug!(pin = number, direction = direction.as_str(), "gpio ready");

        Ok(Self {
            value_path: pin_dir.join("value"),
        })
    }
}

impl SwitchInput for SysfsPin {
    fn is_on(&mut self) -> io::Result<bool> {
        let raw = fs::read_to_string(&self.value_path)?;
        Ok(raw.trim() == "1")
    }
}

impl Indicator for SysfsPin {
    fn set(&mut self, on: bool) -> io::Result<()> {
        fs::write(&self.value_path, if on { "1" } else { "0" })
    }
}
