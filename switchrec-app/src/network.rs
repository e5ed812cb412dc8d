//! Wireless interface toggling.

use std::process::Command;

use anyhow::{bail, Context, Result};

pub trait NetworkToggle {
    fn set_enabled(&mut self, up: bool) -> Result<()>;
}

/// Brings an interface up or down with `ip link set`.
#[derive(Debug, Clone)]
pub struct LinkToggle {
    interface: String,
}

impl LinkToggle {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
        }
    }
}

impl NetworkToggle for LinkToggle {
    fn set_enabled(&mut self, up: bool) -> Result<()> {
        let state = if up { "up" } else { "down" };
        let status = Command::new("ip")
            .args(["link", "set", self.interface.as_str(), state])
            .status()
            .context("failed to run `ip`")?;
        if !status.success() {
            bail!("`ip link set {} {state}` exited with {status}", self.interface);
        }
        Ok(())
    }
}
