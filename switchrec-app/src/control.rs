//! Switch-panel control loop.
//!
//! Each `tick()` reads both switches once. The record switch acts only on a
//! change of level (its first reading is taken at construction, so a switch
//! left on across a reboot does not start a recording). The Wi-Fi switch
//! starts out unknown, so its level is applied on the first tick.

use std::io;

use switchrec_core::{AudioStream, PcmSample, RecordTransition, Recorder, RecorderError};
use tracing::{debug, error, info, warn};

use crate::gpio::{Indicator, SwitchInput};
use crate::network::NetworkToggle;

/// Record LED toggles every 2^BLINK_SHIFT ticks while recording.
const BLINK_SHIFT: u32 = 3;

pub struct SwitchPanel {
    pub record_switch: Box<dyn SwitchInput>,
    pub wifi_switch: Box<dyn SwitchInput>,
    pub record_led: Box<dyn Indicator>,
    pub wifi_led: Box<dyn Indicator>,
}

pub struct ControlLoop<A: AudioStream, S: PcmSample> {
    recorder: Recorder<A, S>,
    panel: SwitchPanel,
    network: Box<dyn NetworkToggle>,
    last_record: bool,
    last_wifi: Option<bool>,
    blink: u32,
}

impl<A: AudioStream, S: PcmSample> ControlLoop<A, S> {
    pub fn new(
        recorder: Recorder<A, S>,
        mut panel: SwitchPanel,
        network: Box<dyn NetworkToggle>,
    ) -> io::Result<Self> {
        let last_record = panel.record_switch.is_on()?;
        panel.record_led.set(false)?;
        panel.wifi_led.set(false)?;

        Ok(Self {
            recorder,
            panel,
            network,
            last_record,
            last_wifi: None,
            blink: 0,
        })
    }

    pub fn tick(&mut self) {
        self.poll_record_switch();
        self.poll_wifi_switch();
    }

    /// Finalize any active recording and turn the indicators off.
    pub fn shutdown(&mut self) {
        if self.recorder.is_recording() {
            match self.recorder.stop() {
                Ok(summary) => info!(path = ?summary.path, "recording finalized on shutdown"),
                Err(e) => error!("stopping recording on shutdown failed: {e}"),
            }
        }
        self.set_record_led(false);
        if let Err(e) = self.panel.wifi_led.set(false) {
            warn!("wifi led: {e}");
        }
    }

    #[cfg(test)]
    fn recorder(&self) -> &Recorder<A, S> {
        &self.recorder
    }

    fn poll_record_switch(&mut self) {
        if let Err(e) = self.recorder.service() {
            error!("recording aborted: {e}");
            self.set_record_led(false);
        }

        let pressed = match self.panel.record_switch.is_on() {
            Ok(level) => level,
            Err(e) => {
                warn!("record switch read failed: {e}");
                return;
            }
        };

        if self.recorder.is_recording() {
            let on = (self.blink >> BLINK_SHIFT) & 1 == 0;
            self.set_record_led(on);
            self.blink = self.blink.wrapping_add(1);
        }

        if pressed != self.last_record {
            self.on_record_edge(pressed);
        }
        self.last_record = pressed;
    }

    fn on_record_edge(&mut self, pressed: bool) {
        if pressed {
            self.set_record_led(false);
            self.blink = 0;
        }

        match self.recorder.on_record_switch_edge(pressed) {
            Ok(RecordTransition::Started(path)) => info!(path = ?path, "recording"),
            Ok(RecordTransition::Stopped(summary)) => info!(
                path = ?summary.path,
                secs = summary.duration_secs,
                dropped = summary.samples_dropped,
                "recording saved"
            ),
            Err(RecorderError::NotRecording) => debug!("record switch released while idle"),
            Err(RecorderError::AlreadyRecording) => debug!("record switch pressed while recording"),
            Err(e) => error!("record switch: {e}"),
        }

        if !pressed {
            self.set_record_led(false);
        }
    }

    fn poll_wifi_switch(&mut self) {
        let up = match self.panel.wifi_switch.is_on() {
            Ok(level) => level,
            Err(e) => {
                warn!("wifi switch read failed: {e}");
                return;
            }
        };
        if self.last_wifi == Some(up) {
            return;
        }

        match self.network.set_enabled(up) {
            Ok(()) => info!(up, "wifi toggled"),
            Err(e) => warn!("wifi toggle failed: {e:#}"),
        }
        if let Err(e) = self.panel.wifi_led.set(up) {
            warn!("wifi led: {e}");
        }
        self.last_wifi = Some(up);
    }

    fn set_record_led(&mut self, on: bool) {
        if let Err(e) = self.panel.record_led.set(on) {
            warn!("record led: {e}");
        }
    }
}
