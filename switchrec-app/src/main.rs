//! switchrec appliance entry point.
//!
//! ## Runtime note
//!
//! `cpal::Stream` is `!Send`, so the recorder lives on the main thread and the
//! control loop runs inside a current-thread Tokio runtime. Only the drain
//! worker runs on its own thread.

mod control;
mod gpio;
mod network;
mod settings;

use std::time::Duration;

use anyhow::{bail, Context, Result};
use cpal::SizedSample;
use switchrec_core::{CpalInputStream, PcmSample, Recorder};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use control::{ControlLoop, SwitchPanel};
use gpio::{Direction, SysfsPin};
use network::LinkToggle;
use settings::{default_settings_path, load_settings, AppSettings};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("switchrec=info")),
        )
        .init();

    let settings_path = default_settings_path();
    let settings = load_settings(&settings_path);
    info!(path = ?settings_path, "switchrec starting");

    match settings.recorder.bits_per_sample {
        8 => run::<u8>(settings),
        16 => run::<i16>(settings),
        32 => run::<i32>(settings),
        other => bail!("unsupported bitsPerSample {other}"),
    }
}

fn run<S>(settings: AppSettings) -> Result<()>
where
    S: PcmSample + SizedSample,
{
    let recorder_config = settings.recorder.clone();
    let hint = settings.device_hint();
    let recorder = Recorder::<CpalInputStream, S>::new(recorder_config, |producer| {
        CpalInputStream::open(&settings.recorder, hint, producer)
    })
    .context("failed to initialise audio capture")?;

    let root = settings.gpio_root.as_path();
    let pin = |number: u32, direction: Direction| {
        SysfsPin::open(root, number, direction)
            .with_context(|| format!("failed to open gpio{number}"))
    };
    let panel = SwitchPanel {
        record_switch: Box::new(pin(settings.record_switch_pin, Direction::In)?),
        wifi_switch: Box::new(pin(settings.wifi_switch_pin, Direction::In)?),
        record_led: Box::new(pin(settings.record_led_pin, Direction::Out)?),
        wifi_led: Box::new(pin(settings.wifi_led_pin, Direction::Out)?),
    };
    let network = Box::new(LinkToggle::new(settings.wifi_interface.clone()));

    let mut control =
        ControlLoop::new(recorder, panel, network).context("failed to read switch panel")?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build runtime")?;

    let poll = Duration::from_millis(settings.poll_interval_ms);
    runtime.block_on(async {
        let mut ticker = tokio::time::interval(poll);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(poll_ms = settings.poll_interval_ms, "control loop running");

        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = ticker.tick() => control.tick(),
                _ = &mut shutdown => break,
            }
        }
    });

    control.shutdown();
    info!("switchrec stopped");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("ctrl-c handler failed: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("SIGTERM handler failed: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("interrupt received"),
        _ = terminate => info!("terminate received"),
    }
}
