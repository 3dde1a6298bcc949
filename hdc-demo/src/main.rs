//! HDC demo device — entry point.
//!
//! Serves a minimal HDC device over a TCP-bridged link so a host can
//! introspect it, read and write its properties, and watch its events:
//!
//! ```text
//! hdc-demo                          Listen on 127.0.0.1:5580
//! hdc-demo --listen 0.0.0.0:7000    Listen elsewhere
//! ```

mod feature;
mod link;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use hdc_device::{Device, LogLevel, PropertyCell};

use crate::feature::{CoreState, EVENT_BUTTON, core_feature};
use crate::link::TcpLink;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "hdc-demo", about = "Minimal HDC demo device over TCP")]
struct Cli {
    /// Address the device listens on for its HDC host.
    #[arg(short, long, default_value = "127.0.0.1:5580")]
    listen: String,
}

// ── Main ─────────────────────────────────────────────────────────

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let led_rate = PropertyCell::new(vec![5u8]);
    let reset_requested = Arc::new(AtomicBool::new(false));

    let link = TcpLink::bind(&cli.listen)?;
    let mut device: Device<TcpLink> = Device::new(
        link,
        vec![core_feature(
            Arc::clone(&led_rate),
            Arc::clone(&reset_requested),
        )],
    )?;

    boot(&mut device)?;
    info!("device ready");

    let mut led_on = false;
    let mut next_led_toggle = Instant::now();
    let mut next_button_toggle = Instant::now() + Duration::from_secs(5);
    let mut button_pressed = false;

    loop {
        if let Err(work_error) = device.work() {
            // Enter the error state and tell the host before bailing.
            error!(%work_error, "runtime failure");
            device.feature_state_transition(None, CoreState::Error as u8)?;
            device.emit_log(None, LogLevel::Error, "Device entered the error state.")?;
            device.flush()?;
            return Err(work_error.into());
        }

        if reset_requested.swap(false, Ordering::SeqCst) {
            info!("reset requested by host");
            boot(&mut device)?;
        }

        // LED blinking, whose rate the host controls via a writable
        // property.
        let now = Instant::now();
        if now >= next_led_toggle {
            led_on = !led_on;
            debug!(led_on, "led toggle");
            let rate_hz = u64::from(led_rate.load()[0].max(1));
            next_led_toggle = now + Duration::from_millis(1000 / rate_hz);
        }

        // A simulated button press every few seconds showcases custom
        // events.
        if now >= next_button_toggle {
            button_pressed = !button_pressed;
            device.emit_event(
                None,
                EVENT_BUTTON,
                &[0x42],
                &[u8::from(button_pressed)],
            )?;
            device.emit_log(
                None,
                LogLevel::Debug,
                "This is just to showcase the logging capabilities of HDC.",
            )?;
            next_button_toggle = now + Duration::from_secs(5);
        }

        std::thread::sleep(Duration::from_millis(1));
    }
}

/// Run the boot sequence the host observes after power-up or reset.
fn boot(device: &mut Device<TcpLink>) -> Result<(), hdc_device::HdcError> {
    device.feature_state_transition(None, CoreState::Initializing as u8)?;
    device.feature_state_transition(None, CoreState::Ready as u8)?;
    device.flush()
}
