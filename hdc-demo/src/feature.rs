//! The demo device's Core feature: identity properties, a writable
//! blink rate, a reset command and a simulated button event.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use hdc_device::{
    ArgSpec, Command, DType, Event, Exception, Feature, Property, PropertyCell, State, Value,
    exc_id,
};

/// States of the Core feature's machine.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreState {
    Off = 0x00,
    Initializing = 0x01,
    Ready = 0x02,
    Error = 0xFF,
}

/// The custom ButtonEvent ID.
pub const EVENT_BUTTON: u8 = 0x01;

/// Synthetic stand-ins for the microcontroller identity registers.
const DEVICE_ID: u32 = 0x0000_0422;
const REVISION_ID: u32 = 0x0000_1001;
const UNIQUE_ID: [u8; 12] = *b"DEMO-UID-001";

/// Assemble the Core feature.
///
/// `led_rate` is shared with the main loop, which blinks at whatever
/// rate the host last stored. `reset_requested` is raised by the Reset
/// command after its reply has been flushed; the main loop performs
/// the actual re-initialization.
pub fn core_feature(led_rate: Arc<PropertyCell>, reset_requested: Arc<AtomicBool>) -> Feature {
    Feature::new(0x00, "Core", "MinimalCore", "1.0.0")
        .with_doc("Core feature of the minimal demo.")
        .with_initial_state(CoreState::Off as u8)
        .with_state(State::new(CoreState::Off as u8, "Off"))
        .with_state(State::new(CoreState::Initializing as u8, "Initializing"))
        .with_state(State::new(CoreState::Ready as u8, "Ready"))
        .with_state(State::new(CoreState::Error as u8, "Error"))
        .with_command(
            Command::new(0x01, "Reset", move |ctx, req| {
                if req.message().len() != 3 {
                    return ctx.reply_error(exc_id::INVALID_ARGS);
                }
                // Reply and notify before the device goes away.
                ctx.reply_void()?;
                ctx.feature_state_transition(None, CoreState::Off as u8)?;
                ctx.flush()?;
                reset_requested.store(true, Ordering::SeqCst);
                Ok(())
            })
            .with_doc("Reinitializes the whole device.")
            .raises(Exception::not_now()),
        )
        .with_event(
            Event::new(EVENT_BUTTON, "ButtonEvent")
                .with_doc("Notifies host about the button being pressed on the device.")
                .arg(ArgSpec::named(DType::UInt8, "ButtonID"))
                .arg(ArgSpec::named(DType::UInt8, "ButtonState")),
        )
        .with_property(
            Property::new(0x10, "uC_DEVID", DType::UInt32)
                .read_only()
                .with_getter(|_| Value::UInt32(DEVICE_ID))
                .with_doc("32bit Device-ID of the microcontroller."),
        )
        .with_property(
            Property::new(0x11, "uC_REVID", DType::UInt32)
                .read_only()
                .with_getter(|_| Value::UInt32(REVISION_ID))
                .with_doc("32bit Revision-ID of the microcontroller."),
        )
        .with_property(
            Property::new(0x12, "uC_UID", DType::Blob)
                .read_only()
                .with_size(12)
                .backed_by(PropertyCell::new(UNIQUE_ID))
                .with_doc("96bit unique-ID of the microcontroller."),
        )
        .with_property(
            Property::new(0x13, "LedBlinkingRate", DType::UInt8)
                .backed_by(led_rate)
                .with_doc("Blinking frequency of the LED given in Hertz."),
        )
}
