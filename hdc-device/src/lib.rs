//! # hdc-device
//!
//! Device-side runtime of the Host-Device Communication (HDC)
//! protocol: a compact, binary, request/response-plus-event protocol
//! spoken over an ordered byte stream (typically a UART) between an
//! embedded device and a host.
//!
//! This crate contains:
//! - **Framing**: checksummed, terminator-delimited packets with
//!   byte-by-byte resynchronization on garbage (`frame`)
//! - **Composition**: double-buffered TX with multi-packet message
//!   splitting, driven by link completion signals (`compose`)
//! - **Descriptors**: introspectable `Feature`/`Command`/`Property`/
//!   `Event` tables registered once at construction (`descriptor`)
//! - **Dispatch**: Meta / Echo / Command routing with protocol
//!   exceptions carried in replies (`dispatch`)
//! - **Properties**: type-directed get/set over getters, setters and
//!   backing storage (`property`)
//! - **Events**: wire-level logging and feature state machines
//!   (`event`)
//! - **Meta/IDL**: a streamed JSON self-description the host uses to
//!   generate its client stub (`meta`, `idl`)
//! - **Orchestration**: the [`Device`] driven by the application's
//!   main loop (`device`)
//!
//! The physical transport is abstracted behind the [`Link`] trait; an
//! in-memory [`LoopbackLink`] serves tests and host-less bring-up.

pub mod ctx;
pub mod descriptor;
pub mod device;
pub mod dtype;
pub mod error;
pub mod event;
pub mod frame;
pub mod link;
pub mod message;
pub mod meta;

mod compose;
mod dispatch;
mod idl;
mod property;
mod registry;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use ctx::{CommandCtx, CommandRequest, MessageRouter, RouterCtx};
pub use descriptor::{
    ArgSpec, Command, CommandHandler, Event, Exception, Feature, Property, PropertyCell,
    PropertyGetter, PropertySetter, State,
};
pub use device::Device;
pub use dtype::{DType, Value};
pub use error::{DescriptorError, HdcError, LinkError};
pub use event::LogLevel;
pub use frame::{MAX_PACKET_PAYLOAD, PACKET_OVERHEAD, PACKET_TERMINATOR, checksum};
pub use link::loopback::LoopbackLink;
pub use link::{Link, LinkPort};
pub use message::{MessageType, MetaId, exc_id};
pub use meta::HDC_VERSION;
