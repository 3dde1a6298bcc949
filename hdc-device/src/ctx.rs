//! Request contexts handed to command handlers and message routers.
//!
//! A handler never touches the composer or link directly; it replies
//! through [`CommandCtx`], which echoes the request's feature and
//! command IDs into the reply header. Reply helpers exist for every
//! dtype, mirroring the reply surface of the original driver.

use crate::compose::TxHalf;
use crate::descriptor::Feature;
use crate::dtype::{DType, Value};
use crate::error::HdcError;
use crate::event::{self, LogLevel};
use crate::message::{MessageType, exc_id};
use crate::registry::FeatureRegistry;

// ── Ctx ──────────────────────────────────────────────────────────

/// Everything a request needs while being serviced: the TX path, the
/// descriptor tables and the compile-time request limit.
pub(crate) struct Ctx<'a> {
    pub(crate) tx: TxHalf<'a>,
    pub(crate) registry: &'a mut FeatureRegistry,
    pub(crate) max_req: usize,
}

// ── CommandRequest ───────────────────────────────────────────────

/// A borrowed view of one Command request message.
///
/// Layout: `[0xF2, FeatureID, CommandID, args...]`. The dispatcher
/// guarantees at least the three header bytes.
pub struct CommandRequest<'m> {
    bytes: &'m [u8],
}

impl<'m> CommandRequest<'m> {
    pub(crate) fn new(bytes: &'m [u8]) -> Self {
        debug_assert!(bytes.len() >= 3);
        Self { bytes }
    }

    /// The full request message including its header.
    pub fn message(&self) -> &'m [u8] {
        self.bytes
    }

    pub fn feature_id(&self) -> u8 {
        self.bytes[1]
    }

    pub fn command_id(&self) -> u8 {
        self.bytes[2]
    }

    /// The argument bytes following the three header bytes.
    pub fn args(&self) -> &'m [u8] {
        &self.bytes[3..]
    }
}

// ── CommandCtx ───────────────────────────────────────────────────

/// The context of one in-flight command request.
pub struct CommandCtx<'a, 'c> {
    pub(crate) ctx: &'a mut Ctx<'c>,
    feature_id: u8,
    command_id: u8,
}

impl<'a, 'c> CommandCtx<'a, 'c> {
    pub(crate) fn new(ctx: &'a mut Ctx<'c>, feature_id: u8, command_id: u8) -> Self {
        Self {
            ctx,
            feature_id,
            command_id,
        }
    }

    /// FeatureID echoed into the reply header.
    pub fn feature_id(&self) -> u8 {
        self.feature_id
    }

    /// CommandID echoed into the reply header.
    pub fn command_id(&self) -> u8 {
        self.command_id
    }

    /// Look up a registered feature, e.g. to inspect its state.
    pub fn feature(&self, id: u8) -> Option<&Feature> {
        self.ctx.registry.feature(id)
    }

    // ── Replies ──────────────────────────────────────────────────

    /// The fully general reply: exception ID plus payload in two
    /// chunks.
    pub fn reply_from_pieces(
        &mut self,
        exc_id: u8,
        prefix: &[u8],
        suffix: &[u8],
    ) -> Result<(), HdcError> {
        self.ctx.tx.compose_structured(
            MessageType::Command,
            self.feature_id,
            self.command_id,
            Some(exc_id),
            prefix,
            suffix,
        )
    }

    /// Success reply without return values.
    pub fn reply_void(&mut self) -> Result<(), HdcError> {
        self.reply_from_pieces(exc_id::NO_ERROR, &[], &[])
    }

    /// Failure reply carrying only the exception ID.
    pub fn reply_error(&mut self, exc_id: u8) -> Result<(), HdcError> {
        self.reply_from_pieces(exc_id, &[], &[])
    }

    /// Failure reply with a human-readable description. A description
    /// is only legal alongside an actual error.
    pub fn reply_error_with_description(
        &mut self,
        exc_id: u8,
        description: &str,
    ) -> Result<(), HdcError> {
        debug_assert!(exc_id != exc_id::NO_ERROR || description.is_empty());
        self.reply_from_pieces(exc_id, description.as_bytes(), &[])
    }

    pub fn reply_blob(&mut self, value: &[u8]) -> Result<(), HdcError> {
        self.reply_from_pieces(exc_id::NO_ERROR, value, &[])
    }

    pub fn reply_bool(&mut self, value: bool) -> Result<(), HdcError> {
        self.reply_blob(&[u8::from(value)])
    }

    pub fn reply_u8(&mut self, value: u8) -> Result<(), HdcError> {
        self.reply_blob(&[value])
    }

    pub fn reply_u16(&mut self, value: u16) -> Result<(), HdcError> {
        self.reply_blob(&value.to_le_bytes())
    }

    pub fn reply_u32(&mut self, value: u32) -> Result<(), HdcError> {
        self.reply_blob(&value.to_le_bytes())
    }

    pub fn reply_i8(&mut self, value: i8) -> Result<(), HdcError> {
        self.reply_blob(&value.to_le_bytes())
    }

    pub fn reply_i16(&mut self, value: i16) -> Result<(), HdcError> {
        self.reply_blob(&value.to_le_bytes())
    }

    pub fn reply_i32(&mut self, value: i32) -> Result<(), HdcError> {
        self.reply_blob(&value.to_le_bytes())
    }

    pub fn reply_f32(&mut self, value: f32) -> Result<(), HdcError> {
        self.reply_blob(&value.to_le_bytes())
    }

    pub fn reply_f64(&mut self, value: f64) -> Result<(), HdcError> {
        self.reply_blob(&value.to_le_bytes())
    }

    /// Strings travel without their trailing NUL; the message size
    /// delimits them.
    pub fn reply_string(&mut self, value: &str) -> Result<(), HdcError> {
        self.reply_blob(value.as_bytes())
    }

    pub fn reply_dtype(&mut self, value: DType) -> Result<(), HdcError> {
        self.reply_blob(&[value.code()])
    }

    /// Reply with any typed value in its wire representation.
    pub fn reply_value(&mut self, value: &Value) -> Result<(), HdcError> {
        self.reply_blob(&value.wire_bytes())
    }

    // ── Events ───────────────────────────────────────────────────

    /// Raise an event. `feature = None` targets the Core feature.
    /// Events composed before the reply precede it on the wire.
    pub fn emit_event(
        &mut self,
        feature: Option<u8>,
        event_id: u8,
        prefix: &[u8],
        suffix: &[u8],
    ) -> Result<(), HdcError> {
        event::emit_event(self.ctx, feature, event_id, prefix, suffix)
    }

    /// Raise a Log event, subject to the feature's log threshold.
    pub fn emit_log(
        &mut self,
        feature: Option<u8>,
        level: LogLevel,
        text: &str,
    ) -> Result<(), HdcError> {
        event::emit_log(self.ctx, feature, level, text)
    }

    /// Transition a feature's state machine, raising the
    /// FeatureStateTransition event on change.
    pub fn feature_state_transition(
        &mut self,
        feature: Option<u8>,
        new_state: u8,
    ) -> Result<(), HdcError> {
        event::state_transition(self.ctx, feature, new_state)
    }

    /// Push pending TX out and wait (bounded) for the link to drain.
    /// Handlers that reboot or halt the device call this before doing
    /// so.
    pub fn flush(&mut self) -> Result<(), HdcError> {
        self.ctx.tx.flush()
    }
}

// ── RouterCtx ────────────────────────────────────────────────────

/// Context handed to a custom message router for message types below
/// the protocol-reserved range.
pub struct RouterCtx<'a, 'c> {
    pub(crate) ctx: &'a mut Ctx<'c>,
}

impl RouterCtx<'_, '_> {
    /// Send one raw message (the router owns its payload layout).
    pub fn send_message(&mut self, payload: &[u8]) -> Result<(), HdcError> {
        self.ctx.tx.append_buffer(payload)
    }

    pub fn feature(&self, id: u8) -> Option<&Feature> {
        self.ctx.registry.feature(id)
    }

    pub fn emit_event(
        &mut self,
        feature: Option<u8>,
        event_id: u8,
        prefix: &[u8],
        suffix: &[u8],
    ) -> Result<(), HdcError> {
        event::emit_event(self.ctx, feature, event_id, prefix, suffix)
    }

    pub fn emit_log(
        &mut self,
        feature: Option<u8>,
        level: LogLevel,
        text: &str,
    ) -> Result<(), HdcError> {
        event::emit_log(self.ctx, feature, level, text)
    }

    pub fn feature_state_transition(
        &mut self,
        feature: Option<u8>,
        new_state: u8,
    ) -> Result<(), HdcError> {
        event::state_transition(self.ctx, feature, new_state)
    }
}

/// A user-supplied fallback router for message types `< 0xF0`.
/// Returns `Ok(true)` when the message was consumed.
pub type MessageRouter = Box<dyn FnMut(&mut RouterCtx<'_, '_>, &[u8]) -> Result<bool, HdcError>>;
