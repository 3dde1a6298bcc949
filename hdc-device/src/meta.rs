//! Meta replies: protocol version, request-size limit, and the
//! streamed IDL JSON self-description.
//!
//! A Meta request carrying unexpected trailing bytes is answered by an
//! echo of the exact request payload; hosts read that as "unsupported
//! Meta operation". An error Log event precedes the echo so the
//! condition is visible on the host side.

use crate::ctx::Ctx;
use crate::error::HdcError;
use crate::event::{self, LogLevel};
use crate::idl;
use crate::message::{MessageType, MetaId};

/// The protocol version string reported to hosts.
pub const HDC_VERSION: &str = "HDC 1.0.0-alpha.12";

pub(crate) fn process(ctx: &mut Ctx<'_>, msg: &[u8]) -> Result<(), HdcError> {
    match msg.get(1).copied().and_then(MetaId::from_byte) {
        Some(MetaId::HdcVersion) => hdc_version(ctx, msg),
        Some(MetaId::MaxReq) => max_req(ctx, msg),
        Some(MetaId::IdlJson) => idl_json(ctx, msg),
        None => {
            event::emit_log(ctx, None, LogLevel::Error, "Unknown Meta request")?;
            ctx.tx.append_buffer(msg)
        }
    }
}

/// Echo a recognized Meta request that carries unexpected trailing
/// bytes, after logging which operation was refused.
fn echo_unexpected(ctx: &mut Ctx<'_>, msg: &[u8], diagnostic: &str) -> Result<(), HdcError> {
    event::emit_log(ctx, None, LogLevel::Error, diagnostic)?;
    ctx.tx.append_buffer(msg)
}

fn hdc_version(ctx: &mut Ctx<'_>, msg: &[u8]) -> Result<(), HdcError> {
    if msg.len() > 2 {
        return echo_unexpected(ctx, msg, "Unknown Meta-HdcVersion request");
    }
    let mut reply = vec![MessageType::Meta as u8, MetaId::HdcVersion as u8];
    reply.extend_from_slice(HDC_VERSION.as_bytes());
    ctx.tx.append_buffer(&reply)
}

fn max_req(ctx: &mut Ctx<'_>, msg: &[u8]) -> Result<(), HdcError> {
    if msg.len() > 2 {
        return echo_unexpected(ctx, msg, "Unknown Meta-MaxReq request");
    }
    let mut reply = vec![MessageType::Meta as u8, MetaId::MaxReq as u8];
    reply.extend_from_slice(&(ctx.max_req as u32).to_le_bytes());
    ctx.tx.append_buffer(&reply)
}

fn idl_json(ctx: &mut Ctx<'_>, msg: &[u8]) -> Result<(), HdcError> {
    if msg.len() > 2 {
        return echo_unexpected(ctx, msg, "Unknown Meta-IdlJson request");
    }

    // The document streams straight into the composer; there is no
    // intermediate JSON buffer.
    let max_req = ctx.max_req;
    let tx = &mut ctx.tx;
    let registry = &*ctx.registry;

    tx.begin_message()?;
    tx.append(&[MessageType::Meta as u8, MetaId::IdlJson as u8])?;
    idl::device_json(tx, registry, max_req)?;
    tx.end_message()
}
