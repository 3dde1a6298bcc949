//! The dispatch engine: routing one inbound request message.
//!
//! ```text
//! 0xF0 Meta ──► meta replies          0xF2 Command ──► handler lookup
//! 0xF1 Echo ──► verbatim echo         0xF3/other  ──► custom router, else logged
//! ```
//!
//! Every Command request ends in exactly one Command reply whose
//! feature and command IDs echo the request — lookup misses reply with
//! the matching protocol exception instead of staying silent.

use crate::ctx::{CommandCtx, CommandRequest, Ctx, MessageRouter, RouterCtx};
use crate::descriptor::HandlerKind;
use crate::error::HdcError;
use crate::event::{self, LogLevel};
use crate::message::{FIRST_RESERVED_ID, MessageType, exc_id};
use crate::{meta, property};

/// Route one request message. An empty message is legal but currently
/// without purpose and is dropped without a reply.
pub(crate) fn process_message(
    ctx: &mut Ctx<'_>,
    router: &mut Option<MessageRouter>,
    msg: &[u8],
) -> Result<(), HdcError> {
    let Some(&first) = msg.first() else {
        return Ok(());
    };

    match MessageType::from_byte(first) {
        Some(MessageType::Meta) => return meta::process(ctx, msg),
        Some(MessageType::Echo) => {
            // The reply is the entire request payload, verbatim.
            return ctx.tx.append_buffer(msg);
        }
        Some(MessageType::Command) => {
            if msg.len() < 3 {
                return event::emit_log(ctx, None, LogLevel::Error, "Malformed command request");
            }
            return process_command(ctx, msg);
        }
        Some(MessageType::Event) | None => {}
    }

    if first < FIRST_RESERVED_ID {
        if let Some(router) = router {
            let mut router_ctx = RouterCtx { ctx };
            if router(&mut router_ctx, msg)? {
                return Ok(());
            }
        }
    }

    tracing::debug!(message_type = first, "unroutable message");
    event::emit_log(ctx, None, LogLevel::Error, "Unknown message type")
}

fn process_command(ctx: &mut Ctx<'_>, msg: &[u8]) -> Result<(), HdcError> {
    let feature_id = msg[1];
    let command_id = msg[2];

    enum Lookup {
        NoFeature,
        NoCommand,
        Handler(HandlerKind),
    }

    let lookup = match ctx.registry.feature(feature_id) {
        None => Lookup::NoFeature,
        Some(feature) => match ctx.registry.command(feature, command_id) {
            None => Lookup::NoCommand,
            Some(command) => Lookup::Handler(command.handler.clone()),
        },
    };

    match lookup {
        Lookup::NoFeature => {
            CommandCtx::new(ctx, feature_id, command_id).reply_error(exc_id::UNKNOWN_FEATURE)
        }
        Lookup::NoCommand => {
            CommandCtx::new(ctx, feature_id, command_id).reply_error(exc_id::UNKNOWN_COMMAND)
        }
        Lookup::Handler(HandlerKind::GetPropertyValue) => property::get(ctx, msg),
        Lookup::Handler(HandlerKind::SetPropertyValue) => property::set(ctx, msg),
        Lookup::Handler(HandlerKind::User(handler)) => {
            let request = CommandRequest::new(msg);
            let mut command_ctx = CommandCtx::new(ctx, feature_id, command_id);
            handler(&mut command_ctx, &request)
        }
    }
}
