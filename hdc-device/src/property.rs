//! The property engine behind the mandatory `GetPropertyValue` and
//! `SetPropertyValue` commands.
//!
//! Reads go through the property's getter or serialize straight out of
//! its backing cell; writes are size-validated against the dtype before
//! they reach a setter or the cell. A Set reply reports the value the
//! read path sees *afterwards*, which may differ from the requested one
//! when a setter clamps or rounds.

use std::sync::Arc;

use crate::ctx::Ctx;
use crate::descriptor::{PropertyCell, PropertyGetter, PropertySetter};
use crate::dtype::{DType, Value};
use crate::error::HdcError;
use crate::message::{MessageType, exc_id};

// ── Lookup ───────────────────────────────────────────────────────

/// What a property access needs, cloned out of the registry so the
/// borrow does not outlive the lookup.
struct PropSnapshot {
    readonly: bool,
    dtype: DType,
    declared_size: u16,
    getter: Option<PropertyGetter>,
    setter: Option<PropertySetter>,
    cell: Option<Arc<PropertyCell>>,
}

enum Lookup {
    NoFeature,
    NoProperty,
    Found(PropSnapshot),
}

fn lookup(ctx: &Ctx<'_>, feature_id: u8, property_id: u8) -> Lookup {
    let Some(feature) = ctx.registry.feature(feature_id) else {
        return Lookup::NoFeature;
    };
    let Some(property) = ctx.registry.property(feature, property_id) else {
        return Lookup::NoProperty;
    };
    Lookup::Found(PropSnapshot {
        readonly: property.readonly,
        dtype: property.dtype,
        declared_size: property.declared_size,
        getter: property.getter.clone(),
        setter: property.setter.clone(),
        cell: property.cell.clone(),
    })
}

// ── Replies ──────────────────────────────────────────────────────

fn reply_error(ctx: &mut Ctx<'_>, msg: &[u8], exc: u8) -> Result<(), HdcError> {
    ctx.tx
        .compose_structured(MessageType::Command, msg[1], msg[2], Some(exc), &[], &[])
}

fn reply_ok(ctx: &mut Ctx<'_>, msg: &[u8], payload: &[u8]) -> Result<(), HdcError> {
    ctx.tx.compose_structured(
        MessageType::Command,
        msg[1],
        msg[2],
        Some(exc_id::NO_ERROR),
        payload,
        &[],
    )
}

// ── GetPropertyValue ─────────────────────────────────────────────

/// Request layout: `[0xF2, FeatureID, 0xF0, PropertyID]`, exactly.
pub(crate) fn get(ctx: &mut Ctx<'_>, msg: &[u8]) -> Result<(), HdcError> {
    if msg.len() != 4 {
        return reply_error(ctx, msg, exc_id::INVALID_ARGS);
    }
    reply_current_value(ctx, msg)
}

/// The shared reply tail of Get and Set: serialize the current value.
fn reply_current_value(ctx: &mut Ctx<'_>, msg: &[u8]) -> Result<(), HdcError> {
    let feature_id = msg[1];
    let property_id = msg[3];

    let snapshot = match lookup(ctx, feature_id, property_id) {
        Lookup::NoFeature => return reply_error(ctx, msg, exc_id::UNKNOWN_FEATURE),
        Lookup::NoProperty => return reply_error(ctx, msg, exc_id::UNKNOWN_PROPERTY),
        Lookup::Found(snapshot) => snapshot,
    };

    let wire = if let Some(getter) = &snapshot.getter {
        let registry = &*ctx.registry;
        let Some(feature) = registry.feature(feature_id) else {
            return reply_error(ctx, msg, exc_id::UNKNOWN_FEATURE);
        };
        getter(feature).wire_bytes()
    } else if let Some(cell) = &snapshot.cell {
        cell_wire_bytes(snapshot.dtype, cell)
    } else {
        // Registration guarantees a read path; a property that lost it
        // can only reply as a failed command.
        return reply_error(ctx, msg, exc_id::COMMAND_FAILED);
    };

    reply_ok(ctx, msg, &wire)
}

/// Backing storage is already in wire order: fixed-size values are the
/// little-endian bytes themselves, `BLOB` is sent whole, `UTF8` up to
/// (excluding) any terminating NUL.
fn cell_wire_bytes(dtype: DType, cell: &PropertyCell) -> Vec<u8> {
    let mut bytes = cell.load();
    if dtype == DType::Utf8 {
        if let Some(nul) = bytes.iter().position(|b| *b == 0) {
            bytes.truncate(nul);
        }
    }
    bytes
}

// ── SetPropertyValue ─────────────────────────────────────────────

/// Request layout: `[0xF2, FeatureID, 0xF1, PropertyID, value...]`.
pub(crate) fn set(ctx: &mut Ctx<'_>, msg: &[u8]) -> Result<(), HdcError> {
    if msg.len() < 4 {
        return reply_error(ctx, msg, exc_id::INVALID_ARGS);
    }
    let feature_id = msg[1];
    let property_id = msg[3];
    let new_value = &msg[4..];

    let snapshot = match lookup(ctx, feature_id, property_id) {
        Lookup::NoFeature => return reply_error(ctx, msg, exc_id::UNKNOWN_FEATURE),
        Lookup::NoProperty => return reply_error(ctx, msg, exc_id::UNKNOWN_PROPERTY),
        Lookup::Found(snapshot) => snapshot,
    };
    if snapshot.readonly {
        return reply_error(ctx, msg, exc_id::READ_ONLY_PROPERTY);
    }

    // Size validation. Variable-size values must leave one byte of the
    // declared size free for the NUL delimiter used by UTF8 storage;
    // fixed-size values must match their dtype exactly.
    match snapshot.dtype.fixed_size() {
        None => {
            if new_value.len() >= snapshot.declared_size as usize {
                return reply_error(ctx, msg, exc_id::INVALID_ARGS);
            }
        }
        Some(expected) => {
            if new_value.len() != expected {
                return reply_error(ctx, msg, exc_id::INVALID_ARGS);
            }
        }
    }

    // Rejects BOOL bytes other than 0x00/0x01 and UTF8 payloads that
    // are not valid UTF-8.
    let value = match Value::from_wire(snapshot.dtype, new_value) {
        Ok(value) => value,
        Err(_) => return reply_error(ctx, msg, exc_id::INVALID_ARGS),
    };

    if let Some(setter) = &snapshot.setter {
        let setter = Arc::clone(setter);
        let Some(feature) = ctx.registry.feature_mut(feature_id) else {
            return reply_error(ctx, msg, exc_id::UNKNOWN_FEATURE);
        };
        setter(feature, value);
    } else if let Some(cell) = &snapshot.cell {
        if snapshot.dtype == DType::Utf8 {
            let mut stored = new_value.to_vec();
            stored.push(0);
            cell.store(&stored);
        } else {
            cell.store(new_value);
        }
    }

    // Same reply as a Get, so the host learns the value actually stored.
    reply_current_value(ctx, msg)
}
