//! The event engine: raising events, wire-level logging, and feature
//! state transitions.

use crate::ctx::Ctx;
use crate::error::HdcError;
use crate::message::{
    CORE_FEATURE_ID, ERROR_STATE_ID, EVT_FEATURE_STATE_TRANSITION, EVT_LOG, MessageType,
};

// ── LogLevel ─────────────────────────────────────────────────────

/// Log severities of the wire `Log` event, numerically identical to
/// Python's `logging` levels so hosts can feed them straight through.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug = 10,
    Info = 20,
    Warning = 30,
    Error = 40,
    Critical = 50,
}

impl LogLevel {
    /// Clamp a raw threshold into `[DEBUG, CRITICAL]` and round to the
    /// nearest multiple of ten. Custom in-between levels are
    /// disallowed, for the same reasons Python's logging documentation
    /// gives.
    pub fn quantize(raw: u8) -> u8 {
        let clamped = raw.clamp(Self::Debug as u8, Self::Critical as u8);
        ((clamped + 5) / 10) * 10
    }
}

// ── Event raising ────────────────────────────────────────────────

/// Compose an Event message `[0xF3, feature, event, prefix, suffix]`.
/// `feature = None` targets the Core feature.
pub(crate) fn emit_event(
    ctx: &mut Ctx<'_>,
    feature: Option<u8>,
    event_id: u8,
    prefix: &[u8],
    suffix: &[u8],
) -> Result<(), HdcError> {
    let feature_id = match feature {
        Some(id) => ctx
            .registry
            .feature(id)
            .map(|f| f.id)
            .ok_or(HdcError::UnknownFeature(id))?,
        None => ctx.registry.core().id,
    };
    ctx.tx.compose_structured(
        MessageType::Event,
        feature_id,
        event_id,
        None,
        prefix,
        suffix,
    )
}

/// Compose a Log event `[level, utf8 text]`, unless the feature's
/// threshold suppresses it.
pub(crate) fn emit_log(
    ctx: &mut Ctx<'_>,
    feature: Option<u8>,
    level: LogLevel,
    text: &str,
) -> Result<(), HdcError> {
    let target = match feature {
        Some(id) => ctx
            .registry
            .feature(id)
            .ok_or(HdcError::UnknownFeature(id))?,
        None => ctx.registry.core(),
    };
    if (level as u8) < target.log_threshold {
        return Ok(());
    }
    let feature_id = target.id;
    ctx.tx.compose_structured(
        MessageType::Event,
        feature_id,
        EVT_LOG,
        None,
        &[level as u8],
        text.as_bytes(),
    )
}

/// Update a feature's state and notify the host.
///
/// Transitioning into the current state is a no-op. When the feature
/// declares states, only declared IDs and the error state `0xFF` are
/// accepted; an undeclared target leaves the state untouched and
/// returns a typed error. The state field is updated before the event
/// is composed, so a host reading `FeatureState` after the event will
/// always observe the new state.
pub(crate) fn state_transition(
    ctx: &mut Ctx<'_>,
    feature: Option<u8>,
    new_state: u8,
) -> Result<(), HdcError> {
    let id = feature.unwrap_or(CORE_FEATURE_ID);
    let target = ctx
        .registry
        .feature_mut(id)
        .ok_or(HdcError::UnknownFeature(id))?;

    if new_state == target.state {
        return Ok(());
    }
    if !target.states.is_empty()
        && new_state != ERROR_STATE_ID
        && !target.states.iter().any(|s| s.id == new_state)
    {
        return Err(HdcError::UndeclaredState {
            feature: target.id,
            state: new_state,
        });
    }

    let previous = target.state;
    target.state = new_state;
    let feature_id = target.id;
    tracing::debug!(feature = feature_id, previous, new_state, "state transition");

    ctx.tx.compose_structured(
        MessageType::Event,
        feature_id,
        EVT_FEATURE_STATE_TRANSITION,
        None,
        &[previous],
        &[new_state],
    )
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantize_clamps_and_rounds() {
        assert_eq!(LogLevel::quantize(0), 10);
        assert_eq!(LogLevel::quantize(10), 10);
        assert_eq!(LogLevel::quantize(14), 10);
        assert_eq!(LogLevel::quantize(15), 20);
        assert_eq!(LogLevel::quantize(23), 20);
        assert_eq!(LogLevel::quantize(39), 40);
        assert_eq!(LogLevel::quantize(50), 50);
        assert_eq!(LogLevel::quantize(200), 50);
    }

    #[test]
    fn levels_are_ordered() {
        assert!(LogLevel::Debug < LogLevel::Critical);
        assert!((LogLevel::Warning as u8) < (LogLevel::Error as u8));
    }
}
