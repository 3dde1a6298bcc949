//! Wire-level message identifiers.
//!
//! IDs `0xF0` and above are reserved for the protocol; user-defined
//! features, commands, properties and events must stay below that range.

/// First ID value reserved for the protocol.
pub const FIRST_RESERVED_ID: u8 = 0xF0;

/// The mandatory Core feature ID.
pub const CORE_FEATURE_ID: u8 = 0x00;

/// The conventional "error" state every feature may enter, declared or not.
pub const ERROR_STATE_ID: u8 = 0xFF;

// ── Message types ────────────────────────────────────────────────

/// First byte of every HDC message.
#[repr(u8)]
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum MessageType {
    Meta = 0xF0,
    Echo = 0xF1,
    Command = 0xF2,
    Event = 0xF3,
}

impl MessageType {
    pub fn from_byte(value: u8) -> Option<Self> {
        Some(match value {
            0xF0 => Self::Meta,
            0xF1 => Self::Echo,
            0xF2 => Self::Command,
            0xF3 => Self::Event,
            _ => return None,
        })
    }
}

// ── Meta operations ──────────────────────────────────────────────

/// Second byte of a Meta message.
#[repr(u8)]
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum MetaId {
    HdcVersion = 0xF0,
    MaxReq = 0xF1,
    IdlJson = 0xF2,
}

impl MetaId {
    pub fn from_byte(value: u8) -> Option<Self> {
        Some(match value {
            0xF0 => Self::HdcVersion,
            0xF1 => Self::MaxReq,
            0xF2 => Self::IdlJson,
            _ => return None,
        })
    }
}

// ── Mandatory descriptor IDs ─────────────────────────────────────

/// `GetPropertyValue` — available on every feature.
pub const CMD_GET_PROPERTY_VALUE: u8 = 0xF0;
/// `SetPropertyValue` — available on every feature.
pub const CMD_SET_PROPERTY_VALUE: u8 = 0xF1;

/// The `Log` event — available on every feature.
pub const EVT_LOG: u8 = 0xF0;
/// The `FeatureStateTransition` event — available on every feature.
pub const EVT_FEATURE_STATE_TRANSITION: u8 = 0xF1;

/// The `LogEventThreshold` property — available on every feature.
pub const PROP_LOG_EVENT_THRESHOLD: u8 = 0xF0;
/// The `FeatureState` property — available on every feature.
pub const PROP_FEATURE_STATE: u8 = 0xF1;

// ── Predefined exception IDs ─────────────────────────────────────

/// Exception IDs carried in Command replies. `0x00` means *no error*.
pub mod exc_id {
    pub const NO_ERROR: u8 = 0x00;
    pub const COMMAND_FAILED: u8 = 0xF0;
    pub const UNKNOWN_FEATURE: u8 = 0xF1;
    pub const UNKNOWN_COMMAND: u8 = 0xF2;
    pub const INVALID_ARGS: u8 = 0xF3;
    pub const NOT_NOW: u8 = 0xF4;
    pub const UNKNOWN_PROPERTY: u8 = 0xF5;
    pub const READ_ONLY_PROPERTY: u8 = 0xF6;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_roundtrip() {
        for mt in [
            MessageType::Meta,
            MessageType::Echo,
            MessageType::Command,
            MessageType::Event,
        ] {
            assert_eq!(MessageType::from_byte(mt as u8), Some(mt));
        }
        assert_eq!(MessageType::from_byte(0x42), None);
    }

    #[test]
    fn meta_id_roundtrip() {
        for id in [MetaId::HdcVersion, MetaId::MaxReq, MetaId::IdlJson] {
            assert_eq!(MetaId::from_byte(id as u8), Some(id));
        }
        assert_eq!(MetaId::from_byte(0xF3), None);
    }
}
