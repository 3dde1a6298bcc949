//! Domain-specific error types for the HDC device runtime.
//!
//! All fallible operations return `Result<T, HdcError>`.
//! No panics on invalid input — every error is typed and recoverable.
//! Note that protocol-level *exceptions* (`UnknownFeature`, `InvalidArgs`,
//! ...) are not errors in this sense: they are carried inside Command
//! replies on the wire and never surface as `Err` values.

use thiserror::Error;

/// The canonical error type of the HDC device runtime.
#[derive(Debug, Error)]
pub enum HdcError {
    // ── Link Errors ──────────────────────────────────────────────
    /// The underlying link adapter reported a failure.
    #[error("link failure: {0}")]
    Link(#[from] LinkError),

    // ── Descriptor Errors ────────────────────────────────────────
    /// A registered descriptor violates the data model.
    #[error("descriptor validation: {0}")]
    Descriptor(#[from] DescriptorError),

    // ── Composition Errors ───────────────────────────────────────
    /// Message composition was sequenced incorrectly
    /// (`begin`/`append`/`end` misuse).
    #[error("message composition: {0}")]
    Compose(&'static str),

    // ── API misuse ───────────────────────────────────────────────
    /// A feature ID passed to a public API is not registered.
    #[error("unknown feature id {0:#04x}")]
    UnknownFeature(u8),

    /// A state ID was rejected because the feature declares its states
    /// and the ID is neither declared nor the error state `0xFF`.
    #[error("state {state:#04x} is not declared by feature {feature:#04x}")]
    UndeclaredState { feature: u8, state: u8 },

    // ── Marshaling Errors ────────────────────────────────────────
    /// A raw byte sequence could not be decoded as the expected dtype.
    #[error("value marshaling: {0}")]
    Marshal(&'static str),
}

// ── LinkError ─────────────────────────────────────────────────────

/// Failures reported by a [`Link`](crate::link::Link) implementation.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The link's transport failed (socket closed, port gone, ...).
    #[error("link I/O: {0}")]
    Io(#[from] std::io::Error),

    /// A link operation was invoked before the completion port was
    /// attached.
    #[error("link not attached to a completion port")]
    Detached,

    /// The peer side of the link is gone.
    #[error("link closed by peer")]
    Closed,
}

// ── DescriptorError ───────────────────────────────────────────────

/// Rejections produced while validating the descriptor tables at
/// registration time.
///
/// The original driver deferred these to a fatal runtime error handler;
/// validating up front turns every descriptor bug into an `Err` from
/// [`Device::new`](crate::device::Device::new).
#[derive(Debug, Error)]
pub enum DescriptorError {
    /// Two features share the same ID.
    #[error("duplicate feature id {0:#04x}")]
    DuplicateFeature(u8),

    /// No feature with the mandatory Core ID `0x00` was registered.
    #[error("no Core feature (id 0x00) registered")]
    MissingCoreFeature,

    /// Two commands of one feature share the same ID.
    #[error("feature {feature:#04x}: duplicate command id {id:#04x}")]
    DuplicateCommand { feature: u8, id: u8 },

    /// Two events of one feature share the same ID.
    #[error("feature {feature:#04x}: duplicate event id {id:#04x}")]
    DuplicateEvent { feature: u8, id: u8 },

    /// Two properties of one feature share the same ID.
    #[error("feature {feature:#04x}: duplicate property id {id:#04x}")]
    DuplicateProperty { feature: u8, id: u8 },

    /// A user descriptor claims an ID in the protocol-reserved range.
    #[error("{kind} id {id:#04x} is reserved for the protocol (>= 0xF0)")]
    ReservedId { kind: &'static str, id: u8 },

    /// A descriptor carries an empty name.
    #[error("feature {feature:#04x}: empty {kind} name")]
    EmptyName { feature: u8, kind: &'static str },

    /// A command or event declares more than four arguments or returns.
    #[error("feature {feature:#04x}, id {id:#04x}: more than four {kind}")]
    TooManyArgs {
        feature: u8,
        id: u8,
        kind: &'static str,
    },

    /// A property has neither a getter nor backing storage.
    #[error("feature {feature:#04x}: property {id:#04x} is not readable")]
    UnreadableProperty { feature: u8, id: u8 },

    /// A writable property has neither a setter nor backing storage.
    #[error("feature {feature:#04x}: writable property {id:#04x} has no setter and no storage")]
    UnwritableProperty { feature: u8, id: u8 },

    /// A property supplies both a getter and backing storage, making the
    /// read path ambiguous.
    #[error("feature {feature:#04x}: property {id:#04x} has both a getter and storage")]
    AmbiguousRead { feature: u8, id: u8 },

    /// A variable-size property (`BLOB`, `UTF8`) omitted its size.
    #[error("feature {feature:#04x}: property {id:#04x} needs a declared size")]
    MissingDeclaredSize { feature: u8, id: u8 },

    /// Backing storage length does not match the property's dtype.
    #[error(
        "feature {feature:#04x}: property {id:#04x} storage is {actual} bytes, expected {expected}"
    )]
    StorageSizeMismatch {
        feature: u8,
        id: u8,
        expected: usize,
        actual: usize,
    },
}
