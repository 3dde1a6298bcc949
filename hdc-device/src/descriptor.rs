//! Descriptor records: the introspectable shape of a device.
//!
//! A device is a set of [`Feature`]s, each carrying commands,
//! properties, events and a state machine. Descriptors are registered
//! once at construction and stay immutable afterwards, except for each
//! feature's current state and log threshold.

use std::fmt;
use std::sync::{Arc, Mutex};

use crate::ctx::{CommandCtx, CommandRequest};
use crate::dtype::{DType, Value};
use crate::error::HdcError;
use crate::event::LogLevel;
use crate::message::exc_id;

// ── Handler types ────────────────────────────────────────────────

/// A user command handler. Contract: produce exactly one Command reply
/// through the context before returning.
pub type CommandHandler =
    Arc<dyn Fn(&mut CommandCtx<'_, '_>, &CommandRequest<'_>) -> Result<(), HdcError>>;

/// A property getter: produces the current value. Mandatory properties
/// read the feature's own runtime fields; application properties
/// typically capture their own state.
pub type PropertyGetter = Arc<dyn Fn(&Feature) -> Value>;

/// A property setter: stores a new, size-validated value. The stored
/// value may differ from the requested one (clamping, rounding); the
/// reply reports whatever the read path sees afterwards.
pub type PropertySetter = Arc<dyn Fn(&mut Feature, Value)>;

/// How a command request is serviced.
pub(crate) enum HandlerKind {
    User(CommandHandler),
    GetPropertyValue,
    SetPropertyValue,
}

impl Clone for HandlerKind {
    fn clone(&self) -> Self {
        match self {
            Self::User(handler) => Self::User(Arc::clone(handler)),
            Self::GetPropertyValue => Self::GetPropertyValue,
            Self::SetPropertyValue => Self::SetPropertyValue,
        }
    }
}

// ── Arguments and returns ────────────────────────────────────────

/// One typed argument or return value of a command or event.
#[derive(Debug, Clone)]
pub struct ArgSpec {
    pub dtype: DType,
    pub name: Option<String>,
    pub doc: Option<String>,
}

impl ArgSpec {
    pub fn new(dtype: DType) -> Self {
        Self {
            dtype,
            name: None,
            doc: None,
        }
    }

    pub fn named(dtype: DType, name: impl Into<String>) -> Self {
        Self {
            dtype,
            name: Some(name.into()),
            doc: None,
        }
    }

    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }
}

// ── Exceptions ───────────────────────────────────────────────────

/// A protocol exception a command may raise.
#[derive(Debug, Clone)]
pub struct Exception {
    pub id: u8,
    pub name: String,
    pub doc: Option<String>,
}

impl Exception {
    pub fn new(id: u8, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            doc: None,
        }
    }

    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    // Predefined exceptions of the protocol.

    pub fn command_failed() -> Self {
        Self::new(exc_id::COMMAND_FAILED, "CommandFailed")
    }

    pub fn unknown_feature() -> Self {
        Self::new(exc_id::UNKNOWN_FEATURE, "UnknownFeature")
    }

    pub fn unknown_command() -> Self {
        Self::new(exc_id::UNKNOWN_COMMAND, "UnknownCommand")
    }

    pub fn invalid_args() -> Self {
        Self::new(exc_id::INVALID_ARGS, "InvalidArgs")
    }

    pub fn not_now() -> Self {
        Self::new(exc_id::NOT_NOW, "NotNow")
            .with_doc("Command can't be executed at this moment.")
    }

    pub fn unknown_property() -> Self {
        Self::new(exc_id::UNKNOWN_PROPERTY, "UnknownProperty")
    }

    pub fn read_only_property() -> Self {
        Self::new(exc_id::READ_ONLY_PROPERTY, "ReadOnlyProperty")
    }
}

// ── Commands ─────────────────────────────────────────────────────

/// A synchronous request/reply RPC on a feature.
pub struct Command {
    pub id: u8,
    pub name: String,
    pub doc: Option<String>,
    pub args: Vec<ArgSpec>,
    pub returns: Vec<ArgSpec>,
    pub raises: Vec<Exception>,
    pub(crate) handler: HandlerKind,
}

impl Command {
    pub fn new(
        id: u8,
        name: impl Into<String>,
        handler: impl Fn(&mut CommandCtx<'_, '_>, &CommandRequest<'_>) -> Result<(), HdcError>
        + 'static,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            doc: None,
            args: Vec::new(),
            returns: Vec::new(),
            raises: Vec::new(),
            handler: HandlerKind::User(Arc::new(handler)),
        }
    }

    pub(crate) fn mandatory(id: u8, name: &str, handler: HandlerKind) -> Self {
        Self {
            id,
            name: name.to_owned(),
            doc: None,
            args: Vec::new(),
            returns: Vec::new(),
            raises: Vec::new(),
            handler,
        }
    }

    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    pub fn arg(mut self, arg: ArgSpec) -> Self {
        self.args.push(arg);
        self
    }

    pub fn ret(mut self, ret: ArgSpec) -> Self {
        self.returns.push(ret);
        self
    }

    pub fn raises(mut self, exception: Exception) -> Self {
        self.raises.push(exception);
        self
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

// ── Events ───────────────────────────────────────────────────────

/// An asynchronous device-to-host message attached to a feature.
#[derive(Debug, Clone)]
pub struct Event {
    pub id: u8,
    pub name: String,
    pub doc: Option<String>,
    pub args: Vec<ArgSpec>,
}

impl Event {
    pub fn new(id: u8, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            doc: None,
            args: Vec::new(),
        }
    }

    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    pub fn arg(mut self, arg: ArgSpec) -> Self {
        self.args.push(arg);
        self
    }
}

// ── States ───────────────────────────────────────────────────────

/// One declared state of a feature's state machine.
#[derive(Debug, Clone)]
pub struct State {
    pub id: u8,
    pub name: String,
    pub doc: Option<String>,
}

impl State {
    pub fn new(id: u8, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            doc: None,
        }
    }

    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }
}

// ── Property storage ─────────────────────────────────────────────

/// Fixed-length backing storage shared between the runtime and the
/// application.
///
/// The length is set at construction and never changes; [`store`]
/// overwrites a prefix and leaves the tail intact, mirroring writes
/// into a static buffer.
///
/// [`store`]: Self::store
pub struct PropertyCell {
    bytes: Mutex<Vec<u8>>,
}

impl PropertyCell {
    pub fn new(initial: impl Into<Vec<u8>>) -> Arc<Self> {
        Arc::new(Self {
            bytes: Mutex::new(initial.into()),
        })
    }

    pub fn zeroed(len: usize) -> Arc<Self> {
        Self::new(vec![0u8; len])
    }

    /// Snapshot the full cell contents.
    pub fn load(&self) -> Vec<u8> {
        self.bytes.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Overwrite the leading bytes of the cell. Data beyond the cell
    /// length is ignored.
    pub fn store(&self, data: &[u8]) {
        let mut bytes = self.bytes.lock().unwrap_or_else(|e| e.into_inner());
        let n = data.len().min(bytes.len());
        bytes[..n].copy_from_slice(&data[..n]);
    }

    pub(crate) fn len(&self) -> usize {
        self.bytes.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl fmt::Debug for PropertyCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyCell")
            .field("len", &self.len())
            .finish()
    }
}

// ── Properties ───────────────────────────────────────────────────

/// A typed, addressable datum on a feature.
///
/// Reads go through the getter or the backing cell (exactly one of
/// them must be present); writes go through the setter if there is
/// one, otherwise into the cell.
pub struct Property {
    pub id: u8,
    pub name: String,
    pub dtype: DType,
    pub readonly: bool,
    /// Required for `BLOB` and `UTF8`; ignored for fixed-size dtypes.
    pub declared_size: u16,
    pub doc: Option<String>,
    pub(crate) getter: Option<PropertyGetter>,
    pub(crate) setter: Option<PropertySetter>,
    pub(crate) cell: Option<Arc<PropertyCell>>,
}

impl Property {
    pub fn new(id: u8, name: impl Into<String>, dtype: DType) -> Self {
        Self {
            id,
            name: name.into(),
            dtype,
            readonly: false,
            declared_size: 0,
            doc: None,
            getter: None,
            setter: None,
            cell: None,
        }
    }

    pub fn read_only(mut self) -> Self {
        self.readonly = true;
        self
    }

    pub fn with_getter(mut self, getter: impl Fn(&Feature) -> Value + 'static) -> Self {
        self.getter = Some(Arc::new(getter));
        self
    }

    pub fn with_setter(mut self, setter: impl Fn(&mut Feature, Value) + 'static) -> Self {
        self.setter = Some(Arc::new(setter));
        self
    }

    pub fn backed_by(mut self, cell: Arc<PropertyCell>) -> Self {
        self.cell = Some(cell);
        self
    }

    pub fn with_size(mut self, declared_size: u16) -> Self {
        self.declared_size = declared_size;
        self
    }

    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }
}

impl fmt::Debug for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("dtype", &self.dtype)
            .field("readonly", &self.readonly)
            .finish()
    }
}

// ── Features ─────────────────────────────────────────────────────

/// A named, addressable unit exposing commands, properties, events and
/// a state machine. Exactly one registered feature must carry the Core
/// ID `0x00`.
pub struct Feature {
    pub id: u8,
    pub name: String,
    pub class_name: String,
    pub class_version: String,
    pub doc: Option<String>,
    pub states: Vec<State>,
    pub commands: Vec<Command>,
    pub events: Vec<Event>,
    pub properties: Vec<Property>,
    pub(crate) log_threshold: u8,
    pub(crate) state: u8,
}

impl Feature {
    pub fn new(
        id: u8,
        name: impl Into<String>,
        class_name: impl Into<String>,
        class_version: impl Into<String>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            class_name: class_name.into(),
            class_version: class_version.into(),
            doc: None,
            states: Vec::new(),
            commands: Vec::new(),
            events: Vec::new(),
            properties: Vec::new(),
            log_threshold: LogLevel::Info as u8,
            state: 0x00,
        }
    }

    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    pub fn with_state(mut self, state: State) -> Self {
        self.states.push(state);
        self
    }

    pub fn with_command(mut self, command: Command) -> Self {
        self.commands.push(command);
        self
    }

    pub fn with_event(mut self, event: Event) -> Self {
        self.events.push(event);
        self
    }

    pub fn with_property(mut self, property: Property) -> Self {
        self.properties.push(property);
        self
    }

    pub fn with_initial_state(mut self, state: u8) -> Self {
        self.state = state;
        self
    }

    pub fn with_log_threshold(mut self, level: LogLevel) -> Self {
        self.log_threshold = level as u8;
        self
    }

    /// The feature's current state ID.
    pub fn state(&self) -> u8 {
        self.state
    }

    /// Log events below this level are suppressed.
    pub fn log_threshold(&self) -> u8 {
        self.log_threshold
    }
}

impl fmt::Debug for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Feature")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state)
            .field("commands", &self.commands.len())
            .field("properties", &self.properties.len())
            .field("events", &self.events.len())
            .finish()
    }
}

// ── Tests ────────────────────────────────────────────────────────
