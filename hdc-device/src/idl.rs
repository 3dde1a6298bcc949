//! Streaming IDL JSON emitter.
//!
//! The device self-description can outgrow any RAM budget worth
//! reserving, so it is written token by token into the composer. Comma
//! placement uses the classic "prepend a comma before every sibling
//! except the first" idiom, carried as a single boolean that flows
//! through the open/close helpers.
//!
//! Attribute values must not contain characters that need JSON
//! escaping; descriptors are authored, not user input.

use crate::compose::TxHalf;
use crate::descriptor::{ArgSpec, Command, Event, Exception, Feature, Property, State};
use crate::error::HdcError;
use crate::meta::HDC_VERSION;
use crate::registry::FeatureRegistry;

// ── JsonStream ───────────────────────────────────────────────────

/// Token writer over an open composer message.
struct JsonStream<'w, 'a> {
    tx: &'w mut TxHalf<'a>,
    /// Whether the next sibling needs a leading comma.
    comma: bool,
}

impl JsonStream<'_, '_> {
    fn raw(&mut self, text: &str) -> Result<(), HdcError> {
        self.tx.append(text.as_bytes())
    }

    fn sibling(&mut self) -> Result<(), HdcError> {
        if self.comma {
            self.raw(",")?;
        }
        Ok(())
    }

    fn quoted(&mut self, value: &str) -> Result<(), HdcError> {
        self.raw("\"")?;
        self.raw(value)?;
        self.raw("\"")
    }

    fn key(&mut self, key: &str) -> Result<(), HdcError> {
        self.quoted(key)?;
        self.raw(":")
    }

    fn object_start(&mut self) -> Result<(), HdcError> {
        self.sibling()?;
        self.raw("{")?;
        self.comma = false;
        Ok(())
    }

    fn object_end(&mut self) -> Result<(), HdcError> {
        self.raw("}")?;
        self.comma = true;
        Ok(())
    }

    fn attr_array_start(&mut self, name: &str) -> Result<(), HdcError> {
        self.sibling()?;
        self.key(name)?;
        self.raw("[")?;
        self.comma = false;
        Ok(())
    }

    fn array_end(&mut self) -> Result<(), HdcError> {
        self.raw("]")?;
        self.comma = true;
        Ok(())
    }

    /// String attribute; an absent value omits the attribute entirely
    /// (never a JSON `null`).
    fn attr_str(&mut self, name: &str, value: Option<&str>) -> Result<(), HdcError> {
        let Some(value) = value else { return Ok(()) };
        self.sibling()?;
        self.key(name)?;
        self.quoted(value)?;
        self.comma = true;
        Ok(())
    }

    fn attr_int(&mut self, name: &str, value: u16) -> Result<(), HdcError> {
        self.sibling()?;
        self.key(name)?;
        self.raw(&value.to_string())?;
        self.comma = true;
        Ok(())
    }

    fn attr_bool(&mut self, name: &str, value: bool) -> Result<(), HdcError> {
        self.sibling()?;
        self.key(name)?;
        self.raw(if value { "true" } else { "false" })?;
        self.comma = true;
        Ok(())
    }
}

// ── Per-descriptor emitters ──────────────────────────────────────

fn state_json(js: &mut JsonStream<'_, '_>, state: &State) -> Result<(), HdcError> {
    js.object_start()?;
    js.attr_int("id", state.id.into())?;
    js.attr_str("name", Some(&state.name))?;
    js.attr_str("doc", state.doc.as_deref())?;
    js.object_end()
}

fn arg_json(js: &mut JsonStream<'_, '_>, arg: &ArgSpec) -> Result<(), HdcError> {
    js.object_start()?;
    js.attr_str("dtype", Some(arg.dtype.name()))?;
    js.attr_str("name", arg.name.as_deref())?;
    js.attr_str("doc", arg.doc.as_deref())?;
    js.object_end()
}

fn exc_json(js: &mut JsonStream<'_, '_>, exception: &Exception) -> Result<(), HdcError> {
    js.object_start()?;
    js.attr_int("id", exception.id.into())?;
    js.attr_str("name", Some(&exception.name))?;
    js.attr_str("doc", exception.doc.as_deref())?;
    js.object_end()
}

fn command_json(js: &mut JsonStream<'_, '_>, command: &Command) -> Result<(), HdcError> {
    js.object_start()?;
    js.attr_int("id", command.id.into())?;
    js.attr_str("name", Some(&command.name))?;
    js.attr_str("doc", command.doc.as_deref())?;

    js.attr_array_start("args")?;
    for arg in &command.args {
        arg_json(js, arg)?;
    }
    js.array_end()?;

    js.attr_array_start("returns")?;
    for ret in &command.returns {
        arg_json(js, ret)?;
    }
    js.array_end()?;

    js.attr_array_start("raises")?;
    for exception in &command.raises {
        exc_json(js, exception)?;
    }
    js.array_end()?;

    js.object_end()
}

fn event_json(js: &mut JsonStream<'_, '_>, event: &Event) -> Result<(), HdcError> {
    js.object_start()?;
    js.attr_int("id", event.id.into())?;
    js.attr_str("name", Some(&event.name))?;
    js.attr_str("doc", event.doc.as_deref())?;

    js.attr_array_start("args")?;
    for arg in &event.args {
        arg_json(js, arg)?;
    }
    js.array_end()?;

    js.object_end()
}

fn property_json(js: &mut JsonStream<'_, '_>, property: &Property) -> Result<(), HdcError> {
    js.object_start()?;
    js.attr_int("id", property.id.into())?;
    js.attr_str("name", Some(&property.name))?;
    js.attr_str("dtype", Some(property.dtype.name()))?;
    if property.declared_size > 0 && property.dtype.is_variable_size() {
        js.attr_int("size", property.declared_size)?;
    }
    js.attr_bool("ro", property.readonly)?;
    js.attr_str("doc", property.doc.as_deref())?;
    js.object_end()
}

fn feature_json(
    js: &mut JsonStream<'_, '_>,
    registry: &FeatureRegistry,
    feature: &Feature,
) -> Result<(), HdcError> {
    js.object_start()?;
    js.attr_int("id", feature.id.into())?;
    js.attr_str("name", Some(&feature.name))?;
    js.attr_str("cls", Some(&feature.class_name))?;
    js.attr_str("version", Some(&feature.class_version))?;
    js.attr_str("doc", feature.doc.as_deref())?;

    js.attr_array_start("states")?;
    for state in &feature.states {
        state_json(js, state)?;
    }
    js.array_end()?;

    // Mandatory commands, events and properties follow the
    // feature-local ones, so every feature advertises the full set the
    // device actually serves.
    js.attr_array_start("commands")?;
    for command in &feature.commands {
        command_json(js, command)?;
    }
    for command in registry.mandatory_commands() {
        command_json(js, command)?;
    }
    js.array_end()?;

    js.attr_array_start("events")?;
    for event in &feature.events {
        event_json(js, event)?;
    }
    for event in registry.mandatory_events() {
        event_json(js, event)?;
    }
    js.array_end()?;

    js.attr_array_start("properties")?;
    for property in &feature.properties {
        property_json(js, property)?;
    }
    for property in registry.mandatory_properties() {
        property_json(js, property)?;
    }
    js.array_end()?;

    js.object_end()
}

/// Stream the whole device description into the open message.
pub(crate) fn device_json(
    tx: &mut TxHalf<'_>,
    registry: &FeatureRegistry,
    max_req: usize,
) -> Result<(), HdcError> {
    let mut js = JsonStream { tx, comma: false };

    js.object_start()?;
    js.attr_str("version", Some(HDC_VERSION))?;
    js.attr_int("max_req", max_req as u16)?;

    js.attr_array_start("features")?;
    for feature in registry.features() {
        feature_json(&mut js, registry, feature)?;
    }
    js.array_end()?;

    js.object_end()
}
