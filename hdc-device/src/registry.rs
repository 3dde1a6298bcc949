//! The descriptor registry: registered features plus the mandatory
//! commands, events and properties every feature exposes.
//!
//! Lookups search the feature-local tables first and fall back to the
//! mandatory tables, so user descriptors can never shadow the protocol
//! range (user IDs below `0xF0` are enforced at registration).

use crate::descriptor::{ArgSpec, Command, Event, Exception, Feature, HandlerKind, Property};
use crate::dtype::{DType, Value};
use crate::error::DescriptorError;
use crate::event::LogLevel;
use crate::message::{
    CMD_GET_PROPERTY_VALUE, CMD_SET_PROPERTY_VALUE, CORE_FEATURE_ID, EVT_FEATURE_STATE_TRANSITION,
    EVT_LOG, FIRST_RESERVED_ID, PROP_FEATURE_STATE, PROP_LOG_EVENT_THRESHOLD,
};

#[derive(Debug)]
pub(crate) struct FeatureRegistry {
    features: Vec<Feature>,
    core_index: usize,
    mandatory_commands: [Command; 2],
    mandatory_events: [Event; 2],
    mandatory_properties: [Property; 2],
}

impl FeatureRegistry {
    pub(crate) fn new(features: Vec<Feature>) -> Result<Self, DescriptorError> {
        validate(&features)?;
        let core_index = features
            .iter()
            .position(|f| f.id == CORE_FEATURE_ID)
            .ok_or(DescriptorError::MissingCoreFeature)?;

        Ok(Self {
            features,
            core_index,
            mandatory_commands: mandatory_commands(),
            mandatory_events: mandatory_events(),
            mandatory_properties: mandatory_properties(),
        })
    }

    // ── Lookups ──────────────────────────────────────────────────

    pub(crate) fn feature(&self, id: u8) -> Option<&Feature> {
        self.features.iter().find(|f| f.id == id)
    }

    pub(crate) fn feature_mut(&mut self, id: u8) -> Option<&mut Feature> {
        self.features.iter_mut().find(|f| f.id == id)
    }

    /// The Core feature. Registration guarantees its presence.
    pub(crate) fn core(&self) -> &Feature {
        &self.features[self.core_index]
    }

    /// Find a command on a feature, falling back to the mandatory pair.
    pub(crate) fn command<'a>(&'a self, feature: &'a Feature, id: u8) -> Option<&'a Command> {
        feature
            .commands
            .iter()
            .find(|c| c.id == id)
            .or_else(|| self.mandatory_commands.iter().find(|c| c.id == id))
    }

    /// Find a property on a feature, falling back to the mandatory pair.
    pub(crate) fn property<'a>(&'a self, feature: &'a Feature, id: u8) -> Option<&'a Property> {
        feature
            .properties
            .iter()
            .find(|p| p.id == id)
            .or_else(|| self.mandatory_properties.iter().find(|p| p.id == id))
    }

    // ── Iteration (IDL emitter) ──────────────────────────────────

    pub(crate) fn features(&self) -> &[Feature] {
        &self.features
    }

    pub(crate) fn mandatory_commands(&self) -> &[Command] {
        &self.mandatory_commands
    }

    pub(crate) fn mandatory_events(&self) -> &[Event] {
        &self.mandatory_events
    }

    pub(crate) fn mandatory_properties(&self) -> &[Property] {
        &self.mandatory_properties
    }
}

// ── Mandatory descriptor tables ──────────────────────────────────

fn mandatory_commands() -> [Command; 2] {
    [
        Command::mandatory(
            CMD_GET_PROPERTY_VALUE,
            "GetPropertyValue",
            HandlerKind::GetPropertyValue,
        )
        .arg(ArgSpec::named(DType::UInt8, "PropertyID"))
        .ret(ArgSpec::new(DType::Blob).with_doc("Actual data-type depends on property"))
        .raises(Exception::unknown_property()),
        Command::mandatory(
            CMD_SET_PROPERTY_VALUE,
            "SetPropertyValue",
            HandlerKind::SetPropertyValue,
        )
        .arg(ArgSpec::named(DType::UInt8, "PropertyID"))
        .arg(
            ArgSpec::named(DType::Blob, "NewValue")
                .with_doc("Actual data-type depends on property"),
        )
        .ret(ArgSpec::named(DType::Blob, "ActualNewValue").with_doc("May differ from NewValue!"))
        .raises(Exception::unknown_property())
        .raises(Exception::read_only_property()),
    ]
}

fn mandatory_events() -> [Event; 2] {
    [
        Event::new(EVT_LOG, "Log")
            .with_doc("Forwards software event log to the host.")
            .arg(ArgSpec::named(DType::UInt8, "LogLevel").with_doc("Same as in Python"))
            .arg(ArgSpec::named(DType::Utf8, "LogMsg")),
        Event::new(EVT_FEATURE_STATE_TRANSITION, "FeatureStateTransition")
            .with_doc("Notifies host about transitions of this feature's state-machine.")
            .arg(ArgSpec::named(DType::UInt8, "PreviousStateID"))
            .arg(ArgSpec::named(DType::UInt8, "CurrentStateID")),
    ]
}

fn mandatory_properties() -> [Property; 2] {
    [
        Property::new(PROP_LOG_EVENT_THRESHOLD, "LogEventThreshold", DType::UInt8)
            .with_getter(|feature| Value::UInt8(feature.log_threshold))
            .with_setter(|feature, value| {
                if let Value::UInt8(raw) = value {
                    feature.log_threshold = LogLevel::quantize(raw);
                }
            })
            .with_doc("Suppresses LogEvents with lower log-levels."),
        Property::new(PROP_FEATURE_STATE, "FeatureState", DType::UInt8)
            .read_only()
            .with_getter(|feature| Value::UInt8(feature.state))
            .with_doc("Current feature-state"),
    ]
}

// ── Validation ───────────────────────────────────────────────────

fn validate(features: &[Feature]) -> Result<(), DescriptorError> {
    for (index, feature) in features.iter().enumerate() {
        if feature.id >= FIRST_RESERVED_ID {
            return Err(DescriptorError::ReservedId {
                kind: "feature",
                id: feature.id,
            });
        }
        if features[..index].iter().any(|f| f.id == feature.id) {
            return Err(DescriptorError::DuplicateFeature(feature.id));
        }
        if feature.name.is_empty() {
            return Err(DescriptorError::EmptyName {
                feature: feature.id,
                kind: "feature",
            });
        }
        validate_commands(feature)?;
        validate_events(feature)?;
        validate_properties(feature)?;
    }
    Ok(())
}

fn validate_commands(feature: &Feature) -> Result<(), DescriptorError> {
    for (index, command) in feature.commands.iter().enumerate() {
        if command.id >= FIRST_RESERVED_ID {
            return Err(DescriptorError::ReservedId {
                kind: "command",
                id: command.id,
            });
        }
        if feature.commands[..index].iter().any(|c| c.id == command.id) {
            return Err(DescriptorError::DuplicateCommand {
                feature: feature.id,
                id: command.id,
            });
        }
        if command.name.is_empty() {
            return Err(DescriptorError::EmptyName {
                feature: feature.id,
                kind: "command",
            });
        }
        if command.args.len() > 4 {
            return Err(DescriptorError::TooManyArgs {
                feature: feature.id,
                id: command.id,
                kind: "command arguments",
            });
        }
        if command.returns.len() > 4 {
            return Err(DescriptorError::TooManyArgs {
                feature: feature.id,
                id: command.id,
                kind: "command returns",
            });
        }
    }
    Ok(())
}

fn validate_events(feature: &Feature) -> Result<(), DescriptorError> {
    for (index, event) in feature.events.iter().enumerate() {
        if event.id >= FIRST_RESERVED_ID {
            return Err(DescriptorError::ReservedId {
                kind: "event",
                id: event.id,
            });
        }
        if feature.events[..index].iter().any(|e| e.id == event.id) {
            return Err(DescriptorError::DuplicateEvent {
                feature: feature.id,
                id: event.id,
            });
        }
        if event.name.is_empty() {
            return Err(DescriptorError::EmptyName {
                feature: feature.id,
                kind: "event",
            });
        }
        if event.args.len() > 4 {
            return Err(DescriptorError::TooManyArgs {
                feature: feature.id,
                id: event.id,
                kind: "event arguments",
            });
        }
    }
    Ok(())
}

fn validate_properties(feature: &Feature) -> Result<(), DescriptorError> {
    for (index, property) in feature.properties.iter().enumerate() {
        if property.id >= FIRST_RESERVED_ID {
            return Err(DescriptorError::ReservedId {
                kind: "property",
                id: property.id,
            });
        }
        if feature.properties[..index]
            .iter()
            .any(|p| p.id == property.id)
        {
            return Err(DescriptorError::DuplicateProperty {
                feature: feature.id,
                id: property.id,
            });
        }
        if property.name.is_empty() {
            return Err(DescriptorError::EmptyName {
                feature: feature.id,
                kind: "property",
            });
        }

        let expected_len = match property.dtype.fixed_size() {
            Some(size) => size,
            None => {
                if property.declared_size == 0 {
                    return Err(DescriptorError::MissingDeclaredSize {
                        feature: feature.id,
                        id: property.id,
                    });
                }
                property.declared_size as usize
            }
        };

        match (&property.getter, &property.cell) {
            (Some(_), Some(_)) => {
                return Err(DescriptorError::AmbiguousRead {
                    feature: feature.id,
                    id: property.id,
                });
            }
            (None, None) => {
                return Err(DescriptorError::UnreadableProperty {
                    feature: feature.id,
                    id: property.id,
                });
            }
            (None, Some(cell)) => {
                if cell.len() != expected_len {
                    return Err(DescriptorError::StorageSizeMismatch {
                        feature: feature.id,
                        id: property.id,
                        expected: expected_len,
                        actual: cell.len(),
                    });
                }
            }
            (Some(_), None) => {}
        }

        if !property.readonly && property.setter.is_none() && property.cell.is_none() {
            return Err(DescriptorError::UnwritableProperty {
                feature: feature.id,
                id: property.id,
            });
        }
    }
    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::PropertyCell;

    fn core() -> Feature {
        Feature::new(0x00, "Core", "TestCore", "1.0")
    }

    #[test]
    fn registry_requires_a_core_feature() {
        let err = FeatureRegistry::new(vec![Feature::new(0x01, "Aux", "Aux", "1.0")]).unwrap_err();
        assert!(matches!(err, DescriptorError::MissingCoreFeature));
    }

    #[test]
    fn duplicate_feature_ids_are_rejected() {
        let err = FeatureRegistry::new(vec![core(), core()]).unwrap_err();
        assert!(matches!(err, DescriptorError::DuplicateFeature(0x00)));
    }

    #[test]
    fn reserved_user_ids_are_rejected() {
        let feature = core().with_event(Event::new(0xF0, "Shadowing"));
        let err = FeatureRegistry::new(vec![feature]).unwrap_err();
        assert!(matches!(
            err,
            DescriptorError::ReservedId { kind: "event", .. }
        ));
    }

    #[test]
    fn unreadable_property_is_rejected() {
        let feature = core().with_property(Property::new(0x10, "Orphan", DType::UInt8));
        let err = FeatureRegistry::new(vec![feature]).unwrap_err();
        assert!(matches!(err, DescriptorError::UnreadableProperty { .. }));
    }

    #[test]
    fn blob_without_declared_size_is_rejected() {
        let feature = core().with_property(
            Property::new(0x10, "Raw", DType::Blob)
                .read_only()
                .backed_by(PropertyCell::zeroed(12)),
        );
        let err = FeatureRegistry::new(vec![feature]).unwrap_err();
        assert!(matches!(err, DescriptorError::MissingDeclaredSize { .. }));
    }

    #[test]
    fn storage_length_must_match_dtype() {
        let feature = core().with_property(
            Property::new(0x10, "Word", DType::UInt32)
                .read_only()
                .backed_by(PropertyCell::zeroed(2)),
        );
        let err = FeatureRegistry::new(vec![feature]).unwrap_err();
        assert!(matches!(
            err,
            DescriptorError::StorageSizeMismatch {
                expected: 4,
                actual: 2,
                ..
            }
        ));
    }

    #[test]
    fn lookup_falls_back_to_mandatory_tables() {
        let registry = FeatureRegistry::new(vec![core()]).unwrap();
        let feature = registry.core();

        assert!(registry.command(feature, CMD_GET_PROPERTY_VALUE).is_some());
        assert!(registry.command(feature, CMD_SET_PROPERTY_VALUE).is_some());
        assert!(registry.command(feature, 0x01).is_none());

        assert!(registry.property(feature, PROP_LOG_EVENT_THRESHOLD).is_some());
        assert!(registry.property(feature, PROP_FEATURE_STATE).is_some());
        assert!(registry.property(feature, 0x10).is_none());
    }

    #[test]
    fn core_lookup_is_order_independent() {
        let registry =
            FeatureRegistry::new(vec![Feature::new(0x02, "Aux", "Aux", "1.0"), core()]).unwrap();
        assert_eq!(registry.core().id, 0x00);
    }
}
