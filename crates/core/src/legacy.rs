//! Components that read and write their element by hand.
//!
//! They share locations and the lifecycle with schema-based components; only
//! the conversion between the component and its block differs.

use std::fmt;

use thiserror::Error;

use crate::codec::{CodecError, FieldIssue};
use crate::component::{validate_declaration, ComponentScope, RegistrationError};
use crate::schema::{Layout, PersistentState, Schema, SchemaError};
use crate::storage::{RoamingType, StorageSpec};
use crate::tree::StateTree;

#[derive(Debug, Error)]
pub enum LegacyError {
    #[error("invalid external data: {0}")]
    Invalid(String),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("{}", describe_issues(.0))]
    Fields(Vec<FieldIssue>),
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

fn describe_issues(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// 手動讀寫協定。 / Hand-written read/write protocol.
///
/// `write_external` fills the component's block; leaving it empty means the
/// component has nothing to persist and its block is removed.
pub trait Externalizable: 'static {
    fn read_external(&mut self, element: &StateTree) -> Result<(), LegacyError>;

    fn write_external(&self, element: &mut StateTree) -> Result<(), LegacyError>;
}

/// 舊式元件的描述。 / Identity and storage of a hand-written component.
#[derive(Debug, Clone)]
pub struct LegacyDescriptor {
    name: String,
    scope: ComponentScope,
    storages: Vec<StorageSpec>,
}

impl LegacyDescriptor {
    pub fn builder(name: impl Into<String>) -> LegacyDescriptorBuilder {
        LegacyDescriptorBuilder {
            name: name.into(),
            scope: ComponentScope::Application,
            storages: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scope(&self) -> ComponentScope {
        self.scope
    }

    pub fn storages(&self) -> &[StorageSpec] {
        &self.storages
    }

    pub fn is_roaming(&self) -> bool {
        self.storages
            .iter()
            .any(|spec| spec.roaming_type() == RoamingType::Synchronizable)
    }
}

pub struct LegacyDescriptorBuilder {
    name: String,
    scope: ComponentScope,
    storages: Vec<StorageSpec>,
}

impl LegacyDescriptorBuilder {
    pub fn scope(mut self, scope: ComponentScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn storage(mut self, spec: StorageSpec) -> Self {
        self.storages.push(spec);
        self
    }

    pub fn build(self) -> Result<LegacyDescriptor, RegistrationError> {
        validate_declaration(&self.name, self.scope, &self.storages)?;
        Ok(LegacyDescriptor {
            name: self.name,
            scope: self.scope,
            storages: self.storages,
        })
    }
}

impl fmt::Debug for LegacyDescriptorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LegacyDescriptorBuilder")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// 預設的欄位全寫入輔助。 / Fallback that persists every non-transient field of a state type.
///
/// Fields use the plain layout (`<option name="…">`, default collection tags)
/// whatever customization the schema declares, and defaults are not filtered.
pub struct DefaultExternalizer;

impl DefaultExternalizer {
    pub fn write<S: PersistentState>(state: &S, element: &mut StateTree) -> Result<(), LegacyError> {
        let schema = Schema::<S>::shared()?;
        let issues = schema.write_fields(state, None, element, Layout::Plain);
        if issues.is_empty() {
            Ok(())
        } else {
            Err(LegacyError::Fields(issues))
        }
    }

    /// Reads fields present in `element` into `state`. The state is updated
    /// even when some fields fail; those keep their previous values.
    pub fn read<S: PersistentState>(state: &mut S, element: &StateTree) -> Result<(), LegacyError> {
        let schema = Schema::<S>::shared()?;
        let outcome = schema.read_fields(element, state.clone(), Layout::Plain);
        *state = outcome.value;
        if outcome.issues.is_empty() {
            Ok(())
        } else {
            Err(LegacyError::Fields(outcome.issues))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{NAME_ATTR, OPTION_TAG, VALUE_ATTR};
    use crate::schema::SchemaBuilder;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Window {
        width: u32,
        title: String,
        recent: Vec<String>,
    }

    impl PersistentState for Window {
        fn describe(schema: &mut SchemaBuilder<Self>) {
            schema.field("width", |s| &s.width, |s| &mut s.width).attribute();
            schema.field("title", |s| &s.title, |s| &mut s.title).tag("caption");
            schema.field("recent", |s| &s.recent, |s| &mut s.recent).entry("file");
        }
    }

    #[test]
    fn plain_layout_ignores_customization() {
        let state = Window {
            width: 800,
            title: "main".into(),
            recent: vec!["a.txt".into()],
        };
        let mut element = StateTree::new("component");
        DefaultExternalizer::write(&state, &mut element).unwrap();

        assert_eq!(element.attribute("width"), None);
        let width = element.child_with(OPTION_TAG, NAME_ATTR, "width").unwrap();
        assert_eq!(width.attribute(VALUE_ATTR), Some("800"));
        assert!(element.child("caption").is_none());
        let recent = element.child_with(OPTION_TAG, NAME_ATTR, "recent").unwrap();
        assert_eq!(recent.child("list").unwrap().children_named("option").count(), 1);

        let mut restored = Window::default();
        DefaultExternalizer::read(&mut restored, &element).unwrap();
        assert_eq!(restored, state);
    }

    #[test]
    fn default_fields_are_written() {
        let mut element = StateTree::new("component");
        DefaultExternalizer::write(&Window::default(), &mut element).unwrap();
        assert_eq!(element.children().len(), 3);
    }

    #[test]
    fn bad_field_keeps_previous_value() {
        let element = StateTree::new("component").with_child(
            StateTree::new(OPTION_TAG)
                .with_attribute(NAME_ATTR, "width")
                .with_attribute(VALUE_ATTR, "wide"),
        );
        let mut state = Window {
            width: 5,
            ..Window::default()
        };
        let err = DefaultExternalizer::read(&mut state, &element).unwrap_err();
        assert!(matches!(err, LegacyError::Fields(ref issues) if issues.len() == 1));
        assert_eq!(state.width, 5);
    }

    #[test]
    fn descriptor_validates_storage() {
        let err = LegacyDescriptor::builder("Old")
            .scope(ComponentScope::Module)
            .storage(StorageSpec::new("$APP_CONFIG$/old.xml").unwrap())
            .build()
            .unwrap_err();
        assert!(matches!(err, RegistrationError::Placeholder { .. }));
    }
}
