//! Lays typed [`Value`]s out inside a [`StateTree`] and reads them back.
//!
//! A field is written into a *slot*: an attribute of the owner element, an
//! `<option name="…">` child, or a child with an overridden label. Composite
//! values are written as a value element inside the slot: nested objects use
//! their own tag, collections use a wrapper (`list`, `set`, `map`) holding one
//! element per entry. Unknown attributes and children are ignored on read.

use std::fmt;

use thiserror::Error;

use crate::schema::{CollectionStyle, EntryForm, FieldDescriptor, MappingTarget};
use crate::tree::StateTree;
use crate::value::{Value, ValueKind};
use crate::xml;

pub const OPTION_TAG: &str = "option";
pub const NAME_ATTR: &str = "name";
pub const VALUE_ATTR: &str = "value";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("expected {expected}, found {found}")]
    Mismatch { expected: String, found: String },
    #[error("`{text}` is not a valid {kind}: {reason}")]
    InvalidScalar {
        kind: &'static str,
        text: String,
        reason: String,
    },
    #[error("`{name}` is not a variant of {type_name}")]
    UnknownVariant { type_name: &'static str, name: String },
    #[error("missing {0}")]
    Missing(String),
    #[error("opaque tree holds `{0}`, which is not a valid XML name")]
    InvalidTree(String),
    #[error("schema of {type_name} is invalid: {reason}")]
    Schema {
        type_name: &'static str,
        reason: String,
    },
}

/// 單一欄位的編解碼問題。 / A codec failure confined to one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIssue {
    pub field: String,
    pub error: CodecError,
}

impl FieldIssue {
    pub fn new(field: &str, error: CodecError) -> Self {
        Self {
            field: field.to_string(),
            error,
        }
    }
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "field `{}`: {}", self.field, self.error)
    }
}

/// A result that still carries a value when some fields failed.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome<T> {
    pub value: T,
    pub issues: Vec<FieldIssue>,
}

impl<T> Outcome<T> {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// 將欄位值寫入擁有者節點。 / Writes `value` into `owner` following the field's layout.
pub fn encode(
    value: &Value,
    field: &FieldDescriptor,
    owner: &mut StateTree,
) -> Result<(), CodecError> {
    let kind = &field.kind;
    match &field.target {
        MappingTarget::Attribute => {
            let text = scalar_text(value, kind)?;
            owner.set_attribute(field.name.as_str(), text);
        }
        MappingTarget::Option => {
            let mut slot = StateTree::new(OPTION_TAG).with_attribute(NAME_ATTR, field.name.as_str());
            if kind.is_scalar() {
                slot.set_attribute(VALUE_ATTR, scalar_text(value, kind)?);
            } else {
                fill_slot(&mut slot, value, kind, field.style.as_ref())?;
            }
            owner.add_child(slot);
        }
        MappingTarget::Tag(label) => {
            let mut slot = StateTree::new(label.as_str());
            if kind.is_scalar() {
                slot.set_text(scalar_text(value, kind)?);
            } else {
                fill_slot(&mut slot, value, kind, field.style.as_ref())?;
            }
            owner.add_child(slot);
        }
    }
    Ok(())
}

/// 從擁有者節點讀取欄位值；缺少時回傳 `None`。 / Reads the field from `owner`; `None` when it is absent.
pub fn decode(owner: &StateTree, field: &FieldDescriptor) -> Result<Option<Value>, CodecError> {
    let kind = &field.kind;
    match &field.target {
        MappingTarget::Attribute => owner
            .attribute(&field.name)
            .map(|text| Value::from_text(kind, text))
            .transpose(),
        MappingTarget::Option => {
            let Some(slot) = owner.child_with(OPTION_TAG, NAME_ATTR, &field.name) else {
                return Ok(None);
            };
            if kind.is_scalar() {
                let text = slot
                    .attribute(VALUE_ATTR)
                    .ok_or_else(|| CodecError::Missing(format!("`{VALUE_ATTR}` attribute")))?;
                Value::from_text(kind, text).map(Some)
            } else {
                read_slot(slot, kind, field.style.as_ref()).map(Some)
            }
        }
        MappingTarget::Tag(label) => {
            let Some(slot) = owner.child(label) else {
                return Ok(None);
            };
            if kind.is_scalar() {
                Value::from_text(kind, slot.text().unwrap_or_default()).map(Some)
            } else {
                read_slot(slot, kind, field.style.as_ref()).map(Some)
            }
        }
    }
}

fn scalar_text(value: &Value, kind: &ValueKind) -> Result<String, CodecError> {
    value.scalar_text().ok_or_else(|| CodecError::Mismatch {
        expected: kind.to_string(),
        found: value.shape().to_string(),
    })
}

fn fill_slot(
    slot: &mut StateTree,
    value: &Value,
    kind: &ValueKind,
    style: Option<&CollectionStyle>,
) -> Result<(), CodecError> {
    match style {
        Some(style) if kind.is_collection() => match &style.wrapper {
            Some(wrapper) => {
                let mut container = StateTree::new(wrapper.as_str());
                write_entries(&mut container, value, kind, style)?;
                slot.add_child(container);
                Ok(())
            }
            None => write_entries(slot, value, kind, style),
        },
        // The default opaque value has no element form.
        _ if matches!(value, Value::Tree(tree) if *tree == StateTree::default()) => Ok(()),
        _ => {
            slot.add_child(value_element(value, kind)?);
            Ok(())
        }
    }
}

/// The element that stands for a composite value under default layout.
fn value_element(value: &Value, kind: &ValueKind) -> Result<StateTree, CodecError> {
    match (value, kind) {
        (Value::Object(tree), ValueKind::Nested(_)) => Ok(tree.clone()),
        (Value::Tree(tree), ValueKind::Opaque) => {
            check_tree(tree)?;
            Ok(tree.clone())
        }
        (_, kind) if kind.is_collection() => {
            let style = CollectionStyle::for_kind(kind);
            let mut container = StateTree::new(style.wrapper.as_deref().unwrap_or("list"));
            write_entries(&mut container, value, kind, &style)?;
            Ok(container)
        }
        _ => Err(CodecError::Mismatch {
            expected: kind.to_string(),
            found: value.shape().to_string(),
        }),
    }
}

/// Opaque trees come from callers unchecked; every label must be writable.
fn check_tree(tree: &StateTree) -> Result<(), CodecError> {
    if !xml::is_valid_name(tree.name()) {
        return Err(CodecError::InvalidTree(tree.name().to_string()));
    }
    if let Some((key, _)) = tree.attributes().find(|(key, _)| !xml::is_valid_name(key)) {
        return Err(CodecError::InvalidTree(key.to_string()));
    }
    tree.children().iter().try_for_each(check_tree)
}

fn write_entries(
    container: &mut StateTree,
    value: &Value,
    kind: &ValueKind,
    style: &CollectionStyle,
) -> Result<(), CodecError> {
    match (value, kind) {
        (Value::Sequence(items), ValueKind::Sequence(inner))
        | (Value::Set(items), ValueKind::Set(inner)) => {
            for item in items {
                container.add_child(collection_entry(item, inner, style)?);
            }
            Ok(())
        }
        (Value::Map(entries), ValueKind::Map(key_kind, value_kind)) => {
            for (key, item) in entries {
                let mut entry = StateTree::new(style.entry.as_str());
                write_part(&mut entry, &style.key, style.key_form, key, key_kind)?;
                write_part(&mut entry, &style.value, style.value_form, item, value_kind)?;
                container.add_child(entry);
            }
            Ok(())
        }
        _ => Err(CodecError::Mismatch {
            expected: kind.to_string(),
            found: value.shape().to_string(),
        }),
    }
}

fn collection_entry(
    item: &Value,
    inner: &ValueKind,
    style: &CollectionStyle,
) -> Result<StateTree, CodecError> {
    if inner.is_scalar() {
        let text = scalar_text(item, inner)?;
        return Ok(StateTree::new(style.entry.as_str()).with_attribute(VALUE_ATTR, text));
    }
    let mut element = value_element(item, inner)?;
    if matches!(inner, ValueKind::Nested(_)) {
        element.set_name(style.entry.as_str());
    }
    Ok(element)
}

fn write_part(
    entry: &mut StateTree,
    label: &str,
    form: EntryForm,
    value: &Value,
    kind: &ValueKind,
) -> Result<(), CodecError> {
    match form {
        EntryForm::Attribute => {
            entry.set_attribute(label, scalar_text(value, kind)?);
        }
        EntryForm::Tag if kind.is_scalar() => {
            entry.add_child(StateTree::new(label).with_text(scalar_text(value, kind)?));
        }
        EntryForm::Tag => {
            entry.add_child(StateTree::new(label).with_child(value_element(value, kind)?));
        }
    }
    Ok(())
}

fn read_slot(
    slot: &StateTree,
    kind: &ValueKind,
    style: Option<&CollectionStyle>,
) -> Result<Value, CodecError> {
    match (kind, style) {
        (ValueKind::Nested(nested), _) => {
            let element = slot
                .child(nested.tag)
                .or_else(|| slot.children().first())
                .ok_or_else(|| CodecError::Missing(format!("<{}> element", nested.tag)))?;
            element_value(element, kind)
        }
        (ValueKind::Opaque, _) => Ok(Value::Tree(
            slot.children().first().cloned().unwrap_or_default(),
        )),
        (_, Some(style)) if kind.is_collection() => match &style.wrapper {
            Some(wrapper) => {
                let container = slot
                    .child(wrapper)
                    .ok_or_else(|| CodecError::Missing(format!("<{wrapper}> element")))?;
                read_entries(container, kind, style)
            }
            None => read_entries(slot, kind, style),
        },
        _ => Err(CodecError::Mismatch {
            expected: kind.to_string(),
            found: "element".to_string(),
        }),
    }
}

/// Interprets an element written by [`value_element`].
fn element_value(element: &StateTree, kind: &ValueKind) -> Result<Value, CodecError> {
    match kind {
        ValueKind::Nested(nested) => {
            let mut tree = element.clone();
            tree.set_name(nested.tag);
            Ok(Value::Object(tree))
        }
        ValueKind::Opaque => Ok(Value::Tree(element.clone())),
        kind if kind.is_collection() => {
            read_entries(element, kind, &CollectionStyle::for_kind(kind))
        }
        kind => Err(CodecError::Mismatch {
            expected: kind.to_string(),
            found: "element".to_string(),
        }),
    }
}

fn read_entries(
    container: &StateTree,
    kind: &ValueKind,
    style: &CollectionStyle,
) -> Result<Value, CodecError> {
    match kind {
        ValueKind::Sequence(inner) => read_items(container, inner, style).map(Value::Sequence),
        ValueKind::Set(inner) => read_items(container, inner, style).map(Value::Set),
        ValueKind::Map(key_kind, value_kind) => container
            .children_named(&style.entry)
            .map(|entry| {
                let key = read_part(entry, &style.key, style.key_form, key_kind)?;
                let value = read_part(entry, &style.value, style.value_form, value_kind)?;
                Ok((key, value))
            })
            .collect::<Result<Vec<_>, CodecError>>()
            .map(Value::Map),
        other => Err(CodecError::Mismatch {
            expected: "collection".to_string(),
            found: other.to_string(),
        }),
    }
}

fn read_items(
    container: &StateTree,
    inner: &ValueKind,
    style: &CollectionStyle,
) -> Result<Vec<Value>, CodecError> {
    if inner.is_scalar() {
        return container
            .children_named(&style.entry)
            .map(|entry| {
                let text = entry
                    .attribute(VALUE_ATTR)
                    .ok_or_else(|| CodecError::Missing(format!("`{VALUE_ATTR}` attribute")))?;
                Value::from_text(inner, text)
            })
            .collect();
    }
    match inner {
        ValueKind::Nested(_) => container
            .children_named(&style.entry)
            .map(|entry| element_value(entry, inner))
            .collect(),
        ValueKind::Opaque => Ok(container
            .children()
            .iter()
            .map(|child| Value::Tree(child.clone()))
            .collect()),
        _ => {
            let nested_style = CollectionStyle::for_kind(inner);
            let wrapper = nested_style.wrapper.as_deref().unwrap_or("list");
            container
                .children_named(wrapper)
                .map(|element| read_entries(element, inner, &nested_style))
                .collect()
        }
    }
}

fn read_part(
    entry: &StateTree,
    label: &str,
    form: EntryForm,
    kind: &ValueKind,
) -> Result<Value, CodecError> {
    match form {
        EntryForm::Attribute => {
            let text = entry
                .attribute(label)
                .ok_or_else(|| CodecError::Missing(format!("`{label}` attribute")))?;
            Value::from_text(kind, text)
        }
        EntryForm::Tag => {
            let part = entry
                .child(label)
                .ok_or_else(|| CodecError::Missing(format!("<{label}> element")))?;
            if kind.is_scalar() {
                Value::from_text(kind, part.text().unwrap_or_default())
            } else {
                let element = part
                    .children()
                    .first()
                    .ok_or_else(|| CodecError::Missing(format!("value inside <{label}>")))?;
                element_value(element, kind)
            }
        }
    }
}
