//! Schema descriptors: the ordered list of persistable fields of a state type.
//!
//! A state type lists its fields once, in [`PersistentState::describe`], through
//! a [`SchemaBuilder`]. Customization (mapping target, collection tags,
//! transient exclusion) is passed explicitly to the builder and resolved into
//! immutable [`FieldDescriptor`]s when [`Schema::build`] validates the result.
//! Nested state types are built once per process through [`Schema::shared`].

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use once_cell::sync::Lazy;
use thiserror::Error;

use crate::codec::{self, CodecError, FieldIssue, Outcome, NAME_ATTR};
use crate::tree::StateTree;
use crate::value::{Persist, Value, ValueKind};
use crate::xml;

type SharedSchema = Arc<dyn Any + Send + Sync>;

static SCHEMAS: Lazy<Mutex<HashMap<TypeId, SharedSchema>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// 描述一個可持久化狀態型別。 / Describes a state type whose fields can be persisted.
pub trait PersistentState: Clone + Default + 'static {
    /// Element label used when the state is nested inside another state.
    const TAG: &'static str = "state";

    fn describe(schema: &mut SchemaBuilder<Self>);
}

/// 欄位的對映目標。 / Where a field lands inside its owner element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingTarget {
    /// `field="text"` on the owner element; scalars only.
    Attribute,
    /// `<option name="field" .../>` child.
    Option,
    /// Child element with an overridden label.
    Tag(String),
}

/// Whether a map key or value is stored as an attribute or a child tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryForm {
    Attribute,
    Tag,
}

/// 集合與對照表的標籤設定。 / Tag names used to lay out collections and maps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionStyle {
    /// Wrapper element; `None` places entries directly in the field element.
    pub wrapper: Option<String>,
    pub entry: String,
    pub key: String,
    pub value: String,
    pub key_form: EntryForm,
    pub value_form: EntryForm,
}

impl CollectionStyle {
    /// 依種類取得預設樣式。 / Default layout for the given kind.
    pub fn for_kind(kind: &ValueKind) -> Self {
        let (wrapper, entry) = match kind {
            ValueKind::Sequence(inner) => ("list", entry_tag_for(inner)),
            ValueKind::Set(inner) => ("set", entry_tag_for(inner)),
            ValueKind::Map(_, _) => ("map", "entry"),
            _ => ("list", "option"),
        };
        let (key_form, value_form) = match kind {
            ValueKind::Map(key, value) => (form_for(key), form_for(value)),
            _ => (EntryForm::Attribute, EntryForm::Attribute),
        };
        Self {
            wrapper: Some(wrapper.to_string()),
            entry: entry.to_string(),
            key: "key".to_string(),
            value: "value".to_string(),
            key_form,
            value_form,
        }
    }
}

fn entry_tag_for(kind: &ValueKind) -> &'static str {
    match kind {
        ValueKind::Nested(nested) => nested.tag,
        _ => "option",
    }
}

fn form_for(kind: &ValueKind) -> EntryForm {
    if kind.is_scalar() {
        EntryForm::Attribute
    } else {
        EntryForm::Tag
    }
}

/// 已解析、不可變的欄位描述。 / Resolved, immutable description of one persisted field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: ValueKind,
    pub target: MappingTarget,
    /// Present for sequence, set and map kinds.
    pub style: Option<CollectionStyle>,
}

impl FieldDescriptor {
    /// The same field laid out without any customization.
    pub fn plain(&self) -> FieldDescriptor {
        FieldDescriptor {
            name: self.name.clone(),
            kind: self.kind.clone(),
            target: MappingTarget::Option,
            style: self
                .kind
                .is_collection()
                .then(|| CollectionStyle::for_kind(&self.kind)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("{owner}: `{name}` is not a valid element or attribute name")]
    InvalidName { owner: &'static str, name: String },
    #[error("{owner}: field `{field}` is declared more than once")]
    DuplicateField { owner: &'static str, field: String },
    #[error("{owner}: field `{field}` of kind {kind} cannot be mapped to {target}")]
    UnsupportedMapping {
        owner: &'static str,
        field: String,
        kind: String,
        target: String,
    },
    #[error("{owner}: field `{field}` maps to `{label}` which is already used by `{other}`")]
    Collision {
        owner: &'static str,
        field: String,
        other: String,
        label: String,
    },
    #[error("{owner}: attribute `{field}` is reserved for the component name")]
    ReservedAttribute { owner: &'static str, field: String },
    #[error("{owner}: field `{field}` customizes {setting} but is not a {expected}")]
    UnsupportedCustomization {
        owner: &'static str,
        field: String,
        setting: &'static str,
        expected: &'static str,
    },
    #[error("{owner} declares no persistent fields")]
    Empty { owner: &'static str },
}

trait FieldAccess<S>: Send + Sync {
    fn read(&self, state: &S) -> Result<Value, CodecError>;
    fn write(&self, state: &mut S, value: Value) -> Result<(), CodecError>;
    fn same(&self, left: &S, right: &S) -> bool;
}

struct Accessor<S, T> {
    get: fn(&S) -> &T,
    get_mut: fn(&mut S) -> &mut T,
}

impl<S, T: Persist> FieldAccess<S> for Accessor<S, T> {
    fn read(&self, state: &S) -> Result<Value, CodecError> {
        (self.get)(state).to_value()
    }

    fn write(&self, state: &mut S, value: Value) -> Result<(), CodecError> {
        *(self.get_mut)(state) = T::from_value(value)?;
        Ok(())
    }

    fn same(&self, left: &S, right: &S) -> bool {
        (self.get)(left).same_as((self.get)(right))
    }
}

#[derive(Debug, Default)]
struct FieldConfig {
    target: Option<MappingTarget>,
    wrapper: Option<Option<String>>,
    entry: Option<String>,
    key: Option<String>,
    value: Option<String>,
    key_form: Option<EntryForm>,
    value_form: Option<EntryForm>,
}

struct PendingField<S> {
    name: String,
    kind: ValueKind,
    config: FieldConfig,
    access: Box<dyn FieldAccess<S>>,
}

/// 狀態型別的欄位登錄器。 / Collects the field declarations of a state type.
pub struct SchemaBuilder<S> {
    fields: Vec<PendingField<S>>,
    transient: Vec<String>,
}

impl<S: PersistentState> SchemaBuilder<S> {
    fn new() -> Self {
        Self {
            fields: Vec::new(),
            transient: Vec::new(),
        }
    }

    /// 宣告一個持久化欄位。 / Declares a persisted field; declaration order is file order.
    pub fn field<T: Persist>(
        &mut self,
        name: &str,
        get: fn(&S) -> &T,
        get_mut: fn(&mut S) -> &mut T,
    ) -> FieldOptions<'_> {
        self.fields.push(PendingField {
            name: name.to_string(),
            kind: T::kind(),
            config: FieldConfig::default(),
            access: Box::new(Accessor { get, get_mut }),
        });
        let last = self.fields.len() - 1;
        FieldOptions {
            config: &mut self.fields[last].config,
        }
    }

    /// 宣告不持久化的欄位。 / Records a field that is never persisted.
    pub fn transient(&mut self, name: &str) {
        self.transient.push(name.to_string());
    }
}

/// 單一欄位的自訂設定。 / Per-field customization, chained after [`SchemaBuilder::field`].
pub struct FieldOptions<'a> {
    config: &'a mut FieldConfig,
}

impl<'a> FieldOptions<'a> {
    pub fn attribute(self) -> Self {
        self.config.target = Some(MappingTarget::Attribute);
        self
    }

    pub fn tag(self, label: &str) -> Self {
        self.config.target = Some(MappingTarget::Tag(label.to_string()));
        self
    }

    pub fn wrapper(self, label: &str) -> Self {
        self.config.wrapper = Some(Some(label.to_string()));
        self
    }

    pub fn no_wrapper(self) -> Self {
        self.config.wrapper = Some(None);
        self
    }

    pub fn entry(self, label: &str) -> Self {
        self.config.entry = Some(label.to_string());
        self
    }

    pub fn key_tag(self, label: &str) -> Self {
        self.config.key = Some(label.to_string());
        self
    }

    pub fn value_tag(self, label: &str) -> Self {
        self.config.value = Some(label.to_string());
        self
    }

    pub fn key_form(self, form: EntryForm) -> Self {
        self.config.key_form = Some(form);
        self
    }

    pub fn value_form(self, form: EntryForm) -> Self {
        self.config.value_form = Some(form);
        self
    }
}

struct Field<S> {
    descriptor: FieldDescriptor,
    access: Box<dyn FieldAccess<S>>,
}

/// Which layout rules to apply when reading or writing fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Layout {
    Declared,
    Plain,
}

/// 經驗證的狀態型別結構描述。 / Validated schema of a state type.
pub struct Schema<S> {
    type_name: &'static str,
    tag: &'static str,
    fields: Vec<Field<S>>,
    transient: Vec<String>,
}

impl<S> fmt::Debug for Schema<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("type_name", &self.type_name)
            .field("tag", &self.tag)
            .field(
                "fields",
                &self.fields.iter().map(|f| &f.descriptor).collect::<Vec<_>>(),
            )
            .field("transient", &self.transient)
            .finish()
    }
}

impl<S: PersistentState> Schema<S> {
    /// 建立並驗證結構描述。 / Builds and validates the schema of `S`, including nested types.
    pub fn build() -> Result<Self, SchemaError> {
        let mut visited = vec![std::any::type_name::<S>()];
        Self::build_tracked(&mut visited)
    }

    /// 取得共用的結構描述。 / The schema of `S`, built on first use and reused afterwards.
    ///
    /// Build failures are not remembered; the next call tries again.
    pub fn shared() -> Result<Arc<Self>, SchemaError> {
        if let Some(schema) = cached::<S>() {
            return Ok(schema);
        }
        let schema = Arc::new(Self::build()?);
        SCHEMAS
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(TypeId::of::<S>())
            .or_insert_with(|| Arc::clone(&schema) as SharedSchema);
        Ok(schema)
    }

    fn build_tracked(visited: &mut Vec<&'static str>) -> Result<Self, SchemaError> {
        let owner = std::any::type_name::<S>();
        let mut builder = SchemaBuilder::<S>::new();
        S::describe(&mut builder);

        check_name(owner, S::TAG)?;
        if builder.fields.is_empty() && builder.transient.is_empty() {
            return Err(SchemaError::Empty { owner });
        }

        let mut fields = Vec::with_capacity(builder.fields.len());
        for pending in builder.fields {
            if builder.transient.contains(&pending.name) {
                continue;
            }
            let descriptor = resolve(owner, &pending.name, pending.kind, pending.config)?;
            descriptor.kind.validate_nested(visited)?;
            fields.push(Field {
                descriptor,
                access: pending.access,
            });
        }
        check_collisions(owner, &fields)?;

        Ok(Self {
            type_name: owner,
            tag: S::TAG,
            fields,
            transient: builder.transient,
        })
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn tag(&self) -> &'static str {
        self.tag
    }

    /// 依宣告順序列出持久化欄位。 / Persisted fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().map(|field| &field.descriptor)
    }

    pub fn transient_fields(&self) -> &[String] {
        &self.transient
    }

    /// 序列化狀態；與基準相同的欄位會被略過。 / Serializes `state`, skipping fields equal to `baseline`.
    pub fn to_tree(&self, state: &S, baseline: Option<&S>) -> Outcome<StateTree> {
        let mut element = StateTree::new(self.tag);
        let issues = self.write_fields(state, baseline, &mut element, Layout::Declared);
        Outcome {
            value: element,
            issues,
        }
    }

    /// 以 `base` 為起點還原狀態。 / Decodes `element` on top of `base`; absent fields keep `base`'s values.
    pub fn from_tree(&self, element: &StateTree, base: S) -> Outcome<S> {
        self.read_fields(element, base, Layout::Declared)
    }

    /// 逐欄位比較。 / Field-by-field structural equality.
    pub fn fields_equal(&self, left: &S, right: &S) -> bool {
        self.fields.iter().all(|field| field.access.same(left, right))
    }

    pub(crate) fn write_fields(
        &self,
        state: &S,
        baseline: Option<&S>,
        element: &mut StateTree,
        layout: Layout,
    ) -> Vec<FieldIssue> {
        let mut issues = Vec::new();
        for field in &self.fields {
            if let Some(baseline) = baseline {
                if field.access.same(state, baseline) {
                    continue;
                }
            }
            let plain;
            let descriptor = match layout {
                Layout::Declared => &field.descriptor,
                Layout::Plain => {
                    plain = field.descriptor.plain();
                    &plain
                }
            };
            let encoded = field.access.read(state).and_then(|value| {
                if value.conforms_to(&descriptor.kind) {
                    codec::encode(&value, descriptor, element)
                } else {
                    Err(CodecError::Mismatch {
                        expected: descriptor.kind.to_string(),
                        found: value.shape().to_string(),
                    })
                }
            });
            if let Err(error) = encoded {
                issues.push(FieldIssue::new(&descriptor.name, error));
            }
        }
        issues
    }

    pub(crate) fn read_fields(&self, element: &StateTree, base: S, layout: Layout) -> Outcome<S> {
        let mut state = base;
        let mut issues = Vec::new();
        for field in &self.fields {
            let plain;
            let descriptor = match layout {
                Layout::Declared => &field.descriptor,
                Layout::Plain => {
                    plain = field.descriptor.plain();
                    &plain
                }
            };
            let decoded = codec::decode(element, descriptor).and_then(|value| match value {
                Some(value) => field.access.write(&mut state, value),
                None => Ok(()),
            });
            if let Err(error) = decoded {
                issues.push(FieldIssue::new(&descriptor.name, error));
            }
        }
        Outcome {
            value: state,
            issues,
        }
    }
}

fn resolve(
    owner: &'static str,
    name: &str,
    kind: ValueKind,
    config: FieldConfig,
) -> Result<FieldDescriptor, SchemaError> {
    check_name(owner, name)?;
    let target = config.target.unwrap_or(MappingTarget::Option);
    match &target {
        MappingTarget::Attribute if !kind.is_scalar() => {
            return Err(SchemaError::UnsupportedMapping {
                owner,
                field: name.to_string(),
                kind: kind.to_string(),
                target: "an attribute".to_string(),
            });
        }
        MappingTarget::Attribute if name == NAME_ATTR => {
            return Err(SchemaError::ReservedAttribute {
                owner,
                field: name.to_string(),
            });
        }
        MappingTarget::Tag(label) => {
            check_name(owner, label)?;
            if label == codec::OPTION_TAG {
                return Err(SchemaError::Collision {
                    owner,
                    field: name.to_string(),
                    other: "option-mapped fields".to_string(),
                    label: label.clone(),
                });
            }
        }
        _ => {}
    }

    let unsupported = |setting: &'static str, expected: &'static str| {
        SchemaError::UnsupportedCustomization {
            owner,
            field: name.to_string(),
            setting,
            expected,
        }
    };

    let style = if kind.is_collection() {
        let mut style = CollectionStyle::for_kind(&kind);
        if let Some(wrapper) = config.wrapper {
            style.wrapper = wrapper;
        }
        if let Some(entry) = config.entry {
            style.entry = entry;
        }
        let is_map = matches!(kind, ValueKind::Map(_, _));
        if !is_map
            && (config.key.is_some()
                || config.value.is_some()
                || config.key_form.is_some()
                || config.value_form.is_some())
        {
            return Err(unsupported("key/value layout", "map"));
        }
        if let ValueKind::Map(key_kind, value_kind) = &kind {
            if let Some(key) = config.key {
                style.key = key;
            }
            if let Some(value) = config.value {
                style.value = value;
            }
            if let Some(form) = config.key_form {
                if form == EntryForm::Attribute && !key_kind.is_scalar() {
                    return Err(SchemaError::UnsupportedMapping {
                        owner,
                        field: name.to_string(),
                        kind: key_kind.to_string(),
                        target: "an attribute key".to_string(),
                    });
                }
                style.key_form = form;
            }
            if let Some(form) = config.value_form {
                if form == EntryForm::Attribute && !value_kind.is_scalar() {
                    return Err(SchemaError::UnsupportedMapping {
                        owner,
                        field: name.to_string(),
                        kind: value_kind.to_string(),
                        target: "an attribute value".to_string(),
                    });
                }
                style.value_form = form;
            }
            if style.key == style.value {
                return Err(SchemaError::Collision {
                    owner,
                    field: name.to_string(),
                    other: "map key".to_string(),
                    label: style.value.clone(),
                });
            }
        }
        if let Some(wrapper) = &style.wrapper {
            check_name(owner, wrapper)?;
        }
        check_name(owner, &style.entry)?;
        check_name(owner, &style.key)?;
        check_name(owner, &style.value)?;
        Some(style)
    } else {
        if config.wrapper.is_some() || config.entry.is_some() {
            return Err(unsupported("wrapper/entry tags", "collection"));
        }
        if config.key.is_some()
            || config.value.is_some()
            || config.key_form.is_some()
            || config.value_form.is_some()
        {
            return Err(unsupported("key/value layout", "map"));
        }
        None
    };

    Ok(FieldDescriptor {
        name: name.to_string(),
        kind,
        target,
        style,
    })
}

fn cached<S: PersistentState>() -> Option<Arc<Schema<S>>> {
    let schemas = SCHEMAS.lock().unwrap_or_else(PoisonError::into_inner);
    let schema = schemas.get(&TypeId::of::<S>()).cloned()?;
    schema.downcast::<Schema<S>>().ok()
}

fn check_name(owner: &'static str, name: &str) -> Result<(), SchemaError> {
    if xml::is_valid_name(name) {
        Ok(())
    } else {
        Err(SchemaError::InvalidName {
            owner,
            name: name.to_string(),
        })
    }
}

fn check_collisions<S>(owner: &'static str, fields: &[Field<S>]) -> Result<(), SchemaError> {
    let mut names: Vec<&str> = Vec::new();
    let mut labels: Vec<(String, &str)> = Vec::new();
    for field in fields {
        let descriptor = &field.descriptor;
        if names.contains(&descriptor.name.as_str()) {
            return Err(SchemaError::DuplicateField {
                owner,
                field: descriptor.name.clone(),
            });
        }
        names.push(&descriptor.name);

        let label = match &descriptor.target {
            MappingTarget::Attribute => format!("@{}", descriptor.name),
            MappingTarget::Option => format!("option:{}", descriptor.name),
            MappingTarget::Tag(tag) => tag.clone(),
        };
        if let Some((_, other)) = labels.iter().find(|(existing, _)| *existing == label) {
            return Err(SchemaError::Collision {
                owner,
                field: descriptor.name.clone(),
                other: (*other).to_string(),
                label,
            });
        }
        labels.push((label, &descriptor.name));
    }
    Ok(())
}

pub(crate) fn validate_nested<S: PersistentState>(
    visited: &mut Vec<&'static str>,
) -> Result<(), SchemaError> {
    Schema::<S>::build_tracked(visited).map(|_| ())
}

/// 將巢狀狀態編碼為物件值。 / Encodes a nested state as an object value, skipping default fields.
pub fn encode_nested<S: PersistentState>(state: &S) -> Result<Value, CodecError> {
    let schema = Schema::<S>::shared().map_err(|err| CodecError::Schema {
        type_name: std::any::type_name::<S>(),
        reason: err.to_string(),
    })?;
    let baseline = S::default();
    let outcome = schema.to_tree(state, Some(&baseline));
    for issue in &outcome.issues {
        tracing::warn!(owner = schema.type_name(), %issue, "nested field not encoded");
    }
    Ok(Value::Object(outcome.value))
}

/// 從物件值還原巢狀狀態。 / Decodes a nested state from an object value.
pub fn decode_nested<S: PersistentState>(value: Value) -> Result<S, CodecError> {
    let element = value.expect_object()?;
    let schema = Schema::<S>::shared().map_err(|err| CodecError::Schema {
        type_name: std::any::type_name::<S>(),
        reason: err.to_string(),
    })?;
    let outcome = schema.from_tree(&element, S::default());
    for issue in &outcome.issues {
        tracing::warn!(owner = schema.type_name(), %issue, "nested field not decoded");
    }
    Ok(outcome.value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Editor {
        font: String,
        size: u32,
        cache: Vec<String>,
        tags: Vec<String>,
    }

    impl PersistentState for Editor {
        fn describe(schema: &mut SchemaBuilder<Self>) {
            schema.field("font", |s| &s.font, |s| &mut s.font).attribute();
            schema.field("size", |s| &s.size, |s| &mut s.size);
            schema.field("tags", |s| &s.tags, |s| &mut s.tags).entry("tag");
            schema.transient("cache");
        }
    }

    #[test]
    fn descriptors_follow_declaration_order() {
        let schema = Schema::<Editor>::build().unwrap();
        let names: Vec<_> = schema.fields().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["font", "size", "tags"]);
        assert_eq!(schema.transient_fields(), &["cache".to_string()]);

        let tags = schema.fields().nth(2).unwrap();
        let style = tags.style.as_ref().unwrap();
        assert_eq!(style.wrapper.as_deref(), Some("list"));
        assert_eq!(style.entry, "tag");
    }

    #[derive(Debug, Clone, Default)]
    struct BadAttribute {
        items: Vec<u32>,
    }

    impl PersistentState for BadAttribute {
        fn describe(schema: &mut SchemaBuilder<Self>) {
            schema.field("items", |s| &s.items, |s| &mut s.items).attribute();
        }
    }

    #[test]
    fn collections_cannot_be_attributes() {
        let err = Schema::<BadAttribute>::build().unwrap_err();
        assert!(matches!(err, SchemaError::UnsupportedMapping { ref field, .. } if field == "items"));
    }

    #[derive(Debug, Clone, Default)]
    struct Duplicated {
        a: u32,
        b: u32,
    }

    impl PersistentState for Duplicated {
        fn describe(schema: &mut SchemaBuilder<Self>) {
            schema.field("a", |s| &s.a, |s| &mut s.a).tag("value");
            schema.field("b", |s| &s.b, |s| &mut s.b).tag("value");
        }
    }

    #[test]
    fn colliding_tags_are_rejected() {
        assert!(matches!(
            Schema::<Duplicated>::build(),
            Err(SchemaError::Collision { .. })
        ));
    }

    #[derive(Debug, Clone, Default)]
    struct Customized {
        count: u32,
        names: IndexMap<String, String>,
    }

    impl PersistentState for Customized {
        fn describe(schema: &mut SchemaBuilder<Self>) {
            schema.field("count", |s| &s.count, |s| &mut s.count).entry("item");
            schema.field("names", |s| &s.names, |s| &mut s.names);
        }
    }

    #[test]
    fn scalar_fields_reject_collection_customization() {
        assert!(matches!(
            Schema::<Customized>::build(),
            Err(SchemaError::UnsupportedCustomization { ref field, .. }) if field == "count"
        ));
    }

    #[derive(Debug, Clone, Default)]
    struct Reserved {
        name: String,
    }

    impl PersistentState for Reserved {
        fn describe(schema: &mut SchemaBuilder<Self>) {
            schema.field("name", |s| &s.name, |s| &mut s.name).attribute();
        }
    }

    #[test]
    fn name_attribute_is_reserved() {
        assert!(matches!(
            Schema::<Reserved>::build(),
            Err(SchemaError::ReservedAttribute { .. })
        ));
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Node {
        label: String,
        children: Vec<Node>,
    }

    impl PersistentState for Node {
        const TAG: &'static str = "node";

        fn describe(schema: &mut SchemaBuilder<Self>) {
            schema.field("label", |s| &s.label, |s| &mut s.label).attribute();
            schema.field("children", |s| &s.children, |s| &mut s.children);
        }
    }

    crate::nested_value!(Node);

    #[test]
    fn recursive_types_validate() {
        let schema = Schema::<Node>::build().unwrap();
        let children = schema.fields().nth(1).unwrap();
        assert_eq!(children.style.as_ref().unwrap().entry, "node");
    }

    #[test]
    fn skip_default_fields() {
        let schema = Schema::<Editor>::build().unwrap();
        let baseline = Editor::default();
        let state = Editor {
            size: 14,
            ..Editor::default()
        };
        let outcome = schema.to_tree(&state, Some(&baseline));
        assert!(outcome.issues.is_empty());
        assert_eq!(outcome.value.attribute("font"), None);
        assert_eq!(outcome.value.children().len(), 1);
    }

    static POINT_DESCRIBED: std::sync::atomic::AtomicUsize = std::sync::atomic::AtomicUsize::new(0);

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Point {
        x: i32,
        y: i32,
    }

    impl PersistentState for Point {
        const TAG: &'static str = "point";

        fn describe(schema: &mut SchemaBuilder<Self>) {
            POINT_DESCRIBED.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            schema.field("x", |s| &s.x, |s| &mut s.x).attribute();
            schema.field("y", |s| &s.y, |s| &mut s.y).attribute();
        }
    }

    #[test]
    fn nested_schema_is_described_once() {
        let points: Vec<Point> = (0..5).map(|i| Point { x: i, y: -i }).collect();
        let mut decoded = Vec::new();
        for point in &points {
            let value = encode_nested(point).unwrap();
            decoded.push(decode_nested::<Point>(value).unwrap());
        }

        assert_eq!(decoded, points);
        assert_eq!(POINT_DESCRIBED.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(
            &Schema::<Point>::shared().unwrap(),
            &Schema::<Point>::shared().unwrap()
        ));
    }
}
