//! Typed values and the kinds they map to.
//!
//! Every persistable field type implements [`Persist`], which converts it to
//! and from a format-neutral [`Value`]. The codec then lays a [`Value`] out in
//! a [`StateTree`] according to the field's [`FieldDescriptor`](crate::FieldDescriptor).

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::Hash;

use indexmap::{IndexMap, IndexSet};

use crate::codec::CodecError;
use crate::schema::{PersistentState, SchemaError};
use crate::tree::StateTree;

/// 值的種類，於註冊時由型別推導。 / Value kind, derived from a field's type at registration.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueKind {
    Number,
    Boolean,
    String,
    Enum,
    Sequence(Box<ValueKind>),
    Set(Box<ValueKind>),
    Map(Box<ValueKind>, Box<ValueKind>),
    Nested(NestedType),
    Opaque,
}

impl ValueKind {
    /// 是否可表示為單一文字。 / Whether the kind is represented by a single text value.
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            ValueKind::Number | ValueKind::Boolean | ValueKind::String | ValueKind::Enum
        )
    }

    pub fn is_collection(&self) -> bool {
        matches!(
            self,
            ValueKind::Sequence(_) | ValueKind::Set(_) | ValueKind::Map(_, _)
        )
    }

    /// Validates every nested object type reachable from this kind.
    pub(crate) fn validate_nested(&self, visited: &mut Vec<&'static str>) -> Result<(), SchemaError> {
        match self {
            ValueKind::Sequence(inner) | ValueKind::Set(inner) => inner.validate_nested(visited),
            ValueKind::Map(key, value) => {
                key.validate_nested(visited)?;
                value.validate_nested(visited)
            }
            ValueKind::Nested(nested) => {
                if visited.contains(&nested.type_name) {
                    return Ok(());
                }
                visited.push(nested.type_name);
                (nested.validate)(visited)
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Number => write!(f, "number"),
            ValueKind::Boolean => write!(f, "boolean"),
            ValueKind::String => write!(f, "string"),
            ValueKind::Enum => write!(f, "enum"),
            ValueKind::Sequence(inner) => write!(f, "sequence<{inner}>"),
            ValueKind::Set(inner) => write!(f, "set<{inner}>"),
            ValueKind::Map(key, value) => write!(f, "map<{key}, {value}>"),
            ValueKind::Nested(nested) => write!(f, "object <{}>", nested.tag),
            ValueKind::Opaque => write!(f, "tree"),
        }
    }
}

/// 巢狀物件型別的中繼資料。 / Metadata of a nested object type.
#[derive(Clone, Copy)]
pub struct NestedType {
    pub tag: &'static str,
    pub type_name: &'static str,
    validate: fn(&mut Vec<&'static str>) -> Result<(), SchemaError>,
}

impl NestedType {
    pub fn of<S: PersistentState>() -> Self {
        Self {
            tag: S::TAG,
            type_name: std::any::type_name::<S>(),
            validate: crate::schema::validate_nested::<S>,
        }
    }
}

impl fmt::Debug for NestedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NestedType")
            .field("tag", &self.tag)
            .field("type_name", &self.type_name)
            .finish()
    }
}

impl PartialEq for NestedType {
    fn eq(&self, other: &Self) -> bool {
        self.tag == other.tag && self.type_name == other.type_name
    }
}

/// Format-neutral value exchanged between typed fields and the codec.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(String),
    Bool(bool),
    Text(String),
    Enum(String),
    Sequence(Vec<Value>),
    Set(Vec<Value>),
    Map(Vec<(Value, Value)>),
    /// Encoded nested object; the tree is labeled with the object's tag.
    Object(StateTree),
    Tree(StateTree),
}

impl Value {
    /// 純量的文字表示。 / Text form of a scalar value; `None` for composites.
    pub fn scalar_text(&self) -> Option<String> {
        match self {
            Value::Number(text) | Value::Text(text) | Value::Enum(text) => Some(text.clone()),
            Value::Bool(flag) => Some(flag.to_string()),
            _ => None,
        }
    }

    /// 依種類解析純量文字。 / Parses scalar text according to the declared kind.
    pub fn from_text(kind: &ValueKind, text: &str) -> Result<Value, CodecError> {
        match kind {
            ValueKind::Number => Ok(Value::Number(text.to_string())),
            ValueKind::Boolean => {
                if text.eq_ignore_ascii_case("true") {
                    Ok(Value::Bool(true))
                } else if text.eq_ignore_ascii_case("false") {
                    Ok(Value::Bool(false))
                } else {
                    Err(CodecError::InvalidScalar {
                        kind: "boolean",
                        text: text.to_string(),
                        reason: "expected `true` or `false`".to_string(),
                    })
                }
            }
            ValueKind::String => Ok(Value::Text(text.to_string())),
            ValueKind::Enum => Ok(Value::Enum(text.to_string())),
            other => Err(CodecError::Mismatch {
                expected: other.to_string(),
                found: "text".to_string(),
            }),
        }
    }

    /// 檢查值的形狀是否符合宣告的種類。 / Checks that the value's shape matches the declared kind.
    pub fn conforms_to(&self, kind: &ValueKind) -> bool {
        match (self, kind) {
            (Value::Number(_), ValueKind::Number)
            | (Value::Bool(_), ValueKind::Boolean)
            | (Value::Text(_), ValueKind::String)
            | (Value::Enum(_), ValueKind::Enum)
            | (Value::Tree(_), ValueKind::Opaque) => true,
            (Value::Object(tree), ValueKind::Nested(nested)) => tree.name() == nested.tag,
            (Value::Sequence(items), ValueKind::Sequence(inner))
            | (Value::Set(items), ValueKind::Set(inner)) => {
                items.iter().all(|item| item.conforms_to(inner))
            }
            (Value::Map(entries), ValueKind::Map(key, value)) => entries
                .iter()
                .all(|(k, v)| k.conforms_to(key) && v.conforms_to(value)),
            _ => false,
        }
    }

    pub fn shape(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Bool(_) => "boolean",
            Value::Text(_) => "string",
            Value::Enum(_) => "enum",
            Value::Sequence(_) => "sequence",
            Value::Set(_) => "set",
            Value::Map(_) => "map",
            Value::Object(_) => "object",
            Value::Tree(_) => "tree",
        }
    }

    fn mismatch(self, expected: &str) -> CodecError {
        CodecError::Mismatch {
            expected: expected.to_string(),
            found: self.shape().to_string(),
        }
    }

    pub fn expect_number(self) -> Result<String, CodecError> {
        match self {
            Value::Number(text) => Ok(text),
            other => Err(other.mismatch("number")),
        }
    }

    pub fn expect_bool(self) -> Result<bool, CodecError> {
        match self {
            Value::Bool(flag) => Ok(flag),
            other => Err(other.mismatch("boolean")),
        }
    }

    pub fn expect_text(self) -> Result<String, CodecError> {
        match self {
            Value::Text(text) => Ok(text),
            other => Err(other.mismatch("string")),
        }
    }

    pub fn expect_enum(self) -> Result<String, CodecError> {
        match self {
            Value::Enum(name) => Ok(name),
            other => Err(other.mismatch("enum")),
        }
    }

    pub fn expect_sequence(self) -> Result<Vec<Value>, CodecError> {
        match self {
            Value::Sequence(items) => Ok(items),
            other => Err(other.mismatch("sequence")),
        }
    }

    pub fn expect_set(self) -> Result<Vec<Value>, CodecError> {
        match self {
            Value::Set(items) => Ok(items),
            other => Err(other.mismatch("set")),
        }
    }

    pub fn expect_map(self) -> Result<Vec<(Value, Value)>, CodecError> {
        match self {
            Value::Map(entries) => Ok(entries),
            other => Err(other.mismatch("map")),
        }
    }

    pub fn expect_object(self) -> Result<StateTree, CodecError> {
        match self {
            Value::Object(tree) => Ok(tree),
            other => Err(other.mismatch("object")),
        }
    }

    pub fn expect_tree(self) -> Result<StateTree, CodecError> {
        match self {
            Value::Tree(tree) => Ok(tree),
            other => Err(other.mismatch("tree")),
        }
    }
}

/// 可持久化的欄位型別。 / A field type the codec knows how to persist.
///
/// Implemented for numbers, `bool`, `String`, ordered/unordered collections,
/// maps and raw [`StateTree`]s. Use [`enum_value!`](crate::enum_value) for
/// unit-only enums and [`nested_value!`](crate::nested_value) for nested
/// [`PersistentState`] types.
pub trait Persist: Sized + Clone + PartialEq + 'static {
    fn kind() -> ValueKind;

    fn to_value(&self) -> Result<Value, CodecError>;

    fn from_value(value: Value) -> Result<Self, CodecError>;

    /// Equality used by the default-state differ.
    fn same_as(&self, other: &Self) -> bool {
        self == other
    }
}

macro_rules! number_value {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl Persist for $ty {
                fn kind() -> ValueKind {
                    ValueKind::Number
                }

                fn to_value(&self) -> Result<Value, CodecError> {
                    Ok(Value::Number(self.to_string()))
                }

                fn from_value(value: Value) -> Result<Self, CodecError> {
                    let text = value.expect_number()?;
                    let parsed = text.trim().parse::<$ty>();
                    parsed.map_err(|err| CodecError::InvalidScalar {
                        kind: stringify!($ty),
                        text,
                        reason: err.to_string(),
                    })
                }
            }
        )+
    };
}

number_value!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64);

impl Persist for bool {
    fn kind() -> ValueKind {
        ValueKind::Boolean
    }

    fn to_value(&self) -> Result<Value, CodecError> {
        Ok(Value::Bool(*self))
    }

    fn from_value(value: Value) -> Result<Self, CodecError> {
        value.expect_bool()
    }
}

impl Persist for String {
    fn kind() -> ValueKind {
        ValueKind::String
    }

    fn to_value(&self) -> Result<Value, CodecError> {
        Ok(Value::Text(self.clone()))
    }

    fn from_value(value: Value) -> Result<Self, CodecError> {
        value.expect_text()
    }
}

impl Persist for StateTree {
    fn kind() -> ValueKind {
        ValueKind::Opaque
    }

    fn to_value(&self) -> Result<Value, CodecError> {
        Ok(Value::Tree(self.clone()))
    }

    fn from_value(value: Value) -> Result<Self, CodecError> {
        value.expect_tree()
    }
}

impl<T: Persist> Persist for Vec<T> {
    fn kind() -> ValueKind {
        ValueKind::Sequence(Box::new(T::kind()))
    }

    fn to_value(&self) -> Result<Value, CodecError> {
        let items = self.iter().map(Persist::to_value).collect::<Result<_, _>>()?;
        Ok(Value::Sequence(items))
    }

    fn from_value(value: Value) -> Result<Self, CodecError> {
        value
            .expect_sequence()?
            .into_iter()
            .map(T::from_value)
            .collect()
    }

    fn same_as(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().zip(other).all(|(a, b)| a.same_as(b))
    }
}

impl<T: Persist + Ord> Persist for BTreeSet<T> {
    fn kind() -> ValueKind {
        ValueKind::Set(Box::new(T::kind()))
    }

    fn to_value(&self) -> Result<Value, CodecError> {
        let items = self.iter().map(Persist::to_value).collect::<Result<_, _>>()?;
        Ok(Value::Set(items))
    }

    fn from_value(value: Value) -> Result<Self, CodecError> {
        value.expect_set()?.into_iter().map(T::from_value).collect()
    }
}

impl<T: Persist + Hash + Eq> Persist for IndexSet<T> {
    fn kind() -> ValueKind {
        ValueKind::Set(Box::new(T::kind()))
    }

    fn to_value(&self) -> Result<Value, CodecError> {
        let items = self.iter().map(Persist::to_value).collect::<Result<_, _>>()?;
        Ok(Value::Set(items))
    }

    fn from_value(value: Value) -> Result<Self, CodecError> {
        value.expect_set()?.into_iter().map(T::from_value).collect()
    }
}

impl<K: Persist + Hash + Eq, V: Persist> Persist for IndexMap<K, V> {
    fn kind() -> ValueKind {
        ValueKind::Map(Box::new(K::kind()), Box::new(V::kind()))
    }

    fn to_value(&self) -> Result<Value, CodecError> {
        let entries = self
            .iter()
            .map(|(key, value)| Ok((key.to_value()?, value.to_value()?)))
            .collect::<Result<_, CodecError>>()?;
        Ok(Value::Map(entries))
    }

    fn from_value(value: Value) -> Result<Self, CodecError> {
        value
            .expect_map()?
            .into_iter()
            .map(|(key, value)| Ok((K::from_value(key)?, V::from_value(value)?)))
            .collect()
    }

    // Insertion order is part of the persisted form, so it takes part in equality.
    fn same_as(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .zip(other)
                .all(|((ka, va), (kb, vb))| ka.same_as(kb) && va.same_as(vb))
    }
}

impl<K: Persist + Ord, V: Persist> Persist for BTreeMap<K, V> {
    fn kind() -> ValueKind {
        ValueKind::Map(Box::new(K::kind()), Box::new(V::kind()))
    }

    fn to_value(&self) -> Result<Value, CodecError> {
        let entries = self
            .iter()
            .map(|(key, value)| Ok((key.to_value()?, value.to_value()?)))
            .collect::<Result<_, CodecError>>()?;
        Ok(Value::Map(entries))
    }

    fn from_value(value: Value) -> Result<Self, CodecError> {
        value
            .expect_map()?
            .into_iter()
            .map(|(key, value)| Ok((K::from_value(key)?, V::from_value(value)?)))
            .collect()
    }

    fn same_as(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .zip(other)
                .all(|((ka, va), (kb, vb))| ka.same_as(kb) && va.same_as(vb))
    }
}

/// 為僅含單元變體的列舉實作 [`Persist`]。 / Implements [`Persist`] for a unit-only enum.
///
/// Variants are persisted by their declared name, so reordering variants
/// never changes stored files.
///
/// ```ignore
/// #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// enum Wrap { #[default] None, Soft, Hard }
/// statekeep_core::enum_value!(Wrap { None, Soft, Hard });
/// ```
#[macro_export]
macro_rules! enum_value {
    ($ty:ty { $($variant:ident),+ $(,)? }) => {
        impl $crate::Persist for $ty {
            fn kind() -> $crate::ValueKind {
                $crate::ValueKind::Enum
            }

            fn to_value(&self) -> ::std::result::Result<$crate::Value, $crate::CodecError> {
                let name = match self {
                    $(Self::$variant => stringify!($variant),)+
                };
                Ok($crate::Value::Enum(name.to_string()))
            }

            fn from_value(
                value: $crate::Value,
            ) -> ::std::result::Result<Self, $crate::CodecError> {
                let name = value.expect_enum()?;
                match name.as_str() {
                    $(stringify!($variant) => Ok(Self::$variant),)+
                    _ => Err($crate::CodecError::UnknownVariant {
                        type_name: stringify!($ty),
                        name,
                    }),
                }
            }
        }
    };
}

/// 讓 [`PersistentState`] 型別可作為巢狀欄位。 / Lets a [`PersistentState`] type be used as a nested field.
#[macro_export]
macro_rules! nested_value {
    ($ty:ty) => {
        impl $crate::Persist for $ty {
            fn kind() -> $crate::ValueKind {
                $crate::ValueKind::Nested($crate::NestedType::of::<Self>())
            }

            fn to_value(&self) -> ::std::result::Result<$crate::Value, $crate::CodecError> {
                $crate::schema::encode_nested(self)
            }

            fn from_value(
                value: $crate::Value,
            ) -> ::std::result::Result<Self, $crate::CodecError> {
                $crate::schema::decode_nested(value)
            }
        }
    };
}
