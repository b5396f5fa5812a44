//! Multi-type (union) value codec
//!
//! Many JavaScript API parameters accept "a string or a `MatchPattern`
//! object", "a tab id or an array of tab ids", and so on. On the host side
//! such a value is a Rust enum with one variant per accepted shape. Without
//! static type information on the wire, decoding has to find out which
//! variant a JSON value belongs to.
//!
//! # Decoding order
//!
//! Candidates are tried in a fixed priority order, computed once per type:
//!
//! | variant kind          | priority                 |
//! |-----------------------|--------------------------|
//! | boolean               | 0                        |
//! | integer, double       | 1                        |
//! | string-like           | 2                        |
//! | object                | 10                       |
//! | array of `T`          | 20 + priority of `T`     |
//!
//! Ties keep declaration order. The order decides which variant wins on
//! ambiguous data, so it must not change.
//!
//! For each candidate the JSON shape is checked first; string-like, object
//! and array candidates are then confirmed by a full decode, and a failed
//! decode simply moves on to the next candidate.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{OnceLock, PoisonError, RwLock};

use serde_json::Value as JsonValue;

use crate::protocol::error::{BridgeError, Result};

/// The wire shape a variant accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariantKind {
    Boolean,
    Integer,
    Double,
    /// Strings and string-subtype wrappers (wire enums, formatted strings).
    String,
    Object,
    Array(Box<VariantKind>),
}

impl VariantKind {
    pub fn array(element: VariantKind) -> Self {
        VariantKind::Array(Box::new(element))
    }

    /// Decode order of a variant; lower values are tried first, and arrays
    /// sort after every scalar and object form.
    pub fn priority(&self) -> u32 {
        match self {
            VariantKind::Boolean => 0,
            VariantKind::Integer | VariantKind::Double => 1,
            VariantKind::String => 2,
            VariantKind::Object => 10,
            VariantKind::Array(element) => 20 + element.priority(),
        }
    }

    /// Cheap shape test performed before any decode is attempted.
    pub fn accepts_shape(&self, value: &JsonValue) -> bool {
        match (self, value) {
            (VariantKind::Boolean, JsonValue::Bool(_)) => true,
            (VariantKind::Integer, JsonValue::Number(n)) => n.is_i64() || n.is_u64(),
            (VariantKind::Double, JsonValue::Number(_)) => true,
            (VariantKind::String, JsonValue::String(_)) => true,
            (VariantKind::Object, JsonValue::Object(_)) => true,
            (VariantKind::Array(_), JsonValue::Array(_)) => true,
            _ => false,
        }
    }
}

/// Names the JSON shape of a value, for error messages.
pub fn json_shape(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Object(_) => "object",
        JsonValue::Array(_) => "array",
    }
}

pub type VariantDecoder<T> = fn(&JsonValue) -> std::result::Result<T, serde_json::Error>;

/// One candidate shape of a multi-type value.
pub struct Variant<T> {
    pub name: &'static str,
    pub kind: VariantKind,
    decode: VariantDecoder<T>,
}

impl<T> std::fmt::Debug for Variant<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Variant")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

/// The variants of one multi-type, sorted into decoding order.
#[derive(Debug)]
pub struct VariantTable<T> {
    type_name: &'static str,
    variants: Vec<Variant<T>>,
}

impl<T> VariantTable<T> {
    pub fn builder(type_name: &'static str) -> VariantTableBuilder<T> {
        VariantTableBuilder {
            type_name,
            variants: Vec::new(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Variants in decoding order.
    pub fn variants(&self) -> &[Variant<T>] {
        &self.variants
    }

    /// Decodes `value` into the first variant that accepts it.
    ///
    /// Returns `Ok(None)` for JSON null.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::NoMatchingVariant` if every candidate rejects the value.
    pub fn decode(&self, value: &JsonValue) -> Result<Option<T>> {
        if value.is_null() {
            return Ok(None);
        }

        for variant in &self.variants {
            if !variant.kind.accepts_shape(value) {
                continue;
            }
            match (variant.decode)(value) {
                Ok(decoded) => return Ok(Some(decoded)),
                Err(e) => {
                    tracing::trace!("{}::{} rejected value: {}", self.type_name, variant.name, e);
                }
            }
        }

        Err(BridgeError::NoMatchingVariant {
            type_name: self.type_name,
            shape: json_shape(value),
        })
    }
}

pub struct VariantTableBuilder<T> {
    type_name: &'static str,
    variants: Vec<Variant<T>>,
}

impl<T> VariantTableBuilder<T> {
    pub fn variant(mut self, name: &'static str, kind: VariantKind, decode: VariantDecoder<T>) -> Self {
        self.variants.push(Variant { name, kind, decode });
        self
    }

    pub fn build(mut self) -> VariantTable<T> {
        // stable: equal priorities keep declaration order
        self.variants.sort_by_key(|variant| variant.kind.priority());
        VariantTable {
            type_name: self.type_name,
            variants: self.variants,
        }
    }
}

/// A host type whose wire value may take one of several shapes.
///
/// Usually implemented through [`multi_type!`](crate::multi_type).
pub trait MultiType: Sized + 'static {
    /// Declares the variants. Called once per process by [`MultiTypeCodec`].
    fn variant_table() -> VariantTable<Self>;

    /// Serializes whichever variant is populated.
    fn encode(&self) -> Result<JsonValue>;
}

static VARIANT_TABLES: OnceLock<RwLock<HashMap<TypeId, &'static (dyn Any + Send + Sync)>>> =
    OnceLock::new();

pub struct MultiTypeCodec;

impl MultiTypeCodec {
    /// Returns the cached variant table of `T`, building it on first use.
    pub fn table<T: MultiType>() -> &'static VariantTable<T> {
        let tables = VARIANT_TABLES.get_or_init(Default::default);
        let key = TypeId::of::<T>();

        let cached = tables.read().unwrap_or_else(PoisonError::into_inner).get(&key).copied();
        let table = match cached {
            Some(table) => table,
            None => {
                let mut tables = tables.write().unwrap_or_else(PoisonError::into_inner);
                *tables.entry(key).or_insert_with(|| {
                    let table = T::variant_table();
                    tracing::debug!(
                        "Built variant table for {} ({} variants)",
                        table.type_name(),
                        table.variants().len()
                    );
                    let table: &'static (dyn Any + Send + Sync) = Box::leak(Box::new(table));
                    table
                })
            }
        };

        match table.downcast_ref::<VariantTable<T>>() {
            Some(table) => table,
            None => unreachable!("variant table cached under a foreign TypeId"),
        }
    }

    pub fn decode<T: MultiType>(value: &JsonValue) -> Result<Option<T>> {
        Self::table::<T>().decode(value)
    }

    pub fn encode<T: MultiType>(value: &T) -> Result<JsonValue> {
        value.encode()
    }
}

/// Turns a variant kind spelled `boolean`, `integer`, `double`, `string`,
/// `object` or `array(<kind>)` into a [`VariantKind`].
#[macro_export]
macro_rules! variant_kind {
    (boolean) => { $crate::codec::VariantKind::Boolean };
    (integer) => { $crate::codec::VariantKind::Integer };
    (double) => { $crate::codec::VariantKind::Double };
    (string) => { $crate::codec::VariantKind::String };
    (object) => { $crate::codec::VariantKind::Object };
    (array($($element:tt)+)) => { $crate::codec::VariantKind::array($crate::variant_kind!($($element)+)) };
}

/// Declares a [`MultiType`] enum with serde impls that go through [`MultiTypeCodec`].
///
/// ```
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// pub struct Restricted { pub pattern: String }
///
/// jsbind_common::multi_type! {
///     pub enum MatchPattern {
///         Text(String) => string,
///         Restricted(Restricted) => object,
///         Many(Vec<String>) => array(string),
///     }
/// }
///
/// let decoded: MatchPattern = serde_json::from_str("[\"<all_urls>\"]").unwrap();
/// assert_eq!(decoded, MatchPattern::Many(vec!["<all_urls>".into()]));
/// ```
#[macro_export]
macro_rules! multi_type {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $( $(#[$variant_meta:meta])* $variant:ident($ty:ty) => $kind:ident $(($($element:tt)+))? ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq)]
        $vis enum $name {
            $( $(#[$variant_meta])* $variant($ty) ),+
        }

        impl $crate::codec::MultiType for $name {
            fn variant_table() -> $crate::codec::VariantTable<Self> {
                $crate::codec::VariantTable::builder(stringify!($name))
                    $(
                        .variant(
                            stringify!($variant),
                            $crate::variant_kind!($kind $(($($element)+))?),
                            |value| <$ty as $crate::__private::serde::Deserialize>::deserialize(value).map($name::$variant),
                        )
                    )+
                    .build()
            }

            fn encode(&self) -> $crate::Result<$crate::__private::serde_json::Value> {
                match self {
                    $( $name::$variant(inner) => ::std::result::Result::Ok($crate::__private::serde_json::to_value(inner)?), )+
                }
            }
        }

        impl $crate::__private::serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> ::std::result::Result<S::Ok, S::Error>
            where
                S: $crate::__private::serde::Serializer,
            {
                match self {
                    $( $name::$variant(inner) => $crate::__private::serde::Serialize::serialize(inner, serializer), )+
                }
            }
        }

        impl<'de> $crate::__private::serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> ::std::result::Result<Self, D::Error>
            where
                D: $crate::__private::serde::Deserializer<'de>,
            {
                use $crate::__private::serde::de::Error as _;
                let value = <$crate::__private::serde_json::Value as $crate::__private::serde::Deserialize>::deserialize(deserializer)?;
                match $crate::codec::MultiTypeCodec::decode::<$name>(&value) {
                    ::std::result::Result::Ok(::std::option::Option::Some(decoded)) => ::std::result::Result::Ok(decoded),
                    ::std::result::Result::Ok(::std::option::Option::None) => ::std::result::Result::Err(
                        D::Error::custom(concat!("expected a value for ", stringify!($name), ", found null")),
                    ),
                    ::std::result::Result::Err(e) => ::std::result::Result::Err(D::Error::custom(e)),
                }
            }
        }
    };
}
