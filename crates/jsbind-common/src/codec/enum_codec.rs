//! Enum <-> wire string literal codec
//!
//! JavaScript APIs model enumerations as plain strings (`"normal"`,
//! `"browser_update"`, ...). A [`WireEnum`] declares, once and statically, the
//! member list of a Rust enum together with the literal each member uses on
//! the wire. [`EnumCodec`] turns that declaration into a mapping table the
//! first time the type is used and keeps it for the rest of the process.
//!
//! Enums are usually declared through [`wire_enum!`](crate::wire_enum), which
//! also derives serde impls that go through the codec.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{OnceLock, PoisonError, RwLock};

use crate::protocol::error::{BridgeError, Result};

/// One symbolic name / wire literal pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnumMapping {
    pub symbolic_name: &'static str,
    pub wire_value: &'static str,
}

/// A closed set of symbolic members with their wire literals.
///
/// A member without an explicit literal uses its symbolic name on the wire.
pub trait WireEnum: Copy + PartialEq + 'static {
    const TYPE_NAME: &'static str;

    /// `(member, symbolic name, explicit wire literal)` for every member.
    const MEMBERS: &'static [(Self, &'static str, Option<&'static str>)];
}

static ENUM_TABLES: OnceLock<RwLock<HashMap<TypeId, &'static [EnumMapping]>>> = OnceLock::new();

/// Process-wide, read-mostly codec for every [`WireEnum`].
pub struct EnumCodec;

impl EnumCodec {
    /// Returns the mapping table of `T`, building it on first use.
    pub fn mappings<T: WireEnum>() -> &'static [EnumMapping] {
        let tables = ENUM_TABLES.get_or_init(Default::default);
        let key = TypeId::of::<T>();

        let cached = tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .copied();
        if let Some(table) = cached {
            return table;
        }

        let mut tables = tables.write().unwrap_or_else(PoisonError::into_inner);
        *tables.entry(key).or_insert_with(|| {
            tracing::debug!("Building enum mapping table for {}", T::TYPE_NAME);
            Box::leak(build_table::<T>().into_boxed_slice())
        })
    }

    /// Decodes a wire literal into its member.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::UnknownEnumLiteral` if no member uses `literal`.
    pub fn decode<T: WireEnum>(literal: &str) -> Result<T> {
        let symbolic_name = Self::mappings::<T>()
            .iter()
            .find(|mapping| mapping.wire_value == literal)
            .map(|mapping| mapping.symbolic_name)
            .ok_or_else(|| BridgeError::UnknownEnumLiteral {
                literal: literal.to_string(),
                type_name: T::TYPE_NAME,
            })?;

        T::MEMBERS
            .iter()
            .find(|(_, name, _)| *name == symbolic_name)
            .map(|(member, _, _)| *member)
            .ok_or_else(|| BridgeError::UnknownEnumLiteral {
                literal: literal.to_string(),
                type_name: T::TYPE_NAME,
            })
    }

    /// Encodes a member as its wire literal.
    ///
    /// # Panics
    ///
    /// Panics if `T::MEMBERS` does not list `value`. That can only happen when
    /// the enum declaration and its member table disagree, which is a bug in
    /// the declaration rather than bad data.
    pub fn encode<T: WireEnum>(value: T) -> &'static str {
        let symbolic_name = T::MEMBERS
            .iter()
            .find(|(member, _, _)| *member == value)
            .map(|(_, name, _)| *name);

        symbolic_name
            .and_then(|name| {
                Self::mappings::<T>()
                    .iter()
                    .find(|mapping| mapping.symbolic_name == name)
            })
            .map(|mapping| mapping.wire_value)
            .unwrap_or_else(|| panic!("{} has a member without a wire mapping", T::TYPE_NAME))
    }
}

fn build_table<T: WireEnum>() -> Vec<EnumMapping> {
    let mut table: Vec<EnumMapping> = Vec::with_capacity(T::MEMBERS.len());
    for &(_, symbolic_name, wire_value) in T::MEMBERS {
        let mapping = EnumMapping {
            symbolic_name,
            wire_value: wire_value.unwrap_or(symbolic_name),
        };
        let duplicate = table
            .iter()
            .any(|m| m.wire_value == mapping.wire_value || m.symbolic_name == mapping.symbolic_name);
        if duplicate {
            panic!(
                "{} maps '{}' -> '{}' more than once",
                T::TYPE_NAME,
                mapping.symbolic_name,
                mapping.wire_value
            );
        }
        table.push(mapping);
    }
    table
}

/// Declares a [`WireEnum`] together with serde impls that use [`EnumCodec`].
///
/// ```
/// jsbind_common::wire_enum! {
///     /// The type of window.
///     pub enum WindowType {
///         Normal = "normal",
///         Popup = "popup",
///         Devtools = "devtools",
///     }
/// }
///
/// assert_eq!(serde_json::to_string(&WindowType::Popup).unwrap(), "\"popup\"");
/// ```
#[macro_export]
macro_rules! wire_enum {
    (@wire) => { ::std::option::Option::None };
    (@wire $wire:literal) => { ::std::option::Option::Some($wire) };
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $( $(#[$member_meta:meta])* $member:ident $(= $wire:literal)? ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $( $(#[$member_meta])* $member ),+
        }

        impl $crate::codec::WireEnum for $name {
            const TYPE_NAME: &'static str = stringify!($name);
            const MEMBERS: &'static [($name, &'static str, ::std::option::Option<&'static str>)] = &[
                $( ($name::$member, stringify!($member), $crate::wire_enum!(@wire $($wire)?)) ),+
            ];
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str($crate::codec::EnumCodec::encode(*self))
            }
        }

        impl $crate::__private::serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> ::std::result::Result<S::Ok, S::Error>
            where
                S: $crate::__private::serde::Serializer,
            {
                serializer.serialize_str($crate::codec::EnumCodec::encode(*self))
            }
        }

        impl<'de> $crate::__private::serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> ::std::result::Result<Self, D::Error>
            where
                D: $crate::__private::serde::Deserializer<'de>,
            {
                let literal = <::std::string::String as $crate::__private::serde::Deserialize>::deserialize(deserializer)?;
                $crate::codec::EnumCodec::decode::<$name>(&literal)
                    .map_err(<D::Error as $crate::__private::serde::de::Error>::custom)
            }
        }
    };
}
