//! Value codecs for loosely typed JavaScript values
//!
//! - [`EnumCodec`]: enum members <-> wire string literals
//! - [`MultiTypeCodec`]: union values resolved by a fixed shape priority

pub mod enum_codec;
pub mod multi_type;

pub use enum_codec::{EnumCodec, EnumMapping, WireEnum};
pub use multi_type::{
    json_shape, MultiType, MultiTypeCodec, Variant, VariantDecoder, VariantKind, VariantTable,
    VariantTableBuilder,
};
