//! Type mapping between CQL column types, driver values and GraphQL values

pub mod codec;
pub mod kind;
pub mod scalars;
pub mod value;

pub use codec::{decode, encode, value_from_text};
pub use kind::{classify, ScalarKind, TypeKind};
pub use scalars::{register_custom_scalars, CUSTOM_SCALARS};
pub use value::{DbValue, Decimal, Varint};
