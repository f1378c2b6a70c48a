//! The user-facing cache handles: the callback-backed [`Cache`] and its
//! sibling [`ValueCache`] of plain values.

pub(crate) mod sync;
pub(crate) mod value;

pub use sync::Cache;
pub use value::ValueCache;
