//! Background work owned by a cache: the janitor that sweeps managed keys.

pub(crate) mod janitor;
