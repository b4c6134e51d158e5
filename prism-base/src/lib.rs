//! Lowest level crate of `prism`. Includes alignment and size helpers used when translating
//! resource descriptors into native allocations

pub mod memory;
