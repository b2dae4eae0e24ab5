//! Memory management: the slab front end modules allocate from.
pub mod slab;
