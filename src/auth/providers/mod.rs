//! Identity-provider backends.

pub mod microsoft;
