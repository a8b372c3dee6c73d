//! Dashboard modules for aegis

pub mod operations;
