//! Ferrous Forward Application Layer
pub mod ports;
