//! Ferrous Forward Infrastructure Layer
pub mod dns;
