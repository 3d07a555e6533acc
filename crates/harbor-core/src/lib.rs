//! Harbor core library
//!
//! Plugin resolution, compatibility filtering and installation for the
//! Containership plugin directory.

pub mod config;
pub mod paths;
pub mod plugins;
