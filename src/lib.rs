//! Keyway - multi-factor keyless vehicle access platform
//!
//! This library provides the core functionality for the Keyway platform:
//! user and booking management, the three-factor authentication session
//! protocol (face, short-range radio, tap credential), the REST surface the
//! phone app and vehicles talk to, and the device-side protocol components.

pub mod api;
pub mod config;
pub mod db;
pub mod device;
pub mod models;
pub mod services;
