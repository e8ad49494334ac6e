//! Warden - policy-driven access control
//!
//! This library provides the enforcement engine, its persistence adapters and
//! configuration. It exposes all modules for testing purposes.

pub mod authz;
pub mod entities;
pub mod settings;
pub mod storage;
