//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the crate:
//! - Math types for normal and point computations
//! - Content hashing for topology and primvar sharing
//! - Logging and invariant verification

pub mod math;
pub mod hash;
pub mod logging;
pub mod diagnostics;
