//! # Makhzan Support
//!
//! Shared utilities and traits for the Makhzan DI framework.
//!
//! This crate provides:
//! - Text rendering for error messages
//! - Common utilities shared between makhzan crates

pub mod rendering;
