//! Shopsession Core - Shared types library.
//!
//! This crate provides common types used across all shopsession components:
//! - `client` - Cart, authenticated session, and checkout orchestration
//! - `cli` - Terminal driver for the client library
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no storage access,
//! no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, money totals, emails, and statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
