// crates/tool-relay-config/src/lib.rs
// ============================================================================
// Module: Tool Relay Config Library
// Description: Canonical config model and validation.
// Purpose: Single source of truth for tool-relay.toml semantics.
// Dependencies: serde, toml, thiserror
// ============================================================================

//! ## Overview
//! `tool-relay-config` defines the configuration model for the relay server
//! and its built-in tools. It provides strict, fail-closed validation with
//! defaults that match a local development deployment.
//!
//! Security posture: config inputs are untrusted and validated on load.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
