// crates/tool-relay-core/src/registry.rs
// ============================================================================
// Module: Tool Registry
// Description: Concurrent name-to-tool mapping with case-insensitive lookup.
// Purpose: Resolve tool names from request envelopes to tool handlers.
// Dependencies: std, thiserror, tracing
// ============================================================================

//! ## Overview
//! The registry is populated once at startup and read on every request.
//! Registration may race with the first requests, so storage sits behind a
//! [`RwLock`]; readers never observe a partially inserted entry.
//!
//! ## Invariants
//! - Keys are lower-cased tool names; lookups lower-case the query.
//! - The last registration for a name wins.
//! - Empty names are rejected so the degraded empty request never resolves.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;

use serde::Serialize;
use thiserror::Error;

use crate::tool::Tool;

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Name and description of a registered tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolSummary {
    /// Tool name as registered.
    pub name: String,
    /// Tool description.
    pub description: String,
}

/// Concurrent tool registry.
#[derive(Default)]
pub struct ToolRegistry {
    /// Tools keyed by lower-cased name.
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool, replacing any tool with the same name.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::EmptyName`] when the tool name is blank.
    pub fn register(&self, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        let name = tool.name().to_string();
        if name.trim().is_empty() {
            return Err(RegistryError::EmptyName);
        }
        let replaced = self
            .tools
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(registry_key(&name), tool);
        if let Some(previous) = replaced {
            tracing::warn!(
                tool = %name,
                replaced = previous.name(),
                "tool registration replaced an existing entry"
            );
        } else {
            tracing::debug!(tool = %name, "tool registered");
        }
        Ok(())
    }

    /// Resolves a tool by name, ignoring case.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().unwrap_or_else(PoisonError::into_inner).get(&registry_key(name)).cloned()
    }

    /// Returns a snapshot of registered tools, sorted by name.
    #[must_use]
    pub fn list(&self) -> Vec<ToolSummary> {
        let tools = self.tools.read().unwrap_or_else(PoisonError::into_inner);
        let mut entries: Vec<(&String, &Arc<dyn Tool>)> = tools.iter().collect();
        entries.sort_by(|left, right| left.0.cmp(right.0));
        entries
            .into_iter()
            .map(|(_, tool)| ToolSummary {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
            })
            .collect()
    }

    /// Returns the number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns true when no tools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Normalizes a tool name into its registry key.
fn registry_key(name: &str) -> String {
    name.to_lowercase()
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Tool registration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The tool reported a blank name.
    #[error("tool name must not be empty")]
    EmptyName,
}

// ============================================================================
// SECTION: Tests
// ============================================================================
