//! Built-in tool implementations for Veilwright.
//!
//! Tools give the narrator mechanical teeth: dice rolls whose outcomes the
//! model must honor instead of invent. World modules can register their own
//! tools on top of the defaults.

pub mod dice;

pub use dice::{RollD6Tool, RollDiceTool};

use veilwright_core::tool::ToolRegistry;

/// Create a default tool registry with all built-in tools.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(dice::RollD6Tool::new()));
    registry.register(Box::new(dice::RollDiceTool::new()));
    registry
}
