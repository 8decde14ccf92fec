//! Built-in tool implementations for Nebula.
//!
//! One tool is in scope for this assistant: fetching the text of a job
//! posting URL so the model can evaluate it against the user's
//! background. The registry dispatches any number of tools, so adding
//! more is a matter of registering them here.

pub mod fetch;

use nebula_config::AppConfig;
use nebula_core::tool::ToolRegistry;

pub use fetch::FetchJobDescriptionTool;

/// Create the default tool registry with all built-in tools.
pub fn default_registry(config: &AppConfig) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(FetchJobDescriptionTool::from_config(config)));
    registry
}
