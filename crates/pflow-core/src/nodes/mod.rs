//! Built-in node types. Everything beyond these (HTTP, LLM agent calls,
//! cron/webhook triggers, connectors to mail/FTP/SSH/RSS/SQL, encryption,
//! the visual editor) is out of scope for this engine. A real deployment
//! registers its own [`crate::registry::NodeFactory`] implementations for
//! those the same way these are registered here.

pub mod set;
pub mod shell;
pub mod switch;

use crate::registry::NodeRegistry;

/// Registers every built-in node type. Embedders extend this by calling
/// [`NodeRegistry::register`] with their own factories afterward.
pub fn register_builtins(registry: &mut NodeRegistry) {
    registry.register("shell", Box::new(shell::ShellFactory));
    registry.register("set", Box::new(set::SetFactory));
    registry.register("switch", Box::new(switch::SwitchFactory));
}
