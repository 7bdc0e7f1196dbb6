pub mod provider;
pub mod schema;
pub mod tool;

pub use provider::{ChatMessage, ChatRequest, ChatResponse, Provider, Role, ToolCall};
pub use schema::{ArgumentSchema, ParamKind, ParamSpec};
pub use tool::{Tool, ToolSpec};
