pub mod loop_;
pub mod registry;
pub mod session;

pub use loop_::{AgentLoop, Exchange, FinishReason};
pub use registry::{ReasoningStep, ToolCallResult, ToolRegistry};
pub use session::Session;
