//! Turn orchestration
//!
//! A turn renders a prompt, calls the model and, for streamed replies,
//! routes to no tool, a local tool or a remote tool.

mod context;
mod dispatch;
mod pipeline;
mod prompt;
mod router;

pub use context::TurnContext;
pub use dispatch::{ToolDispatcher, ToolTarget};
pub use pipeline::{PipelineOptions, TurnPipeline, TurnReply};
pub use prompt::PromptTemplate;
pub use router::{BranchRouter, PeekBudget, Route};
