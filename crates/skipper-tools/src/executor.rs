use crate::error::ToolError;
use async_trait::async_trait;
use skipper_types::{ToolInvocation, ToolOutput};

/// Executes one named tool invocation.
///
/// Business-level failures (unknown tool, slot already taken) come back as
/// `Ok(ToolOutput::Error(..))` or a result text the model can read. `Err` is
/// reserved for faults the caller should log and replace with a generic
/// error output.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, invocation: &ToolInvocation) -> Result<ToolOutput, ToolError>;
}
