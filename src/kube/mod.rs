/*!
kubectl dispatch layer.

  request.rs   ToolName / ResourceKind / ToolRequest (wire -> typed)
  runner.rs    CommandRunner capability + tokio::process implementation
  dispatch.rs  Dispatcher: ToolRequest -> Invocation -> ToolResult

Per-request errors that are detected before any subprocess is spawned are
`DispatchError`s. Everything kubectl itself reports (including failing to
start it) becomes a `ToolResult::Failure` instead.
*/

pub mod dispatch;
pub mod request;
pub mod runner;

pub use dispatch::{Dispatcher, ToolResult};
pub use request::ToolName;
pub use runner::{CommandRunner, KubectlRunner};

/// Rejections raised before a subprocess is spawned.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("invalid argument '{param}': {reason}")]
    InvalidArgument { param: &'static str, reason: String },
}
