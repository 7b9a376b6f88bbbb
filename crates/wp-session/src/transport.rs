//! The `Transport` trait boundary: everything specific to a
//! concrete agent runtime (Claude SDK, a bare CLI process, Gemini, ...)
//! lives behind this trait. The engine never talks to a transport directly
//! outside a [`crate::StepSession`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use wp_domain::{Result, RoutingSignal};

/// What a transport can do. A CLI wrapper with no native JSON mode reports
/// `output_format: false`, which forces the extractor microloop to carry
/// finalize/route instead of trusting the transport's own structured reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportCapabilities {
    pub output_format: bool,
    pub interrupts: bool,
    pub hooks: bool,
    pub hot_context: bool,
    pub streaming: bool,
}

impl TransportCapabilities {
    pub const fn none() -> Self {
        Self { output_format: false, interrupts: false, hooks: false, hot_context: false, streaming: false }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenCounts {
    pub prompt: u64,
    pub completion: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkOutput {
    pub success: bool,
    pub output: String,
    #[serde(default)]
    pub events: Vec<Value>,
    pub token_counts: TokenCounts,
}

/// Transport-agnostic agent runtime. One instance is opened per step and
/// carries hot context across `work`/`finalize`/`route` — the
/// session is the unit of agent-memory continuity, not the phase.
#[async_trait]
pub trait Transport: Send {
    fn capabilities(&self) -> TransportCapabilities;

    /// Run the step's main work. May suspend on tool calls; the transport is
    /// responsible for honoring any pre/post-tool hooks it declares support
    /// for via `capabilities().hooks`.
    async fn work(&mut self, prompt: &str, allowed_tools: Option<&[String]>) -> Result<WorkOutput>;

    /// Ask the transport to produce a schema-conformant JSON object
    /// natively. Only called when `capabilities().output_format` is true.
    async fn finalize_structured(&mut self, schema: &Value) -> Result<Value>;

    /// Send `prompt` and return raw text, with no structure guarantee. Used
    /// by the extractor microloop to drive finalize/route on transports
    /// without native JSON support, and always available regardless of
    /// `output_format`.
    async fn query_raw(&mut self, prompt: &str) -> Result<String>;

    /// The transport's own (advisory) opinion on how to route next, if it
    /// has one. The engine treats this as one more candidate, never as a
    /// command.
    async fn route_signal(&mut self) -> Result<Option<RoutingSignal>>;

    /// Cancel whatever phase is in flight. A transport reporting
    /// `interrupts: false` may treat this as a no-op; the engine still
    /// calls it unconditionally on a cancellation request.
    async fn interrupt(&mut self) -> Result<()>;
}
