//! `StubTransport`: ships as part of the core crate so the
//! `Transport` contract is exercised by the kernel's own test suite, and so
//! any caller can drive a [`crate::StepSession`] without a live LLM.

use std::collections::VecDeque;

use async_trait::async_trait;
use serde_json::Value;
use wp_domain::{Error, Result, RoutingSignal};

use crate::transport::{Transport, TokenCounts, TransportCapabilities, WorkOutput};

pub struct StubTransport {
    capabilities: TransportCapabilities,
    responses: VecDeque<String>,
    structured_value: Option<Value>,
    route_signal: Option<RoutingSignal>,
    interrupted: bool,
}

impl StubTransport {
    /// A CLI-shaped transport with no native schema support: `finalize`
    /// must go through the extractor microloop, consuming `responses` in
    /// order for both `work` and `query_raw`.
    pub fn scripted(responses: Vec<String>) -> Self {
        Self {
            capabilities: TransportCapabilities { hot_context: true, ..TransportCapabilities::none() },
            responses: responses.into(),
            structured_value: None,
            route_signal: None,
            interrupted: false,
        }
    }

    /// A transport that can produce native structured output directly,
    /// bypassing the extractor microloop entirely.
    pub fn structured(value: Value) -> Self {
        Self {
            capabilities: TransportCapabilities {
                output_format: true,
                hot_context: true,
                ..TransportCapabilities::none()
            },
            responses: VecDeque::new(),
            structured_value: Some(value),
            route_signal: None,
            interrupted: false,
        }
    }

    pub fn with_route_signal(mut self, signal: RoutingSignal) -> Self {
        self.route_signal = Some(signal);
        self
    }

    pub fn was_interrupted(&self) -> bool {
        self.interrupted
    }
}

#[async_trait]
impl Transport for StubTransport {
    fn capabilities(&self) -> TransportCapabilities {
        self.capabilities
    }

    async fn work(&mut self, _prompt: &str, _allowed_tools: Option<&[String]>) -> Result<WorkOutput> {
        let output = self.responses.pop_front().unwrap_or_else(|| "stub work output".to_string());
        Ok(WorkOutput { success: true, output, events: Vec::new(), token_counts: TokenCounts::default() })
    }

    async fn finalize_structured(&mut self, _schema: &Value) -> Result<Value> {
        self.structured_value.clone().ok_or_else(|| Error::Transport("stub has no structured value configured".into()))
    }

    async fn query_raw(&mut self, _prompt: &str) -> Result<String> {
        self.responses
            .pop_front()
            .ok_or_else(|| Error::Transport("stub transport script exhausted".into()))
    }

    async fn route_signal(&mut self) -> Result<Option<RoutingSignal>> {
        Ok(self.route_signal.clone())
    }

    async fn interrupt(&mut self) -> Result<()> {
        self.interrupted = true;
        Ok(())
    }
}
