//! `StepSession`: the phased Work → Finalize → Route contract a
//! single step runs through, independent of which [`crate::Transport`] is
//! driving it.

use serde_json::Value;
use wp_domain::{Error, HandoffEnvelope, Result, RoutingSignal};
use wp_extract::extract_with_microloop;

use crate::transport::{Transport, TransportCapabilities, WorkOutput};

/// Default extractor-microloop attempt budget for transports without a
/// native structured-output mode.
const DEFAULT_FINALIZE_ATTEMPTS: u32 = 3;

pub struct StepSession<T: Transport> {
    pub run_id: String,
    pub flow_key: String,
    pub step_id: String,
    transport: T,
}

impl<T: Transport> StepSession<T> {
    pub fn new(run_id: impl Into<String>, flow_key: impl Into<String>, step_id: impl Into<String>, transport: T) -> Self {
        Self { run_id: run_id.into(), flow_key: flow_key.into(), step_id: step_id.into(), transport }
    }

    pub fn capabilities(&self) -> TransportCapabilities {
        self.transport.capabilities()
    }

    /// Phase 1: run the step's main work.
    pub async fn work(&mut self, prompt: &str, allowed_tools: Option<&[String]>) -> Result<WorkOutput> {
        self.transport.work(prompt, allowed_tools).await
    }

    /// Phase 2: produce a schema-conformant [`HandoffEnvelope`]. Transports
    /// with `output_format: true` are asked directly; everything else goes
    /// through the extractor microloop, which is mandatory rather
    /// than optional in that case.
    pub async fn finalize(&mut self, schema: &Value, finalize_prompt: &str) -> Result<HandoffEnvelope> {
        self.finalize_with_attempts(schema, finalize_prompt, DEFAULT_FINALIZE_ATTEMPTS).await
    }

    pub async fn finalize_with_attempts(&mut self, schema: &Value, finalize_prompt: &str, max_attempts: u32) -> Result<HandoffEnvelope> {
        let value = if self.transport.capabilities().output_format {
            let candidate = self.transport.finalize_structured(schema).await?;
            let errors = wp_extract::validate(&candidate, schema);
            if !errors.is_empty() {
                return Err(Error::Validation(format!(
                    "transport's structured finalize failed schema validation: {}",
                    errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ")
                )));
            }
            candidate
        } else {
            let transport = &mut self.transport;
            let result = extract_with_microloop(finalize_prompt, schema, max_attempts, async |prompt| {
                transport.query_raw(&prompt).await.unwrap_or_else(|err| format!("TRANSPORT_ERROR: {err}"))
            })
            .await;

            result.value.ok_or_else(|| Error::Extraction {
                attempts: result.attempts,
                message: result.errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "),
            })?
        };

        serde_json::from_value(value).map_err(Error::from)
    }

    /// Phase 3: the transport's own advisory opinion on how to route next.
    /// `None` means the transport has no opinion — the engine's own
    /// candidate-building carries on regardless.
    pub async fn route(&mut self) -> Result<Option<RoutingSignal>> {
        self.transport.route_signal().await
    }

    /// Cancel whichever phase is currently in flight.
    pub async fn interrupt(&mut self) -> Result<()> {
        self.transport.interrupt().await
    }

    pub fn into_transport(self) -> T {
        self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::StubTransport;
    use serde_json::json;

    fn schema() -> Value {
        json!({
            "required": ["step_id", "flow_key", "run_id", "status", "summary"],
            "properties": {
                "step_id": {"type": "string"},
                "flow_key": {"type": "string"},
                "run_id": {"type": "string"},
                "status": {"type": "string", "enum": ["succeeded", "failed", "unverified", "verified", "blocked", "partial"]},
                "summary": {"type": "string"}
            }
        })
    }

    #[tokio::test]
    async fn work_phase_returns_stub_output() {
        let mut session = StepSession::new("r1", "build", "step-1", StubTransport::scripted(vec!["did the work".into()]));
        let output = session.work("do the thing", None).await.unwrap();
        assert!(output.success);
        assert_eq!(output.output, "did the work");
    }

    #[tokio::test]
    async fn finalize_runs_the_microloop_when_output_format_is_unsupported() {
        let envelope_json = json!({
            "step_id": "step-1", "flow_key": "build", "run_id": "r1",
            "status": "verified", "summary": "done"
        })
        .to_string();
        let mut session = StepSession::new("r1", "build", "step-1", StubTransport::scripted(vec![envelope_json]));
        assert!(!session.capabilities().output_format);

        let envelope = session.finalize(&schema(), "finalize please").await.unwrap();
        assert_eq!(envelope.step_id, "step-1");
    }

    #[tokio::test]
    async fn finalize_reprompts_on_invalid_json_then_succeeds() {
        let envelope_json = json!({
            "step_id": "step-1", "flow_key": "build", "run_id": "r1",
            "status": "verified", "summary": "done"
        })
        .to_string();
        let mut session =
            StepSession::new("r1", "build", "step-1", StubTransport::scripted(vec!["not json".into(), envelope_json]));
        let envelope = session.finalize(&schema(), "finalize please").await.unwrap();
        assert_eq!(envelope.status, wp_domain::StepStatus::Verified);
    }

    #[tokio::test]
    async fn finalize_fails_after_exhausting_attempts() {
        let mut session =
            StepSession::new("r1", "build", "step-1", StubTransport::scripted(vec!["nope".into(), "still nope".into()]));
        let result = session.finalize_with_attempts(&schema(), "finalize please", 2).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn finalize_uses_native_structured_output_when_supported() {
        let envelope = json!({
            "step_id": "step-1", "flow_key": "build", "run_id": "r1",
            "status": "succeeded", "summary": "native"
        });
        let mut session =
            StepSession::new("r1", "build", "step-1", StubTransport::structured(envelope));
        assert!(session.capabilities().output_format);
        let result = session.finalize(&schema(), "unused").await.unwrap();
        assert_eq!(result.summary, "native");
    }

    #[tokio::test]
    async fn route_returns_none_when_transport_has_no_opinion() {
        let mut session = StepSession::new("r1", "build", "step-1", StubTransport::scripted(vec![]));
        assert!(session.route().await.unwrap().is_none());
    }
}
