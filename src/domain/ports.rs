//! Ports: traits at the seams of the orchestration core.

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use super::errors::BuildResult;
use super::models::{AgentExit, AgentRequest};

/// Launches the external agent and streams its stdout.
///
/// Implementations forward raw stdout lines through `lines` until EOF,
/// timeout, or cancellation, then report how the process ended. Tests
/// substitute a scripted invoker; production uses the subprocess driver.
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    async fn invoke(
        &self,
        request: AgentRequest,
        lines: mpsc::Sender<String>,
        shutdown: watch::Receiver<bool>,
    ) -> BuildResult<AgentExit>;
}

/// One LLM completion request (research and planning).
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub model: String,
    pub system: Option<String>,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// The completion plus reported usage.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// JSON-message LLM API used by the research coordinator and planner.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: LlmRequest) -> BuildResult<LlmResponse>;
}
