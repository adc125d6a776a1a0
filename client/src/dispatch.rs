use tracing::{debug, error, info, warn};

use shared::types::client_config::BackendConfig;
use shared::types::script::VERSION_SLOTS;
use shared::types::submit::{SUBMIT_PATH, SubmitRequest, SubmitResponse};

use crate::error::{DispatchError, TransportError};
use crate::net::{self, Endpoint};

/// What a successful dispatch promises: one opaque token per pending script
/// and the number of scripts the live channel should deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchAck {
    pub tokens: Vec<String>,
    pub total: usize,
}

/// Validate the inputs a dispatch needs. Nothing goes on the wire when any
/// of them is blank.
pub(crate) fn check_preconditions(
    topic: &str,
    user_id: &str,
    session_token: &str,
) -> Result<(), DispatchError> {
    if topic.trim().is_empty() {
        return Err(DispatchError::MissingPrecondition { field: "topic" });
    }
    if user_id.trim().is_empty() {
        return Err(DispatchError::MissingPrecondition { field: "user id" });
    }
    if session_token.trim().is_empty() {
        return Err(DispatchError::MissingPrecondition {
            field: "session token",
        });
    }
    Ok(())
}

/// One-shot `POST /submit` client.
///
/// Fire-and-acknowledge: a success response only means generation started;
/// the scripts themselves arrive on the live channel. Failed dispatches are
/// never retried here.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    endpoint: Endpoint,
}

impl Dispatcher {
    pub fn new(backend: &BackendConfig) -> Result<Self, TransportError> {
        Ok(Self {
            endpoint: Endpoint::from_base_url(&backend.resolved_base_url())?,
        })
    }

    /// Ask the backend to start generating scripts for `topic`, keyed on the
    /// caller's session token.
    pub async fn start_generation(
        &self,
        topic: &str,
        user_id: &str,
        session_token: &str,
    ) -> Result<DispatchAck, DispatchError> {
        check_preconditions(topic, user_id, session_token)?;

        let request = SubmitRequest {
            text: topic.trim().to_string(),
            uid: user_id.to_string(),
            chat_id: session_token.to_string(),
        };
        let body = serde_json::to_string(&request).map_err(DispatchError::EncodeRequest)?;

        debug!(
            "dispatching generation request ({} chars) for {}",
            request.text.len(),
            session_token
        );

        let path = self.endpoint.request_path(SUBMIT_PATH);
        let (status, bytes) = net::post_json(&self.endpoint, &path, body)
            .await
            .map_err(DispatchError::Transport)?;

        match serde_json::from_slice::<SubmitResponse>(&bytes) {
            Ok(response) if response.success => {
                let tokens = response.tokens.unwrap_or_default();
                // An empty token list falls back to the fixed slot count,
                // exactly like an absent one.
                let total = if tokens.is_empty() {
                    VERSION_SLOTS
                } else {
                    tokens.len()
                };
                info!("generation started: {} scripts expected", total);
                Ok(DispatchAck { tokens, total })
            }
            Ok(response) => {
                let message = response
                    .message
                    .unwrap_or_else(|| "the backend declined the generation request".to_string());
                warn!("generation request rejected: {}", message);
                Err(DispatchError::Rejected { message })
            }
            Err(_) if !status.is_success() => {
                error!("generation request failed with HTTP {}", status);
                Err(DispatchError::Status(status))
            }
            Err(err) => Err(DispatchError::DecodeResponse(err)),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
