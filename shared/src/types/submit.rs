use serde::{Deserialize, Serialize};

/// Path of the one-shot start-generation endpoint.
pub const SUBMIT_PATH: &str = "/submit";

/// Body of `POST /submit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitRequest {
    /// The topic text to generate scripts for.
    pub text: String,
    /// The signed-in user's id.
    pub uid: String,
    /// Session token the push stream is keyed on.
    #[serde(rename = "chatID")]
    pub chat_id: String,
}

/// Response envelope for `POST /submit`.
///
/// `tokens` carries one opaque token per pending script and establishes the
/// expected script count. An absent or empty list means the backend kept the
/// default of [`VERSION_SLOTS`](super::script::VERSION_SLOTS) jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub success: bool,
    #[serde(default)]
    pub tokens: Option<Vec<String>>,
    #[serde(default)]
    pub message: Option<String>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
