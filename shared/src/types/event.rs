use serde::Deserialize;

use super::script::Script;

/// Path of the push stream for one session, relative to the backend base URL.
pub fn events_path(session_token: &str) -> String {
    format!("/events/{}", session_token)
}

/// Push events delivered on the `/events/{token}` stream.
///
/// The discriminator is the `type` field inside the JSON payload, not the
/// SSE `event:` name. Types this client does not know deserialize as
/// [`PushEvent::Unknown`] and are dropped further up.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushEvent {
    /// Stream handshake acknowledgement, sent once per connection.
    Connected {
        #[serde(default)]
        message: Option<String>,
    },

    /// One generation job finished. `script_index` is 1-based and maps the
    /// script onto its version slot.
    #[serde(rename_all = "camelCase")]
    ScriptReady {
        data: Script,
        #[serde(default)]
        ready_token: Option<String>,
        script_index: u32,
        total_scripts: u32,
    },

    /// Every job finished. `scripts` is ordered by version slot and is the
    /// final authority over previously received per-script payloads.
    #[serde(rename_all = "camelCase")]
    AllScriptsComplete {
        #[serde(alias = "allScripts")]
        scripts: Vec<Script>,
        #[serde(default)]
        all_tokens: Vec<String>,
    },

    /// Any other `type` value.
    #[serde(other)]
    Unknown,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
