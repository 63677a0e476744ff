//! Pluggable approve/reject decision makers.
//!
//! The gate treats every [`Decider`] as untrusted: an `Err` from
//! [`Decider::decide`] means "unavailable or unparseable" and is recorded as
//! a rejection by [`crate::gate::ApprovalGate`].

use crate::config::DeciderConfig;
use crate::error::{OverseerError, Result};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Turns a proposed step description into approve (`true`) or reject.
pub trait Decider: Send + Sync {
    /// Short label stored on every approval record.
    fn name(&self) -> &str;

    fn decide(&self, step: &str) -> Result<bool>;
}

/// Build the decider selected in the config.
pub fn from_config(cfg: &DeciderConfig) -> Result<Arc<dyn Decider>> {
    let decider: Arc<dyn Decider> = match cfg {
        DeciderConfig::Llm {
            model,
            endpoint,
            api_key_env,
            max_tokens,
        } => Arc::new(LlmDecider::new(
            model,
            endpoint,
            std::env::var(api_key_env).ok(),
            *max_tokens,
        )?),
        DeciderConfig::Human => Arc::new(TerminalDecider::default()),
        DeciderConfig::Static { approve } => Arc::new(StaticDecider::new(*approve)),
    };
    Ok(decider)
}

// ---------------------------------------------------------------------------
// StaticDecider
// ---------------------------------------------------------------------------

/// Always answers the same way. Used for offline runs and tests.
#[derive(Debug, Clone, Copy)]
pub struct StaticDecider {
    approve: bool,
}

impl StaticDecider {
    pub fn new(approve: bool) -> Self {
        Self { approve }
    }
}

impl Decider for StaticDecider {
    fn name(&self) -> &str {
        "static"
    }

    fn decide(&self, _step: &str) -> Result<bool> {
        Ok(self.approve)
    }
}

// ---------------------------------------------------------------------------
// TerminalDecider
// ---------------------------------------------------------------------------

/// Asks the operator on the controlling terminal.
///
/// Prompts and reads through the terminal device (`/dev/tty` by default), so
/// a guarded command's stdin and stderr are left alone and redirecting them
/// does not change whether a human can answer. If the device cannot be
/// opened the decision is an error, which the gate records as rejected.
#[derive(Debug, Clone)]
pub struct TerminalDecider {
    device: PathBuf,
}

impl Default for TerminalDecider {
    fn default() -> Self {
        Self {
            device: PathBuf::from("/dev/tty"),
        }
    }
}

impl TerminalDecider {
    pub fn with_device(device: impl Into<PathBuf>) -> Self {
        Self {
            device: device.into(),
        }
    }
}

impl Decider for TerminalDecider {
    fn name(&self) -> &str {
        "human"
    }

    fn decide(&self, step: &str) -> Result<bool> {
        let tty = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.device)
            .map_err(|e| {
                OverseerError::Decider(format!(
                    "no terminal available for interactive approval ({}: {e})",
                    self.device.display()
                ))
            })?;
        let output = tty
            .try_clone()
            .map_err(|e| OverseerError::Decider(format!("failed to open terminal: {e}")))?;
        ask(BufReader::new(tty), output, step)
    }
}

/// Show the prompt on `output` and read a y/N answer from `input`.
fn ask(mut input: impl BufRead, mut output: impl Write, step: &str) -> Result<bool> {
    let prompt = format!(
        "\n[overseer] Approval requested for:\n[overseer]   {}\n[overseer] Approve? [y/N] ",
        sanitize_for_terminal(step)
    );
    output
        .write_all(prompt.as_bytes())
        .and_then(|()| output.flush())
        .map_err(|e| OverseerError::Decider(format!("failed to show prompt: {e}")))?;

    let mut answer = String::new();
    let read = input
        .read_line(&mut answer)
        .map_err(|e| OverseerError::Decider(format!("failed to read answer: {e}")))?;
    if read == 0 {
        return Err(OverseerError::Decider(
            "terminal closed before an answer was given".to_string(),
        ));
    }

    let answer = answer.trim().to_lowercase();
    Ok(answer == "y" || answer == "yes")
}

/// Replace control characters so a step description cannot drive the terminal.
fn sanitize_for_terminal(input: &str) -> String {
    input
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

// ---------------------------------------------------------------------------
// LlmDecider
// ---------------------------------------------------------------------------

const SYSTEM_PROMPT: &str = "You are an oversight agent reviewing proposed changes to a \
    repository. Answer with exactly one word: Approved if the step is safe, ethical and \
    aligned with the project's goals, or Rejected if it should not be executed.";

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<RequestMessage<'a>>,
}

#[derive(Serialize)]
struct RequestMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

/// Asks a language model via the Messages HTTP API.
pub struct LlmDecider {
    client: reqwest::blocking::Client,
    model: String,
    endpoint: String,
    api_key: Option<String>,
    max_tokens: u32,
}

impl LlmDecider {
    /// `api_key` may be absent; every decision then fails (and is rejected).
    pub fn new(
        model: &str,
        endpoint: &str,
        api_key: Option<String>,
        max_tokens: u32,
    ) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| OverseerError::Decider(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            model: model.to_string(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
            max_tokens,
        })
    }

    fn prompt(step: &str) -> String {
        format!("Please review the following step:\n\n{step}\n\nRespond with Approved or Rejected.")
    }
}

impl Decider for LlmDecider {
    fn name(&self) -> &str {
        "llm"
    }

    fn decide(&self, step: &str) -> Result<bool> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| OverseerError::Decider("no API key configured".to_string()))?;

        let body = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system: SYSTEM_PROMPT,
            messages: vec![RequestMessage {
                role: "user",
                content: Self::prompt(step),
            }],
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.endpoint))
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .map_err(|e| OverseerError::Decider(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            return Err(OverseerError::Decider(format!(
                "API returned {status}: {text}"
            )));
        }

        let parsed: MessagesResponse = response
            .json()
            .map_err(|e| OverseerError::Decider(format!("malformed response: {e}")))?;
        let text: String = parsed
            .content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                ContentBlock::Other => None,
            })
            .collect();

        parse_verdict(&text)
    }
}

/// Accept exactly `approved` or `rejected`, ignoring case, surrounding
/// whitespace and trailing punctuation. Anything else is an error.
pub fn parse_verdict(answer: &str) -> Result<bool> {
    let word = answer
        .trim()
        .trim_end_matches(|c: char| c.is_ascii_punctuation())
        .to_lowercase();
    match word.as_str() {
        "approved" => Ok(true),
        "rejected" => Ok(false),
        _ => Err(OverseerError::Decider(format!(
            "unparseable verdict: {:?}",
            answer.trim()
        ))),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_verdict_accepts_exact_words() {
        assert!(parse_verdict("Approved").unwrap());
        assert!(parse_verdict("  approved.\n").unwrap());
        assert!(!parse_verdict("REJECTED").unwrap());
        assert!(!parse_verdict("Rejected!").unwrap());
    }

    #[test]
    fn parse_verdict_rejects_ambiguous_answers() {
        for answer in [
            "",
            "Approved, but be careful",
            "not approved",
            "I think this is approved",
            "yes",
        ] {
            assert!(parse_verdict(answer).is_err(), "expected error: {answer}");
        }
    }

    #[test]
    fn static_decider_answers_fixed() {
        assert!(StaticDecider::new(true).decide("anything").unwrap());
        assert!(!StaticDecider::new(false).decide("anything").unwrap());
    }

    #[test]
    fn from_config_builds_selected_backend() {
        let d = from_config(&DeciderConfig::Static { approve: false }).unwrap();
        assert_eq!(d.name(), "static");
        let d = from_config(&DeciderConfig::Human).unwrap();
        assert_eq!(d.name(), "human");
        let d = from_config(&DeciderConfig::default()).unwrap();
        assert_eq!(d.name(), "llm");
    }

    #[test]
    fn sanitize_strips_control_characters() {
        assert_eq!(sanitize_for_terminal("a\x1b[31mb\nc"), "a [31mb c");
    }

    #[test]
    fn terminal_decider_without_device_errors() {
        let dir = tempfile::TempDir::new().unwrap();
        let decider = TerminalDecider::with_device(dir.path().join("no-tty"));
        let err = decider.decide("step").unwrap_err();
        assert!(err.to_string().contains("no terminal available"));
    }

    #[test]
    fn ask_prompts_and_reads_answer() {
        let mut shown = Vec::new();
        assert!(ask(std::io::Cursor::new("Yes\n"), &mut shown, "Integrate\x1bCMS").unwrap());
        let shown = String::from_utf8(shown).unwrap();
        assert!(shown.contains("Integrate CMS"));
        assert!(shown.ends_with("Approve? [y/N] "));

        assert!(!ask(std::io::Cursor::new("\n"), Vec::new(), "step").unwrap());
        assert!(!ask(std::io::Cursor::new("nope\n"), Vec::new(), "step").unwrap());
        assert!(ask(std::io::Cursor::new(""), Vec::new(), "step").is_err());
    }

    fn llm(server: &mockito::Server, key: Option<&str>) -> LlmDecider {
        LlmDecider::new("test-model", &server.url(), key.map(String::from), 16).unwrap()
    }

    #[test]
    fn llm_decider_approves_on_approved_text() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/v1/messages")
            .match_header("x-api-key", "k")
            .match_header("anthropic-version", ANTHROPIC_VERSION)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"content":[{"type":"text","text":"Approved"}]}"#)
            .create();

        assert!(llm(&server, Some("k")).decide("Refine structure").unwrap());
        mock.assert();
    }

    #[test]
    fn llm_decider_rejects_on_rejected_text() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", "/v1/messages")
            .with_status(200)
            .with_body(r#"{"content":[{"type":"text","text":"Rejected."}]}"#)
            .create();

        assert!(!llm(&server, Some("k")).decide("Drop the database").unwrap());
    }

    #[test]
    fn llm_decider_errors_on_unparseable_text() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", "/v1/messages")
            .with_status(200)
            .with_body(r#"{"content":[{"type":"text","text":"Maybe later"}]}"#)
            .create();

        assert!(llm(&server, Some("k")).decide("step").is_err());
    }

    #[test]
    fn llm_decider_errors_on_http_failure() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", "/v1/messages")
            .with_status(529)
            .with_body("overloaded")
            .create();

        let err = llm(&server, Some("k")).decide("step").unwrap_err();
        assert!(err.to_string().contains("529"));
    }

    #[test]
    fn llm_decider_without_key_errors_before_request() {
        let mut server = mockito::Server::new();
        let mock = server.mock("POST", "/v1/messages").expect(0).create();

        assert!(llm(&server, None).decide("step").is_err());
        mock.assert();
    }
}
