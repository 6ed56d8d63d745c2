//! Code execution through a Judge0-compatible service.
//!
//! The service itself is opaque: a [`CodeRunner`] submits an
//! [`ExecutionRequest`] and gets an [`ExecutionResult`] back. This module
//! owns the parts every runner shares: the language table, the base64
//! submission body, decoding the response, and choosing what to show the
//! user.

use std::fmt;
use std::future::Future;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::ServiceError;

/// Path and query of a synchronous base64 submission.
pub const SUBMISSIONS_PATH: &str = "/submissions?base64_encoded=true&wait=true";

/// Judge0 status id for a run that finished normally.
pub const STATUS_ACCEPTED: u32 = 3;

/// Shown when an accepted run printed nothing.
pub const NO_OUTPUT: &str = "No output";

/// Shown when a failed run carries no diagnostics at all.
pub const UNKNOWN_ERROR: &str = "Unknown error";

// ---------------------------------------------------------------------------
// Language
// ---------------------------------------------------------------------------

/// Languages the editor can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    JavaScript,
    Python,
    Java,
    Cpp,
    C,
}

impl Language {
    pub const ALL: [Language; 5] = [
        Language::JavaScript,
        Language::Python,
        Language::Java,
        Language::Cpp,
        Language::C,
    ];

    /// The service's language id.
    pub fn judge0_id(self) -> u32 {
        match self {
            Self::JavaScript => 63,
            Self::Python => 71,
            Self::Java => 62,
            Self::Cpp => 54,
            Self::C => 50,
        }
    }

    /// Human-readable name, e.g. `C++`.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::JavaScript => "JavaScript",
            Self::Python => "Python",
            Self::Java => "Java",
            Self::Cpp => "C++",
            Self::C => "C",
        }
    }

    /// Stored value, e.g. `cpp`. Also the editor mode.
    pub fn value(self) -> &'static str {
        match self {
            Self::JavaScript => "javascript",
            Self::Python => "python",
            Self::Java => "java",
            Self::Cpp => "cpp",
            Self::C => "c",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Language {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|lang| lang.value().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ServiceError::UnsupportedLanguage(wanted.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Request / result
// ---------------------------------------------------------------------------

/// Source to run, with its standard input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    pub source: String,
    pub language: Language,
    pub stdin: String,
}

impl ExecutionRequest {
    pub fn new(language: Language, source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            language,
            stdin: String::new(),
        }
    }

    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = stdin.into();
        self
    }

    /// The JSON body posted to [`SUBMISSIONS_PATH`].
    pub fn to_submission(&self) -> Result<Vec<u8>, ServiceError> {
        let body = Submission {
            source_code: STANDARD.encode(&self.source),
            language_id: self.language.judge0_id(),
            stdin: STANDARD.encode(&self.stdin),
        };
        Ok(serde_json::to_vec(&body)?)
    }
}

#[derive(Serialize)]
struct Submission {
    source_code: String,
    language_id: u32,
    stdin: String,
}

/// Final status of a run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExecutionStatus {
    pub id: u32,
    #[serde(default)]
    pub description: String,
}

#[derive(Deserialize)]
struct SubmissionResponse {
    stdout: Option<String>,
    stderr: Option<String>,
    compile_output: Option<String>,
    message: Option<String>,
    status: ExecutionStatus,
}

/// What a run produced, with every text field already decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub compile_output: Option<String>,
    pub message: Option<String>,
    pub status: ExecutionStatus,
}

impl ExecutionResult {
    /// Decodes a base64 submission response.
    ///
    /// # Errors
    /// [`ServiceError::Json`] if the body is not a submission response,
    /// [`ServiceError::Base64`] if a text field is not valid base64.
    pub fn from_response(body: &[u8]) -> Result<Self, ServiceError> {
        let raw: SubmissionResponse = serde_json::from_slice(body)?;
        Ok(Self {
            stdout: decode_field(raw.stdout)?,
            stderr: decode_field(raw.stderr)?,
            compile_output: decode_field(raw.compile_output)?,
            message: decode_field(raw.message)?,
            status: raw.status,
        })
    }

    pub fn is_accepted(&self) -> bool {
        self.status.id == STATUS_ACCEPTED
    }

    /// The text to show the user.
    ///
    /// An accepted run shows its stdout, or [`NO_OUTPUT`]. Anything else
    /// shows the first non-empty of stderr, compile output and message,
    /// or [`UNKNOWN_ERROR`].
    pub fn output(&self) -> String {
        fn non_empty(field: &Option<String>) -> Option<&str> {
            field.as_deref().filter(|s| !s.is_empty())
        }

        if self.is_accepted() {
            return non_empty(&self.stdout).unwrap_or(NO_OUTPUT).to_string();
        }
        non_empty(&self.stderr)
            .or_else(|| non_empty(&self.compile_output))
            .or_else(|| non_empty(&self.message))
            .unwrap_or(UNKNOWN_ERROR)
            .to_string()
    }
}

/// Base64 text fields may arrive wrapped across lines.
fn decode_field(field: Option<String>) -> Result<Option<String>, ServiceError> {
    let Some(encoded) = field else {
        return Ok(None);
    };
    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = STANDARD.decode(compact)?;
    Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
}

// ---------------------------------------------------------------------------
// CodeRunner
// ---------------------------------------------------------------------------

/// Runs code somewhere else.
///
/// Implementations post [`ExecutionRequest::to_submission`] to the service
/// and hand the response body to [`ExecutionResult::from_response`].
pub trait CodeRunner: Send + Sync + 'static {
    fn run(
        &self,
        request: ExecutionRequest,
    ) -> impl Future<Output = Result<ExecutionResult, ServiceError>> + Send;
}
