//! # Response Codes
//!
//! Classification of blackbox response codes.
//!
//! Fiscal modules answer every request with a code. Some code families are
//! soft errors (warnings the business layer handles itself); the queue still
//! dispatches those responses to their handler instead of failing the flush.
//! Which families are soft is a compliance decision, so the list is injected
//! through configuration rather than hard-coded.
//!
//! ```text
//! response ──► response_code() ──┬── None / ""         ──► Accepted
//!                                ├── prefix in list    ──► Recoverable(code)
//!                                └── anything else     ──► Rejected{code, message}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Code prefixes treated as recoverable when no configuration says otherwise.
///
/// `000` is the success family, `001` the warning family of the fiscal
/// modules seen in the field.
pub const DEFAULT_RECOVERABLE_PREFIXES: &[&str] = &["000", "001"];

/// Whitelist of recoverable response-code prefixes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecoverableCodes(Vec<String>);

impl Default for RecoverableCodes {
    fn default() -> Self {
        RecoverableCodes(
            DEFAULT_RECOVERABLE_PREFIXES
                .iter()
                .map(|p| p.to_string())
                .collect(),
        )
    }
}

impl RecoverableCodes {
    /// Creates a whitelist from explicit prefixes.
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RecoverableCodes(prefixes.into_iter().map(Into::into).collect())
    }

    /// Returns true if `code` starts with one of the whitelisted prefixes.
    pub fn is_recoverable(&self, code: &str) -> bool {
        self.0
            .iter()
            .any(|prefix| !prefix.is_empty() && code.starts_with(prefix.as_str()))
    }

    /// Classifies a parsed response.
    pub fn classify(&self, response: &Value) -> ResponseClass {
        match response_code(response) {
            None => ResponseClass::Accepted,
            Some(code) if self.is_recoverable(&code) => ResponseClass::Recoverable(code),
            Some(code) => ResponseClass::Rejected {
                code,
                message: response_message(response).unwrap_or_default(),
            },
        }
    }

    /// Returns the configured prefixes.
    pub fn prefixes(&self) -> &[String] {
        &self.0
    }
}

/// Outcome of [`RecoverableCodes::classify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseClass {
    /// No error code at all.
    Accepted,
    /// Soft error; dispatch normally.
    Recoverable(String),
    /// Hard error; surface to the caller.
    Rejected { code: String, message: String },
}

/// Extracts the response code.
///
/// Looks at `code` then `error.code`; numeric codes are rendered as decimal
/// strings. Empty codes count as absent.
pub fn response_code(response: &Value) -> Option<String> {
    let raw = response
        .get("code")
        .or_else(|| response.get("error").and_then(|e| e.get("code")))?;

    let code = match raw {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };

    (!code.is_empty()).then_some(code)
}

fn response_message(response: &Value) -> Option<String> {
    response
        .get("message")
        .or_else(|| response.get("error").and_then(|e| e.get("message")))
        .and_then(Value::as_str)
        .map(str::to_string)
}
