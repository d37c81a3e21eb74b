//! PII masking for traced, logged, and streamed payloads.
//!
//! Two patterns are scrubbed before any detail leaves the engine:
//! card-number-like digit runs (13-19 digits) are fully redacted, and
//! e-mail addresses keep only the first character of the local part.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

static PAN_RE: OnceLock<Regex> = OnceLock::new();
static EMAIL_RE: OnceLock<Regex> = OnceLock::new();

fn pan_re() -> &'static Regex {
    PAN_RE.get_or_init(|| Regex::new(r"\b\d{13,19}\b").expect("pan regex"))
}

fn email_re() -> &'static Regex {
    EMAIL_RE.get_or_init(|| Regex::new(r"([\w.+-]+)@([\w-]+\.[\w.-]+)").expect("email regex"))
}

/// Redact PAN-like digit runs and partially redact e-mail addresses
pub fn redact_pii(input: &str) -> String {
    let masked = pan_re().replace_all(input, "***REDACTED***");
    email_re()
        .replace_all(&masked, |caps: &regex::Captures<'_>| {
            let first = caps[1].chars().next().unwrap_or('*');
            format!("{}***@{}", first, &caps[2])
        })
        .into_owned()
}

/// Recursively mask every string in a JSON payload
pub fn mask_value(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(redact_pii(&s)),
        Value::Array(items) => Value::Array(items.into_iter().map(mask_value).collect()),
        Value::Object(map) => {
            Value::Object(map.into_iter().map(|(k, v)| (k, mask_value(v))).collect())
        }
        other => other,
    }
}
