use crate::{Error, Result};
use base64::{Engine, engine::general_purpose};
use serde_json::{Map, Value};
use std::fmt;

const REQUIRED_FIELDS: [&str; 3] = ["userId", "sessionId", "merchant"];

/// Raw session credentials as handed over by a credential source.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialSet {
    pub bearer_token: String,
    pub session_context: String,
}

/// Decoded session context with its canonical base64 form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionContext {
    pub user_id: String,
    pub session_id: String,
    pub merchant: String,
    pub encoded: String,
}

impl CredentialSet {
    pub fn new(bearer_token: impl Into<String>, session_context: impl Into<String>) -> Self {
        Self {
            bearer_token: bearer_token.into(),
            session_context: session_context.into(),
        }
    }

    /// Bearer token without any `Bearer ` prefix or surrounding whitespace.
    pub fn token(&self) -> &str {
        strip_bearer(&self.bearer_token)
    }

    /// True when both values are present and the session context decodes to an
    /// object holding `userId`, `sessionId` and `merchant`.
    pub fn validate(&self) -> bool {
        !self.token().is_empty() && self.session().is_ok()
    }

    /// Decode the session context, accepting base64 encoded or plain json.
    pub fn session(&self) -> Result<SessionContext> {
        let raw = self.session_context.trim();

        if raw.is_empty() {
            return Err(Error::Authentication("session context is empty".to_owned()));
        }

        let (object, encoded) = decode_base64_object(raw)
            .or_else(|| {
                parse_object(raw.as_bytes())
                    .map(|x| (x, general_purpose::STANDARD.encode(raw.as_bytes())))
            })
            .ok_or_else(|| {
                Error::Authentication(
                    "session context is neither base64 encoded json nor json".to_owned(),
                )
            })?;

        let missing = REQUIRED_FIELDS
            .iter()
            .filter(|x| !object.contains_key(**x))
            .copied()
            .collect::<Vec<_>>();

        if !missing.is_empty() {
            return Err(Error::Authentication(format!(
                "session context is missing {}",
                missing.join(", ")
            )));
        }

        Ok(SessionContext {
            user_id: field(&object, "userId"),
            session_id: field(&object, "sessionId"),
            merchant: field(&object, "merchant"),
            encoded,
        })
    }

    /// A copy whose session context is in canonical base64 form.
    pub fn normalized(&self) -> Result<Self> {
        if self.token().is_empty() {
            return Err(Error::Authentication("bearer token is empty".to_owned()));
        }

        Ok(Self {
            bearer_token: self.token().to_owned(),
            session_context: self.session()?.encoded,
        })
    }
}

impl fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSet")
            .field("bearer_token", &redact(self.token()))
            .field("session_context", &redact(&self.session_context))
            .finish()
    }
}

pub(crate) fn strip_bearer(value: &str) -> &str {
    let value = value.trim_start();

    match value.get(..7) {
        Some(prefix) if prefix.eq_ignore_ascii_case("bearer ") => value[7..].trim(),
        _ => value.trim_end(),
    }
}

/// First few characters of a secret, safe for logs.
pub(crate) fn redact(value: &str) -> String {
    let visible = value.chars().take(6).collect::<String>();

    if visible.len() == value.len() {
        "*".repeat(value.len())
    } else {
        format!("{}... ({} chars)", visible, value.chars().count())
    }
}

fn decode_base64_object(raw: &str) -> Option<(Map<String, Value>, String)> {
    let engines = [
        &general_purpose::STANDARD,
        &general_purpose::STANDARD_NO_PAD,
        &general_purpose::URL_SAFE,
        &general_purpose::URL_SAFE_NO_PAD,
    ];

    engines.into_iter().enumerate().find_map(|(i, engine)| {
        let decoded = engine.decode(raw).ok()?;
        let object = parse_object(&decoded)?;
        let encoded = if i == 0 {
            raw.to_owned()
        } else {
            general_purpose::STANDARD.encode(&decoded)
        };
        Some((object, encoded))
    })
}

fn parse_object(data: &[u8]) -> Option<Map<String, Value>> {
    match serde_json::from_slice::<Value>(data).ok()? {
        Value::Object(x) => Some(x),
        _ => None,
    }
}

fn field(object: &Map<String, Value>, name: &str) -> String {
    match object.get(name) {
        Some(Value::String(x)) => x.to_owned(),
        Some(Value::Null) | None => String::new(),
        Some(x) => x.to_string(),
    }
}
