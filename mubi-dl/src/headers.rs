use crate::{CredentialSet, Error, Result, credentials::redact};
use log::debug;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use std::fmt;

pub const SESSION_CONTEXT_HEADER: &str = "dt-custom-data";

/// Authentication headers derived from a valid [`CredentialSet`].
///
/// Values are fixed at construction, any change means synthesizing a new set.
#[derive(Clone, PartialEq, Eq)]
pub struct HeaderSet {
    authorization: String,
    session_context: String,
    session_id: String,
}

impl HeaderSet {
    /// Validate credentials and derive `Authorization` and session context headers.
    pub fn synthesize(credentials: &CredentialSet) -> Result<Self> {
        if !credentials.validate() {
            return Err(Error::Authentication(
                "credentials did not pass validation (token and session context with userId, sessionId, merchant are required)"
                    .to_owned(),
            ));
        }

        let session = credentials.session()?;
        let headers = Self {
            authorization: format!("Bearer {}", credentials.token()),
            session_context: session.encoded,
            session_id: session.session_id,
        };

        debug!("synthesized auth headers {:?}", headers);
        Ok(headers)
    }

    /// Value of the `Authorization` header.
    pub fn authorization(&self) -> &str {
        &self.authorization
    }

    /// Base64 encoded session context.
    pub fn session_context(&self) -> &str {
        &self.session_context
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// The two entries as `(name, value)` pairs.
    pub fn entries(&self) -> [(&'static str, &str); 2] {
        [
            ("authorization", &self.authorization),
            (SESSION_CONTEXT_HEADER, &self.session_context),
        ]
    }

    pub fn to_header_map(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();

        for (name, value) in self.entries() {
            headers.insert(
                HeaderName::from_static(name),
                HeaderValue::from_str(value).map_err(|_| {
                    Error::Authentication(format!("{} is not a valid header value", name))
                })?,
            );
        }

        Ok(headers)
    }

    /// Transport headers with the authentication entries layered on top.
    pub fn merged_with(&self, transport: &HeaderMap) -> Result<HeaderMap> {
        let mut headers = transport.clone();
        headers.extend(self.to_header_map()?);
        Ok(headers)
    }
}

impl fmt::Debug for HeaderSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeaderSet")
            .field("authorization", &redact(&self.authorization))
            .field("session_context", &redact(&self.session_context))
            .finish()
    }
}

/// Client identification headers the catalog api expects from its web player.
pub fn transport_headers(country: &str, user_agent: &str) -> Result<HeaderMap> {
    let pairs = [
        ("accept", "application/json"),
        ("accept-language", "en-US,en;q=0.9"),
        ("client", "web"),
        ("client-version", "1.0.0"),
        ("client-device", "desktop"),
        ("client-device-info", "Windows NT 10.0"),
        ("client-capabilities", "drm-widevine"),
        ("client-accept-audio-codecs", "aac"),
        ("client-accept-video-codecs", "h265,vp9,h264"),
        ("origin", "https://mubi.com"),
        ("referer", "https://mubi.com/"),
        (
            "sec-ch-ua",
            "\"Not A(Brand\";v=\"99\", \"Google Chrome\";v=\"121\", \"Chromium\";v=\"121\"",
        ),
        ("sec-ch-ua-mobile", "?0"),
        ("sec-ch-ua-platform", "\"Windows\""),
        ("sec-fetch-dest", "empty"),
        ("sec-fetch-mode", "cors"),
        ("sec-fetch-site", "same-site"),
    ];

    let mut headers = HeaderMap::new();

    for (name, value) in pairs {
        headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
    }

    headers.insert(
        HeaderName::from_static("client-country"),
        HeaderValue::from_str(&country.to_uppercase())
            .map_err(|_| Error::Authentication(format!("invalid country code '{}'", country)))?,
    );
    headers.insert(
        header::USER_AGENT,
        HeaderValue::from_str(user_agent)
            .map_err(|_| Error::Authentication("invalid user agent".to_owned()))?,
    );

    Ok(headers)
}
