//! Key exchange against a remote widevine key resolution service.
//!
//! The service receives the pssh box, the license proxy url and the session
//! context, talks to the license proxy itself and answers with content keys.
//! Two response contracts have been observed over time:
//!
//! 1. `{"keys": [{"kid": "..", "key": ".."}, ..]}`
//! 2. free text (or a json `message`) holding `kid:key` lines.
//!
//! Both are accepted, structured first.

use crate::{Error, HeaderSet, Result, config::LicenseHeaders, error::snippet};
use log::{debug, info};
use regex::Regex;
use reqwest::{
    Proxy,
    blocking::Client,
    header::{self, HeaderValue},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{collections::BTreeMap, fmt, sync::LazyLock, time::Duration};

static KEY_PAIR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9a-fA-F]{16,}):([0-9a-fA-F]{16,})").unwrap());

/// Content key and the key id it belongs to, both lowercase hex.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyPair {
    pub kid: String,
    pub key: String,
}

impl KeyPair {
    /// Returns `None` unless both values are at least 16 hex characters.
    pub fn new(kid: &str, key: &str) -> Option<Self> {
        let kid = kid.trim().replace('-', "").to_ascii_lowercase();
        let key = key.trim().to_ascii_lowercase();

        if is_hex16(&kid) && is_hex16(&key) {
            Some(Self { kid, key })
        } else {
            None
        }
    }
}

fn is_hex16(value: &str) -> bool {
    value.len() >= 16 && value.chars().all(|c| c.is_ascii_hexdigit())
}

/// `key_id=<kid>:key=<key>`, as taken by the decrypter's `--keys` flag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormattedKey(String);

impl FormattedKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&KeyPair> for FormattedKey {
    fn from(pair: &KeyPair) -> Self {
        Self(format!("key_id={}:key={}", pair.kid, pair.key))
    }
}

impl fmt::Display for FormattedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for FormattedKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Format the first pair in response order.
///
/// No re-ranking is done, the service is expected to list the content key first.
pub fn select_and_format(pairs: &[KeyPair]) -> Result<FormattedKey> {
    pairs.first().map(FormattedKey::from).ok_or(Error::NoKeyPairs)
}

/// Body sent to the key service.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LicenseRequest {
    pub license: String,
    pub headers: RequestHeaders,
    pub pssh: String,
    #[serde(rename = "buildInfo")]
    pub build_info: BuildInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Capabilities>,
    pub proxy: String,
    pub cache: bool,
}

/// The service has been seen accepting either form.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RequestHeaders {
    Raw(String),
    Structured(BTreeMap<String, String>),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BuildInfo {
    Empty(String),
    Client {
        #[serde(rename = "type")]
        typ: String,
        version: String,
        architecture: String,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub security_level: u8,
    pub hdcp_version: String,
    pub supported_key_systems: Vec<String>,
}

impl LicenseRequest {
    pub fn new(
        license_url: &str,
        pssh: String,
        headers: &HeaderSet,
        shape: LicenseHeaders,
    ) -> Self {
        match shape {
            LicenseHeaders::Raw => Self {
                license: license_url.to_owned(),
                headers: RequestHeaders::Raw(headers.session_context().to_owned()),
                pssh,
                build_info: BuildInfo::Empty(String::new()),
                capabilities: None,
                proxy: String::new(),
                cache: false,
            },
            LicenseHeaders::Structured => Self {
                license: license_url.to_owned(),
                headers: RequestHeaders::Structured(BTreeMap::from([
                    (
                        "dt-custom-data".to_owned(),
                        headers.session_context().to_owned(),
                    ),
                    (
                        "authorization".to_owned(),
                        format!("Bearer {}", headers.session_id()),
                    ),
                ])),
                pssh,
                build_info: BuildInfo::Client {
                    typ: "chrome".to_owned(),
                    version: "121.0.0.0".to_owned(),
                    architecture: "x86_64".to_owned(),
                },
                capabilities: Some(Capabilities {
                    security_level: 3,
                    hdcp_version: "HDCP_V2_2".to_owned(),
                    supported_key_systems: vec!["com.widevine.alpha".to_owned()],
                }),
                proxy: String::new(),
                cache: false,
            },
        }
    }
}

/// Resolves content keys for a license request.
pub trait KeyService {
    fn request_keys(&self, request: &LicenseRequest) -> Result<Vec<KeyPair>>;
}

/// Blocking http implementation of [`KeyService`] with a hard timeout.
pub struct KeyExchangeClient {
    client: Client,
    timeout: Duration,
    url: String,
}

impl KeyExchangeClient {
    pub fn new(
        url: impl Into<String>,
        timeout: Duration,
        user_agent: &str,
        proxy: Option<&str>,
    ) -> Result<Self> {
        let mut builder = Client::builder().timeout(timeout).user_agent(user_agent);

        if let Some(proxy) = proxy {
            builder = builder.proxy(Proxy::all(proxy)?);
        }

        Ok(Self {
            client: builder.build()?,
            timeout,
            url: url.into(),
        })
    }

    fn map_err(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::KeyExchangeTimeout {
                seconds: self.timeout.as_secs(),
            }
        } else {
            Error::KeyExchange {
                status: e.status().map(|x| x.as_u16()),
                body: e.to_string(),
            }
        }
    }
}

impl KeyService for KeyExchangeClient {
    fn request_keys(&self, request: &LicenseRequest) -> Result<Vec<KeyPair>> {
        debug!("POST {} (pssh {})", self.url, request.pssh);
        let response = self
            .client
            .post(&self.url)
            .header(header::ACCEPT, HeaderValue::from_static("application/json"))
            .json(request)
            .send()
            .map_err(|e| self.map_err(e))?;
        let status = response.status();
        let body = response.text().map_err(|e| self.map_err(e))?;
        debug!("key service responded ({}): {}", status, snippet(&body));

        if !status.is_success() {
            return Err(Error::KeyExchange {
                status: Some(status.as_u16()),
                body,
            });
        }

        let pairs = parse_key_response(status.as_u16(), &body)?;
        info!("Key service returned {} key pair(s)", pairs.len());
        Ok(pairs)
    }
}

#[derive(Deserialize)]
struct KeysResponse {
    keys: Vec<Value>,
}

/// Structured `keys` array first, then `kid:key` patterns.
///
/// Json bodies are searched through their decoded string values, anything else as raw text.
pub fn parse_key_response(status: u16, body: &str) -> Result<Vec<KeyPair>> {
    let value = serde_json::from_str::<Value>(body).ok();
    let structured = value
        .as_ref()
        .and_then(|x| KeysResponse::deserialize(x).ok());

    if let Some(response) = &structured {
        let pairs = dedup(response.keys.iter().filter_map(|entry| {
            let kid = entry.get("kid")?.as_str()?;
            let key = entry.get("key")?.as_str()?;
            let pair = KeyPair::new(kid, key);

            if pair.is_none() {
                debug!("skipping malformed key entry {}", entry);
            }

            pair
        }));

        if !pairs.is_empty() {
            return Ok(pairs);
        }
    }

    let pairs = match &value {
        Some(value) => {
            let mut texts = Vec::new();
            string_values(value, &mut texts);
            dedup(texts.into_iter().flat_map(extract_key_pairs))
        }
        None => extract_key_pairs(body),
    };

    if !pairs.is_empty() {
        return Ok(pairs);
    }

    match structured {
        Some(_) => Err(Error::NoKeyPairs),
        None => Err(Error::KeyExchange {
            status: Some(status),
            body: body.to_owned(),
        }),
    }
}

fn string_values<'a>(value: &'a Value, texts: &mut Vec<&'a str>) {
    match value {
        Value::String(x) => texts.push(x),
        Value::Array(x) => x.iter().for_each(|y| string_values(y, texts)),
        Value::Object(x) => x.values().for_each(|y| string_values(y, texts)),
        _ => (),
    }
}

/// Every `hex16+:hex16+` occurrence in order of appearance.
pub fn extract_key_pairs(text: &str) -> Vec<KeyPair> {
    dedup(
        KEY_PAIR_RE
            .captures_iter(text)
            .filter_map(|x| KeyPair::new(&x[1], &x[2])),
    )
}

fn dedup(pairs: impl Iterator<Item = KeyPair>) -> Vec<KeyPair> {
    let mut unique = Vec::new();

    for pair in pairs {
        if !unique.contains(&pair) {
            unique.push(pair);
        }
    }

    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CredentialSet;
    use base64::Engine;
    use std::{
        io::{BufRead, BufReader, Read, Write},
        net::{TcpListener, TcpStream},
        thread,
        time::Instant,
    };

    fn headers() -> HeaderSet {
        HeaderSet::synthesize(&CredentialSet::new(
            "tok",
            base64::engine::general_purpose::STANDARD
                .encode(r#"{"userId":"u1","sessionId":"s1","merchant":"m1"}"#),
        ))
        .unwrap()
    }

    #[test]
    fn test_structured_response() {
        let pairs = parse_key_response(
            200,
            r#"{"keys":[{"kid":"abcd1234abcd1234","key":"efef5678efef5678"}]}"#,
        )
        .unwrap();

        assert_eq!(
            pairs,
            vec![KeyPair {
                kid: "abcd1234abcd1234".to_owned(),
                key: "efef5678efef5678".to_owned(),
            }]
        );
    }

    #[test]
    fn test_structured_keeps_order() {
        let pairs = parse_key_response(
            200,
            r#"{"keys":[
                {"kid":"11111111111111111111111111111111","key":"22222222222222222222222222222222","type":"CONTENT"},
                {"kid":"33333333333333333333333333333333","key":"44444444444444444444444444444444","type":"CONTENT"}
            ]}"#,
        )
        .unwrap();

        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].kid, "11111111111111111111111111111111");
    }

    #[test]
    fn test_empty_keys_is_no_key_pairs() {
        assert!(matches!(
            parse_key_response(200, r#"{"keys": []}"#),
            Err(Error::NoKeyPairs)
        ));
    }

    #[test]
    fn test_free_text_fallback() {
        let pairs = parse_key_response(200, "abcd1234abcd1234:efef5678efef5678").unwrap();
        assert_eq!(
            pairs,
            vec![KeyPair {
                kid: "abcd1234abcd1234".to_owned(),
                key: "efef5678efef5678".to_owned(),
            }]
        );
    }

    #[test]
    fn test_message_fallback() {
        let pairs = parse_key_response(
            200,
            r#"{"message":"eb676abbcb345e96bbcf616630f1a3da:100b6c20940f779a4589152b57d2dacb\n63cb5f7184dd4b689a5c5ff11ee6a328:3bda3329158a4789880816a70e7e436d\n"}"#,
        )
        .unwrap();

        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[1].kid, "63cb5f7184dd4b689a5c5ff11ee6a328");
        assert_eq!(pairs[1].key, "3bda3329158a4789880816a70e7e436d");
    }

    #[test]
    fn test_message_escapes_are_decoded() {
        let pairs = parse_key_response(
            200,
            r#"{"message":"\beb676abbcb345e96bbcf616630f1a3da:100b6c20940f779a4589152b57d2dacb\f"}"#,
        )
        .unwrap();

        assert_eq!(pairs[0].kid, "eb676abbcb345e96bbcf616630f1a3da");
        assert_eq!(pairs[0].key, "100b6c20940f779a4589152b57d2dacb");
    }

    #[test]
    fn test_malformed_entries_fall_back_to_pattern() {
        let pairs = parse_key_response(
            200,
            r#"{"keys":[{"kid":"short","key":"x"}],"debug":"abcd1234abcd1234:efef5678efef5678"}"#,
        )
        .unwrap();

        assert_eq!(pairs[0].key, "efef5678efef5678");
    }

    #[test]
    fn test_unrecognized_body_keeps_diagnostics() {
        match parse_key_response(200, "<html>quota exceeded</html>") {
            Err(Error::KeyExchange { status, body }) => {
                assert_eq!(status, Some(200));
                assert_eq!(body, "<html>quota exceeded</html>");
            }
            x => panic!("unexpected {:?}", x),
        }
    }

    #[test]
    fn test_select_first_pair() {
        let pairs = vec![
            KeyPair::new("a1b2c3d4e5f6a7b8", "c3d4e5f6a7b8c9d0").unwrap(),
            KeyPair::new("ffffffffffffffff", "eeeeeeeeeeeeeeee").unwrap(),
        ];

        assert_eq!(
            select_and_format(&pairs).unwrap().as_str(),
            "key_id=a1b2c3d4e5f6a7b8:key=c3d4e5f6a7b8c9d0"
        );
        assert!(matches!(select_and_format(&[]), Err(Error::NoKeyPairs)));
    }

    #[test]
    fn test_key_pair_normalization() {
        let pair = KeyPair::new("EB676ABB-CB34-5E96-BBCF-616630F1A3DA", "100B6C20940F779A").unwrap();
        assert_eq!(pair.kid, "eb676abbcb345e96bbcf616630f1a3da");
        assert_eq!(pair.key, "100b6c20940f779a");
        assert!(KeyPair::new("abcd", "efef5678efef5678").is_none());
    }

    fn request() -> LicenseRequest {
        LicenseRequest::new(
            "https://license.example/proxy",
            "AAAA".to_owned(),
            &headers(),
            LicenseHeaders::Structured,
        )
    }

    fn read_request(stream: &mut TcpStream) -> String {
        let mut reader = BufReader::new(stream);
        let mut length = 0;

        loop {
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();

            if let Some(x) = line.to_ascii_lowercase().strip_prefix("content-length:") {
                length = x.trim().parse().unwrap();
            }

            if line == "\r\n" || line.is_empty() {
                break;
            }
        }

        let mut body = vec![0; length];
        reader.read_exact(&mut body).unwrap();
        String::from_utf8(body).unwrap()
    }

    /// Local server answering one request with `response`, or never when `None`.
    fn serve_once(response: Option<&'static str>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/api", listener.local_addr().unwrap());

        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            read_request(&mut stream);

            match response {
                Some(x) => stream.write_all(x.as_bytes()).unwrap(),
                None => thread::sleep(Duration::from_secs(10)),
            }
        });

        url
    }

    #[test]
    fn test_silent_service_times_out() {
        let url = serve_once(None);
        let client = KeyExchangeClient::new(url, Duration::from_secs(1), "test", None).unwrap();
        let started = Instant::now();

        match client.request_keys(&request()) {
            Err(Error::KeyExchangeTimeout { seconds }) => assert_eq!(seconds, 1),
            x => panic!("unexpected {:?}", x),
        }
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_error_status_keeps_body() {
        let url = serve_once(Some(
            "HTTP/1.1 429 Too Many Requests\r\ncontent-length: 5\r\nconnection: close\r\n\r\nquota",
        ));
        let client = KeyExchangeClient::new(url, Duration::from_secs(5), "test", None).unwrap();

        match client.request_keys(&request()) {
            Err(Error::KeyExchange { status, body }) => {
                assert_eq!(status, Some(429));
                assert_eq!(body, "quota");
            }
            x => panic!("unexpected {:?}", x),
        }
    }

    #[test]
    fn test_keys_over_http() {
        let url = serve_once(Some(
            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 62\r\nconnection: close\r\n\r\n{\"keys\":[{\"kid\":\"abcd1234abcd1234\",\"key\":\"efef5678efef5678\"}]}",
        ));
        let client = KeyExchangeClient::new(url, Duration::from_secs(5), "test", None).unwrap();
        let pairs = client.request_keys(&request()).unwrap();

        assert_eq!(
            select_and_format(&pairs).unwrap().as_str(),
            "key_id=abcd1234abcd1234:key=efef5678efef5678"
        );
    }

    #[test]
    fn test_structured_request_body() {
        let request = LicenseRequest::new(
            "https://license.example/proxy",
            "AAAA".to_owned(),
            &headers(),
            LicenseHeaders::Structured,
        );
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["license"], "https://license.example/proxy");
        assert_eq!(value["pssh"], "AAAA");
        assert_eq!(value["headers"]["dt-custom-data"], headers().session_context());
        assert_eq!(value["headers"]["authorization"], "Bearer s1");
        assert_eq!(value["buildInfo"]["type"], "chrome");
        assert_eq!(value["capabilities"]["securityLevel"], 3);
        assert_eq!(value["cache"], false);
    }

    #[test]
    fn test_raw_request_body() {
        let request = LicenseRequest::new(
            "https://license.example/proxy",
            "AAAA".to_owned(),
            &headers(),
            LicenseHeaders::Raw,
        );
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["headers"], headers().session_context());
        assert_eq!(value["buildInfo"], "");
        assert_eq!(value["proxy"], "");
        assert!(value.get("capabilities").is_none());
    }
}
