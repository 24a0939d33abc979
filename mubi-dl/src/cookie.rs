/*
    REFERENCES
    ----------

    1. https://docs.rs/headless_chrome/1.0.17/headless_chrome/protocol/cdp/Network/struct.CookieParam.html
    2. https://curl.se/docs/http-cookies.html (netscape cookie file format)

*/

use crate::{CredentialSet, Error, Result};
use cookie::Cookie;
use log::debug;
use serde::Deserialize;

pub const AUTH_TOKEN_COOKIE: &str = "authToken";
pub const SESSION_CONTEXT_COOKIE: &str = "dtCustomData";
pub const SERVICE_DOMAIN: &str = "mubi.com";

/// Browser cookie, field names as exported by puppeteer and devtools.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct CookieParam {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub secure: Option<bool>,
    #[serde(default)]
    #[serde(rename = "httpOnly")]
    pub http_only: Option<bool>,
    #[serde(default)]
    pub expires: Option<f64>,
}

impl CookieParam {
    pub fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.to_owned(),
            value: value.to_owned(),
            ..Default::default()
        }
    }

    pub fn with_domain(mut self, domain: &str) -> Self {
        self.domain = Some(domain.to_owned());
        self
    }

    /// Cookies without a domain are assumed to belong to the requested one.
    pub fn matches_domain(&self, domain: &str) -> bool {
        match &self.domain {
            Some(x) => {
                let x = x.trim().trim_start_matches('.');
                x == domain || x.ends_with(&format!(".{}", domain))
            }
            None => true,
        }
    }

    /// Value with percent escapes decoded.
    pub fn decoded_value(&self) -> String {
        if !self.value.contains('%') {
            return self.value.clone();
        }

        Cookie::parse_encoded(format!("{}={}", self.name, self.value))
            .map(|x| x.value().to_owned())
            .unwrap_or_else(|_| self.value.clone())
    }
}

/// Parse a json cookie array, a netscape `cookies.txt` or a `document.cookie` string.
pub fn parse_cookies(text: &str) -> Result<Vec<CookieParam>> {
    let text = text.trim_start_matches('\u{feff}').trim();

    if text.starts_with('[') {
        return Ok(serde_json::from_str::<Vec<CookieParam>>(text)?);
    }

    if text.starts_with("# Netscape") || text.starts_with("# HTTP Cookie File") || text.contains('\t')
    {
        return Ok(parse_netscape(text));
    }

    let mut cookies = Vec::new();

    for cookie in Cookie::split_parse(text) {
        match cookie {
            Ok(x) => cookies.push(CookieParam::new(x.name(), x.value())),
            Err(e) => {
                return Err(Error::Authentication(format!(
                    "could not split parse cookies ({})",
                    e
                )));
            }
        }
    }

    Ok(cookies)
}

fn parse_netscape(text: &str) -> Vec<CookieParam> {
    text.lines()
        .filter_map(|line| {
            // curl marks http only cookies with this prefix instead of a comment.
            let line = line.strip_prefix("#HttpOnly_").unwrap_or(line);

            if line.trim().is_empty() || line.starts_with('#') {
                return None;
            }

            let fields = line.trim_end_matches(['\r', '\n']).split('\t').collect::<Vec<_>>();

            if fields.len() < 7 {
                debug!("skipping malformed cookie line with {} fields", fields.len());
                return None;
            }

            Some(CookieParam {
                name: fields[5].to_owned(),
                value: fields[6].to_owned(),
                domain: Some(fields[0].to_owned()),
                path: Some(fields[2].to_owned()),
                secure: Some(fields[3].eq_ignore_ascii_case("TRUE")),
                http_only: None,
                expires: fields[4].parse::<f64>().ok(),
            })
        })
        .collect()
}

/// Credential set from the service's `authToken` and `dtCustomData` cookies.
pub fn extract_credentials(cookies: &[CookieParam], domain: &str) -> Result<CredentialSet> {
    let find = |name: &str| {
        cookies
            .iter()
            .filter(|x| x.name == name && x.matches_domain(domain))
            .map(|x| x.decoded_value())
            .find(|x| !x.trim().is_empty())
    };

    match (find(AUTH_TOKEN_COOKIE), find(SESSION_CONTEXT_COOKIE)) {
        (Some(token), Some(context)) => Ok(CredentialSet::new(token, context)),
        (token, context) => {
            let missing = [
                (token.is_none(), AUTH_TOKEN_COOKIE),
                (context.is_none(), SESSION_CONTEXT_COOKIE),
            ]
            .iter()
            .filter(|x| x.0)
            .map(|x| x.1)
            .collect::<Vec<_>>()
            .join(", ");

            Err(Error::Authentication(format!(
                "{} cookie(s) for {} not found",
                missing, domain
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_netscape_file() {
        let text = "# Netscape HTTP Cookie File\n\
            # generated by a browser extension\n\
            .mubi.com\tTRUE\t/\tTRUE\t1767225600\tauthToken\ttok\n\
            #HttpOnly_.mubi.com\tTRUE\t/\tFALSE\t0\tdtCustomData\teyJ1c2VySWQiOjF9%3D\n\
            .example.com\tTRUE\t/\tFALSE\t0\tauthToken\tother\n";
        let cookies = parse_cookies(text).unwrap();

        assert_eq!(cookies.len(), 3);
        assert_eq!(cookies[0].name, "authToken");
        assert_eq!(cookies[0].secure, Some(true));
        assert_eq!(cookies[1].decoded_value(), "eyJ1c2VySWQiOjF9=");
        assert!(!cookies[2].matches_domain(SERVICE_DOMAIN));
    }

    #[test]
    fn test_json_cookies() {
        let cookies = parse_cookies(
            r#"[{"name":"authToken","value":"tok","domain":"mubi.com","httpOnly":true},
                {"name":"dtCustomData","value":"ctx","domain":".mubi.com"}]"#,
        )
        .unwrap();
        let credentials = extract_credentials(&cookies, SERVICE_DOMAIN).unwrap();

        assert_eq!(credentials.bearer_token, "tok");
        assert_eq!(credentials.session_context, "ctx");
    }

    #[test]
    fn test_document_cookie() {
        let cookies = parse_cookies("authToken=tok; dtCustomData=ctx; _ga=GA1.2").unwrap();
        assert_eq!(cookies.len(), 3);
        assert!(extract_credentials(&cookies, SERVICE_DOMAIN).is_ok());
    }

    #[test]
    fn test_foreign_domain_ignored() {
        let cookies = vec![
            CookieParam::new("authToken", "tok").with_domain("evil.com"),
            CookieParam::new("dtCustomData", "ctx").with_domain("www.mubi.com"),
        ];

        match extract_credentials(&cookies, SERVICE_DOMAIN) {
            Err(Error::Authentication(x)) => assert!(x.contains("authToken")),
            x => panic!("unexpected {:?}", x),
        }
    }
}
