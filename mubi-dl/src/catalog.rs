/*
    The catalog api answers per title:

    GET /films/{id}                     -> { "title": .., "available": bool, .. }
    GET /films/{id}/viewing/secure_url  -> { "url": "https://..mpd", "mux": { .. } }

    422 from either means the session context is no longer accepted.
*/

use crate::{Error, HeaderSet, Result, error::snippet};
use log::{debug, info, warn};
use regex::Regex;
use reqwest::{
    StatusCode,
    blocking::Client,
    header::{self, HeaderMap},
};
use serde::Deserialize;
use serde_json::Value;
use std::sync::LazyLock;

static DEFAULT_KID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"default_KID\s*=\s*"([0-9a-fA-F{}\-\s]+)""#).unwrap());

/// Resolves a title to its secure manifest and the key id protecting it.
pub trait Catalog {
    /// Time limited manifest url for a title.
    fn secure_manifest(&self, film_id: &str, headers: &HeaderSet) -> Result<String>;

    /// Raw default key id found in the manifest.
    fn manifest_kid(&self, manifest_url: &str) -> Result<String>;
}

/// Blocking http implementation of [`Catalog`].
pub struct CatalogClient {
    api_url: String,
    client: Client,
    country: String,
    transport: HeaderMap,
}

impl CatalogClient {
    pub fn new(
        client: Client,
        api_url: impl Into<String>,
        country: impl Into<String>,
        transport: HeaderMap,
    ) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_owned(),
            client,
            country: country.into(),
            transport,
        }
    }

    fn get(&self, url: &str, headers: &HeaderSet) -> Result<(StatusCode, String)> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .headers(headers.merged_with(&self.transport)?)
            .send()?;
        let status = response.status();
        let body = response.text()?;
        debug!("catalog responded ({}): {}", status, snippet(&body));
        Ok((status, body))
    }
}

impl Catalog for CatalogClient {
    fn secure_manifest(&self, film_id: &str, headers: &HeaderSet) -> Result<String> {
        let (status, body) = self.get(&format!("{}/films/{}", self.api_url, film_id), headers)?;
        check_availability(status.as_u16(), &body, film_id, &self.country)?;

        let (status, body) = self.get(
            &format!("{}/films/{}/viewing/secure_url", self.api_url, film_id),
            headers,
        )?;
        let url = parse_secure_url(status.as_u16(), &body)?;
        info!("Resolved secure manifest for film {}", film_id);
        Ok(url)
    }

    fn manifest_kid(&self, manifest_url: &str) -> Result<String> {
        debug!("GET {}", manifest_url);
        let response = self
            .client
            .get(manifest_url)
            .header(
                header::USER_AGENT,
                self.transport
                    .get(header::USER_AGENT)
                    .cloned()
                    .unwrap_or(header::HeaderValue::from_static("mubi-dl")),
            )
            .send()?;
        let status = response.status();
        let text = response.text()?;

        if !status.is_success() {
            return Err(Error::Catalog {
                status: status.as_u16(),
                body: text,
            });
        }

        find_default_kid(&text).ok_or_else(|| Error::MissingEncryptionMetadata {
            url: manifest_url.to_owned(),
        })
    }
}

#[derive(Deserialize)]
struct FilmResponse {
    #[serde(default)]
    title: Option<String>,
    /// Present but `null` counts as unavailable.
    #[serde(default, deserialize_with = "present")]
    available: Option<Value>,
}

fn present<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(x) => !x,
        Value::Number(x) => x.as_f64() == Some(0.0),
        Value::String(x) => x.is_empty(),
        Value::Array(x) => x.is_empty(),
        Value::Object(x) => x.is_empty(),
    }
}

/// Fail on rejected sessions and on titles explicitly marked unavailable.
pub fn check_availability(status: u16, body: &str, film_id: &str, country: &str) -> Result<()> {
    check_auth(status, body)?;

    if !(200..300).contains(&status) {
        return Err(Error::Catalog {
            status,
            body: body.to_owned(),
        });
    }

    match serde_json::from_str::<FilmResponse>(body) {
        Ok(FilmResponse {
            available: Some(available),
            title,
        }) if is_falsy(&available) => Err(Error::RegionRestricted {
            title: title.unwrap_or_else(|| film_id.to_owned()),
            country: country.to_owned(),
        }),
        Ok(_) => Ok(()),
        Err(e) => {
            warn!("could not read availability of film {}: {}", film_id, e);
            Ok(())
        }
    }
}

/// Pull the manifest url out of a secure url response.
pub fn parse_secure_url(status: u16, body: &str) -> Result<String> {
    check_auth(status, body)?;

    if !(200..300).contains(&status) {
        return Err(Error::Catalog {
            status,
            body: body.to_owned(),
        });
    }

    let value = serde_json::from_str::<Value>(body)
        .map_err(|_| Error::ManifestUnavailable(body.to_owned()))?;

    match value.get("url").and_then(|x| x.as_str()) {
        Some(url) if !url.trim().is_empty() => Ok(url.trim().to_owned()),
        _ => Err(Error::ManifestUnavailable(
            value
                .get("errors")
                .map(|x| x.to_string())
                .unwrap_or_else(|| body.to_owned()),
        )),
    }
}

fn check_auth(status: u16, body: &str) -> Result<()> {
    if status == 401 || status == 422 {
        return Err(Error::SessionExpired {
            status,
            body: body.to_owned(),
        });
    }

    Ok(())
}

/// First `default_KID="..."` value in a manifest, namespace prefix ignored.
pub fn find_default_kid(manifest: &str) -> Option<String> {
    DEFAULT_KID_RE
        .captures(manifest)
        .and_then(|x| x.get(1))
        .map(|x| x.as_str().trim().to_owned())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Geolocation {
    country_code: Option<String>,
}

/// Two letter country code of the caller's public ip.
pub fn detect_country(client: &Client, url: &str) -> Option<String> {
    let response = client.get(url).send().ok()?;
    let location = response.json::<Geolocation>().ok()?;
    location.country_code.map(|x| x.to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<MPD xmlns="urn:mpeg:dash:schema:mpd:2011" xmlns:cenc="urn:mpeg:cenc:2013">
  <Period>
    <AdaptationSet mimeType="video/mp4">
      <ContentProtection schemeIdUri="urn:mpeg:dash:mp4protection:2011" value="cenc" cenc:default_KID="12345678-1234-1234-1234-123456789012"/>
      <ContentProtection schemeIdUri="urn:uuid:edef8ba9-79d6-4ace-a3c8-27dcd51d21ed"/>
    </AdaptationSet>
    <AdaptationSet mimeType="audio/mp4">
      <ContentProtection schemeIdUri="urn:mpeg:dash:mp4protection:2011" value="cenc" cenc:default_KID="abcdefab-cdef-abcd-efab-cdefabcdefab"/>
    </AdaptationSet>
  </Period>
</MPD>"#;

    #[test]
    fn test_find_first_default_kid() {
        assert_eq!(
            find_default_kid(MANIFEST).as_deref(),
            Some("12345678-1234-1234-1234-123456789012")
        );
    }

    #[test]
    fn test_missing_default_kid() {
        assert_eq!(find_default_kid("<MPD><Period/></MPD>"), None);
    }

    #[test]
    fn test_unavailable_title() {
        let err = check_availability(200, r#"{"title":"Stalker","available":false}"#, "42", "FR")
            .unwrap_err();

        match err {
            Error::RegionRestricted { title, country } => {
                assert_eq!(title, "Stalker");
                assert_eq!(country, "FR");
            }
            x => panic!("unexpected {:?}", x),
        }
    }

    #[test]
    fn test_availability_field_absent() {
        assert!(check_availability(200, r#"{"title":"Stalker"}"#, "42", "FR").is_ok());
        assert!(check_availability(200, r#"{"available":true}"#, "42", "FR").is_ok());
    }

    #[test]
    fn test_null_availability_is_unavailable() {
        assert!(matches!(
            check_availability(200, r#"{"title":"Stalker","available":null}"#, "42", "FR"),
            Err(Error::RegionRestricted { .. })
        ));
        assert!(matches!(
            check_availability(200, r#"{"available":0}"#, "42", "FR"),
            Err(Error::RegionRestricted { .. })
        ));
    }

    #[test]
    fn test_session_expired_is_distinct() {
        assert!(matches!(
            parse_secure_url(422, r#"{"message":"invalid"}"#),
            Err(Error::SessionExpired { status: 422, .. })
        ));
        assert!(matches!(
            check_availability(401, "", "42", "FR"),
            Err(Error::SessionExpired { status: 401, .. })
        ));
    }

    #[test]
    fn test_generic_catalog_failure() {
        match parse_secure_url(500, r#"{"message":"boom"}"#) {
            Err(Error::Catalog { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body, r#"{"message":"boom"}"#);
            }
            x => panic!("unexpected {:?}", x),
        }
    }

    #[test]
    fn test_secure_url() {
        assert_eq!(
            parse_secure_url(200, r#"{"url":"https://cdn.example/film.mpd","mux":{}}"#).unwrap(),
            "https://cdn.example/film.mpd"
        );
    }

    #[test]
    fn test_secure_url_missing() {
        match parse_secure_url(200, r#"{"errors":["not entitled"]}"#) {
            Err(Error::ManifestUnavailable(body)) => assert_eq!(body, r#"["not entitled"]"#),
            x => panic!("unexpected {:?}", x),
        }
        assert!(matches!(
            parse_secure_url(200, r#"{"url":""}"#),
            Err(Error::ManifestUnavailable(_))
        ));
        assert!(matches!(
            parse_secure_url(200, "<html>"),
            Err(Error::ManifestUnavailable(_))
        ));
    }
}
