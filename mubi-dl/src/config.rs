use clap::ValueEnum;
use std::{path::PathBuf, time::Duration};
use wv_pssh::PsshPayload;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36 Edg/121.0.0.0";

/// Everything a run needs, built once from command line arguments.
#[derive(Clone, Debug)]
pub struct Config {
    pub api_url: String,
    pub search_url: String,
    pub geolocation_url: String,
    pub login_url: String,
    pub key_service_url: String,
    pub license_url: String,
    pub key_timeout: Duration,
    pub license_headers: LicenseHeaders,
    pub pssh_layout: PsshLayout,
    pub country: Option<String>,
    pub output: PathBuf,
    pub temp_dir: Option<PathBuf>,
    pub downloader: String,
    pub decrypter: String,
    pub cookies: Option<PathBuf>,
    pub browser_login: bool,
    pub manual_login: bool,
    pub user_agent: String,
    pub proxy: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: "https://api.mubi.com/v3".to_owned(),
            search_url: "https://whatsonmubi.com/".to_owned(),
            geolocation_url: "http://ip-api.com/json/".to_owned(),
            login_url: "https://mubi.com/login".to_owned(),
            key_service_url: "https://cdrm-project.com/api/cdm/L3".to_owned(),
            license_url: "https://lic.drmtoday.com/license-proxy-widevine/cenc/?specConform=true"
                .to_owned(),
            key_timeout: Duration::from_secs(30),
            license_headers: LicenseHeaders::Structured,
            pssh_layout: PsshLayout::Raw,
            country: None,
            output: PathBuf::from("download"),
            temp_dir: None,
            downloader: "N_m3u8DL-RE".to_owned(),
            decrypter: "shaka-packager".to_owned(),
            cookies: None,
            browser_login: true,
            manual_login: true,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            proxy: None,
        }
    }
}

impl Config {
    /// Directory the downloader uses for its segments.
    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir
            .clone()
            .unwrap_or_else(|| self.output.join("temp"))
    }
}

/// Shape of the `headers` field sent to the key service.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LicenseHeaders {
    /// Session context string as is.
    Raw,
    /// Object with session context and authorization headers.
    #[default]
    Structured,
}

/// Data layout of the generated pssh box.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum PsshLayout {
    /// 48 byte box carrying the raw key id.
    #[default]
    Raw,
    /// 50 byte box carrying a widevine header with the key id.
    Widevine,
}

impl From<PsshLayout> for PsshPayload {
    fn from(value: PsshLayout) -> Self {
        match value {
            PsshLayout::Raw => PsshPayload::Raw,
            PsshLayout::Widevine => PsshPayload::WidevineHeader,
        }
    }
}
