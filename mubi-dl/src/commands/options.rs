use crate::{
    Config,
    config::{LicenseHeaders, PsshLayout},
};
use anyhow::Result;
use clap::Args;
use reqwest::{Proxy, blocking::Client};
use std::{path::PathBuf, time::Duration};

#[derive(Args, Clone, Debug, Default)]
pub struct ClientOptions {
    /// Two letter country code sent to the catalog.
    /// Detected from the public ip address when not set.
    #[arg(long, help_heading = "Client Options")]
    pub country: Option<String>,

    /// Set http(s) / socks proxy address for requests.
    #[arg(long, help_heading = "Client Options")]
    pub proxy: Option<String>,

    /// Update and set user agent header for requests.
    #[arg(long, help_heading = "Client Options")]
    pub user_agent: Option<String>,

    #[arg(long, hide = true)]
    pub api_url: Option<String>,

    #[arg(long, hide = true)]
    pub search_url: Option<String>,

    #[arg(long, hide = true)]
    pub geolocation_url: Option<String>,
}

impl ClientOptions {
    pub fn apply(&self, config: &mut Config) {
        config.country = self.country.as_ref().map(|x| x.trim().to_uppercase());
        config.proxy = self.proxy.clone();

        if let Some(x) = &self.user_agent {
            config.user_agent = x.clone();
        }

        if let Some(x) = &self.api_url {
            config.api_url = x.clone();
        }

        if let Some(x) = &self.search_url {
            config.search_url = x.clone();
        }

        if let Some(x) = &self.geolocation_url {
            config.geolocation_url = x.clone();
        }
    }
}

#[derive(Args, Clone, Debug, Default)]
pub struct AuthOptions {
    /// Cookies exported from a logged in browser session.
    /// Netscape cookies.txt, json array or document.cookie text.
    #[arg(long, help_heading = "Authentication Options", value_name = "PATH")]
    pub cookies: Option<PathBuf>,

    /// Never open a browser window for logging in.
    #[arg(long, help_heading = "Authentication Options")]
    pub no_browser_login: bool,

    /// Never prompt for the authToken and dtCustomData values.
    #[arg(long, help_heading = "Authentication Options")]
    pub no_manual_login: bool,

    #[arg(long, hide = true)]
    pub login_url: Option<String>,
}

impl AuthOptions {
    pub fn apply(&self, config: &mut Config) {
        config.cookies = self.cookies.clone();
        config.browser_login = !self.no_browser_login;
        config.manual_login = !self.no_manual_login;

        if let Some(x) = &self.login_url {
            config.login_url = x.clone();
        }
    }
}

#[derive(Args, Clone, Debug, Default)]
pub struct KeyOptions {
    /// Remote widevine key service.
    #[arg(long, help_heading = "Key Options", value_name = "URL")]
    pub key_service: Option<String>,

    /// License proxy the key service should talk to.
    #[arg(long, help_heading = "Key Options", value_name = "URL")]
    pub license_url: Option<String>,

    /// Give up on the key service after this many seconds.
    #[arg(long, help_heading = "Key Options", value_name = "SECONDS", default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..=600))]
    pub key_timeout: u64,

    /// Shape of the headers field sent to the key service.
    #[arg(long, help_heading = "Key Options", value_enum, default_value_t = LicenseHeaders::Structured)]
    pub license_headers: LicenseHeaders,

    /// Data layout of the pssh box sent to the key service.
    #[arg(long, help_heading = "Key Options", value_enum, default_value_t = PsshLayout::Raw)]
    pub pssh_layout: PsshLayout,
}

impl KeyOptions {
    pub fn apply(&self, config: &mut Config) {
        if let Some(x) = &self.key_service {
            config.key_service_url = x.clone();
        }

        if let Some(x) = &self.license_url {
            config.license_url = x.clone();
        }

        config.key_timeout = Duration::from_secs(self.key_timeout);
        config.license_headers = self.license_headers;
        config.pssh_layout = self.pssh_layout;
    }
}

/// Shared blocking client, without the key service timeout.
pub fn client(config: &Config) -> Result<Client> {
    let mut builder = Client::builder().user_agent(&config.user_agent);

    if let Some(proxy) = &config.proxy {
        builder = builder.proxy(Proxy::all(proxy)?);
    }

    Ok(builder.build()?)
}
