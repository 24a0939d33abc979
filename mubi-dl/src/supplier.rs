//! Escalating credential sources tried until one yields a valid set.

use crate::{
    Config, CredentialSet, Error, Result,
    cookie::{self, SERVICE_DOMAIN},
};
use log::{info, warn};
use requestty::{ErrorKind, Question};
use std::{
    fs,
    io::{IsTerminal, stdin},
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

/// Anything able to hand over a credential set.
pub trait CredentialSource {
    /// Short label used in logs and error messages.
    fn name(&self) -> &str;

    fn credentials(&self) -> Result<CredentialSet>;
}

/// Ordered list of sources, asked one after another.
pub struct CredentialSupplier {
    sources: Vec<Box<dyn CredentialSource>>,
    interrupted: Arc<AtomicBool>,
}

impl CredentialSupplier {
    pub fn new(sources: Vec<Box<dyn CredentialSource>>) -> Self {
        Self {
            sources,
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Stop escalating once `interrupted` is set.
    pub fn with_interrupt(mut self, interrupted: Arc<AtomicBool>) -> Self {
        self.interrupted = interrupted;
        self
    }

    /// Cookie file, then browser login, then manual entry, as enabled in `config`.
    pub fn from_config(config: &Config, interrupted: Arc<AtomicBool>) -> Self {
        let mut sources = Vec::<Box<dyn CredentialSource>>::new();

        if let Some(path) = &config.cookies {
            sources.push(Box::new(CookieFileSource::new(path.clone())));
        }

        if let Some(source) = browser_source(config, &interrupted) {
            sources.push(source);
        }

        if config.manual_login {
            sources.push(Box::new(ManualSource));
        }

        Self::new(sources).with_interrupt(interrupted)
    }

    /// First valid credential set, normalized.
    ///
    /// Only [`Error::Interrupted`], or the interrupt flag, stops the escalation early.
    pub fn supply(&self) -> Result<CredentialSet> {
        let mut failures = Vec::new();

        for source in &self.sources {
            self.check_interrupt()?;
            info!("Reading credentials from {}", source.name());

            let result = source.credentials();
            // A source killed by ctrl+c reports its own failure.
            self.check_interrupt()?;

            match result {
                Ok(credentials) => match credentials.session() {
                    Ok(_) if credentials.validate() => return credentials.normalized(),
                    Ok(_) => failures.push(format!("{}: bearer token is empty", source.name())),
                    Err(e) => failures.push(format!("{}: {}", source.name(), e)),
                },
                Err(Error::Interrupted) => return Err(Error::Interrupted),
                Err(e) => failures.push(format!("{}: {}", source.name(), e)),
            }

            if let Some(x) = failures.last() {
                warn!("{}", x);
            }
        }

        if failures.is_empty() {
            return Err(Error::Authentication(
                "no credential source is enabled".to_owned(),
            ));
        }

        Err(Error::Authentication(format!(
            "no source produced valid credentials ({})",
            failures.join("; ")
        )))
    }

    fn check_interrupt(&self) -> Result<()> {
        if self.interrupted.load(Ordering::SeqCst) {
            Err(Error::Interrupted)
        } else {
            Ok(())
        }
    }
}

#[cfg(feature = "browser")]
fn browser_source(
    config: &Config,
    interrupted: &Arc<AtomicBool>,
) -> Option<Box<dyn CredentialSource>> {
    config.browser_login.then(|| {
        Box::new(BrowserLoginSource::new(
            config.login_url.clone(),
            config.proxy.clone(),
            interrupted.clone(),
        )) as Box<dyn CredentialSource>
    })
}

#[cfg(not(feature = "browser"))]
fn browser_source(_: &Config, _: &Arc<AtomicBool>) -> Option<Box<dyn CredentialSource>> {
    None
}

/// Netscape, json or `document.cookie` file holding the service cookies.
pub struct CookieFileSource {
    path: PathBuf,
}

impl CookieFileSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl CredentialSource for CookieFileSource {
    fn name(&self) -> &str {
        "cookie file"
    }

    fn credentials(&self) -> Result<CredentialSet> {
        let text = fs::read_to_string(&self.path).map_err(|e| {
            Error::Authentication(format!("could not read {} ({})", self.path.display(), e))
        })?;
        let cookies = cookie::parse_cookies(&text)?;
        cookie::extract_credentials(&cookies, SERVICE_DOMAIN)
    }
}

/// Visible browser window on the login page, cookies read back over devtools.
#[cfg(feature = "browser")]
pub struct BrowserLoginSource {
    login_url: String,
    proxy: Option<String>,
    wait: std::time::Duration,
    interrupted: Arc<AtomicBool>,
}

#[cfg(feature = "browser")]
impl BrowserLoginSource {
    pub fn new(login_url: String, proxy: Option<String>, interrupted: Arc<AtomicBool>) -> Self {
        Self {
            login_url,
            proxy,
            wait: std::time::Duration::from_secs(300),
            interrupted,
        }
    }
}

#[cfg(feature = "browser")]
impl CredentialSource for BrowserLoginSource {
    fn name(&self) -> &str {
        "browser login"
    }

    fn credentials(&self) -> Result<CredentialSet> {
        use headless_chrome::{Browser, LaunchOptionsBuilder};
        use std::{thread, time::Instant};

        let browser_err = |e: anyhow::Error| Error::Authentication(format!("browser: {}", e));

        info!("Launching browser, log in to continue");
        let browser = Browser::new(
            LaunchOptionsBuilder::default()
                .headless(false)
                .proxy_server(self.proxy.as_deref())
                .idle_browser_timeout(self.wait)
                .build()
                .map_err(|e| Error::Authentication(format!("browser: {}", e)))?,
        )
        .map_err(browser_err)?;
        let tab = browser.new_tab().map_err(browser_err)?;
        tab.navigate_to(&self.login_url).map_err(browser_err)?;

        let started = Instant::now();

        while started.elapsed() < self.wait {
            if self.interrupted.load(Ordering::SeqCst) {
                return Err(Error::Interrupted);
            }

            let cookies = tab
                .get_cookies()
                .map_err(browser_err)?
                .into_iter()
                .map(|x| {
                    cookie::CookieParam::new(&x.name, &x.value).with_domain(&x.domain)
                })
                .collect::<Vec<_>>();

            if let Ok(credentials) = cookie::extract_credentials(&cookies, SERVICE_DOMAIN) {
                info!("Session cookies found, closing browser");
                return Ok(credentials);
            }

            thread::sleep(std::time::Duration::from_secs(2));
        }

        Err(Error::Authentication(format!(
            "no login detected within {} seconds",
            self.wait.as_secs()
        )))
    }
}

/// Interactive prompts for the bearer token and session context.
pub struct ManualSource;

impl CredentialSource for ManualSource {
    fn name(&self) -> &str {
        "manual entry"
    }

    fn credentials(&self) -> Result<CredentialSet> {
        if !stdin().is_terminal() {
            return Err(Error::Authentication(
                "standard input is not a terminal".to_owned(),
            ));
        }

        println!(
            "Open the site logged in, then copy the authToken and dtCustomData cookies \
            from the browser devtools (Application > Cookies)."
        );

        let token = ask(
            Question::password("token")
                .message("authToken (bearer token)")
                .mask('*')
                .build(),
        )?;
        let context = ask(
            Question::password("context")
                .message("dtCustomData (session context)")
                .mask('*')
                .build(),
        )?;

        Ok(CredentialSet::new(token, context))
    }
}

fn ask(question: requestty::Question) -> Result<String> {
    let answer = requestty::prompt_one(question).map_err(|e| match e {
        ErrorKind::Interrupted | ErrorKind::Aborted => Error::Interrupted,
        e => Error::Authentication(format!("prompt failed ({})", e)),
    })?;

    answer
        .as_string()
        .map(|x| x.trim().to_owned())
        .ok_or_else(|| Error::Authentication("prompt returned no text".to_owned()))
}
