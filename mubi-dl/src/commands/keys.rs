use super::{
    options::{AuthOptions, ClientOptions, KeyOptions},
    session::{Session, resolve_title},
};
use crate::{Config, Error, MediaTools, Pipeline, tools::{DecryptRequest, DownloadRequest}};
use anyhow::Result;
use clap::Args;
use kdam::term::Colorizer;

/// Print the content key and manifest url of a title without downloading it.
#[derive(Args, Clone, Debug)]
pub struct Keys {
    /// Film id or search query.
    #[arg(required = true, value_name = "ID|QUERY")]
    pub query: String,

    /// Print every key pair returned instead of the selected one.
    #[arg(long)]
    pub all: bool,

    #[command(flatten)]
    pub auth: AuthOptions,

    #[command(flatten)]
    pub client: ClientOptions,

    #[command(flatten)]
    pub key: KeyOptions,
}

/// Key acquisition never reaches the tools.
struct NoTools;

impl MediaTools for NoTools {
    fn download(&self, _: &DownloadRequest) -> crate::Result<()> {
        Err(Error::Tool {
            program: "downloader".to_owned(),
            reason: "is not available when only printing keys".to_owned(),
        })
    }

    fn decrypt(&self, _: &DecryptRequest) -> crate::Result<()> {
        Err(Error::Tool {
            program: "decrypter".to_owned(),
            reason: "is not available when only printing keys".to_owned(),
        })
    }
}

impl Keys {
    pub fn config(&self) -> Config {
        let mut config = Config::default();
        self.auth.apply(&mut config);
        self.client.apply(&mut config);
        self.key.apply(&mut config);
        config
    }

    pub fn execute(self) -> Result<()> {
        let session = Session::open(self.config())?;
        let title = resolve_title(&session.search, &self.query)?;
        let acquisition = Pipeline::new(
            &session.config,
            &session.credentials,
            &session.catalog,
            &session.keys,
            &NoTools,
        )
        .with_interrupt(session.interrupted.clone())
        .acquire_key(&title)?;

        println!("{} {}", "Title".colorize("bold cyan"), title.full_title());
        println!("{} {}", "KID".colorize("bold cyan"), acquisition.kid);
        println!("{} {}", "PSSH".colorize("bold cyan"), acquisition.pssh);
        println!(
            "{} {}",
            "Manifest".colorize("bold cyan"),
            acquisition.manifest_url
        );

        if self.all {
            for pair in &acquisition.pairs {
                println!("{} {}:{}", "Key".colorize("bold green"), pair.kid, pair.key);
            }
        } else {
            println!("{} {}", "Key".colorize("bold green"), acquisition.key);
        }

        Ok(())
    }
}
