use super::{
    options::{AuthOptions, ClientOptions, KeyOptions},
    session::{Session, resolve_title},
};
use crate::{Config, Error, ExternalTools, Pipeline};
use anyhow::{Result, bail};
use clap::Args;
use kdam::term::Colorizer;
use log::error;
use std::path::PathBuf;

/// Download titles and decrypt their video, audio and subtitle tracks.
#[derive(Args, Clone, Debug)]
#[clap(long_about = "Download titles and decrypt their video, audio and subtitle tracks.\n\n\
Requires these tools in the working directory or PATH:\n\
1. N_m3u8DL-RE - https://github.com/nilaoda/N_m3u8DL-RE\n\
2. shaka-packager - https://github.com/shaka-project/shaka-packager\n\n\
Decrypted tracks are saved in <OUTPUT>/<TITLE (YEAR)>/ and are not muxed together.")]
pub struct Download {
    /// Film ids or search queries, processed one after another.
    #[arg(required = true, value_name = "ID|QUERY")]
    pub queries: Vec<String>,

    /// Directory for downloaded and decrypted files.
    #[arg(short, long, help_heading = "Download Options", default_value = "download")]
    pub output: PathBuf,

    /// Directory for temporary segments, <OUTPUT>/temp by default.
    #[arg(long, help_heading = "Download Options")]
    pub temp_dir: Option<PathBuf>,

    /// Segment downloader binary.
    #[arg(long, help_heading = "Download Options", default_value = "N_m3u8DL-RE")]
    pub downloader: String,

    /// Raw key decrypter binary.
    #[arg(long, help_heading = "Download Options", default_value = "shaka-packager")]
    pub decrypter: String,

    #[command(flatten)]
    pub auth: AuthOptions,

    #[command(flatten)]
    pub client: ClientOptions,

    #[command(flatten)]
    pub key: KeyOptions,
}

impl Download {
    pub fn config(&self) -> Config {
        let mut config = Config {
            output: self.output.clone(),
            temp_dir: self.temp_dir.clone(),
            downloader: self.downloader.clone(),
            decrypter: self.decrypter.clone(),
            ..Default::default()
        };
        self.auth.apply(&mut config);
        self.client.apply(&mut config);
        self.key.apply(&mut config);
        config
    }

    pub fn execute(self) -> Result<()> {
        let config = self.config();
        let tools = ExternalTools::locate(&config)?;
        let session = Session::open(config)?;
        let mut failed = 0;

        for query in &self.queries {
            let title = match resolve_title(&session.search, query) {
                Ok(x) => x,
                Err(e) => {
                    error!("{}", e);
                    failed += 1;
                    continue;
                }
            };

            println!(
                "{} {}",
                "Processing".colorize("bold cyan"),
                title.full_title()
            );

            let mut pipeline = Pipeline::new(
                &session.config,
                &session.credentials,
                &session.catalog,
                &session.keys,
                &tools,
            )
            .with_interrupt(session.interrupted.clone());

            match pipeline.run(&title) {
                Ok(outcome) => {
                    println!(
                        "{} {}",
                        "Saved".colorize("bold green"),
                        outcome.directory.display()
                    );
                }
                Err(failure) if matches!(failure.error, Error::Interrupted) => {
                    return Err(failure.into());
                }
                Err(failure) => {
                    error!("{}: {}", title.full_title(), failure);
                    failed += 1;
                }
            }
        }

        if failed > 0 {
            bail!("{} of {} title(s) failed", failed, self.queries.len());
        }

        Ok(())
    }
}
