//! External downloader and decrypter, invoked with structured arguments only.

use crate::{Config, Error, FormattedKey, Result, utils};
use colored::Colorize;
use log::info;
use std::{
    ffi::OsString,
    fmt,
    path::{Path, PathBuf},
    process::Command,
};

/// Segment download of one manifest.
#[derive(Clone, Debug)]
pub struct DownloadRequest<'a> {
    pub manifest_url: &'a str,
    pub save_name: &'a str,
    pub save_dir: &'a Path,
    pub temp_dir: &'a Path,
}

impl DownloadRequest<'_> {
    pub fn args(&self) -> Vec<OsString> {
        vec![
            self.manifest_url.into(),
            "--auto-select".into(),
            "--save-name".into(),
            self.save_name.into(),
            "--save-dir".into(),
            self.save_dir.into(),
            "--tmp-dir".into(),
            self.temp_dir.into(),
        ]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamKind {
    Video,
    Audio,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Audio => write!(f, "audio"),
        }
    }
}

/// Raw key decryption of one encrypted track.
#[derive(Clone, Debug)]
pub struct DecryptRequest<'a> {
    pub input: &'a Path,
    pub output: &'a Path,
    pub stream: StreamKind,
    pub key: &'a FormattedKey,
}

impl DecryptRequest<'_> {
    pub fn args(&self) -> Vec<OsString> {
        let mut stream = OsString::from("in=");
        stream.push(self.input);
        stream.push(format!(",stream={},output=", self.stream));
        stream.push(self.output);

        vec![
            stream,
            "--enable_raw_key_decryption".into(),
            "--keys".into(),
            self.key.as_str().into(),
        ]
    }
}

/// Process boundary of the pipeline.
///
/// Implementations only run the tool, checking that outputs exist is left to
/// the caller.
pub trait MediaTools {
    fn download(&self, request: &DownloadRequest) -> Result<()>;
    fn decrypt(&self, request: &DecryptRequest) -> Result<()>;
}

/// [`MediaTools`] backed by locally installed binaries.
#[derive(Clone, Debug)]
pub struct ExternalTools {
    pub downloader: PathBuf,
    pub decrypter: PathBuf,
}

impl ExternalTools {
    /// Resolve both binaries before any title is processed.
    pub fn locate(config: &Config) -> Result<Self> {
        let find = |name: &str| {
            utils::find_binary(name).ok_or_else(|| Error::Tool {
                program: name.to_owned(),
                reason: "could not be found in the working directory or PATH".to_owned(),
            })
        };

        Ok(Self {
            downloader: find(&config.downloader)?,
            decrypter: find(&config.decrypter)?,
        })
    }

    fn run(program: &Path, args: Vec<OsString>) -> Result<()> {
        let name = program
            .file_name()
            .map(|x| x.to_string_lossy().into_owned())
            .unwrap_or_else(|| program.to_string_lossy().into_owned());

        info!(
            "Executing {} {}",
            name.bold(),
            args.iter()
                .map(|x| x.to_string_lossy())
                .map(|x| if x.contains(' ') {
                    format!("\"{x}\"")
                } else {
                    x.into_owned()
                })
                .collect::<Vec<_>>()
                .join(" ")
                .bold()
        );

        let status = Command::new(program)
            .args(args)
            .status()
            .map_err(|e| Error::Tool {
                program: name.clone(),
                reason: format!("could not be started: {}", e),
            })?;

        if !status.success() {
            return Err(Error::Tool {
                program: name,
                reason: match status.code() {
                    Some(code) => format!("exited with code {}", code),
                    None => "was terminated by a signal".to_owned(),
                },
            });
        }

        Ok(())
    }
}

impl MediaTools for ExternalTools {
    fn download(&self, request: &DownloadRequest) -> Result<()> {
        Self::run(&self.downloader, request.args())
    }

    fn decrypt(&self, request: &DecryptRequest) -> Result<()> {
        Self::run(&self.decrypter, request.args())
    }
}
