/*
    Per title state machine:

    Idle -> HeadersReady -> ManifestResolved -> KeyAcquired -> Downloaded
         -> TrackDecrypting(0..n) -> Complete

    Any failing step moves to Failed and reports the state it tried to enter.
    Track 0 is the video track, its failure is fatal. Later tracks (audio and
    subtitles) only produce warnings.
*/

use crate::{
    Catalog, Config, CredentialSet, Error, FormattedKey, HeaderSet, KeyPair, KeyService,
    LicenseRequest, MediaTools, Result, Title,
    license::select_and_format,
    tools::{DecryptRequest, DownloadRequest, StreamKind},
};
use log::{debug, info, warn};
use std::{
    fmt, fs,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use wv_pssh::{KeyId, PsshBox};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Idle,
    HeadersReady,
    ManifestResolved,
    KeyAcquired,
    Downloaded,
    TrackDecrypting(usize),
    Complete,
    Failed,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::HeadersReady => write!(f, "headers"),
            Self::ManifestResolved => write!(f, "manifest"),
            Self::KeyAcquired => write!(f, "key acquisition"),
            Self::Downloaded => write!(f, "download"),
            Self::TrackDecrypting(0) => write!(f, "video decryption"),
            Self::TrackDecrypting(n) => write!(f, "track {} decryption", n),
            Self::Complete => write!(f, "complete"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Fatal error together with the state that could not be entered.
#[derive(Debug, thiserror::Error)]
#[error("{stage} stage failed: {error}")]
pub struct Failure {
    pub stage: State,
    #[source]
    pub error: Error,
}

/// Everything learned up to [`State::KeyAcquired`].
#[derive(Clone, Debug)]
pub struct KeyAcquisition {
    pub key: FormattedKey,
    pub manifest_url: String,
    pub kid: KeyId,
    /// Base64 pssh box sent to the key service.
    pub pssh: String,
    /// All pairs returned, in response order.
    pub pairs: Vec<KeyPair>,
}

/// Result of a completed run.
#[derive(Debug)]
pub struct Outcome {
    pub acquisition: KeyAcquisition,
    pub directory: PathBuf,
    pub video: PathBuf,
    pub audio: Vec<PathBuf>,
    pub subtitles: Vec<PathBuf>,
    /// [`Error::TrackDecryption`] for every skipped track.
    pub warnings: Vec<Error>,
}

/// Encrypted files left by the downloader for one title.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DownloadedTracks {
    pub video: PathBuf,
    /// `(language, path)` sorted by path.
    pub audio: Vec<(String, PathBuf)>,
    pub subtitles: Vec<PathBuf>,
}

impl DownloadedTracks {
    /// Look for `<name>.mp4`, `<name>.<lang>.m4a` and `*<name>*.srt` in `directory`.
    pub fn discover(directory: &Path, name: &str) -> Result<Self> {
        let mut tracks = Self {
            video: directory.join(format!("{}.mp4", name)),
            ..Default::default()
        };

        for entry in fs::read_dir(directory)? {
            let path = entry?.path();

            if !path.is_file() {
                continue;
            }

            let Some(file_name) = path.file_name().and_then(|x| x.to_str()) else {
                continue;
            };

            if let Some(lang) = audio_language(file_name, name) {
                tracks.audio.push((lang.to_owned(), path.clone()));
            } else if file_name.ends_with(".srt") && file_name.contains(name) {
                tracks.subtitles.push(path.clone());
            }
        }

        tracks.audio.sort_by(|a, b| a.1.cmp(&b.1));
        tracks.subtitles.sort();
        Ok(tracks)
    }
}

fn audio_language<'a>(file_name: &'a str, name: &str) -> Option<&'a str> {
    let lang = file_name
        .strip_prefix(name)?
        .strip_prefix('.')?
        .strip_suffix(".m4a")?;

    if lang.len() >= 2 && lang.chars().all(|x| x.is_ascii_alphanumeric() || x == '-') {
        Some(lang)
    } else {
        None
    }
}

/// Drives one title through key acquisition, download and decryption.
///
/// Owns its header set and key material, only the credentials are shared
/// between titles of the same run.
pub struct Pipeline<'a> {
    config: &'a Config,
    credentials: &'a CredentialSet,
    catalog: &'a dyn Catalog,
    keys: &'a dyn KeyService,
    tools: &'a dyn MediaTools,
    interrupted: Arc<AtomicBool>,
    history: Vec<State>,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a Config,
        credentials: &'a CredentialSet,
        catalog: &'a dyn Catalog,
        keys: &'a dyn KeyService,
        tools: &'a dyn MediaTools,
    ) -> Self {
        Self {
            config,
            credentials,
            catalog,
            keys,
            tools,
            interrupted: Arc::new(AtomicBool::new(false)),
            history: vec![State::Idle],
        }
    }

    /// Flag checked around every blocking step, usually set by a ctrl+c handler.
    pub fn with_interrupt(mut self, interrupted: Arc<AtomicBool>) -> Self {
        self.interrupted = interrupted;
        self
    }

    pub fn state(&self) -> State {
        self.history.last().copied().unwrap_or(State::Idle)
    }

    /// Every state entered so far, starting with [`State::Idle`].
    pub fn history(&self) -> &[State] {
        &self.history
    }

    fn transition(&mut self, next: State) {
        debug!("{:?} -> {:?}", self.state(), next);
        self.history.push(next);
    }

    fn check_interrupt(&self) -> Result<()> {
        if self.interrupted.load(Ordering::SeqCst) {
            Err(Error::Interrupted)
        } else {
            Ok(())
        }
    }

    fn fail(&mut self, stage: State, error: Error) -> Failure {
        self.transition(State::Failed);
        Failure { stage, error }
    }

    fn enter<T>(
        &mut self,
        next: State,
        step: impl FnOnce(&Self) -> Result<T>,
    ) -> std::result::Result<T, Failure> {
        let result = self
            .check_interrupt()
            .and_then(|_| step(self))
            .and_then(|x| self.check_interrupt().map(|_| x));

        match result {
            Ok(x) => {
                self.transition(next);
                Ok(x)
            }
            Err(e) => {
                let e = self.interrupted_or(e);
                Err(self.fail(next, e))
            }
        }
    }

    /// Tools killed by ctrl+c report their own failure, the interrupt takes precedence.
    fn interrupted_or(&self, error: Error) -> Error {
        if self.interrupted.load(Ordering::SeqCst) {
            Error::Interrupted
        } else {
            error
        }
    }

    /// Run until [`State::KeyAcquired`].
    pub fn acquire_key(&mut self, title: &Title) -> std::result::Result<KeyAcquisition, Failure> {
        let headers = self.enter(State::HeadersReady, |x| HeaderSet::synthesize(x.credentials))?;

        let manifest_url = self.enter(State::ManifestResolved, |x| {
            if let Some(country) = &x.config.country {
                title.check_region(country)?;
            }

            x.catalog.secure_manifest(&title.id, &headers)
        })?;

        self.enter(State::KeyAcquired, |x| {
            let raw_kid = x.catalog.manifest_kid(&manifest_url)?;
            let kid = KeyId::parse(&raw_kid)?;
            info!("Found key id {}", kid);

            let pssh = PsshBox::with_payload(kid, x.config.pssh_layout.into()).to_base64();
            debug!("pssh {}", pssh);

            let request = LicenseRequest::new(
                &x.config.license_url,
                pssh.clone(),
                &headers,
                x.config.license_headers,
            );
            let pairs = x.keys.request_keys(&request)?;
            let key = select_and_format(&pairs)?;

            if pairs.len() > 1 {
                debug!("{} key pairs returned, using the first", pairs.len());
            }

            Ok(KeyAcquisition {
                key,
                manifest_url: manifest_url.clone(),
                kid,
                pssh,
                pairs,
            })
        })
    }

    /// Acquire the key, download every track and decrypt it.
    pub fn run(&mut self, title: &Title) -> std::result::Result<Outcome, Failure> {
        let acquisition = self.acquire_key(title)?;
        let name = title.file_name();
        let output = self.config.output.clone();
        let temp_dir = self.config.temp_dir();

        let tracks = self.enter(State::Downloaded, |x| {
            fs::create_dir_all(&output)?;
            x.tools.download(&DownloadRequest {
                manifest_url: &acquisition.manifest_url,
                save_name: &name,
                save_dir: &output,
                temp_dir: &temp_dir,
            })?;

            let tracks = DownloadedTracks::discover(&output, &name)?;

            if !tracks.video.is_file() {
                return Err(Error::DownloadVerification { path: tracks.video });
            }

            info!(
                "Downloaded video, {} audio and {} subtitle track(s)",
                tracks.audio.len(),
                tracks.subtitles.len()
            );
            Ok(tracks)
        })?;

        let directory = output.join(&name);
        let video = self.enter(State::TrackDecrypting(0), |x| {
            fs::create_dir_all(&directory)?;
            let video = directory.join("decrypted-video.mp4");
            x.decrypt(&tracks.video, &video, StreamKind::Video, &acquisition.key)?;
            Ok(video)
        })?;

        let mut audio = Vec::new();
        let mut subtitles = Vec::new();
        let mut warnings = Vec::new();
        let mut n = 0;

        for (lang, source) in &tracks.audio {
            n += 1;
            let decrypted = directory.join(format!("decrypted-audio.{}.m4a", lang));
            let result = self.check_interrupt().and_then(|_| {
                self.decrypt(source, &decrypted, StreamKind::Audio, &acquisition.key)
            });

            match result.map_err(|e| self.interrupted_or(e)) {
                Ok(()) => audio.push(decrypted),
                Err(Error::Interrupted) => {
                    return Err(self.fail(State::TrackDecrypting(n), Error::Interrupted));
                }
                Err(e) => warnings.push(self.skip_track(source, e)),
            }

            self.transition(State::TrackDecrypting(n));
        }

        for source in &tracks.subtitles {
            n += 1;
            let result = self.check_interrupt().and_then(|_| move_into(source, &directory));

            match result.map_err(|e| self.interrupted_or(e)) {
                Ok(moved) => subtitles.push(moved),
                Err(Error::Interrupted) => {
                    return Err(self.fail(State::TrackDecrypting(n), Error::Interrupted));
                }
                Err(e) => warnings.push(self.skip_track(source, e)),
            }

            self.transition(State::TrackDecrypting(n));
        }

        self.transition(State::Complete);
        info!(
            "Saved {} ({} audio, {} subtitle track(s), {} skipped)",
            directory.display(),
            audio.len(),
            subtitles.len(),
            warnings.len()
        );

        Ok(Outcome {
            acquisition,
            directory,
            video,
            audio,
            subtitles,
            warnings,
        })
    }

    /// Decrypt one track, the encrypted source is removed only once the output exists.
    fn decrypt(
        &self,
        input: &Path,
        output: &Path,
        stream: StreamKind,
        key: &FormattedKey,
    ) -> Result<()> {
        info!("Decrypting {}", input.display());
        self.tools.decrypt(&DecryptRequest {
            input,
            output,
            stream,
            key,
        })?;

        if !output.is_file() {
            return Err(Error::DownloadVerification {
                path: output.to_owned(),
            });
        }

        fs::remove_file(input)?;
        Ok(())
    }

    fn skip_track(&self, source: &Path, error: Error) -> Error {
        let warning = Error::TrackDecryption {
            track: source
                .file_name()
                .map(|x| x.to_string_lossy().into_owned())
                .unwrap_or_else(|| source.display().to_string()),
            reason: error.to_string(),
        };
        warn!("{}", warning);
        warning
    }
}

fn move_into(source: &Path, directory: &Path) -> Result<PathBuf> {
    let target = directory.join(source.file_name().ok_or_else(|| Error::DownloadVerification {
        path: source.to_owned(),
    })?);

    if fs::rename(source, &target).is_err() {
        fs::copy(source, &target)?;
        fs::remove_file(source)?;
    }

    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_language() {
        assert_eq!(audio_language("Stalker (1979).en.m4a", "Stalker (1979)"), Some("en"));
        assert_eq!(audio_language("Stalker (1979).pt-BR.m4a", "Stalker (1979)"), Some("pt-BR"));
        assert_eq!(audio_language("Stalker (1979).m4a", "Stalker (1979)"), None);
        assert_eq!(audio_language("Solaris (1972).en.m4a", "Stalker (1979)"), None);
    }

    #[test]
    fn test_discover_tracks() {
        let dir = tempfile::tempdir().unwrap();

        for file in [
            "Stalker (1979).mp4",
            "Stalker (1979).ru.m4a",
            "Stalker (1979).en.m4a",
            "Stalker (1979).en.srt",
            "Solaris (1972).en.m4a",
        ] {
            fs::write(dir.path().join(file), b"x").unwrap();
        }

        let tracks = DownloadedTracks::discover(dir.path(), "Stalker (1979)").unwrap();

        assert_eq!(tracks.video, dir.path().join("Stalker (1979).mp4"));
        assert_eq!(
            tracks.audio.iter().map(|x| x.0.as_str()).collect::<Vec<_>>(),
            ["en", "ru"]
        );
        assert_eq!(tracks.subtitles, [dir.path().join("Stalker (1979).en.srt")]);
    }

    #[test]
    fn test_stage_display() {
        let failure = Failure {
            stage: State::ManifestResolved,
            error: Error::NoKeyPairs,
        };

        assert_eq!(
            failure.to_string(),
            "manifest stage failed: key service returned no key pairs"
        );
        assert_eq!(State::TrackDecrypting(2).to_string(), "track 2 decryption");
    }
}
