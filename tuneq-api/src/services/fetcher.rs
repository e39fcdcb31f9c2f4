//! Audio fetcher
//!
//! Resolves a search term to a local audio file by running `yt-dlp` as a
//! subprocess. Output lands in a per-fetch scratch directory owned by the
//! returned [`ScratchArtifact`].

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tuneq_common::config::FetcherConfig;

use crate::services::ScratchArtifact;

/// File name of the converted audio inside the scratch directory
const AUDIO_FILE_NAME: &str = "audio.mp3";
/// Output template handed to yt-dlp; `-x --audio-format mp3` yields `audio.mp3`
const OUTPUT_TEMPLATE: &str = "audio.%(ext)s";
/// Characters of stderr kept in error details
const STDERR_TAIL_CHARS: usize = 500;

/// Fetcher errors
#[derive(Debug, Error)]
pub enum FetchError {
    /// Fetcher binary not found in PATH
    #[error("Fetcher binary not found: {0}")]
    BinaryNotFound(String),

    /// Failed to spawn or wait on the fetcher process
    #[error("Failed to execute fetcher: {0}")]
    ExecutionError(String),

    /// Fetcher exited unsuccessfully
    #[error("Fetcher exited with {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },

    /// Fetcher exited cleanly but produced no audio (no search results)
    #[error("No audio produced for search term '{0}'")]
    NoOutput(String),

    /// Scratch directory could not be prepared
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Search term → local audio file
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, term: &str) -> Result<ScratchArtifact, FetchError>;
}

/// `yt-dlp` subprocess fetcher
pub struct YtDlpFetcher {
    binary: String,
    cookies_file: Option<PathBuf>,
    scratch_root: PathBuf,
}

impl YtDlpFetcher {
    pub fn new(binary: String, cookies_file: Option<PathBuf>, scratch_root: PathBuf) -> Self {
        Self {
            binary,
            cookies_file,
            scratch_root,
        }
    }

    pub fn from_config(config: &FetcherConfig, scratch_root: PathBuf) -> Self {
        if let Some(cookies) = &config.cookies_file {
            if !cookies.exists() {
                tracing::warn!(
                    cookies_file = %cookies.display(),
                    "Configured cookies file does not exist; yt-dlp will fail until it is created"
                );
            }
        }
        Self::new(config.binary.clone(), config.cookies_file.clone(), scratch_root)
    }

    /// Arguments for one fetch writing into `output_dir`
    pub fn command_args(&self, term: &str, output_dir: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-x".into(),
            "--audio-format".into(),
            "mp3".into(),
            "--no-playlist".into(),
            "--no-progress".into(),
        ];
        if let Some(cookies) = &self.cookies_file {
            args.push("--cookies".into());
            args.push(cookies.clone().into_os_string());
        }
        args.push("-o".into());
        args.push(output_dir.join(OUTPUT_TEMPLATE).into_os_string());
        args.push(format!("ytsearch1:{}", term).into());
        args
    }

    /// Check whether the binary can be executed
    pub async fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }
}

#[async_trait]
impl Fetcher for YtDlpFetcher {
    async fn fetch(&self, term: &str) -> Result<ScratchArtifact, FetchError> {
        // Declared before the group guard: on cancellation the process group
        // dies before the scratch directory is removed.
        let artifact = ScratchArtifact::reserve(&self.scratch_root, AUDIO_FILE_NAME)?;

        tracing::debug!(
            term = %term,
            output_dir = %artifact.dir().display(),
            "Running fetcher"
        );

        let mut command = std::process::Command::new(&self.binary);
        command
            .args(self.command_args(term, artifact.dir()))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        // yt-dlp runs ffmpeg as a child; its own group lets one signal reach both
        #[cfg(unix)]
        std::os::unix::process::CommandExt::process_group(&mut command, 0);

        let child = Command::from(command)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    FetchError::BinaryNotFound(self.binary.clone())
                } else {
                    FetchError::ExecutionError(e.to_string())
                }
            })?;
        let group = ProcessGroupGuard::new(child.id());

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| FetchError::ExecutionError(e.to_string()))?;
        group.disarm();

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FetchError::Failed {
                code: output.status.code(),
                stderr: tail(stderr.trim(), STDERR_TAIL_CHARS),
            });
        }

        if !artifact.path().exists() {
            return Err(FetchError::NoOutput(term.to_string()));
        }

        tracing::info!(
            term = %term,
            path = %artifact.path().display(),
            "Audio fetched"
        );

        Ok(artifact)
    }
}

/// Kills the fetcher's process group unless disarmed
///
/// Armed while the fetch future is waiting on the process. Dropping the
/// future (a timeout) kills yt-dlp and every helper it started.
struct ProcessGroupGuard {
    pgid: Option<u32>,
}

impl ProcessGroupGuard {
    fn new(pgid: Option<u32>) -> Self {
        Self { pgid }
    }

    /// The process exited on its own; leave the group alone
    fn disarm(mut self) {
        self.pgid = None;
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            kill_process_group(pgid);
        }
    }
}

#[cfg(unix)]
fn kill_process_group(pgid: u32) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    match killpg(Pid::from_raw(pgid as i32), Signal::SIGKILL) {
        Ok(()) => tracing::debug!(pgid, "Killed abandoned fetcher process group"),
        Err(Errno::ESRCH) => {}
        Err(e) => tracing::warn!(pgid, error = %e, "Failed to kill fetcher process group"),
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pgid: u32) {}

/// Last `max_chars` characters of `s`
fn tail(s: &str, max_chars: usize) -> String {
    let count = s.chars().count();
    if count <= max_chars {
        return s.to_string();
    }
    s.chars().skip(count - max_chars).collect()
}
