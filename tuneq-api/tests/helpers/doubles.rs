//! Collaborator test doubles
//!
//! Each double counts its calls. The fetcher can be switched between modes
//! between attempts and can be held at a gate until a test opens it. An
//! opened gate stays open.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tuneq_api::services::{
    FetchError, Fetcher, ScratchArtifact, Storage, StorageError, TranslateError, Translator,
};

/// Echoes the trimmed query with a suffix, or fails
#[derive(Default)]
pub struct FakeTranslator {
    calls: AtomicUsize,
    fail: Mutex<bool>,
}

impl FakeTranslator {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }
}

#[async_trait]
impl Translator for FakeTranslator {
    async fn translate(&self, text: &str) -> Result<String, TranslateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail.lock().unwrap() {
            return Err(TranslateError::ApiError(503, "model overloaded".to_string()));
        }
        Ok(format!("{} official audio", text.trim()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    Succeed,
    Fail,
    Panic,
    Hang,
}

/// Writes a small file into a scratch artifact
pub struct FakeFetcher {
    scratch_root: PathBuf,
    calls: AtomicUsize,
    mode: Mutex<FetchMode>,
    gate: Mutex<Option<Arc<Semaphore>>>,
    terms: Mutex<Vec<String>>,
    artifact_dirs: Mutex<Vec<PathBuf>>,
}

impl FakeFetcher {
    pub fn new(scratch_root: PathBuf) -> Self {
        Self {
            scratch_root,
            calls: AtomicUsize::new(0),
            mode: Mutex::new(FetchMode::Succeed),
            gate: Mutex::new(None),
            terms: Mutex::new(Vec::new()),
            artifact_dirs: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_mode(&self, mode: FetchMode) {
        *self.mode.lock().unwrap() = mode;
    }

    /// Hold every following fetch until `add_permits(1)` is called on the gate
    pub fn hold(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn terms(&self) -> Vec<String> {
        self.terms.lock().unwrap().clone()
    }

    pub fn artifact_dirs(&self) -> Vec<PathBuf> {
        self.artifact_dirs.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, term: &str) -> Result<ScratchArtifact, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.terms.lock().unwrap().push(term.to_string());

        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            // Permit goes straight back, so every waiter passes once opened
            let _ = gate.acquire().await;
        }

        let mode = *self.mode.lock().unwrap();
        match mode {
            FetchMode::Succeed => {
                let artifact = ScratchArtifact::reserve(&self.scratch_root, "audio.mp3")?;
                std::fs::write(artifact.path(), b"ID3 fake audio")?;
                self.artifact_dirs
                    .lock()
                    .unwrap()
                    .push(artifact.dir().to_path_buf());
                Ok(artifact)
            }
            FetchMode::Fail => Err(FetchError::NoOutput(term.to_string())),
            FetchMode::Panic => panic!("fetcher exploded"),
            FetchMode::Hang => std::future::pending().await,
        }
    }
}

/// Records uploads and hands out sequential file ids
#[derive(Default)]
pub struct FakeStorage {
    calls: AtomicUsize,
    fail: Mutex<bool>,
    uploaded: Mutex<Vec<PathBuf>>,
}

impl FakeStorage {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }

    pub fn uploaded(&self) -> Vec<PathBuf> {
        self.uploaded.lock().unwrap().clone()
    }
}

#[async_trait]
impl Storage for FakeStorage {
    async fn upload(&self, path: &Path) -> Result<String, StorageError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !path.exists() {
            return Err(StorageError::Rejected(format!("missing file {}", path.display())));
        }
        self.uploaded.lock().unwrap().push(path.to_path_buf());

        if *self.fail.lock().unwrap() {
            return Err(StorageError::ApiError(413, "Request Entity Too Large".to_string()));
        }
        Ok(format!("tg://audio/file-{}", n))
    }
}
