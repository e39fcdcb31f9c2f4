//! External collaborators
//!
//! Each collaborator sits behind an async trait so the dispatcher and the
//! pipeline runner hold `Arc<dyn …>` handles built once at startup and
//! swappable for test doubles.

pub mod fetcher;
pub mod scratch;
pub mod storage;
pub mod translator;

pub use fetcher::{FetchError, Fetcher, YtDlpFetcher};
pub use scratch::ScratchArtifact;
pub use storage::{Storage, StorageError, TelegramStorage};
pub use translator::{GeminiTranslator, TranslateError, Translator};
