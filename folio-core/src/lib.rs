//! Edit-state engine for paginated plain-text documents.
//!
//! [`DocumentEngine`] owns the loaded document, its working copy, undo/redo history,
//! bookmarks, current page and search term. Everything else in this crate is a pure helper the
//! engine delegates to: [`parser`] for the `---`-separated text format, [`search`] for
//! case-insensitive matching and [`history`] for snapshot undo/redo.

pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod parser;
pub mod search;

pub use config::{AutosaveConfig, Config, HistoryConfig};
pub use engine::{Command, DocumentEngine, DocumentId, EngineEvent, EngineStatus};
pub use error::EngineError;
pub use history::{EditHistory, Snapshot};
pub use parser::{Document, TocEntry, PAGE_SEPARATOR};
