use thiserror::Error;

/// Caller-contract violations rejected by [`crate::DocumentEngine`].
///
/// A rejected operation leaves the engine state untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("page index {index} out of range for document with {len} pages")]
    PageIndexOutOfRange { index: usize, len: usize },
}
