//! Crate-wide error types.
//!
//! Session setup and input handling return [`Error`]. Device and config
//! failures keep their own `thiserror` types
//! ([`DeviceError`](crate::playback::DeviceError),
//! [`ConfigError`](crate::config::ConfigError)) because a device failure is
//! reported through the playback report rather than returned. The binary
//! uses `anyhow` on top of these.
//!
//! # Example
//!
//! ```ignore
//! use speech_playback::error::{Result, ResultExt};
//!
//! fn open_input(path: &Path) -> Result<File> {
//!     File::open(path).with_context(format!("Failed to open {}", path.display()))
//! }
//! ```

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Session setup or teardown failed
    #[error("Playback error: {0}")]
    Playback(String),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create a playback error.
    pub fn playback(message: impl Into<String>) -> Self {
        Self::Playback(message.into())
    }

    /// Add context to an error.
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }
}

/// Extension trait for adding context to I/O results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn with_context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Io(e).context(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_with_context() {
        let err = Error::playback("reader thread failed").context("while starting session");
        let msg = err.to_string();
        assert!(msg.contains("while starting session"));
        assert!(msg.contains("reader thread failed"));
    }

    #[test]
    fn test_result_ext_wraps_io_error() {
        let result: std::result::Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        let err = result.with_context("opening input").unwrap_err();

        assert_eq!(err.to_string(), "opening input: IO error: gone");
        let Error::WithContext { source, .. } = err else {
            panic!("expected context wrapper");
        };
        assert!(matches!(*source, Error::Io(ref e) if e.kind() == std::io::ErrorKind::NotFound));
    }
}
