use crate::pkg::PkgError;
use std::path::PathBuf;
use thiserror::Error;

/// Core error type for diamond operations outside a single package install.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Pkg(#[from] PkgError),

    #[error("Stylesheet not found: {path}")]
    EntryNotFound { path: PathBuf },

    #[error("{0}")]
    Other(String),
}

impl Error {
    #[must_use]
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Stable error code, when the error carries one.
    #[must_use]
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Self::Pkg(e) => Some(e.code()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pkg::error::codes;

    #[test]
    fn test_pkg_error_is_transparent() {
        let err: Error = PkgError::spec_invalid("bad").into();
        assert_eq!(err.code(), Some(codes::PKG_SPEC_INVALID));
        assert_eq!(err.to_string(), "PKG_SPEC_INVALID: bad");
    }

    #[test]
    fn test_entry_not_found() {
        let err = Error::EntryNotFound {
            path: PathBuf::from("/p/a.scss"),
        };
        assert_eq!(err.code(), None);
        assert_eq!(err.to_string(), "Stylesheet not found: /p/a.scss");
    }

    #[test]
    fn test_other() {
        let err = Error::other("boom");
        assert_eq!(err.code(), None);
        assert_eq!(err.to_string(), "boom");
    }
}
