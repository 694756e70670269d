//! Package manager error types.

use std::fmt;
use std::io;

/// Package manager error codes.
pub mod codes {
    /// Specifier matched no accepted form, or its package name is invalid.
    pub const PKG_SPEC_INVALID: &str = "PKG_SPEC_INVALID";
    /// The source has no manifest file (HTTP 404). Logged, never returned.
    pub const PKG_MANIFEST_NOT_FOUND: &str = "PKG_MANIFEST_NOT_FOUND";
    /// Any non-404 HTTP failure or transport error.
    pub const PKG_FETCH_FAILED: &str = "PKG_FETCH_FAILED";
    pub const PKG_VERSION_NOT_FOUND: &str = "PKG_VERSION_NOT_FOUND";
    /// Downloaded artifact digest differs from the registry's.
    pub const PKG_INTEGRITY_MISMATCH: &str = "PKG_INTEGRITY_MISMATCH";
    pub const PKG_EXTRACT_FAILED: &str = "PKG_EXTRACT_FAILED";
    /// The package's own dependency install for compiler hooks failed.
    pub const PKG_HOOK_INSTALL_FAILED: &str = "PKG_HOOK_INSTALL_FAILED";
    pub const PKG_COMPILE_FAILED: &str = "PKG_COMPILE_FAILED";
    pub const PKG_POST_PROCESS_FAILED: &str = "PKG_POST_PROCESS_FAILED";
    /// Lock acquisition timed out or the lock file could not be written.
    pub const PKG_LOCK_FAILED: &str = "PKG_LOCK_FAILED";
    pub const PKG_CACHE_ERROR: &str = "PKG_CACHE_ERROR";
    /// Offline install with no usable cache entry.
    pub const PKG_OFFLINE_MISS: &str = "PKG_OFFLINE_MISS";
    pub const PKG_PACKAGE_JSON_INVALID: &str = "PKG_PACKAGE_JSON_INVALID";
}

/// Package manager error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkgError {
    code: &'static str,
    message: String,
}

impl PkgError {
    /// Create a new error with the given code and message.
    #[must_use]
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Get the error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// Get the error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether this error carries the given code.
    #[must_use]
    pub fn is(&self, code: &str) -> bool {
        self.code == code
    }

    pub fn spec_invalid(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_SPEC_INVALID, msg)
    }

    #[must_use]
    pub fn manifest_not_found(source: &str) -> Self {
        Self::new(
            codes::PKG_MANIFEST_NOT_FOUND,
            format!("No package.json in {source}"),
        )
    }

    pub fn fetch_failed(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_FETCH_FAILED, msg)
    }

    /// Create a version not found error.
    #[must_use]
    pub fn version_not_found(name: &str, wanted: &str) -> Self {
        Self::new(
            codes::PKG_VERSION_NOT_FOUND,
            format!("No version of {name} satisfies: {wanted}"),
        )
    }

    #[must_use]
    pub fn integrity_mismatch(name: &str, expected: &str, actual: &str) -> Self {
        Self::new(
            codes::PKG_INTEGRITY_MISMATCH,
            format!("shasum does not match for {name}: expected {expected}, got {actual}"),
        )
    }

    pub fn extract_failed(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_EXTRACT_FAILED, msg)
    }

    pub fn hook_install_failed(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_HOOK_INSTALL_FAILED, msg)
    }

    pub fn compile_failed(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_COMPILE_FAILED, msg)
    }

    pub fn post_process_failed(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_POST_PROCESS_FAILED, msg)
    }

    pub fn lock_failed(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_LOCK_FAILED, msg)
    }

    pub fn cache_error(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_CACHE_ERROR, msg)
    }

    pub fn offline_miss(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_OFFLINE_MISS, msg)
    }

    pub fn package_json_invalid(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_PACKAGE_JSON_INVALID, msg)
    }
}

impl fmt::Display for PkgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for PkgError {}

impl From<io::Error> for PkgError {
    fn from(e: io::Error) -> Self {
        Self::new(codes::PKG_EXTRACT_FAILED, e.to_string())
    }
}

impl From<reqwest::Error> for PkgError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::fetch_failed(format!("Request timed out: {e}"))
        } else if e.is_connect() {
            Self::fetch_failed(format!("Connection failed: {e}"))
        } else {
            Self::fetch_failed(e.to_string())
        }
    }
}

impl From<serde_json::Error> for PkgError {
    fn from(e: serde_json::Error) -> Self {
        Self::fetch_failed(format!("Invalid JSON: {e}"))
    }
}
