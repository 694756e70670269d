pub mod compile;
pub mod install;
pub mod tree;

use diamond_core::Error;
use serde::Serialize;

/// Failure payload for `--json`.
#[derive(Serialize)]
struct ErrorJson<'a> {
    ok: bool,
    error: ErrorInfo<'a>,
}

#[derive(Serialize)]
struct ErrorInfo<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'a str>,
    message: String,
}

/// Human-readable failure line: `error[CODE]: message`.
#[must_use]
pub fn error_line(err: &Error) -> String {
    match err {
        Error::Pkg(e) => format!("error[{}]: {}", e.code(), e.message()),
        other => match other.code() {
            Some(code) => format!("error[{code}]: {other}"),
            None => format!("error: {other}"),
        },
    }
}

/// Report a fatal error and exit with status 1.
pub fn fail(err: &Error, json: bool) -> ! {
    if json {
        let message = match err {
            Error::Pkg(e) => e.message().to_string(),
            other => other.to_string(),
        };
        let output = ErrorJson {
            ok: false,
            error: ErrorInfo {
                code: err.code(),
                message,
            },
        };
        match serde_json::to_string_pretty(&output) {
            Ok(text) => println!("{text}"),
            Err(_) => eprintln!("{}", error_line(err)),
        }
    } else {
        eprintln!("{}", error_line(err));
        eprintln!("not ok");
    }
    std::process::exit(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use diamond_core::pkg::PkgError;
    use std::path::PathBuf;

    #[test]
    fn test_error_line_with_code() {
        let err = Error::from(PkgError::spec_invalid("invalid package '!!'"));
        assert_eq!(error_line(&err), "error[PKG_SPEC_INVALID]: invalid package '!!'");
    }

    #[test]
    fn test_error_line_without_code() {
        let err = Error::EntryNotFound {
            path: PathBuf::from("a.scss"),
        };
        assert_eq!(error_line(&err), "error: Stylesheet not found: a.scss");
    }
}
