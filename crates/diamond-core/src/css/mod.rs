//! Stylesheet compilation seam.
//!
//! The installer only needs success or failure plus the produced CSS, so
//! compilers hide behind [`Compiler`]. [`SassCompiler`] is the default.

pub mod postprocess;
pub mod sass;

pub use postprocess::apply_post_processors;
pub use sass::SassCompiler;

use crate::pkg::error::PkgError;
use std::path::{Path, PathBuf};

/// CSS output formatting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputStyle {
    #[default]
    Expanded,
    Compressed,
}

/// Options passed to a [`Compiler`].
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    pub output_style: OutputStyle,
    /// Extra directories searched by `@import`/`@use`.
    pub load_paths: Vec<PathBuf>,
}

impl CompileOptions {
    #[must_use]
    pub fn compressed() -> Self {
        Self {
            output_style: OutputStyle::Compressed,
            load_paths: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_load_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.load_paths.push(path.into());
        self
    }
}

/// External stylesheet compiler.
pub trait Compiler: Send + Sync {
    /// Compile the stylesheet at `entry` to CSS.
    ///
    /// # Errors
    /// Returns `PKG_COMPILE_FAILED` with the compiler's message.
    fn compile(&self, entry: &Path, options: &CompileOptions) -> Result<String, PkgError>;

    /// Stylus rendition of compiled CSS.
    ///
    /// Plain CSS is valid Stylus, so the default returns it unchanged.
    fn to_stylus(&self, css: &str) -> String {
        css.to_string()
    }
}

/// Stylesheet language, by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StyleLang {
    Css,
    Scss,
    Sass,
    Less,
    Stylus,
}

impl StyleLang {
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "css" => Some(Self::Css),
            "scss" => Some(Self::Scss),
            "sass" => Some(Self::Sass),
            "less" => Some(Self::Less),
            "styl" => Some(Self::Stylus),
            _ => None,
        }
    }

    /// Needs a compile step to become CSS.
    #[must_use]
    pub fn is_source(self) -> bool {
        !matches!(self, Self::Css)
    }
}
