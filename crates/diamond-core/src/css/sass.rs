//! Sass/SCSS compilation using grass.

use super::{CompileOptions, Compiler, OutputStyle, StyleLang};
use crate::pkg::error::PkgError;
use std::path::Path;

/// Default [`Compiler`]: `.scss`/`.sass` through grass, `.css` passed through.
#[derive(Debug, Clone, Copy, Default)]
pub struct SassCompiler;

impl Compiler for SassCompiler {
    fn compile(&self, entry: &Path, options: &CompileOptions) -> Result<String, PkgError> {
        match StyleLang::from_path(entry) {
            Some(StyleLang::Scss | StyleLang::Sass | StyleLang::Css) => {}
            Some(StyleLang::Less) => {
                return Err(PkgError::compile_failed(format!(
                    "{}: no Less compiler available",
                    entry.display()
                )))
            }
            Some(StyleLang::Stylus) => {
                return Err(PkgError::compile_failed(format!(
                    "{}: no Stylus compiler available",
                    entry.display()
                )))
            }
            None => {
                return Err(PkgError::compile_failed(format!(
                    "{}: not a stylesheet",
                    entry.display()
                )))
            }
        }

        let mut grass_options = grass::Options::default().style(match options.output_style {
            OutputStyle::Compressed => grass::OutputStyle::Compressed,
            OutputStyle::Expanded => grass::OutputStyle::Expanded,
        });

        if let Some(parent) = entry.parent() {
            grass_options = grass_options.load_path(parent);
        }
        for path in &options.load_paths {
            grass_options = grass_options.load_path(path);
        }

        grass::from_path(entry, &grass_options)
            .map_err(|e| PkgError::compile_failed(format!("{}: {e}", entry.display())))
    }
}
