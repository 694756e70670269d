//! `diamond compile` command implementation.

use super::fail;
use diamond_core::css::{apply_post_processors, CompileOptions, Compiler, OutputStyle, SassCompiler};
use diamond_core::paths::project_root;
use diamond_core::pkg::{post_processor_modules, LockStore};
use diamond_core::{Error, ProjectLayout};
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct CompileAction {
    pub cwd: PathBuf,
    pub file: PathBuf,
    pub minify: bool,
}

#[derive(Serialize)]
struct CompileJsonResult {
    ok: bool,
    css: String,
}

/// Run the compile command, printing the CSS to stdout.
pub fn run(action: CompileAction, json: bool) -> Result<()> {
    match compile(&action) {
        Ok(css) => {
            if json {
                let output = CompileJsonResult { ok: true, css };
                println!("{}", serde_json::to_string_pretty(&output).into_diagnostic()?);
            } else {
                print!("{css}");
                if !css.ends_with('\n') {
                    println!();
                }
            }
            Ok(())
        }
        Err(e) => fail(&e, json),
    }
}

fn compile(action: &CompileAction) -> Result<String, Error> {
    let entry = action.cwd.join(&action.file);
    if !entry.is_file() {
        return Err(Error::EntryNotFound { path: entry });
    }

    let root = project_root(&action.cwd).unwrap_or_else(|| action.cwd.clone());
    let layout = ProjectLayout::new(root);
    let records = LockStore::new(layout.lockfile_path(), layout.lock_guard_path()).read();
    let post = post_processor_modules(&layout, &records);
    debug!(entry = %entry.display(), post_processors = post.len(), "Compiling stylesheet");

    let options = CompileOptions {
        output_style: if action.minify {
            OutputStyle::Compressed
        } else {
            OutputStyle::Expanded
        },
        load_paths: vec![layout.packages_dir()],
    };
    let css = SassCompiler.compile(&entry, &options)?;
    Ok(apply_post_processors(css, &post)?)
}
