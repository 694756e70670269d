//! `diamond install` command implementation.

use super::{fail, tree};
use diamond_core::paths::project_root;
use diamond_core::pkg::{
    Installer, ProjectManifest, RegistryClient, SessionReport, Source, TreeNode,
};
use diamond_core::{Error, InstallOptions};
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct InstallAction {
    pub cwd: PathBuf,
    pub specs: Vec<String>,
    pub options: InstallOptions,
}

/// Install result for JSON output.
#[derive(Serialize)]
struct InstallJsonResult<'a> {
    ok: bool,
    root: String,
    installed: Vec<&'a TreeNode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    autoload: Option<String>,
}

enum Outcome {
    Nothing,
    Done { root: String, report: SessionReport },
}

/// Run the install command.
pub fn run(action: InstallAction, json: bool) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().into_diagnostic()?;

    match runtime.block_on(install(&action)) {
        Ok(Outcome::Nothing) => {
            if json {
                print_json(&InstallJsonResult {
                    ok: true,
                    root: action.cwd.display().to_string(),
                    installed: Vec::new(),
                    autoload: None,
                })?;
            } else {
                println!("no packages to install");
            }
            Ok(())
        }
        Ok(Outcome::Done { root, report }) => {
            let nodes: Vec<TreeNode> = report.installed.into_iter().map(|i| i.node).collect();
            if json {
                print_json(&InstallJsonResult {
                    ok: true,
                    root,
                    installed: nodes.iter().collect(),
                    autoload: Some(report.autoload.display().to_string()),
                })?;
            } else {
                print!("{}", tree::render(&root, &nodes));
            }
            Ok(())
        }
        Err(e) => fail(&e, json),
    }
}

async fn install(action: &InstallAction) -> Result<Outcome, Error> {
    let root = project_root(&action.cwd).unwrap_or_else(|| action.cwd.clone());
    debug!(root = %root.display(), "Resolved project root");

    let mut options = action.options;
    let sources = if action.specs.is_empty() {
        let manifest = ProjectManifest::load(&root)?;
        // Installing what package.json already lists never rewrites it.
        options.save = false;
        Source::parse_map(&manifest.dependencies())?
    } else {
        action
            .specs
            .iter()
            .map(|spec| Source::parse(spec))
            .collect::<Result<Vec<_>, _>>()?
    };

    if sources.is_empty() {
        return Ok(Outcome::Nothing);
    }
    info!(count = sources.len(), "Installing packages");

    let client = RegistryClient::from_env()?;
    let installer = Installer::new(&root, client, options);
    let report = installer.run_session(sources).await?;

    Ok(Outcome::Done {
        root: root_label(&root, &action.cwd),
        report,
    })
}

fn root_label(root: &Path, cwd: &Path) -> String {
    let cwd = cwd.display().to_string();
    match ProjectManifest::load(root) {
        Ok(manifest) => tree::root_label(manifest.name(), manifest.version(), &cwd),
        Err(_) => cwd,
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).into_diagnostic()?);
    Ok(())
}
