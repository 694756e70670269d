//! `diamond/autoload.css`: every top-level package's CSS in one file.

use super::error::PkgError;
use super::lockfile::PackageRecord;
use crate::paths::ProjectLayout;
use diamond_util::fs::{atomic_write, read_to_string_lossy};
use std::path::PathBuf;

/// CSS contributed by one installed package, if any.
///
/// Prefers the built `diamond/dist/main.css`, then a raw CSS `main`.
fn package_css(layout: &ProjectLayout, record: &PackageRecord) -> Option<String> {
    let built = layout.dist_dir(&record.path).join("main.css");
    if let Ok(css) = read_to_string_lossy(&built) {
        return Some(css);
    }

    let main = record.main.as_deref().filter(|m| m.ends_with(".css"))?;
    read_to_string_lossy(&layout.package_dir(&record.path).join(main)).ok()
}

/// Rewrite the autoload file from the top-level records.
///
/// # Errors
/// Returns an error if the file cannot be written.
pub fn write_autoload(
    layout: &ProjectLayout,
    records: &[PackageRecord],
) -> Result<PathBuf, PkgError> {
    let parts: Vec<String> = records
        .iter()
        .filter(|r| !r.is_nested())
        .filter_map(|r| package_css(layout, r))
        .map(|css| css.trim().to_string())
        .filter(|css| !css.is_empty())
        .collect();

    let mut content = parts.join("\n\n");
    if !content.is_empty() {
        content.push('\n');
    }

    let path = layout.autoload_path();
    atomic_write(&path, content.as_bytes())?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pkg::spec::Source;
    use std::fs;
    use tempfile::tempdir;

    fn record(name: &str, main: Option<&str>, for_path: Option<&str>) -> PackageRecord {
        PackageRecord {
            name: name.to_string(),
            version: None,
            git_ref: None,
            source: Source::parse(name).unwrap(),
            path: name.to_string(),
            for_path: for_path.map(String::from),
            main: main.map(String::from),
            dependencies: Default::default(),
            post_processor: None,
            functions: None,
            importer: None,
        }
    }

    #[test]
    fn test_autoload_concatenates_top_level() {
        let dir = tempdir().unwrap();
        let layout = ProjectLayout::new(dir.path());

        let dist = layout.dist_dir("alpha");
        fs::create_dir_all(&dist).unwrap();
        fs::write(dist.join("main.css"), "  .a{}\n").unwrap();

        let beta = layout.package_dir("beta");
        fs::create_dir_all(&beta).unwrap();
        fs::write(beta.join("beta.css"), ".b{}").unwrap();

        let nested = layout.dist_dir("gamma");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("main.css"), ".g{}").unwrap();

        let records = vec![
            record("alpha", Some("a.scss"), None),
            record("beta", Some("beta.css"), None),
            record("gamma", None, Some("alpha")),
            record("delta", Some("d.scss"), None),
        ];
        let path = write_autoload(&layout, &records).unwrap();

        assert_eq!(fs::read_to_string(path).unwrap(), ".a{}\n\n.b{}\n");
    }

    #[test]
    fn test_autoload_empty() {
        let dir = tempdir().unwrap();
        let layout = ProjectLayout::new(dir.path());
        let path = write_autoload(&layout, &[]).unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "");
    }
}
