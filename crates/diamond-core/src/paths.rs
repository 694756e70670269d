use std::path::{Path, PathBuf};

/// Environment variable overriding the content cache directory.
pub const CACHE_DIR_ENV: &str = "DIAMOND_CACHE_DIR";

/// Find the project root by walking up from `cwd` looking for `package.json` or `.git`.
///
/// Returns the first directory containing either marker, or `None` if neither is found.
#[must_use]
pub fn project_root(cwd: &Path) -> Option<PathBuf> {
    let mut current = cwd.to_path_buf();

    loop {
        if current.join("package.json").exists() || current.join(".git").exists() {
            return Some(current);
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Content cache directory.
///
/// `$DIAMOND_CACHE_DIR` if set, else `~/.diamond/package-cache`.
#[must_use]
pub fn cache_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(CACHE_DIR_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(dir);
    }

    dirs_next::home_dir()
        .map_or_else(|| PathBuf::from(".diamond"), |home| home.join(".diamond"))
        .join("package-cache")
}

/// On-disk layout of an installed project.
///
/// ```text
/// <root>/diamond/packages/<path>/
/// <root>/diamond/.internal/packages.lock
/// <root>/diamond/autoload.css
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    root: PathBuf,
}

impl ProjectLayout {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn diamond_dir(&self) -> PathBuf {
        self.root.join("diamond")
    }

    #[must_use]
    pub fn packages_dir(&self) -> PathBuf {
        self.diamond_dir().join("packages")
    }

    #[must_use]
    pub fn internal_dir(&self) -> PathBuf {
        self.diamond_dir().join(".internal")
    }

    #[must_use]
    pub fn lockfile_path(&self) -> PathBuf {
        self.internal_dir().join("packages.lock")
    }

    /// Sidecar file holding the advisory lock.
    ///
    /// The lock file itself is replaced by rename on every write, which would
    /// drop a lock held on its inode.
    #[must_use]
    pub fn lock_guard_path(&self) -> PathBuf {
        self.internal_dir().join("packages.lock.lock")
    }

    #[must_use]
    pub fn staging_dir(&self) -> PathBuf {
        self.internal_dir().join("staging")
    }

    /// Directory of the package installed at lock path `path`.
    #[must_use]
    pub fn package_dir(&self, path: &str) -> PathBuf {
        self.packages_dir().join(path)
    }

    /// Build output directory of the package at `path`.
    #[must_use]
    pub fn dist_dir(&self, path: &str) -> PathBuf {
        self.package_dir(path).join("diamond").join("dist")
    }

    #[must_use]
    pub fn autoload_path(&self) -> PathBuf {
        self.diamond_dir().join("autoload.css")
    }
}
