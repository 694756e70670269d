//! The installer: resolve, fetch, place, recurse, build.
//!
//! Per package:
//! 1. resolve metadata (network, or the content cache when offline)
//! 2. extract the archive into a private staging directory and verify it
//! 3. under the lock: place, move the staged tree in, record it
//! 4. install hook prerequisites, then dependencies one at a time
//! 5. build `diamond/dist/main.{css,scss,styl}`
//! 6. cache first-party packages
//!
//! Top-level requests run concurrently. The lock covers step 3, and step 5
//! re-reads the record's path under it since a concurrent top-level install
//! may have relocated the package in between.

use super::autoload::write_autoload;
use super::cache::{CacheKey, ContentCache};
use super::error::PkgError;
use super::fetch::{resolve, Resolved};
use super::lockfile::{LockStore, PackageRecord};
use super::manifest::Manifest;
use super::placement::{place, DirOp};
use super::project::{saved_specifier, ProjectManifest};
use super::registry::{RegistryClient, MAX_TARBALL_SIZE};
use super::spec::{Selector, Source, SourceKind};
use super::tarball::{extract_tgz, pack_dir, ArchiveDigest};
use crate::config::InstallOptions;
use crate::css::{apply_post_processors, CompileOptions, Compiler, SassCompiler, StyleLang};
use crate::paths::ProjectLayout;
use diamond_util::fs::{atomic_write, move_dir, read_to_string_lossy, remove_dir_if_exists};
use futures::future::{try_join_all, BoxFuture, FutureExt};
use serde::Serialize;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[cfg(windows)]
const NPM: &str = "npm.cmd";
#[cfg(not(windows))]
const NPM: &str = "npm";

static STAGING_COUNTER: AtomicU64 = AtomicU64::new(0);

/// One package to install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRequest {
    pub source: Source,
    /// Consumer path for nested dependencies.
    pub for_path: Option<String>,
}

impl InstallRequest {
    #[must_use]
    pub fn top_level(source: Source) -> Self {
        Self {
            source,
            for_path: None,
        }
    }

    #[must_use]
    pub fn nested(source: Source, for_path: impl Into<String>) -> Self {
        Self {
            source,
            for_path: Some(for_path.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    New,
    Updated,
}

/// Report node for one installed package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeNode {
    pub label: String,
    pub status: NodeStatus,
    pub from_cache: bool,
    pub children: Vec<TreeNode>,
}

#[derive(Debug, Clone)]
pub struct Installed {
    pub node: TreeNode,
    pub record: PackageRecord,
}

/// Result of a whole install session.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub installed: Vec<Installed>,
    pub autoload: PathBuf,
}

/// Staged artifact awaiting placement.
struct Fetched {
    resolved: Resolved,
    staging: PathBuf,
    from_cache: bool,
}

pub struct Installer {
    layout: ProjectLayout,
    lock: LockStore,
    client: RegistryClient,
    cache: ContentCache,
    compiler: Arc<dyn Compiler>,
    options: InstallOptions,
}

impl Installer {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, client: RegistryClient, options: InstallOptions) -> Self {
        let layout = ProjectLayout::new(root);
        let lock = LockStore::new(layout.lockfile_path(), layout.lock_guard_path());
        Self {
            layout,
            lock,
            client,
            cache: ContentCache::from_env(),
            compiler: Arc::new(SassCompiler),
            options,
        }
    }

    #[must_use]
    pub fn with_cache(mut self, cache: ContentCache) -> Self {
        self.cache = cache;
        self
    }

    #[must_use]
    pub fn with_compiler(mut self, compiler: Arc<dyn Compiler>) -> Self {
        self.compiler = compiler;
        self
    }

    #[must_use]
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock = self.lock.with_timeout(timeout);
        self
    }

    #[must_use]
    pub fn layout(&self) -> &ProjectLayout {
        &self.layout
    }

    #[must_use]
    pub fn lock_store(&self) -> &LockStore {
        &self.lock
    }

    /// Install, save to `package.json` (when enabled) and rewrite the autoload file.
    ///
    /// # Errors
    /// Returns the first fatal error. Packages committed before it stay installed.
    pub async fn run_session(&self, sources: Vec<Source>) -> Result<SessionReport, PkgError> {
        let installed = self.install_all(sources).await?;

        if self.options.save && !installed.is_empty() {
            let mut manifest = ProjectManifest::load(self.layout.root())?;
            for item in &installed {
                manifest.set_dependency(&item.record.name, &saved_specifier(&item.record));
            }
            manifest.save()?;
            debug!(path = %manifest.path().display(), "Saved dependencies");
        }

        let autoload = write_autoload(&self.layout, &self.lock.read())?;
        Ok(SessionReport {
            installed,
            autoload,
        })
    }

    /// Install top-level packages concurrently.
    ///
    /// # Errors
    /// Returns the first fatal error.
    pub async fn install_all(&self, sources: Vec<Source>) -> Result<Vec<Installed>, PkgError> {
        try_join_all(
            sources
                .into_iter()
                .map(|source| self.install(InstallRequest::top_level(source))),
        )
        .await
    }

    /// Install one package and, sequentially, its dependencies.
    pub fn install(&self, request: InstallRequest) -> BoxFuture<'_, Result<Installed, PkgError>> {
        async move { self.install_one(request).await }.boxed()
    }

    async fn install_one(&self, request: InstallRequest) -> Result<Installed, PkgError> {
        let InstallRequest { source, for_path } = request;
        debug!(source = %source, for_path = ?for_path, "Installing package");

        let Fetched {
            resolved,
            staging,
            from_cache,
        } = self.fetch(&source).await?;

        let record = new_record(&resolved, source, for_path);
        let (record, replaced) = self.commit(record, staging).await?;
        info!(
            name = %record.name,
            version = ?record.version,
            path = %record.path,
            from_cache,
            "Installed package"
        );

        if record.hooks().any() {
            self.install_hook_prerequisites(&self.layout.package_dir(&record.path))
                .await?;
        }

        let mut children = Vec::new();
        for dep in Source::parse_map(&record.dependencies)? {
            let child = self
                .install(InstallRequest::nested(dep, record.path.clone()))
                .await?;
            children.push(child.node);
        }

        self.build_outputs(&record, from_cache).await?;

        if resolved.kind == SourceKind::Diamond && !from_cache && self.options.use_cache() {
            self.store_in_cache(&record).await;
        }

        let node = TreeNode {
            label: record.label(),
            status: if replaced {
                NodeStatus::Updated
            } else {
                NodeStatus::New
            },
            from_cache,
            children,
        };
        Ok(Installed { node, record })
    }

    async fn fetch(&self, source: &Source) -> Result<Fetched, PkgError> {
        if self.options.offline {
            return self.fetch_offline(source).await;
        }

        let resolved = resolve(&self.client, source).await?;
        resolved.validate()?;

        if resolved.kind == SourceKind::Diamond && self.options.use_cache() {
            let name = source.name().unwrap_or(&resolved.name);
            let hit = resolved
                .version
                .as_deref()
                .and_then(|v| self.cache.get(name, CacheKey::Version(v)));
            if let Some(archive) = hit {
                debug!(path = %archive.display(), "Using cached package");
                let (staging, _) = self.stage(move |dir| extract_file(&archive, dir)).await?;
                return Ok(Fetched {
                    resolved,
                    staging,
                    from_cache: true,
                });
            }
        }

        let bytes = self
            .client
            .download(&resolved.tarball_url, MAX_TARBALL_SIZE)
            .await?;
        debug!(size = bytes.len(), "Downloaded archive");

        let strip = resolved.strip_components();
        let (staging, digest) = self
            .stage(move |dir| extract_tgz(&bytes[..], dir, strip))
            .await?;

        if let Some(integrity) = &resolved.integrity {
            if let Err(e) = integrity.verify(&resolved.name, &digest) {
                let _ = remove_dir_if_exists(&staging);
                return Err(e);
            }
        }

        Ok(Fetched {
            resolved,
            staging,
            from_cache: false,
        })
    }

    /// Offline: first-party packages from the content cache only.
    async fn fetch_offline(&self, source: &Source) -> Result<Fetched, PkgError> {
        let Source::Diamond(reg) = source else {
            return Err(PkgError::offline_miss(format!(
                "{source} cannot be installed offline; only first-party packages are cached"
            )));
        };

        let hit = self
            .cache
            .find(&reg.name, &reg.selector)?
            .ok_or_else(|| PkgError::offline_miss(format!("No cached archive satisfies {source}")))?;
        debug!(path = %hit.path.display(), "Using cached package");

        let archive = hit.path.clone();
        let (staging, _) = self.stage(move |dir| extract_file(&archive, dir)).await?;

        let manifest =
            Manifest::from_text(&read_to_string_lossy(&staging.join("package.json")).unwrap_or_default());
        let name = manifest.name().unwrap_or(&reg.name).to_string();
        let version = hit
            .version
            .or_else(|| manifest.version().map(String::from));

        let resolved = Resolved {
            kind: SourceKind::Diamond,
            name,
            version,
            git_ref: None,
            manifest: Some(manifest),
            tarball_url: hit.path.display().to_string(),
            integrity: None,
        };
        if let Err(e) = resolved.validate() {
            let _ = remove_dir_if_exists(&staging);
            return Err(e);
        }

        Ok(Fetched {
            resolved,
            staging,
            from_cache: true,
        })
    }

    /// Extract into a fresh staging directory, removing it on failure.
    async fn stage(
        &self,
        extract: impl FnOnce(&Path) -> Result<ArchiveDigest, PkgError> + Send + 'static,
    ) -> Result<(PathBuf, ArchiveDigest), PkgError> {
        let staging = self.layout.staging_dir().join(format!(
            "{}-{}",
            std::process::id(),
            STAGING_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        let dir = staging.clone();
        match blocking(move || extract(&dir)).await {
            Ok(digest) => Ok((staging, digest)),
            Err(e) => {
                let _ = remove_dir_if_exists(&staging);
                Err(e)
            }
        }
    }

    /// The critical section: place the record and move the staged tree in.
    async fn commit(
        &self,
        record: PackageRecord,
        staging: PathBuf,
    ) -> Result<(PackageRecord, bool), PkgError> {
        let lock = self.lock.clone();
        let packages = self.layout.packages_dir();
        let staged = staging.clone();

        let result = blocking(move || {
            lock.update(|records| {
                let placement = place(std::mem::take(records), record.clone());
                for op in &placement.ops {
                    apply_op(&packages, op)?;
                }

                let dest = packages.join(&placement.path);
                move_dir(&staged, &dest).map_err(|e| {
                    PkgError::extract_failed(format!(
                        "Failed to move package into {}: {e}",
                        dest.display()
                    ))
                })?;

                let mut committed = record;
                committed.path = placement.path;
                *records = placement.records;
                Ok((committed, placement.replaced))
            })
        })
        .await;

        if result.is_err() {
            let _ = remove_dir_if_exists(&staging);
        }
        result
    }

    /// Hook modules need the package's own npm dependencies.
    async fn install_hook_prerequisites(&self, dir: &Path) -> Result<(), PkgError> {
        if !dir.join("package.json").is_file() {
            warn!(path = %dir.display(), "Package declares hooks but has no package.json");
            return Ok(());
        }

        debug!(path = %dir.display(), "Installing hook dependencies");
        let output = tokio::process::Command::new(NPM)
            .arg("install")
            .current_dir(dir)
            .output()
            .await
            .map_err(|e| PkgError::hook_install_failed(format!("Failed to run {NPM}: {e}")))?;

        if !output.status.success() {
            return Err(PkgError::hook_install_failed(format!(
                "{NPM} install in {} exited with {}: {}",
                dir.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    /// Write `diamond/dist/main.{css,scss,styl}` for the package's entry point.
    ///
    /// Holds the lock throughout, so the directory cannot be relocated
    /// between looking up its path and writing into it.
    async fn build_outputs(&self, record: &PackageRecord, from_cache: bool) -> Result<(), PkgError> {
        let Some(main) = record.main.clone() else {
            return Ok(());
        };
        let Some(lang) = StyleLang::from_path(Path::new(&main)) else {
            debug!(main = %main, "Entry point is not a stylesheet");
            return Ok(());
        };

        let compiler = Arc::clone(&self.compiler);
        let layout = self.layout.clone();
        let lock = self.lock.clone();
        let record = record.clone();
        blocking(move || {
            lock.with_lock(|| {
                let records = lock.read();
                let Some(path) = current_path(&records, &record) else {
                    debug!(name = %record.name, "Package was superseded before its build");
                    return Ok(());
                };
                if path != record.path {
                    debug!(from = %record.path, to = %path, "Package moved before its build");
                }

                let entry = layout.package_dir(path).join(&main);
                let dist = layout.dist_dir(path);
                if from_cache && dist.join("main.css").is_file() {
                    debug!(path = %dist.display(), "Using cached build outputs");
                    return Ok(());
                }

                if lang.is_source() {
                    let post = post_processor_modules(&layout, &records);
                    let css = compile_stylesheet(compiler.as_ref(), &layout, &entry, &post)?;
                    write_output(&dist, "main.css", &css)?;
                    write_output(&dist, "main.scss", &css)?;
                    write_output(&dist, "main.styl", &compiler.to_stylus(&css))?;
                } else {
                    let css = read_to_string_lossy(&entry).map_err(|e| {
                        PkgError::compile_failed(format!("{}: {e}", entry.display()))
                    })?;
                    write_output(&dist, "main.scss", &css)?;
                    write_output(&dist, "main.styl", &compiler.to_stylus(&css))?;
                }
                Ok(())
            })
        })
        .await
    }

    /// Pack the installed directory into the content cache. Failures only warn.
    async fn store_in_cache(&self, record: &PackageRecord) {
        let dir = self.layout.package_dir(&record.path);
        let cache = self.cache.clone();
        let name = record
            .source
            .name()
            .unwrap_or(&record.name)
            .to_string();
        let version = record.version.clone();
        let tag = match &record.source {
            Source::Diamond(reg) => match &reg.selector {
                Selector::Tag(tag) => Some(tag.clone()),
                Selector::Version(_) => None,
            },
            _ => None,
        };

        let result = blocking(move || {
            let bytes = pack_dir(&dir)?;
            if let Some(v) = &version {
                cache.store(&name, CacheKey::Version(v), &bytes)?;
            }
            if let Some(t) = &tag {
                cache.store(&name, CacheKey::Tag(t), &bytes)?;
            }
            Ok(())
        })
        .await;

        if let Err(e) = result {
            warn!(name = %record.name, error = %e, "Failed to cache package");
        }
    }
}

/// Compile an entry point with the project's load path and post-processors.
///
/// # Errors
/// Returns the compiler's or a post-processor's error.
pub fn compile_stylesheet(
    compiler: &dyn Compiler,
    layout: &ProjectLayout,
    entry: &Path,
    post_processors: &[PathBuf],
) -> Result<String, PkgError> {
    let options = CompileOptions::compressed().with_load_path(layout.packages_dir());
    let css = compiler.compile(entry, &options)?;
    apply_post_processors(css, post_processors)
}

/// Post-processor modules declared by installed packages, in lock order.
#[must_use]
pub fn post_processor_modules(layout: &ProjectLayout, records: &[PackageRecord]) -> Vec<PathBuf> {
    records
        .iter()
        .filter_map(|r| {
            let module = r.post_processor.as_deref()?;
            Some(layout.package_dir(&r.path).join(module))
        })
        .collect()
}

/// Where `record` lives now. Relocation rewrites `path` (and possibly
/// `for_path`) but never the release identity.
fn current_path<'a>(records: &'a [PackageRecord], record: &PackageRecord) -> Option<&'a str> {
    let same = |r: &&PackageRecord| {
        r.name == record.name
            && r.version == record.version
            && r.git_ref == record.git_ref
            && r.source == record.source
    };
    records
        .iter()
        .filter(same)
        .find(|r| r.path == record.path)
        .or_else(|| {
            records
                .iter()
                .filter(same)
                .find(|r| r.is_nested() == record.is_nested())
        })
        .map(|r| r.path.as_str())
}

fn new_record(resolved: &Resolved, source: Source, for_path: Option<String>) -> PackageRecord {
    let manifest = resolved.manifest.as_ref();
    let mut record = PackageRecord {
        name: resolved.name.clone(),
        version: resolved.version.clone(),
        git_ref: resolved.git_ref.clone(),
        source,
        path: String::new(),
        for_path,
        main: resolved.entry_point(),
        dependencies: manifest
            .map(|m| m.dependencies(resolved.kind))
            .unwrap_or_default(),
        post_processor: None,
        functions: None,
        importer: None,
    };
    if let Some(manifest) = manifest {
        record.set_hooks(manifest.hooks());
    }
    record
}

fn apply_op(packages: &Path, op: &DirOp) -> Result<(), PkgError> {
    match op {
        DirOp::Remove(path) => remove_dir_if_exists(&packages.join(path))?,
        DirOp::Move { from, to } => {
            let from_dir = packages.join(from);
            if from_dir.exists() {
                debug!(from = %from, to = %to, "Relocating package");
                move_dir(&from_dir, &packages.join(to))?;
            }
        }
    }
    Ok(())
}

fn extract_file(archive: &Path, dest: &Path) -> Result<ArchiveDigest, PkgError> {
    let file = File::open(archive).map_err(|e| {
        PkgError::cache_error(format!("Failed to open {}: {e}", archive.display()))
    })?;
    extract_tgz(BufReader::new(file), dest, 0)
}

fn write_output(dist: &Path, file: &str, contents: &str) -> Result<(), PkgError> {
    let path = dist.join(file);
    atomic_write(&path, contents.as_bytes())
        .map_err(|e| PkgError::compile_failed(format!("Failed to write {}: {e}", path.display())))
}

/// Run blocking filesystem work off the async runtime.
async fn blocking<T: Send + 'static>(
    f: impl FnOnce() -> Result<T, PkgError> + Send + 'static,
) -> Result<T, PkgError> {
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PkgError::extract_failed(format!("Background task failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pkg::spec::ArchiveSource;
    use serde_json::json;

    #[test]
    fn test_new_record_from_archive_without_manifest() {
        let source = Source::parse("owner/repo").unwrap();
        let resolved = Resolved {
            kind: SourceKind::Github,
            name: "repo".into(),
            version: None,
            git_ref: None,
            manifest: None,
            tarball_url: String::new(),
            integrity: None,
        };
        let record = new_record(&resolved, source, None);
        assert_eq!(record.name, "repo");
        assert_eq!(record.version, None);
        assert_eq!(record.label(), "repo");
        assert!(record.dependencies.is_empty());
        assert!(matches!(record.source, Source::Github(ArchiveSource { .. })));
    }

    #[test]
    fn test_new_record_carries_hooks_and_deps() {
        let resolved = Resolved {
            kind: SourceKind::Npm,
            name: "foo".into(),
            version: Some("2.3.1".into()),
            git_ref: None,
            manifest: Some(Manifest::new(json!({
                "sass": { "importer": "imp.js" },
                "style": "foo.css",
                "dependencies": { "jquery": "^3.0.0" },
                "diamond": { "dependencies": { "bar": "^1.0.0" } }
            }))),
            tarball_url: String::new(),
            integrity: None,
        };
        let record = new_record(&resolved, Source::parse("npm:foo@2.x").unwrap(), Some("x".into()));
        assert_eq!(record.main.as_deref(), Some("foo.css"));
        assert_eq!(record.importer.as_deref(), Some("imp.js"));
        assert_eq!(record.for_path.as_deref(), Some("x"));
        assert_eq!(record.dependencies.get("bar").map(String::as_str), Some("^1.0.0"));
        assert!(!record.dependencies.contains_key("jquery"));
    }

    #[test]
    fn test_current_path_follows_relocation() {
        let resolved = Resolved {
            kind: SourceKind::Diamond,
            name: "x".into(),
            version: Some("1.0.0".into()),
            git_ref: None,
            manifest: None,
            tarball_url: String::new(),
            integrity: None,
        };
        let mut built = new_record(&resolved, Source::parse("x@^1.0.0").unwrap(), Some("y".into()));
        built.path = "x".into();

        let mut moved = built.clone();
        moved.path = "y/diamond-packages/x".into();
        let mut newer = built.clone();
        newer.version = Some("2.0.0".into());
        newer.for_path = None;

        let records = vec![moved, newer];
        assert_eq!(current_path(&records, &built), Some("y/diamond-packages/x"));
        assert_eq!(current_path(&records[1..], &built), None);
        assert_eq!(current_path(&records, &records[1]), Some("x"));
    }

    #[test]
    fn test_post_processor_modules() {
        let layout = ProjectLayout::new("/p");
        let resolved = Resolved {
            kind: SourceKind::Diamond,
            name: "a".into(),
            version: Some("1.0.0".into()),
            git_ref: None,
            manifest: Some(Manifest::new(json!({ "postProcessor": "post.js" }))),
            tarball_url: String::new(),
            integrity: None,
        };
        let mut record = new_record(&resolved, Source::parse("a").unwrap(), None);
        record.path = "a".into();

        assert_eq!(
            post_processor_modules(&layout, &[record]),
            vec![PathBuf::from("/p/diamond/packages/a/post.js")]
        );
    }
}
