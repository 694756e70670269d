//! Stylesheet package management.
//!
//! - Parsing specifiers (`owner/repo#ref`, `npm:name@range`, `name@tag`)
//! - Resolving them against npm, the first-party registry, or git hosts
//! - Extracting and verifying archives
//! - The lock store and package placement
//! - The installer, content cache, and project manifest

pub mod archive;
pub mod autoload;
pub mod cache;
pub mod error;
pub mod fetch;
pub mod install;
pub mod lockfile;
pub mod manifest;
pub mod placement;
pub mod project;
pub mod registry;
pub mod spec;
pub mod tarball;
pub mod version;

pub use cache::{CacheKey, ContentCache};
pub use error::{codes as pkg_codes, PkgError};
pub use fetch::{resolve, Integrity, Resolved};
pub use install::{
    compile_stylesheet, post_processor_modules, InstallRequest, Installed, Installer, NodeStatus,
    SessionReport, TreeNode,
};
pub use lockfile::{LockStore, PackageRecord};
pub use manifest::{Hooks, Manifest};
pub use placement::{place, DirOp, Placement};
pub use project::{saved_specifier, ProjectManifest};
pub use registry::{Endpoints, RegistryClient, MAX_TARBALL_SIZE};
pub use spec::{ArchiveSource, RegistrySource, Selector, Source, SourceKind};
pub use tarball::{extract_tgz, pack_dir, ArchiveDigest};
pub use version::{is_valid_range, max_satisfying, resolve_version};
