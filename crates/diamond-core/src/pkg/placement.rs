//! Where an incoming package lands in `diamond/packages`.
//!
//! Pure over the record list: the caller applies the returned directory
//! operations while still holding the lock.
//!
//! Rules, with `E` the record currently at `path == name`:
//! - top-level incoming, `E` nested for `g` at another version: `E` moves to
//!   `g/diamond-packages/<name>` and the incoming package takes `name`
//! - top-level incoming otherwise: `E` (if any) is superseded
//! - nested incoming for `f`, slot free or owned by `f`: hoisted to `name`
//! - nested incoming for `f`, slot owned by someone else: placed at
//!   `f/diamond-packages/<name>`

use super::lockfile::PackageRecord;

/// Directory under a consumer that holds its colliding dependencies.
pub const NESTED_DIR: &str = "diamond-packages";

/// A directory operation, paths relative to `diamond/packages`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirOp {
    Remove(String),
    Move { from: String, to: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    /// Records after placement, the incoming one last.
    pub records: Vec<PackageRecord>,
    /// Path assigned to the incoming record.
    pub path: String,
    /// Operations to apply in order before moving the new package in.
    pub ops: Vec<DirOp>,
    /// Whether an earlier install occupied the assigned path.
    pub replaced: bool,
}

#[must_use]
pub fn nested_path(consumer: &str, name: &str) -> String {
    format!("{consumer}/{NESTED_DIR}/{name}")
}

/// `path` equals `root` or lies beneath it.
fn is_within(path: &str, root: &str) -> bool {
    path == root
        || path
            .strip_prefix(root)
            .is_some_and(|rest| rest.starts_with('/'))
}

fn rebase(path: &str, from: &str, to: &str) -> String {
    format!("{to}{}", &path[from.len()..])
}

/// Decide placement for `incoming` (its `path` is ignored).
#[must_use]
pub fn place(mut records: Vec<PackageRecord>, mut incoming: PackageRecord) -> Placement {
    let name = incoming.name.clone();
    let mut ops = Vec::new();

    let existing = records.iter().position(|r| r.path == name);
    let (path, replaced) = match (&incoming.for_path, existing) {
        (None, Some(idx)) => {
            let from = records[idx].path.clone();
            let relocate_to = records[idx]
                .for_path
                .as_deref()
                .filter(|_| records[idx].version != incoming.version)
                .map(|owner| nested_path(owner, &name));
            let replaced = match relocate_to {
                Some(to) => {
                    supersede(&mut records, &to, &mut ops);
                    relocate(&mut records, &from, &to, &mut ops);
                    false
                }
                None => supersede(&mut records, &from, &mut ops),
            };
            (name, replaced)
        }
        (None, None) => (name, false),
        (Some(consumer), existing) => {
            let owned = existing.map_or(true, |idx| {
                records[idx].for_path.as_deref() == Some(consumer.as_str())
            });
            let path = if owned {
                name
            } else {
                nested_path(consumer, &name)
            };
            let replaced = supersede(&mut records, &path, &mut ops);
            (path, replaced)
        }
    };

    ops.push(DirOp::Remove(path.clone()));

    incoming.path = path.clone();
    records.push(incoming);

    Placement {
        records,
        path,
        ops,
        replaced,
    }
}

/// Drop the record at `path` and everything beneath it.
///
/// Returns whether a record sat exactly at `path`.
fn supersede(records: &mut Vec<PackageRecord>, path: &str, ops: &mut Vec<DirOp>) -> bool {
    let exact = records.iter().any(|r| r.path == path);
    let before = records.len();
    records.retain(|r| !is_within(&r.path, path));
    if records.len() != before {
        ops.push(DirOp::Remove(path.to_string()));
    }
    exact
}

/// Move the record at `from` (and everything beneath it) to `to`.
fn relocate(records: &mut [PackageRecord], from: &str, to: &str, ops: &mut Vec<DirOp>) {
    for r in records.iter_mut() {
        if is_within(&r.path, from) {
            r.path = rebase(&r.path, from, to);
        }
        if let Some(owner) = r.for_path.as_deref().filter(|f| is_within(f, from)) {
            r.for_path = Some(rebase(owner, from, to));
        }
    }
    ops.push(DirOp::Move {
        from: from.to_string(),
        to: to.to_string(),
    });
}
