//! Install tree rendering.

use diamond_core::pkg::{NodeStatus, TreeNode};
use std::fmt::Write;

/// Root label: `name@version <cwd>`, `name <cwd>`, or just `<cwd>`.
#[must_use]
pub fn root_label(name: Option<&str>, version: Option<&str>, cwd: &str) -> String {
    match (name, version) {
        (Some(name), Some(version)) => format!("{name}@{version} {cwd}"),
        (Some(name), None) => format!("{name} {cwd}"),
        _ => cwd.to_string(),
    }
}

/// Render the install report with box-drawing connectors.
#[must_use]
pub fn render(root: &str, nodes: &[TreeNode]) -> String {
    let mut out = String::new();
    out.push_str(root);
    out.push('\n');
    render_children(&mut out, nodes, "");
    out
}

fn render_children(out: &mut String, nodes: &[TreeNode], prefix: &str) {
    for (i, node) in nodes.iter().enumerate() {
        let is_last = i + 1 == nodes.len();
        let connector = if is_last { "└── " } else { "├── " };
        let next_prefix = if is_last { "    " } else { "│   " };

        let marker = match node.status {
            NodeStatus::New => '+',
            NodeStatus::Updated => '~',
        };
        let cached = if node.from_cache { " (from cache)" } else { "" };
        let _ = writeln!(out, "{prefix}{connector}{marker} {}{cached}", node.label);

        render_children(out, &node.children, &format!("{prefix}{next_prefix}"));
    }
}
