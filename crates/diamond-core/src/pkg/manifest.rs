//! Package manifest (`package.json`) interpretation.
//!
//! Stylesheet packages declare their entry point in several historical
//! fields; which ones win depends on where the package came from.

use super::spec::SourceKind;
use serde_json::Value;
use std::collections::BTreeMap;

/// Compiler extension hooks declared by a package.
///
/// Paths are relative to the package directory and opaque to the installer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hooks {
    pub post_processor: Option<String>,
    pub functions: Option<BTreeMap<String, String>>,
    pub importer: Option<String>,
}

impl Hooks {
    /// Whether any hook is declared.
    #[must_use]
    pub fn any(&self) -> bool {
        self.post_processor.is_some() || self.functions.is_some() || self.importer.is_some()
    }
}

/// A fetched package description.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    raw: Value,
}

impl Manifest {
    #[must_use]
    pub fn new(raw: Value) -> Self {
        Self { raw }
    }

    /// Parse manifest text. Invalid JSON yields an empty manifest.
    #[must_use]
    pub fn from_text(text: &str) -> Self {
        Self::new(serde_json::from_str(text).unwrap_or_else(|_| Value::Object(Default::default())))
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.str_field("name")
    }

    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.str_field("version")
    }

    /// Resolve the stylesheet entry point according to the source's rules.
    #[must_use]
    pub fn entry_point(&self, kind: SourceKind) -> Option<String> {
        let diamond_main = self.diamond_main();
        let found = match kind {
            SourceKind::Npm => diamond_main
                .or_else(|| self.str_field("sass"))
                .or_else(|| self.str_field("less"))
                .or_else(|| self.str_field("main").filter(|m| !m.ends_with(".js")))
                .or_else(|| self.str_field("style")),
            SourceKind::Diamond => self
                .str_field("main")
                .or(diamond_main)
                .or_else(|| self.str_field("sass"))
                .or_else(|| self.str_field("style")),
            SourceKind::Github | SourceKind::Gitlab | SourceKind::Bitbucket => diamond_main
                .or_else(|| self.str_field("sass"))
                .or_else(|| self.str_field("style"))
                .or_else(|| self.str_field("main")),
        };
        found.map(String::from)
    }

    /// `diamond` as a string, or `diamond.main`.
    fn diamond_main(&self) -> Option<&str> {
        match self.raw.get("diamond")? {
            Value::String(s) => Some(s),
            Value::Object(obj) => obj.get("main")?.as_str(),
            _ => None,
        }
    }

    /// Declared compiler hooks.
    #[must_use]
    pub fn hooks(&self) -> Hooks {
        let post_processor = self
            .str_field("postProcessor")
            .or_else(|| self.raw.get("diamond")?.get("postProcessor")?.as_str())
            .map(String::from);

        let sass = self.raw.get("sass").filter(|v| v.is_object());
        let functions = sass
            .and_then(|s| s.get("functions"))
            .and_then(Value::as_object)
            .map(|obj| {
                obj.iter()
                    .filter_map(|(k, v)| Some((k.clone(), v.as_str()?.to_string())))
                    .collect::<BTreeMap<_, _>>()
            })
            .filter(|m| !m.is_empty());
        let importer = sass
            .and_then(|s| s.get("importer"))
            .and_then(Value::as_str)
            .map(String::from);

        Hooks {
            post_processor,
            functions,
            importer,
        }
    }

    /// Declared stylesheet dependencies (`diamond.dependencies`, else `dependencies`).
    ///
    /// npm packages list JavaScript libraries under `dependencies`, so only
    /// their `diamond.dependencies` counts. Non-string values are skipped.
    #[must_use]
    pub fn dependencies(&self, kind: SourceKind) -> BTreeMap<String, String> {
        let diamond = self.raw.get("diamond").and_then(|d| d.get("dependencies"));
        let section = match kind {
            SourceKind::Npm => diamond,
            _ => diamond.or_else(|| self.raw.get("dependencies")),
        };

        section
            .and_then(Value::as_object)
            .map(|obj| {
                obj.iter()
                    .filter_map(|(k, v)| Some((k.clone(), v.as_str()?.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.raw.get(key)?.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_archive_entry_prefers_diamond_main() {
        let m = Manifest::new(json!({
            "diamond": { "main": "src/index.scss" },
            "sass": "other.scss",
            "main": "index.js"
        }));
        assert_eq!(
            m.entry_point(SourceKind::Github).as_deref(),
            Some("src/index.scss")
        );
    }

    #[test]
    fn test_archive_entry_falls_back_to_main() {
        let m = Manifest::new(json!({ "main": "dist/sierra.css" }));
        assert_eq!(
            m.entry_point(SourceKind::Gitlab).as_deref(),
            Some("dist/sierra.css")
        );
    }

    #[test]
    fn test_npm_entry_skips_js_main() {
        let m = Manifest::new(json!({ "main": "index.js", "style": "dist/x.css" }));
        assert_eq!(m.entry_point(SourceKind::Npm).as_deref(), Some("dist/x.css"));

        let m = Manifest::new(json!({ "less": "x.less", "main": "x.css" }));
        assert_eq!(m.entry_point(SourceKind::Npm).as_deref(), Some("x.less"));

        let m = Manifest::new(json!({ "diamond": "lib/_x.scss", "sass": "y.scss" }));
        assert_eq!(m.entry_point(SourceKind::Npm).as_deref(), Some("lib/_x.scss"));
    }

    #[test]
    fn test_hooks() {
        let m = Manifest::new(json!({
            "postProcessor": "post.js",
            "sass": {
                "functions": { "rem($px)": "functions/rem.js" },
                "importer": "importer.js"
            }
        }));
        let hooks = m.hooks();
        assert!(hooks.any());
        assert_eq!(hooks.post_processor.as_deref(), Some("post.js"));
        assert_eq!(hooks.importer.as_deref(), Some("importer.js"));
        assert_eq!(
            hooks.functions.unwrap().get("rem($px)").map(String::as_str),
            Some("functions/rem.js")
        );

        assert!(!Manifest::new(json!({ "sass": "x.scss" })).hooks().any());
    }

    #[test]
    fn test_dependencies_prefers_diamond_section() {
        let m = Manifest::new(json!({
            "dependencies": { "left-pad": "^1.0.0" },
            "diamond": { "dependencies": { "sierra": "^2.0.0", "bad": 3 } }
        }));
        let deps = m.dependencies(SourceKind::Diamond);
        assert_eq!(deps.len(), 1);
        assert_eq!(deps.get("sierra").map(String::as_str), Some("^2.0.0"));
    }

    #[test]
    fn test_npm_ignores_plain_dependencies() {
        let m = Manifest::new(json!({ "dependencies": { "jquery": "^3.0.0" } }));
        assert!(m.dependencies(SourceKind::Npm).is_empty());
        assert_eq!(m.dependencies(SourceKind::Github).len(), 1);

        let m = Manifest::new(json!({
            "dependencies": { "jquery": "^3.0.0" },
            "diamond": { "dependencies": { "sierra": "^2.0.0" } }
        }));
        let deps = m.dependencies(SourceKind::Npm);
        assert_eq!(deps.keys().collect::<Vec<_>>(), vec!["sierra"]);
    }

    #[test]
    fn test_from_text_invalid_is_empty() {
        let m = Manifest::from_text("not json");
        assert_eq!(m.name(), None);
        assert!(m.dependencies(SourceKind::Diamond).is_empty());
    }
}
