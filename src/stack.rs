//! Stack implements the Stack Enumerator and stack naming (§4.2, §4.8): discovering deployable
//! stacks under `config/`, deriving their stable names, and matching them against a user filter.

use std::path::{Path, PathBuf};

use tracing::{instrument, warn};

use crate::config::{self, EffectiveConfig};
use crate::Result;

/// Stack is one deployable unit: an effective config, the stack file's path, and its derived
/// name.
#[derive(Debug, Clone)]
pub struct Stack {
    /// Config is the stack's effective (merged) configuration.
    pub config: EffectiveConfig,
    /// Path is the absolute path of the stack file.
    pub path: PathBuf,
    /// Relative is the stack file's path relative to `config/`, used for filter matching.
    pub relative: PathBuf,
    /// Name is the derived stack name (`{project_code}-{context}-{app_name}`).
    pub name: String,
}

/// Enumerate walks `config/` recursively and returns every deployable stack (regular files
/// ending in `.yaml`/`.yml`, excluding any named `config.yaml`/`config.yml`), in deterministic
/// lexicographic order by path. A file missing `manifest` is an un-deployable config node and
/// is skipped with a warning rather than failing the whole enumeration.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn enumerate(root: &Path) -> Result<Vec<Stack>> {
    let mut paths = Vec::new();
    walk(root, &mut paths)?;
    paths.sort();

    let mut stacks = Vec::new();
    for path in paths {
        let relative = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
        let cfg = config::resolve(root, &path)?;
        if cfg.manifest.is_none() {
            warn!(path = %relative.display(), "config node has no `manifest`; skipping (un-deployable)");
            continue;
        }
        let name = generate_stack_name(
            cfg.project_code.as_deref().unwrap_or_default(),
            cfg.context.as_deref().unwrap_or_default(),
            &path,
        );
        stacks.push(Stack {
            config: cfg,
            path,
            relative,
            name,
        });
    }
    Ok(stacks)
}

fn walk(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            walk(&path, out)?;
            continue;
        }
        if !file_type.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let lower = name.to_ascii_lowercase();
        if !(lower.ends_with(".yaml") || lower.ends_with(".yml")) {
            continue;
        }
        if lower == "config.yaml" || lower == "config.yml" {
            continue;
        }
        out.push(path);
    }
    Ok(())
}

/// To_kebab replaces underscores with hyphens.
fn to_kebab(s: &str) -> String {
    s.replace('_', "-")
}

/// Base_app strips the file's basename of one trailing recognised extension
/// (`.yaml|.yml|.jinja|.j2|.hcl|.tf`), ignoring any path components.
pub fn base_app(file: &Path) -> String {
    let name = file.file_name().and_then(|n| n.to_str()).unwrap_or(".");
    for ext in [".yaml", ".yml", ".jinja", ".j2", ".hcl", ".tf"] {
        if let Some(stripped) = strip_suffix_case_insensitive(name, ext) {
            return stripped.to_string();
        }
    }
    name.to_string()
}

fn strip_suffix_case_insensitive<'a>(s: &'a str, suffix: &str) -> Option<&'a str> {
    if s.len() >= suffix.len() && s[s.len() - suffix.len()..].eq_ignore_ascii_case(suffix) {
        Some(&s[..s.len() - suffix.len()])
    } else {
        None
    }
}

/// Generate_stack_name derives the stable stack name for `file` given `project_code` and
/// `context`: `{project_code}-{context}-{app_name}`, each kebab-cased and lowercased.
/// Path components of `file` other than the final filename are ignored.
pub fn generate_stack_name(project_code: &str, context: &str, file: &Path) -> String {
    let app = base_app(file);
    format!(
        "{}-{}-{}",
        to_kebab(project_code).to_lowercase(),
        to_kebab(context).to_lowercase(),
        to_kebab(&app).to_lowercase(),
    )
}

impl Stack {
    /// Matches reports whether this stack satisfies the user-provided filter (§3 "Stack
    /// Filter"): an empty filter matches everything; otherwise the filter may equal the stack
    /// name, a path prefix relative to `config/` (with or without a trailing `.yaml`/`.yml`),
    /// or a single path segment appearing anywhere in the stack's relative path.
    pub fn matches(&self, filter: &str) -> bool {
        if filter.is_empty() {
            return true;
        }
        if filter == self.name {
            return true;
        }
        let rel = self.relative.to_string_lossy().replace('\\', "/");
        let rel_no_ext = rel
            .strip_suffix(".yaml")
            .or_else(|| rel.strip_suffix(".yml"))
            .unwrap_or(&rel);
        if rel == filter || rel_no_ext == filter {
            return true;
        }
        let filter_no_ext = filter
            .strip_suffix(".yaml")
            .or_else(|| filter.strip_suffix(".yml"))
            .unwrap_or(filter);
        if rel_no_ext.starts_with(filter_no_ext)
            && rel_no_ext[filter_no_ext.len()..]
                .chars()
                .next()
                .map(|c| c == '/')
                .unwrap_or(true)
        {
            return true;
        }
        self.relative
            .components()
            .filter_map(|c| c.as_os_str().to_str())
            .any(|segment| segment == filter || segment.trim_end_matches(".yaml").trim_end_matches(".yml") == filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_name_determinism() {
        assert_eq!(
            generate_stack_name("FRANK", "PROD", Path::new("APP.yaml")),
            "frank-prod-app"
        );
        assert_eq!(
            generate_stack_name("my_project", "dev_env", Path::new("app_name.yaml")),
            "my-project-dev-env-app-name"
        );
        assert_eq!(
            generate_stack_name("test", "staging", Path::new("/very/deep/nested/path/app.yaml")),
            "test-staging-app"
        );
    }

    #[test]
    fn base_app_extraction() {
        assert_eq!(base_app(Path::new(".app.yaml")), ".app");
        assert_eq!(base_app(Path::new("app.backup.yaml")), "app.backup");
        assert_eq!(base_app(Path::new("/path/to/")), "to");
        assert_eq!(base_app(Path::new("")), ".");
    }

    #[test]
    fn empty_project_code_yields_leading_hyphen() {
        assert_eq!(
            generate_stack_name("", "dev", Path::new("app.yaml")),
            "-dev-app"
        );
    }
}
