//! Config implements the Config Resolver: walking the `config/` tree, parsing `config.yaml`
//! ancestors and stack files, and merging them into an Effective Config.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use tracing::instrument;

use crate::{Error, Result};

/// ConfigNode is the recognised-field shape of a single YAML document under `config/`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ConfigNode {
    /// Context is the Kubernetes context name.
    #[serde(default)]
    pub context: Option<String>,
    /// Project_code identifies the project; required at the root of the tree.
    #[serde(default)]
    pub project_code: Option<String>,
    /// Namespace is the Kubernetes namespace to deploy into.
    #[serde(default)]
    pub namespace: Option<String>,
    /// App is a display name for templates; does not affect the derived stack name.
    #[serde(default)]
    pub app: Option<String>,
    /// Version is an arbitrary version string exposed to templates.
    #[serde(default)]
    pub version: Option<String>,
    /// Timeout is a duration string (e.g. "5m") bounding one stack's reconciliation.
    #[serde(default)]
    pub timeout: Option<String>,
    /// Manifest is the template filename, relative to `manifests/`. Required on stack files,
    /// forbidden on `config.yaml`.
    #[serde(default)]
    pub manifest: Option<String>,
    /// Vars is an arbitrary mapping of scalars/structures injected into the template context.
    #[serde(default)]
    pub vars: BTreeMap<String, Value>,

    /// Unknown collects and discards any other field present in the document; recognised
    /// fields above always take precedence because serde matches named fields first.
    #[serde(flatten)]
    pub unknown: BTreeMap<String, Value>,
}

impl ConfigNode {
    /// Parse decodes a `ConfigNode` from YAML text, tolerating unknown fields.
    fn parse(path: &Path, text: &str) -> Result<ConfigNode> {
        serde_yaml::from_str(text).map_err(|source| Error::ConfigParseError {
            path: path.display().to_string(),
            source,
        })
    }

    /// Merge applies child-over-parent precedence: a present child scalar overrides the
    /// parent's; `vars` merges key-wise with child precedence; an absent child field inherits
    /// the parent's value untouched.
    fn merge(self, child: ConfigNode) -> ConfigNode {
        let mut vars = self.vars;
        for (k, v) in child.vars {
            vars.insert(k, v);
        }
        ConfigNode {
            context: child.context.or(self.context),
            project_code: child.project_code.or(self.project_code),
            namespace: child.namespace.or(self.namespace),
            app: child.app.or(self.app),
            version: child.version.or(self.version),
            timeout: child.timeout.or(self.timeout),
            manifest: child.manifest.or(self.manifest),
            vars,
            unknown: BTreeMap::new(),
        }
    }
}

/// EffectiveConfig is the result of merging every `config.yaml` along the path from the
/// `config/` root down to and including a stack file.
pub type EffectiveConfig = ConfigNode;

/// Resolve walks the ordered chain of `config.yaml` ancestors (any missing one is skipped
/// without error) and merges the target file in last, with child-over-parent precedence.
/// `root` is the `config/` directory; `target` is the absolute path of the stack (or
/// `config.yaml`) file to resolve.
#[instrument(skip_all, fields(target = %target.display()))]
pub fn resolve(root: &Path, target: &Path) -> Result<EffectiveConfig> {
    if !target.is_file() {
        return Err(Error::ConfigNotFound(target.display().to_string()));
    }

    let rel = target.strip_prefix(root).map_err(|_| {
        Error::Other(anyhow::anyhow!(
            "{} is not inside {}",
            target.display(),
            root.display()
        ))
    })?;

    let mut merged = ConfigNode::default();
    let mut dir = root.to_path_buf();
    merged = merge_ancestor(merged, &dir.join("config.yaml"))?;
    for component in rel.parent().into_iter().flat_map(|p| p.components()) {
        dir.push(component.as_os_str());
        merged = merge_ancestor(merged, &dir.join("config.yaml"))?;
    }

    let text = std::fs::read_to_string(target)?;
    let node = ConfigNode::parse(target, &text)?;
    merged = merged.merge(node);

    if merged.project_code.as_deref().unwrap_or("").is_empty() {
        return Err(Error::ConfigMissingRequired("project_code"));
    }

    Ok(merged)
}

fn merge_ancestor(merged: ConfigNode, candidate: &Path) -> Result<ConfigNode> {
    if !candidate.is_file() {
        return Ok(merged);
    }
    let text = std::fs::read_to_string(candidate)?;
    let node = ConfigNode::parse(candidate, &text)?;
    Ok(merged.merge(node))
}

/// Timeout parses the effective config's `timeout` field, defaulting to
/// [`crate::DEFAULT_TIMEOUT`] when absent.
pub fn timeout(cfg: &EffectiveConfig) -> Result<std::time::Duration> {
    match &cfg.timeout {
        None => Ok(crate::DEFAULT_TIMEOUT),
        Some(s) => humantime::parse_duration(s)
            .map_err(|err| Error::Other(anyhow::anyhow!("invalid timeout `{s}`: {err}"))),
    }
}

/// K8s_namespace returns the effective config's namespace, or `"default"` when unset.
pub fn k8s_namespace(cfg: &EffectiveConfig) -> String {
    cfg.namespace
        .clone()
        .unwrap_or_else(|| crate::DEFAULT_NAMESPACE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn merges_chain_with_child_precedence() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("config");
        write(
            &root.join("config.yaml"),
            "context: base\nproject_code: test\nnamespace: default\n",
        );
        write(
            &root.join("svc").join("config.yaml"),
            "context: dev\nnamespace: dev-ns\n",
        );
        let stack = root.join("svc").join("api.yaml");
        write(&stack, "app: api\nversion: 3.0.0\nmanifest: api.yaml\n");

        let eff = resolve(&root, &stack).unwrap();
        assert_eq!(eff.context.as_deref(), Some("dev"));
        assert_eq!(eff.project_code.as_deref(), Some("test"));
        assert_eq!(eff.namespace.as_deref(), Some("dev-ns"));
        assert_eq!(eff.app.as_deref(), Some("api"));
        assert_eq!(eff.version.as_deref(), Some("3.0.0"));
    }

    #[test]
    fn missing_project_code_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("config");
        write(&root.join("config.yaml"), "context: base\n");
        let stack = root.join("app.yaml");
        write(&stack, "manifest: app.yaml\n");

        let err = resolve(&root, &stack).unwrap_err();
        assert!(matches!(err, Error::ConfigMissingRequired("project_code")));
    }

    #[test]
    fn missing_intermediate_config_yaml_is_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("config");
        write(
            &root.join("config.yaml"),
            "context: base\nproject_code: test\n",
        );
        let stack = root.join("a").join("b").join("app.yaml");
        write(&stack, "manifest: app.yaml\n");

        let eff = resolve(&root, &stack).unwrap();
        assert_eq!(eff.project_code.as_deref(), Some("test"));
        assert_eq!(eff.context.as_deref(), Some("base"));
    }

    #[test]
    fn vars_merge_key_wise_with_child_precedence() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("config");
        write(
            &root.join("config.yaml"),
            "project_code: test\ncontext: base\nvars:\n  a: 1\n  b: parent\n",
        );
        let stack = root.join("app.yaml");
        write(&stack, "manifest: app.yaml\nvars:\n  b: child\n  c: 3\n");

        let eff = resolve(&root, &stack).unwrap();
        assert_eq!(eff.vars.get("a").unwrap(), &Value::from(1));
        assert_eq!(eff.vars.get("b").unwrap(), &Value::from("child"));
        assert_eq!(eff.vars.get("c").unwrap(), &Value::from(3));
    }
}
