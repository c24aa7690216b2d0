//! Template implements the Template Renderer (§4.3): dialect selection by file extension,
//! rendering to a multi-document YAML byte stream, and the stable Template Context.

mod hcl;
mod jinja;

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::Value;

use crate::config::EffectiveConfig;
use crate::Result;

/// Dialect is the capability interface implemented by each template language variant. Dialect
/// objects are stateless; the context is passed in per call.
trait Dialect {
    fn render(&self, path: &Path, source: &str, ctx: &Value) -> Result<String>;
}

/// Is_template reports whether `path`'s extension selects a templating dialect rather than
/// plain YAML passthrough.
pub fn is_template(path: &Path) -> bool {
    matches!(
        extension(path).as_deref(),
        Some("jinja") | Some("j2") | Some("hcl") | Some("tf")
    )
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Render renders `path` (read from disk) against `ctx`, selecting a dialect by extension, and
/// returns the rendered multi-document YAML byte stream.
pub fn render(path: &Path, ctx: &Value) -> Result<Vec<u8>> {
    let source = std::fs::read_to_string(path)?;
    let rendered = match extension(path).as_deref() {
        Some("jinja") | Some("j2") => jinja::Jinja.render(path, &source, ctx)?,
        Some("hcl") | Some("tf") => hcl::Hcl.render(path, &source, ctx)?,
        _ => source,
    };
    Ok(canonicalize_documents(&rendered).into_bytes())
}

/// Canonicalize_documents splits the rendered text on `---` document separators and
/// re-emits each document in its original order, trimming incidental leading/trailing
/// whitespace introduced by template control blocks.
fn canonicalize_documents(rendered: &str) -> String {
    rendered
        .split("\n---")
        .map(|doc| doc.trim_matches('\n'))
        .collect::<Vec<_>>()
        .join("\n---\n")
}

/// Build_context constructs the Template Context mapping (§3): the built-in keys, followed by
/// every key from `vars`. Built-ins are inserted last so that a colliding `vars` key can never
/// shadow a built-in (the "built-ins win" resolution of the Open Question in §9).
pub fn build_context(
    stack_name: &str,
    context: &str,
    project_code: &str,
    namespace: Option<&str>,
    app: &str,
    app_name: &str,
    version: &str,
    vars: &BTreeMap<String, serde_yaml::Value>,
) -> Result<Value> {
    let mut map = serde_json::Map::new();
    for (k, v) in vars {
        let as_json: Value = serde_json::to_value(v)
            .map_err(|err| crate::Error::Other(anyhow::anyhow!("non-JSON-representable var `{k}`: {err}")))?;
        map.insert(k.clone(), as_json);
    }
    map.insert("stack_name".into(), Value::String(stack_name.into()));
    map.insert("context".into(), Value::String(context.into()));
    map.insert("project_code".into(), Value::String(project_code.into()));
    map.insert(
        "namespace".into(),
        namespace.map(|n| Value::String(n.into())).unwrap_or(Value::Null),
    );
    map.insert("app".into(), Value::String(app.into()));
    map.insert("app_name".into(), Value::String(app_name.into()));
    map.insert("version".into(), Value::String(version.into()));
    map.insert(
        "k8s_namespace".into(),
        Value::String(namespace.unwrap_or(crate::DEFAULT_NAMESPACE).into()),
    );
    Ok(Value::Object(map))
}

/// Context_for_stack is a convenience wrapper building the Template Context straight from an
/// Effective Config and a derived stack name/app_name pair.
pub fn context_for_stack(
    stack_name: &str,
    app_name: &str,
    cfg: &EffectiveConfig,
) -> Result<Value> {
    build_context(
        stack_name,
        cfg.context.as_deref().unwrap_or_default(),
        cfg.project_code.as_deref().unwrap_or_default(),
        cfg.namespace.as_deref(),
        cfg.app.as_deref().unwrap_or(app_name),
        app_name,
        cfg.version.as_deref().unwrap_or_default(),
        &cfg.vars,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_template_by_extension() {
        assert!(is_template(Path::new("app.jinja")));
        assert!(is_template(Path::new("app.J2")));
        assert!(is_template(Path::new("app.hcl")));
        assert!(is_template(Path::new("app.tf")));
        assert!(!is_template(Path::new("app.yaml")));
        assert!(!is_template(Path::new("app.yml")));
    }

    #[test]
    fn built_ins_win_over_colliding_vars() {
        let mut vars = BTreeMap::new();
        vars.insert("stack_name".to_string(), serde_yaml::Value::from("evil"));
        let ctx = build_context("real", "dev", "proj", None, "app", "app", "1.0", &vars).unwrap();
        assert_eq!(ctx["stack_name"], Value::String("real".into()));
    }
}
