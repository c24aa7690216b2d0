//! Prepare implements the steps shared by the Reconciler and the Planner (§4.5 steps 1-5,
//! §4.6): resolve the Template Context, render the manifest, decode it into objects, check for
//! a namespace conflict (I4), and inject the ownership annotation (I3).

use std::path::Path;

use kube::api::DynamicObject;

use crate::config;
use crate::stack::Stack;
use crate::template;
use crate::{Error, Result, ANNOTATION_STACK_NAME, LABEL_MANAGED_BY};

/// Prepared is the fully rendered, annotated, conflict-checked set of objects for one stack,
/// ready to be reconciled or diffed.
pub struct Prepared {
    /// Objects are the rendered, annotated top-level Kubernetes objects, in document order.
    pub objects: Vec<DynamicObject>,
    /// App_name is the filename-derived app name used in the stack's Template Context.
    pub app_name: String,
}

/// Prepare renders `stack`'s manifest (from `manifests_dir`) against its Template Context,
/// decodes the resulting multi-document YAML, checks each document's namespace against the
/// config-declared one (I4), and injects the stack-name annotation (I3) on every top-level
/// object.
pub fn prepare(stack: &Stack, manifests_dir: &Path) -> Result<Prepared> {
    let manifest_name = stack
        .config
        .manifest
        .as_deref()
        .ok_or(Error::ConfigMissingRequired("manifest"))?;
    let manifest_path = manifests_dir.join(manifest_name);

    let app_name = crate::stack::base_app(&stack.path);
    let ctx = template::context_for_stack(&stack.name, &app_name, &stack.config)?;
    let rendered = template::render(&manifest_path, &ctx)?;
    let rendered = String::from_utf8(rendered)
        .map_err(|err| Error::Other(anyhow::anyhow!("rendered manifest is not valid UTF-8: {err}")))?;

    let mut objects = Vec::new();
    for (index, doc) in rendered.split("\n---\n").enumerate() {
        let doc = doc.trim();
        if doc.is_empty() || doc.lines().all(|l| l.trim().is_empty() || l.trim_start().starts_with('#')) {
            continue;
        }
        let mut obj: DynamicObject =
            serde_yaml::from_str(doc).map_err(|source| Error::ManifestDecodeError { index, source })?;

        check_namespace_conflict(&stack.config, &obj)?;
        annotate(&mut obj, &stack.name);
        objects.push(obj);
    }

    Ok(Prepared { objects, app_name })
}

fn check_namespace_conflict(cfg: &config::EffectiveConfig, obj: &DynamicObject) -> Result<()> {
    let (Some(cfg_ns), Some(manifest_ns)) = (cfg.namespace.as_deref(), obj.metadata.namespace.as_deref()) else {
        return Ok(());
    };
    if cfg_ns != manifest_ns {
        let name = obj.metadata.name.clone().unwrap_or_default();
        let kind = obj
            .types
            .as_ref()
            .map(|t| t.kind.clone())
            .unwrap_or_else(|| "Object".to_string());
        return Err(Error::NamespaceConflict {
            object: format!("{kind}/{name}"),
            config: cfg_ns.to_string(),
            manifest: manifest_ns.to_string(),
        });
    }
    Ok(())
}

fn annotate(obj: &mut DynamicObject, stack_name: &str) {
    let annotations = obj.metadata.annotations.get_or_insert_with(Default::default);
    annotations.insert(ANNOTATION_STACK_NAME.to_string(), stack_name.to_string());

    let labels = obj.metadata.labels.get_or_insert_with(Default::default);
    labels
        .entry("app.kubernetes.io/managed-by".to_string())
        .or_insert_with(|| LABEL_MANAGED_BY.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::Stack;
    use std::fs;
    use std::path::PathBuf;

    fn make_stack_named(
        tmp: &std::path::Path,
        config_name: &str,
        cfg_yaml: &str,
        manifest_name: &str,
        manifest_body: &str,
    ) -> Stack {
        let config_dir = tmp.join("config");
        let manifests_dir = tmp.join("manifests");
        fs::create_dir_all(&config_dir).unwrap();
        fs::create_dir_all(&manifests_dir).unwrap();
        fs::write(config_dir.join(config_name), cfg_yaml).unwrap();
        fs::write(manifests_dir.join(manifest_name), manifest_body).unwrap();

        let cfg: config::ConfigNode = serde_yaml::from_str(cfg_yaml).unwrap();
        let path = config_dir.join(config_name);
        Stack {
            name: crate::stack::generate_stack_name(
                cfg.project_code.as_deref().unwrap_or_default(),
                cfg.context.as_deref().unwrap_or_default(),
                &path,
            ),
            relative: PathBuf::from(config_name),
            path,
            config: cfg,
        }
    }

    fn make_stack(tmp: &std::path::Path, cfg_yaml: &str, manifest_name: &str, manifest_body: &str) -> Stack {
        make_stack_named(tmp, "app.yaml", cfg_yaml, manifest_name, manifest_body)
    }

    #[test]
    fn injects_annotation_and_decodes_objects() {
        let tmp = tempfile::tempdir().unwrap();
        let stack = make_stack(
            tmp.path(),
            "project_code: myapp\ncontext: dev\nmanifest: app.yaml\n",
            "app.yaml",
            "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: web\nspec:\n  replicas: 3\n",
        );
        let prepared = prepare(&stack, &tmp.path().join("manifests")).unwrap();
        assert_eq!(prepared.objects.len(), 1);
        let annotations = prepared.objects[0].metadata.annotations.as_ref().unwrap();
        assert_eq!(
            annotations.get(ANNOTATION_STACK_NAME).unwrap(),
            "myapp-dev-app"
        );
    }

    #[test]
    fn namespace_conflict_is_rejected_before_any_mutation() {
        let tmp = tempfile::tempdir().unwrap();
        let stack = make_stack(
            tmp.path(),
            "project_code: myapp\ncontext: dev\nnamespace: a\nmanifest: app.yaml\n",
            "app.yaml",
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: x\n  namespace: b\n",
        );
        let err = prepare(&stack, &tmp.path().join("manifests")).unwrap_err();
        assert!(matches!(err, Error::NamespaceConflict { .. }));
    }

    #[test]
    fn stack_name_rendered_into_template() {
        let tmp = tempfile::tempdir().unwrap();
        let stack = make_stack_named(
            tmp.path(),
            "web.yaml",
            "context: dev\nproject_code: myapp\nmanifest: web.jinja\napp: web\nversion: 1.2.3\n",
            "web.jinja",
            "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: {{ stack_name }}\n",
        );
        let prepared = prepare(&stack, &tmp.path().join("manifests")).unwrap();
        assert_eq!(
            prepared.objects[0].metadata.name.as_deref(),
            Some("myapp-dev-web")
        );
    }
}
