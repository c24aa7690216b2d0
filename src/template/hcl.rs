//! Hcl implements the HCL-style dialect (`.hcl`, `.tf`): textual `${name}` substitution only,
//! with no expressions or control flow.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use super::Dialect;
use crate::Result;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}").unwrap());

pub struct Hcl;

impl Dialect for Hcl {
    fn render(&self, _path: &Path, source: &str, ctx: &Value) -> Result<String> {
        let obj = ctx.as_object();
        Ok(PLACEHOLDER
            .replace_all(source, |caps: &regex::Captures| {
                let name = &caps[1];
                obj.and_then(|m| m.get(name))
                    .map(scalar_to_string)
                    .unwrap_or_default()
            })
            .into_owned())
    }
}

fn scalar_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn substitutes_known_placeholders_and_blanks_unknown() {
        let ctx = json!({"context": "prod", "replicas": 3});
        let out = Hcl
            .render(
                Path::new("x.hcl"),
                "context = \"${context}\"\nreplicas = ${replicas}\nmissing = \"${nope}\"\n",
                &ctx,
            )
            .unwrap();
        assert_eq!(
            out,
            "context = \"prod\"\nreplicas = 3\nmissing = \"\"\n"
        );
    }
}
