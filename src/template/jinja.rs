//! Jinja implements the Jinja-style dialect (`.jinja`, `.j2`): `{{ expr }}` substitution,
//! `{% if %}/{% else %}/{% endif %}`, `{% for %}/{% endfor %}`, and filters including
//! `default(v)`, backed by `minijinja`.

use std::path::Path;

use minijinja::{Environment, UndefinedBehavior};
use serde_json::Value;

use super::Dialect;
use crate::{Error, Result};

pub struct Jinja;

impl Dialect for Jinja {
    fn render(&self, path: &Path, source: &str, ctx: &Value) -> Result<String> {
        let mut env = Environment::new();
        // Undefined variables in a raw `{{ x }}` render empty, and a conditional on an
        // absent/false-y variable takes the `else` branch: Chainable `Undefined` gives both
        // for free (renders "", is falsy in `if`).
        env.set_undefined_behavior(UndefinedBehavior::Chainable);
        env.add_template("stack", source)
            .map_err(|err| Error::TemplateParseError {
                path: path.display().to_string(),
                message: err.to_string(),
            })?;
        let tmpl = env.get_template("stack").expect("just added");
        tmpl.render(ctx).map_err(|err| Error::TemplateExecError {
            path: path.display().to_string(),
            message: err.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn conditional_branches_on_context() {
        let src = "replicas: {% if context == \"prod\" %}5{% else %}2{% endif %}";
        let out = Jinja
            .render(Path::new("x.jinja"), src, &json!({"context": "dev"}))
            .unwrap();
        assert_eq!(out, "replicas: 2");
        let out = Jinja
            .render(Path::new("x.jinja"), src, &json!({"context": "prod"}))
            .unwrap();
        assert_eq!(out, "replicas: 5");
    }

    #[test]
    fn undefined_variable_renders_empty() {
        let out = Jinja
            .render(Path::new("x.jinja"), "name: {{ missing }}", &json!({}))
            .unwrap();
        assert_eq!(out, "name: ");
    }

    #[test]
    fn default_filter() {
        let out = Jinja
            .render(
                Path::new("x.jinja"),
                "name: {{ missing | default(\"fallback\") }}",
                &json!({}),
            )
            .unwrap();
        assert_eq!(out, "name: fallback");
    }

    #[test]
    fn for_loop() {
        let out = Jinja
            .render(
                Path::new("x.jinja"),
                "{% for x in items %}{{ x }},{% endfor %}",
                &json!({"items": [1, 2, 3]}),
            )
            .unwrap();
        assert_eq!(out, "1,2,3,");
    }
}
