use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::OnceLock;

use crate::error::{PromptError, Result};
use crate::models::PromptType;

/// Variables a template is rendered against
pub type TemplateVariables = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableType {
    String,
    Number,
    Boolean,
    Array,
    Object,
}

impl VariableType {
    /// Whether a JSON value has this kind
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            VariableType::String => value.is_string(),
            VariableType::Number => value.is_number(),
            VariableType::Boolean => value.is_boolean(),
            VariableType::Array => value.is_array(),
            VariableType::Object => value.is_object(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateVariable {
    pub name: String,
    #[serde(rename = "type")]
    pub var_type: VariableType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl TemplateVariable {
    pub fn required(name: &str, var_type: VariableType) -> Self {
        Self {
            name: name.to_string(),
            var_type,
            required: true,
            description: None,
        }
    }

    pub fn optional(name: &str, var_type: VariableType) -> Self {
        Self {
            name: name.to_string(),
            var_type,
            required: false,
            description: None,
        }
    }
}

/// A named prompt template. Stored templates are immutable; updates replace
/// the whole template.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptTemplate {
    pub id: String,
    pub name: String,
    pub body: String,
    #[serde(default)]
    pub variables: Vec<TemplateVariable>,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_type: Option<PromptType>,
}

impl PromptTemplate {
    /// Parse a template document. Unknown variable kinds are rejected here.
    pub fn from_json(document: &str) -> Result<Self> {
        serde_json::from_str(document)
            .map_err(|e| PromptError::template_invalid(format!("Malformed template: {}", e)))
    }

    pub fn variable(&self, name: &str) -> Option<&TemplateVariable> {
        self.variables.iter().find(|v| v.name == name)
    }
}

fn block_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?s)\{\{#if\s+([\w.]+)\s*\}\}(.*?)\{\{/if\}\}|\{\{#each\s+([\w.]+)\s*\}\}(.*?)\{\{/each\}\}|\{\{\s*([\w.]+)\s*\}\}",
        )
        .expect("template pattern is valid")
    })
}

/// Variable lookup scope; `this` is set while inside an `#each` block
#[derive(Clone, Copy)]
struct Scope<'a> {
    vars: &'a TemplateVariables,
    this: Option<&'a Value>,
}

impl<'a> Scope<'a> {
    fn lookup(&self, path: &str) -> Option<&'a Value> {
        let mut segments = path.split('.');
        let root = segments.next()?;

        let mut current = if root == "this" {
            self.this?
        } else {
            match self.this.and_then(|t| t.as_object()).and_then(|o| o.get(root)) {
                Some(field) => field,
                None => self.vars.get(root)?,
            }
        };

        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }
}

/// Renders `{{var}}`, `{{#if var}}…{{/if}}` and `{{#each list}}…{{/each}}`
/// templates. Rendering never fails: unresolved variables stay in the output
/// as literal `{{name}}` tokens.
#[derive(Debug, Clone, Default)]
pub struct TemplateEngine;

impl TemplateEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn render(&self, body: &str, variables: &TemplateVariables) -> String {
        render_scoped(
            body,
            Scope {
                vars: variables,
                this: None,
            },
        )
    }

    pub fn render_template(&self, template: &PromptTemplate, variables: &TemplateVariables) -> String {
        self.render(&template.body, variables)
    }

    /// Required variables that are absent from `variables`
    pub fn missing_required(
        &self,
        template: &PromptTemplate,
        variables: &TemplateVariables,
    ) -> Vec<String> {
        template
            .variables
            .iter()
            .filter(|v| v.required && !variables.contains_key(&v.name))
            .map(|v| v.name.clone())
            .collect()
    }

    /// Root names referenced by the body. Names inside `#each` bodies bind to
    /// the iterated element and are not listed.
    pub fn placeholders(&self, body: &str) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        collect_placeholders(body, &mut names);
        names
    }

    pub fn validate(&self, template: &PromptTemplate) -> Result<()> {
        if template.id.trim().is_empty() {
            return Err(PromptError::template_invalid("Template id must not be empty"));
        }
        if template.name.trim().is_empty() {
            return Err(PromptError::template_invalid(format!(
                "Template {} must have a name",
                template.id
            )));
        }
        if template.body.trim().is_empty() {
            return Err(PromptError::template_invalid(format!(
                "Template {} must have a body",
                template.id
            )));
        }

        let mut declared = BTreeSet::new();
        for variable in &template.variables {
            if variable.name.trim().is_empty() {
                return Err(PromptError::template_invalid(format!(
                    "Template {} declares a variable without a name",
                    template.id
                )));
            }
            if !declared.insert(variable.name.as_str()) {
                return Err(PromptError::template_invalid(format!(
                    "Template {} declares variable {} more than once",
                    template.id, variable.name
                )));
            }
        }

        let undeclared: Vec<String> = self
            .placeholders(&template.body)
            .into_iter()
            .filter(|name| !declared.contains(name.as_str()))
            .collect();

        if !undeclared.is_empty() {
            return Err(PromptError::template_invalid(format!(
                "Template {} uses undeclared variables: {}",
                template.id,
                undeclared.join(", ")
            )));
        }

        Ok(())
    }
}

fn render_scoped(body: &str, scope: Scope<'_>) -> String {
    block_pattern()
        .replace_all(body, |caps: &Captures| {
            if let (Some(name), Some(inner)) = (caps.get(1), caps.get(2)) {
                return match scope.lookup(name.as_str()) {
                    Some(value) if is_truthy(value) => render_scoped(inner.as_str(), scope),
                    _ => String::new(),
                };
            }

            if let (Some(name), Some(inner)) = (caps.get(3), caps.get(4)) {
                let Some(Value::Array(items)) = scope.lookup(name.as_str()) else {
                    return String::new();
                };
                return items
                    .iter()
                    .map(|item| {
                        render_scoped(
                            inner.as_str(),
                            Scope {
                                vars: scope.vars,
                                this: Some(item),
                            },
                        )
                    })
                    .collect();
            }

            let whole = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
            caps.get(5)
                .and_then(|name| scope.lookup(name.as_str()))
                .map(display_value)
                .unwrap_or_else(|| whole.to_string())
        })
        .into_owned()
}

fn collect_placeholders(body: &str, names: &mut BTreeSet<String>) {
    for caps in block_pattern().captures_iter(body) {
        if let (Some(name), Some(inner)) = (caps.get(1), caps.get(2)) {
            insert_root(name.as_str(), names);
            collect_placeholders(inner.as_str(), names);
        } else if let Some(name) = caps.get(3) {
            insert_root(name.as_str(), names);
        } else if let Some(name) = caps.get(5) {
            insert_root(name.as_str(), names);
        }
    }
}

fn insert_root(path: &str, names: &mut BTreeSet<String>) {
    let root = path.split('.').next().unwrap_or(path);
    if root != "this" && !root.is_empty() {
        names.insert(root.to_string());
    }
}

pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(_) => true,
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .map(display_value)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(_) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PromptErrorKind;
    use serde_json::json;

    fn vars(value: Value) -> TemplateVariables {
        value.as_object().cloned().unwrap_or_default()
    }

    fn template(body: &str, variables: Vec<TemplateVariable>) -> PromptTemplate {
        PromptTemplate {
            id: "greeting".to_string(),
            name: "Greeting".to_string(),
            body: body.to_string(),
            variables,
            version: "1.0.0".to_string(),
            prompt_type: None,
        }
    }

    #[test]
    fn test_variable_substitution() {
        let engine = TemplateEngine::new();
        assert_eq!(
            engine.render("Hello {{name}}!", &vars(json!({ "name": "Alice" }))),
            "Hello Alice!"
        );
    }

    #[test]
    fn test_unresolved_variable_left_verbatim() {
        let engine = TemplateEngine::new();
        assert_eq!(engine.render("Hello {{name}}!", &vars(json!({}))), "Hello {{name}}!");
    }

    #[test]
    fn test_if_block() {
        let engine = TemplateEngine::new();
        let body = "{{#if x}}Y{{/if}}";
        assert_eq!(engine.render(body, &vars(json!({ "x": true }))), "Y");
        assert_eq!(engine.render(body, &vars(json!({ "x": false }))), "");
        assert_eq!(engine.render(body, &vars(json!({}))), "");
    }

    #[test]
    fn test_each_block_with_primitives() {
        let engine = TemplateEngine::new();
        assert_eq!(
            engine.render(
                "{{#each items}}{{this}}, {{/each}}",
                &vars(json!({ "items": ["a", "b"] }))
            ),
            "a, b, "
        );
    }

    #[test]
    fn test_each_block_with_objects() {
        let engine = TemplateEngine::new();
        let rendered = engine.render(
            "{{#each steps}}[{{index}}] {{content}} ({{session}})\n{{/each}}",
            &vars(json!({
                "session": "s1",
                "steps": [
                    { "index": 1, "content": "Open page" },
                    { "index": 2, "content": "Click login" }
                ]
            })),
        );
        assert_eq!(rendered, "[1] Open page (s1)\n[2] Click login (s1)\n");
    }

    #[test]
    fn test_each_over_missing_list_renders_nothing() {
        let engine = TemplateEngine::new();
        assert_eq!(
            engine.render("a{{#each items}}x{{/each}}b", &vars(json!({}))),
            "ab"
        );
    }

    #[test]
    fn test_dotted_paths_and_coercion() {
        let engine = TemplateEngine::new();
        let rendered = engine.render(
            "Step {{step.index}} of {{step.total}}: done={{done}} tags={{tags}} none={{none}}",
            &vars(json!({
                "step": { "index": 2, "total": 5 },
                "done": false,
                "tags": ["x", "y"],
                "none": null
            })),
        );
        assert_eq!(rendered, "Step 2 of 5: done=false tags=x, y none=");
    }

    #[test]
    fn test_substituted_values_are_not_rescanned() {
        let engine = TemplateEngine::new();
        assert_eq!(
            engine.render("{{a}}", &vars(json!({ "a": "{{b}}", "b": "nope" }))),
            "{{b}}"
        );
    }

    #[test]
    fn test_placeholders_skip_each_body_fields() {
        let engine = TemplateEngine::new();
        let names = engine.placeholders(
            "{{title}} {{#if show}}{{detail.text}}{{/if}} {{#each rows}}{{cell}}{{this}}{{/each}}",
        );
        let names: Vec<_> = names.into_iter().collect();
        assert_eq!(names, vec!["detail", "rows", "show", "title"]);
    }

    #[test]
    fn test_validate_accepts_declared_variables() {
        let engine = TemplateEngine::new();
        let t = template(
            "Hello {{name}}{{#if excited}}!{{/if}}",
            vec![
                TemplateVariable::required("name", VariableType::String),
                TemplateVariable::optional("excited", VariableType::Boolean),
            ],
        );
        engine.validate(&t).unwrap();
    }

    #[test]
    fn test_validate_rejects_undeclared_placeholder() {
        let engine = TemplateEngine::new();
        let t = template("Hello {{name}} from {{city}}", vec![
            TemplateVariable::required("name", VariableType::String),
        ]);
        let err = engine.validate(&t).unwrap_err();
        assert_eq!(err.kind(), PromptErrorKind::TemplateInvalid);
        assert!(err.message().contains("city"));
    }

    #[test]
    fn test_validate_rejects_empty_fields() {
        let engine = TemplateEngine::new();
        let mut t = template("Hi", vec![]);
        t.name = String::new();
        assert_eq!(
            engine.validate(&t).unwrap_err().kind(),
            PromptErrorKind::TemplateInvalid
        );

        let t = template("   ", vec![]);
        assert!(engine.validate(&t).is_err());
    }

    #[test]
    fn test_unknown_variable_kind_rejected_on_parse() {
        let err = PromptTemplate::from_json(
            r#"{"id":"t","name":"T","body":"{{x}}","version":"1","variables":[{"name":"x","type":"date"}]}"#,
        )
        .unwrap_err();
        assert_eq!(err.kind(), PromptErrorKind::TemplateInvalid);
    }

    #[test]
    fn test_missing_required() {
        let engine = TemplateEngine::new();
        let t = template(
            "{{a}} {{b}}",
            vec![
                TemplateVariable::required("a", VariableType::String),
                TemplateVariable::optional("b", VariableType::String),
            ],
        );
        assert_eq!(engine.missing_required(&t, &vars(json!({}))), vec!["a"]);
    }
}
