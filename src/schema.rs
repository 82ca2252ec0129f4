use serde_json::{Map, Value, json};

use crate::inputs::InputValue;

/// Semantic type of one model input field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputKind {
    Str,
    Int,
    Float,
    Bool,
    Path,
}

impl InputKind {
    /// Returns the schema's own type name, as rendered in the help document.
    pub fn as_str(&self) -> &'static str {
        match self {
            InputKind::Str => "str",
            InputKind::Int => "int",
            InputKind::Float => "float",
            InputKind::Bool => "bool",
            InputKind::Path => "Path",
        }
    }
}

/// Declarative descriptor of one model input field.
///
/// `default: None` means "no default declared" and makes the field required;
/// it is distinct from any real default, including `Some(InputValue::Str(""))`.
#[derive(Clone, Debug)]
pub struct FieldSpec {
    pub name: String,
    pub kind: InputKind,
    pub help: Option<String>,
    pub default: Option<InputValue>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub options: Option<Vec<InputValue>>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, kind: InputKind) -> Self {
        Self {
            name: name.into(),
            kind,
            help: None,
            default: None,
            min: None,
            max: None,
            options: None,
        }
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn with_default(mut self, default: InputValue) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn with_max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    pub fn with_options(mut self, options: Vec<InputValue>) -> Self {
        self.options = Some(options);
        self
    }
}

/// The input schema a model declares, chosen once at engine construction.
///
/// `Absent` means raw inputs pass through to the model unvalidated.
#[derive(Clone, Debug, Default)]
pub enum Schema {
    #[default]
    Absent,
    Declared(Vec<FieldSpec>),
}

impl Schema {
    /// Serializes the schema into the help document, `{"arguments": {...}}`.
    ///
    /// Fields appear in declaration order. Optional keys (`help`, `default`,
    /// `min`, `max`, `options`) are present only when the spec declares them;
    /// an undeclared default is omitted entirely, never rendered as null.
    pub fn help_document(&self) -> Value {
        let mut args = Map::new();
        if let Schema::Declared(fields) = self {
            for field in fields {
                let mut doc = Map::new();
                doc.insert("type".to_string(), json!(field.kind.as_str()));
                if let Some(help) = &field.help {
                    doc.insert("help".to_string(), json!(help));
                }
                if let Some(default) = &field.default {
                    doc.insert("default".to_string(), json!(default.to_string()));
                }
                if let Some(min) = field.min {
                    doc.insert("min".to_string(), json!(min.to_string()));
                }
                if let Some(max) = field.max {
                    doc.insert("max".to_string(), json!(max.to_string()));
                }
                if let Some(options) = &field.options {
                    let rendered: Vec<Value> =
                        options.iter().map(|o| json!(o.to_string())).collect();
                    doc.insert("options".to_string(), Value::Array(rendered));
                }
                args.insert(field.name.clone(), Value::Object(doc));
            }
        }
        json!({ "arguments": args })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_schema_has_empty_arguments() {
        assert_eq!(Schema::Absent.help_document(), json!({ "arguments": {} }));
    }

    #[test]
    fn declared_field_renders_all_keys() {
        let schema = Schema::Declared(vec![
            FieldSpec::new("count", InputKind::Int)
                .with_help("how many")
                .with_default(InputValue::Int(3))
                .with_min(1.0)
                .with_max(10.0),
            FieldSpec::new("mode", InputKind::Str).with_options(vec![
                InputValue::Str("fast".to_string()),
                InputValue::Str("slow".to_string()),
            ]),
        ]);
        let doc = schema.help_document();
        assert_eq!(
            doc["arguments"]["count"],
            json!({
                "type": "int",
                "help": "how many",
                "default": "3",
                "min": "1",
                "max": "10",
            })
        );
        assert_eq!(
            doc["arguments"]["mode"],
            json!({ "type": "str", "options": ["fast", "slow"] })
        );
    }

    #[test]
    fn undeclared_default_is_omitted() {
        let schema = Schema::Declared(vec![FieldSpec::new("text", InputKind::Str)]);
        let doc = schema.help_document();
        let field = doc["arguments"]["text"].as_object().unwrap();
        assert!(!field.contains_key("default"));
    }

    #[test]
    fn empty_string_default_is_rendered() {
        let schema = Schema::Declared(vec![
            FieldSpec::new("suffix", InputKind::Str)
                .with_default(InputValue::Str(String::new())),
        ]);
        let doc = schema.help_document();
        assert_eq!(doc["arguments"]["suffix"]["default"], json!(""));
    }

    #[test]
    fn fields_keep_declaration_order() {
        let schema = Schema::Declared(vec![
            FieldSpec::new("zulu", InputKind::Str),
            FieldSpec::new("alpha", InputKind::Str),
        ]);
        let doc = schema.help_document();
        let keys: Vec<&String> = doc["arguments"].as_object().unwrap().keys().collect();
        assert_eq!(keys, ["zulu", "alpha"]);
    }
}
