//! Declarative tool parameter schemas.
//!
//! A schema serves two purposes: it is rendered as JSON Schema for the
//! provider, and it validates and normalizes the raw argument payload the
//! model sends back before a tool ever sees it.

use serde_json::{Map, Value, json};

#[derive(Debug, Clone, PartialEq)]
pub enum ParamKind {
    String,
    Integer { min: Option<i64>, max: Option<i64> },
    Boolean,
    Enum(Vec<String>),
}

impl ParamKind {
    fn json_type(&self) -> &'static str {
        match self {
            Self::String | Self::Enum(_) => "string",
            Self::Integer { .. } => "integer",
            Self::Boolean => "boolean",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    pub description: String,
    pub required: bool,
    pub default: Option<Value>,
}

impl ParamSpec {
    fn new(name: impl Into<String>, kind: ParamKind, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            description: description.into(),
            required: false,
            default: None,
        }
    }

    pub fn string(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, ParamKind::String, description)
    }

    pub fn integer(
        name: impl Into<String>,
        description: impl Into<String>,
        min: Option<i64>,
        max: Option<i64>,
    ) -> Self {
        Self::new(name, ParamKind::Integer { min, max }, description)
    }

    pub fn boolean(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Boolean, description)
    }

    pub fn one_of(
        name: impl Into<String>,
        description: impl Into<String>,
        values: &[&str],
    ) -> Self {
        let values = values.iter().map(|v| v.to_string()).collect();
        Self::new(name, ParamKind::Enum(values), description)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    fn to_json_schema(&self) -> Value {
        let mut property = Map::new();
        property.insert("type".into(), json!(self.kind.json_type()));
        property.insert("description".into(), json!(self.description));

        match &self.kind {
            ParamKind::Enum(values) => {
                property.insert("enum".into(), json!(values));
            }
            ParamKind::Integer { min, max } => {
                if let Some(min) = min {
                    property.insert("minimum".into(), json!(min));
                }
                if let Some(max) = max {
                    property.insert("maximum".into(), json!(max));
                }
            }
            ParamKind::String | ParamKind::Boolean => {}
        }

        if let Some(default) = &self.default {
            property.insert("default".into(), default.clone());
        }

        Value::Object(property)
    }

    fn coerce(&self, value: Value) -> Result<Value, String> {
        match &self.kind {
            ParamKind::String => match value {
                Value::String(_) => Ok(value),
                Value::Number(n) => Ok(json!(n.to_string())),
                Value::Bool(b) => Ok(json!(b.to_string())),
                _ => Err("must be a string".to_string()),
            },
            ParamKind::Integer { min, max } => {
                let n = match &value {
                    Value::Number(n) => n
                        .as_i64()
                        .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
                    Value::String(s) => s.trim().parse::<i64>().ok(),
                    _ => None,
                }
                .ok_or_else(|| "must be an integer".to_string())?;

                let below = min.is_some_and(|min| n < min);
                let above = max.is_some_and(|max| n > max);
                if below || above {
                    return Err(match (min, max) {
                        (Some(min), Some(max)) => format!("must be between {min} and {max}"),
                        (Some(min), None) => format!("must be at least {min}"),
                        (None, Some(max)) => format!("must be at most {max}"),
                        (None, None) => unreachable!(),
                    });
                }
                Ok(json!(n))
            }
            ParamKind::Boolean => match &value {
                Value::Bool(_) => Ok(value),
                Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(json!(true)),
                Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(json!(false)),
                _ => Err("must be a boolean".to_string()),
            },
            ParamKind::Enum(values) => match &value {
                Value::String(s) if values.iter().any(|v| v == s) => Ok(value),
                _ => Err(format!("must be one of: {}", values.join(", "))),
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArgumentSchema {
    pub params: Vec<ParamSpec>,
}

impl ArgumentSchema {
    pub fn new(params: Vec<ParamSpec>) -> Self {
        Self { params }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn to_json_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .params
            .iter()
            .map(|p| (p.name.clone(), p.to_json_schema()))
            .collect();
        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Parses the raw payload and returns a JSON object holding exactly the
    /// declared parameters, coerced to their declared types, with defaults
    /// filled in for absent optional ones. Unknown keys are dropped.
    pub fn validate(&self, raw: &str) -> Result<Value, String> {
        let mut supplied = parse_object(raw)?;
        let mut validated = Map::new();

        for param in &self.params {
            match supplied.remove(&param.name) {
                Some(Value::Null) | None => {
                    if param.required {
                        return Err(format!("missing required parameter '{}'", param.name));
                    }
                    if let Some(default) = &param.default {
                        validated.insert(param.name.clone(), default.clone());
                    }
                }
                Some(value) => {
                    let value = param
                        .coerce(value)
                        .map_err(|e| format!("parameter '{}' {}", param.name, e))?;
                    validated.insert(param.name.clone(), value);
                }
            }
        }

        Ok(Value::Object(validated))
    }
}

fn parse_object(raw: &str) -> Result<Map<String, Value>, String> {
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }

    let value: Value =
        serde_json::from_str(raw).map_err(|e| format!("arguments are not valid JSON: {e}"))?;

    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        // Some models double-encode the payload.
        Value::String(inner) if inner.trim_start().starts_with('{') => parse_object(&inner),
        _ => Err("arguments must be a JSON object".to_string()),
    }
}
