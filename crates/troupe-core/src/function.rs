// Troupe Core - Function schemas and the uniform result type

use serde::{Deserialize, Serialize};

use crate::data::{AgentData, Value};

/// Type tag a declared parameter must carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl ValueKind {
    pub fn name(&self) -> &'static str {
        match self {
            ValueKind::String => "string",
            ValueKind::Integer => "integer",
            ValueKind::Number => "number",
            ValueKind::Boolean => "boolean",
            ValueKind::Array => "array",
            ValueKind::Object => "object",
        }
    }

    /// Whether a concrete value satisfies this tag
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (ValueKind::String, Value::String(_)) => true,
            (ValueKind::Integer, Value::Int(_)) => true,
            (ValueKind::Number, Value::Float(_) | Value::Int(_)) => true,
            (ValueKind::Boolean, Value::Bool(_)) => true,
            (ValueKind::Array, Value::List(_)) => true,
            (ValueKind::Object, Value::Map(_)) => true,
            _ => false,
        }
    }
}

/// One declared parameter of a function or tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,

    #[serde(rename = "type")]
    pub kind: ValueKind,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub required: bool,

    /// Default applied when the caller omits the parameter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    /// Allowed values for string parameters
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<String>>,
}

impl ParameterSpec {
    pub fn new(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind,
            description: String::new(),
            required: false,
            default: None,
            allowed: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn one_of(mut self, allowed: Vec<String>) -> Self {
        self.allowed = Some(allowed);
        self
    }
}

/// Declared schema of a function
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,

    /// Per-call wall-clock budget in milliseconds (0 = unbounded)
    #[serde(default)]
    pub timeout_ms: u64,
}

impl FunctionSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
            timeout_ms: 0,
        }
    }

    pub fn parameter(mut self, param: ParameterSpec) -> Self {
        self.parameters.push(param);
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Validate call parameters against the declared schema.
    ///
    /// Fails if a required parameter is missing or any present parameter
    /// carries the wrong type tag or an out-of-enum value.
    pub fn validate(&self, params: &AgentData) -> Result<(), String> {
        for param in &self.parameters {
            match params.get(&param.name) {
                None => {
                    if param.required && param.default.is_none() {
                        return Err(format!("missing required parameter '{}'", param.name));
                    }
                }
                Some(value) => {
                    if !param.kind.accepts(value) {
                        return Err(format!(
                            "parameter '{}' expects {}, got {}",
                            param.name,
                            param.kind.name(),
                            value.kind_name()
                        ));
                    }
                    if let (Some(allowed), Some(s)) = (&param.allowed, value.as_str()) {
                        if !allowed.iter().any(|a| a == s) {
                            return Err(format!(
                                "parameter '{}' must be one of [{}]",
                                param.name,
                                allowed.join(", ")
                            ));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Copy of the call parameters with declared defaults filled in
    pub fn apply_defaults(&self, params: &AgentData) -> AgentData {
        let mut filled = params.clone();
        for param in &self.parameters {
            if !filled.has(&param.name) {
                if let Some(default) = &param.default {
                    filled.set(param.name.clone(), default.clone());
                }
            }
        }
        filled
    }
}

/// Uniform return type of every function, tool, and workflow step.
///
/// `success` implies `error` is empty; `!success` implies it is not.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FunctionResult {
    pub success: bool,

    #[serde(default)]
    pub data: AgentData,

    #[serde(default)]
    pub error: String,
}

impl FunctionResult {
    pub fn ok(data: AgentData) -> Self {
        Self {
            success: true,
            data,
            error: String::new(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        let message = message.into();
        debug_assert!(!message.is_empty());
        Self {
            success: false,
            data: AgentData::new(),
            error: message,
        }
    }

    pub fn error_with_data(message: impl Into<String>, data: AgentData) -> Self {
        Self {
            success: false,
            data,
            error: message.into(),
        }
    }
}
