//! Field-level error types shared by local input validation and server
//! error payloads.

use serde_json::Value;

/// One problem with one input field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Field name as the server or form knows it (e.g. `title`).
    pub field: String,
    /// Human-readable description of the problem.
    pub message: String,
}

impl FieldError {
    /// Creates a field error.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Joins field errors into one message, in the order given.
#[must_use]
pub fn join_field_errors(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Client-side validation failure, raised before any request is sent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}", join_field_errors(.fields))]
pub struct InputError {
    /// Every field that failed, in form order.
    pub fields: Vec<FieldError>,
}

impl InputError {
    /// Turns a list of collected problems into a result.
    ///
    /// # Errors
    ///
    /// Returns `Err` when `fields` is non-empty.
    pub fn check(fields: Vec<FieldError>) -> Result<(), Self> {
        if fields.is_empty() {
            Ok(())
        } else {
            Err(Self { fields })
        }
    }
}

/// Structured error body returned with a non-2xx status.
///
/// Backends have used several shapes; all of these are understood:
///
/// ```json
/// {"message": "Task not found"}
/// {"error": "Unauthorized"}
/// {"message": "Validation failed", "errors": {"title": ["too short"]}}
/// {"errors": [{"field": "title", "message": "too short"}]}
/// {"errors": [{"path": "title", "msg": "too short"}]}
/// {"detail": [{"loc": ["body", "title"], "msg": "too short"}]}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorPayload {
    /// Top-level message, if any.
    pub message: Option<String>,
    /// Field-level validation errors, if any.
    pub fields: Vec<FieldError>,
}

impl ErrorPayload {
    /// Extracts an error payload from a decoded JSON body.
    ///
    /// Returns `None` when the body carries neither a message nor field
    /// errors, so the caller can fall back to a generic status message.
    #[must_use]
    pub fn from_value(body: &Value) -> Option<Self> {
        let obj = body.as_object()?;

        let message = ["message", "error", "detail"]
            .iter()
            .find_map(|key| obj.get(*key).and_then(Value::as_str))
            .map(str::to_string)
            .filter(|m| !m.trim().is_empty());

        let mut fields = Vec::new();
        for key in ["errors", "detail"] {
            if let Some(raw) = obj.get(key) {
                collect_field_errors(raw, &mut fields);
            }
        }

        if message.is_none() && fields.is_empty() {
            return None;
        }
        Some(Self { message, fields })
    }

    /// Whether the payload carries field-level errors.
    #[must_use]
    pub fn has_field_errors(&self) -> bool {
        !self.fields.is_empty()
    }
}

fn collect_field_errors(raw: &Value, out: &mut Vec<FieldError>) {
    match raw {
        Value::Object(map) => {
            for (field, messages) in map {
                match messages {
                    Value::String(m) => out.push(FieldError::new(field, m)),
                    Value::Array(items) => out.extend(
                        items
                            .iter()
                            .filter_map(Value::as_str)
                            .map(|m| FieldError::new(field, m)),
                    ),
                    Value::Object(inner) => {
                        if let Some(m) = message_of(inner) {
                            out.push(FieldError::new(field, m));
                        }
                    }
                    _ => {}
                }
            }
        }
        Value::Array(items) => {
            for item in items.iter().filter_map(Value::as_object) {
                let Some(field) = field_of(item) else {
                    continue;
                };
                if let Some(m) = message_of(item) {
                    out.push(FieldError::new(field, m));
                }
            }
        }
        _ => {}
    }
}

fn field_of(item: &serde_json::Map<String, Value>) -> Option<String> {
    for key in ["field", "path", "param", "property"] {
        if let Some(name) = item.get(key).and_then(Value::as_str) {
            return Some(name.to_string());
        }
    }
    // FastAPI-style location list: the last segment names the field.
    item.get("loc")
        .and_then(Value::as_array)
        .and_then(|loc| loc.last())
        .map(|last| match last {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
}

fn message_of(item: &serde_json::Map<String, Value>) -> Option<String> {
    ["message", "msg"]
        .iter()
        .find_map(|key| item.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}
