use std::error::Error;
use std::fmt;

/// Dynamically typed attribute value.
///
/// Scalars keep their type all the way into the payload. Errors and
/// anything else are captured as text when the attribute is created,
/// since the source value is usually only borrowed.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    I64(i64),
    U64(u64),
    F64(f64),
    Bool(bool),
    /// Message of an error value.
    Error(String),
    /// `Debug` rendering of a value with no dedicated variant.
    Debug(String),
}

impl Value {
    /// Capture an error as its message.
    pub fn error(err: &(dyn Error + 'static)) -> Self {
        Value::Error(err.to_string())
    }

    /// Capture an arbitrary value through its `Debug` rendering.
    pub fn debug(value: &dyn fmt::Debug) -> Self {
        Value::Debug(format!("{:?}", value))
    }

    /// Format the value for the entry payload.
    ///
    /// Non-finite floats have no JSON number form and fall back to their
    /// string rendering.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::String(s) | Value::Error(s) | Value::Debug(s) => {
                serde_json::Value::String(s.clone())
            }
            Value::I64(v) => serde_json::Value::from(*v),
            Value::U64(v) => serde_json::Value::from(*v),
            Value::F64(v) => serde_json::Number::from_f64(*v)
                .map(serde_json::Value::Number)
                .unwrap_or_else(|| serde_json::Value::String(v.to_string())),
            Value::Bool(v) => serde_json::Value::Bool(*v),
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::I64(v.into())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::I64(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::U64(v.into())
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::U64(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::F64(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

/// Key/value pair attached to a record or a derived handler.
#[derive(Debug, Clone, PartialEq)]
pub struct Attr {
    pub key: String,
    pub value: Value,
}

impl Attr {
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Attr {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn error(key: impl Into<String>, err: &(dyn Error + 'static)) -> Self {
        Attr {
            key: key.into(),
            value: Value::error(err),
        }
    }

    pub fn debug(key: impl Into<String>, value: &dyn fmt::Debug) -> Self {
        Attr {
            key: key.into(),
            value: Value::debug(value),
        }
    }

    pub(crate) fn prefixed(mut self, prefix: &str) -> Self {
        if !prefix.is_empty() {
            self.key.insert_str(0, prefix);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug)]
    struct Boom;

    impl fmt::Display for Boom {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("boom")
        }
    }

    impl Error for Boom {}

    #[derive(Debug)]
    #[allow(dead_code)]
    struct Point {
        x: i32,
        y: i32,
    }

    #[test]
    fn scalars_pass_through() {
        assert_eq!(Value::from("a").to_json(), json!("a"));
        assert_eq!(Value::from(-7i32).to_json(), json!(-7));
        assert_eq!(Value::from(7u64).to_json(), json!(7));
        assert_eq!(Value::from(3.5f64).to_json(), json!(3.5));
        assert_eq!(Value::from(true).to_json(), json!(true));
    }

    #[test]
    fn error_becomes_its_message() {
        let attr = Attr::error("err", &Boom);
        assert_eq!(attr.value.to_json(), json!("boom"));
    }

    #[test]
    fn other_values_use_debug_rendering() {
        let attr = Attr::debug("p", &Point { x: 1, y: 2 });
        assert_eq!(attr.value.to_json(), json!("Point { x: 1, y: 2 }"));
    }

    #[test]
    fn non_finite_float_renders_as_string() {
        assert_eq!(Value::from(f64::NAN).to_json(), json!("NaN"));
        assert_eq!(Value::from(f64::INFINITY).to_json(), json!("inf"));
    }

    #[test]
    fn prefix_is_prepended() {
        assert_eq!(Attr::new("k", 1).prefixed("a.b.").key, "a.b.k");
        assert_eq!(Attr::new("k", 1).prefixed("").key, "k");
    }
}
