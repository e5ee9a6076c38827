//! Message body codecs
//!
//! Bodies travel as text. The default codec is JSON; a queue may swap in the
//! plain-text codec or a pair of custom functions. Job invocation parameters
//! have their own compact codec in [`params`].

pub mod invocation;
pub mod params;

use crate::error::{AppError, Result};
use serde_json::Value;
use std::sync::Arc;

/// Body codec interface (one per queue)
pub trait BodyCodec: Send + Sync {
    /// Encode a value into a message body
    fn dump(&self, value: &Value) -> Result<String>;

    /// Decode a message body
    fn load(&self, body: &str) -> Result<Value>;
}

/// JSON bodies (default)
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl BodyCodec for JsonCodec {
    fn dump(&self, value: &Value) -> Result<String> {
        Ok(serde_json::to_string(value)?)
    }

    fn load(&self, body: &str) -> Result<Value> {
        Ok(serde_json::from_str(body)?)
    }
}

/// Plain-text bodies: strings pass through, other values use their JSON text
#[derive(Debug, Default, Clone, Copy)]
pub struct TextCodec;

impl BodyCodec for TextCodec {
    fn dump(&self, value: &Value) -> Result<String> {
        Ok(match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    fn load(&self, body: &str) -> Result<Value> {
        Ok(Value::String(body.to_string()))
    }
}

type DumpFn = dyn Fn(&Value) -> std::result::Result<String, String> + Send + Sync;
type LoadFn = dyn Fn(&str) -> std::result::Result<Value, String> + Send + Sync;

/// Codec built from a pair of functions
#[derive(Clone)]
pub struct FnCodec {
    dump: Arc<DumpFn>,
    load: Arc<LoadFn>,
}

impl FnCodec {
    pub fn new<D, L>(dump: D, load: L) -> Self
    where
        D: Fn(&Value) -> std::result::Result<String, String> + Send + Sync + 'static,
        L: Fn(&str) -> std::result::Result<Value, String> + Send + Sync + 'static,
    {
        Self {
            dump: Arc::new(dump),
            load: Arc::new(load),
        }
    }
}

impl BodyCodec for FnCodec {
    fn dump(&self, value: &Value) -> Result<String> {
        (self.dump)(value).map_err(AppError::Codec)
    }

    fn load(&self, body: &str) -> Result<Value> {
        (self.load)(body).map_err(AppError::Codec)
    }
}

impl std::fmt::Debug for FnCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FnCodec")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_codec() {
        let value = json!({"id": 123, "payload": "ABCDEF"});
        let body = JsonCodec.dump(&value).unwrap();
        assert!(body.contains("\"payload\":\"ABCDEF\""));
        assert_eq!(JsonCodec.load(&body).unwrap(), value);
        assert!(matches!(
            JsonCodec.load("{not json"),
            Err(AppError::Serialization(_))
        ));
    }

    #[test]
    fn test_text_codec() {
        assert_eq!(TextCodec.dump(&json!("hello")).unwrap(), "hello");
        assert_eq!(TextCodec.dump(&json!(42)).unwrap(), "42");
        assert_eq!(TextCodec.load("{raw}").unwrap(), json!("{raw}"));
    }

    #[test]
    fn test_fn_codec() {
        let codec = FnCodec::new(
            |value| Ok(value.to_string().to_uppercase()),
            |body| {
                if body.is_empty() {
                    Err("empty body".to_string())
                } else {
                    Ok(Value::String(body.to_lowercase()))
                }
            },
        );
        assert_eq!(codec.dump(&json!("abc")).unwrap(), "\"ABC\"");
        assert_eq!(codec.load("XY").unwrap(), json!("xy"));
        assert!(matches!(codec.load(""), Err(AppError::Codec(_))));
    }
}
