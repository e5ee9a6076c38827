//! Job invocation payloads
//!
//! A job message body is a small document `{"handler", "method", "parameters"}`
//! where `parameters` is the compact string from [`super::params`]. The
//! document itself is dumped by the queue's body codec like any other payload.

use super::params::{decode_params, encode_params};
use crate::domain::Invocation;
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize, Deserialize)]
struct InvocationDocument {
    handler: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    method: Option<String>,
    parameters: String,
}

/// Build the payload for an invocation
pub fn encode_invocation(invocation: &Invocation) -> Result<Value> {
    let document = InvocationDocument {
        handler: invocation.handler_id.clone(),
        method: invocation.method.clone(),
        parameters: encode_params(&invocation.arguments)?,
    };
    Ok(serde_json::to_value(document)?)
}

/// Recover an invocation from a decoded payload
pub fn decode_invocation(payload: &Value) -> Result<Invocation> {
    let document: InvocationDocument = serde_json::from_value(payload.clone())
        .map_err(|e| AppError::Codec(format!("not a job invocation: {}", e)))?;
    Ok(Invocation {
        handler_id: document.handler,
        method: document.method,
        arguments: decode_params(&document.parameters)?,
    })
}
