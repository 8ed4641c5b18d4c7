//! Positional argument encoding for `Call` envelopes.
//!
//! Arguments travel as a JSON array. `()` becomes `[]`, tuples become
//! arrays, and any other single value is wrapped as a one-element array.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Encode call arguments as a positional array.
pub fn encode_args<A: Serialize>(args: A) -> serde_json::Result<Value> {
    Ok(match serde_json::to_value(args)? {
        Value::Null => Value::Array(Vec::new()),
        array @ Value::Array(_) => array,
        other => Value::Array(vec![other]),
    })
}

/// Decode a positional array into a handler's argument type.
///
/// Falls back to `null` for an empty array (unit arguments) and to the sole
/// element of a one-element array (non-tuple arguments).
pub fn decode_args<A: DeserializeOwned>(data: Option<Value>) -> serde_json::Result<A> {
    let data = data.unwrap_or_else(|| Value::Array(Vec::new()));
    let err = match serde_json::from_value::<A>(data.clone()) {
        Ok(args) => return Ok(args),
        Err(err) => err,
    };

    match data {
        Value::Array(items) if items.is_empty() => serde_json::from_value(Value::Null).map_err(|_| err),
        Value::Array(mut items) if items.len() == 1 => {
            let single = items.pop().unwrap_or(Value::Null);
            serde_json::from_value(single).map_err(|_| err)
        }
        _ => Err(err),
    }
}
