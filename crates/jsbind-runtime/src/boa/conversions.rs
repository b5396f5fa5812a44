//! JSON <-> Boa value conversions.
//!
//! | JSON    | JavaScript |
//! |---------|------------|
//! | null    | null       |
//! | boolean | Boolean    |
//! | number  | Number     |
//! | string  | String     |
//! | array   | Array      |
//! | object  | Object     |
//!
//! JavaScript -> JSON follows `JSON.stringify`: a callable `toJSON` is applied
//! first, only enumerable own string keys are written, `undefined`, functions
//! and symbols are dropped from objects and become `null` elsewhere, and
//! non-finite numbers become `null`.

use boa_engine::{
    js_string,
    object::{builtins::JsArray, JsObject},
    value::JsValue,
    Context,
};
use jsbind_common::{BridgeError, Result};
use serde_json::Value as JsonValue;

/// Nesting depth at which conversion gives up, which also stops cycles.
pub const MAX_DEPTH: usize = 128;

const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Converts wire JSON into a fresh JavaScript value.
///
/// # Errors
///
/// Returns `BridgeError::JavaScriptExecution` if creating an array element or
/// object property fails.
pub fn json_to_js_value(json: JsonValue, ctx: &mut Context) -> Result<JsValue> {
    match json {
        JsonValue::Null => Ok(JsValue::null()),
        JsonValue::Bool(b) => Ok(JsValue::new(b)),
        JsonValue::Number(n) => Ok(JsValue::new(n.as_f64().unwrap_or(f64::NAN))),
        JsonValue::String(s) => Ok(JsValue::new(js_string!(s.as_str()))),
        JsonValue::Array(items) => {
            let array = JsArray::new(ctx);
            for (i, item) in items.into_iter().enumerate() {
                let value = json_to_js_value(item, ctx)?;
                array.push(value, ctx).map_err(|e| {
                    BridgeError::JavaScriptExecution(format!("Failed to push array element {}: {}", i, e))
                })?;
            }
            Ok(array.into())
        }
        JsonValue::Object(members) => {
            let object = JsObject::with_object_proto(ctx.intrinsics());
            for (key, value) in members {
                let value = json_to_js_value(value, ctx)?;
                object
                    .create_data_property_or_throw(js_string!(key.as_str()), value, ctx)
                    .map_err(|e| {
                        BridgeError::JavaScriptExecution(format!("Failed to set property '{}': {}", key, e))
                    })?;
            }
            Ok(object.into())
        }
    }
}

/// Converts a JavaScript value into wire JSON.
///
/// # Errors
///
/// Returns `BridgeError::JavaScriptExecution` if a getter throws, and
/// `BridgeError::InvalidRequest` if the value nests deeper than [`MAX_DEPTH`].
pub fn js_value_to_json(value: &JsValue, ctx: &mut Context) -> Result<JsonValue> {
    Ok(convert(value, ctx, 0)?.unwrap_or(JsonValue::Null))
}

/// `None` marks values `JSON.stringify` omits from objects.
fn convert(value: &JsValue, ctx: &mut Context, depth: usize) -> Result<Option<JsonValue>> {
    if depth > MAX_DEPTH {
        return Err(BridgeError::InvalidRequest(format!(
            "Value nests deeper than {} levels (cyclic?)",
            MAX_DEPTH
        )));
    }

    if value.is_undefined() || value.is_symbol() {
        return Ok(None);
    }
    if value.is_null() {
        return Ok(Some(JsonValue::Null));
    }
    if let Some(b) = value.as_boolean() {
        return Ok(Some(JsonValue::Bool(b)));
    }
    if let Some(n) = value.as_number() {
        return Ok(Some(number_to_json(n)));
    }
    if let Some(s) = value.as_string() {
        return Ok(Some(JsonValue::String(s.to_std_string_escaped())));
    }

    let Some(object) = value.as_object().map(|o| o.clone()) else {
        // BigInt has no JSON form
        return Ok(Some(JsonValue::Null));
    };
    if object.is_callable() {
        return Ok(None);
    }

    let to_json = object
        .get(js_string!("toJSON"), ctx)
        .map_err(|e| BridgeError::JavaScriptExecution(format!("Failed to get toJSON: {}", e)))?;
    if let Some(to_json) = to_json.as_callable().map(|f| f.clone()) {
        let replaced = to_json
            .call(value, &[], ctx)
            .map_err(|e| BridgeError::JavaScriptExecution(format!("toJSON threw: {}", e)))?;
        return convert(&replaced, ctx, depth + 1);
    }

    if object.is_array() {
        let array = JsArray::from_object(object)
            .map_err(|e| BridgeError::JavaScriptExecution(format!("Object is not a valid array: {}", e)))?;
        let length: usize = array
            .length(ctx)
            .map_err(|e| BridgeError::JavaScriptExecution(format!("Failed to get array length: {}", e)))?
            .try_into()
            .map_err(|_| BridgeError::InvalidRequest("Array length overflow".into()))?;

        let mut items = Vec::with_capacity(length.min(1024));
        for i in 0..length {
            let item = array
                .get(i, ctx)
                .map_err(|e| BridgeError::JavaScriptExecution(format!("Failed to get array element {}: {}", i, e)))?;
            items.push(convert(&item, ctx, depth + 1)?.unwrap_or(JsonValue::Null));
        }
        return Ok(Some(JsonValue::Array(items)));
    }

    let mut members = serde_json::Map::new();
    for name in enumerable_keys(&object, ctx)? {
        let member = object
            .get(js_string!(name.as_str()), ctx)
            .map_err(|e| BridgeError::JavaScriptExecution(format!("Failed to get property '{}': {}", name, e)))?;
        if let Some(member) = convert(&member, ctx, depth + 1)? {
            members.insert(name, member);
        }
    }
    Ok(Some(JsonValue::Object(members)))
}

/// Enumerable own string keys in property order, as `Object.keys` lists them.
fn enumerable_keys(object: &JsObject, ctx: &mut Context) -> Result<Vec<String>> {
    let fail = |e: boa_engine::JsError| BridgeError::JavaScriptExecution(format!("Failed to get object keys: {}", e));

    let constructor = ctx.global_object().get(js_string!("Object"), ctx).map_err(fail)?;
    let keys = constructor
        .as_object()
        .map(|o| o.clone())
        .ok_or_else(|| BridgeError::JavaScriptExecution("Object constructor is missing".into()))?
        .get(js_string!("keys"), ctx)
        .map_err(fail)?;
    let keys = keys
        .as_callable()
        .map(|f| f.clone())
        .ok_or_else(|| BridgeError::JavaScriptExecution("Object.keys is not callable".into()))?
        .call(&constructor, &[JsValue::from(object.clone())], ctx)
        .map_err(fail)?;

    let keys = keys
        .as_object()
        .map(|o| o.clone())
        .ok_or_else(|| BridgeError::JavaScriptExecution("Object.keys returned a non-object".into()))?;
    let keys = JsArray::from_object(keys).map_err(fail)?;
    let length: usize = keys
        .length(ctx)
        .map_err(fail)?
        .try_into()
        .map_err(|_| BridgeError::InvalidRequest("Key count overflow".into()))?;

    let mut names = Vec::with_capacity(length);
    for i in 0..length {
        let key = keys.get(i, ctx).map_err(fail)?;
        if let Some(key) = key.as_string() {
            names.push(key.to_std_string_escaped());
        }
    }
    Ok(names)
}

fn number_to_json(n: f64) -> JsonValue {
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        return JsonValue::from(n as i64);
    }
    serde_json::Number::from_f64(n)
        .map(JsonValue::Number)
        .unwrap_or(JsonValue::Null)
}
