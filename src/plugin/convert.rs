//! Value conversions between Lua, JSON, and printf-style formatting.

use mlua::{Lua, Value};
use serde_json::Value as JsonValue;

/// Render a Lua value the way guest code would see it from `tostring`,
/// with scalar conversions pinned down so plugins can splice values into
/// JSON payloads without a serializer.
pub(crate) fn display_value(value: &Value) -> String {
    match value {
        Value::Nil => "nil".to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.to_string_lossy().to_string(),
        other => format!("<{}>", other.type_name()),
    }
}

/// `plugin.format`: printf-style templating over Lua values.
///
/// Supported verbs: `%s` and `%v` (display conversion), `%d` (integer),
/// `%f` (float, six decimals), `%%` (literal percent). Missing arguments
/// render as `%!<verb>(missing)` rather than failing the call.
pub(crate) fn format_values(fmt: &str, args: &[Value]) -> String {
    let mut out = String::with_capacity(fmt.len());
    let mut args = args.iter();
    let mut chars = fmt.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some(verb) => match args.next() {
                Some(value) => out.push_str(&apply_verb(verb, value)),
                None => out.push_str(&format!("%!{verb}(missing)")),
            },
            // trailing bare percent
            None => out.push('%'),
        }
    }
    out
}

fn apply_verb(verb: char, value: &Value) -> String {
    match verb {
        'd' => match value {
            Value::Integer(i) => i.to_string(),
            Value::Number(n) => (*n as i64).to_string(),
            other => display_value(other),
        },
        'f' => match value {
            Value::Integer(i) => format!("{:.6}", *i as f64),
            Value::Number(n) => format!("{n:.6}"),
            other => display_value(other),
        },
        _ => display_value(value),
    }
}

/// Convert a JSON document into Lua data: objects become tables keyed by
/// string, arrays become 1-indexed sequences.
pub(crate) fn json_to_lua(lua: &Lua, value: &JsonValue) -> mlua::Result<Value> {
    Ok(match value {
        JsonValue::Null => Value::Nil,
        JsonValue::Bool(b) => Value::Boolean(*b),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        },
        JsonValue::String(s) => Value::String(lua.create_string(s)?),
        JsonValue::Array(items) => {
            let table = lua.create_table()?;
            for (i, item) in items.iter().enumerate() {
                table.set(i + 1, json_to_lua(lua, item)?)?;
            }
            Value::Table(table)
        }
        JsonValue::Object(map) => {
            let table = lua.create_table()?;
            for (key, item) in map {
                table.set(key.as_str(), json_to_lua(lua, item)?)?;
            }
            Value::Table(table)
        }
    })
}
