//! Scalar type parsers: map a PostgreSQL type OID to a function that turns
//! the text-format datum into a JSON value.
//!
//! The decoder looks a parser up once per column while decoding a relation
//! message and stores it in the column descriptor. Unknown OIDs fall back to
//! string passthrough, so consumers never lose data to an unmapped type.

use serde_json::Value;

/// Parses one text-format datum into a value.
pub type TypeParser = fn(&str) -> Value;

/// Well-known PostgreSQL type OIDs.
pub mod oid {
    pub const BOOL: u32 = 16;
    pub const INT8: u32 = 20;
    pub const INT2: u32 = 21;
    pub const INT4: u32 = 23;
    pub const TEXT: u32 = 25;
    pub const JSON: u32 = 114;
    pub const FLOAT4: u32 = 700;
    pub const FLOAT8: u32 = 701;
    pub const VARCHAR: u32 = 1043;
    pub const DATE: u32 = 1082;
    pub const TIME: u32 = 1083;
    pub const TIMESTAMP: u32 = 1114;
    pub const TIMESTAMPTZ: u32 = 1184;
    pub const NUMERIC: u32 = 1700;
    pub const UUID: u32 = 2950;
    pub const JSONB: u32 = 3802;

    pub const INT2_ARRAY: u32 = 1005;
    pub const INT4_ARRAY: u32 = 1007;
    pub const INT8_ARRAY: u32 = 1016;
    pub const TEXT_ARRAY: u32 = 1009;
    pub const VARCHAR_ARRAY: u32 = 1015;
    pub const FLOAT4_ARRAY: u32 = 1021;
    pub const FLOAT8_ARRAY: u32 = 1022;
}

/// Returns the parser for a type OID.
pub fn type_parser(type_oid: u32) -> TypeParser {
    match type_oid {
        oid::BOOL => parse_bool,
        oid::INT2 | oid::INT4 | oid::INT8 => parse_int,
        oid::FLOAT4 | oid::FLOAT8 => parse_float,
        oid::JSON | oid::JSONB => parse_json,
        oid::INT2_ARRAY | oid::INT4_ARRAY | oid::INT8_ARRAY => parse_int_array,
        oid::FLOAT4_ARRAY | oid::FLOAT8_ARRAY => parse_float_array,
        oid::TEXT_ARRAY | oid::VARCHAR_ARRAY => parse_text_array,
        // numeric stays textual to preserve precision; date/time/uuid stay
        // textual for consumers to interpret.
        _ => parse_text,
    }
}

fn parse_bool(text: &str) -> Value {
    match text {
        "t" => Value::Bool(true),
        "f" => Value::Bool(false),
        _ => Value::String(text.to_string()),
    }
}

fn parse_int(text: &str) -> Value {
    text.parse::<i64>()
        .map(Value::from)
        .unwrap_or_else(|_| Value::String(text.to_string()))
}

fn parse_float(text: &str) -> Value {
    text.parse::<f64>()
        .map(Value::from)
        .unwrap_or_else(|_| Value::String(text.to_string()))
}

fn parse_json(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

fn parse_text(text: &str) -> Value {
    Value::String(text.to_string())
}

fn parse_int_array(text: &str) -> Value {
    parse_array(text, parse_int)
}

fn parse_float_array(text: &str) -> Value {
    parse_array(text, parse_float)
}

fn parse_text_array(text: &str) -> Value {
    parse_array(text, parse_text)
}

/// Parses a one-dimensional array literal like `{1,2,3}` or
/// `{"hello, world",NULL}`. Elements may be double-quoted with backslash
/// escapes; an unquoted `NULL` is a null element. Anything that does not
/// look like an array literal is returned as a plain string.
fn parse_array(text: &str, element: TypeParser) -> Value {
    let Some(inner) = text
        .strip_prefix('{')
        .and_then(|t| t.strip_suffix('}'))
    else {
        return Value::String(text.to_string());
    };

    if inner.is_empty() {
        return Value::Array(Vec::new());
    }

    let mut elements = Vec::new();
    let mut current = String::new();
    let mut chars = inner.chars();
    let mut quoted = false;
    let mut was_quoted = false;

    loop {
        match chars.next() {
            Some('"') if !quoted => {
                quoted = true;
                was_quoted = true;
            }
            Some('"') if quoted => quoted = false,
            Some('\\') if quoted => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            Some(',') if !quoted => {
                elements.push(finish_element(&current, was_quoted, element));
                current.clear();
                was_quoted = false;
            }
            Some(c) => current.push(c),
            None => {
                elements.push(finish_element(&current, was_quoted, element));
                break;
            }
        }
    }

    Value::Array(elements)
}

fn finish_element(text: &str, was_quoted: bool, element: TypeParser) -> Value {
    if !was_quoted && text == "NULL" {
        Value::Null
    } else {
        element(text)
    }
}
