use super::Value;

/// Byte-offset string indexing.
///
/// Returns the code point starting at `index`, an empty string when `index`
/// falls inside a multi-byte character and `undefined` past the end.
pub fn string_at_byte(s: &str, index: usize) -> Value {
    if index >= s.len() {
        return Value::Undefined;
    }
    if !s.is_char_boundary(index) {
        return Value::from("");
    }
    match s[index..].chars().next() {
        Some(c) => Value::from(c.to_string()),
        None => Value::Undefined,
    }
}
