// Canonical JSON helpers shared by block hashing and genesis comparison
use crate::error::Result;
use serde::Serialize;
use serde_json::Value;

/// Serialize a JSON value with object keys in sorted order.
///
/// serde_json's `Map` is a `BTreeMap` unless the `preserve_order` feature is
/// enabled, so printing a `Value` yields sorted keys at every depth.
pub fn canonical_json(value: &Value) -> String {
    value.to_string()
}

/// Serialize any serde type through `Value` so its keys come out sorted
pub fn to_canonical_json<T: Serialize>(data: &T) -> Result<String> {
    let value = serde_json::to_value(data)?;
    Ok(canonical_json(&value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_keys_are_sorted() {
        let value: Value = serde_json::from_str(r#"{"b":1,"a":{"z":true,"y":null}}"#).unwrap();
        assert_eq!(canonical_json(&value), r#"{"a":{"y":null,"z":true},"b":1}"#);
    }

    #[test]
    fn test_insertion_order_does_not_matter() {
        let first = json!({"message": "hi", "author": "me"});
        let second = json!({"author": "me", "message": "hi"});
        assert_eq!(canonical_json(&first), canonical_json(&second));
    }

    #[derive(Serialize)]
    struct Unordered {
        zeta: u8,
        alpha: u8,
    }

    #[test]
    fn test_struct_fields_are_sorted() {
        let text = to_canonical_json(&Unordered { zeta: 2, alpha: 1 }).unwrap();
        assert_eq!(text, r#"{"alpha":1,"zeta":2}"#);
    }
}
