use phf::phf_set;
use serde_json::Value;

/// Properties the engine rewrites on every refresh or save.
pub static VOLATILE_PROPERTIES: phf::Set<&'static str> = phf_set! {
    "modifiedTime",
    "structureModifiedTime",
    "refreshedTime",
    "lastProcessed",
    "lastUpdate",
    "lastSchemaUpdate",
    "estimatedSize",
};

/// Remove volatile properties at every depth of `value`.
pub(crate) fn strip_volatile(value: &mut Value, extra: &[String]) {
    match value {
        Value::Object(map) => {
            map.retain(|key, _| {
                !VOLATILE_PROPERTIES.contains(key.as_str()) && !extra.iter().any(|e| e == key)
            });
            for child in map.values_mut() {
                strip_volatile(child, extra);
            }
        },
        Value::Array(items) => {
            for item in items {
                strip_volatile(item, extra);
            }
        },
        _ => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strip_nested() {
        let mut schema = json!({
            "name": "Sales",
            "lastUpdate": "2024-02-01T10:00:00",
            "model": {
                "tables": [
                    {"name": "Orders", "modifiedTime": "x", "partitions": [{"refreshedTime": "y", "mode": "import"}]}
                ],
                "lineageTag": "abc"
            }
        });
        strip_volatile(&mut schema, &["lineageTag".to_string()]);
        assert_eq!(
            schema,
            json!({
                "name": "Sales",
                "model": {"tables": [{"name": "Orders", "partitions": [{"mode": "import"}]}]}
            })
        );
    }
}
