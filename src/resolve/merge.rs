use serde_json::{Map, Value};

/// Fill every key missing from `target` with the value from `defaults`.
///
/// Nested objects are merged recursively. Values already present in `target`
/// win, including an explicit `null`.
pub fn defaults_deep(target: &mut Map<String, Value>, defaults: &Map<String, Value>) {
    for (key, default) in defaults {
        if let Some(existing) = target.get_mut(key) {
            if let (Value::Object(inner), Value::Object(inner_default)) = (existing, default) {
                defaults_deep(inner, inner_default);
            }
        } else {
            target.insert(key.clone(), default.clone());
        }
    }
}

/// Merge `overrides` over `base`: keys in `overrides` win.
pub fn merged_over(
    overrides: &Map<String, Value>,
    base: &Map<String, Value>,
) -> Map<String, Value> {
    let mut merged = overrides.clone();
    defaults_deep(&mut merged, base);
    merged
}
