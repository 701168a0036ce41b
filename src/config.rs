//! Read-only view over the front-end's key/value settings store.
//!
//! Lookups never fail into the core: a missing key or a value of the wrong
//! shape degrades to the requested type's default.

use std::path::Path;

use serde_json::{Map, Value};

/// Settings keys the core consults.
pub mod keys {
    /// Extra model roots for primary assets, a JSON string list.
    pub const CUSTOM_MODEL_DIRS_PRIMARY: &str = "CustomModelDirsPrimary";
    /// Extra model roots for VAE assets, a JSON string list.
    pub const CUSTOM_MODEL_DIRS_VAE: &str = "CustomModelDirsVae";
    /// Disables the minimum-size check on primary model files.
    pub const DISABLE_MODEL_SIZE_VALIDATION: &str = "disableModelFilesizeValidation";
    /// Name of the model selected for generation.
    pub const SD_MODEL_NAME: &str = "sdModelName";
    /// Option index of the selected backend implementation.
    pub const IMPLEMENTATION: &str = "implementation";
    /// Option index of the selected compute device.
    pub const CUDA_DEVICE: &str = "cudaDevice";
}

/// Read-only settings collaborator.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    values: Map<String, Value>,
}

impl Settings {
    /// Empty settings; every lookup yields its default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load settings from a JSON object file. Unreadable or malformed files
    /// degrade to empty settings.
    pub fn load(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                log::debug!("Settings file {:?} not readable ({}); using defaults", path, e);
                return Self::new();
            }
        };

        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(values)) => Self { values },
            Ok(_) | Err(_) => {
                log::warn!("Settings file {:?} is not a JSON object; using defaults", path);
                Self::new()
            }
        }
    }

    /// Build settings from an already-parsed JSON value. Non-objects yield
    /// empty settings.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(values) => Self { values },
            _ => Self::new(),
        }
    }

    /// Set a value. The presentation layer and tests write through this.
    pub fn set(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }

    /// String value, or empty string.
    pub fn str(&self, key: &str) -> String {
        self.values
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }

    /// Boolean value, or false.
    pub fn bool(&self, key: &str) -> bool {
        self.values.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    /// Integer value, or zero.
    pub fn int(&self, key: &str) -> i64 {
        self.values.get(key).and_then(Value::as_i64).unwrap_or(0)
    }

    /// String-list value, or empty. Accepts either a JSON array or a string
    /// holding an encoded array; anything else degrades to empty.
    pub fn string_list(&self, key: &str) -> Vec<String> {
        let value = match self.values.get(key) {
            Some(value) => value,
            None => return Vec::new(),
        };

        let decoded;
        let array = match value {
            Value::Array(items) => items,
            Value::String(raw) => match serde_json::from_str::<Value>(raw) {
                Ok(Value::Array(items)) => {
                    decoded = items;
                    &decoded
                }
                _ => return Vec::new(),
            },
            _ => return Vec::new(),
        };

        array
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_keys_degrade_to_defaults() {
        let settings = Settings::new();
        assert_eq!(settings.str("nope"), "");
        assert!(!settings.bool("nope"));
        assert_eq!(settings.int("nope"), 0);
        assert!(settings.string_list("nope").is_empty());
    }

    #[test]
    fn test_type_mismatch_degrades() {
        let settings = Settings::from_value(json!({
            "flag": "yes",
            "count": true,
            "dirs": 42,
        }));

        assert!(!settings.bool("flag"));
        assert_eq!(settings.int("count"), 0);
        assert!(settings.string_list("dirs").is_empty());
    }

    #[test]
    fn test_string_list_accepts_array_and_encoded_string() {
        let settings = Settings::from_value(json!({
            "plain": ["/a", "/b"],
            "encoded": "[\"/c\"]",
            "broken": "[not json",
        }));

        assert_eq!(settings.string_list("plain"), vec!["/a", "/b"]);
        assert_eq!(settings.string_list("encoded"), vec!["/c"]);
        assert!(settings.string_list("broken").is_empty());
    }

    #[test]
    fn test_from_non_object_is_empty() {
        let settings = Settings::from_value(json!([1, 2, 3]));
        assert_eq!(settings.int("0"), 0);
    }
}
