use std::collections::{HashMap, VecDeque};

use serde_json::Value;

/// Default number of memoized messages
const DEFAULT_CAPACITY: usize = 1000;

/// Result of trying to pretty-print a message as JSON
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JsonFormat {
    pub formatted: String,
    pub is_json: bool,
}

impl JsonFormat {
    fn plain(text: &str) -> Self {
        Self {
            formatted: text.to_string(),
            is_json: false,
        }
    }
}

/// Memoizes JSON detection and pretty-printing per exact message text.
///
/// Bounded with first-in-first-out eviction: reading a cached entry does not
/// refresh its position, so the oldest inserted text is always dropped first.
pub struct JsonFormatCache {
    entries: HashMap<String, JsonFormat>,
    order: VecDeque<String>,
    capacity: usize,
}

impl Default for JsonFormatCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl JsonFormatCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Pretty-print `text` if it is a JSON object or array, otherwise return
    /// it unchanged with `is_json == false`
    pub fn format(&mut self, text: &str) -> JsonFormat {
        if let Some(cached) = self.entries.get(text) {
            return cached.clone();
        }

        let result = format_uncached(text);
        self.insert(text.to_string(), result.clone());
        result
    }

    pub fn is_json(&mut self, text: &str) -> bool {
        self.format(text).is_json
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn contains(&self, text: &str) -> bool {
        self.entries.contains_key(text)
    }

    fn insert(&mut self, text: String, value: JsonFormat) {
        if self.entries.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
        self.order.push_back(text.clone());
        self.entries.insert(text, value);
    }
}

fn format_uncached(text: &str) -> JsonFormat {
    let trimmed = text.trim();
    if !trimmed.starts_with('{') && !trimmed.starts_with('[') {
        return JsonFormat::plain(text);
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(value @ (Value::Object(_) | Value::Array(_))) => match serde_json::to_string_pretty(&value) {
            Ok(formatted) => JsonFormat {
                formatted,
                is_json: true,
            },
            Err(_) => JsonFormat::plain(text),
        },
        _ => JsonFormat::plain(text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formats_object_with_two_space_indent() {
        let mut cache = JsonFormatCache::default();
        let result = cache.format(r#"{"a":1}"#);
        assert_eq!(result.formatted, "{\n  \"a\": 1\n}");
        assert!(result.is_json);
    }

    #[test]
    fn test_plain_text_short_circuits() {
        let mut cache = JsonFormatCache::default();
        let result = cache.format("hello");
        assert_eq!(result.formatted, "hello");
        assert!(!result.is_json);
        assert!(!cache.is_json("hello"));
    }

    #[test]
    fn test_preserves_key_order() {
        let mut cache = JsonFormatCache::default();
        let result = cache.format(r#"  {"z":true,"a":[1,2]}  "#);
        assert!(result.is_json);
        assert_eq!(
            result.formatted,
            "{\n  \"z\": true,\n  \"a\": [\n    1,\n    2\n  ]\n}"
        );
    }

    #[test]
    fn test_invalid_or_scalar_json_is_not_json() {
        let mut cache = JsonFormatCache::default();
        assert!(!cache.is_json("{not json"));
        assert_eq!(cache.format("{not json").formatted, "{not json");
        assert!(!cache.is_json("42"));
        assert!(!cache.is_json("\"quoted\""));
        assert!(cache.is_json("[]"));
    }

    #[test]
    fn test_results_are_memoized_by_exact_text() {
        let mut cache = JsonFormatCache::default();
        cache.format("a");
        cache.format("a");
        cache.format(" a");
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_eviction_is_fifo_and_bounded() {
        let mut cache = JsonFormatCache::new(3);
        cache.format("first");
        cache.format("second");
        cache.format("third");
        // Reading does not refresh insertion order
        cache.format("first");
        cache.format("fourth");

        assert_eq!(cache.len(), 3);
        assert!(!cache.contains("first"));
        assert!(cache.contains("second"));
        assert!(cache.contains("fourth"));
    }
}
