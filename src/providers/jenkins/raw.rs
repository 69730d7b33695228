use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An untyped record exactly as Jenkins returned it.
///
/// Nothing about its shape is trusted. All reads go through [`RawView`],
/// which treats a missing key and a wrong-typed value the same way: absent.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(Value);

impl RawRecord {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn view(&self) -> RawView<'_> {
        RawView(&self.0)
    }

    /// Sets a top-level field. Records that are not JSON objects are left as they are.
    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        if let Value::Object(map) = &mut self.0 {
            map.insert(key.to_string(), value.into());
        }
    }
}

impl From<Value> for RawRecord {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Borrowed, read-only accessor over a raw record or one of its nested values.
#[derive(Debug, Clone, Copy)]
pub struct RawView<'a>(&'a Value);

impl<'a> RawView<'a> {
    fn get(self, key: &str) -> Option<&'a Value> {
        self.0.as_object()?.get(key)
    }

    /// String field, possibly empty.
    pub fn str(self, key: &str) -> Option<&'a str> {
        self.get(key)?.as_str()
    }

    /// String field that holds something other than whitespace.
    pub fn text(self, key: &str) -> Option<&'a str> {
        self.str(key).filter(|s| !s.trim().is_empty())
    }

    /// Integer field. Floats are truncated; booleans and numeric strings are not numbers.
    #[allow(clippy::cast_possible_truncation)]
    pub fn int(self, key: &str) -> Option<i64> {
        let value = self.get(key)?;
        value
            .as_i64()
            .or_else(|| value.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
    }

    /// Identifier that may arrive as either a string or a number.
    pub fn id(self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Nested object.
    pub fn child(self, key: &str) -> Option<RawView<'a>> {
        self.get(key).filter(|v| v.is_object()).map(RawView)
    }

    /// Elements of a nested sequence; empty when the key is absent or not a sequence.
    pub fn list(self, key: &str) -> impl Iterator<Item = RawView<'a>> {
        self.get(key)
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .map(RawView)
    }

    /// Detaches the viewed value into an owned record.
    pub fn to_record(self) -> RawRecord {
        RawRecord(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wrong_typed_values_read_as_absent() {
        let record = RawRecord::new(json!({
            "number": "42",
            "timestamp": true,
            "url": 17,
            "job": "not-an-object",
            "actions": {"parameters": []},
        }));
        let view = record.view();

        assert_eq!(view.int("number"), None);
        assert_eq!(view.int("timestamp"), None);
        assert_eq!(view.str("url"), None);
        assert!(view.child("job").is_none());
        assert_eq!(view.list("actions").count(), 0);
    }

    #[test]
    fn test_non_object_records_have_no_fields() {
        for value in [json!(null), json!([1, 2]), json!("text"), json!(3)] {
            let record = RawRecord::new(value);
            assert_eq!(record.view().str("url"), None);
            assert_eq!(record.view().int("number"), None);
        }
    }

    #[test]
    fn test_int_truncates_floats() {
        let record = RawRecord::new(json!({"estimatedDuration": 1500.9}));
        assert_eq!(record.view().int("estimatedDuration"), Some(1500));
    }

    #[test]
    fn test_text_skips_blank_strings() {
        let record = RawRecord::new(json!({"displayName": "   ", "fullDisplayName": "job #1"}));
        assert_eq!(record.view().text("displayName"), None);
        assert_eq!(record.view().text("fullDisplayName"), Some("job #1"));
    }

    #[test]
    fn test_id_accepts_numbers_and_strings() {
        let record = RawRecord::new(json!({"a": 12, "b": "34", "c": "", "d": null}));
        let view = record.view();
        assert_eq!(view.id("a").as_deref(), Some("12"));
        assert_eq!(view.id("b").as_deref(), Some("34"));
        assert_eq!(view.id("c"), None);
        assert_eq!(view.id("d"), None);
    }

    #[test]
    fn test_insert_only_touches_objects() {
        let mut record = RawRecord::new(json!({}));
        record.insert("jobName", "deploy");
        assert_eq!(record.view().str("jobName"), Some("deploy"));

        let mut list = RawRecord::new(json!([]));
        list.insert("jobName", "deploy");
        assert_eq!(list, RawRecord::new(json!([])));
    }
}
