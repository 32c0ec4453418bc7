//! Read-only view over a canonical response
//!
//! [`ResponseView`] owns a JSON object and hands out [`Field`]s: nested objects
//! come back as new views, arrays as lists whose object elements are wrapped,
//! and everything else as the raw value. Views never point back at their
//! parent, and nothing in this module mutates the underlying data.

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::{Result, UnifaiError};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResponseView {
    data: Map<String, Value>,
}

/// A value reached through a view
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Map(ResponseView),
    List(Vec<Field>),
    Scalar(Value),
}

impl ResponseView {
    pub fn new(data: Map<String, Value>) -> Self {
        Self { data }
    }

    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(data) => Ok(Self::new(data)),
            other => Err(UnifaiError::MalformedResponse(format!(
                "expected a JSON object, got {}",
                other
            ))),
        }
    }

    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self> {
        let value = serde_json::to_value(value)
            .map_err(|e| UnifaiError::MalformedResponse(e.to_string()))?;
        Self::from_value(value)
    }

    /// Attribute-style access; fails with `AttributeNotFound` for absent keys
    pub fn attr(&self, key: &str) -> Result<Field> {
        self.data
            .get(key)
            .map(Field::wrap)
            .ok_or_else(|| UnifaiError::AttributeNotFound(key.to_string()))
    }

    /// Top-level lookup of the raw value, `default` when absent
    pub fn get<'a>(&'a self, key: &str, default: &'a Value) -> &'a Value {
        self.data.get(key).unwrap_or(default)
    }

    /// Walk a dotted path such as `choices.0.message.content`; numeric
    /// segments index into lists
    pub fn path(&self, dotted: &str) -> Result<Field> {
        let mut segments = dotted.split('.');
        let first = segments.next().unwrap_or_default();
        let mut field = self.attr(first)?;
        for segment in segments {
            field = match segment.parse::<usize>() {
                Ok(index) if matches!(field, Field::List(_)) => field.index(index)?,
                _ => field.attr(segment)?,
            };
        }
        Ok(field)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Top-level pairs in insertion order
    pub fn iter(&self) -> serde_json::map::Iter<'_> {
        self.data.iter()
    }

    pub fn to_dict(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn into_dict(self) -> Map<String, Value> {
        self.data
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.data.clone())
    }
}

impl Field {
    fn wrap(value: &Value) -> Self {
        match value {
            Value::Object(map) => Self::Map(ResponseView::new(map.clone())),
            Value::Array(items) => Self::List(
                items
                    .iter()
                    .map(|item| match item {
                        Value::Object(map) => Self::Map(ResponseView::new(map.clone())),
                        other => Self::Scalar(other.clone()),
                    })
                    .collect(),
            ),
            other => Self::Scalar(other.clone()),
        }
    }

    pub fn attr(&self, key: &str) -> Result<Field> {
        match self {
            Self::Map(view) => view.attr(key),
            _ => Err(UnifaiError::AttributeNotFound(key.to_string())),
        }
    }

    pub fn index(&self, index: usize) -> Result<Field> {
        match self {
            Self::List(items) => items
                .get(index)
                .cloned()
                .ok_or_else(|| UnifaiError::AttributeNotFound(index.to_string())),
            _ => Err(UnifaiError::AttributeNotFound(index.to_string())),
        }
    }

    pub fn as_view(&self) -> Option<&ResponseView> {
        match self {
            Self::Map(view) => Some(view),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Field]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Scalar(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Scalar(value) => value.as_u64(),
            _ => None,
        }
    }

    /// Rebuild the plain JSON value this field was wrapped from
    pub fn into_value(self) -> Value {
        match self {
            Self::Map(view) => Value::Object(view.into_dict()),
            Self::List(items) => Value::Array(items.into_iter().map(Field::into_value).collect()),
            Self::Scalar(value) => value,
        }
    }
}

impl Serialize for ResponseView {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.data.serialize(serializer)
    }
}

impl<'a> IntoIterator for &'a ResponseView {
    type Item = (&'a String, &'a Value);
    type IntoIter = serde_json::map::Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl From<ResponseView> for Value {
    fn from(view: ResponseView) -> Self {
        Value::Object(view.data)
    }
}

impl fmt::Display for ResponseView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pretty = serde_json::to_string_pretty(&self.data).map_err(|_| fmt::Error)?;
        f.write_str(&pretty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "id": "msg_1",
            "object": "chat.completion",
            "choices": [{
                "message": {"role": "assistant", "content": "hi"},
                "index": 0,
                "finish_reason": "end_turn"
            }],
            "tags": ["a", 1, [2, 3], {"k": "v"}],
            "usage": {"prompt_tokens": 1, "completion_tokens": 2, "total_tokens": 3}
        })
    }

    fn view() -> ResponseView {
        ResponseView::from_value(sample()).unwrap()
    }

    #[test]
    fn test_round_trip_to_dict() {
        let view = view();
        assert_eq!(Value::Object(view.to_dict().clone()), sample());
        assert_eq!(Value::from(view), sample());
    }

    #[test]
    fn test_nested_mapping_is_wrapped() {
        let usage = view().attr("usage").unwrap();
        let usage_view = usage.as_view().expect("usage should be a view");
        assert_eq!(usage_view.attr("total_tokens").unwrap().as_u64(), Some(3));
    }

    #[test]
    fn test_list_wraps_only_mappings() {
        let tags = view().attr("tags").unwrap();
        let items = tags.as_list().unwrap();
        assert_eq!(items[0], Field::Scalar(json!("a")));
        assert_eq!(items[1], Field::Scalar(json!(1)));
        assert_eq!(items[2], Field::Scalar(json!([2, 3])));
        assert!(matches!(&items[3], Field::Map(v) if v.attr("k").unwrap().as_str() == Some("v")));
    }

    #[test]
    fn test_missing_attribute_fails() {
        let err = view().attr("nope").unwrap_err();
        assert!(matches!(err, UnifaiError::AttributeNotFound(k) if k == "nope"));
    }

    #[test]
    fn test_get_returns_raw_top_level_value() {
        let view = view();
        let fallback = json!("fallback");
        assert_eq!(view.get("usage", &fallback)["total_tokens"], 3);
        assert_eq!(view.get("missing", &fallback), &fallback);
    }

    #[test]
    fn test_path_walks_lists_and_maps() {
        let content = view().path("choices.0.message.content").unwrap();
        assert_eq!(content.as_str(), Some("hi"));
        assert!(view().path("choices.3.message").is_err());
    }

    #[test]
    fn test_iteration_keeps_insertion_order() {
        let view = view();
        let keys: Vec<&str> = view.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["id", "object", "choices", "tags", "usage"]);
    }

    #[test]
    fn test_access_does_not_mutate() {
        let view = view();
        let _ = view.attr("choices").unwrap();
        let _ = view.path("usage.total_tokens").unwrap();
        assert_eq!(view.to_value(), sample());
    }

    #[test]
    fn test_field_into_value_round_trips() {
        let view = view();
        for (key, value) in &view {
            assert_eq!(&view.attr(key).unwrap().into_value(), value);
        }
    }

    #[test]
    fn test_serializes_like_to_dict() {
        let view = view();
        assert_eq!(serde_json::to_value(&view).unwrap(), sample());
        let shown = view.to_string();
        assert!(shown.contains("\"finish_reason\": \"end_turn\""));
    }

    #[test]
    fn test_non_object_is_rejected() {
        assert!(ResponseView::from_value(json!([1, 2])).is_err());
    }
}
