//! Artifact merge engine.
//!
//! The artifact is one JSON object built up by successive fragments. Objects
//! merge key by key, arrays are replaced wholesale and every other value
//! overwrites the previous leaf.

use serde_json::{Map, Value};

use history_store::ui_component;

/// Returns `current` with `incoming` deep-merged into it.
///
/// Neither input is mutated. A non-object `incoming` carries no keys and
/// leaves the artifact unchanged.
#[must_use]
pub fn merge(current: &Value, incoming: &Value) -> Value {
    match (current, incoming) {
        (Value::Object(current), Value::Object(incoming)) => {
            Value::Object(merge_maps(current, incoming))
        }
        (Value::Null, Value::Object(incoming)) => {
            Value::Object(merge_maps(&Map::new(), incoming))
        }
        _ => current.clone(),
    }
}

fn merge_maps(current: &Map<String, Value>, incoming: &Map<String, Value>) -> Map<String, Value> {
    let mut next = current.clone();
    for (key, value) in incoming {
        let merged = match (next.get(key), value) {
            (Some(Value::Object(existing)), Value::Object(value)) => {
                Value::Object(merge_maps(existing, value))
            }
            _ => value.clone(),
        };
        next.insert(key.clone(), merged);
    }
    next
}

/// Cumulative artifact for one message.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Artifact {
    body: Map<String, Value>,
    finalized: bool,
}

impl Artifact {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges one fragment and reports whether the artifact changed.
    pub fn apply(&mut self, fragment: &Value) -> bool {
        let Value::Object(fragment) = fragment else {
            return false;
        };
        let next = merge_maps(&self.body, fragment);
        if next == self.body {
            return false;
        }
        self.body = next;
        true
    }

    /// Swaps the whole body for `data`, as a `complete` payload does.
    ///
    /// A non-object `data` is ignored, like in [`Artifact::apply`].
    pub fn replace(&mut self, data: &Value) -> bool {
        let Value::Object(data) = data else {
            return false;
        };
        if *data == self.body {
            return false;
        }
        self.body = data.clone();
        true
    }

    /// Wraps the artifact in a `uiComponent`. Only the first call has an effect.
    pub fn finalize(&mut self) -> bool {
        if self.finalized {
            return false;
        }
        self.finalized = true;
        true
    }

    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.body.is_empty() && !self.finalized
    }

    pub fn campaign(&self) -> Option<&Value> {
        self.body.get("campaign").filter(|campaign| !campaign.is_null())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.body.get(key)
    }

    /// Artifact fields only, without the component wrapper.
    #[must_use]
    pub fn body(&self) -> Value {
        Value::Object(self.body.clone())
    }

    /// Artifact fields plus `uiComponent` once finalized.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut value = self.body.clone();
        if self.finalized {
            value.insert("uiComponent".to_owned(), ui_component(self.component_data()));
        }
        Value::Object(value)
    }

    fn component_data(&self) -> Value {
        let mut data = self.body.clone();
        data.remove("uiComponent");
        Value::Object(data)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn nested_objects_merge_and_scalars_overwrite() {
        let current = json!({"campaign": {"name": "A", "meta": {"priority": "low"}}});
        let incoming = json!({"campaign": {"name": "B", "meta": {"experiment_id": "e1"}}});

        let next = merge(&current, &incoming);

        assert_eq!(
            next,
            json!({"campaign": {"name": "B", "meta": {"priority": "low", "experiment_id": "e1"}}})
        );
        assert_eq!(current["campaign"]["name"], json!("A"));
    }

    #[test]
    fn arrays_replace_instead_of_concatenating() {
        let current = json!({"campaign": {"channels": ["Email", "SMS"]}});
        let next = merge(&current, &json!({"campaign": {"channels": ["Push"]}}));
        assert_eq!(next, json!({"campaign": {"channels": ["Push"]}}));
    }

    #[test]
    fn object_over_scalar_and_scalar_over_object_replace() {
        let current = json!({"a": 1, "b": {"c": 2}});
        let next = merge(&current, &json!({"a": {"x": true}, "b": null}));
        assert_eq!(next, json!({"a": {"x": true}, "b": null}));
    }

    #[test]
    fn non_object_fragment_is_a_no_op() {
        let current = json!({"a": 1});
        assert_eq!(merge(&current, &json!([1, 2])), current);
        assert_eq!(merge(&current, &json!("x")), current);
        assert_eq!(merge(&Value::Null, &json!({"a": 1})), json!({"a": 1}));
    }

    #[test]
    fn artifact_reports_changes_and_wraps_once() {
        let mut artifact = Artifact::new();
        assert!(artifact.apply(&json!({"campaign": {"name": "X"}})));
        assert!(!artifact.apply(&json!({"campaign": {"name": "X"}})));

        assert!(artifact.finalize());
        assert!(!artifact.finalize());
        assert_eq!(
            artifact.to_value(),
            json!({
                "campaign": {"name": "X"},
                "uiComponent": {
                    "type": "campaign_configurator",
                    "data": {"campaign": {"name": "X"}}
                }
            })
        );
    }
}
