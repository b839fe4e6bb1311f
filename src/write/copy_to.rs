//! Copy-To preprocessor (C11, spec §4.11).
//!
//! At write time, walk the mapping's field-path → target-paths table and
//! append the value at each source path into every target, creating arrays
//! as needed rather than overwriting a scalar target.

use serde_json::{Map, Value as Json};

use crate::catalog::IndexMapping;

/// Mutates `source` in place, applying every `copy_to` rule in `mapping`.
pub fn apply_copy_to(source: &mut Json, mapping: &IndexMapping) {
    let Json::Object(map) = source else { return };
    let appends: Vec<(String, Json)> = map
        .iter()
        .flat_map(|(field, value)| mapping.copy_to_targets(field).iter().map(move |target| (target.clone(), value.clone())))
        .collect();

    let Json::Object(map) = source else { return };
    for (target, value) in appends {
        append_value(map, &target, value);
    }
}

fn append_value(map: &mut Map<String, Json>, target: &str, value: Json) {
    match map.get_mut(target) {
        Some(Json::Array(existing)) => existing.push(value),
        Some(existing) => {
            let previous = existing.clone();
            *existing = Json::Array(vec![previous, value]);
        }
        None => {
            map.insert(target.to_string(), Json::Array(vec![value]));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn copies_source_field_into_new_target_array() {
        let mapping = IndexMapping::default().with_copy_to("title", vec!["all_text".to_string()]);
        let mut source = json!({"title": "red widget"});
        apply_copy_to(&mut source, &mapping);
        assert_eq!(source["all_text"], json!(["red widget"]));
    }

    #[test]
    fn appends_to_an_existing_target_array() {
        let mapping = IndexMapping::default().with_copy_to("title", vec!["all_text".to_string()]).with_copy_to("description", vec!["all_text".to_string()]);
        let mut source = json!({"title": "red widget", "description": "a fine widget"});
        apply_copy_to(&mut source, &mapping);
        let all_text = source["all_text"].as_array().unwrap();
        assert_eq!(all_text.len(), 2);
    }

    #[test]
    fn converts_a_scalar_target_into_an_array_before_appending() {
        let mapping = IndexMapping::default().with_copy_to("tag", vec!["all_text".to_string()]);
        let mut source = json!({"tag": "sale", "all_text": "existing"});
        apply_copy_to(&mut source, &mapping);
        assert_eq!(source["all_text"], json!(["existing", "sale"]));
    }

    #[test]
    fn no_copy_to_rules_leaves_source_untouched() {
        let mapping = IndexMapping::default();
        let mut source = json!({"title": "red widget"});
        let before = source.clone();
        apply_copy_to(&mut source, &mapping);
        assert_eq!(source, before);
    }
}
