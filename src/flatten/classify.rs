//! Field classification, struct flattening and numeric-suffix grouping.

use std::collections::HashMap;

use serde_json::{Map, Value as JsonValue};

/// Top-level fields of a document, partitioned by shape.
///
/// Every top-level key lands in exactly one list, in document order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassifiedFields {
    /// Leaves, including explicit `null`s.
    pub scalars: Vec<(String, JsonValue)>,
    /// Nested objects.
    pub structs: Vec<(String, Map<String, JsonValue>)>,
    pub arrays: Vec<(String, Vec<JsonValue>)>,
}

/// Partition the top-level fields of `doc`.
pub fn classify(doc: &Map<String, JsonValue>) -> ClassifiedFields {
    let mut out = ClassifiedFields::default();
    for (key, value) in doc {
        match value {
            JsonValue::Array(items) => out.arrays.push((key.clone(), items.clone())),
            JsonValue::Object(map) => out.structs.push((key.clone(), map.clone())),
            JsonValue::Null | JsonValue::Bool(_) | JsonValue::Number(_) | JsonValue::String(_) => {
                out.scalars.push((key.clone(), value.clone()))
            }
        }
    }
    out
}

/// Result of flattening struct fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlattenedStructs {
    /// Scalar leaves under their `_`-joined path.
    pub leaves: Vec<(String, JsonValue)>,
    /// Arrays found inside structs, named by their `_`-joined path.
    pub arrays: Vec<(String, Vec<JsonValue>)>,
}

/// Flatten struct fields into `{parent}_{child}` leaves, depth first.
pub fn flatten_structs(structs: &[(String, Map<String, JsonValue>)]) -> FlattenedStructs {
    let mut out = FlattenedStructs::default();
    for (name, map) in structs {
        flatten_into(Some(name), map, &mut out);
    }
    out
}

/// Flatten a whole object; top-level keys keep their names.
///
/// Flattening an already flat object returns its entries unchanged.
pub fn flatten_object(obj: &Map<String, JsonValue>) -> FlattenedStructs {
    let mut out = FlattenedStructs::default();
    flatten_into(None, obj, &mut out);
    out
}

fn flatten_into(prefix: Option<&str>, obj: &Map<String, JsonValue>, out: &mut FlattenedStructs) {
    for (key, value) in obj {
        let name = match prefix {
            Some(p) => format!("{p}_{key}"),
            None => key.clone(),
        };
        match value {
            JsonValue::Object(nested) => flatten_into(Some(&name), nested, out),
            JsonValue::Array(items) => out.arrays.push((name, items.clone())),
            _ => out.leaves.push((name, value.clone())),
        }
    }
}

/// Split `base-N` / `base_N` into `(base, N)`.
///
/// The suffix is the trailing run of ASCII digits; the separator right before it must be `-`
/// or `_` and the base must be non-empty.
pub fn split_numeric_suffix(key: &str) -> Option<(&str, u64)> {
    let digits_start = key
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i)?;
    let head = &key[..digits_start];
    let base = head.strip_suffix('-').or_else(|| head.strip_suffix('_'))?;
    if base.is_empty() {
        return None;
    }
    let index = key[digits_start..].parse::<u64>().ok()?;
    Some((base, index))
}

/// Outcome of [`group_numeric_suffixes`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SuffixGroups {
    /// Base name → values ordered by ascending suffix, in order of first appearance.
    pub groups: Vec<(String, Vec<JsonValue>)>,
    /// Fields that were not grouped, in input order.
    pub remaining: Vec<(String, JsonValue)>,
}

/// Group sibling fields sharing a base name and a numeric suffix.
///
/// A base materializes as an array only with two or more members; a lone `c-1` stays a
/// regular field.
pub fn group_numeric_suffixes(fields: Vec<(String, JsonValue)>) -> SuffixGroups {
    let mut members: HashMap<String, Vec<usize>> = HashMap::new();
    let mut bases: Vec<String> = Vec::new();
    let mut parsed: Vec<Option<u64>> = Vec::with_capacity(fields.len());

    for (i, (key, _)) in fields.iter().enumerate() {
        match split_numeric_suffix(key) {
            Some((base, index)) => {
                let slot = members.entry(base.to_string()).or_insert_with(|| {
                    bases.push(base.to_string());
                    Vec::new()
                });
                slot.push(i);
                parsed.push(Some(index));
            }
            None => parsed.push(None),
        }
    }

    let mut grouped = vec![false; fields.len()];
    let mut order: Vec<(String, Vec<usize>)> = Vec::new();
    for base in bases {
        if let Some(mut idxs) = members.remove(&base) {
            if idxs.len() < 2 {
                continue;
            }
            idxs.sort_by_key(|&i| parsed[i]);
            for &i in &idxs {
                grouped[i] = true;
            }
            order.push((base, idxs));
        }
    }

    let mut slots: Vec<Option<JsonValue>> = Vec::with_capacity(fields.len());
    let mut remaining = Vec::new();
    for (i, (key, value)) in fields.into_iter().enumerate() {
        if grouped[i] {
            slots.push(Some(value));
        } else {
            slots.push(None);
            remaining.push((key, value));
        }
    }

    let groups = order
        .into_iter()
        .map(|(base, idxs)| {
            let values = idxs
                .into_iter()
                .filter_map(|i| slots[i].take())
                .collect();
            (base, values)
        })
        .collect();

    SuffixGroups { groups, remaining }
}
