//! The `!merge` deep-merge algorithm: recursive map merge plus identity-keyed
//! sequence reconciliation. Grounded on `esphome/yaml_util.py`'s `construct_merge`
//! (minus its unconditional debug print, which the design notes call out as a
//! bug to omit).

use crate::value::{AnnotatedValue, ValueKind};
use indexmap::IndexMap;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ItemKey {
    Id(String),
    Position(usize),
}

fn identity_key(item: &AnnotatedValue) -> Option<String> {
    match &item.kind {
        ValueKind::Mapping(map) => map.get("id").and_then(AnnotatedValue::scalar_text),
        _ => None,
    }
}

/// Folds `items` left-to-right with the deep-merge rule.
pub(crate) fn merge_all(items: Vec<AnnotatedValue>) -> AnnotatedValue {
    let mut iter = items.into_iter();
    let first = match iter.next() {
        Some(v) => v,
        None => return AnnotatedValue::null(Default::default()),
    };
    iter.fold(first, |old, new| merge_values(old, new))
}

fn merge_values(old: AnnotatedValue, new: AnnotatedValue) -> AnnotatedValue {
    match (&old.kind, &new.kind) {
        (_, ValueKind::Null) => old,
        (ValueKind::Mapping(_), ValueKind::Mapping(_)) => merge_mappings(old, new),
        (ValueKind::Sequence(_), ValueKind::Sequence(_)) => merge_sequences(old, new),
        _ => new,
    }
}

fn merge_mappings(old: AnnotatedValue, new: AnnotatedValue) -> AnnotatedValue {
    let origin = new.origin.clone();
    let force = new.force;
    let old_map = match old.kind {
        ValueKind::Mapping(m) => m,
        _ => unreachable!(),
    };
    let new_map = match new.kind {
        ValueKind::Mapping(m) => m,
        _ => unreachable!(),
    };
    let mut result: IndexMap<String, AnnotatedValue> = old_map;
    for (key, new_value) in new_map {
        if let Some(existing) = result.get(&key).cloned() {
            result.insert(key, merge_values(existing, new_value));
        } else {
            result.insert(key, new_value);
        }
    }
    AnnotatedValue {
        kind: ValueKind::Mapping(result),
        origin,
        force,
    }
}

fn merge_sequences(old: AnnotatedValue, new: AnnotatedValue) -> AnnotatedValue {
    let origin = new.origin.clone();
    let force = new.force;
    let old_items = match old.kind {
        ValueKind::Sequence(v) => v,
        _ => unreachable!(),
    };
    let new_items = match new.kind {
        ValueKind::Sequence(v) => v,
        _ => unreachable!(),
    };

    let mut index: IndexMap<ItemKey, AnnotatedValue> = IndexMap::new();
    let mut pos = 0usize;
    for item in new_items {
        match identity_key(&item) {
            Some(id) => {
                index.insert(ItemKey::Id(id), item);
            }
            None => {
                index.insert(ItemKey::Position(pos), item);
                pos += 1;
            }
        }
    }

    let mut merged_old = Vec::new();
    for item in old_items {
        if let Some(id) = identity_key(&item) {
            if let Some(new_item) = index.shift_remove(&ItemKey::Id(id)) {
                merged_old.push(merge_values(item, new_item));
                continue;
            }
        }
        merged_old.push(item);
    }
    merged_old.extend(index.into_values());

    AnnotatedValue {
        kind: ValueKind::Sequence(merged_old),
        origin,
        force,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::origin::Origin;

    fn scalar_str(s: &str) -> AnnotatedValue {
        AnnotatedValue::string(s, Origin::synthetic())
    }

    fn mapping(entries: Vec<(&str, AnnotatedValue)>) -> AnnotatedValue {
        let mut map = IndexMap::new();
        for (k, v) in entries {
            map.insert(k.to_string(), v);
        }
        AnnotatedValue::new(ValueKind::Mapping(map), Origin::synthetic())
    }

    fn int(i: i64) -> AnnotatedValue {
        AnnotatedValue::new(ValueKind::Integer(i), Origin::synthetic())
    }

    #[test]
    fn merge_by_id_reconciles_and_appends() {
        let old = AnnotatedValue::new(
            ValueKind::Sequence(vec![
                mapping(vec![("id", scalar_str("a")), ("v", int(1))]),
                mapping(vec![("id", scalar_str("b")), ("v", int(2))]),
            ]),
            Origin::synthetic(),
        );
        let new = AnnotatedValue::new(
            ValueKind::Sequence(vec![
                mapping(vec![("id", scalar_str("b")), ("v", int(9))]),
                mapping(vec![("id", scalar_str("c")), ("v", int(3))]),
            ]),
            Origin::synthetic(),
        );
        let merged = merge_all(vec![old, new]);
        let items = merged.as_sequence().unwrap();
        assert_eq!(items.len(), 3);
        let ids: Vec<_> = items
            .iter()
            .map(|i| i.as_mapping().unwrap().get("id").unwrap().as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        let b_v = items[1].as_mapping().unwrap().get("v").unwrap();
        assert_eq!(b_v.kind, ValueKind::Integer(9));
    }

    #[test]
    fn merge_mapping_preserves_old_order_and_appends_new() {
        let old = mapping(vec![("a", int(1)), ("b", int(2))]);
        let new = mapping(vec![("b", int(20)), ("c", int(3))]);
        let merged = merge_all(vec![old, new]);
        let map = merged.as_mapping().unwrap();
        let keys: Vec<_> = map.keys().cloned().collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
        assert_eq!(map.get("b").unwrap().kind, ValueKind::Integer(20));
    }

    #[test]
    fn merging_null_on_right_keeps_old() {
        let old = int(1);
        let new = AnnotatedValue::null(Origin::synthetic());
        let merged = merge_all(vec![old, new]);
        assert_eq!(merged.kind, ValueKind::Integer(1));
    }
}
