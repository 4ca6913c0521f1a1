use serde_json::Map;
use serde_json::Value;

pub const ADD_KEY: &str = "add";
pub const REMOVE_KEY: &str = "remove";
pub const INCLUDE_KEY: &str = "include";

/// Keys that direct composition rather than carry data.
pub const BOOKKEEPING_KEYS: [&str; 3] = [INCLUDE_KEY, ADD_KEY, REMOVE_KEY];

/// Apply `child`'s `remove` and then `add` directives to `parent`'s add-tree.
///
/// Both trees are shaped `{ add: {...}, remove: {...} }`, either key
/// optional. The result is shaped `{ add: {...} }` so it can stand as the
/// parent of the next fragment. Neither input is modified.
pub fn inherit(child: &Value, parent: &Value) -> Value {
	let mut merged = parent
		.get(ADD_KEY)
		.and_then(Value::as_object)
		.cloned()
		.unwrap_or_default();

	if let Some(removals) = child.get(REMOVE_KEY).and_then(Value::as_object) {
		remove_tree(&mut merged, removals);
	}

	if let Some(additions) = child.get(ADD_KEY).and_then(Value::as_object) {
		merge_tree(&mut merged, additions);
	}

	let mut result = Map::new();
	result.insert(ADD_KEY.to_string(), Value::Object(merged));
	Value::Object(result)
}

/// Delete every key path in `removals` from `target`.
///
/// A nested map in `removals` descends into the matching nested value; any
/// other value marks its key for deletion. Numeric keys address list items.
/// Paths missing from `target` are skipped.
pub fn remove_tree(target: &mut Map<String, Value>, removals: &Map<String, Value>) {
	for (key, marker) in removals {
		match marker {
			Value::Object(nested) => {
				if let Some(inner) = target.get_mut(key) {
					remove_value(inner, nested);
				}
			}
			_ => {
				target.remove(key);
			}
		}
	}
}

fn remove_value(target: &mut Value, removals: &Map<String, Value>) {
	match target {
		Value::Object(map) => remove_tree(map, removals),
		Value::Array(items) => remove_items(items, removals),
		_ => {}
	}
}

fn remove_items(items: &mut Vec<Value>, removals: &Map<String, Value>) {
	let mut doomed: Vec<usize> = Vec::new();

	for (key, marker) in removals {
		let Ok(index) = key.parse::<usize>() else {
			continue;
		};
		if index >= items.len() {
			continue;
		}

		match marker {
			Value::Object(nested) => remove_value(&mut items[index], nested),
			_ => doomed.push(index),
		}
	}

	// Remove from the back so earlier indexes stay valid.
	doomed.sort_unstable();
	doomed.dedup();
	for index in doomed.into_iter().rev() {
		items.remove(index);
	}
}

/// Deep-merge `additions` into `target`. Maps on both sides merge
/// recursively; otherwise the addition replaces the existing value.
pub fn merge_tree(target: &mut Map<String, Value>, additions: &Map<String, Value>) {
	for (key, addition) in additions {
		match (target.get_mut(key), addition) {
			(Some(Value::Object(existing)), Value::Object(nested)) => merge_tree(existing, nested),
			_ => {
				target.insert(key.clone(), addition.clone());
			}
		}
	}
}

/// A copy of `tree` without top-level `include`, `add` and `remove` keys.
pub fn strip_bookkeeping(tree: &Value) -> Value {
	match tree {
		Value::Object(map) => {
			Value::Object(
				map.iter()
					.filter(|(key, _)| !BOOKKEEPING_KEYS.contains(&key.as_str()))
					.map(|(key, value)| (key.clone(), value.clone()))
					.collect(),
			)
		}
		other => other.clone(),
	}
}
