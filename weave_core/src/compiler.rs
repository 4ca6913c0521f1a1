use serde_json::Map;
use serde_json::Value;
use tracing::debug;

use crate::WeaveError;
use crate::WeaveResult;
use crate::XrefCollection;
use crate::XrefId;
use crate::XrefResolvers;
use crate::XrefSpec;
use crate::tree::ADD_KEY;
use crate::tree::INCLUDE_KEY;
use crate::tree::REMOVE_KEY;
use crate::tree::inherit;
use crate::tree::strip_bookkeeping;

pub const DEFAULT_GROUP: &str = "main";
const XREF_KEY: &str = "xref";

/// Composes one tree from a fragment and everything it includes.
///
/// A fragment declares its references under `include.xref` and the order in
/// which they apply under `include.<group>`:
///
/// ```json
/// {
///   "include": {
///     "xref": { "base": "base.json", "local": { "type": "file", "location": "local.toml" } },
///     "main": ["base", "local"]
///   },
///   "add": { "debug": true },
///   "remove": { "legacy": true }
/// }
/// ```
///
/// Included fragments are composed first, recursively, and folded in the
/// declared order; the fragment's own `remove` and `add` apply last. All
/// xrefs share one [`XrefCollection`], so a fragment reached through several
/// paths is fetched once per compiler.
#[derive(Debug)]
pub struct TreeCompiler<'a> {
	resolvers: &'a XrefResolvers,
	xrefs: XrefCollection,
	group: String,
}

impl<'a> TreeCompiler<'a> {
	pub fn new(resolvers: &'a XrefResolvers) -> Self {
		Self {
			resolvers,
			xrefs: XrefCollection::new(),
			group: DEFAULT_GROUP.to_string(),
		}
	}

	/// Compile the inclusion group `group` instead of `main`. Fragments that
	/// do not declare the group fall back to `main`.
	#[must_use]
	pub fn group(mut self, group: impl Into<String>) -> Self {
		self.group = group.into();
		self
	}

	pub fn xrefs(&self) -> &XrefCollection {
		&self.xrefs
	}

	/// Compose `fragment` and return its domain data only.
	pub fn compile(&mut self, fragment: &Value) -> WeaveResult<Value> {
		let mut stack = Vec::new();
		let composed = self.compose(fragment, &mut stack)?;
		Ok(finish(&composed))
	}

	/// Fetch the fragment `spec` points to and compose it.
	pub fn compile_xref(&mut self, spec: &XrefSpec) -> WeaveResult<Value> {
		let id = self.xrefs.parse(spec);
		let fragment = self.xrefs.resolve(id, self.resolvers, false)?.clone();
		let mut stack = vec![id];
		let composed = self.compose(&fragment, &mut stack)?;
		Ok(finish(&composed))
	}

	/// Returns `{ add, remove }`: the composed add-tree and the fragment's own
	/// removals, which also apply to earlier siblings when this fragment is
	/// folded into its includer.
	fn compose(&mut self, fragment: &Value, stack: &mut Vec<XrefId>) -> WeaveResult<Value> {
		let includes = self.includes(fragment)?;
		debug!(group = %self.group, includes = includes.len(), "composing fragment");

		let mut running = Value::Object(Map::new());

		for (name, spec) in includes {
			let id = self.xrefs.parse(&spec);
			if stack.contains(&id) {
				return Err(WeaveError::XrefCycle {
					location: spec.location,
				});
			}

			debug!(include = %name, %id, "folding include");
			let included = self.xrefs.resolve(id, self.resolvers, false)?.clone();

			stack.push(id);
			let child = self.compose(&included, stack)?;
			stack.pop();

			running = inherit(&child, &running);
		}

		let own = directives(fragment);
		let mut composed = inherit(&own, &running);
		if let (Value::Object(map), Some(removals)) = (&mut composed, own.get(REMOVE_KEY)) {
			map.insert(REMOVE_KEY.to_string(), removals.clone());
		}

		Ok(composed)
	}

	/// The `(name, spec)` pairs of the compiled group, in declared order.
	fn includes(&self, fragment: &Value) -> WeaveResult<Vec<(String, XrefSpec)>> {
		let Some(include) = fragment.get(INCLUDE_KEY) else {
			return Ok(Vec::new());
		};
		let Value::Object(include) = include else {
			return Err(WeaveError::InvalidInclude(
				"`include` must be a map".to_string(),
			));
		};

		let group = if include.contains_key(&self.group) {
			self.group.as_str()
		} else {
			DEFAULT_GROUP
		};
		let Some(order) = include.get(group) else {
			return Ok(Vec::new());
		};
		let Value::Array(order) = order else {
			return Err(WeaveError::InvalidInclude(format!(
				"`include.{group}` must be a list of names"
			)));
		};

		let empty = Map::new();
		let xrefs = match include.get(XREF_KEY) {
			Some(Value::Object(xrefs)) => xrefs,
			None => &empty,
			Some(_) => {
				return Err(WeaveError::InvalidInclude(
					"`include.xref` must be a map".to_string(),
				));
			}
		};

		order
			.iter()
			.map(|entry| {
				let Value::String(name) = entry else {
					return Err(WeaveError::InvalidInclude(format!(
						"inclusion list entries must be names, found `{entry}`"
					)));
				};
				let reference = xrefs
					.get(name)
					.ok_or_else(|| WeaveError::UnknownInclude {
						group: group.to_string(),
						name: name.clone(),
					})?;
				Ok((name.clone(), XrefSpec::from_value(reference)?))
			})
			.collect()
	}
}

/// The fragment's own directives as `{ add, remove }`. Without an explicit
/// `add`, every non-bookkeeping top-level key is an addition.
fn directives(fragment: &Value) -> Value {
	let mut directives = Map::new();

	let add = match fragment.get(ADD_KEY) {
		Some(add) => add.clone(),
		None => strip_bookkeeping(fragment),
	};
	directives.insert(ADD_KEY.to_string(), add);

	if let Some(remove) = fragment.get(REMOVE_KEY) {
		directives.insert(REMOVE_KEY.to_string(), remove.clone());
	}

	Value::Object(directives)
}

fn finish(composed: &Value) -> Value {
	let add = composed
		.get(ADD_KEY)
		.cloned()
		.unwrap_or_else(|| Value::Object(Map::new()));
	strip_bookkeeping(&add)
}
