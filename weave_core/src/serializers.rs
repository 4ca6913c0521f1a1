use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use serde_json::Value;

use crate::WeaveError;
use crate::WeaveResult;

/// Reads and writes trees in one content format.
pub trait TreeSerializer: fmt::Debug {
	/// Short format name used in messages, e.g. `json`.
	fn format(&self) -> &'static str;
	/// Content types this serializer answers to, lowercase.
	fn content_types(&self) -> &'static [&'static str];
	/// File suffixes (without the dot) this serializer answers to, lowercase.
	fn suffixes(&self) -> &'static [&'static str];
	fn serialize(&self, tree: &Value) -> WeaveResult<String>;
	fn deserialize(&self, content: &str, location: &str) -> WeaveResult<Value>;
}

/// Serializers looked up by content type or by file suffix.
#[derive(Debug, Default)]
pub struct TreeSerializerRegistry {
	serializers: Vec<Box<dyn TreeSerializer>>,
	by_content_type: HashMap<String, usize>,
	by_suffix: HashMap<String, usize>,
}

impl TreeSerializerRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// JSON, TOML, YAML, INI, KDL and plain text.
	pub fn with_builtins() -> Self {
		let mut registry = Self::new();
		let builtins: [Box<dyn TreeSerializer>; 6] = [
			Box::new(JsonSerializer),
			Box::new(TomlSerializer),
			Box::new(YamlSerializer),
			Box::new(IniSerializer),
			Box::new(KdlSerializer),
			Box::new(TextSerializer),
		];
		for serializer in builtins {
			// Builtin content types and suffixes never overlap.
			registry.insert(serializer);
		}
		registry
	}

	/// Register a serializer under all of its content types and suffixes.
	/// Nothing is registered if any of them is taken.
	pub fn register(&mut self, serializer: Box<dyn TreeSerializer>) -> WeaveResult<()> {
		let taken = serializer
			.content_types()
			.iter()
			.find(|content_type| self.by_content_type.contains_key(**content_type))
			.or_else(|| {
				serializer
					.suffixes()
					.iter()
					.find(|suffix| self.by_suffix.contains_key(**suffix))
			});

		if let Some(name) = taken {
			return Err(WeaveError::AlreadyRegistered {
				kind: "tree serializer",
				name: (*name).to_string(),
			});
		}

		self.insert(serializer);
		Ok(())
	}

	fn insert(&mut self, serializer: Box<dyn TreeSerializer>) {
		let position = self.serializers.len();
		for content_type in serializer.content_types() {
			self.by_content_type
				.insert((*content_type).to_string(), position);
		}
		for suffix in serializer.suffixes() {
			self.by_suffix.insert((*suffix).to_string(), position);
		}
		self.serializers.push(serializer);
	}

	/// Look up by declared content type. Case and MIME parameters (after `;`)
	/// are ignored.
	pub fn for_content_type(&self, content_type: &str) -> WeaveResult<&dyn TreeSerializer> {
		let normalized = normalize_content_type(content_type);
		self.by_content_type
			.get(&normalized)
			.map(|&position| self.serializers[position].as_ref())
			.ok_or(WeaveError::UnknownContentType(normalized))
	}

	pub fn for_suffix(&self, suffix: &str) -> WeaveResult<&dyn TreeSerializer> {
		let normalized = suffix.trim_start_matches('.').to_ascii_lowercase();
		self.by_suffix
			.get(&normalized)
			.map(|&position| self.serializers[position].as_ref())
			.ok_or(WeaveError::UnknownContentType(normalized))
	}

	/// Pick a serializer from an explicit content type when given, otherwise
	/// from the suffix of `location`.
	pub fn detect(
		&self,
		content_type: Option<&str>,
		location: &str,
	) -> WeaveResult<&dyn TreeSerializer> {
		if let Some(content_type) = content_type {
			return self.for_content_type(content_type);
		}

		let suffix = location_suffix(location)
			.ok_or_else(|| WeaveError::UnknownContentType(location.to_string()))?;
		self.for_suffix(suffix)
	}
}

fn normalize_content_type(content_type: &str) -> String {
	content_type
		.split(';')
		.next()
		.unwrap_or_default()
		.trim()
		.to_ascii_lowercase()
}

/// Suffix of the last path segment, ignoring any query string or fragment.
pub(crate) fn location_suffix(location: &str) -> Option<&str> {
	let path = location
		.split(['?', '#'])
		.next()
		.unwrap_or(location);
	Path::new(path).extension().and_then(|e| e.to_str())
}

fn syntax_error(format: &'static str, location: &str, reason: impl fmt::Display) -> WeaveError {
	WeaveError::TreeSyntax {
		format,
		location: location.to_string(),
		reason: reason.to_string(),
	}
}

fn serialize_error(format: &'static str, reason: impl fmt::Display) -> WeaveError {
	WeaveError::TreeSerialize {
		format,
		reason: reason.to_string(),
	}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl TreeSerializer for JsonSerializer {
	fn format(&self) -> &'static str {
		"json"
	}

	fn content_types(&self) -> &'static [&'static str] {
		&["json", "application/json", "text/json"]
	}

	fn suffixes(&self) -> &'static [&'static str] {
		&["json"]
	}

	fn serialize(&self, tree: &Value) -> WeaveResult<String> {
		serde_json::to_string_pretty(tree).map_err(|e| serialize_error("json", e))
	}

	fn deserialize(&self, content: &str, location: &str) -> WeaveResult<Value> {
		serde_json::from_str(content).map_err(|e| syntax_error("json", location, e))
	}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TomlSerializer;

impl TreeSerializer for TomlSerializer {
	fn format(&self) -> &'static str {
		"toml"
	}

	fn content_types(&self) -> &'static [&'static str] {
		&["toml", "application/toml"]
	}

	fn suffixes(&self) -> &'static [&'static str] {
		&["toml"]
	}

	fn serialize(&self, tree: &Value) -> WeaveResult<String> {
		toml::to_string(tree).map_err(|e| serialize_error("toml", e))
	}

	fn deserialize(&self, content: &str, location: &str) -> WeaveResult<Value> {
		let value: toml::Value =
			toml::from_str(content).map_err(|e| syntax_error("toml", location, e))?;
		toml_to_json(value, location)
	}
}

/// Convert a `toml::Value` to a `serde_json::Value`.
fn toml_to_json(value: toml::Value, location: &str) -> WeaveResult<Value> {
	let json = match value {
		toml::Value::String(s) => Value::String(s),
		toml::Value::Integer(i) => Value::from(i),
		toml::Value::Float(f) => {
			Value::Number(
				serde_json::Number::from_f64(f)
					.ok_or_else(|| syntax_error("toml", location, format!("unconvertible float {f}")))?,
			)
		}
		toml::Value::Boolean(b) => Value::Bool(b),
		toml::Value::Datetime(dt) => Value::String(dt.to_string()),
		toml::Value::Array(arr) => {
			let items: WeaveResult<Vec<Value>> = arr
				.into_iter()
				.map(|v| toml_to_json(v, location))
				.collect();
			Value::Array(items?)
		}
		toml::Value::Table(table) => {
			let mut map = serde_json::Map::new();
			for (k, v) in table {
				map.insert(k, toml_to_json(v, location)?);
			}
			Value::Object(map)
		}
	};

	Ok(json)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct YamlSerializer;

impl TreeSerializer for YamlSerializer {
	fn format(&self) -> &'static str {
		"yaml"
	}

	fn content_types(&self) -> &'static [&'static str] {
		&[
			"yaml",
			"yml",
			"application/yaml",
			"application/x-yaml",
			"text/yaml",
		]
	}

	fn suffixes(&self) -> &'static [&'static str] {
		&["yaml", "yml"]
	}

	fn serialize(&self, tree: &Value) -> WeaveResult<String> {
		serde_yaml_ng::to_string(tree).map_err(|e| serialize_error("yaml", e))
	}

	fn deserialize(&self, content: &str, location: &str) -> WeaveResult<Value> {
		serde_yaml_ng::from_str(content).map_err(|e| syntax_error("yaml", location, e))
	}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IniSerializer;

impl TreeSerializer for IniSerializer {
	fn format(&self) -> &'static str {
		"ini"
	}

	fn content_types(&self) -> &'static [&'static str] {
		&["ini", "text/ini"]
	}

	fn suffixes(&self) -> &'static [&'static str] {
		&["ini"]
	}

	fn serialize(&self, tree: &Value) -> WeaveResult<String> {
		serde_ini::to_string(tree).map_err(|e| serialize_error("ini", e))
	}

	fn deserialize(&self, content: &str, location: &str) -> WeaveResult<Value> {
		serde_ini::from_str(content).map_err(|e| syntax_error("ini", location, e))
	}
}

/// KDL documents can be read but not written.
#[derive(Debug, Clone, Copy, Default)]
pub struct KdlSerializer;

impl TreeSerializer for KdlSerializer {
	fn format(&self) -> &'static str {
		"kdl"
	}

	fn content_types(&self) -> &'static [&'static str] {
		&["kdl", "application/kdl"]
	}

	fn suffixes(&self) -> &'static [&'static str] {
		&["kdl"]
	}

	fn serialize(&self, _tree: &Value) -> WeaveResult<String> {
		Err(serialize_error("kdl", "writing kdl is not supported"))
	}

	fn deserialize(&self, content: &str, location: &str) -> WeaveResult<Value> {
		let doc: kdl::KdlDocument = content
			.parse()
			.map_err(|e: kdl::KdlError| syntax_error("kdl", location, e))?;
		kdl_document_to_value(&doc, location)
	}
}

/// Every top-level node becomes a key of one map.
fn kdl_document_to_value(doc: &kdl::KdlDocument, location: &str) -> WeaveResult<Value> {
	doc.nodes()
		.iter()
		.map(|node| Ok((node.name().value().to_string(), kdl_node_to_value(node, location)?)))
		.collect::<WeaveResult<serde_json::Map<_, _>>>()
		.map(Value::Object)
}

/// The value of one node, by shape:
///
/// ```kdl
/// server { port 80 }     // children: a map
/// name "ada"             // one argument: a scalar
/// limits cpu=2 mem=512   // only properties: a map
/// hosts "a" "b"          // several arguments: a list
/// flag                   // nothing: null
/// ```
///
/// Arguments mixed with properties give a list in which each property is a
/// one-key map.
fn kdl_node_to_value(node: &kdl::KdlNode, location: &str) -> WeaveResult<Value> {
	if let Some(children) = node.children() {
		return kdl_document_to_value(children, location);
	}

	let mut arguments = Vec::new();
	let mut properties = serde_json::Map::new();
	let mut in_order = Vec::new();

	for entry in node.entries() {
		let value = kdl_scalar(entry.value(), location)?;
		if let Some(name) = entry.name() {
			let key = name.value().to_string();
			let mut property = serde_json::Map::new();
			property.insert(key.clone(), value.clone());
			in_order.push(Value::Object(property));
			properties.insert(key, value);
		} else {
			in_order.push(value.clone());
			arguments.push(value);
		}
	}

	let value = match (arguments.len(), properties.is_empty()) {
		(0, true) => Value::Null,
		(0, false) => Value::Object(properties),
		(1, true) => arguments.swap_remove(0),
		(_, true) => Value::Array(arguments),
		(_, false) => Value::Array(in_order),
	};
	Ok(value)
}

fn kdl_scalar(value: &kdl::KdlValue, location: &str) -> WeaveResult<Value> {
	let number = |number: Option<serde_json::Number>, shown: String| {
		number
			.map(Value::Number)
			.ok_or_else(|| syntax_error("kdl", location, format!("`{shown}` is not a JSON number")))
	};

	match value {
		kdl::KdlValue::Null => Ok(Value::Null),
		kdl::KdlValue::Bool(flag) => Ok(Value::Bool(*flag)),
		kdl::KdlValue::String(text) => Ok(Value::String(text.clone())),
		// Integers beyond i64 fall back to the nearest float.
		kdl::KdlValue::Integer(integer) => {
			match i64::try_from(*integer) {
				Ok(small) => Ok(Value::from(small)),
				Err(_) => number(serde_json::Number::from_f64(*integer as f64), integer.to_string()),
			}
		}
		kdl::KdlValue::Float(float) => number(serde_json::Number::from_f64(*float), float.to_string()),
	}
}

/// The whole content as a single string value.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextSerializer;

impl TreeSerializer for TextSerializer {
	fn format(&self) -> &'static str {
		"text"
	}

	fn content_types(&self) -> &'static [&'static str] {
		&["text", "txt", "raw", "string", "text/plain"]
	}

	fn suffixes(&self) -> &'static [&'static str] {
		&["txt"]
	}

	fn serialize(&self, tree: &Value) -> WeaveResult<String> {
		match tree {
			Value::String(s) => Ok(s.clone()),
			other => Ok(other.to_string()),
		}
	}

	fn deserialize(&self, content: &str, _location: &str) -> WeaveResult<Value> {
		Ok(Value::String(content.to_string()))
	}
}
