use std::collections::HashMap;
use std::fmt;

use serde_json::Value;
use thiserror::Error;
use tracing::trace;

use crate::WeaveError;
use crate::WeaveResult;

pub const DEFAULT_SCOPE_NAME_DELIMITER: &str = ":";
pub const DEFAULT_SCOPE_LEVEL_DELIMITER: &str = ".";

/// Produces the unfiltered value for a token's logical name.
#[derive(Debug)]
#[non_exhaustive]
pub enum TokenResolver {
	Registered(RegisteredResolver),
	Scope(ScopeResolver),
	OnDemand(OnDemandResolver),
}

impl TokenResolver {
	/// Look up `name`. When the name is unknown and `ignore_unknown` is set,
	/// `default` is returned; `Ok(None)` leaves the token unresolved.
	pub fn value_for(
		&mut self,
		name: &str,
		ignore_unknown: bool,
		default: Option<&str>,
	) -> WeaveResult<Option<String>> {
		match self {
			Self::Registered(resolver) => resolver.value_for(name, ignore_unknown, default),
			Self::Scope(resolver) => resolver.value_for(name, ignore_unknown, default),
			Self::OnDemand(resolver) => resolver.value_for(name, ignore_unknown, default),
		}
	}
}

impl From<RegisteredResolver> for TokenResolver {
	fn from(resolver: RegisteredResolver) -> Self {
		Self::Registered(resolver)
	}
}

impl From<ScopeResolver> for TokenResolver {
	fn from(resolver: ScopeResolver) -> Self {
		Self::Scope(resolver)
	}
}

impl From<OnDemandResolver> for TokenResolver {
	fn from(resolver: OnDemandResolver) -> Self {
		Self::OnDemand(resolver)
	}
}

/// A flat name to value map.
#[derive(Debug, Clone, Default)]
pub struct RegisteredResolver {
	values: HashMap<String, String>,
}

impl RegisteredResolver {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_values<K, V>(values: impl IntoIterator<Item = (K, V)>) -> Self
	where
		K: Into<String>,
		V: Into<String>,
	{
		Self {
			values: values
				.into_iter()
				.map(|(name, value)| (name.into(), value.into()))
				.collect(),
		}
	}

	/// Set a value, replacing and returning any previous one.
	pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
		self.values.insert(name.into(), value.into())
	}

	/// Add a value that must not already exist.
	pub fn register(&mut self, name: impl Into<String>, value: impl Into<String>) -> WeaveResult<()> {
		let name = name.into();
		if self.values.contains_key(&name) {
			return Err(WeaveError::AlreadyRegistered {
				kind: "token value",
				name,
			});
		}
		self.values.insert(name, value.into());
		Ok(())
	}

	pub fn get(&self, name: &str) -> Option<&str> {
		self.values.get(name).map(String::as_str)
	}

	pub fn contains(&self, name: &str) -> bool {
		self.values.contains_key(name)
	}

	pub fn len(&self) -> usize {
		self.values.len()
	}

	pub fn is_empty(&self) -> bool {
		self.values.is_empty()
	}

	pub fn value_for(
		&self,
		name: &str,
		ignore_unknown: bool,
		default: Option<&str>,
	) -> WeaveResult<Option<String>> {
		match self.values.get(name) {
			Some(value) => Ok(Some(value.clone())),
			None if ignore_unknown => Ok(default.map(str::to_string)),
			None => Err(WeaveError::UnknownToken(name.to_string())),
		}
	}
}

/// Reason a scope value could not be turned into a string.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ValueSerializationError(pub String);

/// Turns a resolved scope value into injectable text.
pub trait ValueSerializer: fmt::Debug {
	fn serialize(&self, value: &Value, escape: bool) -> Result<String, ValueSerializationError>;
}

/// Strings pass through (JSON-quoted when escaping); booleans, numbers, lists
/// and maps are JSON-encoded. `null` has no text form.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonValueSerializer;

impl ValueSerializer for JsonValueSerializer {
	fn serialize(&self, value: &Value, escape: bool) -> Result<String, ValueSerializationError> {
		match value {
			Value::Null => {
				Err(ValueSerializationError(
					"null has no string representation".to_string(),
				))
			}
			Value::String(string) if !escape => Ok(string.clone()),
			other => {
				serde_json::to_string(other).map_err(|e| ValueSerializationError(e.to_string()))
			}
		}
	}
}

/// Scalars only. Strings are shell-quoted when escaping.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainValueSerializer;

impl ValueSerializer for PlainValueSerializer {
	fn serialize(&self, value: &Value, escape: bool) -> Result<String, ValueSerializationError> {
		match value {
			Value::String(string) if escape => Ok(snailquote::escape(string).into_owned()),
			Value::String(string) => Ok(string.clone()),
			Value::Bool(flag) => Ok(flag.to_string()),
			Value::Number(number) => Ok(number.to_string()),
			Value::Null => {
				Err(ValueSerializationError(
					"null has no string representation".to_string(),
				))
			}
			Value::Array(_) | Value::Object(_) => {
				Err(ValueSerializationError(
					"lists and maps are not plain values".to_string(),
				))
			}
		}
	}
}

/// Resolves `scope_name:dotted.path` tokens by walking a nested structure.
#[derive(Debug)]
pub struct ScopeResolver {
	scope_name: String,
	name_delimiter: String,
	level_delimiter: String,
	scope: Value,
	serializer: Box<dyn ValueSerializer>,
	ignore_out_of_scope: bool,
	escape: bool,
}

impl ScopeResolver {
	pub fn new(scope_name: impl Into<String>, scope: Value) -> Self {
		Self {
			scope_name: scope_name.into(),
			name_delimiter: DEFAULT_SCOPE_NAME_DELIMITER.to_string(),
			level_delimiter: DEFAULT_SCOPE_LEVEL_DELIMITER.to_string(),
			scope,
			serializer: Box::new(JsonValueSerializer),
			ignore_out_of_scope: false,
			escape: false,
		}
	}

	#[must_use]
	pub fn name_delimiter(mut self, delimiter: impl Into<String>) -> Self {
		self.name_delimiter = delimiter.into();
		self
	}

	#[must_use]
	pub fn level_delimiter(mut self, delimiter: impl Into<String>) -> Self {
		self.level_delimiter = delimiter.into();
		self
	}

	#[must_use]
	pub fn serializer(mut self, serializer: impl ValueSerializer + 'static) -> Self {
		self.serializer = Box::new(serializer);
		self
	}

	#[must_use]
	pub fn ignore_out_of_scope(mut self, ignore: bool) -> Self {
		self.ignore_out_of_scope = ignore;
		self
	}

	#[must_use]
	pub fn escape(mut self, escape: bool) -> Self {
		self.escape = escape;
		self
	}

	pub fn scope(&self) -> &Value {
		&self.scope
	}

	pub fn value_for(
		&self,
		name: &str,
		ignore_unknown: bool,
		default: Option<&str>,
	) -> WeaveResult<Option<String>> {
		let prefix = format!("{}{}", self.scope_name, self.name_delimiter);
		let Some(path) = name.strip_prefix(&prefix) else {
			if ignore_unknown {
				return Ok(default.map(str::to_string));
			}
			return Err(WeaveError::UnknownToken(name.to_string()));
		};

		let mut segments: Vec<&str> = if self.level_delimiter.is_empty() {
			vec![path]
		} else {
			path.split(self.level_delimiter.as_str()).collect()
		};
		while segments.last().is_some_and(|segment| segment.is_empty()) {
			segments.pop();
		}

		if segments.is_empty() {
			return Err(WeaveError::TokenFormat {
				token: name.to_string(),
				reason: format!("expected a path after `{prefix}`"),
			});
		}

		let Some(value) = lookup(&self.scope, &segments) else {
			trace!(token = name, "scope path missing");
			if self.ignore_out_of_scope {
				return Ok(default.map(str::to_string));
			}
			return Err(WeaveError::OutOfScope {
				token: name.to_string(),
				path: segments.join(self.level_delimiter.as_str()),
			});
		};

		self.serializer
			.serialize(value, self.escape)
			.map(Some)
			.map_err(|e| {
				WeaveError::ScopeTokenValueSerialization {
					token: name.to_string(),
					reason: e.to_string(),
				}
			})
	}
}

/// Walk `segments` through maps by key and lists by index.
fn lookup<'a>(scope: &'a Value, segments: &[&str]) -> Option<&'a Value> {
	segments.iter().try_fold(scope, |current, segment| {
		match current {
			Value::Object(map) => map.get(*segment),
			Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
			_ => None,
		}
	})
}

/// A question put to an on-demand [`ValueSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueQuery<'a> {
	/// Does the source know this name?
	IsKnown(&'a str),
	/// The value for this name.
	ValueFor(&'a str),
	/// Does the source have any values at all?
	HasValues,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueAnswer {
	/// The source has nothing to say.
	Unanswered,
	Flag(bool),
	Value(String),
}

/// Host-supplied values, queried lazily by [`OnDemandResolver`].
pub trait ValueSource {
	fn query(&mut self, query: ValueQuery<'_>) -> ValueAnswer;
}

impl<F> ValueSource for F
where
	F: FnMut(ValueQuery<'_>) -> ValueAnswer,
{
	fn query(&mut self, query: ValueQuery<'_>) -> ValueAnswer {
		self(query)
	}
}

/// Answers from process environment variables. Only names starting with
/// `prefix` are looked up, with the prefix stripped.
#[derive(Debug, Clone, Default)]
pub struct EnvValueSource {
	prefix: String,
}

impl EnvValueSource {
	pub fn new(prefix: impl Into<String>) -> Self {
		Self {
			prefix: prefix.into(),
		}
	}

	fn variable<'a>(&self, name: &'a str) -> Option<&'a str> {
		name.strip_prefix(self.prefix.as_str())
			.filter(|variable| !variable.is_empty())
	}
}

impl ValueSource for EnvValueSource {
	fn query(&mut self, query: ValueQuery<'_>) -> ValueAnswer {
		match query {
			ValueQuery::HasValues => ValueAnswer::Flag(true),
			ValueQuery::IsKnown(name) => {
				ValueAnswer::Flag(
					self.variable(name)
						.is_some_and(|variable| std::env::var_os(variable).is_some()),
				)
			}
			ValueQuery::ValueFor(name) => {
				self.variable(name)
					.and_then(|variable| std::env::var(variable).ok())
					.map_or(ValueAnswer::Unanswered, ValueAnswer::Value)
			}
		}
	}
}

/// Asks a [`ValueSource`] for names missing from its own registry, caching
/// every answer there unless told not to.
pub struct OnDemandResolver {
	registered: RegisteredResolver,
	source: Option<Box<dyn ValueSource>>,
	remember: bool,
}

impl fmt::Debug for OnDemandResolver {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("OnDemandResolver")
			.field("registered", &self.registered)
			.field("source", &self.source.is_some())
			.field("remember", &self.remember)
			.finish()
	}
}

impl OnDemandResolver {
	/// A resolver with no source; behaves like an empty
	/// [`RegisteredResolver`].
	pub fn new() -> Self {
		Self {
			registered: RegisteredResolver::new(),
			source: None,
			remember: true,
		}
	}

	pub fn with_source(source: impl ValueSource + 'static) -> Self {
		Self {
			registered: RegisteredResolver::new(),
			source: Some(Box::new(source)),
			remember: true,
		}
	}

	/// Layer over existing registered values, which take precedence over the
	/// source.
	#[must_use]
	pub fn registered(mut self, registered: RegisteredResolver) -> Self {
		self.registered = registered;
		self
	}

	/// Whether answers from the source are kept in the registry. When off,
	/// every lookup of a name missing from the registry asks the source again.
	#[must_use]
	pub fn remember_answers(mut self, remember: bool) -> Self {
		self.remember = remember;
		self
	}

	pub fn cached(&self) -> &RegisteredResolver {
		&self.registered
	}

	pub fn value_for(
		&mut self,
		name: &str,
		ignore_unknown: bool,
		default: Option<&str>,
	) -> WeaveResult<Option<String>> {
		if let Some(value) = self.registered.get(name) {
			return Ok(Some(value.to_string()));
		}

		if let Some(source) = self.source.as_mut() {
			let has_values = source.query(ValueQuery::HasValues) != ValueAnswer::Flag(false);
			let known = has_values
				&& source.query(ValueQuery::IsKnown(name)) != ValueAnswer::Flag(false);

			if known {
				if let ValueAnswer::Value(value) = source.query(ValueQuery::ValueFor(name)) {
					trace!(token = name, "value supplied on demand");
					if self.remember {
						self.registered.set(name, value.clone());
					}
					return Ok(Some(value));
				}
			}
		}

		self.registered.value_for(name, ignore_unknown, default)
	}
}

impl Default for OnDemandResolver {
	fn default() -> Self {
		Self::new()
	}
}
