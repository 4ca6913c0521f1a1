use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::Hash;
use std::hash::Hasher;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::FetcherRegistry;
use crate::TreeSerializerRegistry;
use crate::WeaveError;
use crate::WeaveResult;
use crate::fetchers::FILE_XREF;

/// Deterministic identity of an xref: a hash of its type and normalized
/// location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct XrefId(u64);

impl XrefId {
	pub fn new(kind: &str, location: &str) -> Self {
		let mut hasher = DefaultHasher::new();
		kind.hash(&mut hasher);
		normalize_location(kind, location).hash(&mut hasher);
		Self(hasher.finish())
	}
}

impl fmt::Display for XrefId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{:016x}", self.0)
	}
}

/// Locations differing only in surrounding whitespace, path separator style,
/// or a leading `./` name the same file.
fn normalize_location(kind: &str, location: &str) -> String {
	let location = location.trim();
	if kind != FILE_XREF {
		return location.to_string();
	}

	let normalized = location.replace('\\', "/");
	let mut normalized = normalized.as_str();
	while let Some(rest) = normalized.strip_prefix("./") {
		normalized = rest;
	}
	normalized.to_string()
}

/// A declared reference, as written in `include.xref`.
///
/// ```json
/// { "type": "file", "location": "base.json", "content_type": "json" }
/// ```
///
/// A bare string is shorthand for a `file` reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XrefSpec {
	#[serde(rename = "type", default = "default_kind")]
	pub kind: String,
	pub location: String,
	#[serde(default, alias = "content-type")]
	pub content_type: Option<String>,
}

fn default_kind() -> String {
	FILE_XREF.to_string()
}

impl XrefSpec {
	pub fn new(kind: impl Into<String>, location: impl Into<String>) -> Self {
		Self {
			kind: kind.into(),
			location: location.into(),
			content_type: None,
		}
	}

	pub fn file(location: impl Into<String>) -> Self {
		Self::new(FILE_XREF, location)
	}

	#[must_use]
	pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
		self.content_type = Some(content_type.into());
		self
	}

	pub fn from_value(value: &Value) -> WeaveResult<Self> {
		match value {
			Value::String(location) => Ok(Self::file(location.clone())),
			Value::Object(_) => {
				serde_json::from_value(value.clone())
					.map_err(|e| WeaveError::InvalidInclude(format!("invalid xref: {e}")))
			}
			other => {
				Err(WeaveError::InvalidInclude(format!(
					"an xref must be a string or a map, found `{other}`"
				)))
			}
		}
	}

	pub fn id(&self) -> XrefId {
		XrefId::new(&self.kind, &self.location)
	}
}

/// Fetchers and serializers used to resolve xrefs.
#[derive(Debug, Default)]
pub struct XrefResolvers {
	pub fetchers: FetcherRegistry,
	pub serializers: TreeSerializerRegistry,
}

impl XrefResolvers {
	pub fn new(fetchers: FetcherRegistry, serializers: TreeSerializerRegistry) -> Self {
		Self {
			fetchers,
			serializers,
		}
	}

	/// Builtin fetchers rooted at `root` with the builtin serializers.
	pub fn with_builtins(root: impl Into<PathBuf>) -> Self {
		Self::new(
			FetcherRegistry::with_builtins(root),
			TreeSerializerRegistry::with_builtins(),
		)
	}
}

/// A typed, located, lazily fetched tree.
#[derive(Debug, Clone)]
pub struct Xref {
	id: XrefId,
	kind: String,
	location: String,
	content_type: Option<String>,
	data: Option<Value>,
	resolved: bool,
}

impl Xref {
	pub fn new(kind: impl Into<String>, location: impl Into<String>) -> Self {
		let kind = kind.into();
		let location = location.into();
		Self {
			id: XrefId::new(&kind, &location),
			kind,
			location,
			content_type: None,
			data: None,
			resolved: false,
		}
	}

	pub fn from_spec(spec: &XrefSpec) -> Self {
		let mut xref = Self::new(spec.kind.clone(), spec.location.clone());
		xref.content_type.clone_from(&spec.content_type);
		xref
	}

	pub fn id(&self) -> XrefId {
		self.id
	}

	pub fn kind(&self) -> &str {
		&self.kind
	}

	pub fn location(&self) -> &str {
		&self.location
	}

	/// The declared content type, or the inferred one once resolved.
	pub fn content_type(&self) -> Option<&str> {
		self.content_type.as_deref()
	}

	pub fn data(&self) -> Option<&Value> {
		self.data.as_ref()
	}

	pub fn is_resolved(&self) -> bool {
		self.resolved
	}

	/// Fetch and deserialize the tree. Does nothing when already resolved
	/// unless `force` is set.
	pub fn resolve(&mut self, resolvers: &XrefResolvers, force: bool) -> WeaveResult<&Value> {
		if force || !self.resolved || self.data.is_none() {
			self.load(resolvers)?;
		}

		self.data
			.as_ref()
			.ok_or_else(|| WeaveError::UnknownXref(self.id.to_string()))
	}

	fn load(&mut self, resolvers: &XrefResolvers) -> WeaveResult<()> {
		debug!(id = %self.id, kind = %self.kind, location = %self.location, "fetching xref");
		let fetcher = resolvers.fetchers.get(&self.kind)?;
		let fetched = fetcher.fetch(&self.location)?;

		let content_type = self.content_type.clone().or(fetched.content_type);
		let serializer = resolvers
			.serializers
			.detect(content_type.as_deref(), &self.location)?;

		let content = String::from_utf8(fetched.content).map_err(|e| {
			WeaveError::TreeSyntax {
				format: serializer.format(),
				location: self.location.clone(),
				reason: e.to_string(),
			}
		})?;
		let value = serializer.deserialize(&content, &self.location)?;

		if self.content_type.is_none() {
			self.content_type = Some(serializer.format().to_string());
		}
		self.data = Some(value);
		self.resolved = true;

		Ok(())
	}
}

/// Registry of xrefs keyed by identity, so every distinct reference is
/// fetched at most once in a compile pass.
#[derive(Debug, Default)]
pub struct XrefCollection {
	xrefs: Vec<Xref>,
	index: HashMap<XrefId, usize>,
}

impl XrefCollection {
	pub fn new() -> Self {
		Self::default()
	}

	/// Add `xref` unless an xref with the same identity exists. The first
	/// registration wins, even if the later one declares other metadata.
	pub fn add(&mut self, xref: Xref) -> XrefId {
		let id = xref.id();
		if self.index.contains_key(&id) {
			debug!(%id, location = xref.location(), "xref already registered");
			return id;
		}

		self.index.insert(id, self.xrefs.len());
		self.xrefs.push(xref);
		id
	}

	/// Register the xref a spec describes, reusing a cached one with the same
	/// identity.
	pub fn parse(&mut self, spec: &XrefSpec) -> XrefId {
		let id = spec.id();
		if self.index.contains_key(&id) {
			return id;
		}
		self.add(Xref::from_spec(spec))
	}

	/// Like [`XrefCollection::parse`] for a raw `include.xref` entry.
	pub fn parse_value(&mut self, value: &Value) -> WeaveResult<XrefId> {
		Ok(self.parse(&XrefSpec::from_value(value)?))
	}

	pub fn get(&self, id: XrefId) -> Option<&Xref> {
		self.index.get(&id).map(|&position| &self.xrefs[position])
	}

	pub fn get_mut(&mut self, id: XrefId) -> Option<&mut Xref> {
		self.index
			.get(&id)
			.map(|&position| &mut self.xrefs[position])
	}

	pub fn contains(&self, id: XrefId) -> bool {
		self.index.contains_key(&id)
	}

	/// Resolve the xref registered under `id`.
	pub fn resolve(
		&mut self,
		id: XrefId,
		resolvers: &XrefResolvers,
		force: bool,
	) -> WeaveResult<&Value> {
		let xref = self
			.get_mut(id)
			.ok_or_else(|| WeaveError::UnknownXref(id.to_string()))?;
		xref.resolve(resolvers, force)
	}

	pub fn iter(&self) -> impl Iterator<Item = &Xref> {
		self.xrefs.iter()
	}

	pub fn len(&self) -> usize {
		self.xrefs.len()
	}

	pub fn is_empty(&self) -> bool {
		self.xrefs.is_empty()
	}
}
