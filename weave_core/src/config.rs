use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::CommandFetcher;
use crate::EnvValueSource;
use crate::Fetcher;
use crate::FileFetcher;
use crate::JsonValueSerializer;
use crate::OnDemandResolver;
use crate::PlainValueSerializer;
use crate::RegisteredResolver;
use crate::Renderer;
use crate::ResolveOptions;
use crate::ScopeResolver;
use crate::TokenParser;
use crate::TokenPattern;
use crate::TokenResolver;
use crate::TreeSerializerRegistry;
use crate::WeaveError;
use crate::WeaveResult;
use crate::compiler::DEFAULT_GROUP;
use crate::parser::DEFAULT_FILTER_DELIMITER;
use crate::parser::DEFAULT_PREFIX;
use crate::parser::DEFAULT_SUFFIX;
use crate::resolver::DEFAULT_SCOPE_LEVEL_DELIMITER;
use crate::resolver::DEFAULT_SCOPE_NAME_DELIMITER;

/// Supported config file locations in discovery order (highest precedence
/// first).
pub const CONFIG_FILE_CANDIDATES: [&str; 3] = ["weave.toml", ".weave.toml", ".config/weave.toml"];

/// Where scope data comes from.
///
/// A bare path picks the format from the file extension:
///
/// ```toml
/// [scope]
/// source = "settings.json"
/// ```
///
/// Typed entries name the format explicitly:
///
/// ```toml
/// [scope]
/// source = { path = "settings", format = "yaml" }
/// ```
///
/// Script entries parse the standard output of a command run in the project
/// root. The format defaults to `json`:
///
/// ```toml
/// [scope]
/// source = { command = "cat settings.json" }
/// ```
#[derive(Debug, Clone, Deserialize, Eq, PartialEq)]
#[serde(untagged)]
#[non_exhaustive]
pub enum DataSource {
	Path(PathBuf),
	Typed(TypedDataSource),
	Script(ScriptDataSource),
}

impl DataSource {
	pub fn path(&self) -> Option<&Path> {
		match self {
			Self::Path(path) => Some(path.as_path()),
			Self::Typed(typed) => Some(typed.path.as_path()),
			Self::Script(_) => None,
		}
	}

	pub fn format(&self) -> Option<&str> {
		match self {
			Self::Path(_) => None,
			Self::Typed(typed) => Some(typed.format.as_str()),
			Self::Script(script) => script.format.as_deref(),
		}
	}

	pub fn command(&self) -> Option<&str> {
		match self {
			Self::Script(script) => Some(script.command.as_str()),
			_ => None,
		}
	}

	/// Fetch and parse the source relative to `root`.
	pub fn load(&self, root: &Path, serializers: &TreeSerializerRegistry) -> WeaveResult<Value> {
		let (location, fetched, format) = match self {
			Self::Path(path) => {
				let location = path.to_string_lossy().into_owned();
				let fetched = FileFetcher::new(root).fetch(&location)?;
				(location, fetched, None)
			}
			Self::Typed(typed) => {
				let location = typed.path.to_string_lossy().into_owned();
				let fetched = FileFetcher::new(root).fetch(&location)?;
				(location, fetched, Some(typed.format.trim()))
			}
			Self::Script(script) => {
				let fetched = CommandFetcher::new(root).fetch(&script.command)?;
				let format = script
					.format
					.as_deref()
					.map(str::trim)
					.filter(|format| !format.is_empty())
					.unwrap_or("json");
				(script.command.clone(), fetched, Some(format))
			}
		};

		let serializer = serializers.detect(format, &location)?;
		let content = String::from_utf8(fetched.content).map_err(|e| {
			WeaveError::TreeSyntax {
				format: serializer.format(),
				location: location.clone(),
				reason: e.to_string(),
			}
		})?;

		debug!(location = %location, format = serializer.format(), "loaded data source");
		serializer.deserialize(&content, &location)
	}
}

#[derive(Debug, Clone, Deserialize, Eq, PartialEq)]
pub struct TypedDataSource {
	pub path: PathBuf,
	pub format: String,
}

#[derive(Debug, Clone, Deserialize, Eq, PartialEq)]
pub struct ScriptDataSource {
	pub command: String,
	#[serde(default)]
	pub format: Option<String>,
}

/// Configuration loaded from a `weave.toml` file.
///
/// ```toml
/// [tokens]
/// prefix = "{{"
/// suffix = "}}"
/// ignore_unknown = false
///
/// [values]
/// name = "ada"
///
/// [scope]
/// name = "cfg"
/// source = "settings.json"
///
/// [env]
/// enabled = true
/// prefix = "env."
///
/// [compile]
/// group = "release"
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct WeaveConfig {
	#[serde(default)]
	pub tokens: TokensConfig,
	/// Values for the registered resolver. Scalars are written as text.
	#[serde(default)]
	pub values: BTreeMap<String, Value>,
	/// Enables the scope resolver when present.
	#[serde(default)]
	pub scope: Option<ScopeConfig>,
	#[serde(default)]
	pub env: EnvConfig,
	#[serde(default)]
	pub compile: CompileConfig,
}

/// How placeholders are recognized and how misses are treated.
#[derive(Debug, Clone, Deserialize)]
pub struct TokensConfig {
	#[serde(default = "default_prefix")]
	pub prefix: String,
	#[serde(default = "default_suffix")]
	pub suffix: String,
	/// A raw regular expression taking precedence over `prefix` and `suffix`.
	#[serde(default)]
	pub pattern: Option<String>,
	#[serde(default = "default_filter_delimiter")]
	pub filter_delimiter: String,
	#[serde(default = "default_true")]
	pub ignore_unknown: bool,
	#[serde(default = "default_true")]
	pub ignore_unknown_filters: bool,
	/// Value for ignored unknown tokens. Without one they stay in place.
	#[serde(default)]
	pub default: Option<String>,
	#[serde(default)]
	pub check_hash: bool,
}

impl Default for TokensConfig {
	fn default() -> Self {
		Self {
			prefix: default_prefix(),
			suffix: default_suffix(),
			pattern: None,
			filter_delimiter: default_filter_delimiter(),
			ignore_unknown: true,
			ignore_unknown_filters: true,
			default: None,
			check_hash: false,
		}
	}
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ScopeSerializer {
	#[default]
	Json,
	Plain,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScopeConfig {
	pub name: String,
	#[serde(default = "default_name_delimiter")]
	pub name_delimiter: String,
	#[serde(default = "default_level_delimiter")]
	pub level_delimiter: String,
	#[serde(default)]
	pub ignore_out_of_scope: bool,
	#[serde(default)]
	pub escape: bool,
	#[serde(default)]
	pub serializer: ScopeSerializer,
	#[serde(default)]
	pub source: Option<DataSource>,
	/// Inline scope data, used when no `source` is set.
	#[serde(default)]
	pub data: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnvConfig {
	#[serde(default)]
	pub enabled: bool,
	#[serde(default)]
	pub prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompileConfig {
	#[serde(default = "default_group")]
	pub group: String,
}

impl Default for CompileConfig {
	fn default() -> Self {
		Self {
			group: default_group(),
		}
	}
}

fn default_prefix() -> String {
	DEFAULT_PREFIX.to_string()
}

fn default_suffix() -> String {
	DEFAULT_SUFFIX.to_string()
}

fn default_filter_delimiter() -> String {
	DEFAULT_FILTER_DELIMITER.to_string()
}

fn default_name_delimiter() -> String {
	DEFAULT_SCOPE_NAME_DELIMITER.to_string()
}

fn default_level_delimiter() -> String {
	DEFAULT_SCOPE_LEVEL_DELIMITER.to_string()
}

fn default_group() -> String {
	DEFAULT_GROUP.to_string()
}

fn default_true() -> bool {
	true
}

impl WeaveConfig {
	/// Resolve the first config file path that exists at `root`.
	pub fn resolve_path(root: &Path) -> Option<PathBuf> {
		CONFIG_FILE_CANDIDATES
			.iter()
			.map(|candidate| root.join(candidate))
			.find(|path| path.is_file())
	}

	/// Load the config from the first discovered config file at `root`.
	/// Returns `None` if the file does not exist.
	pub fn load(root: &Path) -> WeaveResult<Option<WeaveConfig>> {
		let Some(config_path) = Self::resolve_path(root) else {
			return Ok(None);
		};

		let content = std::fs::read_to_string(&config_path)?;
		let config = Self::from_toml(&content)?;
		debug!(path = %config_path.display(), "loaded config");

		Ok(Some(config))
	}

	/// Like [`WeaveConfig::load`], falling back to the defaults.
	pub fn load_or_default(root: &Path) -> WeaveResult<WeaveConfig> {
		Ok(Self::load(root)?.unwrap_or_default())
	}

	pub fn from_toml(content: &str) -> WeaveResult<WeaveConfig> {
		toml::from_str(content).map_err(|e| WeaveError::ConfigParse(e.to_string()))
	}

	pub fn token_pattern(&self) -> TokenPattern {
		match &self.tokens.pattern {
			Some(pattern) => TokenPattern::raw(pattern.clone()),
			None => TokenPattern::delimited(self.tokens.prefix.clone(), self.tokens.suffix.clone()),
		}
	}

	pub fn token_parser(&self) -> WeaveResult<TokenParser> {
		TokenParser::new(&self.token_pattern(), self.tokens.filter_delimiter.clone())
	}

	pub fn resolve_options(&self) -> ResolveOptions {
		ResolveOptions {
			ignore_unknown: self.tokens.ignore_unknown,
			ignore_unknown_filters: self.tokens.ignore_unknown_filters,
			default: self.tokens.default.clone(),
		}
	}

	pub fn group(&self) -> &str {
		&self.compile.group
	}

	/// The `[values]` table as a registered resolver.
	pub fn registered_values(&self) -> WeaveResult<RegisteredResolver> {
		let mut registered = RegisteredResolver::new();
		for (name, value) in &self.values {
			let text = match value {
				Value::String(text) => text.clone(),
				Value::Bool(_) | Value::Number(_) => value.to_string(),
				_ => {
					return Err(WeaveError::ConfigParse(format!(
						"`values.{name}` must be a string, number or boolean"
					)));
				}
			};
			registered.set(name.clone(), text);
		}
		Ok(registered)
	}

	/// Load the configured scope data. `None` when no `[scope]` is set.
	pub fn load_scope(&self, root: &Path) -> WeaveResult<Option<Value>> {
		let Some(scope) = &self.scope else {
			return Ok(None);
		};

		let data = match (&scope.source, &scope.data) {
			(Some(source), _) => source.load(root, &TreeSerializerRegistry::with_builtins())?,
			(None, Some(data)) => data.clone(),
			(None, None) => Value::Object(serde_json::Map::new()),
		};

		Ok(Some(data))
	}

	/// Build the resolver `weave.toml` asks for: a scope resolver when
	/// `[scope]` is set, else an on-demand environment resolver layered over
	/// `[values]` when `[env]` is enabled, else `[values]` alone.
	pub fn build_resolver(&self, root: &Path) -> WeaveResult<TokenResolver> {
		if let (Some(scope), Some(data)) = (&self.scope, self.load_scope(root)?) {
			debug!(scope = %scope.name, "using scope resolver");
			let resolver = ScopeResolver::new(scope.name.clone(), data)
				.name_delimiter(scope.name_delimiter.clone())
				.level_delimiter(scope.level_delimiter.clone())
				.ignore_out_of_scope(scope.ignore_out_of_scope)
				.escape(scope.escape);
			let resolver = match scope.serializer {
				ScopeSerializer::Json => resolver.serializer(JsonValueSerializer),
				ScopeSerializer::Plain => resolver.serializer(PlainValueSerializer),
			};
			return Ok(resolver.into());
		}

		let registered = self.registered_values()?;
		if self.env.enabled {
			debug!(prefix = %self.env.prefix, "using on-demand environment resolver");
			let resolver = OnDemandResolver::with_source(EnvValueSource::new(self.env.prefix.clone()))
				.registered(registered);
			return Ok(resolver.into());
		}

		Ok(registered.into())
	}

	/// A renderer for `root` with the builtin filters.
	pub fn renderer(&self, root: &Path) -> WeaveResult<Renderer> {
		Ok(
			Renderer::new(self.token_parser()?, self.build_resolver(root)?)
				.options(self.resolve_options())
				.check_hash(self.tokens.check_hash),
		)
	}
}
