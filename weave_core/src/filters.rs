use std::collections::HashMap;
use std::fmt;

use heck::ToKebabCase;
use heck::ToLowerCamelCase;
use heck::ToShoutySnakeCase;
use heck::ToSnakeCase;
use heck::ToTitleCase;
use heck::ToUpperCamelCase;

use crate::WeaveError;
use crate::WeaveResult;

/// A pure string transform applied to a resolved token value.
pub type FilterFn = Box<dyn Fn(&str) -> String + Send + Sync>;

/// Names of the filters installed by [`FilterRegistry::with_builtins`].
pub const BUILTIN_FILTERS: [&str; 16] = [
	"upper",
	"lower",
	"trim",
	"ucfirst",
	"lcfirst",
	"snake",
	"kebab",
	"camel",
	"pascal",
	"title",
	"shouty",
	"dash",
	"underscore",
	"dot",
	"shell",
	"json",
];

/// Name to filter lookup. Filters are applied in chain order, each one
/// receiving the output of the previous.
#[derive(Default)]
pub struct FilterRegistry {
	filters: HashMap<String, FilterFn>,
}

impl fmt::Debug for FilterRegistry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut names: Vec<&str> = self.filters.keys().map(String::as_str).collect();
		names.sort_unstable();
		f.debug_struct("FilterRegistry")
			.field("filters", &names)
			.finish()
	}
}

impl FilterRegistry {
	/// An empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// A registry pre-populated with the built-in filters.
	pub fn with_builtins() -> Self {
		let mut registry = Self::new();
		for name in BUILTIN_FILTERS {
			// Builtin names are distinct so registration cannot fail.
			registry
				.filters
				.insert(name.to_string(), builtin_filter(name));
		}
		registry
	}

	/// Register a filter under `name`. Names can only be registered once.
	pub fn register<F>(&mut self, name: impl Into<String>, filter: F) -> WeaveResult<()>
	where
		F: Fn(&str) -> String + Send + Sync + 'static,
	{
		let name = name.into();
		if self.filters.contains_key(&name) {
			return Err(WeaveError::AlreadyRegistered {
				kind: "filter",
				name,
			});
		}

		self.filters.insert(name, Box::new(filter));
		Ok(())
	}

	pub fn contains(&self, name: &str) -> bool {
		self.filters.contains_key(name)
	}

	/// Sorted names of every registered filter.
	pub fn names(&self) -> Vec<&str> {
		let mut names: Vec<&str> = self.filters.keys().map(String::as_str).collect();
		names.sort_unstable();
		names
	}

	/// Apply the filter `name` to `value`. An unknown filter is an error
	/// unless `ignore_unknown` is set, in which case `default` is returned.
	pub fn apply(
		&self,
		name: &str,
		value: &str,
		ignore_unknown: bool,
		default: &str,
	) -> WeaveResult<String> {
		match self.filters.get(name) {
			Some(filter) => Ok(filter(value)),
			None if ignore_unknown => Ok(default.to_string()),
			None => Err(WeaveError::UnknownFilter(name.to_string())),
		}
	}
}

fn builtin_filter(name: &str) -> FilterFn {
	match name {
		"upper" => Box::new(str::to_uppercase),
		"lower" => Box::new(str::to_lowercase),
		"trim" => Box::new(|value| value.trim().to_string()),
		"ucfirst" => Box::new(ucfirst),
		"lcfirst" => Box::new(lcfirst),
		"snake" => Box::new(|value| value.to_snake_case()),
		"kebab" => Box::new(|value| value.to_kebab_case()),
		"camel" => Box::new(|value| value.to_lower_camel_case()),
		"pascal" => Box::new(|value| value.to_upper_camel_case()),
		"title" => Box::new(|value| value.to_title_case()),
		"shouty" => Box::new(|value| value.to_shouty_snake_case()),
		"dash" => Box::new(|value| replace_separators(value, &['_', ' '], '-')),
		"underscore" => Box::new(|value| replace_separators(value, &['-', ' '], '_')),
		"dot" => Box::new(|value| replace_separators(value, &['_', '-', ' '], '.')),
		"shell" => Box::new(|value| snailquote::escape(value).into_owned()),
		"json" => {
			Box::new(|value| {
				serde_json::Value::String(value.to_string()).to_string()
			})
		}
		_ => Box::new(str::to_string),
	}
}

fn ucfirst(value: &str) -> String {
	let mut chars = value.chars();
	match chars.next() {
		Some(first) => first.to_uppercase().chain(chars).collect(),
		None => String::new(),
	}
}

fn lcfirst(value: &str) -> String {
	let mut chars = value.chars();
	match chars.next() {
		Some(first) => first.to_lowercase().chain(chars).collect(),
		None => String::new(),
	}
}

fn replace_separators(value: &str, from: &[char], to: char) -> String {
	value
		.chars()
		.map(|ch| if from.contains(&ch) { to } else { ch })
		.collect()
}
