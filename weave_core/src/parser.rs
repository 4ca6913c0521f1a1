use regex::Regex;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use crate::Token;
use crate::TokenCollection;
use crate::WeaveError;
use crate::WeaveResult;

pub const DEFAULT_PREFIX: &str = "[[";
pub const DEFAULT_SUFFIX: &str = "]]";
pub const DEFAULT_FILTER_DELIMITER: &str = "|";

/// How placeholders are recognized in text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
#[non_exhaustive]
pub enum TokenPattern {
	/// A literal prefix and suffix around the token body, e.g. `[[` and `]]`.
	Delimited { prefix: String, suffix: String },
	/// A raw regular expression. The first capture group is the token body;
	/// without capture groups the whole match is.
	Raw(String),
}

impl Default for TokenPattern {
	fn default() -> Self {
		Self::Delimited {
			prefix: DEFAULT_PREFIX.to_string(),
			suffix: DEFAULT_SUFFIX.to_string(),
		}
	}
}

impl TokenPattern {
	pub fn delimited(prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
		Self::Delimited {
			prefix: prefix.into(),
			suffix: suffix.into(),
		}
	}

	pub fn raw(pattern: impl Into<String>) -> Self {
		Self::Raw(pattern.into())
	}

	fn to_regex(&self) -> WeaveResult<Regex> {
		let source = match self {
			Self::Delimited { prefix, suffix } => {
				if prefix.is_empty() || suffix.is_empty() {
					return Err(WeaveError::InvalidPattern {
						pattern: format!("{prefix}...{suffix}"),
						reason: "prefix and suffix must not be empty".to_string(),
					});
				}
				format!("{}(.+?){}", regex::escape(prefix), regex::escape(suffix))
			}
			Self::Raw(pattern) => pattern.clone(),
		};

		Regex::new(&source).map_err(|e| {
			WeaveError::InvalidPattern {
				pattern: source.clone(),
				reason: e.to_string(),
			}
		})
	}
}

/// Scans text for placeholders and groups identical ones into tokens.
#[derive(Debug, Clone)]
pub struct TokenParser {
	regex: Regex,
	filter_delimiter: String,
}

impl Default for TokenParser {
	/// `[[name|filter]]` placeholders, built from [`TokenPattern::default`].
	fn default() -> Self {
		Self::new(&TokenPattern::default(), DEFAULT_FILTER_DELIMITER)
			.unwrap_or_else(|e| unreachable!("default token pattern compiles: {e}"))
	}
}

impl TokenParser {
	pub fn new(pattern: &TokenPattern, filter_delimiter: impl Into<String>) -> WeaveResult<Self> {
		let filter_delimiter = filter_delimiter.into();
		if filter_delimiter.is_empty() {
			return Err(WeaveError::InvalidPattern {
				pattern: String::new(),
				reason: "filter delimiter must not be empty".to_string(),
			});
		}

		Ok(Self {
			regex: pattern.to_regex()?,
			filter_delimiter,
		})
	}

	pub fn filter_delimiter(&self) -> &str {
		&self.filter_delimiter
	}

	/// Parse every non-overlapping placeholder in `text`. No resolution
	/// happens here.
	pub fn parse(&self, text: &str) -> TokenCollection {
		let mut collection = TokenCollection::with_source(text);
		let mut occurrences = 0usize;

		for captures in self.regex.captures_iter(text) {
			let Some(whole) = captures.get(0) else {
				continue;
			};
			if whole.as_str().is_empty() {
				continue;
			}
			let body = captures.get(1).unwrap_or(whole).as_str();

			occurrences += 1;
			collection.record(whole.as_str(), whole.start(), || {
				let (name, filters) = split_body(body, &self.filter_delimiter);
				Token::new(whole.as_str(), name, filters)
			});
		}

		debug!(
			occurrences,
			tokens = collection.len(),
			"parsed placeholders"
		);

		collection
	}
}

/// Parse `text` with `pattern`, splitting token bodies on `filter_delimiter`.
pub fn parse(
	text: &str,
	pattern: &TokenPattern,
	filter_delimiter: &str,
) -> WeaveResult<TokenCollection> {
	Ok(TokenParser::new(pattern, filter_delimiter)?.parse(text))
}

/// Split a token body into its logical name and filter chain. Segments are
/// trimmed and empty filter names dropped.
fn split_body(body: &str, delimiter: &str) -> (String, Vec<String>) {
	let mut segments = body.split(delimiter).map(str::trim);
	let name = segments.next().unwrap_or_default().to_string();
	let filters = segments
		.filter(|segment| !segment.is_empty())
		.map(str::to_string)
		.collect();

	(name, filters)
}
