use std::collections::BTreeSet;
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::Hash;
use std::hash::Hasher;

use derive_more::Deref;
use derive_more::DerefMut;
use serde::Serialize;
use tracing::debug;
use tracing::trace;

use crate::FilterRegistry;
use crate::TokenResolver;
use crate::WeaveError;
use crate::WeaveResult;

/// Content hash used to tie a [`TokenCollection`] to the text it was parsed
/// from.
pub fn content_hash(text: &str) -> u64 {
	let mut hasher = DefaultHasher::new();
	text.hash(&mut hasher);
	hasher.finish()
}

/// Byte offsets at which a placeholder occurs, in ascending order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deref, DerefMut)]
pub struct Offsets(
	#[deref]
	#[deref_mut]
	BTreeSet<usize>,
);

impl FromIterator<usize> for Offsets {
	fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
		Self(iter.into_iter().collect())
	}
}

/// One distinct placeholder and its resolution state.
///
/// The same placeholder text may appear several times in a source string;
/// every occurrence is recorded in [`Token::offsets`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Token {
	/// The placeholder exactly as it appeared, delimiters included, e.g.
	/// `[[name|upper]]`.
	pub placeholder: String,
	/// The logical name used for resolution, e.g. `name`.
	pub name: String,
	/// Filter names applied in order after resolution.
	pub filters: Vec<String>,
	pub offsets: Offsets,
	unfiltered: Option<String>,
	filtered: Option<String>,
	is_resolved: bool,
	is_filtered: bool,
	is_injected: bool,
	/// Filters that were unknown when the chain was last applied.
	unresolved_filters: Vec<String>,
}

impl Token {
	pub fn new(
		placeholder: impl Into<String>,
		name: impl Into<String>,
		filters: Vec<String>,
	) -> Self {
		Self {
			placeholder: placeholder.into(),
			name: name.into(),
			filters,
			offsets: Offsets::default(),
			unfiltered: None,
			filtered: None,
			is_resolved: false,
			is_filtered: false,
			is_injected: false,
			unresolved_filters: Vec::new(),
		}
	}

	pub fn with_offset(mut self, offset: usize) -> Self {
		self.offsets.insert(offset);
		self
	}

	pub fn is_resolved(&self) -> bool {
		self.is_resolved
	}

	pub fn is_filtered(&self) -> bool {
		self.is_filtered
	}

	pub fn is_injected(&self) -> bool {
		self.is_injected
	}

	pub fn unfiltered_value(&self) -> Option<&str> {
		self.unfiltered.as_deref()
	}

	pub fn filtered_value(&self) -> Option<&str> {
		self.filtered.as_deref()
	}

	/// The value to inject: the filtered value, or the unfiltered value when
	/// no filter chain has run yet.
	pub fn value(&self) -> Option<&str> {
		self.filtered.as_deref().or(self.unfiltered.as_deref())
	}

	pub fn unresolved_filters(&self) -> &[String] {
		&self.unresolved_filters
	}

	/// Whether the token still has work to do in a resolution pass.
	pub fn needs_resolution(&self) -> bool {
		!self.is_resolved || !self.unresolved_filters.is_empty()
	}

	/// Record the unfiltered value and clear any previous filtering.
	pub fn set_unfiltered_value(&mut self, value: impl Into<String>) {
		self.unfiltered = Some(value.into());
		self.filtered = None;
		self.is_resolved = true;
		self.is_filtered = false;
		self.unresolved_filters.clear();
	}

	/// Run the filter chain over the unfiltered value. Unknown filters are
	/// skipped and remembered when `ignore_unknown` is set.
	pub fn apply_filters(
		&mut self,
		registry: &FilterRegistry,
		ignore_unknown: bool,
	) -> WeaveResult<()> {
		let Some(unfiltered) = self.unfiltered.as_deref() else {
			return Ok(());
		};

		let mut value = unfiltered.to_string();
		let mut unresolved = Vec::new();

		for filter in &self.filters {
			if !registry.contains(filter) {
				if !ignore_unknown {
					return Err(WeaveError::UnknownFilter(filter.clone()));
				}
				trace!(token = %self.placeholder, filter = %filter, "skipping unknown filter");
				unresolved.push(filter.clone());
				continue;
			}

			value = registry.apply(filter, &value, ignore_unknown, &value)?;
		}

		self.filtered = Some(value);
		self.is_filtered = unresolved.is_empty();
		self.unresolved_filters = unresolved;
		Ok(())
	}

	pub(crate) fn mark_injected(&mut self) {
		self.is_injected = true;
	}
}

/// Flags controlling a bulk resolution pass. The default ignores unknown
/// tokens and filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveOptions {
	/// Leave unknown token names unresolved (or use `default`) instead of
	/// failing.
	pub ignore_unknown: bool,
	/// Skip unknown filters instead of failing.
	pub ignore_unknown_filters: bool,
	/// Value for ignored unknown tokens. `None` leaves them unresolved.
	pub default: Option<String>,
}

impl ResolveOptions {
	/// Ignore unknown tokens and filters.
	pub fn lenient() -> Self {
		Self {
			ignore_unknown: true,
			ignore_unknown_filters: true,
			default: None,
		}
	}

	/// Fail on unknown tokens and filters.
	pub fn strict() -> Self {
		Self {
			ignore_unknown: false,
			ignore_unknown_filters: false,
			default: None,
		}
	}
}

impl Default for ResolveOptions {
	fn default() -> Self {
		Self::lenient()
	}
}

/// The distinct tokens parsed from one source string.
///
/// Iteration follows the order in which placeholders first appeared.
#[derive(Debug, Clone, Default)]
pub struct TokenCollection {
	tokens: Vec<Token>,
	index: HashMap<String, usize>,
	source_hash: Option<u64>,
}

impl TokenCollection {
	pub fn new() -> Self {
		Self::default()
	}

	pub(crate) fn with_source(text: &str) -> Self {
		Self {
			source_hash: Some(content_hash(text)),
			..Self::default()
		}
	}

	/// Hash of the text this collection was parsed from, if still known.
	pub fn source_hash(&self) -> Option<u64> {
		self.source_hash
	}

	pub(crate) fn set_source_hash(&mut self, hash: Option<u64>) {
		self.source_hash = hash;
	}

	/// Record an occurrence of `placeholder` at `offset`, creating the token on
	/// first sight.
	pub(crate) fn record(
		&mut self,
		placeholder: &str,
		offset: usize,
		make: impl FnOnce() -> Token,
	) {
		if let Some(&position) = self.index.get(placeholder) {
			self.tokens[position].offsets.insert(offset);
			return;
		}

		let token = make().with_offset(offset);
		self.index.insert(placeholder.to_string(), self.tokens.len());
		self.tokens.push(token);
	}

	/// Add tokens from outside the parser. Occurrences of an already-known
	/// placeholder are merged. The source hash no longer matches any text, so
	/// it is cleared.
	pub fn import(&mut self, tokens: impl IntoIterator<Item = Token>) {
		for token in tokens {
			if let Some(&position) = self.index.get(&token.placeholder) {
				let existing = &mut self.tokens[position];
				existing.offsets.extend(token.offsets.iter().copied());
				continue;
			}
			self.index
				.insert(token.placeholder.clone(), self.tokens.len());
			self.tokens.push(token);
		}
		self.source_hash = None;
	}

	pub fn get(&self, placeholder: &str) -> Option<&Token> {
		self.index
			.get(placeholder)
			.map(|&position| &self.tokens[position])
	}

	pub fn get_mut(&mut self, placeholder: &str) -> Option<&mut Token> {
		self.index
			.get(placeholder)
			.map(|&position| &mut self.tokens[position])
	}

	/// Remove a token by its placeholder text.
	pub fn remove(&mut self, placeholder: &str) -> Option<Token> {
		let position = self.index.remove(placeholder)?;
		let token = self.tokens.remove(position);
		for slot in self.index.values_mut() {
			if *slot > position {
				*slot -= 1;
			}
		}
		Some(token)
	}

	pub fn clear(&mut self) {
		self.tokens.clear();
		self.index.clear();
		self.source_hash = None;
	}

	pub fn iter(&self) -> impl Iterator<Item = &Token> {
		self.tokens.iter()
	}

	pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Token> {
		self.tokens.iter_mut()
	}

	pub fn len(&self) -> usize {
		self.tokens.len()
	}

	pub fn is_empty(&self) -> bool {
		self.tokens.is_empty()
	}

	/// Tokens sharing the logical `name`, whatever their filter chains.
	pub fn by_name<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Token> + 'a {
		self.tokens.iter().filter(move |token| token.name == name)
	}

	/// Distinct logical names, in first-seen order.
	pub fn names(&self) -> Vec<&str> {
		let mut names: Vec<&str> = Vec::new();
		for token in &self.tokens {
			if !names.contains(&token.name.as_str()) {
				names.push(&token.name);
			}
		}
		names
	}

	pub fn resolved(&self) -> impl Iterator<Item = &Token> {
		self.tokens.iter().filter(|token| token.is_resolved())
	}

	pub fn unresolved(&self) -> impl Iterator<Item = &Token> {
		self.tokens.iter().filter(|token| !token.is_resolved())
	}

	/// Whether every token has been written into the text.
	pub fn is_fully_injected(&self) -> bool {
		self.tokens.iter().all(Token::is_injected)
	}

	/// Resolve every token needing it through `resolver`, then run each
	/// token's filter chain.
	///
	/// Each distinct logical name reaches the resolver at most once per call,
	/// so `[[name]]` and `[[name|upper]]` share one lookup.
	pub fn resolve(
		&mut self,
		resolver: &mut TokenResolver,
		filters: &FilterRegistry,
		options: &ResolveOptions,
	) -> WeaveResult<()> {
		let mut unfiltered_cache: HashMap<String, Option<String>> = HashMap::new();
		let mut resolved = 0usize;

		for token in &mut self.tokens {
			if !token.needs_resolution() {
				continue;
			}

			if !token.is_resolved() {
				let value = match unfiltered_cache.get(&token.name) {
					Some(cached) => cached.clone(),
					None => {
						let value = resolver.value_for(
							&token.name,
							options.ignore_unknown,
							options.default.as_deref(),
						)?;
						unfiltered_cache.insert(token.name.clone(), value.clone());
						value
					}
				};

				let Some(value) = value else {
					trace!(token = %token.placeholder, "left unresolved");
					continue;
				};
				token.set_unfiltered_value(value);
			}

			token.apply_filters(filters, options.ignore_unknown_filters)?;
			resolved += 1;
		}

		debug!(
			resolved,
			lookups = unfiltered_cache.len(),
			total = self.tokens.len(),
			"resolved tokens"
		);

		Ok(())
	}
}

impl<'a> IntoIterator for &'a TokenCollection {
	type IntoIter = std::slice::Iter<'a, Token>;
	type Item = &'a Token;

	fn into_iter(self) -> Self::IntoIter {
		self.tokens.iter()
	}
}
