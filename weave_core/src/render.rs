use serde_json::Value;
use tracing::debug;

use crate::FilterRegistry;
use crate::ResolveOptions;
use crate::TokenCollection;
use crate::TokenParser;
use crate::TokenResolver;
use crate::WeaveResult;
use crate::inject;

/// Output of one render pass.
#[derive(Debug, Clone)]
pub struct Rendered {
	pub output: String,
	/// The parsed tokens with their final resolution state. Offsets of
	/// placeholders left in place point into `output`.
	pub tokens: TokenCollection,
}

impl Rendered {
	/// Whether every placeholder was substituted.
	pub fn is_complete(&self) -> bool {
		self.tokens.is_fully_injected()
	}
}

/// Runs parse, resolve and inject with one parser, resolver and filter set.
#[derive(Debug)]
pub struct Renderer {
	parser: TokenParser,
	resolver: TokenResolver,
	filters: FilterRegistry,
	options: ResolveOptions,
	check_hash: bool,
}

impl Renderer {
	/// A renderer with the builtin filters and lenient resolution.
	pub fn new(parser: TokenParser, resolver: impl Into<TokenResolver>) -> Self {
		Self {
			parser,
			resolver: resolver.into(),
			filters: FilterRegistry::with_builtins(),
			options: ResolveOptions::lenient(),
			check_hash: false,
		}
	}

	#[must_use]
	pub fn filters(mut self, filters: FilterRegistry) -> Self {
		self.filters = filters;
		self
	}

	#[must_use]
	pub fn options(mut self, options: ResolveOptions) -> Self {
		self.options = options;
		self
	}

	#[must_use]
	pub fn check_hash(mut self, check_hash: bool) -> Self {
		self.check_hash = check_hash;
		self
	}

	pub fn parser(&self) -> &TokenParser {
		&self.parser
	}

	pub fn resolver(&self) -> &TokenResolver {
		&self.resolver
	}

	pub fn resolver_mut(&mut self) -> &mut TokenResolver {
		&mut self.resolver
	}

	pub fn filter_registry(&self) -> &FilterRegistry {
		&self.filters
	}

	/// Parse `text` without resolving anything.
	pub fn tokens(&self, text: &str) -> TokenCollection {
		self.parser.parse(text)
	}

	/// Parse `text` and resolve its tokens without touching the text.
	pub fn resolve(&mut self, text: &str) -> WeaveResult<TokenCollection> {
		let mut tokens = self.parser.parse(text);
		tokens.resolve(&mut self.resolver, &self.filters, &self.options)?;
		Ok(tokens)
	}

	/// Parse `text`, resolve its tokens and inject their values.
	pub fn render(&mut self, text: &str) -> WeaveResult<Rendered> {
		let mut tokens = self.resolve(text)?;
		let output = inject(text, &mut tokens, self.check_hash)?;

		Ok(Rendered { output, tokens })
	}

	pub fn render_str(&mut self, text: &str) -> WeaveResult<String> {
		Ok(self.render(text)?.output)
	}

	/// Render every string leaf of `tree` in place. Map keys are left alone.
	/// Returns the number of leaves that changed.
	pub fn render_tree(&mut self, tree: &mut Value) -> WeaveResult<usize> {
		let changed = self.render_value(tree)?;
		debug!(changed, "rendered tree");
		Ok(changed)
	}

	fn render_value(&mut self, value: &mut Value) -> WeaveResult<usize> {
		match value {
			Value::String(text) => {
				let rendered = self.render_str(text)?;
				if rendered == *text {
					return Ok(0);
				}
				*text = rendered;
				Ok(1)
			}
			Value::Array(items) => {
				let mut changed = 0;
				for item in items {
					changed += self.render_value(item)?;
				}
				Ok(changed)
			}
			Value::Object(map) => {
				let mut changed = 0;
				for item in map.values_mut() {
					changed += self.render_value(item)?;
				}
				Ok(changed)
			}
			_ => Ok(0),
		}
	}
}
