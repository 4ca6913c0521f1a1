//! `weave_core` is the engine behind [weave](https://github.com/ifiokjr/weave). It substitutes `[[name|filter]]` placeholders in text and composes configuration trees from fragments that include, extend and prune one another.
//!
//! ## Token Pipeline
//!
//! ```text
//! source text
//!   → TokenParser (finds placeholders, groups identical ones into Tokens with offsets)
//!   → TokenCollection::resolve (asks a TokenResolver once per logical name, runs filter chains)
//!   → inject (rewrites the text left to right with a running offset delta)
//! ```
//!
//! ## Tree Pipeline
//!
//! ```text
//! root fragment
//!   → include.xref / include.main (named, ordered references)
//!   → XrefCollection (fetches and deserializes each distinct reference once)
//!   → inherit (folds every include, then the fragment's own remove and add)
//!   → composed tree with bookkeeping keys stripped
//! ```
//!
//! ## Modules
//!
//! - [`config`] - Loading `weave.toml` and building parsers, resolvers and renderers from it.
//! - [`tree`] - The `add` / `remove` inheritance merge.
//!
//! ## Key Types
//!
//! - [`Token`] and [`TokenCollection`] - Parsed placeholders and their resolution state.
//! - [`TokenResolver`] - Registered, scope or on-demand value lookup.
//! - [`FilterRegistry`] - Named string transforms applied after resolution.
//! - [`Renderer`] - Parse, resolve and inject in one call, over a string or a whole tree.
//! - [`TreeCompiler`] - Composes a fragment and its includes into one tree.
//! - [`WeaveConfig`] - Configuration loaded from `weave.toml`.
//!
//! ## Quick Start
//!
//! ```rust
//! use weave_core::RegisteredResolver;
//! use weave_core::Renderer;
//! use weave_core::TokenParser;
//!
//! let resolver = RegisteredResolver::with_values([("name", "ada")]);
//! let mut renderer = Renderer::new(TokenParser::default(), resolver);
//! let output = renderer.render_str("Hello [[name|upper]], you said [[name]].").unwrap();
//!
//! assert_eq!(output, "Hello ADA, you said ada.");
//! ```

pub use compiler::*;
pub use config::*;
pub use error::*;
pub use fetchers::*;
pub use filters::*;
pub use injector::*;
pub use parser::*;
pub use render::*;
pub use resolver::*;
pub use serializers::*;
pub use tokens::*;
pub use tree::*;
pub use xref::*;

mod compiler;
pub mod config;
#[allow(unused_assignments)]
mod error;
mod fetchers;
mod filters;
mod injector;
mod parser;
mod render;
mod resolver;
mod serializers;
mod tokens;
pub mod tree;
mod xref;

#[cfg(test)]
mod __fixtures;
