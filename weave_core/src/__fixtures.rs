use std::cell::Cell;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use crate::Fetched;
use crate::Fetcher;
use crate::FetcherRegistry;
use crate::RegisteredResolver;
use crate::TokenResolver;
use crate::TreeSerializerRegistry;
use crate::ValueAnswer;
use crate::ValueQuery;
use crate::ValueSource;
use crate::WeaveError;
use crate::WeaveResult;
use crate::XrefResolvers;

pub const MEMORY_XREF: &str = "memory";

pub fn registered(values: &[(&str, &str)]) -> TokenResolver {
	RegisteredResolver::with_values(values.iter().copied()).into()
}

/// Serves in-memory documents and counts every fetch.
#[derive(Debug, Clone, Default)]
pub struct CountingFetcher {
	pub documents: HashMap<String, String>,
	pub fetches: Arc<AtomicUsize>,
	pub fetched: Arc<std::sync::Mutex<Vec<String>>>,
}

impl CountingFetcher {
	pub fn new(documents: &[(&str, &str)]) -> Self {
		Self {
			documents: documents
				.iter()
				.map(|(location, content)| ((*location).to_string(), (*content).to_string()))
				.collect(),
			..Self::default()
		}
	}

	pub fn count(&self) -> usize {
		self.fetches.load(Ordering::SeqCst)
	}

	pub fn count_of(&self, location: &str) -> usize {
		self.fetched
			.lock()
			.unwrap_or_else(|e| panic!("fetch log poisoned: {e}"))
			.iter()
			.filter(|fetched| fetched.as_str() == location)
			.count()
	}
}

impl Fetcher for CountingFetcher {
	fn fetch(&self, location: &str) -> WeaveResult<Fetched> {
		self.fetches.fetch_add(1, Ordering::SeqCst);
		self.fetched
			.lock()
			.unwrap_or_else(|e| panic!("fetch log poisoned: {e}"))
			.push(location.to_string());

		self.documents
			.get(location)
			.map(|content| Fetched::new(content.as_bytes()))
			.ok_or_else(|| {
				WeaveError::XrefResolverFetch {
					kind: MEMORY_XREF.to_string(),
					location: location.to_string(),
					reason: "no such document".to_string(),
				}
			})
	}
}

/// Resolvers whose only fetcher is `fetcher`, registered as the `memory`
/// xref type.
pub fn memory_resolvers(fetcher: &CountingFetcher) -> XrefResolvers {
	let mut fetchers = FetcherRegistry::new();
	fetchers
		.register(MEMORY_XREF, fetcher.clone())
		.unwrap_or_else(|e| panic!("register memory fetcher: {e}"));
	XrefResolvers::new(fetchers, TreeSerializerRegistry::with_builtins())
}

pub fn write_files(root: &Path, files: &[(&str, &str)]) {
	for (path, content) in files {
		let path = root.join(path);
		if let Some(parent) = path.parent() {
			std::fs::create_dir_all(parent).unwrap_or_else(|e| panic!("create dir: {e}"));
		}
		std::fs::write(&path, content).unwrap_or_else(|e| panic!("write {}: {e}", path.display()));
	}
}

/// An on-demand source over a fixed map that counts value requests.
#[derive(Debug, Clone, Default)]
pub struct CountingSource {
	pub values: HashMap<String, String>,
	pub asked: Rc<Cell<usize>>,
	pub empty: bool,
}

impl CountingSource {
	pub fn new(values: &[(&str, &str)]) -> Self {
		Self {
			values: values
				.iter()
				.map(|(name, value)| ((*name).to_string(), (*value).to_string()))
				.collect(),
			..Self::default()
		}
	}
}

impl ValueSource for CountingSource {
	fn query(&mut self, query: ValueQuery<'_>) -> ValueAnswer {
		match query {
			ValueQuery::HasValues => ValueAnswer::Flag(!self.empty),
			ValueQuery::IsKnown(name) => ValueAnswer::Flag(self.values.contains_key(name)),
			ValueQuery::ValueFor(name) => {
				self.asked.set(self.asked.get() + 1);
				self.values
					.get(name)
					.cloned()
					.map_or(ValueAnswer::Unanswered, ValueAnswer::Value)
			}
		}
	}
}
