use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::path::PathBuf;
use std::process::Command;

use tracing::debug;

use crate::WeaveError;
use crate::WeaveResult;

pub const FILE_XREF: &str = "file";
pub const INLINE_XREF: &str = "inline";
pub const COMMAND_XREF: &str = "command";

/// Raw content fetched for an xref.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
	pub content: Vec<u8>,
	/// Content type reported by the fetcher, if it knows one.
	pub content_type: Option<String>,
}

impl Fetched {
	pub fn new(content: impl Into<Vec<u8>>) -> Self {
		Self {
			content: content.into(),
			content_type: None,
		}
	}

	#[must_use]
	pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
		self.content_type = Some(content_type.into());
		self
	}
}

/// Fetches raw content for one xref type.
pub trait Fetcher: fmt::Debug {
	fn fetch(&self, location: &str) -> WeaveResult<Fetched>;
}

/// Fetchers keyed by xref type.
#[derive(Debug, Default)]
pub struct FetcherRegistry {
	fetchers: HashMap<String, Box<dyn Fetcher>>,
}

impl FetcherRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// `file`, `inline` and `command` fetchers rooted at `root`.
	pub fn with_builtins(root: impl Into<PathBuf>) -> Self {
		let root = root.into();
		let mut fetchers: HashMap<String, Box<dyn Fetcher>> = HashMap::new();
		fetchers.insert(FILE_XREF.to_string(), Box::new(FileFetcher::new(&root)));
		fetchers.insert(INLINE_XREF.to_string(), Box::new(InlineFetcher));
		fetchers.insert(COMMAND_XREF.to_string(), Box::new(CommandFetcher::new(&root)));
		Self { fetchers }
	}

	pub fn register(
		&mut self,
		kind: impl Into<String>,
		fetcher: impl Fetcher + 'static,
	) -> WeaveResult<()> {
		let kind = kind.into();
		if self.fetchers.contains_key(&kind) {
			return Err(WeaveError::AlreadyRegistered {
				kind: "xref type",
				name: kind,
			});
		}
		self.fetchers.insert(kind, Box::new(fetcher));
		Ok(())
	}

	pub fn get(&self, kind: &str) -> WeaveResult<&dyn Fetcher> {
		self.fetchers
			.get(kind)
			.map(|fetcher| &**fetcher)
			.ok_or_else(|| WeaveError::UnknownXrefType(kind.to_string()))
	}

	pub fn contains(&self, kind: &str) -> bool {
		self.fetchers.contains_key(kind)
	}
}

/// Reads files relative to a root directory.
#[derive(Debug, Clone)]
pub struct FileFetcher {
	root: PathBuf,
}

impl FileFetcher {
	pub fn new(root: impl AsRef<Path>) -> Self {
		Self {
			root: root.as_ref().to_path_buf(),
		}
	}
}

impl Fetcher for FileFetcher {
	fn fetch(&self, location: &str) -> WeaveResult<Fetched> {
		let path = self.root.join(location);
		debug!(path = %path.display(), "reading xref file");
		let content = std::fs::read(&path).map_err(|e| {
			WeaveError::XrefResolverFetch {
				kind: FILE_XREF.to_string(),
				location: location.to_string(),
				reason: e.to_string(),
			}
		})?;

		Ok(Fetched::new(content))
	}
}

/// The location is the content itself. Defaults to JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineFetcher;

impl Fetcher for InlineFetcher {
	fn fetch(&self, location: &str) -> WeaveResult<Fetched> {
		Ok(Fetched::new(location.as_bytes()).with_content_type("json"))
	}
}

/// Runs the location as a shell command in the root directory and returns its
/// standard output.
#[derive(Debug, Clone)]
pub struct CommandFetcher {
	root: PathBuf,
}

impl CommandFetcher {
	pub fn new(root: impl AsRef<Path>) -> Self {
		Self {
			root: root.as_ref().to_path_buf(),
		}
	}
}

impl Fetcher for CommandFetcher {
	fn fetch(&self, location: &str) -> WeaveResult<Fetched> {
		let fetch_error = |reason: String| {
			WeaveError::XrefResolverFetch {
				kind: COMMAND_XREF.to_string(),
				location: location.to_string(),
				reason,
			}
		};

		debug!(command = location, "running xref command");
		let output = if cfg!(windows) {
			Command::new("cmd")
				.arg("/C")
				.arg(location)
				.current_dir(&self.root)
				.output()
		} else {
			Command::new("sh")
				.arg("-c")
				.arg(location)
				.current_dir(&self.root)
				.output()
		}
		.map_err(|e| fetch_error(e.to_string()))?;

		if !output.status.success() {
			let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
			let reason = if stderr.is_empty() {
				format!(
					"command exited with status {}",
					output
						.status
						.code()
						.map_or_else(|| "unknown".to_string(), |code| code.to_string())
				)
			} else {
				stderr
			};

			return Err(fetch_error(reason));
		}

		Ok(Fetched::new(output.stdout))
	}
}
