use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;

#[derive(Parser)]
#[command(
	author,
	version,
	about = "Substitute placeholders in text and compose layered config trees.",
	long_about = "weave fills `[[name|filter]]` placeholders from values, scopes or the \
	              environment configured in `weave.toml`, and composes configuration trees from \
	              fragments that include, extend and prune one another.\n\nQuick start:\n  weave \
	              render FILE   Substitute placeholders\n  weave compile FILE  Compose a fragment \
	              tree\n  weave tokens FILE   List the placeholders in a file"
)]
pub struct WeaveCli {
	#[command(subcommand)]
	pub command: Option<Commands>,

	/// Path to the project root directory.
	#[arg(long, short, global = true)]
	pub path: Option<PathBuf>,

	/// Enable verbose output.
	#[arg(long, short, global = true, default_value_t = false)]
	pub verbose: bool,

	/// Disable colored output.
	#[arg(long, global = true, default_value_t = false)]
	pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Commands {
	/// Substitute the placeholders in a file.
	///
	/// Values come from `weave.toml`: the `[values]` table, a `[scope]` data
	/// source, or environment variables when `[env]` is enabled. The result is
	/// printed to stdout unless `--output` is given.
	Render {
		/// The file to render, relative to the project root.
		file: PathBuf,

		/// Write the rendered text to this file instead of stdout.
		#[arg(long, short)]
		output: Option<PathBuf>,

		/// Exit with a non-zero status code if any placeholder is left
		/// unresolved. Nothing is written.
		#[arg(long, default_value_t = false)]
		check: bool,

		/// Show a unified diff between the file and its rendered text.
		#[arg(long, default_value_t = false)]
		diff: bool,
	},
	/// Compose a fragment and everything it includes into one tree.
	///
	/// Includes are read from `include.xref` and applied in the order given by
	/// `include.<group>`, falling back to `include.main`.
	Compile {
		/// The root fragment, relative to the project root.
		file: PathBuf,

		/// The inclusion group to compose. Defaults to `[compile] group` from
		/// `weave.toml`.
		#[arg(long, short)]
		group: Option<String>,

		/// Output format for the composed tree.
		#[arg(long, value_enum, default_value_t = CompileOutputFormat::Json)]
		format: CompileOutputFormat,

		/// Substitute placeholders in every string value of the composed
		/// tree.
		#[arg(long, default_value_t = false)]
		render: bool,
	},
	/// List the placeholders in a file and how they resolve.
	Tokens {
		/// The file to inspect, relative to the project root.
		file: PathBuf,

		/// Output format for the token list. Use `text` for human-readable
		/// output or `json` for programmatic consumption.
		#[arg(long, value_enum, default_value_t = TokensOutputFormat::Text)]
		format: TokensOutputFormat,
	},
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CompileOutputFormat {
	Json,
	Yaml,
	Toml,
}

impl CompileOutputFormat {
	/// The content type used to look up a tree serializer.
	pub fn content_type(self) -> &'static str {
		match self {
			Self::Json => "json",
			Self::Yaml => "yaml",
			Self::Toml => "toml",
		}
	}
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum TokensOutputFormat {
	/// Human-readable text output with colors and formatting.
	Text,
	/// JSON output for programmatic consumption.
	Json,
}
