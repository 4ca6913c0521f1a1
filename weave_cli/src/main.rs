use std::path::Path;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use owo_colors::OwoColorize;
use similar::ChangeTag;
use similar::TextDiff;
use tracing_subscriber::EnvFilter;
use weave_cli::Commands;
use weave_cli::CompileOutputFormat;
use weave_cli::TokensOutputFormat;
use weave_cli::WeaveCli;
use weave_core::Token;
use weave_core::TokenCollection;
use weave_core::TreeCompiler;
use weave_core::WeaveConfig;
use weave_core::XrefResolvers;
use weave_core::XrefSpec;

static USE_COLOR: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(true);

fn color_enabled() -> bool {
	USE_COLOR.load(std::sync::atomic::Ordering::Relaxed)
}

/// Apply ANSI color codes only when color is enabled.
macro_rules! colored {
	($text:expr,red) => {
		if color_enabled() {
			format!("{}", $text.red())
		} else {
			format!("{}", $text)
		}
	};
	($text:expr,green) => {
		if color_enabled() {
			format!("{}", $text.green())
		} else {
			format!("{}", $text)
		}
	};
	($text:expr,yellow) => {
		if color_enabled() {
			format!("{}", $text.yellow())
		} else {
			format!("{}", $text)
		}
	};
	($text:expr,dimmed) => {
		if color_enabled() {
			format!("{}", $text.dimmed())
		} else {
			format!("{}", $text)
		}
	};
}

/// Environment variable holding the log filter directives.
const LOG_ENV: &str = "WEAVE_LOG";

fn main() {
	let args = WeaveCli::parse();

	let use_color = !args.no_color && std::env::var_os("NO_COLOR").is_none();
	USE_COLOR.store(use_color, std::sync::atomic::Ordering::Relaxed);

	miette::set_hook(Box::new(move |_| {
		Box::new(
			miette::MietteHandlerOpts::new()
				.color(use_color)
				.unicode(use_color)
				.build(),
		)
	}))
	.ok();

	setup_tracing(args.verbose, use_color);

	let result = match &args.command {
		Some(Commands::Render {
			file,
			output,
			check,
			diff,
		}) => run_render(&args, file, output.as_deref(), *check, *diff),
		Some(Commands::Compile {
			file,
			group,
			format,
			render,
		}) => run_compile(&args, file, group.as_deref(), *format, *render),
		Some(Commands::Tokens { file, format }) => run_tokens(&args, file, *format),
		None => {
			eprintln!("No subcommand specified. Run `weave --help` for usage.");
			process::exit(1);
		}
	};

	if let Err(e) = result {
		match e.downcast::<weave_core::WeaveError>() {
			Ok(weave_err) => {
				let report: miette::Report = (*weave_err).into();
				eprintln!("{report:?}");
			}
			Err(e) => {
				eprintln!("{} {e}", colored!("error:", red));
			}
		}
		process::exit(2);
	}
}

fn setup_tracing(verbose: bool, use_color: bool) {
	let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| {
		if verbose {
			EnvFilter::new("debug")
		} else {
			EnvFilter::new("warn")
		}
	});

	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.with_ansi(use_color)
		.with_target(verbose)
		.init();
}

fn resolve_root(args: &WeaveCli) -> PathBuf {
	args.path
		.clone()
		.unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

fn load_config(root: &Path) -> Result<WeaveConfig, Box<dyn std::error::Error>> {
	if let Some(path) = WeaveConfig::resolve_path(root) {
		tracing::debug!(path = %path.display(), "using config file");
	}
	Ok(WeaveConfig::load_or_default(root)?)
}

fn run_render(
	args: &WeaveCli,
	file: &Path,
	output: Option<&Path>,
	check: bool,
	show_diff: bool,
) -> Result<(), Box<dyn std::error::Error>> {
	let root = resolve_root(args);
	let config = load_config(&root)?;
	let source_path = root.join(file);
	let source = std::fs::read_to_string(&source_path)?;

	let mut renderer = config.renderer(&root)?;
	let rendered = renderer.render(&source)?;

	if show_diff {
		print_diff(&source, &rendered.output);
	}

	if check {
		let unresolved: Vec<&Token> = rendered.tokens.unresolved().collect();
		if unresolved.is_empty() {
			println!(
				"Check passed: all placeholders in {} resolve.",
				make_relative(&source_path, &root)
			);
			return Ok(());
		}

		println!(
			"{} {} unresolved placeholder(s) in {}:",
			colored!("Check failed:", red),
			unresolved.len(),
			make_relative(&source_path, &root)
		);
		for token in unresolved {
			println!("  {}", colored!(token.placeholder.as_str(), yellow));
		}
		process::exit(1);
	}

	match output {
		Some(output) => {
			let output_path = root.join(output);
			if let Some(parent) = output_path.parent() {
				std::fs::create_dir_all(parent)?;
			}
			std::fs::write(&output_path, &rendered.output)?;
			println!(
				"{} {}",
				colored!("Rendered:", green),
				make_relative(&output_path, &root)
			);
			if !rendered.is_complete() {
				eprintln!(
					"{} {} placeholder(s) left unresolved",
					colored!("warning:", yellow),
					rendered.tokens.unresolved().count()
				);
			}
		}
		None if show_diff => {}
		None => print!("{}", rendered.output),
	}

	Ok(())
}

fn run_compile(
	args: &WeaveCli,
	file: &Path,
	group: Option<&str>,
	format: CompileOutputFormat,
	render: bool,
) -> Result<(), Box<dyn std::error::Error>> {
	let root = resolve_root(args);
	let config = load_config(&root)?;
	let group = group.unwrap_or_else(|| config.group()).to_string();

	let resolvers = XrefResolvers::with_builtins(&root);
	let mut compiler = TreeCompiler::new(&resolvers).group(group);
	let mut tree = compiler.compile_xref(&XrefSpec::file(file.to_string_lossy()))?;
	tracing::debug!(fragments = compiler.xrefs().len(), "compiled tree");

	if render {
		let mut renderer = config.renderer(&root)?;
		renderer.render_tree(&mut tree)?;
	}

	let serializer = resolvers
		.serializers
		.for_content_type(format.content_type())?;
	let output = serializer.serialize(&tree)?;
	if output.ends_with('\n') {
		print!("{output}");
	} else {
		println!("{output}");
	}

	Ok(())
}

fn run_tokens(
	args: &WeaveCli,
	file: &Path,
	format: TokensOutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
	let root = resolve_root(args);
	let config = load_config(&root)?;
	let source = std::fs::read_to_string(root.join(file))?;

	let mut renderer = config.renderer(&root)?;
	let tokens = renderer.resolve(&source)?;

	match format {
		TokensOutputFormat::Json => {
			let entries: Vec<serde_json::Value> = tokens.iter().map(token_to_json).collect();
			let output = serde_json::json!({
				"complete": tokens.unresolved().next().is_none(),
				"tokens": entries,
			});
			println!("{}", serde_json::to_string_pretty(&output)?);
		}
		TokensOutputFormat::Text => print_tokens(&tokens),
	}

	Ok(())
}

fn token_to_json(token: &Token) -> serde_json::Value {
	serde_json::json!({
		"placeholder": token.placeholder,
		"name": token.name,
		"filters": token.filters,
		"offsets": token.offsets.iter().collect::<Vec<_>>(),
		"resolved": token.is_resolved(),
		"value": token.value(),
		"unknown_filters": token.unresolved_filters(),
	})
}

fn print_tokens(tokens: &TokenCollection) {
	if tokens.is_empty() {
		println!("No placeholders found.");
		return;
	}

	for token in tokens {
		let offsets = token
			.offsets
			.iter()
			.map(ToString::to_string)
			.collect::<Vec<_>>()
			.join(", ");
		let filters = if token.filters.is_empty() {
			String::new()
		} else {
			format!(" | {}", token.filters.join(" | "))
		};

		match token.value() {
			Some(value) if token.is_resolved() => {
				println!(
					"{} {}{filters} at {offsets} = {value:?}",
					colored!("resolved  ", green),
					token.name
				);
			}
			_ => {
				println!(
					"{} {}{filters} at {offsets}",
					colored!("unresolved", yellow),
					token.name
				);
			}
		}
	}

	let unresolved = tokens.unresolved().count();
	println!();
	println!(
		"{}",
		colored!(
			format!("{} placeholder(s), {unresolved} unresolved", tokens.len()),
			dimmed
		)
	);
}

fn print_diff(current: &str, expected: &str) {
	let diff = TextDiff::from_lines(current, expected);
	for change in diff.iter_all_changes() {
		match change.tag() {
			ChangeTag::Delete => {
				eprint!("  {}", colored!(format!("-{change}"), red));
			}
			ChangeTag::Insert => {
				eprint!("  {}", colored!(format!("+{change}"), green));
			}
			ChangeTag::Equal => {
				eprint!("   {change}");
			}
		}
	}
}

/// Make a path relative to root for display purposes.
fn make_relative(path: &Path, root: &Path) -> String {
	path.strip_prefix(root)
		.unwrap_or(path)
		.display()
		.to_string()
}
