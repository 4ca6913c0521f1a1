use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum WeaveError {
	#[error(transparent)]
	#[diagnostic(code(weave::io_error))]
	Io(#[from] std::io::Error),

	#[error("unknown token: `{0}`")]
	#[diagnostic(
		code(weave::unknown_token),
		help("register a value for `{0}` or enable `ignore_unknown` in weave.toml")
	)]
	UnknownToken(String),

	#[error("unknown filter: `{0}`")]
	#[diagnostic(
		code(weave::unknown_filter),
		help(
			"available filters: upper, lower, trim, ucfirst, lcfirst, snake, kebab, camel, \
			 pascal, title, shouty, dash, underscore, dot, shell, json"
		)
	)]
	UnknownFilter(String),

	#[error("token `{token}` is out of scope: no value at `{path}`")]
	#[diagnostic(
		code(weave::out_of_scope),
		help("check the path against the scope data or set `ignore_out_of_scope = true`")
	)]
	OutOfScope { token: String, path: String },

	#[error("value of scope token `{token}` cannot be serialized: {reason}")]
	#[diagnostic(code(weave::scope_token_value_serialization))]
	ScopeTokenValueSerialization { token: String, reason: String },

	#[error("malformed token `{token}`: {reason}")]
	#[diagnostic(code(weave::token_format))]
	TokenFormat { token: String, reason: String },

	#[error("text does not match the source the tokens were parsed from")]
	#[diagnostic(
		code(weave::unknown_token_source),
		help("parse the text again before injecting into it")
	)]
	UnknownTokenSource,

	#[error("token `{token}` is no longer found at offset {offset}")]
	#[diagnostic(
		code(weave::token_offset_mismatch),
		help("the text changed after parsing; inject with hash checking to detect this early")
	)]
	TokenOffsetMismatch { token: String, offset: usize },

	#[error("invalid token pattern `{pattern}`: {reason}")]
	#[diagnostic(code(weave::invalid_pattern))]
	InvalidPattern { pattern: String, reason: String },

	#[error("`{name}` is already registered as a {kind}")]
	#[diagnostic(code(weave::already_registered))]
	AlreadyRegistered { kind: &'static str, name: String },

	#[error("no fetcher registered for xref type `{0}`")]
	#[diagnostic(
		code(weave::unknown_xref_type),
		help("built-in xref types: file, inline, command")
	)]
	UnknownXrefType(String),

	#[error("unsupported content type: `{0}`")]
	#[diagnostic(
		code(weave::unknown_content_type),
		help("supported formats: json, toml, yaml, yml, ini, kdl, text")
	)]
	UnknownContentType(String),

	#[error("failed to fetch `{location}` ({kind}): {reason}")]
	#[diagnostic(code(weave::xref_resolver_fetch))]
	XrefResolverFetch {
		kind: String,
		location: String,
		reason: String,
	},

	#[error("syntax error in {format} content from `{location}`: {reason}")]
	#[diagnostic(code(weave::tree_syntax))]
	TreeSyntax {
		format: &'static str,
		location: String,
		reason: String,
	},

	#[error("tree cannot be written as {format}: {reason}")]
	#[diagnostic(code(weave::tree_serialize))]
	TreeSerialize { format: &'static str, reason: String },

	#[error("no xref registered with id `{0}`")]
	#[diagnostic(code(weave::unknown_xref))]
	UnknownXref(String),

	#[error("`include.{group}` names `{name}` which is not declared in `include.xref`")]
	#[diagnostic(
		code(weave::unknown_include),
		help("add an `include.xref.{name}` entry or remove it from `include.{group}`")
	)]
	UnknownInclude { group: String, name: String },

	#[error("invalid include section: {0}")]
	#[diagnostic(code(weave::invalid_include))]
	InvalidInclude(String),

	#[error("include cycle detected at `{location}`")]
	#[diagnostic(
		code(weave::xref_cycle),
		help("a fragment cannot include itself, directly or through other fragments")
	)]
	XrefCycle { location: String },

	#[error("failed to parse config file: {0}")]
	#[diagnostic(
		code(weave::config_parse),
		help("check that weave.toml is valid TOML with [tokens], [values] and/or [scope] sections")
	)]
	ConfigParse(String),
}

pub type WeaveResult<T> = Result<T, WeaveError>;
pub type AnyError = Box<dyn std::error::Error>;
pub type AnyEmptyResult = Result<(), AnyError>;
pub type AnyResult<T> = Result<T, AnyError>;
