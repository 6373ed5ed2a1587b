//! # varconf
//!
//! A parser for sectioned, INI-style configuration files whose values can
//! refer to one another.
//!
//! ## Overview
//!
//! A configuration file is a sequence of `[section]` headers, each followed
//! by `name = value` (or `name: value`) assignments. On top of that format
//! the crate supports:
//!
//! - **Includes**: `%include "path-or-url"` splices another document in place,
//!   resolved relative to the including document
//! - **Variable substitution**: `${section:name}`, `$name` and
//!   `${name?default}` (Unix shell syntax) or `%name%` (Windows cmd syntax)
//! - **Metacharacters**: `\t`, `\n`, `\r`, `\f`, `\\`, `\ ` and `\uXXXX`
//! - **Quoting**: `'...'` is never substituted, `"..."` keeps its whitespace
//!   inside a single token
//! - **Built-in sections**: `env`, `system` and `program`
//! - **Serde integration**: deserialize a parsed configuration into your own
//!   types
//!
//! ## Basic Usage
//!
//! ```rust
//! use varconf::ConfigurationParser;
//!
//! let text = r#"
//! [server]
//! host = example.com
//! port = 8080
//! url = http://${host}:${port}/
//! "#;
//!
//! let config = ConfigurationParser::new().parse_str(text)?;
//! assert_eq!(config.get("server", "url"), Some("http://example.com:8080/"));
//! assert_eq!(config.require_int("server", "port")?, 8080);
//! # Ok::<(), varconf::ConfigError>(())
//! ```
//!
//! ## Serde
//!
//! ```rust
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct Server {
//!     host: String,
//!     port: u16,
//!     aliases: Vec<String>,
//! }
//!
//! #[derive(Deserialize)]
//! struct Config {
//!     server: Server,
//! }
//!
//! let config: Config = varconf::from_str("[server]\nhost = a\nport = 80\naliases = b \"c d\"\n")?;
//! assert_eq!(config.server.aliases, vec!["b", "c d"]);
//! # Ok::<(), varconf::ConfigError>(())
//! ```
//!
//! ## Windows Syntax
//!
//! ```rust
//! use varconf::{ConfigurationParser, ParserConfig, SubstitutionSyntax};
//!
//! let parser = ConfigurationParser::new()
//!     .with_config(ParserConfig::new().with_syntax(SubstitutionSyntax::WindowsCmd));
//! let config = parser.parse_str("[s]\nv = 50\nmsg = %v%%% done\n")?;
//! assert_eq!(config.get("s", "msg"), Some("50% done"));
//! # Ok::<(), varconf::ConfigError>(())
//! ```
//!
//! ## Error Handling
//!
//! Every error that comes from the text carries a [`Location`]:
//!
//! ```rust
//! use varconf::{ConfigError, ConfigurationParser, ParseError};
//!
//! match ConfigurationParser::new().parse_str("[s]\nx = 1\nx = 2\n") {
//!     Err(ConfigError::Parse(err @ ParseError::DuplicateVariable { .. })) => {
//!         assert_eq!(err.location().line, 3);
//!         println!("{err}\nhelp: {}", err.help());
//!     }
//!     other => panic!("unexpected {other:?}"),
//! }
//! ```

pub mod configuration;
pub mod deserializer;
pub mod error;
pub mod lexer;
pub mod metachar;
pub mod parser;
mod resolve;
mod special;
pub mod substitution;
pub mod writer;


// Re-export main types and functions
pub use configuration::{Configuration, Section, Variable};
pub use deserializer::{from_configuration, from_path, from_section, from_str, from_str_with_config};
pub use error::{
    ConfigError, IncludeError, Location, LookupError, ParseError, SerdeError, SubstitutionError,
};
pub use parser::{ConfigurationParser, FileLoader, MemoryLoader, ParserConfig, SourceLoader};
pub use writer::write_configuration;

// Re-export the codec
pub use metachar::{decode_metacharacters, encode_metacharacters};

// Re-export substitution types
pub use substitution::{
    ChainedDereferencer, EnvironmentDereferencer, MapDereferencer, Substituter,
    SubstitutionOptions, SubstitutionSyntax, UnixShellSubstituter, VariableDereferencer,
    VariableSubstituter, WindowsCmdSubstituter,
};
