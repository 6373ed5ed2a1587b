//! Error types and location tracking for configuration parsing
//!
//! Every fatal parse condition is reported with the document it came from and
//! the line it was found on, so callers can point users at the offending text.

use std::fmt;
use std::io;
use thiserror::Error;

/// Name used for documents that were not read from a URL
pub const ANONYMOUS_SOURCE: &str = "<input>";

/// Represents a location in a configuration document
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    /// URL (or `<input>`) of the document
    pub source: String,
    /// Line number (1-based, 0 when unknown)
    pub line: usize,
}

impl Location {
    /// Creates a new location
    pub fn new(source: impl Into<String>, line: usize) -> Self {
        Self {
            source: source.into(),
            line,
        }
    }

    /// Creates a location inside an anonymous document
    pub fn anonymous(line: usize) -> Self {
        Self::new(ANONYMOUS_SOURCE, line)
    }

    /// Returns true if the line number is known
    pub fn has_line(&self) -> bool {
        self.line > 0
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_line() {
            write!(f, "{}:{}", self.source, self.line)
        } else {
            f.write_str(&self.source)
        }
    }
}

/// Main error type for configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Structural parse error
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Include resolution error
    #[error("Include error: {0}")]
    Include(#[from] IncludeError),

    /// Variable substitution error while resolving a variable
    #[error("Substitution error in '{variable}' at {location}: {source}")]
    Substitution {
        variable: String,
        location: Location,
        #[source]
        source: SubstitutionError,
    },

    /// Typed accessor error
    #[error("Lookup error: {0}")]
    Lookup(#[from] LookupError),

    /// Serde deserialization error
    #[error("Serde error: {0}")]
    Serde(#[from] SerdeError),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// I/O error with the location it happened at
    #[error("IO error at {location}: {source}")]
    IoAt {
        location: Location,
        #[source]
        source: io::Error,
    },
}

impl ConfigError {
    /// Returns the document location associated with this error, if any
    pub fn location(&self) -> Option<&Location> {
        match self {
            ConfigError::Parse(e) => Some(e.location()),
            ConfigError::Include(e) => Some(e.location()),
            ConfigError::Substitution { location, .. } | ConfigError::IoAt { location, .. } => {
                Some(location)
            }
            ConfigError::Lookup(_) | ConfigError::Serde(_) | ConfigError::Io(_) => None,
        }
    }
}

/// Structural errors in the configuration text
#[derive(Debug, Error)]
pub enum ParseError {
    /// Section header without balanced brackets or without a name
    #[error("Malformed section header at {location}: {message}")]
    MalformedSection { message: String, location: Location },

    /// Variable assignment before the first section header
    #[error("Variable '{name}' at {location} is not inside a section")]
    VariableOutsideSection { name: String, location: Location },

    /// Second definition of a variable in the same section
    #[error("Duplicate variable '{name}' in section '{section}' at {location}")]
    DuplicateVariable {
        name: String,
        section: String,
        location: Location,
    },

    /// Assignment line with no `=` or `:`
    #[error("Missing '=' or ':' separator at {location}")]
    MissingSeparator { location: Location },

    /// Variable name containing illegal characters
    #[error("Invalid variable name '{name}' at {location}")]
    InvalidVariableName { name: String, location: Location },

    /// Include directive without a proper quoted target
    #[error("Malformed include directive at {location}: {message}")]
    MalformedInclude { message: String, location: Location },

    /// Quoted segment that never closes
    #[error("Unterminated {quote} quote in value at {location}")]
    UnterminatedQuote { quote: char, location: Location },

    /// Attempt to declare one of the built-in sections
    #[error("Section '{name}' at {location} is reserved")]
    ReservedSection { name: String, location: Location },
}

impl ParseError {
    /// Returns the location of the error
    pub fn location(&self) -> &Location {
        match self {
            ParseError::MalformedSection { location, .. }
            | ParseError::VariableOutsideSection { location, .. }
            | ParseError::DuplicateVariable { location, .. }
            | ParseError::MissingSeparator { location }
            | ParseError::InvalidVariableName { location, .. }
            | ParseError::MalformedInclude { location, .. }
            | ParseError::UnterminatedQuote { location, .. }
            | ParseError::ReservedSection { location, .. } => location,
        }
    }

    /// Returns a one-line hint on how to fix the error
    pub fn help(&self) -> &'static str {
        match self {
            ParseError::MalformedSection { .. } => "Section headers look like '[name]'",
            ParseError::VariableOutsideSection { .. } => {
                "Add a '[section]' header before the first variable"
            }
            ParseError::DuplicateVariable { .. } => {
                "Remove or rename one of the definitions; variables are never overwritten"
            }
            ParseError::MissingSeparator { .. } => "Use 'name = value' or 'name: value'",
            ParseError::InvalidVariableName { .. } => {
                "Variable names may contain letters, digits, '_', '.' and '-'"
            }
            ParseError::MalformedInclude { .. } => {
                "Include directives look like '%include \"path/or/url\"'"
            }
            ParseError::UnterminatedQuote { .. } => {
                "Close the quote, or escape it with a backslash"
            }
            ParseError::ReservedSection { .. } => {
                "The 'system', 'env' and 'program' sections are built in"
            }
        }
    }
}

/// Errors while resolving or opening included documents
#[derive(Debug, Error)]
pub enum IncludeError {
    /// The include target is neither a URL nor a resolvable path
    #[error("Invalid include target '{target}' at {location}: {message}")]
    InvalidTarget {
        target: String,
        message: String,
        location: Location,
    },

    /// The source loader cannot open this kind of URL
    #[error("Unsupported URL scheme '{scheme}' for '{url}' at {location}")]
    UnsupportedScheme {
        scheme: String,
        url: String,
        location: Location,
    },

    /// The target could not be opened
    #[error("Cannot open '{url}' included at {location}: {source}")]
    Unreachable {
        url: String,
        location: Location,
        #[source]
        source: io::Error,
    },

    /// Too many nested includes
    #[error("Include nesting deeper than {max} at {location}")]
    DepthExceeded { max: usize, location: Location },

    /// A document includes itself, directly or transitively
    #[error("Recursive include of '{url}' at {location}")]
    Cycle { url: String, location: Location },
}

impl IncludeError {
    /// Returns the location of the include directive
    pub fn location(&self) -> &Location {
        match self {
            IncludeError::InvalidTarget { location, .. }
            | IncludeError::UnsupportedScheme { location, .. }
            | IncludeError::Unreachable { location, .. }
            | IncludeError::DepthExceeded { location, .. }
            | IncludeError::Cycle { location, .. } => location,
        }
    }
}

/// Errors raised by variable substitution
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubstitutionError {
    /// Reference to an undefined variable while aborting on undefined
    #[error("Undefined variable '{name}'")]
    UndefinedVariable { name: String },

    /// Malformed reference while aborting on syntax errors
    #[error("Syntax error at offset {offset}: {message}")]
    Syntax { message: String, offset: usize },

    /// Variable whose value depends on itself
    #[error("Circular reference detected: {}", chain.join(" -> "))]
    Cycle { chain: Vec<String> },
}

/// Errors from the typed accessors
#[derive(Debug, Error)]
pub enum LookupError {
    /// No such section
    #[error("No section '{section}'")]
    NoSuchSection { section: String },

    /// No such variable in an existing section
    #[error("No variable '{name}' in section '{section}'")]
    NoSuchVariable { section: String, name: String },

    /// The value cannot be converted to the requested type
    #[error("Value '{value}' of '{section}:{name}' is not a valid {expected}")]
    InvalidValue {
        section: String,
        name: String,
        value: String,
        expected: &'static str,
    },
}

/// Serde integration errors
#[derive(Debug, Error)]
pub enum SerdeError {
    /// Custom serde error message
    #[error("{0}")]
    Custom(String),

    /// Value text that does not parse as the requested type
    #[error("Type mismatch: expected {expected}, found '{found}'")]
    TypeMismatch {
        expected: &'static str,
        found: String,
    },
}

impl serde::de::Error for ConfigError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        ConfigError::Serde(SerdeError::Custom(msg.to_string()))
    }
}

impl serde::de::Error for SerdeError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        SerdeError::Custom(msg.to_string())
    }
}
