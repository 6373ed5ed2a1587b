//! Configuration parser
//!
//! Drives the [`LineReader`] over a document, builds the section store,
//! expands include directives recursively and finally resolves every
//! variable's cooked value.

use crate::configuration::{Configuration, SPECIAL_SECTIONS, Variable, split_segments};
use crate::error::{ANONYMOUS_SOURCE, ConfigError, IncludeError, Location, ParseError};
use crate::lexer::{DEFAULT_INCLUDE_DIRECTIVE, LineKind, LineReader, ends_with_continuation};
use crate::metachar::decode_metacharacters;
use crate::resolve::{PendingValue, resolve_all};
use crate::special;
use crate::substitution::{SubstitutionOptions, SubstitutionSyntax};
use indexmap::IndexMap;
use log::{debug, trace};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Cursor};
use std::path::Path;
use url::Url;

/// Default limit on nested includes
pub const DEFAULT_MAX_INCLUDE_DEPTH: usize = 50;

/// Parser configuration options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserConfig {
    /// Maximum include nesting; the top-level document is depth 0
    pub max_include_depth: usize,
    /// Variable reference syntax
    pub syntax: SubstitutionSyntax,
    /// Fail on references to undefined variables
    pub abort_on_undefined: bool,
    /// Fail on malformed references
    pub abort_on_syntax_error: bool,
    /// Keyword that introduces an include directive
    pub include_directive: String,
    /// Fill the `system`, `env` and `program` sections from the host
    pub populate_special_sections: bool,
}

impl ParserConfig {
    /// Creates a new parser configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum include depth
    pub fn with_max_include_depth(mut self, depth: usize) -> Self {
        self.max_include_depth = depth;
        self
    }

    /// Sets the variable reference syntax
    pub fn with_syntax(mut self, syntax: SubstitutionSyntax) -> Self {
        self.syntax = syntax;
        self
    }

    /// Sets whether undefined variables abort the parse
    pub fn with_abort_on_undefined(mut self, abort: bool) -> Self {
        self.abort_on_undefined = abort;
        self
    }

    /// Sets whether malformed references abort the parse
    pub fn with_abort_on_syntax_error(mut self, abort: bool) -> Self {
        self.abort_on_syntax_error = abort;
        self
    }

    /// Sets the include directive keyword
    pub fn with_include_directive(mut self, directive: impl Into<String>) -> Self {
        self.include_directive = directive.into();
        self
    }

    /// Sets whether the built-in sections are filled from the host
    pub fn with_populate_special_sections(mut self, populate: bool) -> Self {
        self.populate_special_sections = populate;
        self
    }

    /// Returns the substitution options derived from this configuration
    pub fn substitution_options(&self) -> SubstitutionOptions {
        SubstitutionOptions::new()
            .with_abort_on_undefined(self.abort_on_undefined)
            .with_abort_on_syntax_error(self.abort_on_syntax_error)
    }
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_include_depth: DEFAULT_MAX_INCLUDE_DEPTH,
            syntax: SubstitutionSyntax::UnixShell,
            abort_on_undefined: false,
            abort_on_syntax_error: false,
            include_directive: DEFAULT_INCLUDE_DIRECTIVE.to_string(),
            populate_special_sections: true,
        }
    }
}

/// Opens documents named by URL.
///
/// An error of kind [`io::ErrorKind::Unsupported`] means the loader does not
/// handle the URL's scheme.
pub trait SourceLoader {
    /// Opens `url` for reading
    fn open(&self, url: &Url) -> io::Result<Box<dyn BufRead>>;
}

/// Loader for `file:` URLs
#[derive(Debug, Clone, Copy, Default)]
pub struct FileLoader;

impl SourceLoader for FileLoader {
    fn open(&self, url: &Url) -> io::Result<Box<dyn BufRead>> {
        if url.scheme() != "file" {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("no loader for scheme '{}'", url.scheme()),
            ));
        }
        let path = url.to_file_path().map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, format!("'{url}' is not a local path"))
        })?;
        Ok(Box::new(BufReader::new(File::open(path)?)))
    }
}

/// Loader serving documents from memory, keyed by URL
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    documents: HashMap<String, String>,
}

impl MemoryLoader {
    /// Creates an empty loader
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the text served for `url`
    pub fn insert(&mut self, url: &Url, text: impl Into<String>) {
        self.documents.insert(url.to_string(), text.into());
    }

    /// Returns the number of registered documents
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Returns true if no documents are registered
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

impl SourceLoader for MemoryLoader {
    fn open(&self, url: &Url) -> io::Result<Box<dyn BufRead>> {
        match self.documents.get(url.as_str()) {
            Some(text) => Ok(Box::new(Cursor::new(text.clone().into_bytes()))),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no document registered for '{url}'"),
            )),
        }
    }
}

/// Per-call parse state, threaded through nested includes
#[derive(Debug, Default)]
struct ParseState {
    current_section: Option<String>,
    depth: usize,
    open_urls: Vec<String>,
    pending: IndexMap<String, PendingValue>,
    lines: usize,
    includes: usize,
}

/// The document currently being read
struct Document {
    name: String,
    base: Option<Url>,
}

impl Document {
    fn from_url(url: &Url) -> Self {
        Self {
            name: url.to_string(),
            base: Some(url.clone()),
        }
    }

    fn anonymous(base: Option<Url>) -> Self {
        Self {
            name: ANONYMOUS_SOURCE.to_string(),
            base,
        }
    }

    fn location(&self, line: usize) -> Location {
        Location::new(self.name.clone(), line)
    }
}

/// Configuration parser
pub struct ConfigurationParser {
    config: ParserConfig,
    loader: Box<dyn SourceLoader>,
    program_variables: IndexMap<String, String>,
}

impl Default for ConfigurationParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigurationParser {
    /// Creates a parser with default options that reads `file:` URLs
    pub fn new() -> Self {
        Self {
            config: ParserConfig::default(),
            loader: Box::new(FileLoader),
            program_variables: IndexMap::new(),
        }
    }

    /// Replaces the parser options
    pub fn with_config(mut self, config: ParserConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the loader used to open URLs
    pub fn with_loader(mut self, loader: impl SourceLoader + 'static) -> Self {
        self.loader = Box::new(loader);
        self
    }

    /// Adds an entry to the `program` section
    pub fn with_program_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.program_variables.insert(name.into(), value.into());
        self
    }

    /// Returns the parser options
    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Parses configuration text; relative includes resolve against the
    /// current directory
    pub fn parse_str(&self, text: &str) -> Result<Configuration, ConfigError> {
        self.parse_reader(text.as_bytes(), None)
    }

    /// Parses a file on disk
    pub fn parse_path(&self, path: impl AsRef<Path>) -> Result<Configuration, ConfigError> {
        let path = path.as_ref();
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };
        let url = Url::from_file_path(&absolute).map_err(|_| {
            ConfigError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("cannot express '{}' as a URL", absolute.display()),
            ))
        })?;
        self.parse_url(&url)
    }

    /// Parses the document at `url` using the configured loader
    pub fn parse_url(&self, url: &Url) -> Result<Configuration, ConfigError> {
        let reader = self.loader.open(url).map_err(|source| ConfigError::IoAt {
            location: Location::new(url.as_str(), 0),
            source,
        })?;
        self.parse_reader(reader, Some(url.clone()))
    }

    /// Parses a buffered stream.
    ///
    /// `base` names the stream for diagnostics and anchors relative
    /// includes; without one the current directory is used.
    pub fn parse_reader<R: BufRead>(
        &self,
        reader: R,
        base: Option<Url>,
    ) -> Result<Configuration, ConfigError> {
        let mut configuration = Configuration::new(self.config.syntax, base.clone());
        self.populate_special_sections(&mut configuration);

        let mut state = ParseState::default();
        let document = match &base {
            Some(url) => {
                state.open_urls.push(url.to_string());
                Document::from_url(url)
            }
            None => Document::anonymous(current_dir_url()),
        };

        debug!("Parsing configuration {}", document.name);
        self.parse_document(reader, &document, &mut state, &mut configuration)?;

        let substitutions = resolve_all(
            &mut configuration,
            &state.pending,
            self.config.syntax,
            self.config.substitution_options(),
        )?;

        debug!(
            "Parsed {}: {} lines, {} includes, {} variables, {} substitutions",
            document.name,
            state.lines,
            state.includes,
            state.pending.len(),
            substitutions
        );
        Ok(configuration)
    }

    fn populate_special_sections(&self, configuration: &mut Configuration) {
        let populate = self.config.populate_special_sections;
        for name in SPECIAL_SECTIONS {
            let entries = match name {
                "system" if populate => special::system_variables(),
                "env" if populate => special::env_variables(),
                "program" => special::program_variables(populate, &self.program_variables),
                _ => Vec::new(),
            };
            configuration.set_special_section(name, entries);
        }
    }

    fn parse_document<R: BufRead>(
        &self,
        reader: R,
        document: &Document,
        state: &mut ParseState,
        configuration: &mut Configuration,
    ) -> Result<(), ConfigError> {
        let mut lines = LineReader::new(reader).with_include_directive(&self.config.include_directive);

        loop {
            let line = match lines.next_line() {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(source) => {
                    return Err(ConfigError::IoAt {
                        location: document.location(lines.line_number() + 1),
                        source,
                    });
                }
            };
            state.lines += 1;
            let location = document.location(line.number);

            match line.kind {
                LineKind::Blank | LineKind::Comment => {}
                LineKind::Section => {
                    let name = parse_section_header(&line.text, &location)?;
                    let created = configuration.open_section(&name);
                    trace!(
                        "{} section [{}] at {}",
                        if created { "Opened" } else { "Re-opened" },
                        name,
                        location
                    );
                    state.current_section = Some(name);
                }
                LineKind::Include => {
                    let target =
                        parse_include_target(&line.text, &self.config.include_directive, &location)?;
                    self.include(&target, document, location, state, configuration)?;
                }
                LineKind::Variable => {
                    self.define_variable(&line.text, location, state, configuration)?;
                }
            }
        }

        Ok(())
    }

    fn include(
        &self,
        target: &str,
        document: &Document,
        location: Location,
        state: &mut ParseState,
        configuration: &mut Configuration,
    ) -> Result<(), ConfigError> {
        let url = resolve_include(target, document.base.as_ref(), &location)?;

        if state.depth >= self.config.max_include_depth {
            return Err(IncludeError::DepthExceeded {
                max: self.config.max_include_depth,
                location,
            }
            .into());
        }
        if state.open_urls.iter().any(|open| open == url.as_str()) {
            return Err(IncludeError::Cycle {
                url: url.to_string(),
                location,
            }
            .into());
        }

        let reader = self.loader.open(&url).map_err(|source| {
            if source.kind() == io::ErrorKind::Unsupported {
                IncludeError::UnsupportedScheme {
                    scheme: url.scheme().to_string(),
                    url: url.to_string(),
                    location: location.clone(),
                }
            } else {
                IncludeError::Unreachable {
                    url: url.to_string(),
                    location: location.clone(),
                    source,
                }
            }
        })?;

        debug!("Including {} from {} (depth {})", url, location, state.depth + 1);
        state.includes += 1;
        state.depth += 1;
        state.open_urls.push(url.to_string());

        let result = self.parse_document(reader, &Document::from_url(&url), state, configuration);

        state.open_urls.pop();
        state.depth -= 1;
        result
    }

    fn define_variable(
        &self,
        text: &str,
        location: Location,
        state: &mut ParseState,
        configuration: &mut Configuration,
    ) -> Result<(), ConfigError> {
        let (name, raw) = parse_assignment(text, &location)?;

        let Some(section_name) = state.current_section.clone() else {
            return Err(ParseError::VariableOutsideSection { name, location }.into());
        };

        let mut segments = split_segments(&raw).map_err(|quote| ParseError::UnterminatedQuote {
            quote,
            location: location.clone(),
        })?;
        for segment in &mut segments {
            segment.text = decode_metacharacters(&segment.text);
        }

        let Some(section) = configuration.section_mut(&section_name) else {
            return Err(ParseError::VariableOutsideSection { name, location }.into());
        };
        let variable = Variable::new(name.clone(), raw, location.line, section_name.clone());
        if !section.insert(variable) {
            return Err(ParseError::DuplicateVariable {
                name,
                section: section_name,
                location,
            }
            .into());
        }

        trace!("Defined {}:{} at {}", section_name, name, location);
        state.pending.insert(
            format!("{section_name}:{name}"),
            PendingValue::new(section_name, name, segments, location),
        );
        Ok(())
    }
}

/// Extracts the section name from a `[name]` header
fn parse_section_header(text: &str, location: &Location) -> Result<String, ParseError> {
    let malformed = |message: &str| ParseError::MalformedSection {
        message: message.to_string(),
        location: location.clone(),
    };

    let trimmed = text.trim_end();
    let inner = trimmed
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .ok_or_else(|| malformed("missing closing ']'"))?;
    if inner.contains(['[', ']']) {
        return Err(malformed("unbalanced brackets"));
    }

    let name = inner.trim();
    if name.is_empty() {
        return Err(malformed("empty section name"));
    }
    if Configuration::is_special_section(name) {
        return Err(ParseError::ReservedSection {
            name: name.to_string(),
            location: location.clone(),
        });
    }
    Ok(name.to_string())
}

/// Extracts the quoted target of an include directive
fn parse_include_target(
    text: &str,
    directive: &str,
    location: &Location,
) -> Result<String, ParseError> {
    let malformed = |message: &str| ParseError::MalformedInclude {
        message: message.to_string(),
        location: location.clone(),
    };

    let rest = text.strip_prefix(directive).unwrap_or(text).trim();
    let target = rest
        .strip_prefix('"')
        .and_then(|r| r.strip_suffix('"'))
        .ok_or_else(|| malformed("target must be enclosed in double quotes"))?;
    if target.contains('"') {
        return Err(malformed("target contains an embedded quote"));
    }
    if target.is_empty() {
        return Err(malformed("empty target"));
    }
    Ok(target.to_string())
}

/// Turns an include target into the URL of the document to read
pub fn resolve_include(
    target: &str,
    base: Option<&Url>,
    location: &Location,
) -> Result<Url, IncludeError> {
    if let Ok(url) = Url::parse(target) {
        // One-letter schemes are drive letters
        if url.scheme().len() > 1 {
            return Ok(url);
        }
    }

    let invalid = |message: String| IncludeError::InvalidTarget {
        target: target.to_string(),
        message,
        location: location.clone(),
    };

    let Some(base) = base else {
        return Err(invalid("relative target without a base URL".to_string()));
    };

    let relative = if is_drive_path(target) {
        format!("/{}", target.replace('\\', "/"))
    } else {
        target.to_string()
    };
    base.join(&relative).map_err(|e| invalid(e.to_string()))
}

fn is_drive_path(target: &str) -> bool {
    let bytes = target.as_bytes();
    bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes[2] == b'\\' || bytes[2] == b'/')
}

/// Splits `name = value` / `name: value`
fn parse_assignment(text: &str, location: &Location) -> Result<(String, String), ParseError> {
    let Some(separator) = text.find(['=', ':']) else {
        return Err(ParseError::MissingSeparator {
            location: location.clone(),
        });
    };

    let name = text[..separator].trim_end();
    if name.is_empty() || !name.chars().all(is_variable_name_char) {
        return Err(ParseError::InvalidVariableName {
            name: name.to_string(),
            location: location.clone(),
        });
    }

    let value = trim_value(text[separator + 1..].trim_start());
    Ok((name.to_string(), value.to_string()))
}

/// Characters allowed in a variable name on the left of the separator
pub fn is_variable_name_char(ch: char) -> bool {
    ch.is_alphanumeric() || matches!(ch, '_' | '.' | '-')
}

/// Removes trailing whitespace, keeping one backslash-escaped blank
fn trim_value(value: &str) -> &str {
    let trimmed = value.trim_end();
    if trimmed.len() < value.len() && ends_with_continuation(trimmed) {
        let kept = value[trimmed.len()..]
            .chars()
            .next()
            .map_or(0, char::len_utf8);
        &value[..trimmed.len() + kept]
    } else {
        trimmed
    }
}

fn current_dir_url() -> Option<Url> {
    let cwd = std::env::current_dir().ok()?;
    Url::from_directory_path(cwd).ok()
}
