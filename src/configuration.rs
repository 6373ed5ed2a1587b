//! Section and variable store
//!
//! A [`Configuration`] is the result of one parse: an ordered set of named
//! sections, each an ordered set of named variables. Every variable keeps the
//! raw text it was written with next to its cooked value, the value after
//! metacharacter decoding, quote removal and variable substitution.

use crate::error::LookupError;
use crate::substitution::SubstitutionSyntax;
use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, Serializer};
use smallvec::SmallVec;
use url::Url;

/// Sections populated from the host environment rather than parsed text
pub const SPECIAL_SECTIONS: [&str; 3] = ["system", "env", "program"];

/// Tokens of a cooked value; most values have only a handful
pub type Tokens = SmallVec<[String; 4]>;

/// A single configuration variable
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    name: String,
    raw: String,
    cooked: String,
    tokens: Tokens,
    line: usize,
    section: String,
}

impl Variable {
    pub(crate) fn new(name: String, raw: String, line: usize, section: String) -> Self {
        Self {
            name,
            cooked: raw.clone(),
            raw,
            tokens: Tokens::new(),
            line,
            section,
        }
    }

    /// A variable whose raw and cooked values are the same text
    pub(crate) fn literal(name: String, value: String, section: String) -> Self {
        let mut tokens = Tokens::new();
        tokens.push(value.clone());
        Self {
            name,
            raw: value.clone(),
            cooked: value,
            tokens,
            line: 0,
            section,
        }
    }

    pub(crate) fn set_cooked(&mut self, cooked: String, tokens: Tokens) {
        self.cooked = cooked;
        self.tokens = tokens;
    }

    /// Returns the variable name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the value exactly as written in the source
    pub fn raw_value(&self) -> &str {
        &self.raw
    }

    /// Returns the cooked value
    pub fn value(&self) -> &str {
        &self.cooked
    }

    /// Returns the cooked value split on unquoted whitespace
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Returns the line the variable was defined on (0 if unknown)
    pub fn line(&self) -> usize {
        self.line
    }

    /// Returns the name of the section that owns this variable
    pub fn section_name(&self) -> &str {
        &self.section
    }

    /// Returns the `section:name` form of the variable's name
    pub fn qualified_name(&self) -> String {
        format!("{}:{}", self.section, self.name)
    }
}

/// A named group of variables
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    name: String,
    id: usize,
    variables: IndexMap<String, Variable>,
}

impl Section {
    pub(crate) fn new(name: String, id: usize) -> Self {
        Self {
            name,
            id,
            variables: IndexMap::new(),
        }
    }

    /// Adds a variable; returns false (and drops it) if the name is taken
    pub(crate) fn insert(&mut self, variable: Variable) -> bool {
        if self.variables.contains_key(variable.name()) {
            return false;
        }
        self.variables.insert(variable.name.clone(), variable);
        true
    }

    pub(crate) fn variable_mut(&mut self, name: &str) -> Option<&mut Variable> {
        self.variables.get_mut(name)
    }

    /// Returns the section name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the section's numeric ID
    pub fn id(&self) -> usize {
        self.id
    }

    /// Returns the variable names in definition order
    pub fn variable_names(&self) -> impl Iterator<Item = &str> {
        self.variables.keys().map(String::as_str)
    }

    /// Returns the variables in definition order
    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.variables.values()
    }

    /// Returns a variable by name
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }

    /// Returns the cooked value of a variable
    pub fn get(&self, name: &str) -> Option<&str> {
        self.variable(name).map(Variable::value)
    }

    /// Returns true if the section defines `name`
    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    /// Returns the number of variables
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// Returns true if the section has no variables
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}

/// Resolved configuration produced by a parse
#[derive(Debug, Clone)]
pub struct Configuration {
    sections: IndexMap<String, Section>,
    special: IndexMap<String, Section>,
    source: Option<Url>,
    syntax: SubstitutionSyntax,
    next_id: usize,
}

impl Configuration {
    pub(crate) fn new(syntax: SubstitutionSyntax, source: Option<Url>) -> Self {
        Self {
            sections: IndexMap::new(),
            special: IndexMap::new(),
            source,
            syntax,
            next_id: 0,
        }
    }

    fn allocate_id(&mut self) -> usize {
        self.next_id += 1;
        self.next_id
    }

    /// Creates `name`, or re-opens it if it exists; returns true if created
    pub(crate) fn open_section(&mut self, name: &str) -> bool {
        if self.sections.contains_key(name) {
            return false;
        }
        let id = self.allocate_id();
        self.sections
            .insert(name.to_string(), Section::new(name.to_string(), id));
        true
    }

    pub(crate) fn section_mut(&mut self, name: &str) -> Option<&mut Section> {
        self.sections.get_mut(name)
    }

    pub(crate) fn set_special_section<I>(&mut self, name: &str, entries: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let id = self.allocate_id();
        let mut section = Section::new(name.to_string(), id);
        for (key, value) in entries {
            section.insert(Variable::literal(key, value, name.to_string()));
        }
        self.special.insert(name.to_string(), section);
    }

    /// Returns true if `name` is one of the built-in sections
    pub fn is_special_section(name: &str) -> bool {
        SPECIAL_SECTIONS.contains(&name)
    }

    /// Returns the URL of the top-level document, if it had one
    pub fn source_url(&self) -> Option<&Url> {
        self.source.as_ref()
    }

    /// Returns the reference syntax the configuration was resolved with
    pub fn syntax(&self) -> SubstitutionSyntax {
        self.syntax
    }

    /// Returns the names of the parsed sections in definition order
    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    /// Returns the parsed sections in definition order
    pub fn sections(&self) -> impl Iterator<Item = &Section> {
        self.sections.values()
    }

    /// Returns a section by name, including the built-in sections
    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.get(name).or_else(|| self.special.get(name))
    }

    /// Returns true if the section exists
    pub fn has_section(&self, name: &str) -> bool {
        self.section(name).is_some()
    }

    /// Returns the number of parsed sections
    pub fn len(&self) -> usize {
        self.sections.len()
    }

    /// Returns true if no sections were parsed
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Returns the variable names of a section in definition order
    pub fn variable_names(&self, section: &str) -> Result<Vec<&str>, LookupError> {
        self.section(section)
            .map(|s| s.variable_names().collect())
            .ok_or_else(|| LookupError::NoSuchSection {
                section: section.to_string(),
            })
    }

    /// Returns a variable
    pub fn variable(&self, section: &str, name: &str) -> Option<&Variable> {
        self.section(section).and_then(|s| s.variable(name))
    }

    /// Returns the cooked value of a variable
    pub fn get(&self, section: &str, name: &str) -> Option<&str> {
        self.variable(section, name).map(Variable::value)
    }

    /// Returns the raw value of a variable
    pub fn get_raw(&self, section: &str, name: &str) -> Option<&str> {
        self.variable(section, name).map(Variable::raw_value)
    }

    /// Returns the tokens of a variable
    pub fn get_tokens(&self, section: &str, name: &str) -> Option<&[String]> {
        self.variable(section, name).map(Variable::tokens)
    }

    /// Returns the cooked value, failing if the section or variable is missing
    pub fn require_str(&self, section: &str, name: &str) -> Result<&str, LookupError> {
        let Some(found) = self.section(section) else {
            return Err(LookupError::NoSuchSection {
                section: section.to_string(),
            });
        };
        found.get(name).ok_or_else(|| LookupError::NoSuchVariable {
            section: section.to_string(),
            name: name.to_string(),
        })
    }

    /// Returns the cooked value, or `default` if it is missing
    pub fn get_str_or<'a>(&'a self, section: &str, name: &str, default: &'a str) -> &'a str {
        self.get(section, name).unwrap_or(default)
    }

    /// Returns an integer value; `None` if missing
    pub fn get_int(&self, section: &str, name: &str) -> Result<Option<i64>, LookupError> {
        self.get_parsed(section, name, "integer", |v| v.trim().parse().ok())
    }

    /// Returns an integer value, failing if it is missing
    pub fn require_int(&self, section: &str, name: &str) -> Result<i64, LookupError> {
        self.require_parsed(section, name, "integer", |v| v.trim().parse().ok())
    }

    /// Returns an integer value, or `default` if it is missing
    pub fn get_int_or(&self, section: &str, name: &str, default: i64) -> Result<i64, LookupError> {
        Ok(self.get_int(section, name)?.unwrap_or(default))
    }

    /// Returns a floating point value; `None` if missing
    pub fn get_float(&self, section: &str, name: &str) -> Result<Option<f64>, LookupError> {
        self.get_parsed(section, name, "number", |v| v.trim().parse().ok())
    }

    /// Returns a floating point value, failing if it is missing
    pub fn require_float(&self, section: &str, name: &str) -> Result<f64, LookupError> {
        self.require_parsed(section, name, "number", |v| v.trim().parse().ok())
    }

    /// Returns a boolean value; `None` if missing
    pub fn get_bool(&self, section: &str, name: &str) -> Result<Option<bool>, LookupError> {
        self.get_parsed(section, name, "boolean", parse_bool)
    }

    /// Returns a boolean value, failing if it is missing
    pub fn require_bool(&self, section: &str, name: &str) -> Result<bool, LookupError> {
        self.require_parsed(section, name, "boolean", parse_bool)
    }

    /// Returns a boolean value, or `default` if it is missing
    pub fn get_bool_or(&self, section: &str, name: &str, default: bool) -> Result<bool, LookupError> {
        Ok(self.get_bool(section, name)?.unwrap_or(default))
    }

    fn get_parsed<T>(
        &self,
        section: &str,
        name: &str,
        expected: &'static str,
        parse: impl Fn(&str) -> Option<T>,
    ) -> Result<Option<T>, LookupError> {
        match self.get(section, name) {
            None => Ok(None),
            Some(value) => parse(value).map(Some).ok_or_else(|| LookupError::InvalidValue {
                section: section.to_string(),
                name: name.to_string(),
                value: value.to_string(),
                expected,
            }),
        }
    }

    fn require_parsed<T>(
        &self,
        section: &str,
        name: &str,
        expected: &'static str,
        parse: impl Fn(&str) -> Option<T>,
    ) -> Result<T, LookupError> {
        let value = self.require_str(section, name)?;
        parse(value).ok_or_else(|| LookupError::InvalidValue {
            section: section.to_string(),
            name: name.to_string(),
            value: value.to_string(),
            expected,
        })
    }
}

impl Serialize for Configuration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.sections.len()))?;
        for section in self.sections.values() {
            map.serialize_entry(section.name(), section)?;
        }
        map.end()
    }
}

impl Serialize for Section {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.variables.len()))?;
        for variable in self.variables.values() {
            map.serialize_entry(variable.name(), variable.value())?;
        }
        map.end()
    }
}

/// Parses the boolean spellings accepted in configuration values
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

/// Whether a segment of a value takes part in substitution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    /// Single-quoted text, never substituted
    Literal,
    /// Plain or double-quoted text
    Substitutable,
}

/// A piece of a value between quote boundaries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueSegment {
    pub kind: SegmentKind,
    pub text: String,
    /// Quoted segments keep their whitespace inside one token
    pub quoted: bool,
}

impl ValueSegment {
    fn new(kind: SegmentKind, text: String, quoted: bool) -> Self {
        Self { kind, text, quoted }
    }

    /// Returns true if the segment is exempt from substitution
    pub fn is_literal(&self) -> bool {
        self.kind == SegmentKind::Literal
    }
}

/// Splits a raw value on quote boundaries.
///
/// `\'` and `\"` are literal quotes. Any other backslash pair is kept intact
/// for the metacharacter decoder and the substituter, so `'a\\'` ends
/// with an escaped backslash rather than an escaped quote. Returns the
/// unmatched quote character on failure.
pub fn split_segments(value: &str) -> Result<Vec<ValueSegment>, char> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut chars = value.chars();

    while let Some(ch) = chars.next() {
        match (ch, quote) {
            ('\\', _) => match chars.next() {
                Some(q @ ('\'' | '"')) => current.push(q),
                Some(other) => {
                    current.push('\\');
                    current.push(other);
                }
                None => current.push('\\'),
            },
            ('\'' | '"', None) => {
                if !current.is_empty() {
                    segments.push(ValueSegment::new(
                        SegmentKind::Substitutable,
                        std::mem::take(&mut current),
                        false,
                    ));
                }
                quote = Some(ch);
            }
            (c, Some(q)) if c == q => {
                let kind = if q == '\'' {
                    SegmentKind::Literal
                } else {
                    SegmentKind::Substitutable
                };
                segments.push(ValueSegment::new(kind, std::mem::take(&mut current), true));
                quote = None;
            }
            (c, _) => current.push(c),
        }
    }

    if let Some(q) = quote {
        return Err(q);
    }
    if !current.is_empty() {
        segments.push(ValueSegment::new(SegmentKind::Substitutable, current, false));
    }
    Ok(segments)
}

/// Splits resolved segments into tokens on unquoted whitespace
pub fn tokenize(segments: &[ValueSegment]) -> Tokens {
    let mut tokens = Tokens::new();
    let mut current = String::new();
    let mut started = false;

    for segment in segments {
        if segment.quoted {
            current.push_str(&segment.text);
            started = true;
            continue;
        }
        for ch in segment.text.chars() {
            if ch.is_whitespace() {
                if started {
                    tokens.push(std::mem::take(&mut current));
                    started = false;
                }
            } else {
                current.push(ch);
                started = true;
            }
        }
    }

    if started {
        tokens.push(current);
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Configuration {
        let mut config = Configuration::new(SubstitutionSyntax::UnixShell, None);
        config.set_special_section("env", vec![("HOME".to_string(), "/home/u".to_string())]);
        assert!(config.open_section("main"));
        let section = config.section_mut("main").unwrap();
        for (name, value) in [
            ("port", "8080"),
            ("ratio", "0.5"),
            ("debug", "Yes"),
            ("broken", "eleven"),
        ] {
            assert!(section.insert(Variable::new(
                name.to_string(),
                value.to_string(),
                1,
                "main".to_string()
            )));
        }
        config
    }

    #[test]
    fn test_sections_and_ids() {
        let mut config = sample();
        assert!(!config.open_section("main"));
        assert!(config.open_section("other"));

        let names: Vec<&str> = config.section_names().collect();
        assert_eq!(names, vec!["main", "other"]);
        assert!(config.section("main").unwrap().id() < config.section("other").unwrap().id());

        assert!(config.has_section("env"));
        assert_eq!(config.len(), 2);
        assert_eq!(config.get("env", "HOME"), Some("/home/u"));
        assert!(Configuration::is_special_section("program"));
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let mut config = sample();
        let section = config.section_mut("main").unwrap();
        let dup = Variable::new("port".to_string(), "1".to_string(), 9, "main".to_string());
        assert!(!section.insert(dup));
        assert_eq!(section.get("port"), Some("8080"));
    }

    #[test]
    fn test_typed_accessors() {
        let config = sample();
        assert_eq!(config.require_int("main", "port").unwrap(), 8080);
        assert_eq!(config.get_int("main", "missing").unwrap(), None);
        assert_eq!(config.get_int_or("main", "missing", 7).unwrap(), 7);
        assert_eq!(config.require_float("main", "ratio").unwrap(), 0.5);
        assert!(config.require_bool("main", "debug").unwrap());
        assert!(!config.get_bool_or("main", "missing", false).unwrap());
        assert_eq!(config.get_str_or("main", "missing", "dflt"), "dflt");

        assert!(matches!(
            config.require_int("main", "broken"),
            Err(LookupError::InvalidValue { expected: "integer", .. })
        ));
        assert!(matches!(
            config.require_str("nope", "port"),
            Err(LookupError::NoSuchSection { .. })
        ));
        assert!(matches!(
            config.require_str("main", "nope"),
            Err(LookupError::NoSuchVariable { .. })
        ));
    }

    #[test]
    fn test_parse_bool_spellings() {
        for yes in ["true", "YES", "On", "1"] {
            assert_eq!(parse_bool(yes), Some(true));
        }
        for no in ["false", "no", "OFF", "0"] {
            assert_eq!(parse_bool(no), Some(false));
        }
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_split_segments() {
        let segments = split_segments(r#"plain 'lit $x' "dq $y" tail"#).unwrap();
        assert_eq!(segments.len(), 5);
        assert_eq!(segments[0].text, "plain ");
        assert!(segments[1].is_literal());
        assert_eq!(segments[1].text, "lit $x");
        assert_eq!(segments[2].text, " ");
        assert!(!segments[3].is_literal());
        assert!(segments[3].quoted);
        assert_eq!(segments[3].text, "dq $y");
        assert_eq!(segments[4].text, " tail");
    }

    #[test]
    fn test_split_segments_escapes_and_errors() {
        let segments = split_segments(r#"it\'s \$x"#).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].text, r"it's \$x");

        let segments = split_segments(r"'ends in \\' \\\' \t").unwrap();
        assert_eq!(segments[0].text, r"ends in \\");
        assert!(segments[0].is_literal());
        assert_eq!(segments[1].text, r" \\' \t");

        assert_eq!(split_segments("'open"), Err('\''));
        assert_eq!(split_segments("a \"open"), Err('"'));
        assert_eq!(split_segments("").unwrap(), Vec::new());
    }

    #[test]
    fn test_tokenize() {
        let segments = split_segments(r#"a  b "c d" e'f g'"#).unwrap();
        let tokens = tokenize(&segments);
        assert_eq!(tokens.as_slice(), ["a", "b", "c d", "ef g"]);

        let segments = split_segments(r#""""#).unwrap();
        assert_eq!(tokenize(&segments).as_slice(), [""]);
    }

    #[test]
    fn test_serialize_to_json() {
        let config = sample();
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["main"]["port"], "8080");
        assert!(json.get("env").is_none());
    }
}
