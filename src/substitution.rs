//! Variable substitution
//!
//! Two interchangeable reference syntaxes are supported:
//!
//! - Unix shell: `$name`, `${name}`, `${section:name}` and
//!   `${name?default}`; `\$` is a literal dollar sign.
//! - Windows cmd: `%name%`; `%%` is a literal percent sign.
//!
//! A substituter never looks variables up itself. It asks a
//! [`VariableDereferencer`], which lets the configuration parser resolve
//! cross-section references and detect cycles while callers outside the
//! parser can plug in maps or the process environment.

use crate::error::SubstitutionError;
use std::collections::HashMap;

/// Capability that maps a variable name to its current value
pub trait VariableDereferencer {
    /// Returns the value of `name`, or `None` if it is undefined
    fn dereference(&mut self, name: &str) -> Result<Option<String>, SubstitutionError>;
}

/// Environment variable dereferencer
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvironmentDereferencer;

impl VariableDereferencer for EnvironmentDereferencer {
    fn dereference(&mut self, name: &str) -> Result<Option<String>, SubstitutionError> {
        Ok(std::env::var(name).ok())
    }
}

/// Map-based dereferencer
#[derive(Debug, Clone, Default)]
pub struct MapDereferencer {
    variables: HashMap<String, String>,
}

impl MapDereferencer {
    /// Creates an empty map dereferencer
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a dereferencer from an existing map
    pub fn from_map(variables: HashMap<String, String>) -> Self {
        Self { variables }
    }

    /// Inserts a variable
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(name.into(), value.into());
    }

    /// Returns the variables map
    pub fn variables(&self) -> &HashMap<String, String> {
        &self.variables
    }
}

impl VariableDereferencer for MapDereferencer {
    fn dereference(&mut self, name: &str) -> Result<Option<String>, SubstitutionError> {
        Ok(self.variables.get(name).cloned())
    }
}

/// Chained dereferencer that tries multiple dereferencers in order
#[derive(Default)]
pub struct ChainedDereferencer {
    dereferencers: Vec<Box<dyn VariableDereferencer>>,
}

impl ChainedDereferencer {
    /// Creates an empty chain
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a dereferencer to the chain
    pub fn add(&mut self, dereferencer: Box<dyn VariableDereferencer>) {
        self.dereferencers.push(dereferencer);
    }

    /// Creates a chain from a list of dereferencers
    pub fn from_dereferencers(dereferencers: Vec<Box<dyn VariableDereferencer>>) -> Self {
        Self { dereferencers }
    }
}

impl VariableDereferencer for ChainedDereferencer {
    fn dereference(&mut self, name: &str) -> Result<Option<String>, SubstitutionError> {
        for dereferencer in &mut self.dereferencers {
            if let Some(value) = dereferencer.dereference(name)? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }
}

/// Stack of variables currently being expanded, for cycle detection
#[derive(Debug, Clone, Default)]
pub struct ExpansionStack {
    names: Vec<String>,
}

impl ExpansionStack {
    /// Creates an empty stack
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes a variable, failing if it is already being expanded
    pub fn push(&mut self, name: String) -> Result<(), SubstitutionError> {
        if self.names.contains(&name) {
            let mut chain = self.names.clone();
            chain.push(name);
            return Err(SubstitutionError::Cycle { chain });
        }
        self.names.push(name);
        Ok(())
    }

    /// Pops the innermost variable
    pub fn pop(&mut self) {
        self.names.pop();
    }

    /// Returns the current expansion depth
    pub fn depth(&self) -> usize {
        self.names.len()
    }
}

/// Error behaviour shared by both syntaxes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubstitutionOptions {
    /// Fail on undefined variables instead of substituting `""`
    pub abort_on_undefined: bool,
    /// Fail on malformed references instead of copying them through
    pub abort_on_syntax_error: bool,
}

impl SubstitutionOptions {
    /// Creates the tolerant default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether undefined variables abort substitution
    pub fn with_abort_on_undefined(mut self, abort: bool) -> Self {
        self.abort_on_undefined = abort;
        self
    }

    /// Sets whether syntax errors abort substitution
    pub fn with_abort_on_syntax_error(mut self, abort: bool) -> Self {
        self.abort_on_syntax_error = abort;
        self
    }

    fn undefined(&self, name: &str) -> Result<String, SubstitutionError> {
        if self.abort_on_undefined {
            Err(SubstitutionError::UndefinedVariable {
                name: name.to_string(),
            })
        } else {
            Ok(String::new())
        }
    }

    fn syntax(&self, message: String, offset: usize) -> Result<(), SubstitutionError> {
        if self.abort_on_syntax_error {
            Err(SubstitutionError::Syntax { message, offset })
        } else {
            Ok(())
        }
    }
}

/// Trait for variable reference syntaxes
pub trait VariableSubstituter {
    /// Replaces every reference in `input`
    fn substitute(
        &self,
        input: &str,
        dereferencer: &mut dyn VariableDereferencer,
    ) -> Result<String, SubstitutionError>;

    /// Escapes `text` so that substitution reproduces it unchanged
    fn escape_references(&self, text: &str) -> String;

    /// Returns true if `ch` may appear in a variable name
    fn is_variable_name_char(&self, ch: char) -> bool {
        ch.is_alphanumeric() || matches!(ch, '_' | '.' | ':')
    }
}

/// `$name` / `${name}` substitution
#[derive(Debug, Clone, Copy, Default)]
pub struct UnixShellSubstituter {
    options: SubstitutionOptions,
}

impl UnixShellSubstituter {
    /// Creates a tolerant substituter
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a substituter with the given options
    pub fn with_options(options: SubstitutionOptions) -> Self {
        Self { options }
    }

    /// Returns the options in effect
    pub fn options(&self) -> &SubstitutionOptions {
        &self.options
    }

    /// Length in bytes of the bare `$name` at the start of `text`
    fn simple_name_len(&self, text: &str) -> usize {
        match text.chars().next() {
            Some(c) if c.is_alphanumeric() || c == '_' => {}
            _ => return 0,
        }
        let end = text
            .char_indices()
            .find(|&(_, c)| !self.is_variable_name_char(c))
            .map_or(text.len(), |(i, _)| i);
        // A trailing qualifier separator or dot is punctuation, not name
        text[..end].trim_end_matches(['.', ':']).len()
    }

    fn is_valid_name(&self, name: &str) -> bool {
        !name.is_empty() && name.chars().all(|c| self.is_variable_name_char(c))
    }

    /// Expands the body of `${...}`; `None` means copy the text through
    fn expand_braced(
        &self,
        body: &str,
        offset: usize,
        dereferencer: &mut dyn VariableDereferencer,
    ) -> Result<Option<String>, SubstitutionError> {
        let (name, default) = match body.split_once('?') {
            Some((name, default)) => (name, Some(default.replace("??", "?"))),
            None => (body, None),
        };

        if !self.is_valid_name(name) {
            self.options
                .syntax(format!("invalid variable name '{}'", name), offset)?;
            return Ok(None);
        }

        // A default is expanded only when it is used
        let value = match (dereferencer.dereference(name)?, default) {
            (Some(value), Some(default)) if value.is_empty() => {
                self.substitute(&default, dereferencer)?
            }
            (Some(value), _) => value,
            (None, Some(default)) => self.substitute(&default, dereferencer)?,
            (None, None) => self.options.undefined(name)?,
        };
        Ok(Some(value))
    }
}

/// Offset of the `}` closing a `${` whose body starts `text`, skipping
/// nested references and escaped dollars
fn closing_brace(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\\' if bytes.get(i + 1) == Some(&b'$') => i += 1,
            b'$' if bytes.get(i + 1) == Some(&b'{') => {
                depth += 1;
                i += 1;
            }
            b'}' if depth == 0 => return Some(i),
            b'}' => depth -= 1,
            _ => {}
        }
        i += 1;
    }

    None
}

impl VariableSubstituter for UnixShellSubstituter {
    fn substitute(
        &self,
        input: &str,
        dereferencer: &mut dyn VariableDereferencer,
    ) -> Result<String, SubstitutionError> {
        let mut result = String::with_capacity(input.len());
        let mut i = 0;

        while i < input.len() {
            let rest = &input[i..];

            if rest.starts_with("\\$") {
                result.push('$');
                i += 2;
            } else if let Some(after) = rest.strip_prefix("${") {
                let Some(close) = closing_brace(after) else {
                    self.options
                        .syntax("unterminated '${' reference".to_string(), i)?;
                    result.push_str(rest);
                    break;
                };
                let consumed = close + 3;
                match self.expand_braced(&after[..close], i, dereferencer)? {
                    Some(value) => result.push_str(&value),
                    None => result.push_str(&rest[..consumed]),
                }
                i += consumed;
            } else if let Some(after) = rest.strip_prefix('$') {
                let len = self.simple_name_len(after);
                if len == 0 {
                    result.push('$');
                } else {
                    let name = &after[..len];
                    match dereferencer.dereference(name)? {
                        Some(value) => result.push_str(&value),
                        None => result.push_str(&self.options.undefined(name)?),
                    }
                }
                i += 1 + len;
            } else if let Some(ch) = rest.chars().next() {
                result.push(ch);
                i += ch.len_utf8();
            }
        }

        Ok(result)
    }

    fn escape_references(&self, text: &str) -> String {
        text.replace('$', "\\$")
    }
}

/// `%name%` substitution
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowsCmdSubstituter {
    options: SubstitutionOptions,
}

impl WindowsCmdSubstituter {
    /// Creates a tolerant substituter
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a substituter with the given options
    pub fn with_options(options: SubstitutionOptions) -> Self {
        Self { options }
    }

    /// Returns the options in effect
    pub fn options(&self) -> &SubstitutionOptions {
        &self.options
    }
}

impl VariableSubstituter for WindowsCmdSubstituter {
    fn substitute(
        &self,
        input: &str,
        dereferencer: &mut dyn VariableDereferencer,
    ) -> Result<String, SubstitutionError> {
        let mut result = String::with_capacity(input.len());
        let mut i = 0;

        while i < input.len() {
            let rest = &input[i..];

            if rest.starts_with("%%") {
                result.push('%');
                i += 2;
            } else if let Some(after) = rest.strip_prefix('%') {
                let len = after
                    .char_indices()
                    .find(|&(_, c)| !self.is_variable_name_char(c))
                    .map_or(after.len(), |(idx, _)| idx);
                if len == 0 {
                    result.push('%');
                    i += 1;
                } else if after[len..].starts_with('%') {
                    let name = &after[..len];
                    match dereferencer.dereference(name)? {
                        Some(value) => result.push_str(&value),
                        None => result.push_str(&self.options.undefined(name)?),
                    }
                    i += len + 2;
                } else {
                    self.options.syntax(
                        format!("unterminated reference '%{}'", &after[..len]),
                        i,
                    )?;
                    result.push_str(&rest[..len + 1]);
                    i += len + 1;
                }
            } else if let Some(ch) = rest.chars().next() {
                result.push(ch);
                i += ch.len_utf8();
            }
        }

        Ok(result)
    }

    fn escape_references(&self, text: &str) -> String {
        text.replace('%', "%%")
    }
}

/// Reference syntax understood by a parser
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SubstitutionSyntax {
    /// `$name`, `${section:name}`, `${name?default}`
    #[default]
    UnixShell,
    /// `%name%`
    WindowsCmd,
}

/// Closed set of substituters, dispatched by syntax
#[derive(Debug, Clone, Copy)]
pub enum Substituter {
    UnixShell(UnixShellSubstituter),
    WindowsCmd(WindowsCmdSubstituter),
}

impl Substituter {
    /// Creates the substituter for `syntax`
    pub fn new(syntax: SubstitutionSyntax, options: SubstitutionOptions) -> Self {
        match syntax {
            SubstitutionSyntax::UnixShell => {
                Substituter::UnixShell(UnixShellSubstituter::with_options(options))
            }
            SubstitutionSyntax::WindowsCmd => {
                Substituter::WindowsCmd(WindowsCmdSubstituter::with_options(options))
            }
        }
    }

    /// Returns the syntax this substituter understands
    pub fn syntax(&self) -> SubstitutionSyntax {
        match self {
            Substituter::UnixShell(_) => SubstitutionSyntax::UnixShell,
            Substituter::WindowsCmd(_) => SubstitutionSyntax::WindowsCmd,
        }
    }
}

impl VariableSubstituter for Substituter {
    fn substitute(
        &self,
        input: &str,
        dereferencer: &mut dyn VariableDereferencer,
    ) -> Result<String, SubstitutionError> {
        match self {
            Substituter::UnixShell(s) => s.substitute(input, dereferencer),
            Substituter::WindowsCmd(s) => s.substitute(input, dereferencer),
        }
    }

    fn escape_references(&self, text: &str) -> String {
        match self {
            Substituter::UnixShell(s) => s.escape_references(text),
            Substituter::WindowsCmd(s) => s.escape_references(text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> MapDereferencer {
        let mut map = MapDereferencer::new();
        for (name, value) in pairs {
            map.insert(*name, *value);
        }
        map
    }

    fn unix(input: &str, deref: &mut MapDereferencer) -> String {
        UnixShellSubstituter::new().substitute(input, deref).unwrap()
    }

    fn windows(input: &str, deref: &mut MapDereferencer) -> String {
        WindowsCmdSubstituter::new().substitute(input, deref).unwrap()
    }

    #[test]
    fn test_environment_dereferencer() {
        unsafe {
            std::env::set_var("VARCONF_SUBST_TEST_VAR", "test_value");
        }

        let mut deref = EnvironmentDereferencer;
        assert_eq!(
            deref.dereference("VARCONF_SUBST_TEST_VAR").unwrap(),
            Some("test_value".to_string())
        );
        assert_eq!(deref.dereference("VARCONF_NONEXISTENT_VAR").unwrap(), None);

        unsafe {
            std::env::remove_var("VARCONF_SUBST_TEST_VAR");
        }
    }

    #[test]
    fn test_chained_dereferencer() {
        let mut chained = ChainedDereferencer::new();
        chained.add(Box::new(vars(&[("a", "first")])));
        chained.add(Box::new(vars(&[("a", "second"), ("b", "fallback")])));

        assert_eq!(chained.dereference("a").unwrap(), Some("first".to_string()));
        assert_eq!(chained.dereference("b").unwrap(), Some("fallback".to_string()));
        assert_eq!(chained.dereference("c").unwrap(), None);
    }

    #[test]
    fn test_unix_simple_and_braced() {
        let mut deref = vars(&[("user", "alice"), ("host", "localhost"), ("db:port", "5432")]);
        assert_eq!(unix("$user@$host", &mut deref), "alice@localhost");
        assert_eq!(unix("${user}x", &mut deref), "alicex");
        assert_eq!(unix("${db:port}", &mut deref), "5432");
        assert_eq!(unix("$db:port", &mut deref), "5432");
    }

    #[test]
    fn test_unix_trailing_punctuation_not_in_name() {
        let mut deref = vars(&[("host", "h"), ("port", "80"), ("file.txt", "F")]);
        assert_eq!(unix("$host:$port", &mut deref), "h:80");
        assert_eq!(unix("end $host.", &mut deref), "end h.");
        assert_eq!(unix("$file.txt", &mut deref), "F");
    }

    #[test]
    fn test_unix_literals() {
        let mut deref = vars(&[("x", "X")]);
        assert_eq!(unix("cost \\$x", &mut deref), "cost $x");
        assert_eq!(unix("Price: $", &mut deref), "Price: $");
        assert_eq!(unix("$ and $-", &mut deref), "$ and $-");
        assert_eq!(unix("open ${x", &mut deref), "open ${x");
        assert_eq!(unix("${bad name}", &mut deref), "${bad name}");
    }

    #[test]
    fn test_unix_undefined_is_empty() {
        let mut deref = vars(&[]);
        assert_eq!(unix("[$nothing]", &mut deref), "[]");
        assert_eq!(unix("[${nothing}]", &mut deref), "[]");
    }

    #[test]
    fn test_unix_defaults() {
        let mut deref = vars(&[("y", ""), ("longerVariableName", " ")]);
        assert_eq!(unix("${y?abc def ghi}", &mut deref), "abc def ghi");
        assert_eq!(unix("${undefined?abc def ghi}", &mut deref), "abc def ghi");
        assert_eq!(unix("${longerVariableName?foo}", &mut deref), " ");
        assert_eq!(unix("${y??}", &mut deref), "?");
        assert_eq!(unix("${y?a??b}", &mut deref), "a?b");
        assert_eq!(unix("${y?}", &mut deref), "");
    }

    #[test]
    fn test_unix_defaults_are_expanded() {
        let mut deref = vars(&[("y", "Y"), ("empty", "")]);
        assert_eq!(unix("${x?$y}", &mut deref), "Y");
        assert_eq!(unix("${x?${y}}", &mut deref), "Y");
        assert_eq!(unix("${x?${empty?${y}/z}}!", &mut deref), "Y/z!");
        assert_eq!(unix("${x?\\$y}", &mut deref), "$y");
        assert_eq!(unix("${x?a}}", &mut deref), "a}");
    }

    #[test]
    fn test_unused_default_is_not_expanded() {
        let strict = UnixShellSubstituter::with_options(
            SubstitutionOptions::new().with_abort_on_undefined(true),
        );
        let mut deref = vars(&[("y", "Y")]);
        assert_eq!(strict.substitute("${y?$missing}", &mut deref).unwrap(), "Y");
        assert!(matches!(
            strict.substitute("${x?$missing}", &mut deref),
            Err(SubstitutionError::UndefinedVariable { .. })
        ));
    }

    #[test]
    fn test_unix_strict_modes() {
        let strict = UnixShellSubstituter::with_options(
            SubstitutionOptions::new()
                .with_abort_on_undefined(true)
                .with_abort_on_syntax_error(true),
        );
        let mut deref = vars(&[("a", "1")]);

        assert_eq!(strict.substitute("$a", &mut deref).unwrap(), "1");
        assert_eq!(
            strict.substitute("$missing", &mut deref),
            Err(SubstitutionError::UndefinedVariable {
                name: "missing".to_string()
            })
        );
        assert!(matches!(
            strict.substitute("abc ${a", &mut deref),
            Err(SubstitutionError::Syntax { offset: 4, .. })
        ));
        assert!(matches!(
            strict.substitute("${}", &mut deref),
            Err(SubstitutionError::Syntax { .. })
        ));
        // A default satisfies strict undefined checking
        assert_eq!(strict.substitute("${missing?d}", &mut deref).unwrap(), "d");
    }

    #[test]
    fn test_windows_substitution() {
        let mut deref = vars(&[("name", "world"), ("s:v", "qualified")]);
        assert_eq!(windows("hello %name%!", &mut deref), "hello world!");
        assert_eq!(windows("100%% sure", &mut deref), "100% sure");
        assert_eq!(windows("%s:v%", &mut deref), "qualified");
        assert_eq!(windows("%name%%name%", &mut deref), "worldworld");
        assert_eq!(windows("50% off", &mut deref), "50% off");
        assert_eq!(windows("tail %name", &mut deref), "tail %name");
        assert_eq!(windows("%missing%", &mut deref), "");
    }

    #[test]
    fn test_windows_strict_modes() {
        let strict = WindowsCmdSubstituter::with_options(
            SubstitutionOptions::new()
                .with_abort_on_undefined(true)
                .with_abort_on_syntax_error(true),
        );
        let mut deref = vars(&[]);
        assert!(matches!(
            strict.substitute("%nope%", &mut deref),
            Err(SubstitutionError::UndefinedVariable { .. })
        ));
        assert!(matches!(
            strict.substitute("x %open", &mut deref),
            Err(SubstitutionError::Syntax { offset: 2, .. })
        ));
        assert_eq!(strict.substitute("50% off", &mut deref).unwrap(), "50% off");
    }

    #[test]
    fn test_escape_references_round_trip() {
        let mut deref = vars(&[("x", "X")]);
        let unix_sub = Substituter::new(SubstitutionSyntax::UnixShell, SubstitutionOptions::new());
        let text = "costs $5 or ${x}";
        let escaped = unix_sub.escape_references(text);
        assert_eq!(unix_sub.substitute(&escaped, &mut deref).unwrap(), text);

        let win_sub = Substituter::new(SubstitutionSyntax::WindowsCmd, SubstitutionOptions::new());
        let text = "100% %x%";
        let escaped = win_sub.escape_references(text);
        assert_eq!(win_sub.substitute(&escaped, &mut deref).unwrap(), text);
        assert_eq!(win_sub.syntax(), SubstitutionSyntax::WindowsCmd);
    }

    #[test]
    fn test_expansion_stack() {
        let mut stack = ExpansionStack::new();
        assert!(stack.push("a".to_string()).is_ok());
        assert!(stack.push("b".to_string()).is_ok());
        assert_eq!(stack.depth(), 2);

        let err = stack.push("a".to_string()).unwrap_err();
        assert_eq!(
            err,
            SubstitutionError::Cycle {
                chain: vec!["a".to_string(), "b".to_string(), "a".to_string()]
            }
        );

        stack.pop();
        assert!(stack.push("b".to_string()).is_ok());
    }
}
