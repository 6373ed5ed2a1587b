//! Writes a resolved configuration back out as text

use crate::configuration::Configuration;
use crate::metachar::encode_range;
use crate::substitution::{Substituter, SubstitutionOptions, VariableSubstituter};
use std::io::{self, Write};

/// Writes the parsed sections of `configuration` to `out`.
///
/// Each cooked value is escaped so that parsing the output with the same
/// syntax yields the same cooked values. The built-in sections are skipped.
pub fn write_configuration<W: Write>(configuration: &Configuration, out: &mut W) -> io::Result<()> {
    let substituter = Substituter::new(configuration.syntax(), SubstitutionOptions::new());
    let mut line = String::new();

    for (index, section) in configuration.sections().enumerate() {
        if index > 0 {
            writeln!(out)?;
        }
        writeln!(out, "[{}]", section.name())?;

        for variable in section.variables() {
            line.clear();
            line.push_str(variable.name());
            line.push_str(": ");
            let start = line.len();
            line.push_str(variable.value());
            let len = line.len();
            let end = encode_range(&mut line, start..len);
            debug_assert_eq!(end, line.len());

            let escaped = substituter.escape_references(&escape_quotes(&line[start..]));
            line.truncate(start);
            line.push_str(&escaped);
            writeln!(out, "{line}")?;
        }
    }

    out.flush()
}

/// Renders `configuration` as a string
pub fn to_string(configuration: &Configuration) -> String {
    let mut buffer = Vec::new();
    // Writing to a Vec cannot fail
    let _ = write_configuration(configuration, &mut buffer);
    String::from_utf8_lossy(&buffer).into_owned()
}

fn escape_quotes(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if ch == '\'' || ch == '"' {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

impl Configuration {
    /// Writes the parsed sections to `out`; see [`write_configuration`]
    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        write_configuration(self, out)
    }
}
