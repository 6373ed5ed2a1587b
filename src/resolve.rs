//! Resolution of raw values into cooked values
//!
//! Each variable is resolved at most once. A reference to a variable that has
//! not been resolved yet resolves it first, and a default is expanded before
//! it is inserted, so substituted text never carries a reference that a
//! further pass would replace. The [`ExpansionStack`] catches variables that
//! depend on themselves, directly or through other variables.

use crate::configuration::{Configuration, Tokens, ValueSegment, tokenize};
use crate::error::{ConfigError, Location, SubstitutionError};
use crate::substitution::{
    ExpansionStack, Substituter, SubstitutionOptions, SubstitutionSyntax, VariableDereferencer,
    VariableSubstituter,
};
use indexmap::IndexMap;
use log::debug;
use std::collections::HashMap;

/// A parsed variable waiting for substitution
#[derive(Debug, Clone)]
pub(crate) struct PendingValue {
    section: String,
    name: String,
    segments: Vec<ValueSegment>,
    location: Location,
}

impl PendingValue {
    pub(crate) fn new(
        section: String,
        name: String,
        segments: Vec<ValueSegment>,
        location: Location,
    ) -> Self {
        Self {
            section,
            name,
            segments,
            location,
        }
    }
}

/// Resolves every pending variable and stores the cooked values.
///
/// Returns the number of references that were replaced.
pub(crate) fn resolve_all(
    configuration: &mut Configuration,
    pending: &IndexMap<String, PendingValue>,
    syntax: SubstitutionSyntax,
    options: SubstitutionOptions,
) -> Result<usize, ConfigError> {
    let mut resolver = Resolver {
        configuration: &*configuration,
        pending,
        substituter: Substituter::new(syntax, options),
        cooked: HashMap::with_capacity(pending.len()),
        stack: ExpansionStack::new(),
        substitutions: 0,
    };

    for (key, value) in pending {
        resolver
            .cook(key)
            .map_err(|source| ConfigError::Substitution {
                variable: key.clone(),
                location: value.location.clone(),
                source,
            })?;
    }

    let Resolver {
        mut cooked,
        substitutions,
        ..
    } = resolver;

    for (key, value) in pending {
        let Some((text, tokens)) = cooked.remove(key) else {
            continue;
        };
        if let Some(variable) = configuration
            .section_mut(&value.section)
            .and_then(|section| section.variable_mut(&value.name))
        {
            variable.set_cooked(text, tokens);
        }
    }

    debug!(
        "Resolved {} variables with {} substitutions",
        pending.len(),
        substitutions
    );
    Ok(substitutions)
}

struct Resolver<'a> {
    configuration: &'a Configuration,
    pending: &'a IndexMap<String, PendingValue>,
    substituter: Substituter,
    cooked: HashMap<String, (String, Tokens)>,
    stack: ExpansionStack,
    substitutions: usize,
}

impl Resolver<'_> {
    /// Returns the cooked value of a parsed variable, resolving it if needed
    fn cook(&mut self, key: &str) -> Result<Option<String>, SubstitutionError> {
        if let Some((text, _)) = self.cooked.get(key) {
            return Ok(Some(text.clone()));
        }
        let pending = self.pending;
        let Some(value) = pending.get(key) else {
            return Ok(None);
        };

        self.stack.push(key.to_string())?;
        let result = self.cook_segments(&value.section, &value.segments);
        self.stack.pop();

        let (text, tokens) = result?;
        self.cooked.insert(key.to_string(), (text.clone(), tokens));
        Ok(Some(text))
    }

    fn cook_segments(
        &mut self,
        section: &str,
        segments: &[ValueSegment],
    ) -> Result<(String, Tokens), SubstitutionError> {
        let substituter = self.substituter;
        let mut resolved = Vec::with_capacity(segments.len());

        for segment in segments {
            let text = if segment.is_literal() {
                segment.text.clone()
            } else {
                let mut scope = Scope {
                    resolver: &mut *self,
                    section,
                };
                substituter.substitute(&segment.text, &mut scope)?
            };
            resolved.push(ValueSegment {
                kind: segment.kind,
                text,
                quoted: segment.quoted,
            });
        }

        let text: String = resolved.iter().map(|s| s.text.as_str()).collect();
        Ok((text, tokenize(&resolved)))
    }

    /// Looks up `reference` as seen from a variable in `section`
    fn lookup(
        &mut self,
        section: &str,
        reference: &str,
    ) -> Result<Option<String>, SubstitutionError> {
        let (section, name) = reference.split_once(':').unwrap_or((section, reference));
        let key = format!("{section}:{name}");

        let value = match self.cook(&key)? {
            Some(value) => Some(value),
            None => self
                .configuration
                .get(section, name)
                .map(str::to_string),
        };
        if value.is_some() {
            self.substitutions += 1;
        }
        Ok(value)
    }
}

/// Dereferencer bound to the section of the variable being resolved
struct Scope<'r, 'a> {
    resolver: &'r mut Resolver<'a>,
    section: &'r str,
}

impl VariableDereferencer for Scope<'_, '_> {
    fn dereference(&mut self, name: &str) -> Result<Option<String>, SubstitutionError> {
        self.resolver.lookup(self.section, name)
    }
}
