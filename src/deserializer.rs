//! Serde deserializer implementation for resolved configurations
//!
//! A [`Configuration`] deserializes as a map of section name to section, and
//! a section as a map of variable name to value. Values are text, so numbers,
//! booleans and characters are parsed from the cooked value on demand, and
//! sequences are built from the value's tokens.

use crate::configuration::{Configuration, Section, Variable, parse_bool};
use crate::error::{ConfigError, SerdeError};
use crate::parser::{ConfigurationParser, ParserConfig};
use serde::de::value::StrDeserializer;
use serde::de::{self, DeserializeOwned, DeserializeSeed, Visitor};
use std::path::Path;

/// Deserializer over a whole configuration
pub struct ConfigurationDeserializer<'c> {
    configuration: &'c Configuration,
}

impl<'c> ConfigurationDeserializer<'c> {
    /// Creates a deserializer over the regular sections of `configuration`
    pub fn new(configuration: &'c Configuration) -> Self {
        Self { configuration }
    }
}

impl<'de> de::Deserializer<'de> for ConfigurationDeserializer<'_> {
    type Error = ConfigError;

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        visitor.visit_map(SectionMapAccess {
            sections: Box::new(self.configuration.sections()),
            current: None,
            len: self.configuration.len(),
        })
    }

    fn deserialize_option<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        visitor.visit_some(self)
    }

    fn deserialize_newtype_struct<V>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        visitor.visit_newtype_struct(self)
    }

    serde::forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf unit unit_struct seq tuple
        tuple_struct map struct enum identifier ignored_any
    }
}

/// Map access over sections
struct SectionMapAccess<'c> {
    sections: Box<dyn Iterator<Item = &'c Section> + 'c>,
    current: Option<&'c Section>,
    len: usize,
}

impl<'de> de::MapAccess<'de> for SectionMapAccess<'_> {
    type Error = ConfigError;

    fn next_key_seed<K>(&mut self, seed: K) -> Result<Option<K::Value>, Self::Error>
    where
        K: DeserializeSeed<'de>,
    {
        match self.sections.next() {
            Some(section) => {
                self.current = Some(section);
                self.len = self.len.saturating_sub(1);
                seed.deserialize(StrDeserializer::<ConfigError>::new(section.name()))
                    .map(Some)
            }
            None => Ok(None),
        }
    }

    fn next_value_seed<V>(&mut self, seed: V) -> Result<V::Value, Self::Error>
    where
        V: DeserializeSeed<'de>,
    {
        match self.current.take() {
            Some(section) => seed.deserialize(SectionDeserializer { section }),
            None => Err(ConfigError::Serde(SerdeError::Custom(
                "No section available for map entry".to_string(),
            ))),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.len)
    }
}

/// Deserializer over the variables of one section
pub struct SectionDeserializer<'c> {
    section: &'c Section,
}

impl<'c> SectionDeserializer<'c> {
    /// Creates a deserializer over `section`
    pub fn new(section: &'c Section) -> Self {
        Self { section }
    }
}

impl<'de> de::Deserializer<'de> for SectionDeserializer<'_> {
    type Error = ConfigError;

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        visitor.visit_map(VariableMapAccess {
            variables: Box::new(self.section.variables()),
            current: None,
            len: self.section.len(),
        })
    }

    fn deserialize_option<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        visitor.visit_some(self)
    }

    fn deserialize_newtype_struct<V>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        visitor.visit_newtype_struct(self)
    }

    serde::forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf unit unit_struct seq tuple
        tuple_struct map struct enum identifier ignored_any
    }
}

/// Map access over variables
struct VariableMapAccess<'c> {
    variables: Box<dyn Iterator<Item = &'c Variable> + 'c>,
    current: Option<&'c Variable>,
    len: usize,
}

impl<'de> de::MapAccess<'de> for VariableMapAccess<'_> {
    type Error = ConfigError;

    fn next_key_seed<K>(&mut self, seed: K) -> Result<Option<K::Value>, Self::Error>
    where
        K: DeserializeSeed<'de>,
    {
        match self.variables.next() {
            Some(variable) => {
                self.current = Some(variable);
                self.len = self.len.saturating_sub(1);
                seed.deserialize(StrDeserializer::<ConfigError>::new(variable.name()))
                    .map(Some)
            }
            None => Ok(None),
        }
    }

    fn next_value_seed<V>(&mut self, seed: V) -> Result<V::Value, Self::Error>
    where
        V: DeserializeSeed<'de>,
    {
        match self.current.take() {
            Some(variable) => seed.deserialize(ValueDeserializer::new(
                variable.value(),
                variable.tokens(),
            )),
            None => Err(ConfigError::Serde(SerdeError::Custom(
                "No value available for map entry".to_string(),
            ))),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.len)
    }
}

/// Deserializer for a single cooked value
struct ValueDeserializer<'c> {
    text: &'c str,
    tokens: &'c [String],
}

impl<'c> ValueDeserializer<'c> {
    fn new(text: &'c str, tokens: &'c [String]) -> Self {
        Self { text, tokens }
    }

    fn mismatch(&self, expected: &'static str) -> ConfigError {
        ConfigError::Serde(SerdeError::TypeMismatch {
            expected,
            found: self.text.to_string(),
        })
    }

    fn parse<T: std::str::FromStr>(&self, expected: &'static str) -> Result<T, ConfigError> {
        self.text.trim().parse().map_err(|_| self.mismatch(expected))
    }
}

macro_rules! deserialize_parsed {
    ($($method:ident => $ty:ty, $visit:ident, $expected:literal;)*) => {
        $(
            fn $method<V>(self, visitor: V) -> Result<V::Value, Self::Error>
            where
                V: Visitor<'de>,
            {
                visitor.$visit(self.parse::<$ty>($expected)?)
            }
        )*
    };
}

impl<'de> de::Deserializer<'de> for ValueDeserializer<'_> {
    type Error = ConfigError;

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        visitor.visit_str(self.text)
    }

    fn deserialize_bool<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        match parse_bool(self.text) {
            Some(b) => visitor.visit_bool(b),
            None => Err(self.mismatch("boolean")),
        }
    }

    deserialize_parsed! {
        deserialize_i8 => i8, visit_i8, "i8";
        deserialize_i16 => i16, visit_i16, "i16";
        deserialize_i32 => i32, visit_i32, "i32";
        deserialize_i64 => i64, visit_i64, "i64";
        deserialize_i128 => i128, visit_i128, "i128";
        deserialize_u8 => u8, visit_u8, "u8";
        deserialize_u16 => u16, visit_u16, "u16";
        deserialize_u32 => u32, visit_u32, "u32";
        deserialize_u64 => u64, visit_u64, "u64";
        deserialize_u128 => u128, visit_u128, "u128";
        deserialize_f32 => f32, visit_f32, "f32";
        deserialize_f64 => f64, visit_f64, "f64";
    }

    fn deserialize_char<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        let mut chars = self.text.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => visitor.visit_char(c),
            _ => Err(self.mismatch("single character")),
        }
    }

    fn deserialize_str<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        visitor.visit_str(self.text)
    }

    fn deserialize_string<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        visitor.visit_string(self.text.to_string())
    }

    fn deserialize_bytes<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        visitor.visit_bytes(self.text.as_bytes())
    }

    fn deserialize_byte_buf<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        visitor.visit_byte_buf(self.text.as_bytes().to_vec())
    }

    fn deserialize_option<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        visitor.visit_some(self)
    }

    fn deserialize_unit<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        if self.text.is_empty() {
            visitor.visit_unit()
        } else {
            Err(self.mismatch("empty value"))
        }
    }

    fn deserialize_unit_struct<V>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        self.deserialize_unit(visitor)
    }

    fn deserialize_newtype_struct<V>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        visitor.visit_seq(TokenSeqAccess {
            tokens: self.tokens.iter(),
        })
    }

    fn deserialize_tuple<V>(self, _len: usize, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        self.deserialize_seq(visitor)
    }

    fn deserialize_tuple_struct<V>(
        self,
        _name: &'static str,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        self.deserialize_seq(visitor)
    }

    fn deserialize_map<V>(self, _visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        Err(self.mismatch("section"))
    }

    fn deserialize_struct<V>(
        self,
        _name: &'static str,
        _fields: &'static [&'static str],
        _visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        Err(self.mismatch("section"))
    }

    fn deserialize_enum<V>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        visitor.visit_enum(StrDeserializer::<ConfigError>::new(self.text.trim()))
    }

    fn deserialize_identifier<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        visitor.visit_str(self.text)
    }

    fn deserialize_ignored_any<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        visitor.visit_unit()
    }
}

/// Sequence access over the tokens of a value
struct TokenSeqAccess<'c> {
    tokens: std::slice::Iter<'c, String>,
}

impl<'de> de::SeqAccess<'de> for TokenSeqAccess<'_> {
    type Error = ConfigError;

    fn next_element_seed<T>(&mut self, seed: T) -> Result<Option<T::Value>, Self::Error>
    where
        T: DeserializeSeed<'de>,
    {
        match self.tokens.next() {
            Some(token) => seed
                .deserialize(ValueDeserializer::new(token, std::slice::from_ref(token)))
                .map(Some),
            None => Ok(None),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.tokens.len())
    }
}

/// Deserializes a resolved configuration into a Rust type
pub fn from_configuration<T>(configuration: &Configuration) -> Result<T, ConfigError>
where
    T: DeserializeOwned,
{
    T::deserialize(ConfigurationDeserializer::new(configuration))
}

/// Deserializes one section into a Rust type
pub fn from_section<T>(section: &Section) -> Result<T, ConfigError>
where
    T: DeserializeOwned,
{
    T::deserialize(SectionDeserializer::new(section))
}

/// Convenience function to parse and deserialize configuration text
pub fn from_str<T>(text: &str) -> Result<T, ConfigError>
where
    T: DeserializeOwned,
{
    from_configuration(&ConfigurationParser::new().parse_str(text)?)
}

/// Convenience function to parse with custom options and deserialize
pub fn from_str_with_config<T>(text: &str, config: ParserConfig) -> Result<T, ConfigError>
where
    T: DeserializeOwned,
{
    from_configuration(&ConfigurationParser::new().with_config(config).parse_str(text)?)
}

/// Convenience function to parse and deserialize a file
pub fn from_path<T>(path: impl AsRef<Path>) -> Result<T, ConfigError>
where
    T: DeserializeOwned,
{
    from_configuration(&ConfigurationParser::new().parse_path(path)?)
}
