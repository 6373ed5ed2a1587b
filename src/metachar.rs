//! Metacharacter encoding and decoding
//!
//! Values in a configuration file may spell awkward characters as backslash
//! escapes: `\t`, `\n`, `\r`, `\f`, `\\`, `\ ` (a space that survives
//! trimming) and `\uXXXX`. Decoding is lenient: a malformed `\u` escape is
//! kept as literal text, and escapes this module does not know about (`\$`,
//! `\'`, ...) are left alone for the later stages that give them meaning.
//!
//! Both directions can work on a byte range of a larger buffer, so a writer
//! can encode just the value part of a `name: value` line.

use std::ops::Range;

/// Highest code point written verbatim (end of Latin Extended-A)
const MAX_VERBATIM: u32 = 0x17F;

/// Decodes every metacharacter escape in `input`.
pub fn decode_metacharacters(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut i = 0;

    while i < input.len() {
        let rest = &input[i..];
        let Some(escaped) = rest.strip_prefix('\\') else {
            let Some(ch) = rest.chars().next() else {
                break;
            };
            result.push(ch);
            i += ch.len_utf8();
            continue;
        };

        let simple = match escaped.chars().next() {
            Some('t') => Some('\t'),
            Some('n') => Some('\n'),
            Some('r') => Some('\r'),
            Some('f') => Some('\u{000C}'),
            Some('\\') => Some('\\'),
            Some(' ') => Some(' '),
            _ => None,
        };

        if let Some(ch) = simple {
            result.push(ch);
            i += 2;
        } else if let Some((ch, consumed)) = escaped
            .strip_prefix('u')
            .and_then(parse_unicode_escape)
        {
            result.push(ch);
            i += 2 + consumed;
        } else {
            // Unknown or malformed: keep the backslash, reprocess what follows
            result.push('\\');
            i += 1;
        }
    }

    result
}

/// Decodes the escapes inside `range` of `buffer` in place.
///
/// Returns the end offset of the decoded text.
///
/// # Panics
///
/// Panics if the range does not lie on `char` boundaries.
pub fn decode_range(buffer: &mut String, range: Range<usize>) -> usize {
    let decoded = decode_metacharacters(&buffer[range.clone()]);
    let end = range.start + decoded.len();
    buffer.replace_range(range, &decoded);
    end
}

/// Encodes `input` so that it can be written as a configuration value.
pub fn encode_metacharacters(input: &str) -> String {
    let mut result = String::with_capacity(input.len() + 8);
    let count = input.chars().count();

    for (index, ch) in input.chars().enumerate() {
        match ch {
            '\t' => result.push_str("\\t"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\u{000C}' => result.push_str("\\f"),
            '\\' => result.push_str("\\\\"),
            ' ' if index == 0 || index + 1 == count => result.push_str("\\ "),
            c if is_verbatim(c) => result.push(c),
            c => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    result.push_str(&format!("\\u{:04x}", unit));
                }
            }
        }
    }

    result
}

/// Encodes the characters inside `range` of `buffer` in place.
///
/// Returns the end offset of the encoded text.
///
/// # Panics
///
/// Panics if the range does not lie on `char` boundaries.
pub fn encode_range(buffer: &mut String, range: Range<usize>) -> usize {
    let encoded = encode_metacharacters(&buffer[range.clone()]);
    let end = range.start + encoded.len();
    buffer.replace_range(range, &encoded);
    end
}

/// Returns true if `ch` is written as itself by the encoder.
///
/// Control and format characters are never printable.
pub fn is_verbatim(ch: char) -> bool {
    (ch as u32) <= MAX_VERBATIM && !ch.is_control() && !is_format(ch)
}

/// Format (`Cf`) characters below [`MAX_VERBATIM`]
fn is_format(ch: char) -> bool {
    ch == '\u{ad}'
}

/// Parses the four hex digits after `\u`, joining surrogate pairs.
///
/// Returns the character and the number of bytes consumed after the `u`.
fn parse_unicode_escape(digits: &str) -> Option<(char, usize)> {
    let first = hex4(digits)?;
    match first {
        0xD800..=0xDBFF => {
            let low = digits.get(4..)?.strip_prefix("\\u").and_then(hex4)?;
            if !(0xDC00..=0xDFFF).contains(&low) {
                return None;
            }
            let code_point = 0x10000 + ((first - 0xD800) << 10) + (low - 0xDC00);
            char::from_u32(code_point)
                .filter(|c| !is_noncharacter(*c))
                .map(|c| (c, 10))
        }
        0xDC00..=0xDFFF => None,
        _ => char::from_u32(first)
            .filter(|c| !is_noncharacter(*c))
            .map(|c| (c, 4)),
    }
}

fn hex4(text: &str) -> Option<u32> {
    let digits = text.get(..4)?;
    if digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        u32::from_str_radix(digits, 16).ok()
    } else {
        None
    }
}

/// Code points permanently reserved as noncharacters
fn is_noncharacter(ch: char) -> bool {
    let cp = ch as u32;
    (0xFDD0..=0xFDEF).contains(&cp) || (cp & 0xFFFE) == 0xFFFE
}
