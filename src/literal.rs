//! Character-, integer-, floating-point-, and string-literal lexical value
//! parsers (`spec.md` §4.3), ported from `dbcc_common_char_constant_value`,
//! `dbcc_common_integer_get_info`, and `dbcc_common_floating_point_get_info`.
//!
//! These operate on the already-tokenized lexeme text (phases 1-4 are out
//! of scope, per `spec.md` §1); they decide width/signedness/suffix and
//! decode escapes, they do not re-lex source.

use crate::diag::{Diag, DiagCode};
use crate::target::TargetProfile;

/// Width in bytes that a character-constant prefix selects.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CharPrefix {
    /// No prefix: plain `char`.
    None,
    /// `L'...'`: `wchar_t`.
    Wide,
    /// `u'...'`: `char16_t`-equivalent, always 2 bytes.
    Utf16,
    /// `U'...'`: `char32_t`-equivalent, always 4 bytes.
    Utf32,
}

impl CharPrefix {
    #[must_use]
    pub fn sizeof(self, target: &TargetProfile) -> u8 {
        match self {
            CharPrefix::None => 1,
            CharPrefix::Wide => target.sizeof_wchar,
            CharPrefix::Utf16 => 2,
            CharPrefix::Utf32 => 4,
        }
    }
}

/// The decoded value of a character constant: a codepoint plus the storage
/// width the prefix selected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CharConstant {
    pub codepoint: u32,
    pub prefix: CharPrefix,
}

/// Parse a character-constant lexeme including its surrounding quotes (and
/// optional prefix), e.g. `"'a'"`, `"L'\\n'"`, `"u'\\u00e9'"`.
pub fn parse_char_constant(text: &str) -> Result<CharConstant, Diag> {
    let bytes = text.as_bytes();
    if bytes.len() < 3 {
        return Err(Diag::new(DiagCode::CharacterConstantTooShort, "character constant too short"));
    }
    let (prefix, rest) = match bytes[0] {
        b'L' => (CharPrefix::Wide, &bytes[1..]),
        b'u' => (CharPrefix::Utf16, &bytes[1..]),
        b'U' => (CharPrefix::Utf32, &bytes[1..]),
        b'\'' => (CharPrefix::None, bytes),
        c => {
            return Err(Diag::new(
                DiagCode::BadCharacterSequence,
                format!("character constant starts with bad char '{}'", c as char),
            ))
        }
    };
    if rest.first() != Some(&b'\'') {
        return Err(Diag::new(DiagCode::BadCharacterSequence, "expected opening quote"));
    }
    let body = &rest[1..];
    if body.last() != Some(&b'\'') {
        return Err(Diag::new(DiagCode::BadCharacterSequence, "missing closing quote"));
    }
    let body = &body[..body.len() - 1];

    let codepoint = if body.first() == Some(&b'\\') {
        decode_escape(&body[1..])?
    } else {
        decode_utf8_codepoint(body)?
    };
    Ok(CharConstant { codepoint, prefix })
}

/// Decode a single escape sequence's payload (the bytes after the
/// backslash), returning the codepoint and the number of bytes of `escape`
/// it consumed. Matches the simple-escape / octal / `\u`&`\U` / `\x` grammar
/// of `spec.md` §4.3.
fn decode_escape_payload(escape: &[u8]) -> Result<(u32, usize), Diag> {
    let Some(&first) = escape.first() else {
        return Err(Diag::new(DiagCode::BadCharacterSequence, "empty escape sequence"));
    };
    match first {
        b'a' => Ok((0x07, 1)),
        b'b' => Ok((0x08, 1)),
        b'f' => Ok((0x0c, 1)),
        b'n' => Ok((b'\n' as u32, 1)),
        b'r' => Ok((b'\r' as u32, 1)),
        b't' => Ok((b'\t' as u32, 1)),
        b'v' => Ok((0x0b, 1)),
        b'\'' => Ok((b'\'' as u32, 1)),
        b'"' => Ok((b'"' as u32, 1)),
        b'?' => Ok((b'?' as u32, 1)),
        b'\\' => Ok((b'\\' as u32, 1)),
        b'0'..=b'7' => {
            let max_len = if first <= b'3' { 3 } else { 2 };
            let mut cp: u32 = 0;
            let mut used = 0usize;
            for &b in escape.iter().take(max_len) {
                if (b'0'..=b'7').contains(&b) {
                    cp = (cp << 3) | u32::from(b - b'0');
                    used += 1;
                } else {
                    break;
                }
            }
            if used == 0 {
                return Err(Diag::new(DiagCode::BadCharacterSequence, "empty octal escape"));
            }
            Ok((cp, used))
        }
        b'u' | b'U' => {
            let max_hex = if first == b'u' { 4 } else { 8 };
            let hex = &escape[1..];
            let mut cp: u32 = 0;
            let mut used = 0usize;
            for &b in hex.iter().take(max_hex) {
                let Some(d) = (b as char).to_digit(16) else { break };
                cp = (cp << 4) | d;
                used += 1;
            }
            if used == 0 {
                return Err(Diag::new(
                    DiagCode::BadUniversalCharacterSequence,
                    format!("need hex char after \\{}", first as char),
                ));
            }
            Ok((cp, used + 1))
        }
        b'x' => {
            let hex = &escape[1..];
            let mut cp: u32 = 0;
            let mut used = 0usize;
            for &b in hex {
                let Some(d) = (b as char).to_digit(16) else { break };
                cp = (cp << 4) | d;
                used += 1;
            }
            if used == 0 {
                return Err(Diag::new(DiagCode::BadCharacterSequence, "need at least one hex digit after \\x"));
            }
            Ok((cp, used + 1))
        }
        c => Err(Diag::new(DiagCode::BadCharacterSequence, format!("unrecognized escape '\\{}'", c as char))),
    }
}

/// Decode a single escape sequence's payload and discard the consumed
/// length, for callers (character constants) that already know the escape
/// spans the rest of the body.
fn decode_escape(escape: &[u8]) -> Result<u32, Diag> {
    decode_escape_payload(escape).map(|(cp, _)| cp)
}

fn decode_utf8_codepoint(body: &[u8]) -> Result<u32, Diag> {
    let s = std::str::from_utf8(body).map_err(|_| Diag::new(DiagCode::BadUtf8, "invalid UTF-8 in character constant"))?;
    let mut chars = s.chars();
    let c = chars.next().ok_or_else(|| Diag::new(DiagCode::BadUtf8, "empty character constant body"))?;
    Ok(c as u32)
}

/// Signedness and storage width of an integer-constant suffix, e.g. `u`,
/// `UL`, `ll`. `negate` records a leading `-` as a flag carried to the
/// literal expression, per `spec.md` §4.3.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IntSuffixInfo {
    pub is_signed: bool,
    pub sizeof_type: u8,
    pub negate: bool,
}

/// Parse the digit-sequence-plus-suffix tail of an integer constant (the
/// digits themselves are consumed by the caller/lexer; this decides the
/// resulting width/signedness the way `dbcc_common_integer_get_info` does).
///
/// `digits` is the numeral with base-prefix already stripped by the caller
/// (its value is not needed here, only its presence for the negate flag);
/// `suffix` is whatever trailed the digits (`u`, `U`, `l`, `L`, `ll`, `LL`,
/// and combinations, in either order, at most one of each class).
pub fn parse_int_suffix(negate: bool, suffix: &str, target: &TargetProfile) -> Result<IntSuffixInfo, Diag> {
    let bytes = suffix.as_bytes();
    let mut i = 0;
    let mut is_signed = true;
    let mut long_kind = 0u8; // 0 = none, 1 = long, 2 = long long

    // accept at most one of u|U, in either position relative to l/L
    let mut seen_unsigned = false;
    let mut seen_long = false;
    while i < bytes.len() {
        match bytes[i] {
            b'u' | b'U' if !seen_unsigned => {
                is_signed = false;
                seen_unsigned = true;
                i += 1;
            }
            b'l' | b'L' if !seen_long => {
                if i + 1 < bytes.len() && (bytes[i + 1] == b'l' || bytes[i + 1] == b'L') && bytes[i + 1] == bytes[i] {
                    long_kind = 2;
                    i += 2;
                } else {
                    long_kind = 1;
                    i += 1;
                }
                seen_long = true;
            }
            _ => {
                return Err(Diag::new(
                    DiagCode::BadNumberConstant,
                    format!("unexpected character in integer suffix: '{}'", bytes[i] as char),
                ))
            }
        }
    }

    let sizeof_type = match long_kind {
        2 => target.sizeof_long_long_int,
        1 => target.sizeof_long_int,
        _ => target.sizeof_int,
    };
    Ok(IntSuffixInfo { is_signed, sizeof_type, negate })
}

/// Decide base (implicit from leading `0x`/`0`/digit) and validate the
/// digit run, mirroring `dbcc_common_integer_get_info`'s scan. Returns the
/// numeral with sign and suffix stripped, plus the suffix text.
pub fn split_integer_literal(text: &str) -> Result<(&str, &str, bool), Diag> {
    let mut s = text;
    let negate = if let Some(rest) = s.strip_prefix('-') {
        if rest.is_empty() {
            return Err(Diag::new(DiagCode::BadNumberConstant, "nothing after minus sign"));
        }
        s = rest;
        true
    } else {
        false
    };

    let bytes = s.as_bytes();
    let digit_len = if bytes.first() == Some(&b'0') && bytes.get(1).map(|c| c.to_ascii_lowercase()) == Some(b'x') {
        let mut l = 2;
        while l < bytes.len() && bytes[l].is_ascii_hexdigit() {
            l += 1;
        }
        if l == 2 {
            return Err(Diag::new(DiagCode::BadHexadecimalConstant, "must have at least one hex digit after 0x"));
        }
        l
    } else if bytes.first() == Some(&b'0') {
        let mut l = 1;
        while l < bytes.len() && (b'0'..=b'7').contains(&bytes[l]) {
            l += 1;
        }
        l
    } else if bytes.first().is_some_and(u8::is_ascii_digit) {
        let mut l = 1;
        while l < bytes.len() && bytes[l].is_ascii_digit() {
            l += 1;
        }
        l
    } else {
        return Err(Diag::new(
            DiagCode::BadNumberConstant,
            format!("bad character in number '{}'", bytes.first().map_or('?', |&b| b as char)),
        ));
    };
    Ok((&s[..digit_len], &s[digit_len..], negate))
}

/// Floating-point type selected by a literal's trailing suffix.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FloatSuffix {
    Float,
    Double,
    LongDouble,
}

/// Validate a floating-constant's significand/exponent grammar (hex or
/// decimal) and pick its suffix-selected type, mirroring
/// `dbcc_common_floating_point_get_info`.
pub fn parse_float_literal(text: &str) -> Result<FloatSuffix, Diag> {
    let bytes = text.as_bytes();
    let mut skip = 0usize;
    if bytes.first() == Some(&b'+') || bytes.first() == Some(&b'-') {
        skip += 1;
    }
    if skip >= bytes.len() {
        return Err(Diag::new(DiagCode::BadNumberConstant, "unexpected end-of-number"));
    }

    if skip + 1 < bytes.len() && bytes[skip] == b'0' && bytes[skip + 1].to_ascii_lowercase() == b'x' {
        skip += 2;
        if skip >= bytes.len() {
            return Err(Diag::new(DiagCode::BadNumberConstant, "unexpected end-of-number"));
        }
        while skip < bytes.len() && (bytes[skip].is_ascii_hexdigit() || bytes[skip] == b'.') {
            skip += 1;
        }
        if skip < bytes.len() && (bytes[skip] == b'p' || bytes[skip] == b'P') {
            skip += 1;
            if skip >= bytes.len() {
                return Err(Diag::new(DiagCode::BadBinaryExponent, "unexpected end-of-number"));
            }
            if bytes[skip] == b'+' || bytes[skip] == b'-' {
                skip += 1;
            }
            let exp_start = skip;
            while skip < bytes.len() && bytes[skip].is_ascii_digit() {
                skip += 1;
            }
            if skip == exp_start {
                return Err(Diag::new(DiagCode::BadBinaryExponent, "missing binary exponent digits"));
            }
        }
    } else if !bytes[skip].is_ascii_digit() && bytes[skip] != b'.' {
        return Err(Diag::new(DiagCode::BadNumberConstant, format!("bad start character '{}' for number", bytes[skip] as char)));
    } else {
        while skip < bytes.len() && (bytes[skip].is_ascii_digit() || bytes[skip] == b'.') {
            skip += 1;
        }
        if skip < bytes.len() && (bytes[skip] == b'e' || bytes[skip] == b'E') {
            skip += 1;
            if skip >= bytes.len() {
                return Err(Diag::new(DiagCode::BadDecimalExponent, "unexpected end-of-number"));
            }
            if bytes[skip] == b'+' || bytes[skip] == b'-' {
                skip += 1;
            }
            let exp_start = skip;
            while skip < bytes.len() && bytes[skip].is_ascii_digit() {
                skip += 1;
            }
            if skip == exp_start {
                return Err(Diag::new(DiagCode::BadDecimalExponent, "missing decimal exponent digits"));
            }
        }
    }

    match bytes.get(skip) {
        None => Ok(FloatSuffix::Double),
        Some(b'f' | b'F') if skip + 1 == bytes.len() => Ok(FloatSuffix::Float),
        Some(b'l' | b'L') if skip + 1 == bytes.len() => Ok(FloatSuffix::LongDouble),
        Some(_) => Err(Diag::new(DiagCode::BadNumberConstant, "garbage after number")),
    }
}

/// String-literal prefix, per 6.4.5: `u8`, `L`, `u`, `U`, or none.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StringPrefix {
    None,
    Utf8,
    Wide,
    Utf16,
    Utf32,
}

impl StringPrefix {
    fn is_wide(self) -> bool {
        matches!(self, StringPrefix::Wide | StringPrefix::Utf16 | StringPrefix::Utf32)
    }
}

/// A decoded string literal: its prefix and the codepoint sequence (escapes
/// resolved, no terminating NUL added — callers that need one append it).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StringConstant {
    pub prefix: StringPrefix,
    pub codepoints: Vec<u32>,
}

/// Parse one string-literal lexeme (including its quotes and optional
/// prefix). Concatenation of adjacent literals, and the wide/UTF-8 mixing
/// check, is done by [`concat_adjacent_strings`].
pub fn parse_string_literal(text: &str) -> Result<StringConstant, Diag> {
    let bytes = text.as_bytes();
    let (prefix, rest) = if let Some(r) = bytes.strip_prefix(b"u8") {
        (StringPrefix::Utf8, r)
    } else if let Some(r) = bytes.strip_prefix(b"L") {
        (StringPrefix::Wide, r)
    } else if let Some(r) = bytes.strip_prefix(b"u") {
        (StringPrefix::Utf16, r)
    } else if let Some(r) = bytes.strip_prefix(b"U") {
        (StringPrefix::Utf32, r)
    } else {
        (StringPrefix::None, bytes)
    };
    if rest.first() != Some(&b'"') || rest.last() != Some(&b'"') || rest.len() < 2 {
        return Err(Diag::new(DiagCode::UnterminatedDoublequotedString, "missing quotes"));
    }
    let body = &rest[1..rest.len() - 1];
    let mut codepoints = Vec::new();
    let mut i = 0;
    while i < body.len() {
        if body[i] == b'\\' {
            let escape_start = i + 1;
            if escape_start >= body.len() {
                return Err(Diag::new(DiagCode::UnterminatedDoublequotedString, "trailing backslash"));
            }
            let (cp, used) = decode_escape_payload(&body[escape_start..])?;
            codepoints.push(cp);
            i = escape_start + used;
        } else {
            let s = std::str::from_utf8(&body[i..]).map_err(|_| Diag::new(DiagCode::BadUtf8, "invalid UTF-8 in string literal"))?;
            let c = s.chars().next().expect("non-empty remainder");
            codepoints.push(c as u32);
            i += c.len_utf8();
        }
    }
    Ok(StringConstant { prefix, codepoints })
}

/// Concatenate a run of adjacent string-literal tokens (6.4.5p2): disallow
/// mixing a wide literal with a UTF-8 one in the same group.
pub fn concat_adjacent_strings(parts: &[StringConstant]) -> Result<StringConstant, Diag> {
    let has_wide = parts.iter().any(|p| p.prefix.is_wide());
    let has_utf8 = parts.iter().any(|p| p.prefix == StringPrefix::Utf8);
    if has_wide && has_utf8 {
        return Err(Diag::new(
            DiagCode::BadCharacterSequence,
            "adjacent string literal group mixes a wide literal with a UTF-8 literal",
        ));
    }
    let prefix = parts.iter().map(|p| p.prefix).find(|p| *p != StringPrefix::None).unwrap_or(StringPrefix::None);
    let mut codepoints = Vec::new();
    for p in parts {
        codepoints.extend_from_slice(&p.codepoints);
    }
    Ok(StringConstant { prefix, codepoints })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_char_constant() {
        let c = parse_char_constant("'a'").unwrap();
        assert_eq!(c.codepoint, b'a' as u32);
        assert_eq!(c.prefix, CharPrefix::None);
    }

    #[test]
    fn simple_escapes() {
        assert_eq!(parse_char_constant("'\\n'").unwrap().codepoint, b'\n' as u32);
        assert_eq!(parse_char_constant("'\\\\'").unwrap().codepoint, b'\\' as u32);
    }

    #[test]
    fn octal_escape_caps_at_two_digits_when_first_exceeds_three() {
        // \777 -> first digit 7 > 3, so only two octal digits are consumed: 0o77 = 63
        let c = parse_char_constant("'\\777'").unwrap();
        assert_eq!(c.codepoint, 0o77);
    }

    #[test]
    fn octal_escape_allows_three_digits_when_first_is_low() {
        let c = parse_char_constant("'\\123'").unwrap();
        assert_eq!(c.codepoint, 0o123);
    }

    #[test]
    fn universal_escape_u_and_big_u() {
        assert_eq!(parse_char_constant("'\\u00e9'").unwrap().codepoint, 0xe9);
        assert_eq!(parse_char_constant("'\\U0001F600'").unwrap().codepoint, 0x1_f600);
    }

    #[test]
    fn wide_prefix_selects_wchar_width() {
        let c = parse_char_constant("L'x'").unwrap();
        assert_eq!(c.prefix, CharPrefix::Wide);
        assert_eq!(c.prefix.sizeof(&TargetProfile::host()), 4);
    }

    #[test]
    fn too_short_is_an_error() {
        assert!(parse_char_constant("''").is_err());
    }

    #[test]
    fn integer_suffix_ll_and_unsigned() {
        let info = parse_int_suffix(false, "ull", &TargetProfile::host()).unwrap();
        assert!(!info.is_signed);
        assert_eq!(info.sizeof_type, 8);
    }

    #[test]
    fn integer_suffix_plain_is_int_width() {
        let info = parse_int_suffix(false, "", &TargetProfile::host()).unwrap();
        assert!(info.is_signed);
        assert_eq!(info.sizeof_type, 4);
    }

    #[test]
    fn split_hex_literal() {
        let (digits, suffix, neg) = split_integer_literal("0x2aU").unwrap();
        assert_eq!(digits, "0x2a");
        assert_eq!(suffix, "U");
        assert!(!neg);
    }

    #[test]
    fn split_negative_decimal() {
        let (digits, suffix, neg) = split_integer_literal("-123L").unwrap();
        assert_eq!(digits, "123");
        assert_eq!(suffix, "L");
        assert!(neg);
    }

    #[test]
    fn float_literal_default_is_double() {
        assert_eq!(parse_float_literal("3.14").unwrap(), FloatSuffix::Double);
    }

    #[test]
    fn float_literal_hex_with_binary_exponent() {
        assert_eq!(parse_float_literal("0x1.8p3f").unwrap(), FloatSuffix::Float);
    }

    #[test]
    fn string_literal_basic() {
        let s = parse_string_literal("\"ab\\n\"").unwrap();
        assert_eq!(s.prefix, StringPrefix::None);
        assert_eq!(s.codepoints, vec![b'a' as u32, b'b' as u32, b'\n' as u32]);
    }

    #[test]
    fn string_literal_disallows_mixing_wide_and_utf8() {
        let a = parse_string_literal("u8\"x\"").unwrap();
        let b = parse_string_literal("L\"y\"").unwrap();
        assert!(concat_adjacent_strings(&[a, b]).is_err());
    }

    #[test]
    fn string_literal_concatenation_keeps_first_nonempty_prefix() {
        let a = parse_string_literal("\"a\"").unwrap();
        let b = parse_string_literal("L\"b\"").unwrap();
        let joined = concat_adjacent_strings(&[a, b]).unwrap();
        assert_eq!(joined.prefix, StringPrefix::Wide);
        assert_eq!(joined.codepoints, vec![b'a' as u32, b'b' as u32]);
    }
}
