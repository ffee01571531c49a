// crates/nysm-ir/src/value.rs
// ============================================================================
// Module: Canonical Value Algebra
// Description: The six-variant Value sum type plus its RFC 8785 canonical
//              encoder and a strict/lenient decoder pair.
// Purpose: Provide the single value domain every other NYSM component
//          serializes, hashes, and compares against.
// Dependencies: std, unicode-normalization
// ============================================================================

//! ## Overview
//! `Value` is a closed sum over `Null`, `String`, `Int`, `Bool`, `Array`, and
//! `Object`. Floating-point numbers have no representation anywhere in this
//! type; callers that need approximate numbers must encode them as strings
//! or fixed-point integers at the boundary.
//!
//! `canonical_encode` produces RFC 8785 (JCS) bytes: object keys sorted by
//! UTF-16 code-unit order, strings NFC-normalized, minimal escaping, no
//! insignificant whitespace. A stock `serde_json`-based encoder cannot
//! produce this form (it sorts by UTF-8 byte order and HTML-escapes U+2028 /
//! U+2029 in some configurations), so the encoder here is hand-rolled.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::cmp::Ordering;
use std::fmt;

use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

// ============================================================================
// SECTION: Value Type
// ============================================================================

/// The canonical NYSM value domain.
///
/// # Invariants
/// - No variant represents a floating-point number.
/// - `Object` keys are unique (duplicate keys during decode keep the last
///   occurrence); the map has no inherent order, only the order imposed by
///   [`Value::canonical_encode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// The absence of a value. Rejected at ingest boundaries (see
    /// [`Value::decode`]) but retained internally so logs round-trip.
    Null,
    /// A UTF-8 string. Normalized to NFC at encode time.
    String(String),
    /// A 64-bit signed integer.
    Int(i64),
    /// A boolean.
    Bool(bool),
    /// An ordered sequence of values.
    Array(Vec<Value>),
    /// A string-keyed map of values.
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// Builds an `Object` value from an iterator of key/value pairs.
    #[must_use]
    pub fn object<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        Self::Object(entries.into_iter().collect())
    }

    /// Returns the value as an `Object` map, if it is one.
    #[must_use]
    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Returns the value as a string slice, if it is a `String`.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Returns the value as an `i64`, if it is an `Int`.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns true if this value is [`Value::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Encodes this value as RFC 8785 canonical JSON bytes.
    ///
    /// This never fails: every value constructible through this type is
    /// already free of floats, the only input class RFC 8785 cannot
    /// represent.
    #[must_use]
    pub fn canonical_encode(&self) -> Vec<u8> {
        let mut out = String::new();
        write_canonical(self, &mut out);
        out.into_bytes()
    }

    /// Decodes canonical or plain JSON bytes into a `Value`, rejecting
    /// floats and `null` anywhere in the tree. This is the public ingest
    /// boundary described in spec §4.A / §7.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] on malformed input, a float literal, or any
    /// occurrence of `null`.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        decode_with(bytes, Mode::Strict)
    }

    /// Decodes JSON bytes permitting `null`, for internal log-replay paths
    /// that must round-trip previously persisted values. Still rejects
    /// floats: no `Value` variant can represent one.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] on malformed input or a float literal.
    pub fn decode_for_replay(bytes: &[u8]) -> Result<Self, DecodeError> {
        decode_with(bytes, Mode::Lenient)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

// ============================================================================
// SECTION: Serde
// ============================================================================
//
// `canonical_encode`/`decode` are the hash- and log-facing codec; this impl
// is the ordinary interchange codec `SyncRule`/`ConceptSpec` derive against
// to load spec/rule documents from JSON or YAML (spec §4.C). Floats are
// rejected the same as `decode_for_replay`; `null` is accepted, since a
// rule-authoring literal is not an ingest boundary in the §7 sense.

impl serde::Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;
        use serde::ser::SerializeSeq;

        match self {
            Self::Null => serializer.serialize_unit(),
            Self::String(s) => serializer.serialize_str(s),
            Self::Int(n) => serializer.serialize_i64(*n),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Object(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (key, value) in map {
                    out.serialize_entry(key, value)?;
                }
                out.end()
            }
        }
    }
}

impl<'de> serde::Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_any(ValueVisitor)
    }
}

/// Visitor implementing [`Value`]'s permissive (null-accepting,
/// float-rejecting) deserialization.
struct ValueVisitor;

impl<'de> serde::de::Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("a NYSM value (null, string, int, bool, array, or object; no floats)")
    }

    fn visit_unit<E>(self) -> Result<Self::Value, E> {
        Ok(Value::Null)
    }

    fn visit_none<E>(self) -> Result<Self::Value, E> {
        Ok(Value::Null)
    }

    fn visit_bool<E>(self, v: bool) -> Result<Self::Value, E> {
        Ok(Value::Bool(v))
    }

    fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E> {
        Ok(Value::Int(v))
    }

    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        i64::try_from(v).map(Value::Int).map_err(|_| E::custom("integer out of range for a 64-bit signed value"))
    }

    fn visit_f64<E>(self, _v: f64) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Err(E::custom("floating-point numbers have no representation in the value algebra"))
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E> {
        Ok(Value::String(v.to_string()))
    }

    fn visit_string<E>(self, v: String) -> Result<Self::Value, E> {
        Ok(Value::String(v))
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: serde::de::SeqAccess<'de>,
    {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(Value::Array(items))
    }

    fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
    where
        A: serde::de::MapAccess<'de>,
    {
        let mut out = BTreeMap::new();
        while let Some((key, value)) = map.next_entry::<String, Value>()? {
            out.insert(key, value);
        }
        Ok(Value::Object(out))
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while decoding bytes into a [`Value`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// Input was not valid UTF-8.
    #[error("input is not valid utf-8")]
    InvalidUtf8,
    /// Input ended before a complete value was parsed.
    #[error("unexpected end of input")]
    UnexpectedEof,
    /// An unexpected character was encountered.
    #[error("unexpected character at byte offset {0}")]
    UnexpectedChar(usize),
    /// A numeric literal contained `.`, `e`, or `E`.
    #[error("float literals are not permitted: {0}")]
    FloatRejected(String),
    /// An integer literal did not fit in 64 bits.
    #[error("integer literal out of range: {0}")]
    IntegerOutOfRange(String),
    /// `null` appeared at a decode boundary that rejects it.
    #[error("null is not permitted at this decode boundary")]
    NullRejected,
    /// A string contained an invalid escape sequence.
    #[error("invalid escape sequence at byte offset {0}")]
    InvalidEscape(usize),
    /// Trailing, non-whitespace data followed the decoded value.
    #[error("trailing data after value at byte offset {0}")]
    TrailingData(usize),
}

// ============================================================================
// SECTION: Canonical Encoding
// ============================================================================

/// Writes `value` in canonical form into `out`.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Int(n) => out.push_str(&n.to_string()),
        Value::String(s) => write_canonical_string(s, out),
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            out.push('{');
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_by(|a, b| utf16_cmp(a, b));
            for (index, key) in keys.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical_string(key, out);
                out.push(':');
                // Unwrap is safe: `key` was collected from `map.keys()`.
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
    }
}

/// Writes a string in canonical (NFC-normalized, minimally escaped) form.
fn write_canonical_string(s: &str, out: &mut String) {
    let normalized: String = s.nfc().collect();
    out.push('"');
    for ch in normalized.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{0008}' => out.push_str("\\b"),
            '\u{000C}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) <= 0x1F => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            // `<`, `>`, `&`, U+2028, U+2029, and every other code point are
            // emitted literally: RFC 8785 forbids HTML/JS-safe escaping.
            c => out.push(c),
        }
    }
    out.push('"');
}

/// Compares two strings by UTF-16 code-unit order, not UTF-8 byte order.
/// This matters for keys containing supplementary-plane code points: e.g.
/// `"\u{10000}"` (surrogate pair starting `0xD800`) sorts *before*
/// `"\u{E000}"` (single unit `0xE000`) under this comparator, which is the
/// opposite of byte-wise UTF-8 comparison.
fn utf16_cmp(a: &str, b: &str) -> Ordering {
    a.encode_utf16().cmp(b.encode_utf16())
}

// ============================================================================
// SECTION: Decoding
// ============================================================================

/// Decode strictness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Reject `null` anywhere in the tree (the public ingest boundary).
    Strict,
    /// Permit `null` (internal replay paths only).
    Lenient,
}

/// Parses `bytes` under the given mode.
fn decode_with(bytes: &[u8], mode: Mode) -> Result<Value, DecodeError> {
    let text = std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8)?;
    let mut parser = Parser {
        chars: text.char_indices().peekable(),
        len: text.len(),
        mode,
    };
    parser.skip_whitespace();
    let value = parser.parse_value()?;
    parser.skip_whitespace();
    if let Some((offset, _)) = parser.chars.peek() {
        return Err(DecodeError::TrailingData(*offset));
    }
    Ok(value)
}

/// A minimal recursive-descent JSON parser tuned to NYSM's ingest rules.
struct Parser<'a> {
    /// Remaining (byte offset, char) pairs.
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    /// Total byte length of the input, used for EOF offsets.
    len: usize,
    /// Whether `null` is permitted.
    mode: Mode,
}

impl<'a> Parser<'a> {
    fn skip_whitespace(&mut self) {
        while let Some((_, c)) = self.chars.peek() {
            if c.is_whitespace() {
                self.chars.next();
            } else {
                break;
            }
        }
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn current_offset(&mut self) -> usize {
        self.chars.peek().map_or(self.len, |(offset, _)| *offset)
    }

    fn expect_char(&mut self, expected: char) -> Result<(), DecodeError> {
        match self.chars.next() {
            Some((_, c)) if c == expected => Ok(()),
            Some((offset, _)) => Err(DecodeError::UnexpectedChar(offset)),
            None => Err(DecodeError::UnexpectedEof),
        }
    }

    fn expect_literal(&mut self, literal: &str) -> Result<(), DecodeError> {
        for expected in literal.chars() {
            self.expect_char(expected)?;
        }
        Ok(())
    }

    fn parse_value(&mut self) -> Result<Value, DecodeError> {
        self.skip_whitespace();
        match self.peek_char() {
            Some('"') => self.parse_string().map(Value::String),
            Some('{') => self.parse_object(),
            Some('[') => self.parse_array(),
            Some('t') => {
                self.expect_literal("true")?;
                Ok(Value::Bool(true))
            }
            Some('f') => {
                self.expect_literal("false")?;
                Ok(Value::Bool(false))
            }
            Some('n') => {
                self.expect_literal("null")?;
                match self.mode {
                    Mode::Strict => Err(DecodeError::NullRejected),
                    Mode::Lenient => Ok(Value::Null),
                }
            }
            Some(c) if c == '-' || c.is_ascii_digit() => self.parse_number(),
            Some(_) => Err(DecodeError::UnexpectedChar(self.current_offset())),
            None => Err(DecodeError::UnexpectedEof),
        }
    }

    fn parse_object(&mut self) -> Result<Value, DecodeError> {
        self.expect_char('{')?;
        let mut map = BTreeMap::new();
        self.skip_whitespace();
        if self.peek_char() == Some('}') {
            self.chars.next();
            return Ok(Value::Object(map));
        }
        loop {
            self.skip_whitespace();
            let key = self.parse_string()?;
            self.skip_whitespace();
            self.expect_char(':')?;
            let value = self.parse_value()?;
            map.insert(key, value);
            self.skip_whitespace();
            match self.chars.next() {
                Some((_, ',')) => continue,
                Some((_, '}')) => break,
                Some((offset, _)) => return Err(DecodeError::UnexpectedChar(offset)),
                None => return Err(DecodeError::UnexpectedEof),
            }
        }
        Ok(Value::Object(map))
    }

    fn parse_array(&mut self) -> Result<Value, DecodeError> {
        self.expect_char('[')?;
        let mut items = Vec::new();
        self.skip_whitespace();
        if self.peek_char() == Some(']') {
            self.chars.next();
            return Ok(Value::Array(items));
        }
        loop {
            let value = self.parse_value()?;
            items.push(value);
            self.skip_whitespace();
            match self.chars.next() {
                Some((_, ',')) => continue,
                Some((_, ']')) => break,
                Some((offset, _)) => return Err(DecodeError::UnexpectedChar(offset)),
                None => return Err(DecodeError::UnexpectedEof),
            }
        }
        Ok(Value::Array(items))
    }

    fn parse_string(&mut self) -> Result<String, DecodeError> {
        self.expect_char('"')?;
        let mut out = String::new();
        loop {
            match self.chars.next() {
                Some((_, '"')) => break,
                Some((offset, '\\')) => {
                    out.push(self.parse_escape(offset)?);
                }
                Some((_, c)) => out.push(c),
                None => return Err(DecodeError::UnexpectedEof),
            }
        }
        Ok(out)
    }

    fn parse_escape(&mut self, offset: usize) -> Result<char, DecodeError> {
        match self.chars.next() {
            Some((_, '"')) => Ok('"'),
            Some((_, '\\')) => Ok('\\'),
            Some((_, '/')) => Ok('/'),
            Some((_, 'b')) => Ok('\u{0008}'),
            Some((_, 'f')) => Ok('\u{000C}'),
            Some((_, 'n')) => Ok('\n'),
            Some((_, 'r')) => Ok('\r'),
            Some((_, 't')) => Ok('\t'),
            Some((_, 'u')) => {
                let high = self.parse_hex4(offset)?;
                if (0xD800..=0xDBFF).contains(&high) {
                    self.expect_char('\\').map_err(|_| DecodeError::InvalidEscape(offset))?;
                    self.expect_char('u').map_err(|_| DecodeError::InvalidEscape(offset))?;
                    let low = self.parse_hex4(offset)?;
                    if !(0xDC00..=0xDFFF).contains(&low) {
                        return Err(DecodeError::InvalidEscape(offset));
                    }
                    let combined = 0x10000
                        + (u32::from(high) - 0xD800) * 0x400
                        + (u32::from(low) - 0xDC00);
                    char::from_u32(combined).ok_or(DecodeError::InvalidEscape(offset))
                } else {
                    char::from_u32(u32::from(high)).ok_or(DecodeError::InvalidEscape(offset))
                }
            }
            Some(_) => Err(DecodeError::InvalidEscape(offset)),
            None => Err(DecodeError::UnexpectedEof),
        }
    }

    fn parse_hex4(&mut self, offset: usize) -> Result<u16, DecodeError> {
        let mut value: u16 = 0;
        for _ in 0..4 {
            let digit = match self.chars.next() {
                Some((_, c)) => c.to_digit(16).ok_or(DecodeError::InvalidEscape(offset))?,
                None => return Err(DecodeError::UnexpectedEof),
            };
            value = value
                .checked_mul(16)
                .and_then(|v| v.checked_add(digit as u16))
                .ok_or(DecodeError::InvalidEscape(offset))?;
        }
        Ok(value)
    }

    fn parse_number(&mut self) -> Result<Value, DecodeError> {
        let start = self.current_offset();
        let mut literal = String::new();
        if self.peek_char() == Some('-') {
            literal.push('-');
            self.chars.next();
        }
        let mut saw_digit = false;
        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() {
                literal.push(c);
                saw_digit = true;
                self.chars.next();
            } else {
                break;
            }
        }
        if !saw_digit {
            return Err(DecodeError::UnexpectedChar(start));
        }
        if matches!(self.peek_char(), Some('.') | Some('e') | Some('E')) {
            let mut full = literal.clone();
            while let Some(c) = self.peek_char() {
                if c.is_ascii_digit() || c == '.' || c == 'e' || c == 'E' || c == '+' || c == '-' {
                    full.push(c);
                    self.chars.next();
                } else {
                    break;
                }
            }
            return Err(DecodeError::FloatRejected(full));
        }
        literal
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| DecodeError::IntegerOutOfRange(literal))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.canonical_encode();
        // Canonical bytes are always valid UTF-8 text produced by this
        // module's own writer.
        match std::str::from_utf8(&bytes) {
            Ok(s) => f.write_str(s),
            Err(_) => f.write_str("<invalid utf-8>"),
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_encode_idempotent_roundtrip() {
        let value = Value::object([
            ("b".to_string(), Value::Int(1)),
            ("a".to_string(), Value::Array(vec![Value::Bool(true), Value::String("x".into())])),
        ]);
        let first = value.canonical_encode();
        let decoded = Value::decode(&first).expect("decode should succeed");
        let second = decoded.canonical_encode();
        assert_eq!(first, second);
    }

    #[test]
    fn key_ordering_uses_utf16_code_units() {
        let value = Value::object([
            ("\u{E000}".to_string(), Value::Int(1)),
            ("\u{10000}".to_string(), Value::Int(2)),
        ]);
        let encoded = String::from_utf8(value.canonical_encode()).expect("utf8");
        let pos_supplementary = encoded.find('\u{10000}').expect("present");
        let pos_bmp = encoded.find('\u{E000}').expect("present");
        assert!(pos_supplementary < pos_bmp, "supplementary-plane key must sort first");
    }

    #[test]
    fn no_html_escaping() {
        let encoded = String::from_utf8(Value::String("<a & b>".into()).canonical_encode())
            .expect("utf8");
        assert_eq!(encoded, "\"<a & b>\"");

        let encoded = String::from_utf8(Value::String("\u{2028}".into()).canonical_encode())
            .expect("utf8");
        assert_eq!(encoded, "\"\u{2028}\"");

        let encoded = String::from_utf8(Value::String("\\u2028".into()).canonical_encode())
            .expect("utf8");
        assert_eq!(encoded, "\"\\\\u2028\"");
    }

    #[test]
    fn decode_rejects_floats_and_null() {
        assert!(matches!(Value::decode(b"3.14"), Err(DecodeError::FloatRejected(_))));
        assert!(matches!(Value::decode(b"1e5"), Err(DecodeError::FloatRejected(_))));
        assert!(matches!(Value::decode(b"null"), Err(DecodeError::NullRejected)));
        assert!(matches!(Value::decode(b"{\"k\":null}"), Err(DecodeError::NullRejected)));
        assert!(matches!(Value::decode(b"[null]"), Err(DecodeError::NullRejected)));
    }

    #[test]
    fn decode_for_replay_permits_null() {
        let value = Value::decode_for_replay(b"{\"k\":null}").expect("decode");
        let map = value.as_object().expect("object");
        assert_eq!(map.get("k"), Some(&Value::Null));
    }

    #[test]
    fn nfc_normalization_makes_cafe_forms_equal() {
        let nfc = Value::String("caf\u{00E9}".into());
        let nfd = Value::String("cafe\u{0301}".into());
        assert_eq!(nfc.canonical_encode(), nfd.canonical_encode());
    }
}
