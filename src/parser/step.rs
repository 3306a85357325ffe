//! Tokenizer for the STEP physical file format (ISO 10303-21) that IFC uses.

use std::collections::{BTreeMap, HashMap};

use crate::error::IngestionError;
use crate::parser::Format;

#[derive(Debug, Clone, PartialEq)]
pub enum StepValue {
    String(String),
    Real(f64),
    Integer(i64),
    Boolean(bool),
    Enum(String),
    Reference(u64),
    List(Vec<StepValue>),
    Null,
    Derived,
}

impl StepValue {
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            StepValue::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_reference(&self) -> Option<u64> {
        match self {
            StepValue::Reference(id) => Some(*id),
            _ => None,
        }
    }

    /// Numeric value, integers widened to `f64`.
    #[must_use]
    pub fn as_real(&self) -> Option<f64> {
        match self {
            StepValue::Real(f) => Some(*f),
            StepValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_enum(&self) -> Option<&str> {
        match self {
            StepValue::Enum(e) => Some(e),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[StepValue]> {
        match self {
            StepValue::List(items) => Some(items),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StepEntity {
    pub id: u64,
    pub entity_type: String,
    pub values: Vec<StepValue>,
}

impl StepEntity {
    #[must_use]
    pub fn str_at(&self, index: usize) -> Option<&str> {
        self.values.get(index).and_then(StepValue::as_str)
    }

    #[must_use]
    pub fn ref_at(&self, index: usize) -> Option<u64> {
        self.values.get(index).and_then(StepValue::as_reference)
    }

    #[must_use]
    pub fn real_at(&self, index: usize) -> Option<f64> {
        self.values.get(index).and_then(StepValue::as_real)
    }

    #[must_use]
    pub fn enum_at(&self, index: usize) -> Option<&str> {
        self.values.get(index).and_then(StepValue::as_enum)
    }

    /// References held in a list attribute; non-reference items are skipped.
    #[must_use]
    pub fn refs_at(&self, index: usize) -> Vec<u64> {
        self.values
            .get(index)
            .and_then(StepValue::as_list)
            .map(|items| items.iter().filter_map(StepValue::as_reference).collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Default)]
pub struct StepFile {
    pub entities: BTreeMap<u64, StepEntity>,
    pub schema: String,
    by_type: HashMap<String, Vec<u64>>,
}

impl StepFile {
    /// Parses a whole STEP payload.
    ///
    /// Statements may span lines. The payload must start with the
    /// `ISO-10303-21` header and contain a `DATA` section; an unterminated
    /// string or a malformed entity instance fails the whole parse.
    pub fn parse(content: &str) -> Result<Self, IngestionError> {
        let statements = split_statements(content)?;
        let mut file = StepFile::default();
        let mut seen_data = false;
        let mut in_data = false;

        let mut iter = statements.iter().map(|s| s.trim());
        match iter.next() {
            Some("ISO-10303-21") => {}
            _ => return Err(step_error("missing ISO-10303-21 header")),
        }

        for statement in iter {
            if statement.is_empty() {
                continue;
            }
            match statement {
                "DATA" => {
                    seen_data = true;
                    in_data = true;
                }
                "ENDSEC" => in_data = false,
                "END-ISO-10303-21" => break,
                _ if in_data => {
                    if let Some(entity) = parse_entity(statement)? {
                        file.by_type
                            .entry(entity.entity_type.clone())
                            .or_default()
                            .push(entity.id);
                        file.entities.insert(entity.id, entity);
                    }
                }
                _ if statement.starts_with("FILE_SCHEMA") => {
                    file.schema = parse_schema(statement).unwrap_or_default();
                }
                _ => {}
            }
        }

        if !seen_data {
            return Err(step_error("missing DATA section"));
        }

        // Entity ids may appear out of order in the payload
        for ids in file.by_type.values_mut() {
            ids.sort_unstable();
        }

        Ok(file)
    }

    #[must_use]
    pub fn get_entity(&self, id: u64) -> Option<&StepEntity> {
        self.entities.get(&id)
    }

    /// Entities of one type, ordered by entity id.
    pub fn entities_of_type<'a>(
        &'a self,
        entity_type: &str,
    ) -> impl Iterator<Item = &'a StepEntity> + 'a {
        self.by_type
            .get(entity_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .filter_map(|id| self.entities.get(id))
    }
}

fn step_error(message: impl Into<String>) -> IngestionError {
    IngestionError::parse(Format::Ifc, message)
}

/// Splits the payload on `;` outside string literals, dropping `/* */` comments.
fn split_statements(content: &str) -> Result<Vec<String>, IngestionError> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut chars = content.chars().peekable();
    let mut in_string = false;

    while let Some(ch) = chars.next() {
        match ch {
            '\'' => {
                in_string = !in_string;
                current.push(ch);
            }
            '/' if !in_string && chars.peek() == Some(&'*') => {
                chars.next();
                let mut closed = false;
                while let Some(c) = chars.next() {
                    if c == '*' && chars.peek() == Some(&'/') {
                        chars.next();
                        closed = true;
                        break;
                    }
                }
                if !closed {
                    return Err(step_error("unterminated comment"));
                }
            }
            ';' if !in_string => statements.push(std::mem::take(&mut current)),
            '\r' | '\n' if !in_string => current.push(' '),
            _ => current.push(ch),
        }
    }

    if in_string {
        return Err(step_error("unterminated string literal"));
    }
    if !current.trim().is_empty() {
        return Err(step_error(format!(
            "unterminated statement '{}'",
            truncate(current.trim(), 40)
        )));
    }

    Ok(statements)
}

fn parse_schema(statement: &str) -> Option<String> {
    let start = statement.find('\'')?;
    let rest = &statement[start + 1..];
    let end = rest.find('\'')?;
    Some(rest[..end].to_string())
}

/// Parses `#123=IFCCOLUMN('guid',#5,'name',$,...)`.
///
/// Complex instances (`#7=(IFCA() IFCB())`) carry no column data and are
/// skipped.
fn parse_entity(statement: &str) -> Result<Option<StepEntity>, IngestionError> {
    let malformed = || step_error(format!("malformed entity '{}'", truncate(statement, 60)));

    let body = statement.strip_prefix('#').ok_or_else(malformed)?;
    let eq_pos = body.find('=').ok_or_else(malformed)?;
    let id: u64 = body[..eq_pos].trim().parse().map_err(|_| malformed())?;

    let rest = body[eq_pos + 1..].trim_start();
    if rest.starts_with('(') {
        return Ok(None);
    }

    let paren_pos = rest.find('(').ok_or_else(malformed)?;
    let entity_type = rest[..paren_pos].trim().to_ascii_uppercase();
    if entity_type.is_empty() || !entity_type.bytes().all(is_keyword_byte) {
        return Err(malformed());
    }

    let mut parser = ValueParser::new(&rest[paren_pos..]);
    let values = parser.parse_list().map_err(|message| {
        step_error(format!("entity #{id}: {message}"))
    })?;
    parser.skip_whitespace();
    if !parser.at_end() {
        return Err(malformed());
    }

    Ok(Some(StepEntity {
        id,
        entity_type,
        values,
    }))
}

fn is_keyword_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

struct ValueParser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> ValueParser<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn take_while(&mut self, pred: impl Fn(u8) -> bool) -> &'a str {
        let start = self.pos;
        while self.peek().is_some_and(&pred) {
            self.pos += 1;
        }
        &self.src[start..self.pos]
    }

    fn expect(&mut self, byte: u8) -> Result<(), String> {
        self.skip_whitespace();
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(format!("expected '{}' at offset {}", byte as char, self.pos))
        }
    }

    fn parse_list(&mut self) -> Result<Vec<StepValue>, String> {
        self.expect(b'(')?;
        let mut values = Vec::new();

        self.skip_whitespace();
        if self.peek() == Some(b')') {
            self.pos += 1;
            return Ok(values);
        }

        loop {
            values.push(self.parse_value()?);
            self.skip_whitespace();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b')') => {
                    self.pos += 1;
                    return Ok(values);
                }
                Some(other) => {
                    return Err(format!(
                        "unexpected '{}' at offset {}",
                        other as char, self.pos
                    ))
                }
                None => return Err("unterminated list".to_string()),
            }
        }
    }

    fn parse_value(&mut self) -> Result<StepValue, String> {
        self.skip_whitespace();
        let Some(byte) = self.peek() else {
            return Err("unexpected end of attribute list".to_string());
        };

        match byte {
            b'$' => {
                self.pos += 1;
                Ok(StepValue::Null)
            }
            b'*' => {
                self.pos += 1;
                Ok(StepValue::Derived)
            }
            b'#' => {
                self.pos += 1;
                let digits = self.take_while(|b| b.is_ascii_digit());
                digits
                    .parse()
                    .map(StepValue::Reference)
                    .map_err(|_| format!("invalid reference at offset {}", self.pos))
            }
            b'\'' => self.parse_string(),
            b'"' => {
                self.pos += 1;
                let hex = self.take_while(|b| b != b'"');
                self.expect(b'"')?;
                Ok(StepValue::String(hex.to_string()))
            }
            b'.' => {
                self.pos += 1;
                let name = self.take_while(|b| b != b'.');
                self.expect(b'.')?;
                Ok(match name {
                    "T" => StepValue::Boolean(true),
                    "F" => StepValue::Boolean(false),
                    other => StepValue::Enum(other.to_string()),
                })
            }
            b'(' => self.parse_list().map(StepValue::List),
            b'0'..=b'9' | b'-' | b'+' => {
                let literal = self.take_while(|b| {
                    b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'-' | b'+')
                });
                if let Ok(i) = literal.parse::<i64>() {
                    return Ok(StepValue::Integer(i));
                }
                literal
                    .parse::<f64>()
                    .map(StepValue::Real)
                    .map_err(|_| format!("invalid number '{literal}'"))
            }
            b if b.is_ascii_alphabetic() => {
                // Typed value like IFCLENGTHMEASURE(3500.) keeps only its payload
                let keyword = self.take_while(is_keyword_byte);
                let mut inner = self.parse_list()?;
                if inner.len() == 1 {
                    Ok(inner.remove(0))
                } else {
                    Err(format!("typed value {keyword} must wrap exactly one value"))
                }
            }
            other => Err(format!(
                "unexpected '{}' at offset {}",
                other as char, self.pos
            )),
        }
    }

    fn parse_string(&mut self) -> Result<StepValue, String> {
        self.pos += 1;
        let start = self.pos;
        loop {
            match self.peek() {
                None => return Err("unterminated string literal".to_string()),
                Some(b'\'') if self.src.as_bytes().get(self.pos + 1) == Some(&b'\'') => {
                    self.pos += 2;
                }
                Some(b'\'') => break,
                Some(_) => self.pos += 1,
            }
        }
        let raw = &self.src[start..self.pos];
        self.pos += 1;
        Ok(StepValue::String(decode_step_string(raw)))
    }
}

/// Decodes STEP string escapes.
///
/// - `''` apostrophe
/// - `\\` backslash
/// - `\X2\hhhh...\X0\` UTF-16 code units, `\X4\hhhhhhhh...\X0\` code points
/// - `\X\hh` ISO 8859-1 byte
/// - `\S\c` character with the high bit set
/// - `\P?\` code page switches, ignored
fn decode_step_string(raw: &str) -> String {
    let mut result = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(ch) = rest.chars().next() {
        if ch == '\'' {
            result.push('\'');
            rest = rest.strip_prefix("''").unwrap_or(&rest[1..]);
        } else if let Some(after) = rest.strip_prefix("\\\\") {
            result.push('\\');
            rest = after;
        } else if let Some(after) = rest.strip_prefix("\\X2\\") {
            let (hex, tail) = split_at_terminator(after);
            let units: Vec<u16> = hex_chunks(hex, 4)
                .filter_map(|h| u16::from_str_radix(h, 16).ok())
                .collect();
            result.extend(char::decode_utf16(units).filter_map(Result::ok));
            rest = tail;
        } else if let Some(after) = rest.strip_prefix("\\X4\\") {
            let (hex, tail) = split_at_terminator(after);
            result.extend(
                hex_chunks(hex, 8)
                    .filter_map(|h| u32::from_str_radix(h, 16).ok())
                    .filter_map(char::from_u32),
            );
            rest = tail;
        } else if let Some(after) = rest.strip_prefix("\\X\\") {
            let hex = after.get(..2).unwrap_or(after);
            if let Ok(code) = u8::from_str_radix(hex, 16) {
                result.push(char::from(code));
            }
            rest = &after[hex.len()..];
        } else if let Some(after) = rest.strip_prefix("\\S\\") {
            let mut tail = after.chars();
            if let Some(c) = tail.next() {
                if let Some(shifted) = char::from_u32(u32::from(c) + 0x80) {
                    result.push(shifted);
                }
            }
            rest = tail.as_str();
        } else if rest.starts_with("\\P") && rest.get(3..4) == Some("\\") {
            rest = &rest[4..];
        } else {
            result.push(ch);
            rest = &rest[ch.len_utf8()..];
        }
    }

    result
}

/// Splits `hhhh\X0\tail` into the hex run and the text after `\X0\`.
fn split_at_terminator(s: &str) -> (&str, &str) {
    match s.find("\\X0\\") {
        Some(end) => (&s[..end], &s[end + 4..]),
        None => (s, ""),
    }
}

fn hex_chunks(hex: &str, width: usize) -> impl Iterator<Item = &str> {
    hex.as_bytes()
        .chunks(width)
        .filter(move |chunk| chunk.len() == width)
        .filter_map(|chunk| std::str::from_utf8(chunk).ok())
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const MINIMAL: &str = "ISO-10303-21;
HEADER;
FILE_DESCRIPTION(('ViewDefinition [CoordinationView]'),'2;1');
FILE_SCHEMA(('IFC4'));
ENDSEC;
DATA;
#1=IFCCOLUMN('2O2Fr$t4X7Zf8NOew3FLOH',$,'Column; A',$,$,#5,
  #6,$,.COLUMN.);
#5=IFCLENGTHMEASURE(3500.);
#2=IFCRELCONTAINEDINSPATIALSTRUCTURE('x',$,$,$,(#1, #3),#4);
ENDSEC;
END-ISO-10303-21;
";

    #[test]
    fn parses_header_and_multiline_entities() {
        let file = StepFile::parse(MINIMAL).unwrap();
        assert_eq!(file.schema, "IFC4");
        assert_eq!(file.entities.len(), 3);

        let column = file.get_entity(1).unwrap();
        assert_eq!(column.entity_type, "IFCCOLUMN");
        assert_eq!(column.str_at(2), Some("Column; A"));
        assert_eq!(column.ref_at(5), Some(5));
        assert_eq!(column.enum_at(8), Some("COLUMN"));

        let rel = file.get_entity(2).unwrap();
        assert_eq!(rel.refs_at(4), vec![1, 3]);
        assert_eq!(file.get_entity(5).unwrap().values, vec![StepValue::Real(3500.0)]);
    }

    #[test]
    fn entities_of_type_are_ordered_by_id() {
        let content = "ISO-10303-21;DATA;#9=IFCCOLUMN('b');#3=IFCCOLUMN('a');ENDSEC;";
        let file = StepFile::parse(content).unwrap();
        let ids: Vec<u64> = file.entities_of_type("IFCCOLUMN").map(|e| e.id).collect();
        assert_eq!(ids, vec![3, 9]);
        assert_eq!(file.entities_of_type("IFCBEAM").count(), 0);
    }

    #[test]
    fn parses_scalar_values() {
        let mut parser = ValueParser::new("($,*,.T.,.F.,.NOTDEFINED.,-12,1.5E3,'it''s',(#1,#2),\"0FF\")");
        let values = parser.parse_list().unwrap();
        assert_eq!(
            values,
            vec![
                StepValue::Null,
                StepValue::Derived,
                StepValue::Boolean(true),
                StepValue::Boolean(false),
                StepValue::Enum("NOTDEFINED".into()),
                StepValue::Integer(-12),
                StepValue::Real(1500.0),
                StepValue::String("it's".into()),
                StepValue::List(vec![StepValue::Reference(1), StepValue::Reference(2)]),
                StepValue::String("0FF".into()),
            ]
        );
    }

    #[test]
    fn strings_may_contain_delimiters() {
        let mut parser = ValueParser::new("('a(b', 'c,d)', '/* not a comment */')");
        let values = parser.parse_list().unwrap();
        assert_eq!(values[0], StepValue::String("a(b".into()));
        assert_eq!(values[1], StepValue::String("c,d)".into()));
        assert_eq!(values[2], StepValue::String("/* not a comment */".into()));
    }

    #[test]
    fn decodes_escapes() {
        assert_eq!(
            decode_step_string("\\X2\\041A043E043B043E043D043D0430\\X0\\ 1"),
            "Колонна 1"
        );
        assert_eq!(decode_step_string("\\X\\D8350"), "Ø350");
        assert_eq!(decode_step_string("a\\\\b"), "a\\b");
        assert_eq!(decode_step_string("\\S\\X"), "Ø");
        assert_eq!(decode_step_string("\\X4\\0001F600\\X0\\"), "\u{1F600}");
        assert_eq!(decode_step_string("\\PA\\abc"), "abc");
    }

    #[test]
    fn comments_are_dropped() {
        let content = "ISO-10303-21;/* exported */DATA;#1=IFCCOLUMN('a' /* guid */);ENDSEC;";
        let file = StepFile::parse(content).unwrap();
        assert_eq!(file.get_entity(1).unwrap().str_at(0), Some("a"));
    }

    #[test]
    fn complex_instances_are_skipped() {
        let content = "ISO-10303-21;DATA;#1=(IFCA() IFCB());#2=IFCCOLUMN('a');ENDSEC;";
        let file = StepFile::parse(content).unwrap();
        assert!(file.get_entity(1).is_none());
        assert!(file.get_entity(2).is_some());
    }

    #[test]
    fn rejects_structurally_broken_payloads() {
        let cases = [
            "",
            "{\"not\": \"step\"}",
            "ISO-10303-21;HEADER;ENDSEC;",
            "ISO-10303-21;DATA;#1=IFCCOLUMN('open);ENDSEC;",
            "ISO-10303-21;DATA;#1=IFCCOLUMN('a',(#2);ENDSEC;",
            "ISO-10303-21;DATA;#x=IFCCOLUMN('a');ENDSEC;",
            "ISO-10303-21;DATA;#1=IFCCOLUMN('a')",
            "ISO-10303-21;DATA;#1=IFCCOLUMN('a',@);ENDSEC;",
        ];
        for content in cases {
            let err = StepFile::parse(content).unwrap_err();
            assert!(
                matches!(err, IngestionError::Parse { format: Format::Ifc, .. }),
                "{content:?} -> {err:?}"
            );
        }
    }
}
