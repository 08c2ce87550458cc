//! GDB Machine Interface (MI) Parser
//!
//! Recursive-descent parser for MI values and output records, plus the
//! renderer that turns values back into MI text.

use crate::gdb::error::ParseError;
use crate::gdb::types::*;
use regex::Regex;
use std::fmt;

/// Deepest tuple/list nesting accepted before a value is rejected
pub const MAX_NESTING: usize = 256;

/// Cursor over MI text. Positions are byte offsets into the input.
pub struct Cursor<'a> {
    input: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(input: &'a str) -> Self {
        Self::at(input, 0)
    }

    pub fn at(input: &'a str, pos: usize) -> Self {
        Self {
            input,
            pos,
            depth: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(self.pos, message)
    }

    /// Parse exactly one `value` and leave the cursor right after it.
    pub fn parse_value(&mut self) -> Result<MiValue, ParseError> {
        match self.peek() {
            Some('"') => self.parse_cstring().map(MiValue::String),
            Some('{') => self.nested(Self::parse_tuple).map(MiValue::Tuple),
            Some('[') => self.nested(Self::parse_list).map(MiValue::List),
            Some(c) if is_constant_char(c) => Ok(MiValue::String(self.parse_constant())),
            Some(c) => Err(self.error(format!("unexpected character '{}'", c))),
            None => Err(self.error("expected a value, found end of input")),
        }
    }

    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        if self.depth >= MAX_NESTING {
            return Err(self.error(format!("values nested deeper than {} levels", MAX_NESTING)));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    /// True when the cursor sits on `symbol=`.
    fn at_result(&self) -> bool {
        let rest = &self.input[self.pos..];
        match rest.chars().next() {
            Some(c) if is_symbol_start(c) => {}
            _ => return false,
        }
        let end = rest
            .find(|c: char| !is_symbol_char(c))
            .unwrap_or(rest.len());
        rest[end..].starts_with('=')
    }

    /// `result := symbol "=" value`
    pub fn parse_result(&mut self) -> Result<(String, MiValue), ParseError> {
        let name = self.parse_symbol()?;
        if !self.eat('=') {
            return Err(self.error(format!("expected '=' after '{}'", name)));
        }
        let value = self.parse_value()?;
        Ok((name, value))
    }

    pub fn parse_symbol(&mut self) -> Result<String, ParseError> {
        let start = self.pos;
        match self.peek() {
            Some(c) if is_symbol_start(c) => {
                self.bump();
            }
            Some(c) => return Err(self.error(format!("expected a symbol, found '{}'", c))),
            None => return Err(self.error("expected a symbol, found end of input")),
        }
        while matches!(self.peek(), Some(c) if is_symbol_char(c)) {
            self.bump();
        }
        Ok(self.input[start..self.pos].to_string())
    }

    fn parse_constant(&mut self) -> String {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if is_constant_char(c)) {
            self.bump();
        }
        self.input[start..self.pos].to_string()
    }

    fn parse_tuple(&mut self) -> Result<MiTuple, ParseError> {
        let open = self.pos;
        self.bump();
        let mut tuple = MiTuple::new();
        if self.eat('}') {
            return Ok(tuple);
        }
        loop {
            if self.is_at_end() {
                return Err(self.error(format!("unterminated tuple opened at {}", open)));
            }
            let (name, value) = self.parse_result()?;
            tuple.insert(name, value);
            match self.peek() {
                Some(',') => {
                    self.bump();
                }
                Some('}') => {
                    self.bump();
                    return Ok(tuple);
                }
                Some(c) => return Err(self.error(format!("expected ',' or '}}', found '{}'", c))),
                None => return Err(self.error(format!("unterminated tuple opened at {}", open))),
            }
        }
    }

    fn parse_list(&mut self) -> Result<MiList, ParseError> {
        let open = self.pos;
        self.bump();
        if self.eat(']') {
            return Ok(MiList::Values(Vec::new()));
        }

        // Element kind is decided once, from the first element.
        let keyed = self.at_result();
        let mut values = Vec::new();
        let mut results = Vec::new();
        loop {
            if self.is_at_end() {
                return Err(self.error(format!("unterminated list opened at {}", open)));
            }
            if keyed {
                results.push(self.parse_result()?);
            } else {
                values.push(self.parse_value()?);
            }
            match self.peek() {
                Some(',') => {
                    self.bump();
                }
                Some(']') => {
                    self.bump();
                    break;
                }
                Some(c) => return Err(self.error(format!("expected ',' or ']', found '{}'", c))),
                None => return Err(self.error(format!("unterminated list opened at {}", open))),
            }
        }

        Ok(if keyed {
            MiList::Results(results)
        } else {
            MiList::Values(values)
        })
    }

    pub fn parse_cstring(&mut self) -> Result<String, ParseError> {
        let open = self.pos;
        if !self.eat('"') {
            return Err(self.error("expected '\"'"));
        }
        let mut text = String::new();
        loop {
            match self.bump() {
                Some('"') => return Ok(text),
                Some('\\') => self.parse_escape(&mut text, open)?,
                Some(c) => text.push(c),
                None => return Err(self.error(format!("unterminated string opened at {}", open))),
            }
        }
    }

    fn parse_escape(&mut self, text: &mut String, open: usize) -> Result<(), ParseError> {
        let escape_at = self.pos - 1;
        let c = match self.peek() {
            Some(c) => c,
            None => return Err(self.error(format!("unterminated string opened at {}", open))),
        };

        if c.is_digit(8) {
            let mut code = 0u32;
            for _ in 0..3 {
                match self.peek().and_then(|d| d.to_digit(8)) {
                    Some(digit) => {
                        code = code * 8 + digit;
                        self.bump();
                    }
                    None => break,
                }
            }
            return push_code_point(text, code, escape_at);
        }

        self.bump();
        match c {
            'a' => text.push('\u{7}'),
            'b' => text.push('\u{8}'),
            'f' => text.push('\u{c}'),
            'n' => text.push('\n'),
            'r' => text.push('\r'),
            't' => text.push('\t'),
            'v' => text.push('\u{b}'),
            'x' => self.parse_hex_escape(text, 2, escape_at)?,
            'u' => self.parse_hex_escape(text, 4, escape_at)?,
            'U' => self.parse_hex_escape(text, 8, escape_at)?,
            other => text.push(other),
        }
        Ok(())
    }

    fn parse_hex_escape(
        &mut self,
        text: &mut String,
        digits: usize,
        escape_at: usize,
    ) -> Result<(), ParseError> {
        let mut code = 0u32;
        for _ in 0..digits {
            match self.peek().and_then(|d| d.to_digit(16)) {
                Some(digit) => {
                    code = code * 16 + digit;
                    self.bump();
                }
                None => {
                    return Err(ParseError::new(
                        escape_at,
                        format!("escape needs exactly {} hex digits", digits),
                    ))
                }
            }
        }
        push_code_point(text, code, escape_at)
    }
}

fn push_code_point(text: &mut String, code: u32, escape_at: usize) -> Result<(), ParseError> {
    let c = char::from_u32(code)
        .ok_or_else(|| ParseError::new(escape_at, format!("invalid code point {:#x}", code)))?;
    text.push(c);
    Ok(())
}

fn is_symbol_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '-'
}

fn is_symbol_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn is_constant_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '+')
}

/// Parse a complete MI value; trailing input is an error.
pub fn parse_value(input: &str) -> Result<MiValue, ParseError> {
    let mut cursor = Cursor::new(input);
    let value = cursor.parse_value()?;
    if !cursor.is_at_end() {
        return Err(ParseError::new(cursor.position(), "trailing characters after value"));
    }
    Ok(value)
}

/// Render text as an MI c-string, quotes included
pub fn render_cstring(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{7}' => out.push_str("\\a"),
            '\u{8}' => out.push_str("\\b"),
            '\u{b}' => out.push_str("\\v"),
            '\u{c}' => out.push_str("\\f"),
            c if c.is_ascii_control() => out.push_str(&format!("\\{:03o}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

impl fmt::Display for MiValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MiValue::String(s) => f.write_str(&render_cstring(s)),
            MiValue::Tuple(t) => write!(f, "{}", t),
            MiValue::List(l) => write!(f, "{}", l),
        }
    }
}

impl fmt::Display for MiTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (name, value)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}={}", name, value)?;
        }
        f.write_str("}")
    }
}

impl fmt::Display for MiList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        match self {
            MiList::Values(values) => {
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", value)?;
                }
            }
            MiList::Results(results) => {
                for (i, (name, value)) in results.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}={}", name, value)?;
                }
            }
        }
        f.write_str("]")
    }
}

/// GDB/MI output record parser
pub struct MiParser {
    // Optional numeral token followed by the record marker
    prefix_pattern: Regex,
}

impl MiParser {
    pub fn new() -> Self {
        Self {
            prefix_pattern: Regex::new(r"^(\d*)([\^*+=~@&])").expect("record prefix pattern"),
        }
    }

    /// Parse a single line of GDB/MI output
    pub fn parse_line(&self, line: &str) -> Result<Option<MiRecord>, ParseError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() || line.trim() == "(gdb)" {
            return Ok(None);
        }

        let caps = self
            .prefix_pattern
            .captures(line)
            .ok_or_else(|| ParseError::new(0, "line does not start with an MI record marker"))?;
        let digits = caps.get(1).map_or("", |m| m.as_str());
        let token = if digits.is_empty() {
            None
        } else {
            Some(
                digits
                    .parse::<u64>()
                    .map_err(|_| ParseError::new(0, format!("token '{}' out of range", digits)))?,
            )
        };
        let marker_end = caps.get(0).map_or(0, |m| m.end());
        let marker = caps.get(2).map_or("", |m| m.as_str());

        let stream = match marker {
            "~" => Some(OutputChannel::Console),
            "@" => Some(OutputChannel::Target),
            "&" => Some(OutputChannel::Log),
            _ => None,
        };
        if let Some(channel) = stream {
            return Ok(Some(MiRecord::Async(AsyncRecord {
                token,
                kind: AsyncKind::Stream(channel),
                class: channel.name().to_string(),
                payload: MiValue::String(line[marker_end..].to_string()),
            })));
        }

        let mut cursor = Cursor::at(line, marker_end);
        let class = cursor.parse_symbol()?;
        let mut payload = MiTuple::new();
        while cursor.eat(',') {
            let (name, value) = cursor.parse_result()?;
            payload.insert(name, value);
        }
        if !cursor.is_at_end() {
            return Err(cursor.error("expected ',' or end of record"));
        }

        let record = match marker {
            "^" => {
                let class = ResultClass::from_symbol(&class).ok_or_else(|| {
                    ParseError::new(marker_end, format!("unknown result class '{}'", class))
                })?;
                MiRecord::Result(ResultRecord {
                    token,
                    class,
                    payload,
                })
            }
            _ => {
                let kind = match marker {
                    "*" => AsyncKind::Exec,
                    "+" => AsyncKind::Status,
                    _ => AsyncKind::Notify,
                };
                MiRecord::Async(AsyncRecord {
                    token,
                    kind,
                    class,
                    payload: MiValue::Tuple(payload),
                })
            }
        };
        Ok(Some(record))
    }
}

impl Default for MiParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode a raw stream record body; falls back to the raw text if it is not a c-string.
pub fn decode_stream_text(raw: &str) -> String {
    let mut cursor = Cursor::new(raw);
    match cursor.parse_cstring() {
        Ok(text) if cursor.is_at_end() => text,
        _ => raw.to_string(),
    }
}

/// Breakpoint number from a `bkpt={number=...}` payload
pub fn breakpoint_number(payload: &MiTuple) -> Option<&str> {
    payload.get_tuple("bkpt")?.get_str("number")
}

/// Frames from a `stack=[frame={...},...]` payload
pub fn parse_stack_frames(payload: &MiTuple) -> Vec<StackFrame> {
    payload
        .get("stack")
        .and_then(MiValue::as_list)
        .map(|list| {
            list.values()
                .into_iter()
                .filter_map(MiValue::as_tuple)
                .filter_map(StackFrame::from_tuple)
                .collect()
        })
        .unwrap_or_default()
}

/// Variables from a `variables=[{name=..,arg=..,value=..},...]` payload
pub fn parse_variables(payload: &MiTuple) -> Vec<Variable> {
    payload
        .get("variables")
        .and_then(MiValue::as_list)
        .map(|list| {
            list.values()
                .into_iter()
                .filter_map(MiValue::as_tuple)
                .filter_map(|var| {
                    Some(Variable {
                        name: var.get_str("name")?.to_string(),
                        value: var.get_str("value").map(str::to_string),
                        var_type: var.get_str("type").map(str::to_string),
                        is_argument: var.get_str("arg") == Some("1"),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(text: &str) -> MiValue {
        MiValue::String(text.to_string())
    }

    #[test]
    fn test_parse_escapes() {
        let value = parse_value(r#""a\tb\101c""#).unwrap();
        assert_eq!(value, s("a\tbAc"));
    }

    #[test]
    fn test_parse_tuple_with_list() {
        let value = parse_value(r#"{a="1",b=[1,2,3]}"#).unwrap();
        let tuple = value.as_tuple().expect("tuple");
        assert_eq!(tuple.get_str("a"), Some("1"));
        assert_eq!(
            tuple.get("b"),
            Some(&MiValue::List(MiList::Values(vec![s("1"), s("2"), s("3")])))
        );
    }

    #[test]
    fn test_parse_empty_containers() {
        assert_eq!(parse_value("[]").unwrap(), MiValue::List(MiList::Values(vec![])));
        assert_eq!(parse_value("{}").unwrap(), MiValue::Tuple(MiTuple::new()));
    }

    #[test]
    fn test_parse_keyed_list() {
        let value = parse_value(r#"[bkpt={number="1"},bkpt={number="2"}]"#).unwrap();
        match value {
            MiValue::List(MiList::Results(results)) => {
                assert_eq!(results.len(), 2);
                assert_eq!(results[0].0, "bkpt");
                assert_eq!(results[1].1.as_tuple().unwrap().get_str("number"), Some("2"));
            }
            other => panic!("Expected keyed list, got {:?}", other),
        }
    }

    #[test]
    fn test_positional_constants_that_look_like_symbols() {
        assert_eq!(
            parse_value("[y,n]").unwrap(),
            MiValue::List(MiList::Values(vec![s("y"), s("n")]))
        );
        assert_eq!(
            parse_value("[-1,x86-64]").unwrap(),
            MiValue::List(MiList::Values(vec![s("-1"), s("x86-64")]))
        );
        // The first element fixes the kind; a later `name=` is malformed.
        let err = parse_value("[y,a=1]").unwrap_err();
        assert_eq!(err.position, 4);
    }

    #[test]
    fn test_empty_list_is_always_positional() {
        let keyed_empty = MiValue::List(MiList::Results(vec![]));
        assert_eq!(keyed_empty.to_string(), "[]");
        assert_eq!(parse_value("[]").unwrap(), MiValue::List(MiList::Values(vec![])));
    }

    #[test]
    fn test_deep_nesting_is_a_parse_error() {
        let input = "[".repeat(500_000);
        let err = parse_value(&input).unwrap_err();
        assert_eq!(err.position, MAX_NESTING);

        let ok = format!("{}{}", "[".repeat(MAX_NESTING), "]".repeat(MAX_NESTING));
        assert!(parse_value(&ok).is_ok());
        let too_deep = format!("{{a={}}}", ok);
        assert_eq!(parse_value(&too_deep).unwrap_err().position, 2 + MAX_NESTING);
    }

    #[test]
    fn test_cursor_stops_after_one_value() {
        let mut cursor = Cursor::new(r#"{a="x"},rest"#);
        cursor.parse_value().unwrap();
        assert_eq!(cursor.position(), 7);
    }

    #[test]
    fn test_unterminated_inputs_fail() {
        for input in [r#""abc"#, r#"{a="1""#, r#"["1","2""#, "{", "["] {
            let err = parse_value(input).unwrap_err();
            assert_eq!(err.position, input.len(), "input {:?}", input);
        }
    }

    #[test]
    fn test_missing_comma_is_an_error() {
        let err = parse_value(r#"{a="1"b="2"}"#).unwrap_err();
        assert_eq!(err.position, 6);
        let err = parse_value(r#"["1""2"]"#).unwrap_err();
        assert_eq!(err.position, 4);
    }

    #[test]
    fn test_unexpected_leading_character() {
        let err = parse_value("}").unwrap_err();
        assert_eq!(err.position, 0);
        let err = parse_value("{a=,}").unwrap_err();
        assert_eq!(err.position, 3);
    }

    #[test]
    fn test_hex_escapes() {
        assert_eq!(parse_value(r#""\x41é\U0001F600""#).unwrap(), s("A\u{e9}\u{1F600}"));
        assert!(parse_value(r#""\x4""#).is_err());
        assert!(parse_value(r#""\u12""#).is_err());
        assert!(parse_value(r#""\UFFFFFFFF""#).is_err());
    }

    #[test]
    fn test_unknown_escape_is_verbatim() {
        assert_eq!(parse_value(r#""\q\"\\""#).unwrap(), s("q\"\\"));
    }

    #[test]
    fn test_octal_reads_at_most_three_digits() {
        assert_eq!(parse_value(r#""\1011""#).unwrap(), s("A1"));
        assert_eq!(parse_value(r#""\0""#).unwrap(), s("\0"));
    }

    #[test]
    fn test_duplicate_tuple_names_keep_last_value() {
        let value = parse_value(r#"{a="1",b="2",a="3"}"#).unwrap();
        let tuple = value.as_tuple().unwrap();
        assert_eq!(tuple.len(), 2);
        assert_eq!(tuple.get_str("a"), Some("3"));
        assert_eq!(tuple.iter().next().map(|(n, _)| n), Some("a"));
    }

    fn nested(depth: usize, seed: usize) -> MiValue {
        const LEAVES: [&str; 5] = ["plain", "tab\there", "quote\"back\\slash", "bell\u{7}\u{1}nul\0", "caf\u{e9}\n"];
        if depth == 0 {
            return s(LEAVES[seed % LEAVES.len()]);
        }
        match seed % 3 {
            0 => MiValue::Tuple(
                (0..3)
                    .map(|i| (format!("k-{}_{}", depth, i), nested(depth - 1, seed + i + 1)))
                    .collect(),
            ),
            1 => MiValue::List(MiList::Values(
                (0..2).map(|i| nested(depth - 1, seed + i + 2)).collect(),
            )),
            _ => MiValue::List(MiList::Results(
                (0..2)
                    .map(|i| ("frame".to_string(), nested(depth - 1, seed + i)))
                    .collect(),
            )),
        }
    }

    #[test]
    fn test_render_then_parse_round_trips() {
        for seed in 0..6 {
            let value = nested(5, seed);
            let text = value.to_string();
            assert_eq!(parse_value(&text).unwrap(), value, "rendered: {}", text);
        }
    }

    #[test]
    fn test_parse_result_done() {
        let parser = MiParser::new();
        match parser.parse_line("^done").unwrap().unwrap() {
            MiRecord::Result(record) => {
                assert_eq!(record.class, ResultClass::Done);
                assert_eq!(record.token, None);
                assert!(record.payload.is_empty());
            }
            _ => panic!("Expected result record"),
        }
    }

    #[test]
    fn test_parse_result_with_token_and_payload() {
        let parser = MiParser::new();
        let line = r#"12^done,bkpt={number="1",type="breakpoint",enabled="y"}"#;
        match parser.parse_line(line).unwrap().unwrap() {
            MiRecord::Result(record) => {
                assert_eq!(record.token, Some(12));
                assert_eq!(breakpoint_number(&record.payload), Some("1"));
            }
            _ => panic!("Expected result record"),
        }
    }

    #[test]
    fn test_parse_error_record() {
        let parser = MiParser::new();
        match parser.parse_line(r#"3^error,msg="No symbol table is loaded.""#).unwrap().unwrap() {
            MiRecord::Result(record) => {
                assert_eq!(record.class, ResultClass::Error);
                assert_eq!(record.payload.get_str("msg"), Some("No symbol table is loaded."));
            }
            _ => panic!("Expected result record"),
        }
    }

    #[test]
    fn test_parse_stopped() {
        let parser = MiParser::new();
        let line = r#"*stopped,reason="breakpoint-hit",bkptno="1",frame={addr="0x401136",func="main",args=[],file="hello.c",fullname="/src/hello.c",line="5"},thread-id="1""#;
        match parser.parse_line(line).unwrap().unwrap() {
            MiRecord::Async(record) => {
                assert!(record.is(AsyncKind::Exec, "stopped"));
                let results = record.results().unwrap();
                assert_eq!(results.get_str("thread-id"), Some("1"));
                let frame = StackFrame::from_tuple(results.get_tuple("frame").unwrap()).unwrap();
                assert_eq!(frame.render(), "#0 main at hello.c:5");
            }
            _ => panic!("Expected async record"),
        }
    }

    #[test]
    fn test_parse_notification_and_status() {
        let parser = MiParser::new();
        match parser.parse_line(r#"=breakpoint-deleted,id="2""#).unwrap().unwrap() {
            MiRecord::Async(record) => {
                assert_eq!(record.kind, AsyncKind::Notify);
                assert_eq!(record.class, "breakpoint-deleted");
            }
            _ => panic!("Expected notification record"),
        }
        match parser.parse_line(r#"+download,section=".text""#).unwrap().unwrap() {
            MiRecord::Async(record) => assert_eq!(record.kind, AsyncKind::Status),
            _ => panic!("Expected status record"),
        }
    }

    #[test]
    fn test_parse_stream_is_verbatim() {
        let parser = MiParser::new();
        match parser.parse_line("~\"Hello\\n\"").unwrap().unwrap() {
            MiRecord::Async(record) => {
                assert_eq!(record.kind, AsyncKind::Stream(OutputChannel::Console));
                assert_eq!(record.payload, s("\"Hello\\n\""));
                assert_eq!(decode_stream_text(record.payload.as_str().unwrap()), "Hello\n");
            }
            _ => panic!("Expected stream record"),
        }
    }

    #[test]
    fn test_prompt_and_blank_lines_are_skipped() {
        let parser = MiParser::new();
        assert_eq!(parser.parse_line("(gdb) ").unwrap(), None);
        assert_eq!(parser.parse_line("\r\n").unwrap(), None);
    }

    #[test]
    fn test_malformed_lines_report_position() {
        let parser = MiParser::new();
        assert!(parser.parse_line("hello world").is_err());
        assert!(parser.parse_line("^bogus").is_err());
        let err = parser.parse_line(r#"^done,a="1"x"#).unwrap_err();
        assert_eq!(err.position, 11);
    }

    #[test]
    fn test_parse_breakpoint_table_body() {
        let parser = MiParser::new();
        let input = r#"^done,BreakpointTable={nr_rows="1",nr_cols="6",hdr=[{width="7",alignment="-1",col_name="number",colhdr="Num"}],body=[bkpt={number="1",type="breakpoint",disp="keep",enabled="y",addr="0x0000000080000080"}]}"#;
        match parser.parse_line(input).unwrap().unwrap() {
            MiRecord::Result(record) => {
                let table = record.payload.get_tuple("BreakpointTable").unwrap();
                let body = table.get("body").and_then(MiValue::as_list).unwrap();
                assert_eq!(body.len(), 1);
                assert!(matches!(body, MiList::Results(_)));
            }
            _ => panic!("Expected result record"),
        }
    }

    #[test]
    fn test_parse_stack_frames_and_variables() {
        let stack = parse_value(r#"{stack=[frame={level="0",addr="0x1",func="f",file="a.c",line="3"},frame={level="1",addr="0x2",func="??"}]}"#).unwrap();
        let frames = parse_stack_frames(stack.as_tuple().unwrap());
        assert_eq!(frames.len(), 2);
        assert!(matches!(frames[1], StackFrame::Instruction { level: 1, .. }));

        let vars = parse_value(r#"{variables=[{name="argc",arg="1",type="int",value="1"},{name="x",type="int"}]}"#).unwrap();
        let vars = parse_variables(vars.as_tuple().unwrap());
        assert_eq!(vars.len(), 2);
        assert!(vars[0].is_argument);
        assert_eq!(vars[1].value, None);
    }
}
