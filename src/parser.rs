// src/parser.rs
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    InvalidSyntax { msg: String, line: usize, col: usize },
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::InvalidSyntax { msg, line, col } => {
                write!(f, "{msg} at line {line}, column {col}")
            }
        }
    }
}

/// Character cursor shared by the expression grammar, module definitions and
/// the directive scanner.
pub struct Parser<'a> {
    s: &'a str,
    i: usize,
}

impl<'a> Parser<'a> {
    pub fn new(s: &'a str) -> Self {
        Self { s, i: 0 }
    }

    /// Build an error pointing at the current position.
    pub fn error(&self, msg: impl Into<String>) -> ParseError {
        let consumed = &self.s[..self.i];
        let line = consumed.matches('\n').count() + 1;
        let col = consumed
            .rfind('\n')
            .map(|nl| consumed[nl + 1..].chars().count())
            .unwrap_or_else(|| consumed.chars().count())
            + 1;
        ParseError::InvalidSyntax { msg: msg.into(), line, col }
    }

    pub fn peek_ident_start(&self) -> bool {
        self.peek_char()
            .map(|c| c == '_' || c.is_ascii_alphabetic())
            .unwrap_or(false)
    }

    pub fn parse_identifier(&mut self) -> Result<String, ParseError> {
        if !self.peek_ident_start() {
            return Err(self.error("identifier expected"));
        }
        let start = self.i;
        while let Some(c) = self.peek_char() {
            if c == '_' || c.is_ascii_alphanumeric() {
                self.i += 1;
            } else {
                break;
            }
        }
        Ok(self.s[start..self.i].to_string())
    }

    /// Unsigned integer or float literal; a leading minus is the caller's business.
    pub fn parse_number_literal(&mut self) -> Result<Value, ParseError> {
        let start = self.i;
        self.eat_digits();
        let mut is_float = false;
        if self.peek_char() == Some('.')
            && self.s[self.i + 1..]
                .chars()
                .next()
                .map(|c| c.is_ascii_digit())
                .unwrap_or(false)
        {
            self.i += 1;
            self.eat_digits();
            is_float = true;
        }
        if matches!(self.peek_char(), Some('e') | Some('E')) {
            let mark = self.i;
            self.i += 1;
            if matches!(self.peek_char(), Some('+') | Some('-')) {
                self.i += 1;
            }
            if self.eat_digits() == 0 {
                self.i = mark;
            } else {
                is_float = true;
            }
        }
        let s = &self.s[start..self.i];
        if s.is_empty() {
            return Err(self.error("number expected"));
        }
        if is_float {
            let f: f64 = s.parse().map_err(|_| self.error("bad float"))?;
            serde_json::Number::from_f64(f)
                .map(Value::Number)
                .ok_or_else(|| self.error("float out of range"))
        } else {
            let i: i64 = s.parse().map_err(|_| self.error("bad integer"))?;
            Ok(Value::from(i))
        }
    }

    fn eat_digits(&mut self) -> usize {
        let start = self.i;
        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() {
                self.i += 1;
            } else {
                break;
            }
        }
        self.i - start
    }

    pub fn parse_quoted_string(&mut self) -> Result<String, ParseError> {
        let quote = self.peek_char().ok_or_else(|| self.error("string"))?;
        if quote != '\'' && quote != '"' {
            return Err(self.error("expected quoted string"));
        }
        self.i += 1;
        let mut out = String::new();
        while let Some(c) = self.peek_char() {
            self.i += c.len_utf8();
            if c == quote {
                return Ok(out);
            }
            if c == '\\' {
                if let Some(nc) = self.peek_char() {
                    self.i += nc.len_utf8();
                    match nc {
                        'n' => out.push('\n'),
                        't' => out.push('\t'),
                        'r' => out.push('\r'),
                        '\\' => out.push('\\'),
                        '"' => out.push('"'),
                        '\'' => out.push('\''),
                        _ => {
                            out.push('\\');
                            out.push(nc);
                        }
                    }
                } else {
                    break;
                }
            } else {
                out.push(c);
            }
        }
        Err(self.error("unterminated string"))
    }

    /// Consume a run of non-whitespace characters.
    pub fn take_token(&mut self) -> &'a str {
        let start = self.i;
        while let Some(c) = self.peek_char() {
            if c.is_whitespace() {
                break;
            }
            self.i += c.len_utf8();
        }
        &self.s[start..self.i]
    }

    pub fn expect(&mut self, c: char) -> Result<(), ParseError> {
        if self.consume_char(c) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", c)))
        }
    }

    pub fn consume_char(&mut self, c: char) -> bool {
        if self.peek_char() == Some(c) {
            self.i += c.len_utf8();
            true
        } else {
            false
        }
    }

    pub fn consume_str(&mut self, lit: &str) -> bool {
        if self.peek_str(lit) {
            self.i += lit.len();
            true
        } else {
            false
        }
    }

    /// Consume a keyword only when it is not the prefix of a longer identifier.
    pub fn consume_keyword(&mut self, kw: &str) -> bool {
        if !self.peek_str(kw) {
            return false;
        }
        let next = self.s[self.i + kw.len()..].chars().next();
        if next.map(|c| c == '_' || c.is_ascii_alphanumeric()).unwrap_or(false) {
            return false;
        }
        self.i += kw.len();
        true
    }

    pub fn peek_char(&self) -> Option<char> {
        self.s[self.i..].chars().next()
    }

    pub fn peek_str(&self, lit: &str) -> bool {
        self.s[self.i..].starts_with(lit)
    }

    /// Skip whitespace and `//` line comments.
    pub fn skip_ws(&mut self) {
        loop {
            while let Some(c) = self.peek_char() {
                if c.is_whitespace() {
                    self.i += c.len_utf8();
                } else {
                    break;
                }
            }
            if self.peek_str("//") {
                self.skip_line();
            } else {
                break;
            }
        }
    }

    /// Skip spaces and tabs without crossing a line break.
    pub fn skip_inline_ws(&mut self) {
        while let Some(c) = self.peek_char() {
            if c == ' ' || c == '\t' {
                self.i += 1;
            } else {
                break;
            }
        }
    }

    pub fn skip_line(&mut self) {
        match self.s[self.i..].find('\n') {
            Some(off) => self.i += off + 1,
            None => self.i = self.s.len(),
        }
    }

    pub fn at_line_end(&self) -> bool {
        matches!(self.peek_char(), None | Some('\n') | Some('\r'))
    }

    pub fn eof(&self) -> bool {
        self.i >= self.s.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn numbers_keep_integer_and_float_apart() {
        assert_eq!(Parser::new("42").parse_number_literal().unwrap(), Value::from(42));
        assert_eq!(Parser::new("0.25").parse_number_literal().unwrap(), Value::from(0.25));
        assert_eq!(Parser::new("1e3").parse_number_literal().unwrap(), Value::from(1000.0));
    }

    #[test]
    fn method_dot_is_not_a_fraction() {
        let mut p = Parser::new("5.abs()");
        assert_eq!(p.parse_number_literal().unwrap(), Value::from(5));
        assert!(p.consume_char('.'));
    }

    #[test]
    fn comments_are_whitespace() {
        let mut p = Parser::new("  // note\n  // more\n x");
        p.skip_ws();
        assert_eq!(p.parse_identifier().unwrap(), "x");
    }

    #[test]
    fn errors_report_line_and_column() {
        let mut p = Parser::new("a\n  'open");
        p.parse_identifier().unwrap();
        p.skip_ws();
        let err = p.parse_quoted_string().unwrap_err();
        assert_eq!(err.to_string(), "unterminated string at line 2, column 8");
    }

    #[test]
    fn keywords_respect_identifier_boundaries() {
        assert!(!Parser::new("trueish").consume_keyword("true"));
        assert!(Parser::new("true)").consume_keyword("true"));
    }
}
