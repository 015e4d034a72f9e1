//! The Jsonnet lexer.
//!
//! Turns a UTF-8 source into a token sequence with spans. Whitespace and
//! `#`, `//`, `/* ... */` comments are skipped. Fails with a
//! [`StaticError`] on unterminated strings or comments, bad escapes,
//! malformed numbers and unexpected characters.

use crate::error::StaticError;
use crate::span::{SourceId, SourceMap, Span};
use crate::token::{StrKind, Sym, Token, TokenKind};

pub struct Lexer<'a> {
    map: &'a SourceMap,
    src: SourceId,
    input: &'a [u8],
    start_pos: usize,
    end_pos: usize,
}

impl<'a> Lexer<'a> {
    #[must_use]
    pub fn new(map: &'a SourceMap, src: SourceId) -> Self {
        Self {
            map,
            src,
            input: map.data(src).as_bytes(),
            start_pos: 0,
            end_pos: 0,
        }
    }

    /// Lexes the whole input. The last token is always
    /// [`TokenKind::EndOfFile`].
    pub fn lex_to_eof(mut self) -> Result<Vec<Token>, StaticError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let is_eof = token.kind == TokenKind::EndOfFile;
            tokens.push(token);
            if is_eof {
                return Ok(tokens);
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, StaticError> {
        loop {
            self.start_pos = self.end_pos;
            return match self.eat_any_byte() {
                None => Ok(self.commit(TokenKind::EndOfFile)),
                Some(b' ' | b'\t' | b'\n' | b'\r') => {
                    while self.eat_byte_if(|b| matches!(b, b' ' | b'\t' | b'\n' | b'\r')) {}
                    continue;
                }
                Some(b'#') => {
                    self.skip_line_comment();
                    continue;
                }
                Some(b'/') => {
                    if self.eat_byte(b'/') {
                        self.skip_line_comment();
                        continue;
                    } else if self.eat_byte(b'*') {
                        self.skip_block_comment()?;
                        continue;
                    } else {
                        self.lex_operator()
                    }
                }
                Some(b'{') => Ok(self.commit(TokenKind::Sym(Sym::LBrace))),
                Some(b'}') => Ok(self.commit(TokenKind::Sym(Sym::RBrace))),
                Some(b'[') => Ok(self.commit(TokenKind::Sym(Sym::LBracket))),
                Some(b']') => Ok(self.commit(TokenKind::Sym(Sym::RBracket))),
                Some(b'(') => Ok(self.commit(TokenKind::Sym(Sym::LParen))),
                Some(b')') => Ok(self.commit(TokenKind::Sym(Sym::RParen))),
                Some(b',') => Ok(self.commit(TokenKind::Sym(Sym::Comma))),
                Some(b'.') => Ok(self.commit(TokenKind::Sym(Sym::Dot))),
                Some(b';') => Ok(self.commit(TokenKind::Sym(Sym::Semicolon))),
                Some(b'|') => {
                    if self.eat_slice(b"||") {
                        self.lex_text_block()
                    } else {
                        self.lex_operator()
                    }
                }
                Some(
                    b'!' | b'$' | b':' | b'~' | b'+' | b'-' | b'&' | b'^' | b'=' | b'<' | b'>'
                    | b'*' | b'%',
                ) => self.lex_operator(),
                Some(chr @ b'0'..=b'9') => self.lex_number(chr),
                Some(b'_' | b'a'..=b'z' | b'A'..=b'Z') => Ok(self.lex_ident()),
                Some(b'@') => {
                    if self.eat_byte(b'\'') {
                        self.lex_verbatim_string(b'\'')
                    } else if self.eat_byte(b'"') {
                        self.lex_verbatim_string(b'"')
                    } else {
                        Err(self.error_at(
                            self.start_pos,
                            self.end_pos,
                            "@ must be followed by a string literal".into(),
                        ))
                    }
                }
                Some(b'\'') => self.lex_quoted_string(b'\''),
                Some(b'"') => self.lex_quoted_string(b'"'),
                Some(byte0) => {
                    let chr = self.eat_rest_of_char(byte0);
                    Err(self.error_at(
                        self.start_pos,
                        self.end_pos,
                        format!("unexpected character {chr:?}"),
                    ))
                }
            };
        }
    }

    fn skip_line_comment(&mut self) {
        while !matches!(self.eat_any_byte(), None | Some(b'\n')) {}
    }

    fn skip_block_comment(&mut self) -> Result<(), StaticError> {
        loop {
            if self.eat_slice(b"*/") {
                return Ok(());
            } else if self.eat_any_byte().is_none() {
                return Err(self.error_at(
                    self.start_pos,
                    self.end_pos,
                    "unterminated comment".into(),
                ));
            }
        }
    }

    fn lex_operator(&mut self) -> Result<Token, StaticError> {
        let mut sure_end_pos = self.end_pos;
        loop {
            if self.peek_slice(b"|||") || self.peek_slice(b"//") || self.peek_slice(b"/*") {
                // `|||`, `//` and `/*` cannot appear within an operator
                break;
            }
            let Some(&next_byte) = self.input.get(self.end_pos) else {
                break;
            };
            // A multi-byte operator cannot end with '+', '-', '~', '!' or '$'
            if matches!(
                next_byte,
                b':' | b'&' | b'|' | b'^' | b'=' | b'<' | b'>' | b'*' | b'/' | b'%'
            ) {
                self.end_pos += 1;
                sure_end_pos = self.end_pos;
            } else if matches!(next_byte, b'+' | b'-' | b'~' | b'!' | b'$') {
                self.end_pos += 1;
            } else {
                break;
            }
        }
        self.end_pos = sure_end_pos;
        let op = &self.input[self.start_pos..self.end_pos];
        let sym = match op {
            b":" => Sym::Colon,
            b"::" => Sym::ColonColon,
            b":::" => Sym::ColonColonColon,
            b"+:" => Sym::PlusColon,
            b"+::" => Sym::PlusColonColon,
            b"+:::" => Sym::PlusColonColonColon,
            b"=" => Sym::Eq,
            b"$" => Sym::Dollar,
            b"*" => Sym::Star,
            b"/" => Sym::Slash,
            b"%" => Sym::Percent,
            b"+" => Sym::Plus,
            b"-" => Sym::Minus,
            b"<<" => Sym::Shl,
            b">>" => Sym::Shr,
            b"<" => Sym::Lt,
            b"<=" => Sym::LtEq,
            b">" => Sym::Gt,
            b">=" => Sym::GtEq,
            b"==" => Sym::EqEq,
            b"!=" => Sym::BangEq,
            b"&" => Sym::Amp,
            b"^" => Sym::Caret,
            b"|" => Sym::Pipe,
            b"&&" => Sym::AmpAmp,
            b"||" => Sym::PipePipe,
            b"!" => Sym::Bang,
            b"~" => Sym::Tilde,
            _ => {
                let op = std::str::from_utf8(op).unwrap().to_owned();
                return Err(self.error_at(
                    self.start_pos,
                    self.end_pos,
                    format!("unknown operator {op:?}"),
                ));
            }
        };
        Ok(self.commit(TokenKind::Sym(sym)))
    }

    #[must_use]
    fn lex_ident(&mut self) -> Token {
        while self.eat_byte_if(|b| b.is_ascii_alphanumeric() || b == b'_') {}
        let ident = std::str::from_utf8(&self.input[self.start_pos..self.end_pos]).unwrap();
        let kind = match ident {
            "assert" => TokenKind::Sym(Sym::Assert),
            "else" => TokenKind::Sym(Sym::Else),
            "error" => TokenKind::Sym(Sym::Error),
            "false" => TokenKind::Sym(Sym::False),
            "for" => TokenKind::Sym(Sym::For),
            "function" => TokenKind::Sym(Sym::Function),
            "if" => TokenKind::Sym(Sym::If),
            "import" => TokenKind::Sym(Sym::Import),
            "importstr" => TokenKind::Sym(Sym::Importstr),
            "importbin" => TokenKind::Sym(Sym::Importbin),
            "in" => TokenKind::Sym(Sym::In),
            "local" => TokenKind::Sym(Sym::Local),
            "null" => TokenKind::Sym(Sym::Null),
            "tailstrict" => TokenKind::Sym(Sym::Tailstrict),
            "then" => TokenKind::Sym(Sym::Then),
            "self" => TokenKind::Sym(Sym::SelfKw),
            "super" => TokenKind::Sym(Sym::Super),
            "true" => TokenKind::Sym(Sym::True),
            _ => TokenKind::Ident(ident.into()),
        };
        self.commit(kind)
    }

    fn lex_number(&mut self, chr0: u8) -> Result<Token, StaticError> {
        if chr0 == b'0' && self.peek_byte_if(|b| b.is_ascii_digit()) {
            return Err(self.error_at(
                self.start_pos,
                self.end_pos + 1,
                "leading zero in number".into(),
            ));
        }
        while self.eat_byte_if(|b| b.is_ascii_digit()) {}

        if self.eat_byte(b'.') {
            let mut frac_digits = 0usize;
            while self.eat_byte_if(|b| b.is_ascii_digit()) {
                frac_digits += 1;
            }
            if frac_digits == 0 {
                return Err(self.error_at(
                    self.end_pos - 1,
                    self.end_pos,
                    "expected digits after \".\" in number".into(),
                ));
            }
        }

        if self.eat_byte_if(|b| matches!(b, b'e' | b'E')) {
            let exp_start = self.end_pos - 1;
            let _ = self.eat_byte(b'+') || self.eat_byte(b'-');
            let mut exp_digits = 0usize;
            while self.eat_byte_if(|b| b.is_ascii_digit()) {
                exp_digits += 1;
            }
            if exp_digits == 0 {
                return Err(self.error_at(
                    exp_start,
                    self.end_pos,
                    "expected digits after exponent in number".into(),
                ));
            }
        }

        let lexeme = std::str::from_utf8(&self.input[self.start_pos..self.end_pos]).unwrap();
        let value: f64 = lexeme.parse().unwrap();
        if !value.is_finite() {
            return Err(self.error_at(
                self.start_pos,
                self.end_pos,
                "number overflows IEEE-754 double".into(),
            ));
        }
        Ok(self.commit(TokenKind::Number(value)))
    }

    fn lex_quoted_string(&mut self, delim: u8) -> Result<Token, StaticError> {
        let mut value = String::new();
        loop {
            if self.eat_byte(delim) {
                break;
            } else if self.eat_byte(b'\\') {
                let escape_start = self.end_pos - 1;
                match self.eat_any_byte() {
                    Some(b'"') => value.push('"'),
                    Some(b'\'') => value.push('\''),
                    Some(b'\\') => value.push('\\'),
                    Some(b'/') => value.push('/'),
                    Some(b'b') => value.push('\u{8}'),
                    Some(b'f') => value.push('\u{c}'),
                    Some(b'n') => value.push('\n'),
                    Some(b'r') => value.push('\r'),
                    Some(b't') => value.push('\t'),
                    Some(b'u') => {
                        let Some(cu1) = self.eat_codeunit() else {
                            return Err(self.error_at(
                                escape_start,
                                self.end_pos,
                                "truncated unicode escape".into(),
                            ));
                        };
                        if matches!(cu1, 0xD800..=0xDFFF) && self.eat_slice(b"\\u") {
                            let Some(cu2) = self.eat_codeunit() else {
                                return Err(self.error_at(
                                    escape_start,
                                    self.end_pos,
                                    "truncated unicode escape".into(),
                                ));
                            };
                            match char::decode_utf16([cu1, cu2]).next().unwrap() {
                                Ok(chr) => value.push(chr),
                                Err(_) => {
                                    return Err(self.error_at(
                                        escape_start,
                                        self.end_pos,
                                        format!(
                                            "invalid surrogate pair \\u{cu1:04x}\\u{cu2:04x}"
                                        ),
                                    ));
                                }
                            }
                        } else if let Some(chr) = char::from_u32(cu1.into()) {
                            value.push(chr);
                        } else {
                            return Err(self.error_at(
                                escape_start,
                                self.end_pos,
                                format!("invalid unicode escape \\u{cu1:04x}"),
                            ));
                        }
                    }
                    Some(byte0) if byte0.is_ascii() => {
                        return Err(self.error_at(
                            escape_start,
                            self.end_pos,
                            format!("invalid escape sequence \\{}", char::from(byte0)),
                        ));
                    }
                    Some(byte0) => {
                        let chr = self.eat_rest_of_char(byte0);
                        return Err(self.error_at(
                            escape_start,
                            self.end_pos,
                            format!("invalid escape sequence \\{chr}"),
                        ));
                    }
                    None => {
                        return Err(self.unterminated_string());
                    }
                }
            } else {
                match self.eat_any_byte() {
                    None => return Err(self.unterminated_string()),
                    Some(byte0) if byte0.is_ascii() => value.push(char::from(byte0)),
                    Some(byte0) => value.push(self.eat_rest_of_char(byte0)),
                }
            }
        }
        Ok(self.commit(TokenKind::Str {
            value,
            kind: StrKind::Quoted,
        }))
    }

    fn lex_verbatim_string(&mut self, delim: u8) -> Result<Token, StaticError> {
        let mut value = String::new();
        loop {
            if self.eat_byte(delim) {
                if self.eat_byte(delim) {
                    // A doubled quote is the only escape.
                    value.push(char::from(delim));
                } else {
                    break;
                }
            } else {
                match self.eat_any_byte() {
                    None => return Err(self.unterminated_string()),
                    Some(byte0) if byte0.is_ascii() => value.push(char::from(byte0)),
                    Some(byte0) => value.push(self.eat_rest_of_char(byte0)),
                }
            }
        }
        Ok(self.commit(TokenKind::Str {
            value,
            kind: StrKind::Verbatim,
        }))
    }

    fn lex_text_block(&mut self) -> Result<Token, StaticError> {
        let strip_last_lf = self.eat_byte(b'-');

        let mut value = String::new();
        while self.eat_byte_if(|b| matches!(b, b' ' | b'\t' | b'\r')) {}
        if !self.eat_byte(b'\n') {
            return Err(self.error_at(
                self.start_pos,
                self.end_pos,
                "text block requires a new line after |||".into(),
            ));
        }

        // Fully blank lines before the first content line.
        let prefix;
        loop {
            let prefix_start = self.end_pos;
            while self.eat_byte_if(|b| matches!(b, b' ' | b'\t')) {}
            let prefix_end = self.end_pos;
            if prefix_start == prefix_end {
                if self.eat_byte(b'\n') {
                    value.push('\n');
                    continue;
                }
                return Err(self.error_at(
                    prefix_start,
                    prefix_end,
                    "text block's first line must start with whitespace".into(),
                ));
            }
            prefix = self.input[prefix_start..prefix_end].to_vec();
            break;
        }

        'outer: loop {
            match self.eat_any_byte() {
                None => return Err(self.unterminated_string()),
                Some(b'\n') => {
                    value.push('\n');
                    loop {
                        // Blank lines need not carry the prefix.
                        if self.eat_byte(b'\n') {
                            value.push('\n');
                        } else if self.eat_slice(b"\r\n") {
                            value.push_str("\r\n");
                        } else {
                            break;
                        }
                    }
                    if !self.eat_slice(&prefix) {
                        let line_start = self.end_pos;
                        while self.eat_byte_if(|b| matches!(b, b' ' | b'\t')) {}
                        if self.eat_slice(b"|||") {
                            break 'outer;
                        }
                        return Err(self.error_at(
                            line_start,
                            self.end_pos,
                            "text block not terminated with |||".into(),
                        ));
                    }
                }
                Some(byte0) if byte0.is_ascii() => value.push(char::from(byte0)),
                Some(byte0) => value.push(self.eat_rest_of_char(byte0)),
            }
        }

        if strip_last_lf {
            value.pop();
        }
        Ok(self.commit(TokenKind::Str {
            value,
            kind: StrKind::Block,
        }))
    }

    #[must_use]
    #[inline]
    fn eat_byte(&mut self, byte: u8) -> bool {
        if matches!(self.input.get(self.end_pos), Some(&b) if b == byte) {
            self.end_pos += 1;
            true
        } else {
            false
        }
    }

    #[must_use]
    #[inline]
    fn eat_byte_if(&mut self, pred: impl FnOnce(u8) -> bool) -> bool {
        if matches!(self.input.get(self.end_pos), Some(&b) if pred(b)) {
            self.end_pos += 1;
            true
        } else {
            false
        }
    }

    #[must_use]
    #[inline]
    fn peek_byte_if(&self, pred: impl FnOnce(u8) -> bool) -> bool {
        matches!(self.input.get(self.end_pos), Some(&b) if pred(b))
    }

    #[must_use]
    #[inline]
    fn eat_any_byte(&mut self) -> Option<u8> {
        if let Some(&byte) = self.input.get(self.end_pos) {
            self.end_pos += 1;
            Some(byte)
        } else {
            None
        }
    }

    #[must_use]
    #[inline]
    fn peek_slice(&self, s: &[u8]) -> bool {
        self.input
            .get(self.end_pos..)
            .is_some_and(|rem| rem.starts_with(s))
    }

    #[must_use]
    #[inline]
    fn eat_slice(&mut self, s: &[u8]) -> bool {
        if self.peek_slice(s) {
            self.end_pos += s.len();
            true
        } else {
            false
        }
    }

    /// Consumes the continuation bytes of the multi-byte character whose
    /// first byte was already consumed, and returns the character. The
    /// input is a valid UTF-8 `str`, so this cannot fail.
    #[must_use]
    fn eat_rest_of_char(&mut self, _byte0: u8) -> char {
        let start = self.end_pos - 1;
        let text = std::str::from_utf8(&self.input[start..]).unwrap();
        let chr = text.chars().next().unwrap();
        self.end_pos = start + chr.len_utf8();
        chr
    }

    #[must_use]
    fn eat_codeunit(&mut self) -> Option<u16> {
        let hex_from_digit = |b: u8| match b {
            b'0'..=b'9' => Some(u16::from(b - b'0')),
            b'a'..=b'f' => Some(u16::from(b - b'a' + 10)),
            b'A'..=b'F' => Some(u16::from(b - b'A' + 10)),
            _ => None,
        };
        let mut value = 0u16;
        for _ in 0..4 {
            let digit = hex_from_digit(*self.input.get(self.end_pos)?)?;
            self.end_pos += 1;
            value = (value << 4) | digit;
        }
        Some(value)
    }

    #[must_use]
    fn unterminated_string(&self) -> StaticError {
        self.error_at(self.start_pos, self.end_pos, "unterminated string".into())
    }

    #[must_use]
    fn error_at(&self, start: usize, end: usize, message: String) -> StaticError {
        StaticError::new(self.map, Span::new(self.src, start, end), message)
    }

    #[must_use]
    fn commit(&mut self, kind: TokenKind) -> Token {
        let span = Span::new(self.src, self.start_pos, self.end_pos);
        self.start_pos = self.end_pos;
        Token { span, kind }
    }
}

#[cfg(test)]
mod tests {
    use super::Lexer;
    use crate::span::SourceMap;
    use crate::token::{StrKind, Sym, TokenKind};

    fn lex(input: &str) -> Vec<TokenKind> {
        let mut map = SourceMap::new();
        let src = map.add_file("test.jsonnet", input.into());
        let tokens = Lexer::new(&map, src).lex_to_eof().unwrap();
        tokens.into_iter().map(|t| t.kind).collect()
    }

    fn lex_err(input: &str) -> String {
        let mut map = SourceMap::new();
        let src = map.add_file("test.jsonnet", input.into());
        Lexer::new(&map, src).lex_to_eof().unwrap_err().message
    }

    #[test]
    fn test_symbols() {
        assert_eq!(
            lex("{ } [ ] ( ) , . ; :: :::"),
            vec![
                TokenKind::Sym(Sym::LBrace),
                TokenKind::Sym(Sym::RBrace),
                TokenKind::Sym(Sym::LBracket),
                TokenKind::Sym(Sym::RBracket),
                TokenKind::Sym(Sym::LParen),
                TokenKind::Sym(Sym::RParen),
                TokenKind::Sym(Sym::Comma),
                TokenKind::Sym(Sym::Dot),
                TokenKind::Sym(Sym::Semicolon),
                TokenKind::Sym(Sym::ColonColon),
                TokenKind::Sym(Sym::ColonColonColon),
                TokenKind::EndOfFile,
            ],
        );
    }

    #[test]
    fn test_operator_munch() {
        // `+:` is one token, `=+` is not an operator.
        assert_eq!(
            lex("+:"),
            vec![TokenKind::Sym(Sym::PlusColon), TokenKind::EndOfFile],
        );
        assert_eq!(
            lex("1+-2"),
            vec![
                TokenKind::Number(1.0),
                TokenKind::Sym(Sym::Plus),
                TokenKind::Sym(Sym::Minus),
                TokenKind::Number(2.0),
                TokenKind::EndOfFile,
            ],
        );
        // An operator stops before a comment.
        assert_eq!(
            lex("1+//x\n2"),
            vec![
                TokenKind::Number(1.0),
                TokenKind::Sym(Sym::Plus),
                TokenKind::Number(2.0),
                TokenKind::EndOfFile,
            ],
        );
    }

    #[test]
    fn test_keywords_and_idents() {
        assert_eq!(
            lex("local foo"),
            vec![
                TokenKind::Sym(Sym::Local),
                TokenKind::Ident("foo".into()),
                TokenKind::EndOfFile,
            ],
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(lex("0")[0], TokenKind::Number(0.0));
        assert_eq!(lex("1.5")[0], TokenKind::Number(1.5));
        assert_eq!(lex("1e3")[0], TokenKind::Number(1000.0));
        assert_eq!(lex("2E-2")[0], TokenKind::Number(0.02));
        assert!(lex_err("01").contains("leading zero"));
        assert!(lex_err("1.").contains("digits"));
        assert!(lex_err("1e").contains("exponent"));
        assert!(lex_err("1e999").contains("overflows"));
    }

    #[test]
    fn test_strings() {
        assert_eq!(
            lex(r#""a\nb\u0041""#)[0],
            TokenKind::Str {
                value: "a\nbA".into(),
                kind: StrKind::Quoted,
            },
        );
        assert_eq!(
            lex(r#"@"a""b""#)[0],
            TokenKind::Str {
                value: "a\"b".into(),
                kind: StrKind::Verbatim,
            },
        );
        assert_eq!(
            lex("\"\\uD834\\uDD1E\"")[0],
            TokenKind::Str {
                value: "\u{1D11E}".into(),
                kind: StrKind::Quoted,
            },
        );
        assert!(lex_err("\"a").contains("unterminated"));
        assert!(lex_err(r#""\q""#).contains("invalid escape"));
        assert!(lex_err("\"\\uD834\"").contains("invalid unicode escape"));
    }

    #[test]
    fn test_text_block() {
        let input = "|||\n  foo\n  bar\n|||";
        assert_eq!(
            lex(input)[0],
            TokenKind::Str {
                value: "foo\nbar\n".into(),
                kind: StrKind::Block,
            },
        );

        let input = "|||\n  foo\n\n  bar\n|||";
        assert_eq!(
            lex(input)[0],
            TokenKind::Str {
                value: "foo\n\nbar\n".into(),
                kind: StrKind::Block,
            },
        );

        let input = "|||-\n  foo\n|||";
        assert_eq!(
            lex(input)[0],
            TokenKind::Str {
                value: "foo".into(),
                kind: StrKind::Block,
            },
        );

        assert!(lex_err("||| foo |||").contains("new line"));
        assert!(lex_err("|||\n  foo\n bar\n|||").contains("not terminated"));
    }

    #[test]
    fn test_comments() {
        assert_eq!(
            lex("# c\n// c\n/* c\nc */ 1"),
            vec![TokenKind::Number(1.0), TokenKind::EndOfFile],
        );
        assert!(lex_err("/*").contains("unterminated comment"));
    }
}
