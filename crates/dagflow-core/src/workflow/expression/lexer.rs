//! Tokenizer for the guard expression language.
//!
//! Keywords that only make sense in statements or that introduce code
//! (`lambda`, `import`, comprehensions, ...) are refused here, before a
//! parser ever sees them.

use super::ExpressionError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Name(String),

    // Keywords
    And,
    Or,
    Not,
    In,
    Is,
    If,
    Else,
    True,
    False,
    None,

    // Operators
    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    DoubleSlash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    /// Only legal for keyword arguments inside a call.
    Assign,

    // Delimiters
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,

    Eof,
}

/// Names that start statements, definitions, imports, or comprehensions.
const FORBIDDEN_KEYWORDS: &[&str] = &[
    "lambda", "import", "from", "yield", "await", "async", "for", "while", "def", "class",
    "del", "global", "nonlocal", "with", "assert", "raise", "return", "try", "except",
    "finally", "pass", "break", "continue",
];

pub struct Lexer<'a> {
    src: &'a str,
    chars: Vec<(usize, char)>,
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            src,
            chars: src.char_indices().collect(),
            pos: 0,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, ExpressionError> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token()?;
            let done = tok == Token::Eof;
            tokens.push(tok);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|&(_, c)| c)
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).map(|&(_, c)| c)
    }

    fn offset(&self) -> usize {
        self.chars
            .get(self.pos)
            .map(|&(i, _)| i)
            .unwrap_or(self.src.len())
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn next_token(&mut self) -> Result<Token, ExpressionError> {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }

        let start = self.offset();
        let Some(c) = self.peek() else {
            return Ok(Token::Eof);
        };

        if c.is_ascii_digit() || (c == '.' && matches!(self.peek_at(1), Some(d) if d.is_ascii_digit())) {
            return self.number();
        }

        if c == '\'' || c == '"' {
            return self.string(c);
        }

        if c.is_alphabetic() || c == '_' {
            return self.word();
        }

        self.bump();
        let tok = match c {
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => {
                if self.peek() == Some('*') {
                    self.bump();
                    Token::DoubleStar
                } else {
                    Token::Star
                }
            }
            '/' => {
                if self.peek() == Some('/') {
                    self.bump();
                    Token::DoubleSlash
                } else {
                    Token::Slash
                }
            }
            '%' => Token::Percent,
            '=' => {
                if self.peek() == Some('=') {
                    self.bump();
                    Token::EqEq
                } else {
                    Token::Assign
                }
            }
            '!' => {
                if self.peek() == Some('=') {
                    self.bump();
                    Token::NotEq
                } else {
                    return Err(ExpressionError::Syntax(format!(
                        "unexpected '!' at offset {start}"
                    )));
                }
            }
            '<' => match self.peek() {
                Some('=') => {
                    self.bump();
                    Token::LtEq
                }
                Some('<') => return Err(unsafe_operator("<<")),
                _ => Token::Lt,
            },
            '>' => match self.peek() {
                Some('=') => {
                    self.bump();
                    Token::GtEq
                }
                Some('>') => return Err(unsafe_operator(">>")),
                _ => Token::Gt,
            },
            '(' => Token::LParen,
            ')' => Token::RParen,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            '{' => Token::LBrace,
            '}' => Token::RBrace,
            ',' => Token::Comma,
            ':' => {
                if self.peek() == Some('=') {
                    return Err(ExpressionError::Unsafe(
                        "assignment expressions (':=') are not allowed".to_string(),
                    ));
                }
                Token::Colon
            }
            '.' => Token::Dot,
            ';' => {
                return Err(ExpressionError::Unsafe(
                    "statement separators (';') are not allowed".to_string(),
                ));
            }
            '|' | '&' | '^' | '~' | '@' | '`' => {
                return Err(unsafe_operator(&c.to_string()));
            }
            other => {
                return Err(ExpressionError::Syntax(format!(
                    "unexpected character '{other}' at offset {start}"
                )));
            }
        };
        Ok(tok)
    }

    fn number(&mut self) -> Result<Token, ExpressionError> {
        let start = self.offset();
        let mut is_float = false;

        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.bump();
        }
        if self.peek() == Some('.') && !matches!(self.peek_at(1), Some('.')) {
            is_float = true;
            self.bump();
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.bump();
            }
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let sign_then_digit = matches!(self.peek_at(1), Some('+' | '-'))
                && matches!(self.peek_at(2), Some(d) if d.is_ascii_digit());
            let digit = matches!(self.peek_at(1), Some(d) if d.is_ascii_digit());
            if sign_then_digit || digit {
                is_float = true;
                self.bump();
                if sign_then_digit {
                    self.bump();
                }
                while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                    self.bump();
                }
            }
        }

        let text = &self.src[start..self.offset()];
        if is_float {
            text.parse::<f64>()
                .map(Token::Float)
                .map_err(|_| ExpressionError::Syntax(format!("invalid number '{text}'")))
        } else {
            text.parse::<i64>()
                .map(Token::Int)
                .map_err(|_| ExpressionError::Syntax(format!("integer literal '{text}' is too large")))
        }
    }

    fn string(&mut self, quote: char) -> Result<Token, ExpressionError> {
        let start = self.offset();
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                None => {
                    return Err(ExpressionError::Syntax(format!(
                        "unterminated string starting at offset {start}"
                    )));
                }
                Some(c) if c == quote => return Ok(Token::Str(out)),
                Some('\\') => {
                    let escaped = self.bump().ok_or_else(|| {
                        ExpressionError::Syntax(format!(
                            "unterminated string starting at offset {start}"
                        ))
                    })?;
                    match escaped {
                        'n' => out.push('\n'),
                        't' => out.push('\t'),
                        'r' => out.push('\r'),
                        '0' => out.push('\0'),
                        '\\' => out.push('\\'),
                        '\'' => out.push('\''),
                        '"' => out.push('"'),
                        other => {
                            out.push('\\');
                            out.push(other);
                        }
                    }
                }
                Some(c) => out.push(c),
            }
        }
    }

    fn word(&mut self) -> Result<Token, ExpressionError> {
        let start = self.offset();
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
            self.bump();
        }
        let word = &self.src[start..self.offset()];

        // f"..", b"..", r"..": prefixed literals carry their own mini-languages.
        if matches!(self.peek(), Some('\'' | '"')) {
            return Err(ExpressionError::Unsafe(format!(
                "string prefix '{word}' is not allowed"
            )));
        }

        if FORBIDDEN_KEYWORDS.contains(&word) {
            return Err(ExpressionError::Unsafe(format!("'{word}' is not allowed")));
        }

        let tok = match word {
            "and" => Token::And,
            "or" => Token::Or,
            "not" => Token::Not,
            "in" => Token::In,
            "is" => Token::Is,
            "if" => Token::If,
            "else" => Token::Else,
            "True" | "true" => Token::True,
            "False" | "false" => Token::False,
            "None" | "null" => Token::None,
            _ => Token::Name(word.to_string()),
        };
        Ok(tok)
    }
}

fn unsafe_operator(op: &str) -> ExpressionError {
    ExpressionError::Unsafe(format!("operator '{op}' is not allowed"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(src: &str) -> Result<Vec<Token>, ExpressionError> {
        Lexer::new(src).tokenize()
    }

    #[test]
    fn test_numbers_and_operators() {
        let tokens = lex("1 + 2.5 ** 3 // 4 != 1e3").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Int(1),
                Token::Plus,
                Token::Float(2.5),
                Token::DoubleStar,
                Token::Int(3),
                Token::DoubleSlash,
                Token::Int(4),
                Token::NotEq,
                Token::Float(1000.0),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_strings_with_escapes() {
        let tokens = lex(r#"'it\'s' "two\nlines""#).unwrap();
        assert_eq!(tokens[0], Token::Str("it's".to_string()));
        assert_eq!(tokens[1], Token::Str("two\nlines".to_string()));
    }

    #[test]
    fn test_keywords_case_variants() {
        let tokens = lex("True false None null not in").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::True,
                Token::False,
                Token::None,
                Token::None,
                Token::Not,
                Token::In,
                Token::Eof
            ]
        );
    }

    #[test]
    fn test_forbidden_keywords_are_unsafe() {
        for src in ["lambda: 1", "import os", "[x for x in y]", "await x", "(yield)"] {
            let err = lex(src).unwrap_err();
            assert!(matches!(err, ExpressionError::Unsafe(_)), "{src}: {err:?}");
        }
    }

    #[test]
    fn test_walrus_and_semicolon_are_unsafe() {
        assert!(matches!(lex("(x := 1)"), Err(ExpressionError::Unsafe(_))));
        assert!(matches!(lex("a; b"), Err(ExpressionError::Unsafe(_))));
    }

    #[test]
    fn test_prefixed_strings_are_unsafe() {
        assert!(matches!(lex("f'{x}'"), Err(ExpressionError::Unsafe(_))));
    }

    #[test]
    fn test_unterminated_string_is_syntax_error() {
        assert!(matches!(lex("'abc"), Err(ExpressionError::Syntax(_))));
    }
}
