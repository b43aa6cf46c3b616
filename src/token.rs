use std::fmt;

use crate::types::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Name,
    Num,
    /// String fragment that precedes an interpolated variable.
    String,
    Bool,
    Null,
    /// `${name}` inside a double quoted string.
    EncapsedVar,
    /// `${name}` outside of a string.
    Var,
    /// Final fragment of a string, or a whole string without interpolation.
    EndStr,
    Eof,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    LeftParen,
    RightParen,
    Colon,
    Equals,
    Semicolon,
    Comma,
    Dot,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Pipe,
    Ampersand,
    Caret,
    ShiftLeft,
    ShiftRight,
}

impl TokenKind {
    pub fn from_punct(text: &str) -> Option<TokenKind> {
        let kind = match text {
            "{" => TokenKind::LeftBrace,
            "}" => TokenKind::RightBrace,
            "[" => TokenKind::LeftBracket,
            "]" => TokenKind::RightBracket,
            "(" => TokenKind::LeftParen,
            ")" => TokenKind::RightParen,
            ":" => TokenKind::Colon,
            "=" => TokenKind::Equals,
            ";" => TokenKind::Semicolon,
            "," => TokenKind::Comma,
            "." => TokenKind::Dot,
            "+" => TokenKind::Plus,
            "-" => TokenKind::Minus,
            "*" => TokenKind::Star,
            "/" => TokenKind::Slash,
            "%" => TokenKind::Percent,
            "|" => TokenKind::Pipe,
            "&" => TokenKind::Ampersand,
            "^" => TokenKind::Caret,
            "<<" => TokenKind::ShiftLeft,
            ">>" => TokenKind::ShiftRight,
            _ => return None,
        };
        Some(kind)
    }

    /// Symbolic name of tokens that carry a payload.
    pub fn name(&self) -> Option<&'static str> {
        match self {
            TokenKind::Name => Some("T_NAME"),
            TokenKind::Num => Some("T_NUM"),
            TokenKind::String => Some("T_STRING"),
            TokenKind::Bool => Some("T_BOOL"),
            TokenKind::Null => Some("T_NULL"),
            TokenKind::EncapsedVar => Some("T_ENCAPSED_VAR"),
            TokenKind::Var => Some("T_VAR"),
            TokenKind::EndStr => Some("T_END_STR"),
            TokenKind::Eof => Some("T_EOF"),
            _ => None,
        }
    }

    /// Source text of punctuation tokens.
    pub fn literal(&self) -> &'static str {
        match self {
            TokenKind::LeftBrace => "{",
            TokenKind::RightBrace => "}",
            TokenKind::LeftBracket => "[",
            TokenKind::RightBracket => "]",
            TokenKind::LeftParen => "(",
            TokenKind::RightParen => ")",
            TokenKind::Colon => ":",
            TokenKind::Equals => "=",
            TokenKind::Semicolon => ";",
            TokenKind::Comma => ",",
            TokenKind::Dot => ".",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::Pipe => "|",
            TokenKind::Ampersand => "&",
            TokenKind::Caret => "^",
            TokenKind::ShiftLeft => "<<",
            TokenKind::ShiftRight => ">>",
            other => other.name().unwrap_or("?"),
        }
    }

    /// Tokens that may open a string (used as a key or a value).
    pub fn starts_string(&self) -> bool {
        matches!(self, TokenKind::Name | TokenKind::String | TokenKind::EncapsedVar | TokenKind::EndStr)
    }

    /// Tokens that may open any value.
    pub fn starts_value(&self) -> bool {
        self.starts_string()
            || matches!(
                self,
                TokenKind::Num
                    | TokenKind::Bool
                    | TokenKind::Null
                    | TokenKind::Var
                    | TokenKind::LeftBrace
                    | TokenKind::LeftBracket
                    | TokenKind::LeftParen
                    | TokenKind::Dot
                    | TokenKind::Plus
                    | TokenKind::Minus
            )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.literal())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Decoded payload: the number, boolean, string text or variable name.
    pub value: Value,
    /// Text as it appeared in the source.
    pub text: String,
    pub line: usize,
}

impl Token {
    pub fn new(kind: TokenKind, value: Value, text: impl Into<String>, line: usize) -> Self {
        Self { kind, value, text: text.into(), line }
    }

    pub fn eof(line: usize) -> Self {
        Self::new(TokenKind::Eof, Value::Null, "", line)
    }

    /// Rendering used by "unexpected token" messages.
    pub fn describe(&self) -> String {
        match self.kind {
            TokenKind::Eof => "end of file".to_string(),
            kind => match kind.name() {
                Some(name) => format!("'{}' ({})", self.text, name),
                None => format!("'{}'", self.text),
            },
        }
    }
}
