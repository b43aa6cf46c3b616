use std::collections::VecDeque;

use log::trace;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::casting::{to_bool, to_number};
use crate::errors::{Location, NaclError, Result};
use crate::token::{Token, TokenKind};
use crate::types::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Initial,
    InString,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Skip,
    BlockComment,
    OpenString,
    Heredoc,
    Bool,
    Null,
    Num,
    Name,
    Var,
    Punct,
    Unexpected,
    Text,
    Escape,
    EncapsedVar,
    Dollar,
    CloseString,
}

struct Rule {
    pattern: Regex,
    action: Action,
    /// Reject the match when it is directly followed by a word character.
    word: bool,
}

fn rule(pattern: &str, action: Action, word: bool) -> Rule {
    let pattern = Regex::new(&format!("^(?:{pattern})")).expect("lexer pattern is valid");
    Rule { pattern, action, word }
}

// Order matters: the first rule that matches at the cursor wins.
static INITIAL_RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    vec![
        rule(r"[ \t\n\r]+", Action::Skip, false),
        rule(r"(?://|#)[^\n]*", Action::Skip, false),
        rule(r"/\*", Action::BlockComment, false),
        rule(r#"""#, Action::OpenString, false),
        rule(r"<<<([A-Za-z0-9_]+)\r?\n", Action::Heredoc, false),
        rule(r"(?i:true|false|yes|no|on|off)", Action::Bool, true),
        rule(r"(?i:null)", Action::Null, true),
        rule(
            r"(?i:(?:[0-9]*\.?[0-9]+|[0-9]+\.)(?:e[-+]?[0-9]+)?(?:ms|min|[kmg]b?|[shdwy])?)",
            Action::Num,
            true,
        ),
        rule(r"[A-Za-z0-9_]+", Action::Name, false),
        rule(r"\$\{([^}]+)\}", Action::Var, false),
        rule(r"<<|>>|[\[\]=:{};,.()+\-*/%|&^]", Action::Punct, false),
        rule(r"(?s).", Action::Unexpected, false),
    ]
});

static STRING_RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    vec![
        rule(r#"[^\\"$]+"#, Action::Text, false),
        rule(r"(?s)\\(.)", Action::Escape, false),
        rule(r"\$\{([^}]+)\}", Action::EncapsedVar, false),
        rule(r#"""#, Action::CloseString, false),
        rule(r"\$", Action::Dollar, false),
    ]
});

/// Saved state of an outer buffer while a nested one is being read.
#[derive(Debug)]
struct Frame {
    content: String,
    offset: usize,
    line: usize,
    filename: String,
    state: State,
    buffer: String,
    pending: VecDeque<Token>,
}

/// Stateful tokenizer over a stack of source buffers.
#[derive(Debug)]
pub struct Lexer {
    content: String,
    offset: usize,
    line: usize,
    filename: String,
    state: State,
    buffer: String,
    pending: VecDeque<Token>,
    stack: Vec<Frame>,
    active: bool,
}

impl Default for Lexer {
    fn default() -> Self {
        Self::new()
    }
}

impl Lexer {
    pub fn new() -> Self {
        Self {
            content: String::new(),
            offset: 0,
            line: 1,
            filename: String::new(),
            state: State::Initial,
            buffer: String::new(),
            pending: VecDeque::new(),
            stack: Vec::new(),
            active: false,
        }
    }

    /// Starts reading `content`. The buffer being read, if any, is saved and
    /// comes back on the matching [`Lexer::pop`].
    pub fn push(&mut self, content: impl Into<String>, filename: impl Into<String>) {
        if self.active {
            trace!("Lexer::push saving {}:{}", self.filename, self.line);
            self.stack.push(Frame {
                content: std::mem::take(&mut self.content),
                offset: self.offset,
                line: self.line,
                filename: std::mem::take(&mut self.filename),
                state: self.state,
                buffer: std::mem::take(&mut self.buffer),
                pending: std::mem::take(&mut self.pending),
            });
        }

        self.content = content.into();
        self.filename = filename.into();
        self.offset = 0;
        self.line = 1;
        self.state = State::Initial;
        self.active = true;
    }

    /// Restores the previously saved buffer. Returns false when there is none.
    pub fn pop(&mut self) -> bool {
        let Some(frame) = self.stack.pop() else {
            return false;
        };

        self.content = frame.content;
        self.offset = frame.offset;
        self.line = frame.line;
        self.filename = frame.filename;
        self.state = frame.state;
        self.buffer = frame.buffer;
        self.pending = frame.pending;
        trace!("Lexer::pop restored {}:{}", self.filename, self.line);
        true
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn location(&self) -> Location {
        Location::new(self.filename.clone(), self.line)
    }

    pub fn next_token(&mut self) -> Result<Token> {
        if let Some(token) = self.pending.pop_front() {
            return Ok(token);
        }

        loop {
            if self.offset >= self.content.len() {
                return match self.state {
                    State::Initial => Ok(Token::eof(self.line)),
                    State::InString => Err(self.error("Unterminated string")),
                };
            }

            let rules: &[Rule] = match self.state {
                State::Initial => &INITIAL_RULES,
                State::InString => &STRING_RULES,
            };

            let rest = &self.content[self.offset..];
            let mut matched = None;
            for rule in rules {
                let Some(captures) = rule.pattern.captures(rest) else {
                    continue;
                };
                let whole = captures.get(0).map_or("", |m| m.as_str());
                if rule.word && rest[whole.len()..].starts_with(is_word_char) {
                    continue;
                }
                let group = captures.get(1).map(|m| m.as_str().to_string());
                matched = Some((rule.action, whole.to_string(), group));
                break;
            }

            // Only reachable inside a string, the initial rules end with a catch-all
            let Some((action, text, group)) = matched else {
                return Err(self.error("Unterminated string"));
            };

            let start_line = self.line;
            self.offset += text.len();
            self.line += text.matches('\n').count();

            if let Some(token) = self.apply(action, text, group, start_line)? {
                trace!("Lexer::next_token {:?} {:?} at {}:{}", token.kind, token.text, self.filename, token.line);
                return Ok(token);
            }
        }
    }

    fn apply(&mut self, action: Action, text: String, group: Option<String>, line: usize) -> Result<Option<Token>> {
        let token = match action {
            Action::Skip => None,
            Action::BlockComment => {
                self.skip_block_comment()?;
                None
            }
            Action::OpenString => {
                self.state = State::InString;
                self.buffer.clear();
                None
            }
            Action::Heredoc => {
                let tag = group.unwrap_or_default();
                let body = self.read_heredoc(&tag)?;
                Some(Token::new(TokenKind::EndStr, Value::String(body.clone()), body, line))
            }
            Action::Bool => Some(Token::new(TokenKind::Bool, Value::Boolean(to_bool(&text)), text, line)),
            Action::Null => Some(Token::new(TokenKind::Null, Value::Null, text, line)),
            Action::Num => Some(Token::new(TokenKind::Num, Value::Number(to_number(&text)), text, line)),
            Action::Name => Some(Token::new(TokenKind::Name, Value::String(text.clone()), text, line)),
            Action::Var => {
                let name = group.unwrap_or_default();
                Some(Token::new(TokenKind::Var, Value::String(name), text, line))
            }
            Action::Punct => match TokenKind::from_punct(&text) {
                Some(kind) => Some(Token::new(kind, Value::Null, text, line)),
                None => return Err(self.error(format!("Unexpected char '{}'", text))),
            },
            Action::Unexpected => return Err(self.error(format!("Unexpected char '{}'", text))),
            Action::Text | Action::Dollar => {
                self.buffer.push_str(&text);
                None
            }
            Action::Escape => {
                let escaped = group.and_then(|g| g.chars().next()).unwrap_or('\\');
                self.unescape(escaped);
                None
            }
            Action::EncapsedVar => {
                let name = group.unwrap_or_default();
                let var = Token::new(TokenKind::EncapsedVar, Value::String(name), text, line);
                if self.buffer.is_empty() {
                    Some(var)
                } else {
                    let fragment = std::mem::take(&mut self.buffer);
                    self.pending.push_back(var);
                    Some(Token::new(TokenKind::String, Value::String(fragment.clone()), fragment, line))
                }
            }
            Action::CloseString => {
                self.state = State::Initial;
                let body = std::mem::take(&mut self.buffer);
                Some(Token::new(TokenKind::EndStr, Value::String(body.clone()), body, line))
            }
        };
        Ok(token)
    }

    fn skip_block_comment(&mut self) -> Result<()> {
        match self.content[self.offset..].find("*/") {
            Some(end) => {
                let consumed = &self.content[self.offset..self.offset + end + 2];
                self.line += consumed.matches('\n').count();
                self.offset += end + 2;
                Ok(())
            }
            None => {
                self.line += self.content[self.offset..].matches('\n').count();
                self.offset = self.content.len();
                Err(self.error("Unterminated multiline comment"))
            }
        }
    }

    /// Reads a heredoc body up to a line starting with `tag`. The opening
    /// line break is already consumed, so the search starts one byte earlier
    /// to allow an empty body.
    fn read_heredoc(&mut self, tag: &str) -> Result<String> {
        let needle = format!("\n{tag}");
        let search_from = self.offset - 1;
        let mut cursor = search_from;

        while let Some(found) = self.content[cursor..].find(&needle) {
            let at = cursor + found;
            let after = at + needle.len();
            if self.content[after..].starts_with(is_word_char) {
                cursor = at + 1;
                continue;
            }

            let body = if at < self.offset {
                String::new()
            } else {
                let body = self.content[self.offset..at].to_string();
                self.line += body.matches('\n').count() + 1;
                body
            };
            self.offset = after;
            return Ok(body);
        }

        self.line += self.content[self.offset..].matches('\n').count();
        self.offset = self.content.len();
        Err(self.error("Unterminated HEREDOC"))
    }

    fn unescape(&mut self, escaped: char) {
        match escaped {
            'n' => self.buffer.push('\n'),
            't' => self.buffer.push('\t'),
            'r' => self.buffer.push('\r'),
            'b' => self.buffer.push('\u{8}'),
            'f' => self.buffer.push('\u{c}'),
            '\\' | '/' | '"' => self.buffer.push(escaped),
            'u' => match self.read_hex4(self.offset) {
                Some(code) => {
                    self.offset += 4;
                    let decoded = self.decode_utf16(code);
                    self.buffer.push(decoded);
                }
                None => self.buffer.push_str("\\u"),
            },
            other => {
                self.buffer.push('\\');
                self.buffer.push(other);
            }
        }
    }

    /// Combines a high surrogate with a following `\uXXXX` low surrogate.
    fn decode_utf16(&mut self, code: u32) -> char {
        if (0xD800..0xDC00).contains(&code) && self.content[self.offset..].starts_with("\\u") {
            if let Some(low) = self.read_hex4(self.offset + 2) {
                if (0xDC00..0xE000).contains(&low) {
                    self.offset += 6;
                    let combined = 0x10000 + ((code - 0xD800) << 10) + (low - 0xDC00);
                    return char::from_u32(combined).unwrap_or(char::REPLACEMENT_CHARACTER);
                }
            }
        }
        char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER)
    }

    fn read_hex4(&self, at: usize) -> Option<u32> {
        let digits = self.content.get(at..at + 4)?;
        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        u32::from_str_radix(digits, 16).ok()
    }

    fn error(&self, message: impl Into<String>) -> NaclError {
        NaclError::lexing(message, self.location())
    }
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}
