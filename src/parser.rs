use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};

use crate::core::macros::MacroContext;
use crate::core::nodes::operation::{apply, stringify};
use crate::core::nodes::{Document, Item, NodeId, NodeKind, Operator};
use crate::errors::{Diagnostic, Location, NaclError, Result};
use crate::fs::{FileSystem, OsFileSystem};
use crate::lexer::Lexer;
use crate::registry::MacroRegistry;
use crate::token::{Token, TokenKind};
use crate::types::Value;

/// Name given to sources that do not come from a file.
pub const DEFAULT_FILENAME: &str = "nacl string";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserOptions {
    /// Deepest allowed nesting of values, included files counted.
    pub max_depth: usize,
    /// Directory used to resolve relative paths of sources without a file.
    pub base_dir: PathBuf,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            max_depth: 128,
            base_dir: PathBuf::from("."),
        }
    }
}

/// Recursive descent parser turning NACL source into a [`Document`].
///
/// A parser is single use: `parse` and `parse_file` consume it. Macro calls
/// and references are not evaluated here, they become lazy nodes that run
/// when the document is resolved.
pub struct Parser {
    lexer: Lexer,
    token: Token,
    lookahead: Option<Token>,
    registry: Arc<MacroRegistry>,
    file_system: Arc<dyn FileSystem>,
    options: ParserOptions,
    variables: HashMap<String, Item>,
    /// File behind each source being read, `None` for plain strings.
    files: Vec<Option<PathBuf>>,
    document: Document,
    /// Container whose value is being parsed. New objects and arrays are
    /// attached to it right away so references resolved during parsing can
    /// walk upwards.
    container: Option<NodeId>,
    depth: usize,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new(Arc::new(MacroRegistry::with_builtins()), Arc::new(OsFileSystem), ParserOptions::default())
    }
}

impl Parser {
    pub fn new(registry: Arc<MacroRegistry>, file_system: Arc<dyn FileSystem>, options: ParserOptions) -> Self {
        Self {
            lexer: Lexer::new(),
            token: Token::eof(1),
            lookahead: None,
            registry,
            file_system,
            options,
            variables: HashMap::new(),
            files: Vec::new(),
            document: Document::new(),
            container: None,
            depth: 0,
        }
    }

    /// Defines `${name}` before parsing. Assignments in the source override it.
    pub fn set_variable(&mut self, name: &str, value: Value) -> &mut Self {
        let item = self.document.adopt(value);
        self.variables.insert(name.to_string(), item);
        self
    }

    pub fn parse(self, text: &str, filename: &str) -> Result<Document> {
        self.parse_source(text, filename, None)
    }

    pub fn parse_file(self, path: &Path) -> Result<Document> {
        if !self.file_system.exists(path) {
            return Err(NaclError::FileNotFound(path.display().to_string()));
        }
        if !self.file_system.is_file(path) {
            return Err(NaclError::NotAFile(path.display().to_string()));
        }
        let content = self
            .file_system
            .read(path)
            .map_err(|err| NaclError::NotReadable(format!("{}: {}", path.display(), err)))?;

        let filename = path.to_string_lossy().into_owned();
        self.parse_source(&content, &filename, Some(path.to_path_buf()))
    }

    fn parse_source(mut self, text: &str, filename: &str, file: Option<PathBuf>) -> Result<Document> {
        debug!("Parsing {}", filename);
        self.lexer.push(text, filename);
        self.files.push(file);
        self.next_token()?;

        let root = self.parse_document()?;
        self.consume(TokenKind::Eof)?;

        self.document.set_root(root);
        Ok(self.document)
    }

    // --- Token handling ---

    fn next_token(&mut self) -> Result<()> {
        self.token = match self.lookahead.take() {
            Some(token) => token,
            None => self.lexer.next_token()?,
        };
        trace!("Parser::next_token {:?}", self.token.kind);
        Ok(())
    }

    fn peek_kind(&mut self) -> Result<TokenKind> {
        let token = match self.lookahead.take() {
            Some(token) => token,
            None => self.lexer.next_token()?,
        };
        let kind = token.kind;
        self.lookahead = Some(token);
        Ok(kind)
    }

    fn consume(&mut self, kind: TokenKind) -> Result<()> {
        if self.token.kind != kind {
            return Err(self.unexpected(&[kind]));
        }
        self.next_token()
    }

    fn consume_optional(&mut self, kind: TokenKind) -> Result<bool> {
        if self.token.kind != kind {
            return Ok(false);
        }
        self.next_token()?;
        Ok(true)
    }

    /// Consumes a `;` or `,` if there is one.
    fn consume_separator(&mut self) -> Result<bool> {
        Ok(self.consume_optional(TokenKind::Semicolon)? || self.consume_optional(TokenKind::Comma)?)
    }

    fn location(&self) -> Location {
        Location::new(self.lexer.filename(), self.token.line)
    }

    fn unexpected(&self, expected: &[TokenKind]) -> NaclError {
        let mut message = format!("Syntax error, unexpected {}", self.token.describe());
        if !expected.is_empty() {
            let names: Vec<String> = expected.iter().map(|kind| format!("'{}'", kind.literal())).collect();
            message.push_str(", expected ");
            message.push_str(&names.join(" or "));
        }
        NaclError::parsing(message, self.location())
    }

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > self.options.max_depth {
            return Err(NaclError::parsing(
                format!("Maximum nesting depth of {} exceeded", self.options.max_depth),
                self.location(),
            ));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Runs `parse` with `container` as the enclosing container.
    fn within<T>(&mut self, container: Option<NodeId>, parse: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let outer = std::mem::replace(&mut self.container, container);
        let result = parse(self);
        self.container = outer;
        result
    }

    fn new_object(&mut self) -> NodeId {
        let object = self.document.new_object();
        self.attach_to_container(object);
        object
    }

    fn new_array(&mut self) -> NodeId {
        let array = self.document.new_array();
        self.attach_to_container(array);
        array
    }

    fn attach_to_container(&mut self, id: NodeId) {
        if let Some(container) = self.container {
            self.document.set_parent(&Item::Node(id), container);
        }
    }

    /// Directory against which relative paths of the current source resolve.
    fn current_dir(&self) -> PathBuf {
        match self.files.last() {
            Some(Some(file)) => match file.parent() {
                Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
                _ => self.options.base_dir.clone(),
            },
            _ => self.options.base_dir.clone(),
        }
    }

    // --- Documents and objects ---

    fn parse_document(&mut self) -> Result<Item> {
        while self.token.kind == TokenKind::Var && matches!(self.peek_kind()?, TokenKind::Equals | TokenKind::Colon) {
            self.parse_variable_assignment()?;
            self.consume_separator()?;
        }

        match self.token.kind {
            TokenKind::Eof => Ok(Item::Node(self.new_object())),
            TokenKind::Dot => self.parse_root_macro(),
            kind if kind.starts_string() => self.parse_root_string(),
            _ => {
                let (item, _) = self.parse_value()?;
                self.consume_optional(TokenKind::Semicolon)?;
                Ok(item)
            }
        }
    }

    /// A document may be a lone string, otherwise the string is the first key.
    fn parse_root_string(&mut self) -> Result<Item> {
        let string = self.parse_string()?;
        let alone = match self.token.kind {
            TokenKind::Eof => true,
            TokenKind::Semicolon => self.peek_kind()? == TokenKind::Eof,
            _ => false,
        };
        if alone {
            self.consume_optional(TokenKind::Semicolon)?;
            return Ok(string);
        }

        let object = self.new_object();
        let key = self.resolve_key(string)?;
        let collection = self.parse_key_value(object, key)?;
        if self.consume_separator()? || collection {
            return Ok(Item::Node(self.parse_inner_object(object)?));
        }
        Ok(Item::Node(object))
    }

    /// A leading macro either returns an object, merged with the entries that
    /// follow, or is the whole document.
    fn parse_root_macro(&mut self) -> Result<Item> {
        self.consume(TokenKind::Dot)?;
        let item = self.parse_macro()?;
        match self.mergeable_object(&item)? {
            Some(object) => {
                self.consume_separator()?;
                Ok(Item::Node(self.parse_inner_object(object)?))
            }
            None => {
                self.consume_optional(TokenKind::Semicolon)?;
                Ok(item)
            }
        }
    }

    fn parse_object(&mut self) -> Result<NodeId> {
        self.consume(TokenKind::LeftBrace)?;
        let object = self.new_object();
        let object = self.parse_inner_object(object)?;
        self.consume(TokenKind::RightBrace)?;
        Ok(object)
    }

    /// Parses entries into `object` until a token that cannot start one. Two
    /// entries need a separator unless the first value was a collection.
    fn parse_inner_object(&mut self, mut object: NodeId) -> Result<NodeId> {
        loop {
            let proceed = match self.token.kind {
                TokenKind::Var => {
                    self.parse_variable_assignment()?;
                    self.consume_separator()?
                }
                kind if kind.starts_string() => {
                    let key = self.parse_key()?;
                    let collection = self.parse_key_value(object, key)?;
                    self.consume_separator()? || collection
                }
                TokenKind::Dot => {
                    object = self.parse_macro_entry(object)?;
                    self.consume_separator()?;
                    true
                }
                _ => false,
            };
            if !proceed {
                return Ok(object);
            }
        }
    }

    fn parse_key(&mut self) -> Result<String> {
        let key = self.parse_string()?;
        self.resolve_key(key)
    }

    fn resolve_key(&mut self, key: Item) -> Result<String> {
        let location = self.location();
        let value = self.document.resolve_item(&key)?;
        stringify(&value).map_err(|message| NaclError::parsing(message, location))
    }

    /// Value of `key`, after an optional `:` or `=`. Returns whether the value
    /// was a collection.
    fn parse_key_value(&mut self, object: NodeId, key: String) -> Result<bool> {
        if !self.consume_optional(TokenKind::Colon)? {
            self.consume_optional(TokenKind::Equals)?;
        }
        let (item, collection) = self.within(Some(object), Self::parse_value)?;
        self.document.assign(object, key, item);
        Ok(collection)
    }

    /// Macro written in place of an entry; its object is merged into `object`.
    fn parse_macro_entry(&mut self, object: NodeId) -> Result<NodeId> {
        let location = self.location();
        self.consume(TokenKind::Dot)?;
        let item = self.within(Some(object), Self::parse_macro)?;
        self.document.set_parent(&item, object);
        match self.mergeable_object(&item)? {
            Some(incoming) => {
                let merged = self.document.merge(object, incoming);
                if let Some(parent) = self.document.parent(object).filter(|_| merged != object) {
                    self.document.set_parent(&Item::Node(merged), parent);
                }
                Ok(merged)
            }
            None => Err(NaclError::parsing("Macro without assignation key must return an object.", location)),
        }
    }

    /// Object node for a macro result that is an object. The call is resolved
    /// now since its shape decides how parsing goes on.
    fn mergeable_object(&mut self, item: &Item) -> Result<Option<NodeId>> {
        let id = match item {
            Item::Native(Value::Map(map)) => return Ok(Some(self.document.object_from_map(map.clone()))),
            Item::Native(_) => return Ok(None),
            Item::Node(id) => *id,
        };

        match self.document.node(id).kind() {
            NodeKind::Object(_) => Ok(Some(id)),
            NodeKind::Macro(_) | NodeKind::Reference(_) => match self.document.resolve_node(id)? {
                Value::Map(map) => Ok(Some(self.document.object_from_map(map))),
                _ => Ok(None),
            },
            _ => Ok(None),
        }
    }

    fn parse_variable_assignment(&mut self) -> Result<()> {
        let name = self.token.value.as_str().unwrap_or_default().to_string();
        self.next_token()?;
        if !self.consume_optional(TokenKind::Equals)? && !self.consume_optional(TokenKind::Colon)? {
            return Err(self.unexpected(&[TokenKind::Equals, TokenKind::Colon]));
        }

        let (item, _) = self.within(None, Self::parse_value)?;
        debug!("Setting variable '{}'", name);
        self.variables.insert(name, item);
        Ok(())
    }

    // --- Values ---

    /// Parses one value. Returns whether it is a collection, which allows the
    /// next entry to follow without a separator.
    fn parse_value(&mut self) -> Result<(Item, bool)> {
        self.enter()?;
        let value = self.parse_value_inner();
        self.leave();
        value
    }

    fn parse_value_inner(&mut self) -> Result<(Item, bool)> {
        match self.token.kind {
            kind if kind.starts_string() => {
                let string = self.parse_string()?;
                if !self.nests_value() {
                    return Ok((string, false));
                }
                // `a b c` reads as `a { b c }`
                let key = self.resolve_key(string)?;
                let object = self.new_object();
                self.parse_key_value(object, key)?;
                Ok((Item::Node(object), true))
            }
            TokenKind::Bool | TokenKind::Null => {
                let value = self.token.value.clone();
                self.next_token()?;
                Ok((Item::Native(value), false))
            }
            TokenKind::Num | TokenKind::Var | TokenKind::LeftParen | TokenKind::Plus | TokenKind::Minus => {
                let item = self.parse_expression()?;
                let collection = self.document.is_collection(&item);
                Ok((item, collection))
            }
            TokenKind::LeftBrace => Ok((Item::Node(self.parse_object()?), true)),
            TokenKind::LeftBracket => Ok((Item::Node(self.parse_array()?), true)),
            TokenKind::Dot => {
                self.next_token()?;
                Ok((self.parse_macro()?, true))
            }
            _ => Err(self.unexpected(&[])),
        }
    }

    fn nests_value(&self) -> bool {
        matches!(self.token.kind, TokenKind::Colon | TokenKind::Equals) || self.token.kind.starts_value()
    }

    fn parse_array(&mut self) -> Result<NodeId> {
        self.consume(TokenKind::LeftBracket)?;
        let array = self.new_array();
        while self.token.kind != TokenKind::RightBracket {
            let (item, collection) = self.within(Some(array), Self::parse_value)?;
            self.document.push(array, item);
            if !(self.consume_separator()? || collection) {
                break;
            }
        }
        self.consume(TokenKind::RightBracket)?;
        Ok(array)
    }

    /// A bare word, or a quoted string whose interpolated variables are
    /// joined with its text fragments.
    fn parse_string(&mut self) -> Result<Item> {
        if self.token.kind == TokenKind::Name {
            let value = self.token.value.clone();
            self.next_token()?;
            return Ok(Item::Native(value));
        }

        let mut result: Option<Item> = None;
        loop {
            let (part, last) = match self.token.kind {
                TokenKind::String => (Item::Native(self.token.value.clone()), false),
                TokenKind::EndStr => (Item::Native(self.token.value.clone()), true),
                TokenKind::EncapsedVar => {
                    let name = self.token.value.as_str().unwrap_or_default().to_string();
                    (self.variable(&name), false)
                }
                _ => return Err(self.unexpected(&[TokenKind::EndStr])),
            };
            self.next_token()?;

            result = Some(match result {
                Some(prefix) => self.operation(prefix, part, Operator::Concat)?,
                None => part,
            });
            if last {
                break;
            }
        }
        Ok(result.unwrap_or_else(|| Item::Native(Value::String(String::new()))))
    }

    /// Value of `${name}`. Objects and arrays are copied on every read so that
    /// later merges do not leak between uses.
    fn variable(&mut self, name: &str) -> Item {
        match name {
            "__FILE__" => return Item::Native(Value::String(self.lexer.filename().to_string())),
            "__DIR__" => return Item::Native(Value::String(self.current_dir().display().to_string())),
            _ => {}
        }

        match self.variables.get(name).cloned() {
            Some(item) => self.document.copy_containers(&item),
            None => {
                let location = self.location();
                warn!("Undefined variable {} in {}", name, location);
                self.document.warn(Diagnostic {
                    message: format!("Undefined variable {}", name),
                    location,
                });
                Item::Native(Value::String(String::new()))
            }
        }
    }

    // --- Expressions ---

    /// Builds `left operator right`, folding it right away when both sides
    /// are native.
    fn operation(&mut self, left: Item, right: Item, operator: Operator) -> Result<Item> {
        let location = self.location();
        match (left, right) {
            (Item::Native(left), Item::Native(right)) => apply(operator, left, right)
                .map(Item::Native)
                .map_err(|message| NaclError::evaluation(message, location)),
            (left, right) => Ok(Item::Node(self.document.new_operation(left, right, operator, location))),
        }
    }

    fn parse_expression(&mut self) -> Result<Item> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Item> {
        let mut left = self.parse_and()?;
        while self.consume_optional(TokenKind::Pipe)? {
            let right = self.parse_and()?;
            left = self.operation(left, right, Operator::BitOr)?;
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Item> {
        let mut left = self.parse_shift()?;
        while self.consume_optional(TokenKind::Ampersand)? {
            let right = self.parse_shift()?;
            left = self.operation(left, right, Operator::BitAnd)?;
        }
        Ok(left)
    }

    fn parse_shift(&mut self) -> Result<Item> {
        let mut left = self.parse_additive()?;
        loop {
            let operator = match self.token.kind {
                TokenKind::ShiftLeft => Operator::ShiftLeft,
                TokenKind::ShiftRight => Operator::ShiftRight,
                _ => return Ok(left),
            };
            self.next_token()?;
            let right = self.parse_additive()?;
            left = self.operation(left, right, operator)?;
        }
    }

    fn parse_additive(&mut self) -> Result<Item> {
        let mut left = self.parse_term()?;
        loop {
            let operator = match self.token.kind {
                TokenKind::Plus => Operator::Add,
                TokenKind::Minus => Operator::Sub,
                _ => return Ok(left),
            };
            self.next_token()?;
            let right = self.parse_term()?;
            left = self.operation(left, right, operator)?;
        }
    }

    fn parse_term(&mut self) -> Result<Item> {
        let mut left = self.parse_factor()?;
        loop {
            let operator = match self.token.kind {
                TokenKind::Star => Operator::Mul,
                TokenKind::Slash => Operator::Div,
                TokenKind::Percent => Operator::Mod,
                _ => return Ok(left),
            };
            self.next_token()?;
            let right = self.parse_factor()?;
            left = self.operation(left, right, operator)?;
        }
    }

    /// `^` binds tighter than the other operators and groups to the right.
    fn parse_factor(&mut self) -> Result<Item> {
        let base = self.parse_unary()?;
        if !self.consume_optional(TokenKind::Caret)? {
            return Ok(base);
        }
        self.enter()?;
        let exponent = self.parse_factor();
        self.leave();
        self.operation(base, exponent?, Operator::Pow)
    }

    fn parse_unary(&mut self) -> Result<Item> {
        match self.token.kind {
            TokenKind::LeftParen => {
                self.next_token()?;
                self.enter()?;
                let inner = self.parse_expression();
                self.leave();
                let inner = inner?;
                self.consume(TokenKind::RightParen)?;
                Ok(inner)
            }
            TokenKind::Minus | TokenKind::Plus => {
                let sign = if self.token.kind == TokenKind::Minus { -1 } else { 1 };
                self.next_token()?;
                self.enter()?;
                let operand = self.parse_factor();
                self.leave();
                self.operation(Item::Native(Value::from(sign)), operand?, Operator::Mul)
            }
            TokenKind::Num => {
                let value = self.token.value.clone();
                self.next_token()?;
                Ok(Item::Native(value))
            }
            TokenKind::Var => {
                let name = self.token.value.as_str().unwrap_or_default().to_string();
                self.next_token()?;
                Ok(self.variable(&name))
            }
            _ => Err(self.unexpected(&[])),
        }
    }

    // --- Macros ---

    /// Parses `name [(options)] parameter`, the leading `.` already consumed.
    fn parse_macro(&mut self) -> Result<Item> {
        if self.token.kind != TokenKind::Name {
            return Err(self.unexpected(&[TokenKind::Name]));
        }
        let name = self.token.text.clone();
        let location = self.location();
        self.next_token()?;

        let options = self.new_object();
        let options = if self.consume_optional(TokenKind::LeftParen)? {
            let options = self.parse_inner_object(options)?;
            self.consume(TokenKind::RightParen)?;
            options
        } else {
            options
        };
        let (param, _) = self.parse_value()?;

        match name.as_str() {
            "include" => self.include(param, options, location),
            "ref" => Ok(Item::Node(self.document.new_reference(param, options, location))),
            _ => {
                let Some(callback) = self.registry.lookup(&name)? else {
                    return Err(NaclError::parsing(format!("Unknown macro '{}'", name), location));
                };
                debug!("Parsed call to macro '{}' in {}", name, location);
                let context = MacroContext {
                    name,
                    location,
                    base_dir: self.current_dir(),
                    file_system: self.file_system.clone(),
                };
                Ok(Item::Node(self.document.new_macro(callback, param, options, context)))
            }
        }
    }

    /// `.include` runs while parsing: each file is parsed into this document
    /// and the results are merged, or keyed by file name with `filenameKey`.
    fn include(&mut self, param: Item, options: NodeId, location: Location) -> Result<Item> {
        let target = match self.document.resolve_item(&param)? {
            Value::String(target) => target,
            other => {
                return Err(NaclError::parsing(
                    format!("Macro 'include' expects parameter to be string, {} given.", other.type_name()),
                    location,
                ));
            }
        };
        let options = self.document.resolve_node(options)?;
        let flag = |name: &str, default: bool| options.get(name).map(Value::is_truthy).unwrap_or(default);
        let (required, glob, filename_key) = (flag("required", true), flag("glob", false), flag("filenameKey", false));

        let base_dir = self.current_dir();
        let files: Vec<PathBuf> = if glob {
            self.file_system.glob(&target, &base_dir)
        } else {
            self.file_system.resolve_path(&target, &base_dir).into_iter().collect()
        };

        if files.is_empty() {
            if required {
                return Err(NaclError::parsing(format!("Unable to include file '{}'", target), location));
            }
            debug!("Skipping optional include '{}'", target);
            return Ok(Item::Node(self.new_object()));
        }

        if filename_key {
            let keyed = self.new_object();
            for file in &files {
                let item = self.parse_included(file, &location)?;
                let key = file
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_default();
                self.document.assign(keyed, key, item);
            }
            return Ok(Item::Node(keyed));
        }

        let mut result = Item::Node(self.new_object());
        for file in &files {
            let item = self.parse_included(file, &location)?;
            let objects = match (&result, &item) {
                (Item::Node(current), Item::Node(incoming))
                    if self.document.object(*current).is_some() && self.document.object(*incoming).is_some() =>
                {
                    Some((*current, *incoming))
                }
                _ => None,
            };
            result = match objects {
                Some((current, incoming)) => Item::Node(self.document.merge(current, incoming)),
                None => item,
            };
        }
        Ok(result)
    }

    fn parse_included(&mut self, file: &Path, location: &Location) -> Result<Item> {
        let content = self.file_system.read(file).map_err(|err| {
            NaclError::parsing(format!("Unable to include file '{}': {}", file.display(), err), location.clone())
        })?;
        debug!("Including {}", file.display());

        let token = std::mem::replace(&mut self.token, Token::eof(0));
        let lookahead = self.lookahead.take();
        self.lexer.push(content, file.to_string_lossy());
        self.files.push(Some(file.to_path_buf()));

        let result = self.parse_included_document();

        self.files.pop();
        self.lexer.pop();
        self.token = token;
        self.lookahead = lookahead;
        result
    }

    fn parse_included_document(&mut self) -> Result<Item> {
        self.next_token()?;
        self.enter()?;
        let item = self.parse_document();
        self.leave();
        let item = item?;
        self.consume(TokenKind::Eof)?;
        Ok(item)
    }
}
