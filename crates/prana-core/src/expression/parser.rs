//! Lexer and recursive-descent parser for the `{{ }}` / `{% %}` template
//! grammar (§4.2). Grounded on the teacher's hand-rolled
//! `expression/parser.rs` (`Lexer`/`Token`/`Expr` split, `parse_template`'s
//! "bare expr when the template is a single block" behavior), but with the
//! spec's fixed precedence and operator set rather than the teacher's
//! JS-like grammar.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Var(String),   // $ident
    Ident(String), // bare identifier (loop-bound locals)
    Dot,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Comma,
    Colon,
    Pipe,
    Plus,
    Minus,
    Star,
    Slash,
    OrOr,
    AndAnd,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Bang,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError(pub String);

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "parse error: {}", self.0)
    }
}

impl std::error::Error for ParseError {}

struct Lexer<'a> {
    chars: std::str::CharIndices<'a>,
    peeked: Option<(usize, char)>,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            chars: src.char_indices(),
            peeked: None,
        }
    }

    fn bump(&mut self) -> Option<(usize, char)> {
        if let Some(p) = self.peeked.take() {
            return Some(p);
        }
        self.chars.next()
    }

    fn peek(&mut self) -> Option<(usize, char)> {
        if self.peeked.is_none() {
            self.peeked = self.chars.next();
        }
        self.peeked
    }

    fn tokenize(mut self) -> Result<Vec<Token>, ParseError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace();
            let Some((start, c)) = self.peek() else {
                break;
            };
            match c {
                '0'..='9' => tokens.push(self.lex_number()),
                '"' | '\'' => tokens.push(self.lex_string(c)?),
                '$' => {
                    self.bump();
                    let ident = self.lex_ident();
                    if ident.is_empty() {
                        return Err(ParseError("expected identifier after '$'".to_string()));
                    }
                    tokens.push(Token::Var(ident));
                }
                c if is_ident_start(c) => {
                    let ident = self.lex_ident();
                    tokens.push(match ident.as_str() {
                        "true" => Token::Bool(true),
                        "false" => Token::Bool(false),
                        _ => Token::Ident(ident),
                    });
                }
                '.' => {
                    self.bump();
                    tokens.push(Token::Dot);
                }
                '[' => {
                    self.bump();
                    tokens.push(Token::LBracket);
                }
                ']' => {
                    self.bump();
                    tokens.push(Token::RBracket);
                }
                '(' => {
                    self.bump();
                    tokens.push(Token::LParen);
                }
                ')' => {
                    self.bump();
                    tokens.push(Token::RParen);
                }
                ',' => {
                    self.bump();
                    tokens.push(Token::Comma);
                }
                ':' => {
                    self.bump();
                    tokens.push(Token::Colon);
                }
                '+' => {
                    self.bump();
                    tokens.push(Token::Plus);
                }
                '-' => {
                    self.bump();
                    tokens.push(Token::Minus);
                }
                '*' => {
                    self.bump();
                    tokens.push(Token::Star);
                }
                '/' => {
                    self.bump();
                    tokens.push(Token::Slash);
                }
                '|' => {
                    self.bump();
                    if self.peek().map(|(_, c)| c) == Some('|') {
                        self.bump();
                        tokens.push(Token::OrOr);
                    } else {
                        tokens.push(Token::Pipe);
                    }
                }
                '&' => {
                    self.bump();
                    if self.peek().map(|(_, c)| c) == Some('&') {
                        self.bump();
                        tokens.push(Token::AndAnd);
                    } else {
                        return Err(ParseError("unexpected '&'".to_string()));
                    }
                }
                '=' => {
                    self.bump();
                    if self.peek().map(|(_, c)| c) == Some('=') {
                        self.bump();
                        tokens.push(Token::EqEq);
                    } else {
                        return Err(ParseError("unexpected '='".to_string()));
                    }
                }
                '!' => {
                    self.bump();
                    if self.peek().map(|(_, c)| c) == Some('=') {
                        self.bump();
                        tokens.push(Token::NotEq);
                    } else {
                        tokens.push(Token::Bang);
                    }
                }
                '<' => {
                    self.bump();
                    if self.peek().map(|(_, c)| c) == Some('=') {
                        self.bump();
                        tokens.push(Token::Le);
                    } else {
                        tokens.push(Token::Lt);
                    }
                }
                '>' => {
                    self.bump();
                    if self.peek().map(|(_, c)| c) == Some('=') {
                        self.bump();
                        tokens.push(Token::Ge);
                    } else {
                        tokens.push(Token::Gt);
                    }
                }
                other => {
                    return Err(ParseError(format!(
                        "unexpected character '{other}' at byte {start}"
                    )))
                }
            }
        }
        tokens.push(Token::Eof);
        Ok(tokens)
    }

    fn skip_whitespace(&mut self) {
        while let Some((_, c)) = self.peek() {
            if c.is_whitespace() {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn lex_ident(&mut self) -> String {
        let mut s = String::new();
        while let Some((_, c)) = self.peek() {
            if is_ident_continue(c) {
                s.push(c);
                self.bump();
            } else {
                break;
            }
        }
        s
    }

    fn lex_number(&mut self) -> Token {
        let mut s = String::new();
        let mut is_float = false;
        while let Some((_, c)) = self.peek() {
            if c.is_ascii_digit() {
                s.push(c);
                self.bump();
            } else if c == '.' && !is_float {
                is_float = true;
                s.push(c);
                self.bump();
            } else {
                break;
            }
        }
        if is_float {
            Token::Float(s.parse().unwrap_or(0.0))
        } else {
            Token::Int(s.parse().unwrap_or(0))
        }
    }

    fn lex_string(&mut self, quote: char) -> Result<Token, ParseError> {
        self.bump();
        let mut s = String::new();
        loop {
            match self.bump() {
                Some((_, c)) if c == quote => return Ok(Token::Str(s)),
                Some((_, '\\')) => {
                    if let Some((_, c)) = self.bump() {
                        s.push(c);
                    }
                }
                Some((_, c)) => s.push(c),
                None => return Err(ParseError(format!("unterminated string literal: {s}"))),
            }
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone)]
pub enum PathSegment {
    Dot(String),
    Index(i64),
    Key(String),
    Atom(String),
}

#[derive(Debug, Clone)]
pub struct VarPath {
    pub dollar: bool,
    pub root: String,
    pub segments: Vec<PathSegment>,
}

#[derive(Debug, Clone)]
pub struct FilterCall {
    pub name: String,
    pub args: Vec<Expr>,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Var(VarPath),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Pipe(Box<Expr>, Vec<FilterCall>),
}

/// `Expr` blocks keep their raw `{{ ... }}` text alongside the parse
/// attempt: graceful mode re-emits `raw` verbatim on a parse/eval failure
/// (§4.2), so parsing must not hard-fail the whole template here.
#[derive(Debug, Clone)]
pub enum TemplateNode {
    Literal(String),
    Expr {
        raw: String,
        parsed: Result<Expr, ParseError>,
    },
    If { cond: Expr, body: Vec<TemplateNode> },
    For { ident: String, iter: Expr, body: Vec<TemplateNode> },
}

/// Default max expression recursion depth (§4.2 security limits).
pub const DEFAULT_MAX_EXPR_RECURSION: u32 = 100;
/// Default max control-flow nesting depth (§4.2 security limits).
pub const DEFAULT_MAX_CONTROL_NESTING: u32 = 50;

struct ExprParser {
    tokens: Vec<Token>,
    pos: usize,
    depth: u32,
    max_depth: u32,
}

impl ExprParser {
    fn new(tokens: Vec<Token>, max_depth: u32) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
            max_depth,
        }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn bump(&mut self) -> Token {
        let t = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, expected: &Token) -> Result<(), ParseError> {
        if self.peek() == expected {
            self.bump();
            Ok(())
        } else {
            Err(ParseError(format!(
                "expected {expected:?}, found {:?}",
                self.peek()
            )))
        }
    }

    fn enter(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(ParseError("expression recursion depth exceeded".to_string()));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        self.enter()?;
        let mut lhs = self.parse_and()?;
        while matches!(self.peek(), Token::OrOr) {
            self.bump();
            let rhs = self.parse_and()?;
            lhs = Expr::Binary(BinaryOp::Or, Box::new(lhs), Box::new(rhs));
        }
        self.leave();
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        self.enter()?;
        let mut lhs = self.parse_cmp()?;
        while matches!(self.peek(), Token::AndAnd) {
            self.bump();
            let rhs = self.parse_cmp()?;
            lhs = Expr::Binary(BinaryOp::And, Box::new(lhs), Box::new(rhs));
        }
        self.leave();
        Ok(lhs)
    }

    fn parse_cmp(&mut self) -> Result<Expr, ParseError> {
        self.enter()?;
        let mut lhs = self.parse_add()?;
        loop {
            let op = match self.peek() {
                Token::EqEq => BinaryOp::Eq,
                Token::NotEq => BinaryOp::Ne,
                Token::Lt => BinaryOp::Lt,
                Token::Le => BinaryOp::Le,
                Token::Gt => BinaryOp::Gt,
                Token::Ge => BinaryOp::Ge,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_add()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        self.leave();
        Ok(lhs)
    }

    fn parse_add(&mut self) -> Result<Expr, ParseError> {
        self.enter()?;
        let mut lhs = self.parse_mul()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_mul()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        self.leave();
        Ok(lhs)
    }

    fn parse_mul(&mut self) -> Result<Expr, ParseError> {
        self.enter()?;
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        self.leave();
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        self.enter()?;
        let result = match self.peek() {
            Token::Minus => {
                self.bump();
                let inner = self.parse_unary()?;
                Ok(Expr::Unary(UnaryOp::Neg, Box::new(inner)))
            }
            Token::Bang => {
                self.bump();
                let inner = self.parse_unary()?;
                Ok(Expr::Unary(UnaryOp::Not, Box::new(inner)))
            }
            _ => self.parse_pipe(),
        };
        self.leave();
        result
    }

    fn parse_pipe(&mut self) -> Result<Expr, ParseError> {
        self.enter()?;
        let atomic = self.parse_atomic()?;
        let mut filters = Vec::new();
        while matches!(self.peek(), Token::Pipe) {
            self.bump();
            let name = match self.bump() {
                Token::Ident(name) => name,
                other => return Err(ParseError(format!("expected filter name, found {other:?}"))),
            };
            let mut args = Vec::new();
            if matches!(self.peek(), Token::LParen) {
                self.bump();
                if !matches!(self.peek(), Token::RParen) {
                    args.push(self.parse_expr()?);
                    while matches!(self.peek(), Token::Comma) {
                        self.bump();
                        args.push(self.parse_expr()?);
                    }
                }
                self.expect(&Token::RParen)?;
            }
            filters.push(FilterCall { name, args });
        }
        self.leave();
        if filters.is_empty() {
            Ok(atomic)
        } else {
            Ok(Expr::Pipe(Box::new(atomic), filters))
        }
    }

    fn parse_atomic(&mut self) -> Result<Expr, ParseError> {
        self.enter()?;
        let result = match self.bump() {
            Token::Int(n) => Ok(Expr::Int(n)),
            Token::Float(n) => Ok(Expr::Float(n)),
            Token::Str(s) => Ok(Expr::Str(s)),
            Token::Bool(b) => Ok(Expr::Bool(b)),
            Token::LParen => {
                let inner = self.parse_expr()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Token::Var(root) => Ok(Expr::Var(self.parse_path_tail(true, root)?)),
            Token::Ident(root) => Ok(Expr::Var(self.parse_path_tail(false, root)?)),
            other => Err(ParseError(format!("unexpected token {other:?}"))),
        };
        self.leave();
        result
    }

    fn parse_path_tail(&mut self, dollar: bool, root: String) -> Result<VarPath, ParseError> {
        let mut segments = Vec::new();
        loop {
            match self.peek() {
                Token::Dot => {
                    self.bump();
                    match self.bump() {
                        Token::Ident(name) => segments.push(PathSegment::Dot(name)),
                        other => {
                            return Err(ParseError(format!(
                                "expected identifier after '.', found {other:?}"
                            )))
                        }
                    }
                }
                Token::LBracket => {
                    self.bump();
                    let seg = match self.bump() {
                        Token::Int(i) => PathSegment::Index(i),
                        Token::Str(s) => PathSegment::Key(s),
                        Token::Colon => match self.bump() {
                            Token::Ident(name) => PathSegment::Atom(name),
                            other => {
                                return Err(ParseError(format!(
                                    "expected identifier after ':', found {other:?}"
                                )))
                            }
                        },
                        other => {
                            return Err(ParseError(format!("invalid bracket segment {other:?}")))
                        }
                    };
                    self.expect(&Token::RBracket)?;
                    segments.push(seg);
                }
                _ => break,
            }
        }
        Ok(VarPath {
            dollar,
            root,
            segments,
        })
    }
}

pub fn parse_expression(src: &str) -> Result<Expr, ParseError> {
    parse_expression_with_limit(src, DEFAULT_MAX_EXPR_RECURSION)
}

pub fn parse_expression_with_limit(src: &str, max_recursion: u32) -> Result<Expr, ParseError> {
    let tokens = Lexer::new(src).tokenize()?;
    let mut parser = ExprParser::new(tokens, max_recursion);
    let expr = parser.parse_expr()?;
    if !matches!(parser.peek(), Token::Eof) {
        return Err(ParseError(format!(
            "unexpected trailing tokens starting at {:?}",
            parser.peek()
        )));
    }
    Ok(expr)
}

/// Parse a full template into nodes using the default security limits.
/// Returns the raw node list; the renderer decides whether the template
/// collapses to a single bare expression.
pub fn parse_template(src: &str) -> Result<Vec<TemplateNode>, ParseError> {
    parse_template_with_limits(src, DEFAULT_MAX_CONTROL_NESTING, DEFAULT_MAX_EXPR_RECURSION)
}

pub fn parse_template_with_limits(
    src: &str,
    max_nesting: u32,
    max_recursion: u32,
) -> Result<Vec<TemplateNode>, ParseError> {
    let mut pos = 0;
    parse_nodes(src, &mut pos, 0, &[], max_nesting, max_recursion)
}

/// Parse template nodes until EOF or one of `stop_tags` is found at this
/// nesting level (used by if/for bodies to find their matching end tag).
fn parse_nodes(
    src: &str,
    pos: &mut usize,
    depth: u32,
    stop_tags: &[&str],
    max_nesting: u32,
    max_recursion: u32,
) -> Result<Vec<TemplateNode>, ParseError> {
    if depth > max_nesting {
        return Err(ParseError("control-flow nesting depth exceeded".to_string()));
    }
    let mut nodes = Vec::new();
    let mut literal = String::new();

    while *pos < src.len() {
        if let Some(tag) = peek_control_tag(src, *pos) {
            if stop_tags.contains(&tag.as_str()) {
                break;
            }
        }
        if src[*pos..].starts_with("{{") {
            if !literal.is_empty() {
                nodes.push(TemplateNode::Literal(std::mem::take(&mut literal)));
            }
            let close = src[*pos..]
                .find("}}")
                .map(|p| p + *pos)
                .ok_or_else(|| ParseError("unterminated '{{' block".to_string()))?;
            let expr_src = &src[*pos + 2..close];
            let raw = src[*pos..close + 2].to_string();
            let parsed = parse_expression_with_limit(expr_src.trim(), max_recursion);
            nodes.push(TemplateNode::Expr { raw, parsed });
            *pos = close + 2;
        } else if src[*pos..].starts_with("{%") {
            if !literal.is_empty() {
                nodes.push(TemplateNode::Literal(std::mem::take(&mut literal)));
            }
            let close = src[*pos..]
                .find("%}")
                .map(|p| p + *pos)
                .ok_or_else(|| ParseError("unterminated '{%' block".to_string()))?;
            let tag_src = src[*pos + 2..close].trim();
            *pos = close + 2;

            if let Some(cond_src) = tag_src.strip_prefix("if") {
                let cond = parse_expression_with_limit(cond_src.trim(), max_recursion)?;
                let body = parse_nodes(src, pos, depth + 1, &["endif"], max_nesting, max_recursion)?;
                expect_tag(src, pos, "endif")?;
                nodes.push(TemplateNode::If { cond, body });
            } else if let Some(rest) = tag_src.strip_prefix("for") {
                let rest = rest.trim();
                let (ident, iter_src) = rest
                    .split_once(" in ")
                    .ok_or_else(|| ParseError(format!("malformed for-loop tag: {tag_src}")))?;
                let iter = parse_expression_with_limit(iter_src.trim(), max_recursion)?;
                let body = parse_nodes(src, pos, depth + 1, &["endfor"], max_nesting, max_recursion)?;
                expect_tag(src, pos, "endfor")?;
                nodes.push(TemplateNode::For {
                    ident: ident.trim().to_string(),
                    iter,
                    body,
                });
            } else {
                return Err(ParseError(format!("unknown control tag: {tag_src}")));
            }
        } else {
            let ch = src[*pos..].chars().next().unwrap();
            literal.push(ch);
            *pos += ch.len_utf8();
        }
    }

    if !literal.is_empty() {
        nodes.push(TemplateNode::Literal(literal));
    }
    Ok(nodes)
}

fn peek_control_tag(src: &str, pos: usize) -> Option<String> {
    if !src[pos..].starts_with("{%") {
        return None;
    }
    let close = src[pos..].find("%}")? + pos;
    let tag_src = src[pos + 2..close].trim();
    tag_src.split_whitespace().next().map(str::to_string)
}

fn expect_tag(src: &str, pos: &mut usize, expected: &str) -> Result<(), ParseError> {
    if !src[*pos..].starts_with("{%") {
        return Err(ParseError(format!("expected '{{% {expected} %}}'")));
    }
    let close = src[*pos..]
        .find("%}")
        .map(|p| p + *pos)
        .ok_or_else(|| ParseError("unterminated '{%' block".to_string()))?;
    let tag_src = src[*pos + 2..close].trim();
    if tag_src != expected {
        return Err(ParseError(format!(
            "expected '{{% {expected} %}}', found '{{% {tag_src} %}}'"
        )));
    }
    *pos = close + 2;
    Ok(())
}
