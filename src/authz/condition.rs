//! Matcher expression parser, compiler and evaluator.
//!
//! Supported syntax:
//! - Comparisons: `==`, `!=`
//! - Boolean operators: `&&`, `||`, `!`
//! - Membership: `r.act in ("read", "write")`
//! - Field access: `r.sub`, `p.obj`, `p2.act`
//! - Calls: role functions `g(a, b[, dom])` and the builtins `keyMatch`,
//!   `keyMatch2`, `regexMatch`
//! - Literals: `"strings"`, `'strings'`, `true`, `false`
//! - Parentheses for grouping
//!
//! Text is parsed once into an [`Expr`] tree, then bound against the model into a
//! [`Matcher`] whose field accessors are plain indices.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::authz::errors::{AuthzError, AuthzResult};
use crate::authz::functions::{self, RegexCache};
use crate::authz::model::Model;
use crate::authz::roles::RoleManager;

// ─── AST ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(LitValue),
    Path(Vec<String>),
    Call {
        name: String,
        args: Vec<Expr>,
    },
    BinOp {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    UnaryNot(Box<Expr>),
    In {
        element: Box<Expr>,
        collection: Vec<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinOp {
    Eq,
    Ne,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LitValue {
    Str(String),
    Bool(bool),
}

// ─── Parser ─────────────────────────────────────────────────────────────

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    True,
    False,
    Dot,
    Comma,
    LParen,
    RParen,
    Eq,  // ==
    Ne,  // !=
    And, // &&
    Or,  // ||
    Not, // !
    In,  // in
}

fn tokenize(input: &str) -> AuthzResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            ' ' | '\t' | '\n' | '\r' => {
                i += 1;
            }
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '=' if i + 1 < chars.len() && chars[i + 1] == '=' => {
                tokens.push(Token::Eq);
                i += 2;
            }
            '!' if i + 1 < chars.len() && chars[i + 1] == '=' => {
                tokens.push(Token::Ne);
                i += 2;
            }
            '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '&' if i + 1 < chars.len() && chars[i + 1] == '&' => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if i + 1 < chars.len() && chars[i + 1] == '|' => {
                tokens.push(Token::Or);
                i += 2;
            }
            quote @ ('"' | '\'') => {
                i += 1;
                let mut s = String::new();
                while i < chars.len() && chars[i] != quote {
                    if chars[i] == '\\' && i + 1 < chars.len() {
                        i += 1;
                    }
                    s.push(chars[i]);
                    i += 1;
                }
                if i >= chars.len() {
                    return Err(AuthzError::InvalidMatcher(
                        "unterminated string literal".into(),
                    ));
                }
                tokens.push(Token::Str(s));
                i += 1; // skip closing quote
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                match word.as_str() {
                    "true" => tokens.push(Token::True),
                    "false" => tokens.push(Token::False),
                    "in" => tokens.push(Token::In),
                    _ => tokens.push(Token::Ident(word)),
                }
            }
            c => {
                return Err(AuthzError::InvalidMatcher(format!(
                    "unexpected character `{c}`"
                )));
            }
        }
    }
    Ok(tokens)
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn expect(&mut self, expected: Token, what: &str) -> AuthzResult<()> {
        if self.advance() != Some(expected) {
            return Err(AuthzError::InvalidMatcher(format!("expected {what}")));
        }
        Ok(())
    }

    /// Entry: parse_or
    fn parse_expr(&mut self) -> AuthzResult<Expr> {
        self.parse_or()
    }

    /// or_expr = and_expr ("||" and_expr)*
    fn parse_or(&mut self) -> AuthzResult<Expr> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::BinOp {
                op: BinOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    /// and_expr = comparison ("&&" comparison)*
    fn parse_and(&mut self) -> AuthzResult<Expr> {
        let mut left = self.parse_comparison()?;
        while self.peek() == Some(&Token::And) {
            self.advance();
            let right = self.parse_comparison()?;
            left = Expr::BinOp {
                op: BinOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    /// comparison = unary (("==" | "!=") unary | "in" "(" expr ("," expr)* ")")?
    fn parse_comparison(&mut self) -> AuthzResult<Expr> {
        let left = self.parse_unary()?;
        let op = match self.peek() {
            Some(Token::Eq) => BinOp::Eq,
            Some(Token::Ne) => BinOp::Ne,
            Some(Token::In) => {
                self.advance();
                self.expect(Token::LParen, "`(` after `in`")?;
                let collection = self.parse_list()?;
                return Ok(Expr::In {
                    element: Box::new(left),
                    collection,
                });
            }
            _ => return Ok(left),
        };
        self.advance();
        let right = self.parse_unary()?;
        Ok(Expr::BinOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    /// unary = "!" unary | primary
    fn parse_unary(&mut self) -> AuthzResult<Expr> {
        if self.peek() == Some(&Token::Not) {
            self.advance();
            let expr = self.parse_unary()?;
            return Ok(Expr::UnaryNot(Box::new(expr)));
        }
        self.parse_primary()
    }

    /// primary = literal | ident "(" args ")" | path | "(" expr ")"
    fn parse_primary(&mut self) -> AuthzResult<Expr> {
        match self.peek().cloned() {
            Some(Token::Str(s)) => {
                self.advance();
                Ok(Expr::Literal(LitValue::Str(s)))
            }
            Some(Token::True) => {
                self.advance();
                Ok(Expr::Literal(LitValue::Bool(true)))
            }
            Some(Token::False) => {
                self.advance();
                Ok(Expr::Literal(LitValue::Bool(false)))
            }
            Some(Token::Ident(name)) => {
                self.advance();
                if self.peek() == Some(&Token::LParen) {
                    self.advance();
                    let args = self.parse_list()?;
                    return Ok(Expr::Call { name, args });
                }
                let mut path = vec![name];
                while self.peek() == Some(&Token::Dot) {
                    self.advance();
                    match self.advance() {
                        Some(Token::Ident(seg)) => path.push(seg),
                        _ => {
                            return Err(AuthzError::InvalidMatcher(
                                "expected identifier after `.`".into(),
                            ));
                        }
                    }
                }
                Ok(Expr::Path(path))
            }
            Some(Token::LParen) => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(Token::RParen, "closing parenthesis `)`")?;
                Ok(expr)
            }
            other => Err(AuthzError::InvalidMatcher(format!(
                "unexpected token: {other:?}"
            ))),
        }
    }

    /// Comma-separated expressions up to the closing `)`; the `(` is already consumed.
    fn parse_list(&mut self) -> AuthzResult<Vec<Expr>> {
        let mut items = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.advance();
            return Ok(items);
        }
        loop {
            items.push(self.parse_expr()?);
            match self.advance() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => return Ok(items),
                _ => {
                    return Err(AuthzError::InvalidMatcher(
                        "expected `,` or `)` in argument list".into(),
                    ))
                }
            }
        }
    }
}

/// Parse a matcher expression string into an AST.
pub fn parse_expression(input: &str) -> AuthzResult<Expr> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(AuthzError::InvalidMatcher("empty expression".into()));
    }
    let mut parser = Parser::new(tokens);
    let expr = parser.parse_expr()?;
    if parser.pos < parser.tokens.len() {
        return Err(AuthzError::InvalidMatcher(format!(
            "unexpected trailing token: {:?}",
            parser.tokens[parser.pos]
        )));
    }
    Ok(expr)
}

// ─── Compiler ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
enum Builtin {
    KeyMatch,
    KeyMatch2,
    RegexMatch,
}

impl Builtin {
    fn lookup(name: &str) -> Option<Self> {
        match name {
            "keyMatch" => Some(Self::KeyMatch),
            "keyMatch2" => Some(Self::KeyMatch2),
            "regexMatch" => Some(Self::RegexMatch),
            _ => None,
        }
    }

    fn call(self, a: &str, b: &str, regexes: &RegexCache) -> AuthzResult<bool> {
        match self {
            Builtin::KeyMatch => Ok(functions::key_match(a, b)),
            Builtin::KeyMatch2 => Ok(functions::key_match2(a, b)),
            Builtin::RegexMatch => regexes.is_match(a, b),
        }
    }
}

/// Bound expression: field paths resolved to positions, calls resolved to targets.
#[derive(Debug, Clone)]
enum Node {
    Str(String),
    Bool(bool),
    Request(usize),
    Policy(usize),
    Role { gtype: String, args: Vec<Node> },
    Builtin { func: Builtin, args: [Box<Node>; 2] },
    /// `regexMatch` with a literal pattern, compiled when the matcher is built.
    RegexLiteral { value: Box<Node>, regex: regex::Regex },
    Eq(Box<Node>, Box<Node>),
    Ne(Box<Node>, Box<Node>),
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
    Not(Box<Node>),
    In(Box<Node>, Vec<Node>),
}

/// Compiled matcher for one model.
#[derive(Debug)]
pub struct Matcher {
    root: Node,
    ptype: String,
    regexes: RegexCache,
}

impl Matcher {
    pub fn compile(model: &Model) -> AuthzResult<Self> {
        let expr = parse_expression(&model.matcher)?;

        let mut referenced = Vec::new();
        collect_ptypes(&expr, model, &mut referenced);
        let ptype = match referenced.as_slice() {
            [] => model
                .policies
                .keys()
                .next()
                .cloned()
                .ok_or_else(|| AuthzError::InvalidMatcher("model has no policy type".into()))?,
            [one] => one.clone(),
            many => {
                return Err(AuthzError::InvalidMatcher(format!(
                    "matcher references several policy types: {}",
                    many.join(", ")
                )))
            }
        };

        let binder = Binder {
            model,
            ptype: &ptype,
        };
        let root = binder.bind(&expr)?;
        Ok(Self {
            root,
            ptype,
            regexes: RegexCache::default(),
        })
    }

    /// Policy type whose rules this matcher is evaluated against.
    pub fn ptype(&self) -> &str {
        &self.ptype
    }

    /// Evaluate against one (request, rule) pair.
    pub fn eval(
        &self,
        request: &[String],
        rule: &[String],
        roles: &BTreeMap<String, Arc<RoleManager>>,
    ) -> AuthzResult<bool> {
        let scope = Scope {
            request,
            rule,
            roles,
            regexes: &self.regexes,
        };
        match scope.eval(&self.root)? {
            Value::Bool(b) => Ok(b),
            Value::Str(s) => Err(AuthzError::Eval(format!(
                "matcher must evaluate to a boolean, got string `{s}`"
            ))),
        }
    }
}

fn collect_ptypes(expr: &Expr, model: &Model, out: &mut Vec<String>) {
    match expr {
        Expr::Literal(_) => {}
        Expr::Path(path) => {
            if model.policies.contains_key(&path[0]) && !out.contains(&path[0]) {
                out.push(path[0].clone());
            }
        }
        Expr::Call { args, .. } => args.iter().for_each(|a| collect_ptypes(a, model, out)),
        Expr::BinOp { left, right, .. } => {
            collect_ptypes(left, model, out);
            collect_ptypes(right, model, out);
        }
        Expr::UnaryNot(inner) => collect_ptypes(inner, model, out),
        Expr::In {
            element,
            collection,
        } => {
            collect_ptypes(element, model, out);
            collection.iter().for_each(|a| collect_ptypes(a, model, out));
        }
    }
}

struct Binder<'a> {
    model: &'a Model,
    ptype: &'a str,
}

impl Binder<'_> {
    fn bind(&self, expr: &Expr) -> AuthzResult<Node> {
        Ok(match expr {
            Expr::Literal(LitValue::Str(s)) => Node::Str(s.clone()),
            Expr::Literal(LitValue::Bool(b)) => Node::Bool(*b),
            Expr::Path(path) => self.bind_path(path)?,
            Expr::Call { name, args } => self.bind_call(name, args)?,
            Expr::BinOp { op, left, right } => {
                let l = Box::new(self.bind(left)?);
                let r = Box::new(self.bind(right)?);
                match op {
                    BinOp::Eq => Node::Eq(l, r),
                    BinOp::Ne => Node::Ne(l, r),
                    BinOp::And => Node::And(l, r),
                    BinOp::Or => Node::Or(l, r),
                }
            }
            Expr::UnaryNot(inner) => Node::Not(Box::new(self.bind(inner)?)),
            Expr::In {
                element,
                collection,
            } => Node::In(
                Box::new(self.bind(element)?),
                collection
                    .iter()
                    .map(|e| self.bind(e))
                    .collect::<AuthzResult<_>>()?,
            ),
        })
    }

    fn bind_path(&self, path: &[String]) -> AuthzResult<Node> {
        let [scope, field] = path else {
            return Err(AuthzError::InvalidMatcher(format!(
                "`{}` is not a field reference (expected r.<field> or p.<field>)",
                path.join(".")
            )));
        };
        if scope == "r" {
            return self
                .model
                .request_index(field)
                .map(Node::Request)
                .ok_or_else(|| {
                    AuthzError::InvalidMatcher(format!("unknown request field `r.{field}`"))
                });
        }
        if scope == self.ptype {
            return self
                .model
                .policy_index(self.ptype, field)
                .map(Node::Policy)
                .ok_or_else(|| {
                    AuthzError::InvalidMatcher(format!("unknown policy field `{scope}.{field}`"))
                });
        }
        Err(AuthzError::InvalidMatcher(format!(
            "unknown identifier `{scope}.{field}`"
        )))
    }

    fn bind_call(&self, name: &str, args: &[Expr]) -> AuthzResult<Node> {
        let bound: Vec<Node> = args.iter().map(|a| self.bind(a)).collect::<AuthzResult<_>>()?;

        if let Some(&arity) = self.model.roles.get(name) {
            if bound.len() != arity {
                return Err(AuthzError::InvalidMatcher(format!(
                    "role function `{name}` takes {arity} arguments, got {}",
                    bound.len()
                )));
            }
            return Ok(Node::Role {
                gtype: name.to_string(),
                args: bound,
            });
        }

        if let Some(func) = Builtin::lookup(name) {
            let Ok([a, b]) = <[Node; 2]>::try_from(bound) else {
                return Err(AuthzError::InvalidMatcher(format!(
                    "function `{name}` takes 2 arguments"
                )));
            };
            if let (Builtin::RegexMatch, Node::Str(pattern)) = (func, &b) {
                let regex = functions::compile_regex(pattern)
                    .map_err(|e| AuthzError::InvalidMatcher(e.to_string()))?;
                return Ok(Node::RegexLiteral {
                    value: Box::new(a),
                    regex,
                });
            }
            return Ok(Node::Builtin {
                func,
                args: [Box::new(a), Box::new(b)],
            });
        }

        Err(AuthzError::InvalidMatcher(format!(
            "undefined function `{name}`"
        )))
    }
}

// ─── Evaluator ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Value<'a> {
    Str(&'a str),
    Bool(bool),
}

struct Scope<'a> {
    request: &'a [String],
    rule: &'a [String],
    roles: &'a BTreeMap<String, Arc<RoleManager>>,
    regexes: &'a RegexCache,
}

impl<'a> Scope<'a> {
    fn eval(&self, node: &'a Node) -> AuthzResult<Value<'a>> {
        match node {
            Node::Str(s) => Ok(Value::Str(s)),
            Node::Bool(b) => Ok(Value::Bool(*b)),
            Node::Request(idx) => Ok(Value::Str(&self.request[*idx])),
            Node::Policy(idx) => Ok(Value::Str(&self.rule[*idx])),
            Node::Eq(l, r) => Ok(Value::Bool(self.eval(l)? == self.eval(r)?)),
            Node::Ne(l, r) => Ok(Value::Bool(self.eval(l)? != self.eval(r)?)),
            Node::And(l, r) => {
                if !self.eval_bool(l, "&&")? {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(self.eval_bool(r, "&&")?))
            }
            Node::Or(l, r) => {
                if self.eval_bool(l, "||")? {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(self.eval_bool(r, "||")?))
            }
            Node::Not(inner) => Ok(Value::Bool(!self.eval_bool(inner, "!")?)),
            Node::In(element, collection) => {
                let elem = self.eval(element)?;
                for item in collection {
                    if self.eval(item)? == elem {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            Node::Role { gtype, args } => {
                let name1 = self.eval_str(&args[0], gtype)?;
                let name2 = self.eval_str(&args[1], gtype)?;
                let domain = match args.get(2) {
                    Some(arg) => Some(self.eval_str(arg, gtype)?),
                    None => None,
                };
                let linked = match self.roles.get(gtype) {
                    Some(rm) => rm.has_link(name1, name2, domain),
                    None => name1 == name2,
                };
                Ok(Value::Bool(linked))
            }
            Node::Builtin { func, args } => {
                let a = self.eval_str(&args[0], "function")?;
                let b = self.eval_str(&args[1], "function")?;
                Ok(Value::Bool(func.call(a, b, self.regexes)?))
            }
            Node::RegexLiteral { value, regex } => {
                let value = self.eval_str(value, "regexMatch")?;
                Ok(Value::Bool(regex.is_match(value)))
            }
        }
    }

    fn eval_bool(&self, node: &'a Node, op: &str) -> AuthzResult<bool> {
        match self.eval(node)? {
            Value::Bool(b) => Ok(b),
            Value::Str(_) => Err(AuthzError::Eval(format!(
                "`{op}` requires boolean operands"
            ))),
        }
    }

    fn eval_str(&self, node: &'a Node, callee: &str) -> AuthzResult<&'a str> {
        match self.eval(node)? {
            Value::Str(s) => Ok(s),
            Value::Bool(_) => Err(AuthzError::Eval(format!(
                "`{callee}` arguments must be strings"
            ))),
        }
    }
}
