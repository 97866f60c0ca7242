// src/expression.rs
use crate::parser::{ParseError, Parser};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Ident(String),
    Field(Box<Expr>, String),        // a.b
    Index(Box<Expr>, Box<Expr>),     // a["b"], a[0]
    Call { module: Option<String>, name: String, args: Vec<Expr> },
    Not(Box<Expr>),
    Neg(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Lte => "<=",
            BinOp::Gt => ">",
            BinOp::Gte => ">=",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
        }
    }
}

/// `fn name(a, b) = expr;` inside a grabbed module.
#[derive(Debug, Clone, PartialEq)]
pub struct FnDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: Expr,
}

const MAX_NESTING: usize = 128;

/// Parse a filter script: comments, then exactly one expression.
pub fn parse_script(input: &str) -> Result<Expr, ParseError> {
    let mut p = EParser::new(input);
    p.parser.skip_ws();
    if p.parser.eof() {
        return Err(p.parser.error("script is empty"));
    }
    let node = p.parse_expr()?;
    p.parser.skip_ws();
    if !p.parser.eof() {
        return Err(p.parser.error("trailing input"));
    }
    Ok(node)
}

/// Parse a module body: a sequence of `fn` definitions.
pub fn parse_module(input: &str) -> Result<Vec<FnDef>, ParseError> {
    let mut p = EParser::new(input);
    let mut defs = Vec::new();
    loop {
        p.parser.skip_ws();
        if p.parser.eof() {
            break;
        }
        if !p.parser.consume_keyword("fn") {
            return Err(p.parser.error("expected 'fn'"));
        }
        p.parser.skip_ws();
        let name = p.parser.parse_identifier()?;
        p.parser.skip_ws();
        p.parser.expect('(')?;
        let mut params = Vec::new();
        p.parser.skip_ws();
        if !p.parser.consume_char(')') {
            loop {
                p.parser.skip_ws();
                let param = p.parser.parse_identifier()?;
                if params.contains(&param) {
                    return Err(p.parser.error(format!("parameter '{param}' repeated")));
                }
                params.push(param);
                p.parser.skip_ws();
                if p.parser.consume_char(',') {
                    continue;
                }
                p.parser.expect(')')?;
                break;
            }
        }
        p.parser.skip_ws();
        p.parser.expect('=')?;
        let body = p.parse_expr()?;
        p.parser.skip_ws();
        p.parser.expect(';')?;
        if defs.iter().any(|d: &FnDef| d.name == name) {
            return Err(p.parser.error(format!("function '{name}' defined twice")));
        }
        defs.push(FnDef { name, params, body });
    }
    Ok(defs)
}

struct EParser<'a> {
    parser: Parser<'a>,
    depth: usize,
}

impl<'a> EParser<'a> {
    fn new(s: &'a str) -> Self {
        Self { parser: Parser::new(s), depth: 0 }
    }

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(self.parser.error("expression nested too deeply"));
        }
        let out = self.parse_or();
        self.depth -= 1;
        out
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_and()?;
        loop {
            self.parser.skip_ws();
            if self.parser.consume_str("||") {
                let right = self.parse_and()?;
                left = Expr::Or(Box::new(left), Box::new(right));
            } else {
                break;
            }
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_compare()?;
        loop {
            self.parser.skip_ws();
            if self.parser.consume_str("&&") {
                let right = self.parse_compare()?;
                left = Expr::And(Box::new(left), Box::new(right));
            } else {
                break;
            }
        }
        Ok(left)
    }

    fn parse_compare(&mut self) -> Result<Expr, ParseError> {
        let left = self.parse_sum()?;
        self.parser.skip_ws();
        let op = if self.parser.consume_str("==") {
            Some(BinOp::Eq)
        } else if self.parser.consume_str("!=") {
            Some(BinOp::Ne)
        } else if self.parser.consume_str("<=") {
            Some(BinOp::Lte)
        } else if self.parser.consume_str(">=") {
            Some(BinOp::Gte)
        } else if self.parser.consume_char('<') {
            Some(BinOp::Lt)
        } else if self.parser.consume_char('>') {
            Some(BinOp::Gt)
        } else {
            None
        };
        match op {
            Some(op) => {
                let right = self.parse_sum()?;
                Ok(Expr::Binary(op, Box::new(left), Box::new(right)))
            }
            None => Ok(left),
        }
    }

    fn parse_sum(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_product()?;
        loop {
            self.parser.skip_ws();
            let op = if self.parser.consume_char('+') {
                BinOp::Add
            } else if self.parser.consume_char('-') {
                BinOp::Sub
            } else {
                break;
            };
            let right = self.parse_product()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_product(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;
        loop {
            self.parser.skip_ws();
            let op = if self.parser.consume_char('*') {
                BinOp::Mul
            } else if self.parser.consume_char('/') {
                BinOp::Div
            } else if self.parser.consume_char('%') {
                BinOp::Rem
            } else {
                break;
            };
            let right = self.parse_unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        self.parser.skip_ws();
        if self.parser.consume_char('-') {
            let inner = self.nested(Self::parse_unary)?;
            return Ok(match inner {
                Expr::Literal(Value::Number(n)) => negate_literal(&n)
                    .map(Expr::Literal)
                    .unwrap_or_else(|| Expr::Neg(Box::new(Expr::Literal(Value::Number(n))))),
                other => Expr::Neg(Box::new(other)),
            });
        }
        // `!` binds tighter than comparison: `!a == b` is `(!a) == b`
        if !self.parser.peek_str("!=") && self.parser.consume_char('!') {
            let inner = self.nested(Self::parse_unary)?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut node = self.parse_primary()?;
        loop {
            if self.parser.consume_char('.') {
                let name = self.parser.parse_identifier()?;
                self.parser.skip_ws();
                if self.parser.consume_char('(') {
                    let mut args = vec![node];
                    args.extend(self.parse_args()?);
                    node = Expr::Call { module: None, name, args };
                } else {
                    node = Expr::Field(Box::new(node), name);
                }
            } else if self.parser.consume_char('[') {
                let idx = self.parse_expr()?;
                self.parser.skip_ws();
                self.parser.expect(']')?;
                node = Expr::Index(Box::new(node), Box::new(idx));
            } else {
                break;
            }
        }
        Ok(node)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        self.parser.skip_ws();
        match self.parser.peek_char() {
            Some('"') | Some('\'') => {
                return Ok(Expr::Literal(Value::String(self.parser.parse_quoted_string()?)));
            }
            Some('(') => {
                self.parser.consume_char('(');
                let inner = self.parse_expr()?;
                self.parser.skip_ws();
                self.parser.expect(')')?;
                return Ok(inner);
            }
            Some(c) if c.is_ascii_digit() => {
                return Ok(Expr::Literal(self.parser.parse_number_literal()?));
            }
            _ => {}
        }
        if self.parser.consume_keyword("true") {
            return Ok(Expr::Literal(Value::Bool(true)));
        }
        if self.parser.consume_keyword("false") {
            return Ok(Expr::Literal(Value::Bool(false)));
        }
        if self.parser.consume_keyword("null") {
            return Ok(Expr::Literal(Value::Null));
        }
        if !self.parser.peek_ident_start() {
            return Err(self.parser.error("invalid operand"));
        }
        let name = self.parser.parse_identifier()?;
        if self.parser.consume_str("::") {
            let func = self.parser.parse_identifier()?;
            self.parser.skip_ws();
            self.parser.expect('(')?;
            let args = self.parse_args()?;
            return Ok(Expr::Call { module: Some(name), name: func, args });
        }
        self.parser.skip_ws();
        if self.parser.consume_char('(') {
            let args = self.parse_args()?;
            return Ok(Expr::Call { module: None, name, args });
        }
        Ok(Expr::Ident(name))
    }

    /// Arguments after an opening parenthesis, through the closing one.
    fn parse_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut out = Vec::new();
        self.parser.skip_ws();
        if self.parser.consume_char(')') {
            return Ok(out);
        }
        loop {
            out.push(self.parse_expr()?);
            self.parser.skip_ws();
            if self.parser.consume_char(',') {
                continue;
            }
            self.parser.expect(')')?;
            break;
        }
        Ok(out)
    }

    fn nested(
        &mut self,
        f: fn(&mut Self) -> Result<Expr, ParseError>,
    ) -> Result<Expr, ParseError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(self.parser.error("expression nested too deeply"));
        }
        let out = f(self);
        self.depth -= 1;
        out
    }
}

fn negate_literal(n: &serde_json::Number) -> Option<Value> {
    if let Some(i) = n.as_i64() {
        return i.checked_neg().map(Value::from);
    }
    n.as_f64()
        .and_then(|f| serde_json::Number::from_f64(-f))
        .map(Value::Number)
}
