//! Recursive-descent parser producing the expression AST
//!
//! Precedence, lowest first: `||`, `&&`, equality, comparison,
//! additive, multiplicative, unary, postfix (member, index, call).

use serde_json::Value;

use super::lexer::{tokenize, Token};
use crate::constants::expression::{MAX_DEPTH, MAX_SOURCE_LEN};
use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Negate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Array(Vec<Expr>),
    Object(Vec<(String, Expr)>),
    /// `$`, the whole context
    Root,
    /// Bare identifier or `$name`, looked up at the top of the context
    Variable(String),
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
}

/// Parse an expression source string into an AST
pub fn parse(source: &str) -> Result<Expr> {
    if source.len() > MAX_SOURCE_LEN {
        return Err(EngineError::evaluation(format!(
            "expression exceeds {} bytes",
            MAX_SOURCE_LEN
        )));
    }

    let tokens = tokenize(source)?;
    if tokens.is_empty() {
        return Err(EngineError::evaluation("empty expression"));
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.expression()?;
    if let Some(token) = parser.peek() {
        return Err(EngineError::evaluation(format!(
            "unexpected token {:?} in '{}'",
            token, source
        )));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token) -> Result<()> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(EngineError::evaluation(format!(
                "expected {:?}, found {:?}",
                token,
                self.peek()
            )))
        }
    }

    fn expression(&mut self) -> Result<Expr> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(EngineError::evaluation(format!(
                "expression nesting exceeds depth {}",
                MAX_DEPTH
            )));
        }
        let expr = self.or();
        self.depth -= 1;
        expr
    }

    fn or(&mut self) -> Result<Expr> {
        let mut left = self.and()?;
        while self.eat(&Token::Or) {
            let right = self.and()?;
            left = Expr::Binary(BinaryOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr> {
        let mut left = self.equality()?;
        while self.eat(&Token::And) {
            let right = self.equality()?;
            left = Expr::Binary(BinaryOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn equality(&mut self) -> Result<Expr> {
        let mut left = self.comparison()?;
        loop {
            let op = match self.peek() {
                Some(Token::Eq) => BinaryOp::Eq,
                Some(Token::NotEq) => BinaryOp::NotEq,
                Some(Token::StrictEq) => BinaryOp::StrictEq,
                Some(Token::StrictNotEq) => BinaryOp::StrictNotEq,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.comparison()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn comparison(&mut self) -> Result<Expr> {
        let mut left = self.additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::Le) => BinaryOp::Le,
                Some(Token::Gt) => BinaryOp::Gt,
                Some(Token::Ge) => BinaryOp::Ge,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.additive()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn additive(&mut self) -> Result<Expr> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.multiplicative()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn multiplicative(&mut self) -> Result<Expr> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Mod,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn unary(&mut self) -> Result<Expr> {
        if self.eat(&Token::Bang) {
            let operand = self.nested(Self::unary)?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(operand)));
        }
        if self.eat(&Token::Minus) {
            let operand = self.nested(Self::unary)?;
            return Ok(Expr::Unary(UnaryOp::Negate, Box::new(operand)));
        }
        self.postfix()
    }

    fn nested(&mut self, f: fn(&mut Self) -> Result<Expr>) -> Result<Expr> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(EngineError::evaluation(format!(
                "expression nesting exceeds depth {}",
                MAX_DEPTH
            )));
        }
        let expr = f(self);
        self.depth -= 1;
        expr
    }

    fn postfix(&mut self) -> Result<Expr> {
        let mut expr = self.primary()?;
        loop {
            if self.eat(&Token::Dot) {
                match self.advance() {
                    Some(Token::Ident(name)) => expr = Expr::Member(Box::new(expr), name),
                    // `$.output.node.0` addresses an iteration slot
                    Some(Token::Number(n)) if n.fract() == 0.0 && n >= 0.0 => {
                        expr = Expr::Member(Box::new(expr), format!("{}", n as u64))
                    }
                    Some(Token::True) => expr = Expr::Member(Box::new(expr), "true".into()),
                    Some(Token::False) => expr = Expr::Member(Box::new(expr), "false".into()),
                    Some(Token::Null) => expr = Expr::Member(Box::new(expr), "null".into()),
                    other => {
                        return Err(EngineError::evaluation(format!(
                            "expected property name after '.', found {:?}",
                            other
                        )))
                    }
                }
            } else if self.eat(&Token::LBracket) {
                let index = self.expression()?;
                self.expect(&Token::RBracket)?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else {
                return Ok(expr);
            }
        }
    }

    fn primary(&mut self) -> Result<Expr> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(Expr::Literal(super::eval::number(n))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::True) => Ok(Expr::Literal(Value::Bool(true))),
            Some(Token::False) => Ok(Expr::Literal(Value::Bool(false))),
            Some(Token::Null) => Ok(Expr::Literal(Value::Null)),
            Some(Token::LParen) => {
                let expr = self.expression()?;
                self.expect(&Token::RParen)?;
                Ok(expr)
            }
            Some(Token::LBracket) => {
                let mut items = Vec::new();
                if !self.eat(&Token::RBracket) {
                    loop {
                        items.push(self.expression()?);
                        if self.eat(&Token::RBracket) {
                            break;
                        }
                        self.expect(&Token::Comma)?;
                    }
                }
                Ok(Expr::Array(items))
            }
            Some(Token::LBrace) => {
                let mut fields = Vec::new();
                if !self.eat(&Token::RBrace) {
                    loop {
                        let key = match self.advance() {
                            Some(Token::Str(s)) | Some(Token::Ident(s)) => s,
                            other => {
                                return Err(EngineError::evaluation(format!(
                                    "expected object key, found {:?}",
                                    other
                                )))
                            }
                        };
                        self.expect(&Token::Colon)?;
                        fields.push((key, self.expression()?));
                        if self.eat(&Token::RBrace) {
                            break;
                        }
                        self.expect(&Token::Comma)?;
                    }
                }
                Ok(Expr::Object(fields))
            }
            Some(Token::Ident(name)) => {
                if self.eat(&Token::LParen) {
                    let mut args = Vec::new();
                    if !self.eat(&Token::RParen) {
                        loop {
                            args.push(self.expression()?);
                            if self.eat(&Token::RParen) {
                                break;
                            }
                            self.expect(&Token::Comma)?;
                        }
                    }
                    Ok(Expr::Call(name, args))
                } else if name == "$" {
                    Ok(Expr::Root)
                } else {
                    Ok(Expr::Variable(name))
                }
            }
            Some(token) => Err(EngineError::evaluation(format!("unexpected token {:?}", token))),
            None => Err(EngineError::evaluation("unexpected end of expression")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_precedence() {
        let expr = parse("1 + 2 * 3 == 7 && true").unwrap();
        match expr {
            Expr::Binary(BinaryOp::And, left, _) => match *left {
                Expr::Binary(BinaryOp::Eq, sum, _) => {
                    assert!(matches!(*sum, Expr::Binary(BinaryOp::Add, _, _)))
                }
                other => panic!("expected equality, got {:?}", other),
            },
            other => panic!("expected &&, got {:?}", other),
        }
    }

    #[test]
    fn test_root_path_and_index() {
        let expr = parse("$.output.A.items[0]").unwrap();
        let expected = Expr::Index(
            Box::new(Expr::Member(
                Box::new(Expr::Member(
                    Box::new(Expr::Member(Box::new(Expr::Root), "output".into())),
                    "A".into(),
                )),
                "items".into(),
            )),
            Box::new(Expr::Literal(json!(0))),
        );
        assert_eq!(expr, expected);
    }

    #[test]
    fn test_numeric_member_segment() {
        let expr = parse("$.output.body.2").unwrap();
        assert!(matches!(expr, Expr::Member(_, ref key) if key == "2"));
    }

    #[test]
    fn test_calls_and_collections() {
        let expr = parse("max([1, 2], {a: 1}.a)").unwrap();
        match expr {
            Expr::Call(name, args) => {
                assert_eq!(name, "max");
                assert_eq!(args.len(), 2);
            }
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_trailing_tokens_and_deep_nesting() {
        assert!(parse("1 2").is_err());
        assert!(parse("").is_err());
        let deep = format!("{}1{}", "(".repeat(200), ")".repeat(200));
        assert!(parse(&deep).is_err());
    }
}
