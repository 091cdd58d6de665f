//! Recursive-descent parser producing [`Expr`] trees.
//!
//! Precedence, lowest first: conditional, `or`, `and`, `not`, comparisons,
//! `+ -`, `* / // %`, unary `+ -`, `**`, then postfix access and calls.

use serde_json::Value;

use super::ExpressionError;
use super::ast::{BinOp, CmpOp, Expr, LogicalOp, UnaryOp};
use super::lexer::Token;

/// Nesting limit; keeps hostile input from exhausting the stack.
const MAX_DEPTH: usize = 64;

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    /// Parse a complete expression, rejecting trailing tokens.
    pub fn parse(mut self) -> Result<Expr, ExpressionError> {
        if self.peek() == &Token::Eof {
            return Err(ExpressionError::Syntax("empty expression".to_string()));
        }
        let expr = self.expression()?;
        match self.peek() {
            Token::Eof => Ok(expr),
            tok => Err(unexpected(tok)),
        }
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn peek_next(&self) -> &Token {
        self.tokens.get(self.pos + 1).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == expected {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token, what: &str) -> Result<(), ExpressionError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(ExpressionError::Syntax(format!(
                "expected {what}, found {}",
                describe(self.peek())
            )))
        }
    }

    fn enter(&mut self) -> Result<(), ExpressionError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ExpressionError::Syntax(
                "expression is nested too deeply".to_string(),
            ));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// Release the levels charged by `links` left-associative iterations.
    fn unwind(&mut self, links: usize) {
        self.depth -= links;
    }

    fn expression(&mut self) -> Result<Expr, ExpressionError> {
        self.enter()?;
        let result = self.conditional();
        self.leave();
        result
    }

    fn conditional(&mut self) -> Result<Expr, ExpressionError> {
        let body = self.or_expr()?;
        if !self.eat(&Token::If) {
            return Ok(body);
        }
        let test = self.or_expr()?;
        self.expect(&Token::Else, "'else' in conditional expression")?;
        let orelse = self.expression()?;
        Ok(Expr::IfElse {
            test: Box::new(test),
            body: Box::new(body),
            orelse: Box::new(orelse),
        })
    }

    fn or_expr(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.and_expr()?;
        let mut links = 0;
        while self.eat(&Token::Or) {
            // Each link nests the tree one level deeper.
            self.enter()?;
            links += 1;
            let right = self.and_expr()?;
            left = Expr::Logical {
                op: LogicalOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        self.unwind(links);
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.not_expr()?;
        let mut links = 0;
        while self.eat(&Token::And) {
            self.enter()?;
            links += 1;
            let right = self.not_expr()?;
            left = Expr::Logical {
                op: LogicalOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        self.unwind(links);
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Expr, ExpressionError> {
        if self.eat(&Token::Not) {
            self.enter()?;
            let operand = self.not_expr();
            self.leave();
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand?),
            });
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, ExpressionError> {
        let left = self.arith()?;
        let mut rest = Vec::new();
        while let Some(op) = self.comparison_op() {
            let right = self.arith()?;
            rest.push((op, right));
        }
        if rest.is_empty() {
            Ok(left)
        } else {
            Ok(Expr::Compare {
                left: Box::new(left),
                rest,
            })
        }
    }

    fn comparison_op(&mut self) -> Option<CmpOp> {
        let op = match self.peek() {
            Token::EqEq => CmpOp::Eq,
            Token::NotEq => CmpOp::NotEq,
            Token::Lt => CmpOp::Lt,
            Token::LtEq => CmpOp::LtEq,
            Token::Gt => CmpOp::Gt,
            Token::GtEq => CmpOp::GtEq,
            Token::In => CmpOp::In,
            Token::Not if self.peek_next() == &Token::In => {
                self.pos += 2;
                return Some(CmpOp::NotIn);
            }
            Token::Is => {
                self.pos += 1;
                if self.eat(&Token::Not) {
                    return Some(CmpOp::IsNot);
                }
                return Some(CmpOp::Is);
            }
            _ => return None,
        };
        self.pos += 1;
        Some(op)
    }

    fn arith(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.term()?;
        let mut links = 0;
        loop {
            let op = match self.peek() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            self.enter()?;
            links += 1;
            let right = self.term()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        self.unwind(links);
        Ok(left)
    }

    fn term(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.factor()?;
        let mut links = 0;
        loop {
            let op = match self.peek() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                Token::DoubleSlash => BinOp::FloorDiv,
                Token::Percent => BinOp::Mod,
                _ => break,
            };
            self.pos += 1;
            self.enter()?;
            links += 1;
            let right = self.factor()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        self.unwind(links);
        Ok(left)
    }

    fn factor(&mut self) -> Result<Expr, ExpressionError> {
        let op = match self.peek() {
            Token::Minus => UnaryOp::Neg,
            Token::Plus => UnaryOp::Pos,
            _ => return self.power(),
        };
        self.pos += 1;
        self.enter()?;
        let operand = self.factor();
        self.leave();
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand?),
        })
    }

    fn power(&mut self) -> Result<Expr, ExpressionError> {
        let base = self.postfix()?;
        if !self.eat(&Token::DoubleStar) {
            return Ok(base);
        }
        // Right-associative and binds tighter than a unary minus on its left.
        self.enter()?;
        let exponent = self.factor();
        self.leave();
        Ok(Expr::Binary {
            op: BinOp::Pow,
            left: Box::new(base),
            right: Box::new(exponent?),
        })
    }

    fn postfix(&mut self) -> Result<Expr, ExpressionError> {
        let mut expr = self.atom()?;
        let mut links = 0;
        loop {
            if matches!(self.peek(), Token::Dot | Token::LBracket | Token::LParen) {
                self.enter()?;
                links += 1;
            }
            match self.peek() {
                Token::Dot => {
                    self.pos += 1;
                    match self.advance() {
                        Token::Name(attr) => {
                            expr = Expr::Attribute {
                                value: Box::new(expr),
                                attr,
                            };
                        }
                        tok => {
                            return Err(ExpressionError::Syntax(format!(
                                "expected attribute name after '.', found {}",
                                describe(&tok)
                            )));
                        }
                    }
                }
                Token::LBracket => {
                    self.pos += 1;
                    expr = self.subscript(expr)?;
                }
                Token::LParen => {
                    self.pos += 1;
                    expr = self.call(expr)?;
                }
                _ => break,
            }
        }
        self.unwind(links);
        Ok(expr)
    }

    fn subscript(&mut self, value: Expr) -> Result<Expr, ExpressionError> {
        let lower = if matches!(self.peek(), Token::Colon) {
            None
        } else {
            Some(Box::new(self.expression()?))
        };

        if !self.eat(&Token::Colon) {
            self.expect(&Token::RBracket, "']'")?;
            let index = lower.ok_or_else(|| {
                ExpressionError::Syntax("empty subscript".to_string())
            })?;
            return Ok(Expr::Subscript {
                value: Box::new(value),
                index,
            });
        }

        let upper = if matches!(self.peek(), Token::Colon | Token::RBracket) {
            None
        } else {
            Some(Box::new(self.expression()?))
        };
        let step = if self.eat(&Token::Colon) && !matches!(self.peek(), Token::RBracket) {
            Some(Box::new(self.expression()?))
        } else {
            None
        };
        self.expect(&Token::RBracket, "']'")?;
        Ok(Expr::Slice {
            value: Box::new(value),
            lower,
            upper,
            step,
        })
    }

    fn call(&mut self, func: Expr) -> Result<Expr, ExpressionError> {
        let mut args = Vec::new();
        let mut kwargs: Vec<(String, Expr)> = Vec::new();
        while !self.eat(&Token::RParen) {
            if let (Token::Name(name), Token::Assign) = (self.peek(), self.peek_next()) {
                let name = name.clone();
                self.pos += 2;
                if kwargs.iter().any(|(k, _)| *k == name) {
                    return Err(ExpressionError::Syntax(format!(
                        "keyword argument '{name}' repeated"
                    )));
                }
                let value = self.expression()?;
                kwargs.push((name, value));
            } else {
                if !kwargs.is_empty() {
                    return Err(ExpressionError::Syntax(
                        "positional argument follows keyword argument".to_string(),
                    ));
                }
                if matches!(self.peek(), Token::Star | Token::DoubleStar) {
                    return Err(ExpressionError::Unsafe(
                        "argument unpacking is not allowed".to_string(),
                    ));
                }
                args.push(self.expression()?);
            }
            if !self.eat(&Token::Comma) {
                self.expect(&Token::RParen, "',' or ')' in call")?;
                break;
            }
        }
        Ok(Expr::Call {
            func: Box::new(func),
            args,
            kwargs,
        })
    }

    fn atom(&mut self) -> Result<Expr, ExpressionError> {
        let tok = self.advance();
        match tok {
            Token::Int(i) => Ok(Expr::Literal(Value::from(i))),
            Token::Float(f) => serde_json::Number::from_f64(f)
                .map(|n| Expr::Literal(Value::Number(n)))
                .ok_or_else(|| ExpressionError::Syntax(format!("invalid float literal {f}"))),
            Token::Str(mut s) => {
                // Adjacent literals concatenate.
                while let Token::Str(next) = self.peek() {
                    s.push_str(next);
                    self.pos += 1;
                }
                Ok(Expr::Literal(Value::String(s)))
            }
            Token::True => Ok(Expr::Literal(Value::Bool(true))),
            Token::False => Ok(Expr::Literal(Value::Bool(false))),
            Token::None => Ok(Expr::Literal(Value::Null)),
            Token::Name(name) => Ok(Expr::Name(name)),
            Token::LParen => self.paren(),
            Token::LBracket => {
                self.enter()?;
                let items = self.sequence(&Token::RBracket, "']'");
                self.leave();
                Ok(Expr::List(items?))
            }
            Token::LBrace => {
                self.enter()?;
                let result = self.brace();
                self.leave();
                result
            }
            Token::Assign => Err(ExpressionError::Unsafe(
                "assignment is not allowed".to_string(),
            )),
            other => Err(unexpected(&other)),
        }
    }

    fn paren(&mut self) -> Result<Expr, ExpressionError> {
        if self.eat(&Token::RParen) {
            return Ok(Expr::Tuple(Vec::new()));
        }
        self.enter()?;
        let first = self.expression();
        self.leave();
        let first = first?;
        if self.eat(&Token::RParen) {
            return Ok(first);
        }
        self.expect(&Token::Comma, "',' or ')'")?;
        let mut items = vec![first];
        self.enter()?;
        let rest = self.sequence(&Token::RParen, "')'");
        self.leave();
        items.extend(rest?);
        Ok(Expr::Tuple(items))
    }

    /// Comma-separated items up to `close`, trailing comma allowed.
    fn sequence(&mut self, close: &Token, what: &str) -> Result<Vec<Expr>, ExpressionError> {
        let mut items = Vec::new();
        while !self.eat(close) {
            items.push(self.expression()?);
            if !self.eat(&Token::Comma) {
                self.expect(close, what)?;
                break;
            }
        }
        Ok(items)
    }

    fn brace(&mut self) -> Result<Expr, ExpressionError> {
        if self.eat(&Token::RBrace) {
            return Ok(Expr::Dict(Vec::new()));
        }
        let first = self.expression()?;
        if self.eat(&Token::Colon) {
            let value = self.expression()?;
            let mut entries = vec![(first, value)];
            while self.eat(&Token::Comma) {
                if self.peek() == &Token::RBrace {
                    break;
                }
                let key = self.expression()?;
                self.expect(&Token::Colon, "':' in dict literal")?;
                let value = self.expression()?;
                entries.push((key, value));
            }
            self.expect(&Token::RBrace, "'}'")?;
            return Ok(Expr::Dict(entries));
        }

        let mut items = vec![first];
        if self.eat(&Token::Comma) {
            items.extend(self.sequence(&Token::RBrace, "'}'")?);
        } else {
            self.expect(&Token::RBrace, "'}'")?;
        }
        Ok(Expr::Set(items))
    }
}

fn describe(tok: &Token) -> String {
    match tok {
        Token::Eof => "end of expression".to_string(),
        Token::Name(n) => format!("name '{n}'"),
        Token::Str(s) => format!("string '{s}'"),
        Token::Int(i) => format!("number {i}"),
        Token::Float(f) => format!("number {f}"),
        other => format!("{other:?}"),
    }
}

fn unexpected(tok: &Token) -> ExpressionError {
    match tok {
        Token::Assign => ExpressionError::Unsafe("assignment is not allowed".to_string()),
        other => ExpressionError::Syntax(format!("unexpected {}", describe(other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::expression::lexer::Lexer;

    fn parse(src: &str) -> Result<Expr, ExpressionError> {
        Parser::new(Lexer::new(src).tokenize()?).parse()
    }

    #[test]
    fn test_precedence_mul_over_add() {
        let expr = parse("1 + 2 * 3").unwrap();
        match expr {
            Expr::Binary { op: BinOp::Add, right, .. } => {
                assert!(matches!(*right, Expr::Binary { op: BinOp::Mul, .. }));
            }
            other => panic!("unexpected tree: {other:?}"),
        }
    }

    #[test]
    fn test_power_binds_tighter_than_unary_minus() {
        let expr = parse("-2 ** 2").unwrap();
        match expr {
            Expr::Unary { op: UnaryOp::Neg, operand } => {
                assert!(matches!(*operand, Expr::Binary { op: BinOp::Pow, .. }));
            }
            other => panic!("unexpected tree: {other:?}"),
        }
    }

    #[test]
    fn test_chained_comparison() {
        let expr = parse("1 < x <= 3").unwrap();
        match expr {
            Expr::Compare { rest, .. } => {
                assert_eq!(rest.len(), 2);
                assert_eq!(rest[0].0, CmpOp::Lt);
                assert_eq!(rest[1].0, CmpOp::LtEq);
            }
            other => panic!("unexpected tree: {other:?}"),
        }
    }

    #[test]
    fn test_not_in_and_is_not() {
        let expr = parse("a not in b").unwrap();
        assert!(matches!(expr, Expr::Compare { ref rest, .. } if rest[0].0 == CmpOp::NotIn));
        let expr = parse("a is not None").unwrap();
        assert!(matches!(expr, Expr::Compare { ref rest, .. } if rest[0].0 == CmpOp::IsNot));
    }

    #[test]
    fn test_collections() {
        assert!(matches!(parse("[1, 2,]").unwrap(), Expr::List(items) if items.len() == 2));
        assert!(matches!(parse("(1,)").unwrap(), Expr::Tuple(items) if items.len() == 1));
        assert!(matches!(parse("()").unwrap(), Expr::Tuple(items) if items.is_empty()));
        assert!(matches!(parse("(1)").unwrap(), Expr::Literal(_)));
        assert!(matches!(parse("{}").unwrap(), Expr::Dict(items) if items.is_empty()));
        assert!(matches!(parse("{'a': 1, 'b': 2}").unwrap(), Expr::Dict(items) if items.len() == 2));
        assert!(matches!(parse("{1, 2}").unwrap(), Expr::Set(items) if items.len() == 2));
    }

    #[test]
    fn test_slices() {
        assert!(matches!(parse("x[1:]").unwrap(), Expr::Slice { upper: None, .. }));
        assert!(matches!(parse("x[::-1]").unwrap(), Expr::Slice { lower: None, step: Some(_), .. }));
        assert!(matches!(parse("x[0]").unwrap(), Expr::Subscript { .. }));
    }

    #[test]
    fn test_call_with_keyword_argument() {
        match parse("sorted(xs, reverse=True)").unwrap() {
            Expr::Call { args, kwargs, .. } => {
                assert_eq!(args.len(), 1);
                assert_eq!(kwargs[0].0, "reverse");
            }
            other => panic!("unexpected tree: {other:?}"),
        }
    }

    #[test]
    fn test_conditional_expression() {
        assert!(matches!(parse("'a' if x else 'b'").unwrap(), Expr::IfElse { .. }));
    }

    #[test]
    fn test_assignment_is_unsafe() {
        assert!(matches!(parse("x = 1"), Err(ExpressionError::Unsafe(_))));
    }

    #[test]
    fn test_syntax_errors() {
        for src in ["", "1 +", "(1", "[1, 2", "a.", "x[]", "1 2"] {
            assert!(
                matches!(parse(src), Err(ExpressionError::Syntax(_))),
                "{src:?} should be a syntax error"
            );
        }
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let src = format!("{}1{}", "(".repeat(200), ")".repeat(200));
        assert!(matches!(parse(&src), Err(ExpressionError::Syntax(_))));
    }

    #[test]
    fn test_long_operator_chains_are_rejected() {
        let sum = vec!["1"; 20_000].join("+");
        assert!(matches!(parse(&sum), Err(ExpressionError::Syntax(_))));

        let conj = vec!["x"; 5_000].join(" and ");
        assert!(matches!(parse(&conj), Err(ExpressionError::Syntax(_))));

        let attrs = format!("x{}", ".a".repeat(5_000));
        assert!(matches!(parse(&attrs), Err(ExpressionError::Syntax(_))));
    }

    #[test]
    fn test_short_chains_still_parse() {
        assert!(parse(&vec!["1"; 30].join(" + ")).is_ok());
        assert!(parse(&vec!["x"; 30].join(" or ")).is_ok());
        assert!(parse("a.b.c[0].d(1)(2)").is_ok());
    }
}
