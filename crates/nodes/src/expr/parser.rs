//! Recursive-descent parser producing the expression syntax tree.
//!
//! Precedence, loosest first: `||`/`or`, `&&`/`and`, `!`/`not`,
//! comparisons and `in`, `+ -`, `* / %`, unary `-`, postfix access.

use serde_json::Value;

use super::lexer::{Spanned, Token};
use super::{Arg, BinaryOp, ExprError, Expr, Func, Stmt, UnaryOp, MAX_NESTING};

pub(crate) fn parse_expression(tokens: Vec<Spanned>) -> Result<Expr, ExprError> {
    let mut parser = Parser::new(tokens);
    let (expr, _) = parser.expr()?;
    parser.expect(Token::Eof, "end of expression")?;
    Ok(expr)
}

pub(crate) fn parse_program(tokens: Vec<Spanned>) -> Result<Vec<Stmt>, ExprError> {
    let mut parser = Parser::new(tokens);
    let mut stmts = Vec::new();

    loop {
        while matches!(parser.peek(), Token::Semi | Token::Newline) {
            parser.advance();
        }
        if *parser.peek() == Token::Eof {
            break;
        }
        stmts.push(parser.statement()?);
        match parser.peek() {
            Token::Semi | Token::Newline | Token::Eof => {}
            _ => return Err(parser.unexpected("';' or a line break")),
        }
    }

    Ok(stmts)
}

/// A parsed subtree and its height.
type Parsed = (Expr, usize);

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    /// Nested `expr`, `not` and `unary` calls on the stack right now.
    depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Spanned>) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    fn peek_at(&self, ahead: usize) -> &Token {
        // The token stream always ends with `Eof`, so clamp to it.
        let index = (self.pos + ahead).min(self.tokens.len() - 1);
        &self.tokens[index].token
    }

    fn offset(&self) -> usize {
        self.tokens[self.pos.min(self.tokens.len() - 1)].offset
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == token {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if matches!(self.peek(), Token::Ident(name) if name == keyword) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token, what: &str) -> Result<(), ExprError> {
        if self.eat(&token) {
            Ok(())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn unexpected(&self, what: &str) -> ExprError {
        let found = match self.peek() {
            Token::Eof => "end of input".to_owned(),
            other => format!("{other:?}"),
        };
        ExprError::Syntax {
            offset: self.offset(),
            message: format!("expected {what}, found {found}"),
        }
    }

    fn too_deep(&self) -> ExprError {
        ExprError::Syntax {
            offset: self.offset(),
            message: format!("expression nested more than {MAX_NESTING} levels deep"),
        }
    }

    fn descend(&mut self) -> Result<(), ExprError> {
        if self.depth >= MAX_NESTING {
            return Err(self.too_deep());
        }
        self.depth += 1;
        Ok(())
    }

    /// Wrap `expr` whose tallest child is `child_height` high. Chained
    /// operators and postfix access grow the tree without recursing, so the
    /// height is checked here as well as in [`Parser::descend`].
    fn node(&self, expr: Expr, child_height: usize) -> Result<Parsed, ExprError> {
        let height = child_height + 1;
        if height > MAX_NESTING {
            return Err(self.too_deep());
        }
        Ok((expr, height))
    }

    fn statement(&mut self) -> Result<Stmt, ExprError> {
        if let (Token::Ident(name), Token::Assign) = (self.peek(), self.peek_at(1)) {
            let name = name.clone();
            self.advance();
            self.advance();
            return Ok(Stmt::Assign(name, self.expr()?.0));
        }
        Ok(Stmt::Expr(self.expr()?.0))
    }

    fn expr(&mut self) -> Result<Parsed, ExprError> {
        self.descend()?;
        let parsed = self.or()?;
        self.depth -= 1;
        Ok(parsed)
    }

    fn or(&mut self) -> Result<Parsed, ExprError> {
        let (mut lhs, mut height) = self.and()?;
        while self.eat(&Token::OrOr) || self.eat_keyword("or") {
            let (rhs, rhs_height) = self.and()?;
            let expr = Expr::Binary(BinaryOp::Or, Box::new(lhs), Box::new(rhs));
            (lhs, height) = self.node(expr, height.max(rhs_height))?;
        }
        Ok((lhs, height))
    }

    fn and(&mut self) -> Result<Parsed, ExprError> {
        let (mut lhs, mut height) = self.not()?;
        while self.eat(&Token::AndAnd) || self.eat_keyword("and") {
            let (rhs, rhs_height) = self.not()?;
            let expr = Expr::Binary(BinaryOp::And, Box::new(lhs), Box::new(rhs));
            (lhs, height) = self.node(expr, height.max(rhs_height))?;
        }
        Ok((lhs, height))
    }

    fn not(&mut self) -> Result<Parsed, ExprError> {
        if self.eat(&Token::Bang) || self.eat_keyword("not") {
            self.descend()?;
            let (operand, height) = self.not()?;
            self.depth -= 1;
            return self.node(Expr::Unary(UnaryOp::Not, Box::new(operand)), height);
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Parsed, ExprError> {
        let (mut lhs, mut height) = self.additive()?;
        loop {
            let op = match self.peek() {
                Token::Eq => BinaryOp::Eq,
                Token::Ne => BinaryOp::Ne,
                Token::Lt => BinaryOp::Lt,
                Token::Le => BinaryOp::Le,
                Token::Gt => BinaryOp::Gt,
                Token::Ge => BinaryOp::Ge,
                Token::Ident(kw) if kw == "in" => BinaryOp::In,
                _ => return Ok((lhs, height)),
            };
            self.advance();
            let (rhs, rhs_height) = self.additive()?;
            let expr = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
            (lhs, height) = self.node(expr, height.max(rhs_height))?;
        }
    }

    fn additive(&mut self) -> Result<Parsed, ExprError> {
        let (mut lhs, mut height) = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => return Ok((lhs, height)),
            };
            self.advance();
            let (rhs, rhs_height) = self.multiplicative()?;
            let expr = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
            (lhs, height) = self.node(expr, height.max(rhs_height))?;
        }
    }

    fn multiplicative(&mut self) -> Result<Parsed, ExprError> {
        let (mut lhs, mut height) = self.unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                Token::Percent => BinaryOp::Rem,
                _ => return Ok((lhs, height)),
            };
            self.advance();
            let (rhs, rhs_height) = self.unary()?;
            let expr = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
            (lhs, height) = self.node(expr, height.max(rhs_height))?;
        }
    }

    fn unary(&mut self) -> Result<Parsed, ExprError> {
        if self.eat(&Token::Minus) {
            self.descend()?;
            let (operand, height) = self.unary()?;
            self.depth -= 1;
            return self.node(Expr::Unary(UnaryOp::Neg, Box::new(operand)), height);
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Parsed, ExprError> {
        let (mut expr, mut height) = self.primary()?;
        loop {
            if self.eat(&Token::Dot) {
                let Token::Ident(field) = self.peek().clone() else {
                    return Err(self.unexpected("a field name after '.'"));
                };
                self.advance();
                (expr, height) = self.node(Expr::Field(Box::new(expr), field), height)?;
            } else if self.eat(&Token::LBracket) {
                let (index, index_height) = self.expr()?;
                self.expect(Token::RBracket, "']'")?;
                let indexed = Expr::Index(Box::new(expr), Box::new(index));
                (expr, height) = self.node(indexed, height.max(index_height))?;
            } else {
                return Ok((expr, height));
            }
        }
    }

    fn primary(&mut self) -> Result<Parsed, ExprError> {
        let start = self.pos;
        match self.advance() {
            Token::Int(n) => Ok((Expr::Literal(Value::from(n)), 1)),
            Token::Float(f) => Ok((Expr::Literal(Value::from(f)), 1)),
            Token::Str(s) => Ok((Expr::Literal(Value::String(s)), 1)),
            Token::Ident(name) => {
                let literal = match name.as_str() {
                    "true" | "True" => Some(Value::Bool(true)),
                    "false" | "False" => Some(Value::Bool(false)),
                    "null" | "None" => Some(Value::Null),
                    _ => None,
                };
                match literal {
                    Some(value) => Ok((Expr::Literal(value), 1)),
                    None if *self.peek() == Token::LParen => self.call(name),
                    None => Ok((Expr::Var(name), 1)),
                }
            }
            Token::LParen => {
                let inner = self.expr()?;
                self.expect(Token::RParen, "')'")?;
                Ok(inner)
            }
            Token::LBracket => {
                let mut items = Vec::new();
                let mut height = 0;
                while !self.eat(&Token::RBracket) {
                    let (item, item_height) = self.expr()?;
                    items.push(item);
                    height = height.max(item_height);
                    if !self.eat(&Token::Comma) {
                        self.expect(Token::RBracket, "',' or ']'")?;
                        break;
                    }
                }
                self.node(Expr::List(items), height)
            }
            Token::LBrace => self.object(),
            _ => {
                self.pos = start;
                Err(self.unexpected("an expression"))
            }
        }
    }

    fn object(&mut self) -> Result<Parsed, ExprError> {
        let mut entries = Vec::new();
        let mut height = 0;
        while !self.eat(&Token::RBrace) {
            let key = match self.peek().clone() {
                Token::Str(key) | Token::Ident(key) => key,
                _ => return Err(self.unexpected("an object key")),
            };
            self.advance();
            self.expect(Token::Colon, "':'")?;
            let (value, value_height) = self.expr()?;
            entries.push((key, value));
            height = height.max(value_height);
            if !self.eat(&Token::Comma) {
                self.expect(Token::RBrace, "',' or '}'")?;
                break;
            }
        }
        self.node(Expr::Object(entries), height)
    }

    fn call(&mut self, name: String) -> Result<Parsed, ExprError> {
        let func = Func::from_name(&name).ok_or(ExprError::UnknownFunction(name))?;
        self.expect(Token::LParen, "'('")?;

        let mut args = Vec::new();
        let mut height = 0;
        while !self.eat(&Token::RParen) {
            let (arg, arg_height) = self.argument()?;
            args.push(arg);
            height = height.max(arg_height);
            if !self.eat(&Token::Comma) {
                self.expect(Token::RParen, "',' or ')'")?;
                break;
            }
        }
        self.node(Expr::Call(func, args), height)
    }

    fn argument(&mut self) -> Result<(Arg, usize), ExprError> {
        if let (Token::Ident(param), Token::Arrow) = (self.peek(), self.peek_at(1)) {
            let param = param.clone();
            self.advance();
            self.advance();
            let (body, height) = self.expr()?;
            return Ok((Arg::Lambda { param, body }, height));
        }
        let (expr, height) = self.expr()?;
        Ok((Arg::Value(expr), height))
    }
}

#[cfg(test)]
mod tests {
    use super::super::lexer::tokenize;
    use super::*;

    fn parse(src: &str) -> Expr {
        parse_expression(tokenize(src, false).unwrap()).unwrap()
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        assert_eq!(
            parse("1 + 2 * 3"),
            Expr::Binary(
                BinaryOp::Add,
                Box::new(Expr::Literal(Value::from(1))),
                Box::new(Expr::Binary(
                    BinaryOp::Mul,
                    Box::new(Expr::Literal(Value::from(2))),
                    Box::new(Expr::Literal(Value::from(3))),
                )),
            )
        );
    }

    #[test]
    fn lambda_arguments() {
        let expr = parse("filter(xs, x => x.ok)");
        let Expr::Call(Func::Filter, args) = expr else {
            panic!("expected a filter call");
        };
        assert_eq!(args.len(), 2);
        assert!(matches!(&args[1], Arg::Lambda { param, .. } if param == "x"));
    }

    #[test]
    fn trailing_commas_are_accepted() {
        assert_eq!(
            parse("[1, 2,]"),
            Expr::List(vec![Expr::Literal(Value::from(1)), Expr::Literal(Value::from(2))])
        );
        assert!(matches!(parse("{'a': 1,}"), Expr::Object(entries) if entries.len() == 1));
    }

    #[test]
    fn program_requires_separators() {
        let tokens = tokenize("a = 1 b = 2", true).unwrap();
        assert!(matches!(parse_program(tokens), Err(ExprError::Syntax { .. })));
    }
}
