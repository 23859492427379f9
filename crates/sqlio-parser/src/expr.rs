//! Expression parser
//!
//! Pratt parser. Binding powers, lowest first:
//!
//! | level      | operators                                   |
//! |------------|---------------------------------------------|
//! | or         | `OR`                                        |
//! | and        | `AND`                                       |
//! | not        | prefix `NOT`                                |
//! | comparison | `= != < <= > >= IN NOT IN IS IS NOT`        |
//! | term       | `+ -`                                       |
//! | factor     | `* /`                                       |
//! | unary      | prefix `-`                                  |

use crate::ast::{BinaryOp, Expr, Literal, Name};
use crate::error::Result;
use crate::parser::Parser;
use crate::token::TokenKind;

mod bp {
    pub const OR: (u8, u8) = (1, 2);
    pub const AND: (u8, u8) = (3, 4);
    pub const NOT: u8 = 5;
    pub const COMPARISON: (u8, u8) = (7, 8);
    pub const TERM: (u8, u8) = (9, 10);
    pub const FACTOR: (u8, u8) = (11, 12);
    pub const UNARY: u8 = 13;
}

impl Parser {
    /// Parse one expression
    pub fn expr(&mut self) -> Result<Expr> {
        self.expr_bp(0)
    }

    fn expr_bp(&mut self, min_bp: u8) -> Result<Expr> {
        let mut lhs = self.prefix()?;
        while let Some((op, width, (l_bp, r_bp))) = self.infix() {
            if l_bp < min_bp {
                break;
            }
            self.pos += width;
            let rhs = self.expr_bp(r_bp)?;
            lhs = Expr::binary(lhs, op, rhs);
        }
        Ok(lhs)
    }

    /// Operator at the cursor, the number of tokens it spans and its binding power
    fn infix(&self) -> Option<(BinaryOp, usize, (u8, u8))> {
        let op = match self.peek_kind() {
            TokenKind::Plus => (BinaryOp::Add, 1, bp::TERM),
            TokenKind::Minus => (BinaryOp::Sub, 1, bp::TERM),
            TokenKind::Star => (BinaryOp::Mul, 1, bp::FACTOR),
            TokenKind::Slash => (BinaryOp::Div, 1, bp::FACTOR),
            TokenKind::Eq => (BinaryOp::Eq, 1, bp::COMPARISON),
            TokenKind::Ne => (BinaryOp::Ne, 1, bp::COMPARISON),
            TokenKind::Lt => (BinaryOp::Lt, 1, bp::COMPARISON),
            TokenKind::Le => (BinaryOp::Le, 1, bp::COMPARISON),
            TokenKind::Gt => (BinaryOp::Gt, 1, bp::COMPARISON),
            TokenKind::Ge => (BinaryOp::Ge, 1, bp::COMPARISON),
            k if k.is_word("AND") => (BinaryOp::And, 1, bp::AND),
            k if k.is_word("OR") => (BinaryOp::Or, 1, bp::OR),
            k if k.is_word("IN") => (BinaryOp::In, 1, bp::COMPARISON),
            k if k.is_word("IS") && self.peek_nth(1).is_word("NOT") => (BinaryOp::IsNot, 2, bp::COMPARISON),
            k if k.is_word("IS") => (BinaryOp::Is, 1, bp::COMPARISON),
            k if k.is_word("NOT") && self.peek_nth(1).is_word("IN") => (BinaryOp::NotIn, 2, bp::COMPARISON),
            _ => return None,
        };
        Some(op)
    }

    fn prefix(&mut self) -> Result<Expr> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Integer(n) => {
                self.pos += 1;
                Ok(Expr::Literal(Literal::Int(n)))
            }
            TokenKind::Numeric(n) => {
                self.pos += 1;
                Ok(Expr::Literal(Literal::Numeric(n)))
            }
            TokenKind::String(s) => {
                self.pos += 1;
                Ok(Expr::Literal(Literal::String(s)))
            }
            TokenKind::Placeholder(p) => {
                self.pos += 1;
                Ok(Expr::Placeholder(p))
            }
            TokenKind::Minus => {
                self.pos += 1;
                Ok(Expr::Neg(Box::new(self.expr_bp(bp::UNARY)?)))
            }
            TokenKind::Star => {
                self.pos += 1;
                self.star(None)
            }
            TokenKind::LParen => {
                self.pos += 1;
                self.parenthesized()
            }
            ref k if k.is_word("NOT") => {
                self.pos += 1;
                Ok(Expr::Not(Box::new(self.expr_bp(bp::NOT)?)))
            }
            ref k if k.is_word("NULL") => {
                self.pos += 1;
                Ok(Expr::Literal(Literal::Null))
            }
            ref k if k.is_word("TRUE") => {
                self.pos += 1;
                Ok(Expr::Literal(Literal::Bool(true)))
            }
            ref k if k.is_word("FALSE") => {
                self.pos += 1;
                Ok(Expr::Literal(Literal::Bool(false)))
            }
            ref k if k.is_word("CASE") => {
                self.pos += 1;
                self.case()
            }
            _ if self.at_ident() => self.operand(),
            _ => Err(self.unexpected("expression")),
        }
    }

    /// `*` already consumed
    fn star(&mut self, qualifier: Option<Name>) -> Result<Expr> {
        let except = if self.eat_word("EXCEPT") {
            self.expect(&TokenKind::LParen)?;
            let cols = self.comma_list(Self::ident)?;
            self.expect(&TokenKind::RParen)?;
            cols
        } else {
            Vec::new()
        };
        Ok(Expr::Star { qualifier, except })
    }

    /// `(` already consumed
    fn parenthesized(&mut self) -> Result<Expr> {
        if self.at_word("SELECT") || self.at_word("WITH") {
            let sub = self.select()?;
            self.expect(&TokenKind::RParen)?;
            return Ok(Expr::Subquery(Box::new(sub)));
        }
        let mut items = self.comma_list(Self::expr)?;
        self.expect(&TokenKind::RParen)?;
        Ok(match items.len() {
            1 => Expr::Nested(Box::new(items.remove(0))),
            _ => Expr::List(items),
        })
    }

    /// Identifier, selector, qualified star or function call
    fn operand(&mut self) -> Result<Expr> {
        let mut parts = vec![self.ident()?];
        while self.peek_kind() == &TokenKind::Dot {
            self.pos += 1;
            if self.eat(&TokenKind::Star) {
                return self.star(Some(Name(parts)));
            }
            parts.push(self.ident()?);
        }
        if self.eat(&TokenKind::LParen) {
            return self.call(Name(parts));
        }
        Ok(if parts.len() == 1 {
            Expr::Ident(parts.remove(0))
        } else {
            Expr::Selector(Name(parts))
        })
    }

    /// `name(` already consumed
    fn call(&mut self, name: Name) -> Result<Expr> {
        let distinct = self.eat_word("DISTINCT");
        let args = if self.peek_kind() == &TokenKind::RParen {
            Vec::new()
        } else {
            self.comma_list(Self::expr)?
        };
        self.expect(&TokenKind::RParen)?;
        Ok(Expr::Call {
            name,
            distinct,
            args,
        })
    }

    /// `CASE` already consumed
    fn case(&mut self) -> Result<Expr> {
        let operand = if self.at_word("WHEN") {
            None
        } else {
            Some(Box::new(self.expr()?))
        };
        let mut whens = Vec::new();
        while self.eat_word("WHEN") {
            let when = self.expr()?;
            self.expect_word("THEN")?;
            whens.push((when, self.expr()?));
        }
        if whens.is_empty() {
            return Err(self.unexpected("WHEN"));
        }
        let otherwise = if self.eat_word("ELSE") {
            Some(Box::new(self.expr()?))
        } else {
            None
        };
        self.expect_word("END")?;
        Ok(Expr::Case {
            operand,
            whens,
            otherwise,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Ident;

    fn parse(sql: &str) -> Expr {
        let mut p = Parser::new(sql).unwrap();
        let e = p.expr().unwrap();
        p.finish().unwrap();
        e
    }

    fn ident(name: &str) -> Expr {
        Expr::Ident(Ident::new(name))
    }

    #[test]
    fn test_precedence() {
        let e = parse("a + b * c");
        assert_eq!(
            e,
            Expr::binary(
                ident("a"),
                BinaryOp::Add,
                Expr::binary(ident("b"), BinaryOp::Mul, ident("c"))
            )
        );

        let e = parse("a = 1 OR b = 2 AND c = 3");
        let Expr::Binary { op, right, .. } = e else {
            panic!("not binary");
        };
        assert_eq!(op, BinaryOp::Or);
        assert!(matches!(*right, Expr::Binary { op: BinaryOp::And, .. }));
    }

    #[test]
    fn test_left_associative() {
        assert_eq!(
            parse("a - b - c"),
            Expr::binary(
                Expr::binary(ident("a"), BinaryOp::Sub, ident("b")),
                BinaryOp::Sub,
                ident("c")
            )
        );
    }

    #[test]
    fn test_not_binds_below_comparison() {
        assert_eq!(
            parse("NOT a = b"),
            Expr::Not(Box::new(Expr::binary(ident("a"), BinaryOp::Eq, ident("b"))))
        );
    }

    #[test]
    fn test_two_word_operators() {
        assert!(matches!(parse("a IS NOT NULL"), Expr::Binary { op: BinaryOp::IsNot, .. }));
        let e = parse("id NOT IN (1, 2)");
        let Expr::Binary { op, right, .. } = e else {
            panic!("not binary");
        };
        assert_eq!(op, BinaryOp::NotIn);
        assert_eq!(
            *right,
            Expr::List(vec![Expr::Literal(Literal::Int(1)), Expr::Literal(Literal::Int(2))])
        );
    }

    #[test]
    fn test_operands() {
        assert!(matches!(parse("t.col"), Expr::Selector(Name(ref p)) if p.len() == 2));
        assert!(matches!(parse("t.*"), Expr::Star { qualifier: Some(_), .. }));
        assert!(matches!(parse("count(DISTINCT x)"), Expr::Call { distinct: true, .. }));
        assert!(matches!(parse("now()"), Expr::Call { ref args, .. } if args.is_empty()));
        assert!(matches!(parse("(a)"), Expr::Nested(_)));
        assert!(matches!(parse("-1"), Expr::Neg(_)));
        assert_eq!(parse("$1"), Expr::Placeholder("$1".into()));
    }

    #[test]
    fn test_case() {
        let e = parse("CASE WHEN a > 1 THEN 'x' ELSE 'y' END");
        let Expr::Case {
            operand,
            whens,
            otherwise,
        } = e
        else {
            panic!("not case");
        };
        assert!(operand.is_none());
        assert_eq!(whens.len(), 1);
        assert!(otherwise.is_some());

        let mut p = Parser::new("CASE a END").unwrap();
        assert!(p.expr().is_err());
    }
}
