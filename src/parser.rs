//! Recursive-descent parser, one-token lookahead.
//!
//! All binary operators except assignment are left-associative, implemented
//! by iterating rather than right-recursing: a right-recursive expression
//! parser misparses `1-2-3` as `(1-(2-3))`, so each precedence level loops
//! instead, producing `((1-2)-3)`.

use std::rc::Rc;

use crate::ast::{Expr, FunDecl, LiteralKind, Stmt};
use crate::error::ParseError;
use crate::token::{Token, TokenKind};

pub fn parse(tokens: Vec<Token>) -> (Vec<Stmt>, Vec<ParseError>) {
	let mut parser = Parser::new(tokens);
	let mut statements = Vec::new();
	let mut errors = Vec::new();

	while !parser.at_end() {
		match parser.declaration() {
			Ok(stmt) => statements.push(stmt),
			Err(err) => {
				log::warn!("{}; synchronizing", err.message);
				errors.push(err);
				parser.synchronize();
			}
		}
	}

	(statements, errors)
}

struct Parser {
	tokens: Vec<Token>,
	current: usize,
}

type PResult<T> = Result<T, ParseError>;

impl Parser {
	fn new(tokens: Vec<Token>) -> Parser {
		Parser { tokens, current: 0 }
	}

	// --- token stream helpers -------------------------------------------------

	fn peek(&self) -> &Token {
		&self.tokens[self.current]
	}

	fn previous(&self) -> &Token {
		&self.tokens[self.current - 1]
	}

	fn at_end(&self) -> bool {
		self.peek().kind == TokenKind::Eof
	}

	fn check(&self, kind: TokenKind) -> bool {
		!self.at_end() && self.peek().kind == kind
	}

	fn advance(&mut self) -> &Token {
		if !self.at_end() {
			self.current += 1;
		}
		self.previous()
	}

	fn matches(&mut self, kinds: &[TokenKind]) -> bool {
		for &kind in kinds {
			if self.check(kind) {
				self.advance();
				return true;
			}
		}
		false
	}

	fn consume(&mut self, kind: TokenKind, message: &str) -> PResult<&Token> {
		if self.check(kind) {
			Ok(self.advance())
		} else {
			Err(self.error(message))
		}
	}

	fn error(&self, message: impl Into<String>) -> ParseError {
		let token = self.peek();
		let message = message.into();
		let message = if token.kind == TokenKind::Eof {
			format!("incomplete statement — expected more tokens ({message})")
		} else {
			format!("{message} (got {})", token)
		};
		ParseError {
			message,
			line: token.line,
		}
	}

	/// Advance past the next semicolon (skipping any run of semicolons after
	/// it), then resume at the next statement. The sole recovery mechanism.
	fn synchronize(&mut self) {
		while !self.at_end() {
			if self.previous().kind == TokenKind::Semicolon {
				while self.check(TokenKind::Semicolon) {
					self.advance();
				}
				return;
			}
			self.advance();
		}
	}

	// --- statements ------------------------------------------------------------

	fn declaration(&mut self) -> PResult<Stmt> {
		if self.matches(&[TokenKind::Var]) {
			self.var_decl()
		} else if self.matches(&[TokenKind::Fun]) {
			self.fun_decl(false)
		} else if self.matches(&[TokenKind::Class]) {
			self.class_decl()
		} else {
			self.statement()
		}
	}

	fn var_decl(&mut self) -> PResult<Stmt> {
		let name = self
			.consume(TokenKind::Identifier, "expected identifier after 'var'")?
			.clone();
		let initializer = if self.matches(&[TokenKind::Equal]) {
			Some(self.expression()?)
		} else {
			None
		};
		self.consume(TokenKind::Semicolon, "expected ';' after variable declaration")?;
		Ok(Stmt::VarDecl { name, initializer })
	}

	fn fun_decl(&mut self, is_method: bool) -> PResult<Stmt> {
		Ok(Stmt::Fun(Rc::new(self.fun_body(is_method)?)))
	}

	fn fun_body(&mut self, is_method: bool) -> PResult<FunDecl> {
		let kind = if is_method { "method" } else { "function" };
		let name = self
			.consume(TokenKind::Identifier, &format!("expected {kind} name"))?
			.clone();
		self.consume(TokenKind::LeftParen, &format!("expected '(' after {kind} name"))?;
		let mut params = Vec::new();
		if !self.check(TokenKind::RightParen) {
			loop {
				if self.check(TokenKind::RightParen) {
					return Err(self.error("expected parameter after ','"));
				}
				params.push(
					self.consume(TokenKind::Identifier, "expected parameter name")?
						.clone(),
				);
				if !self.matches(&[TokenKind::Comma]) {
					break;
				}
			}
		}
		self.consume(TokenKind::RightParen, "expected ')' after parameters")?;
		self.consume(TokenKind::LeftBrace, &format!("expected '{{' before {kind} body"))?;
		let body = self.block()?;
		Ok(FunDecl {
			name,
			params,
			body: Rc::new(body),
			is_method,
		})
	}

	fn class_decl(&mut self) -> PResult<Stmt> {
		let name = self
			.consume(TokenKind::Identifier, "expected class name")?
			.clone();
		let superclass = if self.matches(&[TokenKind::Less]) {
			Some(
				self.consume(TokenKind::Identifier, "expected superclass name after '<'")?
					.clone(),
			)
		} else {
			None
		};
		self.consume(TokenKind::LeftBrace, "expected '{' before class body")?;
		let mut methods = Vec::new();
		while !self.check(TokenKind::RightBrace) && !self.at_end() {
			methods.push(Rc::new(self.fun_body(true)?));
		}
		self.consume(TokenKind::RightBrace, "expected '}' after class body")?;
		Ok(Stmt::Class {
			name,
			superclass,
			methods,
		})
	}

	fn statement(&mut self) -> PResult<Stmt> {
		if self.matches(&[TokenKind::Print]) {
			self.print_stmt()
		} else if self.matches(&[TokenKind::LeftBrace]) {
			Ok(Stmt::Block(self.block()?))
		} else if self.matches(&[TokenKind::If]) {
			self.if_stmt()
		} else if self.matches(&[TokenKind::While]) {
			self.while_stmt()
		} else if self.matches(&[TokenKind::For]) {
			self.for_stmt()
		} else if self.matches(&[TokenKind::Return]) {
			self.return_stmt()
		} else {
			self.expr_stmt()
		}
	}

	fn block(&mut self) -> PResult<Vec<Stmt>> {
		let mut statements = Vec::new();
		while !self.check(TokenKind::RightBrace) && !self.at_end() {
			statements.push(self.declaration()?);
		}
		self.consume(TokenKind::RightBrace, "expected '}' after block")?;
		Ok(statements)
	}

	fn print_stmt(&mut self) -> PResult<Stmt> {
		let value = self.expression()?;
		self.consume(TokenKind::Semicolon, "expected ';' after value")?;
		Ok(Stmt::Print(value))
	}

	fn expr_stmt(&mut self) -> PResult<Stmt> {
		let expr = self.expression()?;
		self.consume(TokenKind::Semicolon, "expected ';' after expression")?;
		Ok(Stmt::Expression(expr))
	}

	fn if_stmt(&mut self) -> PResult<Stmt> {
		self.consume(TokenKind::LeftParen, "expected '(' after 'if'")?;
		let condition = self.expression()?;
		self.consume(TokenKind::RightParen, "expected ')' after if condition")?;
		let then_branch = Box::new(self.statement()?);
		let else_branch = if self.matches(&[TokenKind::Else]) {
			Some(Box::new(self.statement()?))
		} else {
			None
		};
		Ok(Stmt::If {
			condition,
			then_branch,
			else_branch,
		})
	}

	fn while_stmt(&mut self) -> PResult<Stmt> {
		self.consume(TokenKind::LeftParen, "expected '(' after 'while'")?;
		let condition = self.expression()?;
		self.consume(TokenKind::RightParen, "expected ')' after while condition")?;
		let body = Box::new(self.statement()?);
		Ok(Stmt::While { condition, body })
	}

	fn for_stmt(&mut self) -> PResult<Stmt> {
		self.consume(TokenKind::LeftParen, "expected '(' after 'for'")?;

		let initializer = if self.matches(&[TokenKind::Semicolon]) {
			None
		} else if self.matches(&[TokenKind::Var]) {
			Some(Box::new(self.var_decl()?))
		} else {
			Some(Box::new(self.expr_stmt()?))
		};

		let condition = if !self.check(TokenKind::Semicolon) {
			Some(self.expression()?)
		} else {
			None
		};
		self.consume(TokenKind::Semicolon, "expected ';' after loop condition")?;

		let increment = if !self.check(TokenKind::RightParen) {
			Some(self.expression()?)
		} else {
			None
		};
		self.consume(TokenKind::RightParen, "expected ')' after for clauses")?;

		let body = Box::new(self.statement()?);

		Ok(Stmt::For {
			initializer,
			condition,
			increment,
			body,
		})
	}

	fn return_stmt(&mut self) -> PResult<Stmt> {
		let keyword = self.previous().clone();
		let value = if !self.check(TokenKind::Semicolon) {
			Some(self.expression()?)
		} else {
			None
		};
		self.consume(TokenKind::Semicolon, "expected ';' after return value")?;
		Ok(Stmt::Return { keyword, value })
	}

	// --- expressions -------------------------------------------------------------

	fn expression(&mut self) -> PResult<Expr> {
		self.assignment()
	}

	/// `(IDENT | call "." IDENT) "=" assignment | equality` — right-associative;
	/// only a bare variable or a property access may appear on the left of `=`.
	fn assignment(&mut self) -> PResult<Expr> {
		let expr = self.equality()?;

		if self.matches(&[TokenKind::Equal]) {
			let equals = self.previous().clone();
			let value = self.assignment()?;

			return match expr {
				Expr::Variable { name } => Ok(Expr::Assign {
					name,
					value: Box::new(value),
				}),
				Expr::Get { object, name } => Ok(Expr::Set {
					object,
					name,
					value: Box::new(value),
				}),
				_ => Err(ParseError {
					message: "cannot assign to r-value".to_string(),
					line: equals.line,
				}),
			};
		}

		Ok(expr)
	}

	fn equality(&mut self) -> PResult<Expr> {
		self.left_associative_binary(
			&[TokenKind::BangEqual, TokenKind::EqualEqual],
			Self::comparison,
		)
	}

	fn comparison(&mut self) -> PResult<Expr> {
		self.left_associative_binary(
			&[
				TokenKind::Greater,
				TokenKind::GreaterEqual,
				TokenKind::Less,
				TokenKind::LessEqual,
			],
			Self::term,
		)
	}

	fn term(&mut self) -> PResult<Expr> {
		self.left_associative_binary(&[TokenKind::Minus, TokenKind::Plus], Self::factor)
	}

	fn factor(&mut self) -> PResult<Expr> {
		self.left_associative_binary(&[TokenKind::Slash, TokenKind::Star], Self::unary)
	}

	/// Shared left-associative loop for `equality`/`comparison`/`term`/`factor`:
	/// parse one operand at the next-higher precedence, then keep folding in
	/// `(operator, operand)` pairs left-to-right instead of recursing.
	fn left_associative_binary(
		&mut self,
		operators: &[TokenKind],
		mut operand: impl FnMut(&mut Self) -> PResult<Expr>,
	) -> PResult<Expr> {
		let mut expr = operand(self)?;
		while self.matches(operators) {
			let operator = self.previous().clone();
			let right = operand(self)?;
			expr = Expr::Binary {
				left: Box::new(expr),
				operator,
				right: Box::new(right),
			};
		}
		Ok(expr)
	}

	fn unary(&mut self) -> PResult<Expr> {
		if self.matches(&[TokenKind::Bang, TokenKind::Minus]) {
			let operator = self.previous().clone();
			let right = self.unary()?;
			return Ok(Expr::Unary {
				operator,
				right: Box::new(right),
			});
		}
		self.call()
	}

	/// `primary ( "(" args? ")" | "." IDENT )*` — property and call chains
	/// apply left-to-right, producing nested `Call`/`Get` nodes.
	fn call(&mut self) -> PResult<Expr> {
		let mut expr = self.primary()?;

		loop {
			if self.matches(&[TokenKind::LeftParen]) {
				expr = self.finish_call(expr)?;
			} else if self.matches(&[TokenKind::Dot]) {
				let name = self
					.consume(TokenKind::Identifier, "expected property name after '.'")?
					.clone();
				expr = Expr::Get {
					object: Box::new(expr),
					name,
				};
			} else {
				break;
			}
		}

		Ok(expr)
	}

	fn finish_call(&mut self, callee: Expr) -> PResult<Expr> {
		let mut arguments = Vec::new();
		if !self.check(TokenKind::RightParen) {
			loop {
				if self.check(TokenKind::RightParen) {
					return Err(self.error("trailing comma before ')'"));
				}
				arguments.push(self.expression()?);
				if !self.matches(&[TokenKind::Comma]) {
					break;
				}
			}
		}
		let paren = self
			.consume(TokenKind::RightParen, "expected ')' after arguments")?
			.clone();
		Ok(Expr::Call {
			callee: Box::new(callee),
			paren,
			arguments,
		})
	}

	/// `NUMBER|STRING|"true"|"false"|"nil"|IDENT | "(" expression ")"`.
	///
	/// `this`/`super` are not dedicated AST nodes; they parse as ordinary
	/// `Variable` references and are resolved by plain environment lookup.
	fn primary(&mut self) -> PResult<Expr> {
		let token = self.peek().clone();
		match token.kind {
			TokenKind::False => {
				self.advance();
				Ok(Expr::Literal {
					lexeme: token.lexeme,
					kind: LiteralKind::False,
				})
			}
			TokenKind::True => {
				self.advance();
				Ok(Expr::Literal {
					lexeme: token.lexeme,
					kind: LiteralKind::True,
				})
			}
			TokenKind::Nil => {
				self.advance();
				Ok(Expr::Literal {
					lexeme: token.lexeme,
					kind: LiteralKind::Nil,
				})
			}
			TokenKind::Number => {
				self.advance();
				Ok(Expr::Literal {
					lexeme: token.lexeme,
					kind: LiteralKind::Number,
				})
			}
			TokenKind::String => {
				self.advance();
				Ok(Expr::Literal {
					lexeme: token.lexeme,
					kind: LiteralKind::String,
				})
			}
			TokenKind::This | TokenKind::Super | TokenKind::Identifier => {
				self.advance();
				Ok(Expr::Variable { name: token })
			}
			TokenKind::LeftParen => {
				self.advance();
				let expr = self.expression()?;
				self.consume(TokenKind::RightParen, "expected ')' after expression")?;
				Ok(Expr::Grouping(Box::new(expr)))
			}
			_ => Err(self.error("expected expression")),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::scanner::scan;

	fn parse_src(src: &str) -> (Vec<Stmt>, Vec<ParseError>) {
		let (tokens, errors) = scan(src);
		assert!(errors.is_empty());
		parse(tokens)
	}

	#[test]
	fn parses_var_decl_and_print() {
		let (stmts, errors) = parse_src("var a = 3; print a;");
		assert!(errors.is_empty());
		assert_eq!(stmts.len(), 2);
	}

	#[test]
	fn missing_semicolon_is_reported_and_recovers() {
		let (stmts, errors) = parse_src("var a = 3\nvar b = 4;");
		assert_eq!(errors.len(), 1);
		// synchronize skips past the next ';', so only `var b` survives
		assert_eq!(stmts.len(), 1);
	}

	#[test]
	fn assigning_to_non_lvalue_is_an_error() {
		let (_stmts, errors) = parse_src("1 = 2;");
		assert_eq!(errors.len(), 1);
		assert!(errors[0].message.contains("r-value"));
	}

	#[test]
	fn trailing_comma_in_call_args_is_an_error() {
		let (_stmts, errors) = parse_src("foo(1, 2,);");
		assert_eq!(errors.len(), 1);
	}

	#[test]
	fn class_with_superclass_and_methods() {
		let (stmts, errors) = parse_src("class B < A { greet() { return 1; } }");
		assert!(errors.is_empty(), "{:?}", errors);
		match &stmts[0] {
			Stmt::Class { superclass, methods, .. } => {
				assert!(superclass.is_some());
				assert_eq!(methods.len(), 1);
			}
			other => panic!("expected class, got {:?}", other),
		}
	}

	#[test]
	fn for_loop_parses_all_clauses() {
		let (stmts, errors) = parse_src("for (var i = 0; i < 10; i = i + 1) print i;");
		assert!(errors.is_empty(), "{:?}", errors);
		match &stmts[0] {
			Stmt::For {
				initializer,
				condition,
				increment,
				..
			} => {
				assert!(initializer.is_some());
				assert!(condition.is_some());
				assert!(increment.is_some());
			}
			other => panic!("expected for, got {:?}", other),
		}
	}

	#[test]
	fn premature_eof_is_reported() {
		let (_stmts, errors) = parse_src("var a =");
		assert_eq!(errors.len(), 1);
		assert!(errors[0].message.contains("incomplete statement"));
	}
}
