//! The source-character scanner: a single left-to-right pass over the raw
//! source, producing the flat token stream the parser consumes. One- and
//! two-character symbol lookahead, strings spanning newlines, decimal
//! numbers with at most one dot.

use crate::error::{ErrorList, SyntaxError};
use crate::token::{Token, TokenKind};

pub fn scan(source: &str) -> (Vec<Token>, Vec<SyntaxError>) {
	let mut scanner = Scanner::new(source);
	scanner.run();
	(scanner.tokens, scanner.errors.into_vec())
}

struct Scanner<'a> {
	source: &'a [u8],
	tokens: Vec<Token>,
	errors: ErrorList<SyntaxError>,
	start: usize,
	current: usize,
	line: usize,
}

impl<'a> Scanner<'a> {
	fn new(source: &'a str) -> Scanner<'a> {
		Scanner {
			source: source.as_bytes(),
			tokens: Vec::new(),
			errors: ErrorList::new(),
			start: 0,
			current: 0,
			line: 1,
		}
	}

	fn run(&mut self) {
		while !self.at_end() {
			self.start = self.current;
			self.scan_token();
		}
		self.tokens.push(Token::new(TokenKind::Eof, "", self.line));
	}

	fn at_end(&self) -> bool {
		self.current >= self.source.len()
	}

	fn advance(&mut self) -> u8 {
		let c = self.source[self.current];
		self.current += 1;
		c
	}

	fn peek(&self) -> u8 {
		if self.at_end() {
			0
		} else {
			self.source[self.current]
		}
	}

	fn peek_next(&self) -> u8 {
		if self.current + 1 >= self.source.len() {
			0
		} else {
			self.source[self.current + 1]
		}
	}

	fn matches(&mut self, expected: u8) -> bool {
		if self.at_end() || self.source[self.current] != expected {
			return false;
		}
		self.current += 1;
		true
	}

	fn lexeme(&self) -> &str {
		std::str::from_utf8(&self.source[self.start..self.current]).unwrap_or("")
	}

	fn add(&mut self, kind: TokenKind) {
		let lexeme = self.lexeme().to_string();
		self.tokens.push(Token::new(kind, lexeme, self.line));
	}

	fn error(&mut self, message: impl Into<String>) {
		self.errors.push(SyntaxError {
			message: message.into(),
			line: self.line,
		});
	}

	fn scan_token(&mut self) {
		let c = self.advance();
		use TokenKind::*;
		match c {
			b'(' => self.add(LeftParen),
			b')' => self.add(RightParen),
			b'{' => self.add(LeftBrace),
			b'}' => self.add(RightBrace),
			b',' => self.add(Comma),
			b'.' => self.add(Dot),
			b'-' => self.add(Minus),
			b'+' => self.add(Plus),
			b';' => self.add(Semicolon),
			b'*' => self.add(Star),
			b'!' => {
				let kind = if self.matches(b'=') { BangEqual } else { Bang };
				self.add(kind);
			}
			b'=' => {
				let kind = if self.matches(b'=') { EqualEqual } else { Equal };
				self.add(kind);
			}
			b'<' => {
				let kind = if self.matches(b'=') { LessEqual } else { Less };
				self.add(kind);
			}
			b'>' => {
				let kind = if self.matches(b'=') { GreaterEqual } else { Greater };
				self.add(kind);
			}
			b'/' => {
				if self.matches(b'/') {
					while self.peek() != b'\n' && !self.at_end() {
						self.advance();
					}
				} else {
					self.add(Slash);
				}
			}
			b' ' | b'\r' | b'\t' => {}
			b'\n' => self.line += 1,
			b'"' => self.scan_string(),
			b'0'..=b'9' => self.scan_number(),
			c if is_alpha(c) => self.scan_identifier(),
			other => {
				self.error(format!("unexpected character '{}'", other as char));
			}
		}
	}

	fn scan_string(&mut self) {
		while self.peek() != b'"' && !self.at_end() {
			if self.peek() == b'\n' {
				self.line += 1;
			}
			self.advance();
		}

		if self.at_end() {
			self.error("unterminated string");
			return;
		}

		// closing quote
		self.advance();

		let content =
			std::str::from_utf8(&self.source[self.start + 1..self.current - 1]).unwrap_or("");
		let content = content.to_string();
		self.tokens
			.push(Token::new(TokenKind::String, content, self.line));
	}

	fn scan_number(&mut self) {
		while self.peek().is_ascii_digit() {
			self.advance();
		}

		if self.peek() == b'.' && self.peek_next().is_ascii_digit() {
			self.advance();
			while self.peek().is_ascii_digit() {
				self.advance();
			}
		} else if self.peek() == b'.' {
			// trailing dot with no following digit is an error
			self.advance();
			self.error("trailing '.' in number literal");
			return;
		}

		self.add(TokenKind::Number);
	}

	fn scan_identifier(&mut self) {
		while is_alphanumeric(self.peek()) {
			self.advance();
		}
		let text = self.lexeme();
		let kind = TokenKind::keyword(text).unwrap_or(TokenKind::Identifier);
		self.add(kind);
	}
}

fn is_alpha(c: u8) -> bool {
	c.is_ascii_alphabetic() || c == b'_'
}

fn is_alphanumeric(c: u8) -> bool {
	is_alpha(c) || c.is_ascii_digit()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn kinds(src: &str) -> Vec<TokenKind> {
		let (tokens, errors) = scan(src);
		assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
		tokens.into_iter().map(|t| t.kind).collect()
	}

	#[test]
	fn scans_single_and_double_char_symbols() {
		use TokenKind::*;
		assert_eq!(
			kinds("!= == <= >= ="),
			vec![BangEqual, EqualEqual, LessEqual, GreaterEqual, Equal, Eof]
		);
	}

	#[test]
	fn scans_keywords_case_sensitively() {
		use TokenKind::*;
		assert_eq!(kinds("if"), vec![If, Eof]);
		assert_eq!(kinds("If"), vec![Identifier, Eof]);
	}

	#[test]
	fn strings_span_newlines_and_track_line() {
		let (tokens, errors) = scan("\"a\nb\" print;");
		assert!(errors.is_empty());
		assert_eq!(tokens[0].kind, TokenKind::String);
		assert_eq!(tokens[0].lexeme, "a\nb");
		// the Print token is on line 2
		assert_eq!(tokens[1].line, 2);
	}

	#[test]
	fn unterminated_string_is_reported_but_does_not_stop_scanning() {
		let (tokens, errors) = scan("\"abc print 1;");
		assert_eq!(errors.len(), 1);
		assert_eq!(tokens, vec![Token::new(TokenKind::Eof, "", 1)]);
	}

	#[test]
	fn trailing_dot_in_number_is_an_error() {
		let (_tokens, errors) = scan("1.;");
		assert_eq!(errors.len(), 1);
	}

	#[test]
	fn numbers_and_identifiers() {
		use TokenKind::*;
		assert_eq!(kinds("123 12.5 abc_1"), vec![Number, Number, Identifier, Eof]);
	}

	#[test]
	fn comments_are_skipped() {
		use TokenKind::*;
		assert_eq!(kinds("1 // comment\n2"), vec![Number, Number, Eof]);
	}
}
