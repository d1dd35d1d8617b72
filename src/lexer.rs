use crate::tokens::{LabelTarget, Program, Statement, Token, TokenType};

/// Every operator lexeme the language understands. An `Operator` token that closes with any other value is a syntax error.
static KNOWN_OPERATORS: phf::Set<&'static str> = phf::phf_set! {
	"<", "<=", "==", ">=", ">", "!=", "+", "-", "*", "/", "%", "^", "++", "--", "=", "<<",
};

/// The reference values that are reclassified into `Flow` tokens when they close.
static FLOW_KEYWORDS: phf::Set<&'static str> = phf::phf_set! {
	"break", "goto", "if",
};

/// Tokenizes a string of Kabap source code into a program: a list of statements, each an ordered list of tokens, plus the label table collected along the
/// way. This is the first step in running Kabap code; The returned program can be optimised and then executed, or serialised to the token interchange
/// format.
///
/// The scanner makes a single pass over the characters plus one sentinel pass after the end of the buffer. Whitespace and comments are discarded; A line
/// hint statement is recorded before the first line, at every newline and at the end of the source (consecutive hints collapse to the latest, and a
/// trailing hint is dropped), so later phases can report the source line an error occurred on.
///
/// # Parameters
/// - `source`: The Kabap source code.
///
/// # Returns
/// The tokenized program, or an `Err` describing the first syntax error found. Error messages are prefixed with `Line <n>: `.
///
/// # Errors
/// If the given source is not syntactically valid Kabap code.
pub fn tokenize(source: &str) -> anyhow::Result<Program> {
	// Persisted token text must go through the `.kat` loader, which knows how to apply the header; Refuse it here.
	let head = source.chars().take(64).collect::<String>().to_lowercase();
	if head.contains("kabap=tokens") {
		anyhow::bail!("Cannot load tokens as a script");
	}

	let mut tokenizer = Tokenizer::new();
	for character in source.chars() {
		tokenizer.scan(character)?;
	}
	tokenizer.finish()
}

/// The scanner state: the program assembled so far, the statement buffer being filled, the currently open token, and the bookkeeping the inline sanity
/// checks need (block nesting, the pending-conditional flag, comment adjacency).
struct Tokenizer {
	/// The program assembled so far.
	program: Program,

	/// The tokens of the statement currently being assembled.
	statement: Vec<Token>,

	/// The currently open token. `Null` when no token is being accumulated.
	open: Token,

	/// The current 1-based source line.
	line: usize,

	/// The current block nesting depth.
	nesting: usize,

	/// Set when an `if` closes; Cleared when a following statement is flushed. While set, a label or block end is a syntax error, and reaching the end of
	/// the source is too.
	conditional_pending: bool,

	/// Whether the pending conditional was opened inside the statement currently being assembled. The conditional's own statement must not clear the flag
	/// when it flushes.
	conditional_in_statement: bool,

	/// Whether the last thing scanned was a comment. A statement end with an empty buffer is only legal straight after a comment.
	after_comment: bool,

	/// Whether the previous character inside a string was the escape backslash.
	escaped: bool,
}

impl Tokenizer {
	fn new() -> Self {
		let mut tokenizer = Self {
			program: Program::default(),
			statement: Vec::new(),
			open: Token::empty(TokenType::Null),
			line: 1,
			nesting: 0,
			conditional_pending: false,
			conditional_in_statement: false,
			after_comment: false,
			escaped: false,
		};
		tokenizer.emit_line_hint();
		tokenizer
	}

	/// Builds an error carrying the current source line.
	fn error(&self, message: impl AsRef<str>) -> anyhow::Error {
		anyhow::anyhow!("Line {}: {}", self.line, message.as_ref())
	}

	/// Scans a single character, updating the open token, the statement buffer and the program.
	fn scan(&mut self, character: char) -> anyhow::Result<()> {
		// A string consumes everything up to its closing quote. A backslash escapes the character after it, which is appended verbatim.
		if self.open.token_type == TokenType::String {
			if self.escaped {
				self.escaped = false;
				self.open.value.push(character);
				return Ok(());
			}
			return match character {
				'\\' => {
					self.escaped = true;
					Ok(())
				},
				'"' => {
					let token = std::mem::replace(&mut self.open, Token::empty(TokenType::Null));
					self.append(token)
				},
				'\n' => self.end_of_line(false),
				_ => {
					self.open.value.push(character);
					Ok(())
				},
			};
		}

		// A comment consumes everything up to the end of the line.
		if self.open.token_type == TokenType::Comment {
			if character == '\n' {
				self.open = Token::empty(TokenType::Null);
				self.after_comment = true;
				return self.end_of_line(false);
			}
			return Ok(());
		}

		// Continuations of the open token.
		match self.open.token_type {
			TokenType::Operator => {
				// A second forward slash turns the open operator into a comment.
				if self.open.value == "/" && character == '/' {
					self.open = Token::empty(TokenType::Comment);
					return Ok(());
				}
				if is_operator_character(character) {
					self.open.value.push(character);
					return Ok(());
				}
			},
			TokenType::Reference => {
				if character == '.' || character == '_' || character.is_ascii_alphanumeric() {
					self.open.value.push(character);
					return Ok(());
				}
			},
			TokenType::Number => {
				if character.is_ascii_digit() || character == '.' {
					self.open.value.push(character);
					return Ok(());
				}
			},
			_ => {},
		}

		// The character does not continue the open token; Close it and classify the character fresh.
		match character {
			'"' => {
				self.close_open()?;
				self.open = Token::empty(TokenType::String);
			},
			' ' | '\t' | '\0' | '\r' => self.close_open()?,
			'\n' => return self.end_of_line(false),
			'{' => {
				self.close_open()?;
				self.nesting += 1;
				self.append(Token::new(TokenType::BlockStart, "{"))?;
				self.flush()?;
			},
			'}' => {
				self.close_open()?;
				if self.conditional_pending {
					return Err(self.error(format!("A conditional cannot be followed by a {}", TokenType::BlockEnd)));
				}
				if self.nesting == 0 {
					return Err(self.error("Closing unopened block"));
				}
				self.nesting -= 1;
				self.append(Token::new(TokenType::BlockEnd, "}"))?;
				self.flush()?;
			},
			';' => {
				self.close_open()?;
				if self.statement.is_empty() {
					// An empty statement is only excused when a comment swallowed its content.
					if !self.after_comment {
						return Err(self.error("Missing statement"));
					}
					self.after_comment = false;
				} else {
					self.flush()?;
				}
			},
			'<' | '=' | '>' | '!' | '+' | '-' | '*' | '/' | '%' | '^' => {
				self.close_open()?;
				self.open = Token::new(TokenType::Operator, character);
			},
			'$' => {
				self.close_open()?;
				self.append(Token::empty(TokenType::Variable))?;
			},
			':' => {
				self.close_open()?;
				self.append(Token::empty(TokenType::Label))?;
			},
			'0'..='9' => {
				self.close_open()?;
				self.open = Token::new(TokenType::Number, character);
			},
			'.' | '_' => {
				self.close_open()?;
				self.open = Token::new(TokenType::Reference, character);
			},
			_ if character.is_ascii_alphabetic() => {
				self.close_open()?;
				self.open = Token::new(TokenType::Reference, character);
			},
			_ => return Err(self.error(format!("Unexpected character: {character}"))),
		}

		Ok(())
	}

	/// Closes the currently open token, if any, validating it and appending it to the statement buffer. A still-open string here means the line or the
	/// source ended before its closing quote.
	fn close_open(&mut self) -> anyhow::Result<()> {
		if self.open.token_type == TokenType::Null {
			return Ok(());
		}
		let mut token = std::mem::replace(&mut self.open, Token::empty(TokenType::Null));

		match token.token_type {
			TokenType::String => return Err(self.error("Unterminated string")),
			TokenType::Operator => {
				if !KNOWN_OPERATORS.contains(token.value.as_str()) {
					return Err(self.error("Unknown operator"));
				}
			},
			TokenType::Reference => {
				// Identifiers are case-insensitive; Fold before the keyword check so `If` and `IF` behave like `if`.
				token.value = token.value.to_lowercase();
				if FLOW_KEYWORDS.contains(token.value.as_str()) {
					token.token_type = TokenType::Flow;
					if token.value == "if" {
						self.conditional_pending = true;
						self.conditional_in_statement = true;
					}
				}
			},
			_ => {},
		}

		self.append(token)
	}

	/// Appends a closed token to the statement buffer, folding it into a preceding bare `$`/`:` sigil when one is waiting for its name.
	fn append(&mut self, token: Token) -> anyhow::Result<()> {
		self.after_comment = false;

		// A bare sigil is waiting for its name: the next token must be a reference shaped like an identifier.
		if let Some(last) = self.statement.last_mut() {
			if last.value.is_empty() && matches!(last.token_type, TokenType::Variable | TokenType::Label) {
				let kind = last.token_type;
				if token.token_type == TokenType::Reference && regex_macro::regex!("^[a-z_][a-z0-9_]*$").is_match(&token.value) {
					last.value = token.value;
					return Ok(());
				}
				return Err(self.error(format!("Invalid {kind}")));
			}
		}

		if token.token_type == TokenType::Label {
			if self.conditional_pending && !self.conditional_in_statement {
				return Err(self.error(format!("A conditional cannot be followed by a {}", TokenType::Label)));
			}
			if !self.statement.is_empty() {
				return Err(self.error("A label must be in its own statement"));
			}
		}

		self.statement.push(token);
		Ok(())
	}

	/// Flushes the statement buffer as a new statement, registering labels and maintaining the pending-conditional flag.
	fn flush(&mut self) -> anyhow::Result<()> {
		if self.statement.is_empty() {
			return Ok(());
		}

		if let Some(last) = self.statement.last() {
			if last.value.is_empty() && matches!(last.token_type, TokenType::Variable | TokenType::Label) {
				return Err(self.error(format!("Unterminated {}", last.token_type)));
			}
		}

		let statement = Statement::new(std::mem::take(&mut self.statement));

		if statement.leading_type() == Some(TokenType::Label) {
			if statement.tokens.len() > 1 {
				return Err(self.error("A label must be in its own statement"));
			}
			let name = statement.tokens[0].value.clone();
			if let Some(existing) = self.program.labels.get(&name) {
				return Err(self.error(format!("Label already used on line {}: {name}", existing.line)));
			}
			// The jump target is the statement after the label, so `goto` resumes past it.
			self.program.labels.insert(name, LabelTarget { index: self.program.statements.len() + 1, line: self.line });
		}

		self.program.statements.push(statement);

		// The conditional's own statement keeps the flag armed; The next flushed statement satisfies it.
		if self.conditional_pending {
			self.conditional_pending = self.conditional_in_statement;
		}
		self.conditional_in_statement = false;
		Ok(())
	}

	/// Handles a newline or the end of the source: closes the open token, flushes the statement buffer and records a line hint for the next line.
	fn end_of_line(&mut self, end_of_source: bool) -> anyhow::Result<()> {
		self.close_open()?;
		self.flush()?;
		if !end_of_source {
			self.line += 1;
		}
		self.emit_line_hint();
		Ok(())
	}

	/// Records a line hint statement carrying the current line number. Consecutive hints collapse: the latest overwrites the previous.
	fn emit_line_hint(&mut self) {
		if let Some(last) = self.program.statements.last_mut() {
			if last.is_lone(TokenType::LineHint) {
				last.tokens[0].value = self.line.to_string();
				return;
			}
		}
		self.program.statements.push(Statement::single(Token::new(TokenType::LineHint, self.line.to_string())));
	}

	/// Runs the sentinel pass after the end of the buffer and returns the finished program.
	fn finish(mut self) -> anyhow::Result<Program> {
		self.end_of_line(true)?;

		if self.nesting != 0 {
			return Err(self.error("Unclosed open block"));
		}
		if self.conditional_pending {
			return Err(self.error("A conditional requires a statement after"));
		}

		// A hint with no statements after it serves nothing.
		if self.program.statements.last().is_some_and(|statement| statement.is_lone(TokenType::LineHint)) {
			let _ = self.program.statements.pop();
		}

		Ok(self.program)
	}
}

/// Returns whether the character can appear inside an operator lexeme.
const fn is_operator_character(character: char) -> bool {
	matches!(character, '<' | '=' | '>' | '!' | '+' | '-' | '*' | '/' | '%' | '^')
}

#[cfg(test)]
mod tests {
	use super::*;

	fn types_of(statement: &Statement) -> Vec<TokenType> {
		statement.tokens.iter().map(|token| token.token_type).collect()
	}

	#[test]
	fn tokenizes_a_simple_assignment() {
		let program = tokenize("return = 2+2;").unwrap();
		assert_eq!(program.statements.len(), 2);
		assert!(program.statements[0].is_lone(TokenType::LineHint));
		assert_eq!(
			types_of(&program.statements[1]),
			vec![TokenType::Reference, TokenType::Operator, TokenType::Number, TokenType::Operator, TokenType::Number]
		);
	}

	#[test]
	fn folds_sigils_into_variables_and_labels() {
		let program = tokenize(":loop\n$total = 1;").unwrap();
		assert!(program.statements[1].is_lone(TokenType::Label));
		assert_eq!(program.statements[1].tokens[0].value, "loop");
		assert_eq!(program.statements[3].tokens[0].token_type, TokenType::Variable);
		assert_eq!(program.statements[3].tokens[0].value, "total");
		assert_eq!(program.labels.get("loop").unwrap().index, 2);
	}

	#[test]
	fn identifiers_fold_to_lowercase() {
		let program = tokenize("$Total = Kabap.Version;").unwrap();
		assert_eq!(program.statements[1].tokens[0].value, "total");
		assert_eq!(program.statements[1].tokens[2].value, "kabap.version");
	}

	#[test]
	fn reclassifies_flow_keywords() {
		let program = tokenize("if 1;\nbreak;").unwrap();
		assert!(program.statements[1].starts_with_flow("if"));
		assert!(program.statements[3].starts_with_flow("break"));
	}

	#[test]
	fn collapses_consecutive_line_hints() {
		let program = tokenize("\n\n\nreturn = 1;").unwrap();
		assert!(program.statements[0].is_lone(TokenType::LineHint));
		assert_eq!(program.statements[0].tokens[0].value, "4");
		assert_eq!(program.statements.len(), 2);
	}

	#[test]
	fn drops_the_trailing_line_hint() {
		let program = tokenize("$x = 1;\n").unwrap();
		assert!(!program.statements.last().unwrap().is_lone(TokenType::LineHint));
	}

	#[test]
	fn strings_keep_their_case_and_support_escapes() {
		let program = tokenize(r#"$greeting = "Hello \"World\"";"#).unwrap();
		let string = &program.statements[1].tokens[2];
		assert_eq!(string.token_type, TokenType::String);
		assert_eq!(string.value, r#"Hello "World""#);
	}

	#[test]
	fn comments_are_discarded() {
		let program = tokenize("// a comment\n$x = 1; // another\n").unwrap();
		assert_eq!(program.statements.len(), 2);
		assert_eq!(program.statements[1].tokens.len(), 3);
	}

	#[test]
	fn rejects_unexpected_characters() {
		let error = tokenize("@").unwrap_err().to_string();
		assert_eq!(error, "Line 1: Unexpected character: @");
	}

	#[test]
	fn rejects_unterminated_strings() {
		let error = tokenize("$x = \"oops;\n").unwrap_err().to_string();
		assert_eq!(error, "Line 1: Unterminated string");
		assert_eq!(tokenize("$x = \"oops").unwrap_err().to_string(), "Line 1: Unterminated string");
	}

	#[test]
	fn rejects_unknown_operators() {
		assert_eq!(tokenize("$x = 1 ! 2;").unwrap_err().to_string(), "Line 1: Unknown operator");
		assert_eq!(tokenize("$x = 1 +++ 2;").unwrap_err().to_string(), "Line 1: Unknown operator");
	}

	#[test]
	fn rejects_unbalanced_blocks() {
		assert_eq!(tokenize("if 1; {").unwrap_err().to_string(), "Line 1: Unclosed open block");
		assert_eq!(tokenize("}").unwrap_err().to_string(), "Line 1: Closing unopened block");
	}

	#[test]
	fn rejects_bare_and_invalid_sigils() {
		assert_eq!(tokenize("$;").unwrap_err().to_string(), "Line 1: Unterminated variable");
		assert_eq!(tokenize("$\n").unwrap_err().to_string(), "Line 1: Unterminated variable");
		assert_eq!(tokenize(":\n").unwrap_err().to_string(), "Line 1: Unterminated label");
		assert_eq!(tokenize("$9 = 1;").unwrap_err().to_string(), "Line 1: Invalid variable");
		assert_eq!(tokenize(":9loop\n$x = 1;").unwrap_err().to_string(), "Line 1: Invalid label");
	}

	#[test]
	fn rejects_duplicate_labels() {
		let error = tokenize(":loop\n$x = 1;\n:loop\n").unwrap_err().to_string();
		assert_eq!(error, "Line 3: Label already used on line 1: loop");
	}

	#[test]
	fn rejects_labels_sharing_a_statement() {
		assert_eq!(tokenize(":loop $x = 1;").unwrap_err().to_string(), "Line 1: A label must be in its own statement");
	}

	#[test]
	fn rejects_empty_statements() {
		assert_eq!(tokenize(";").unwrap_err().to_string(), "Line 1: Missing statement");
		assert_eq!(tokenize("$x = 1;;").unwrap_err().to_string(), "Line 1: Missing statement");
	}

	#[test]
	fn allows_an_empty_statement_after_a_comment() {
		assert!(tokenize("// nothing here\n;").is_ok());
	}

	#[test]
	fn enforces_conditional_continuations() {
		assert_eq!(tokenize("if 1;").unwrap_err().to_string(), "Line 1: A conditional requires a statement after");
		assert_eq!(tokenize("{ if 1; }").unwrap_err().to_string(), "Line 1: A conditional cannot be followed by a block end");
		assert_eq!(tokenize("if 1;\n:next\n$x = 1;").unwrap_err().to_string(), "Line 2: A conditional cannot be followed by a label");
	}

	#[test]
	fn refuses_token_interchange_text() {
		let error = tokenize("// Kabap=Tokens v=1 utf8=\u{2713} s=3 wd=1000 o=0 e=\n").unwrap_err().to_string();
		assert_eq!(error, "Cannot load tokens as a script");
	}

	#[test]
	fn block_statements_stand_alone() {
		let program = tokenize("if 1; { $x = 1; }").unwrap();
		assert!(program.statements[2].is_lone(TokenType::BlockStart));
		assert!(program.statements.last().unwrap().is_lone(TokenType::BlockEnd));
	}
}
