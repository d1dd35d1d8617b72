use std::{cell::Cell, collections::HashMap, rc::Rc};

use crate::extension::{MessageType, Registry};
use crate::number;
use crate::tokens::{Program, Statement, Token, TokenType};

/// The operators reduced by the mathematical pass.
static MATHEMATICAL_OPERATORS: phf::Set<&'static str> = phf::phf_set! {
	"+", "-", "*", "/", "%", "^", "++", "--",
};

/// The operators reduced by the comparison pass.
static COMPARATOR_OPERATORS: phf::Set<&'static str> = phf::phf_set! {
	"<", "<=", "==", ">=", ">", "!=",
};

/// How the program counter moves after a statement.
enum Continuation {
	/// Fall through to the following statement.
	Next,

	/// Jump to the given statement index.
	Jump(usize),

	/// Stop executing; The program finished successfully.
	Finished,
}

/// Which neighbour of an operator is being fetched.
#[derive(Clone, Copy)]
enum Side {
	Left,
	Right,
}

impl Side {
	const fn label(self) -> &'static str {
		match self {
			Self::Left => "Left",
			Self::Right => "Right",
		}
	}
}

/// One of the three backward reduction passes run over a statement's working buffer.
#[derive(Clone, Copy, PartialEq, Eq)]
enum ReductionPass {
	/// Pass 1: `+ - * / % ^` and the unary `++`/`--`.
	Mathematical,

	/// Pass 2: the string concatenation operator `<<`.
	Concatenation,

	/// Pass 3: `< <= == >= > !=`, producing `1` or `0`.
	Comparison,
}

impl ReductionPass {
	fn matches(self, operator: &str) -> bool {
		match self {
			Self::Mathematical => MATHEMATICAL_OPERATORS.contains(operator),
			Self::Concatenation => operator == "<<",
			Self::Comparison => COMPARATOR_OPERATORS.contains(operator),
		}
	}
}

/// Executes a program one statement at a time. Each iteration duplicates the statement's tokens into a working buffer and reduces that buffer through
/// five passes; The program itself is never mutated, so the same program re-executes identically on later runs.
///
/// The executor borrows the engine's variable store, extension registry and stdout, and shares its scale cell; Everything a statement changes lands back
/// in the engine.
pub(crate) struct Executor<'run> {
	/// The program being executed.
	program: &'run Program,

	/// The engine's variable store.
	variables: &'run mut HashMap<String, String>,

	/// The engine's extension registry, consulted for references.
	extensions: &'run mut Registry,

	/// The scale used when formatting numeric results. Shared with the built-in extension, so `kabap.scale` writes apply mid-run.
	scale: Rc<Cell<u32>>,

	/// The watchdog tick limit. Zero disables the watchdog.
	watchdog_limit: u64,

	/// The engine's stdout, appended to by `return` assignments.
	stdout: &'run mut String,

	/// The source line of the statement being executed, learned from line hints. Zero until a hint is seen, in which case errors carry no line prefix.
	line: usize,
}

impl<'run> Executor<'run> {
	pub(crate) fn new(
		program: &'run Program,
		variables: &'run mut HashMap<String, String>,
		extensions: &'run mut Registry,
		scale: Rc<Cell<u32>>,
		watchdog_limit: u64,
		stdout: &'run mut String,
	) -> Self {
		Self { program, variables, extensions, scale, watchdog_limit, stdout, line: 0 }
	}

	/// Builds an error, prefixed with the current source line when one is known.
	fn error(&self, message: impl AsRef<str>) -> anyhow::Error {
		if self.line > 0 {
			anyhow::anyhow!("Line {}: {}", self.line, message.as_ref())
		} else {
			anyhow::anyhow!("{}", message.as_ref())
		}
	}

	/// Runs the program to completion.
	///
	/// # Errors
	/// If any statement fails, or the watchdog tick limit is reached.
	pub(crate) fn run(&mut self) -> anyhow::Result<()> {
		let mut index = 0;
		let mut ticks = 0u64;

		while index < self.program.statements.len() {
			ticks += 1;
			if self.watchdog_limit > 0 && ticks == self.watchdog_limit {
				return Err(self.error(format!("Watchdog {} ticks timeout, execution break", self.watchdog_limit)));
			}

			match self.execute(index)? {
				Continuation::Next => index += 1,
				Continuation::Jump(target) => index = target,
				Continuation::Finished => return Ok(()),
			}
		}

		Ok(())
	}

	/// Executes the statement at the given index and reports where the program counter goes next.
	fn execute(&mut self, index: usize) -> anyhow::Result<Continuation> {
		let statement = &self.program.statements[index];

		// Pass 0, trivial statements: a line hint moves the error cursor, labels and braces are inert at run time.
		match statement.leading_type() {
			Some(TokenType::LineHint) => {
				self.line = statement.tokens[0].value.parse().unwrap_or(self.line);
				return Ok(Continuation::Next);
			},
			Some(TokenType::Label | TokenType::BlockStart | TokenType::BlockEnd) | None => return Ok(Continuation::Next),
			_ => {},
		}

		// Pass 0, flow dispatch. `if` is left in place for pass 4, once its condition has been reduced.
		if let Some(continuation) = self.dispatch_flow(statement)? {
			return Ok(continuation);
		}

		// Work on a copy so the statement re-executes correctly when control returns to it.
		let conditional = statement.starts_with_flow("if");
		let mut working = statement.tokens.clone();

		// Pass 0, substitution: variables and references become their values, left to right. The assignment target is left untouched.
		let assignment = self.detect_assignment(&working)?;
		for position in 0..working.len() {
			if assignment && position == 0 {
				continue;
			}
			match working[position].token_type {
				TokenType::Variable => {
					let name = working[position].value.to_lowercase();
					let Some(value) = self.variables.get(&name) else {
						return Err(self.error(format!("Undefined variable: {name}")));
					};
					working[position] = Token::new(TokenType::String, value.clone());
				},
				TokenType::Reference => {
					if working[position].value == "return" {
						return Err(self.error("Cannot read from a return"));
					}
					let name = working[position].value.clone();
					let value = self.extensions.dispatch(MessageType::Read, &name, "").map_err(|error| self.error(error.to_string()))?;
					working[position] = Token::new(TokenType::String, value);
				},
				_ => {},
			}
		}

		// Passes 1 to 3: reduce right to left, so `8 - 4 - 2` evaluates as `8 - (4 - 2)`.
		self.reduce(&mut working, ReductionPass::Mathematical)?;
		self.reduce(&mut working, ReductionPass::Concatenation)?;
		self.reduce(&mut working, ReductionPass::Comparison)?;

		// Pass 4: perform the assignment, or evaluate the reduced condition.
		if assignment {
			self.assign(&working)?;
			return Ok(Continuation::Next);
		}
		if conditional {
			return self.evaluate_conditional(&working, index);
		}

		Ok(Continuation::Next)
	}

	/// Dispatches a `break` or `goto` statement, validating its shape.
	fn dispatch_flow(&self, statement: &Statement) -> anyhow::Result<Option<Continuation>> {
		if statement.starts_with_flow("break") {
			if statement.tokens.len() > 1 {
				return Err(self.error("Nothing can be after break"));
			}
			return Ok(Some(Continuation::Finished));
		}

		if statement.starts_with_flow("goto") {
			if statement.tokens.len() < 2 || statement.tokens[1].token_type != TokenType::Reference {
				return Err(self.error("Expected label after goto"));
			}
			if statement.tokens.len() > 2 {
				return Err(self.error("Nothing can be after label"));
			}
			let name = statement.tokens[1].value.to_lowercase();
			let Some(target) = self.program.labels.get(&name) else {
				return Err(self.error("Unknown label"));
			};
			return Ok(Some(Continuation::Jump(target.index)));
		}

		Ok(None)
	}

	/// Decides whether the statement is an assignment: exactly one `=`, sitting at index 1, with a variable or reference on its left and at least one
	/// token on its right.
	fn detect_assignment(&self, working: &[Token]) -> anyhow::Result<bool> {
		let mut equals = working.iter().enumerate().filter(|(_, token)| token.token_type == TokenType::Operator && token.value == "=");
		let Some((position, _)) = equals.next() else {
			return Ok(false);
		};
		if equals.next().is_some() {
			return Err(self.error("Only 1 assignment can be in a statement"));
		}
		if position != 1 {
			return Err(self.error("Assignment expects 1 left-hand value"));
		}
		if !matches!(working[0].token_type, TokenType::Variable | TokenType::Reference) {
			return Err(self.error("Assignment left-hand value must be a variable or reference"));
		}
		if working.len() < 3 {
			return Err(self.error("Assignment expects a right-hand value"));
		}
		for token in &working[2..] {
			if matches!(
				token.token_type,
				TokenType::Flow | TokenType::Label | TokenType::BlockStart | TokenType::BlockEnd | TokenType::LineHint
			) {
				return Err(self.error(format!("Assignment cannot contain a {}", token.token_type)));
			}
		}
		Ok(true)
	}

	/// Runs one backward reduction pass over the working buffer.
	fn reduce(&self, working: &mut Vec<Token>, pass: ReductionPass) -> anyhow::Result<()> {
		let mut position = working.len();
		while position > 0 {
			position -= 1;
			if working[position].token_type != TokenType::Operator {
				continue;
			}
			let operator = working[position].value.clone();
			if !pass.matches(&operator) {
				continue;
			}

			// The unary operators take no right operand; They add or subtract one.
			if operator == "++" || operator == "--" {
				let left = self.operand(working, position, Side::Left)?;
				let step = if operator == "++" { 1.0 } else { -1.0 };
				let result = number::parse(&left, 0.0) + step;
				let replacement = Token::new(TokenType::Number, number::format(result, self.scale.get()));
				let _ = working.splice(position - 1..=position, [replacement]);
				continue;
			}

			let left = self.operand(working, position, Side::Left)?;
			let right = self.operand(working, position, Side::Right)?;

			let replacement = match pass {
				ReductionPass::Concatenation => Token::new(TokenType::String, format!("{left}{right}")),
				ReductionPass::Comparison => {
					let outcome = match operator.as_str() {
						// Equality is case-insensitive comparison of the values as they stand, not numeric: `"Foo" == "foo"` holds, `"1.0" == "1"` does not.
						"==" => left.eq_ignore_ascii_case(&right),
						"!=" => !left.eq_ignore_ascii_case(&right),
						_ => {
							let a = number::parse(&left, 0.0);
							let b = number::parse(&right, 0.0);
							match operator.as_str() {
								"<" => a < b,
								"<=" => a <= b,
								">=" => a >= b,
								_ => a > b,
							}
						},
					};
					Token::new(TokenType::Number, if outcome { "1" } else { "0" })
				},
				ReductionPass::Mathematical => {
					let a = number::parse(&left, 0.0);
					let b = number::parse(&right, 0.0);
					let result = match operator.as_str() {
						"+" => a + b,
						"-" => a - b,
						"*" => a * b,
						// Dividing by zero is forgiven rather than fatal; The result is simply zero.
						"/" => {
							if b == 0.0 {
								0.0
							} else {
								a / b
							}
						},
						"%" => {
							if b == 0.0 {
								0.0
							} else {
								a % b
							}
						},
						_ => a.powf(b),
					};
					Token::new(TokenType::Number, number::format(result, self.scale.get()))
				},
			};

			let _ = working.splice(position - 1..=position + 1, [replacement]);
		}

		Ok(())
	}

	/// Fetches an operator's neighbour, which must exist and must have reduced to a string or number by now.
	fn operand(&self, working: &[Token], position: usize, side: Side) -> anyhow::Result<String> {
		let neighbour = match side {
			Side::Left => {
				if position == 0 {
					return Err(self.error("Missing left-hand operand before operator"));
				}
				&working[position - 1]
			},
			Side::Right => {
				let Some(neighbour) = working.get(position + 1) else {
					return Err(self.error("Missing right-hand operand after operator"));
				};
				neighbour
			},
		};

		if !matches!(neighbour.token_type, TokenType::String | TokenType::Number) {
			return Err(self.error(format!("{}-hand operand cannot be a {}", side.label(), neighbour.token_type)));
		}

		Ok(neighbour.value.clone())
	}

	/// Performs the write of a fully reduced assignment: into the variable store, onto stdout via `return`, or out through an extension.
	fn assign(&mut self, working: &[Token]) -> anyhow::Result<()> {
		if working.len() != 3 {
			return Err(self.error("Assignment takes only one right-hand value"));
		}
		let value = working[2].value.clone();

		match working[0].token_type {
			TokenType::Variable => {
				let _ = self.variables.insert(working[0].value.to_lowercase(), value);
			},
			_ => {
				let name = working[0].value.to_lowercase();
				if name == "return" {
					self.stdout.push_str(&value);
				} else {
					let _ = self.extensions.dispatch(MessageType::Write, &name, &value).map_err(|error| self.error(error.to_string()))?;
				}
			},
		}

		Ok(())
	}

	/// Evaluates a reduced `if` statement. A non-zero condition falls through to the guarded code; Zero skips it, either the brace-delimited block or,
	/// in the bare form, the single statement that follows.
	fn evaluate_conditional(&self, working: &[Token], index: usize) -> anyhow::Result<Continuation> {
		if working.len() < 2 {
			return Err(self.error("Missing if condition to be evaluated"));
		}
		if working.len() > 2 {
			return Err(self.error("Only 1 if condition can be evaluated"));
		}
		if !matches!(working[1].token_type, TokenType::String | TokenType::Number) {
			return Err(self.error(format!("An if condition cannot contain a {}", working[1].token_type)));
		}

		if number::parse(&working[1].value, 0.0) != 0.0 {
			return Ok(Continuation::Next);
		}
		self.skip_conditional(index)
	}

	/// Skips the code guarded by a false condition, scanning forward from the `if` statement. Line hints are ignored; Braces adjust the nesting depth.
	/// At depth zero another `if` passes through (it guards the statement the outer skip swallows anyway), the first other statement is the bare-form
	/// guarded statement, and a block end returning the depth to zero closes the block form. Either way execution resumes on the statement after it.
	fn skip_conditional(&self, index: usize) -> anyhow::Result<Continuation> {
		let mut nesting = 0usize;
		let mut position = index + 1;

		while position < self.program.statements.len() {
			let statement = &self.program.statements[position];
			match statement.leading_type() {
				Some(TokenType::LineHint) => {},
				Some(TokenType::BlockStart) => nesting += 1,
				Some(TokenType::BlockEnd) => {
					if nesting == 0 {
						return Err(self.error("Could not find the end of a conditional block"));
					}
					nesting -= 1;
					if nesting == 0 {
						return Ok(Continuation::Jump(position + 1));
					}
				},
				_ => {
					if nesting == 0 && !statement.starts_with_flow("if") {
						return Ok(Continuation::Jump(position + 1));
					}
				},
			}
			position += 1;
		}

		Err(self.error("Could not find the end of a conditional block"))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::extension::builtin::KabapExtension;
	use crate::lexer::tokenize;

	/// Tokenizes and executes the given source against a fresh store, returning the stdout it produced.
	fn execute(source: &str) -> anyhow::Result<String> {
		let mut variables = HashMap::new();
		execute_with(source, &mut variables, 1000)
	}

	fn execute_with(source: &str, variables: &mut HashMap<String, String>, watchdog: u64) -> anyhow::Result<String> {
		let program = tokenize(source)?;
		let scale = Rc::new(Cell::new(3));
		let mut registry = Registry::new();
		registry.add("kabap", Box::new(KabapExtension::new(Rc::clone(&scale))));
		let mut stdout = String::new();
		Executor::new(&program, variables, &mut registry, scale, watchdog, &mut stdout).run()?;
		Ok(stdout)
	}

	#[test]
	fn reduces_arithmetic_and_returns() {
		assert_eq!(execute("return = 2+2;").unwrap(), "4");
		assert_eq!(execute("return = 2 + 3 * 4;").unwrap(), "14");
	}

	#[test]
	fn operators_associate_right_to_left() {
		// The backward pass reduces `4 - 2` first: 8 - (4 - 2).
		assert_eq!(execute("return = 8 - 4 - 2;").unwrap(), "6");
	}

	#[test]
	fn concatenation_runs_after_arithmetic() {
		assert_eq!(execute("return = \"total: \" << 2 + 3;").unwrap(), "total: 5");
	}

	#[test]
	fn division_and_remainder_by_zero_give_zero() {
		assert_eq!(execute("return = 1/0;").unwrap(), "0");
		assert_eq!(execute("return = 5 % 0;").unwrap(), "0");
	}

	#[test]
	fn equality_is_case_insensitive_and_lexical() {
		assert_eq!(execute("return = \"Foo\" == \"foo\";").unwrap(), "1");
		assert_eq!(execute("return = \"1.0\" == \"1\";").unwrap(), "0");
		assert_eq!(execute("return = \"a\" != \"b\";").unwrap(), "1");
	}

	#[test]
	fn comparisons_are_numeric() {
		assert_eq!(execute("return = 2 < 10;").unwrap(), "1");
		assert_eq!(execute("return = 2 >= 10;").unwrap(), "0");
	}

	#[test]
	fn unary_operators_step_by_one() {
		assert_eq!(execute("$n = 5; return = $n ++;").unwrap(), "6");
		assert_eq!(execute("$n = 5; return = $n --;").unwrap(), "4");
	}

	#[test]
	fn variables_persist_across_statements() {
		let mut variables = HashMap::new();
		let stdout = execute_with("$x = 8; $y = 1.49; $s = $x * $y; return = $s;", &mut variables, 1000).unwrap();
		assert_eq!(stdout, "11.92");
		assert_eq!(variables.get("s").map(String::as_str), Some("11.92"));
	}

	#[test]
	fn undefined_variables_are_reported_with_their_line() {
		let error = execute("return = $ghost;").unwrap_err().to_string();
		assert_eq!(error, "Line 1: Undefined variable: ghost");
	}

	#[test]
	fn a_return_cannot_be_read() {
		assert_eq!(execute("$x = return;").unwrap_err().to_string(), "Line 1: Cannot read from a return");
	}

	#[test]
	fn bare_conditionals_guard_one_statement() {
		assert_eq!(execute("if 0; return = \"skipped\"; return = \"ran\";").unwrap(), "ran");
		assert_eq!(execute("if 1; return = \"ran\"; return = \"too\";").unwrap(), "rantoo");
	}

	#[test]
	fn block_conditionals_guard_to_the_matching_brace() {
		let source = "if 0; { return = \"a\"; if 1; { return = \"b\"; } } return = \"after\";";
		assert_eq!(execute(source).unwrap(), "after");
	}

	#[test]
	fn a_false_conditional_passes_through_a_following_if() {
		// The inner `if` guards the next statement, so the outer skip swallows both.
		assert_eq!(execute("if 0; if 1; return = \"inner\"; return = \"after\";").unwrap(), "after");
	}

	#[test]
	fn goto_and_labels_loop() {
		let mut variables = HashMap::new();
		variables.insert("n".to_owned(), "0".to_owned());
		let source = ":loop\n$n = $n + 1;\nif $n < 3;\ngoto loop;\nreturn = $n;";
		assert_eq!(execute_with(source, &mut variables, 1000).unwrap(), "3");
	}

	#[test]
	fn break_stops_execution_successfully() {
		assert_eq!(execute("return = \"first\"; break; return = \"second\";").unwrap(), "first");
	}

	#[test]
	fn flow_statements_validate_their_shape() {
		assert_eq!(execute("break 1;").unwrap_err().to_string(), "Line 1: Nothing can be after break");
		assert_eq!(execute("goto;").unwrap_err().to_string(), "Line 1: Expected label after goto");
		assert_eq!(execute(":a\ngoto a a;").unwrap_err().to_string(), "Line 2: Nothing can be after label");
		assert_eq!(execute("goto nowhere;").unwrap_err().to_string(), "Line 1: Unknown label");
	}

	#[test]
	fn assignments_validate_their_shape() {
		assert_eq!(execute("$a = 1 = 2;").unwrap_err().to_string(), "Line 1: Only 1 assignment can be in a statement");
		assert_eq!(execute("= 1;").unwrap_err().to_string(), "Line 1: Assignment expects 1 left-hand value");
		assert_eq!(execute("1 = 2;").unwrap_err().to_string(), "Line 1: Assignment left-hand value must be a variable or reference");
		assert_eq!(execute("$a =;").unwrap_err().to_string(), "Line 1: Assignment expects a right-hand value");
		assert_eq!(execute("$a = 1 2;").unwrap_err().to_string(), "Line 1: Assignment takes only one right-hand value");
		assert_eq!(execute("$a = break;").unwrap_err().to_string(), "Line 1: Assignment cannot contain a flow");
	}

	#[test]
	fn operands_validate_their_shape() {
		assert_eq!(execute("$a = + 1;").unwrap_err().to_string(), "Line 1: Left-hand operand cannot be a operator");
		assert_eq!(execute("$a = 1 +;").unwrap_err().to_string(), "Line 1: Missing right-hand operand after operator");
		assert_eq!(execute("+ 1;").unwrap_err().to_string(), "Line 1: Missing left-hand operand before operator");
	}

	#[test]
	fn conditionals_validate_their_shape() {
		assert_eq!(execute("if;\n$x = 1;").unwrap_err().to_string(), "Line 1: Missing if condition to be evaluated");
		assert_eq!(execute("if 1 2;\n$x = 1;").unwrap_err().to_string(), "Line 1: Only 1 if condition can be evaluated");
	}

	#[test]
	fn the_watchdog_bounds_iterations() {
		let mut variables = HashMap::new();
		variables.insert("n".to_owned(), "0".to_owned());
		let source = ":loop\n$n = $n + 1;\ngoto loop;";
		let error = execute_with(source, &mut variables, 50).unwrap_err().to_string();
		assert_eq!(error, "Line 3: Watchdog 50 ticks timeout, execution break");

		// Zero disables the watchdog; A bounded loop then runs to completion.
		let mut variables = HashMap::new();
		variables.insert("n".to_owned(), "0".to_owned());
		let bounded = ":loop\n$n = $n + 1;\nif $n < 2000;\ngoto loop;\nreturn = $n;";
		assert_eq!(execute_with(bounded, &mut variables, 0).unwrap(), "2000");
	}

	#[test]
	fn extension_reads_resolve_references() {
		let stdout = execute("return = kabap.version;").unwrap();
		assert_eq!(stdout, format!("{}.{}", crate::VERSION_MAJOR, crate::VERSION_MINOR));
	}

	#[test]
	fn unresolved_references_fail_the_run() {
		let error = execute("return = nowhere.value;").unwrap_err().to_string();
		assert_eq!(error, "Line 1: Reference not found: nowhere.value");
	}

	#[test]
	fn scale_changes_apply_mid_run() {
		let stdout = execute("kabap.scale = 1; return = 10 / 3;").unwrap();
		assert_eq!(stdout, "3.3");
	}

	#[test]
	fn string_operands_default_to_zero_in_numeric_context() {
		assert_eq!(execute("return = \"pear\" + 3;").unwrap(), "3");
	}
}
