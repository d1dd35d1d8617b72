// Bring the `IntoEnumIterator` trait into scope, which allows us to use `::iter()` on enums that `#[derive(strum_macros::EnumIter)]`. This is used on
// `TokenType` to resolve a sigil character from a token line back into a type. We assign this to `as _` to indicate clearly that the trait is not
// referenced directly and only used to bring its methods into scope to be called.
use strum::IntoEnumIterator as _;

use crate::tokens::{LabelTarget, Program, Statement, Token, TokenType};
use crate::VERSION_MAJOR;

/// The settings carried by a `.kat` header. The engine applies these before executing a loaded program, which is how a saved program keeps behaving the
/// way it did on the machine that saved it.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderSettings {
	/// The decimal scale the program was saved with.
	pub scale: Option<u32>,

	/// The watchdog tick limit the program was saved with.
	pub watchdog: Option<u64>,
}

/// Serialises a program into the `.kat` token interchange format: a header comment followed by one token per line, each line starting with the type's
/// sigil character. Statements made of a single immediate token (line hints, labels, braces) delimit themselves; An explicit `;` line is only written
/// between two executable statements. The result carries no trailing newline.
///
/// # Parameters
/// - `program`: The program to serialise.
/// - `scale`: The engine's configured scale, recorded in the header.
/// - `watchdog`: The engine's configured watchdog tick limit, recorded in the header.
/// - `extensions`: The registered extension prefixes, recorded in the header for the reader's information.
#[must_use]
pub fn save(program: &Program, scale: u32, watchdog: u64, extensions: &[String]) -> String {
	let mut lines = vec![format!(
		"// Kabap=Tokens v={VERSION_MAJOR} utf8=\u{2713} s={scale} wd={watchdog} o={optimised} e={extensions}",
		optimised = program.optimised,
		extensions = extensions.join(",")
	)];

	for (index, statement) in program.statements.iter().enumerate() {
		for token in &statement.tokens {
			lines.push(token_line(token));
		}
		let next = program.statements.get(index + 1);
		if !is_immediate(statement) && next.is_some_and(|following| !is_immediate(following)) {
			lines.push(";".to_owned());
		}
	}

	lines.join("\n")
}

/// Parses `.kat` text into a program plus the settings its header carries.
///
/// # Errors
/// If the header is missing or malformed, declares a version newer than this engine, or does not declare UTF-8; Or if a token line is unrecognised or the
/// statements are malformed.
pub fn load(text: &str) -> anyhow::Result<(Program, HeaderSettings)> {
	let mut lines = text.lines();
	let header = lines.next().unwrap_or_default();
	let (settings, optimised) = parse_header(header)?;

	let mut loader = Loader::default();
	for line in lines {
		loader.line(line)?;
	}
	let mut program = loader.finish()?;
	program.optimised = optimised;

	Ok((program, settings))
}

/// Parses and validates the header comment, returning the engine settings and the recorded optimisation level.
fn parse_header(header: &str) -> anyhow::Result<(HeaderSettings, u8)> {
	let body = header.strip_prefix("//").map(str::trim);
	let Some(body) = body.filter(|body| body.starts_with("Kabap=Tokens")) else {
		anyhow::bail!("Tokens are missing their header");
	};

	let mut settings = HeaderSettings::default();
	let mut optimised = 0u8;
	let mut version = None;
	let mut utf8 = false;

	for field in body.split_whitespace().skip(1) {
		let Some((key, value)) = field.split_once('=') else { continue };
		match key {
			"v" => version = value.parse::<u32>().ok(),
			"utf8" => utf8 = value == "\u{2713}",
			"s" => settings.scale = value.parse().ok(),
			"wd" => settings.watchdog = value.parse().ok(),
			"o" => optimised = value.parse().unwrap_or(0),
			// The extension list is informational only.
			_ => {},
		}
	}

	match version {
		None => anyhow::bail!("Tokens are missing their header"),
		Some(version) if version > VERSION_MAJOR => anyhow::bail!("Tokens were made by a newer version of Kabap"),
		Some(_) => {},
	}
	if !utf8 {
		anyhow::bail!("Tokens must be UTF-8 encoded");
	}

	Ok((settings, optimised))
}

/// Renders a token as its interchange line.
fn token_line(token: &Token) -> String {
	match token.token_type {
		// Braces carry their own character as the value; The sigil alone is the whole line.
		TokenType::BlockStart => "{".to_owned(),
		TokenType::BlockEnd => "}".to_owned(),
		_ => {
			let sigil = token.token_type.sigil().unwrap_or('?');
			format!("{sigil}{}", token.value)
		},
	}
}

/// Returns whether the statement consists of a single self-delimiting token.
fn is_immediate(statement: &Statement) -> bool {
	matches!(
		statement.leading_type(),
		Some(TokenType::LineHint | TokenType::Label | TokenType::BlockStart | TokenType::BlockEnd)
	)
}

/// The loader state: the program assembled so far and the statement buffer being filled. Immediate token lines flush the buffer before themselves, which
/// is what lets the saver omit `;` lines around them.
#[derive(Default)]
struct Loader {
	program: Program,
	statement: Vec<Token>,
	nesting: usize,
	line: usize,
}

impl Loader {
	/// Consumes one line of `.kat` text.
	fn line(&mut self, line: &str) -> anyhow::Result<()> {
		if line.is_empty() {
			return Ok(());
		}
		if line.starts_with("//") {
			return Ok(());
		}

		let mut characters = line.chars();
		let sigil = characters.next().unwrap_or_default();
		let value = characters.as_str();

		let Some(token_type) = TokenType::iter().find(|token_type| token_type.sigil() == Some(sigil)) else {
			anyhow::bail!("Unknown token type: {sigil}");
		};

		match token_type {
			TokenType::LineHint => {
				self.flush();
				self.line = value.parse().unwrap_or(self.line);
				if let Some(last) = self.program.statements.last_mut() {
					if last.is_lone(TokenType::LineHint) {
						last.tokens[0].value = value.to_owned();
						return Ok(());
					}
				}
				self.program.statements.push(Statement::single(Token::new(TokenType::LineHint, value)));
			},
			TokenType::Label => {
				self.flush();
				let name = value.to_lowercase();
				if let Some(existing) = self.program.labels.get(&name) {
					anyhow::bail!("Label already used on line {}: {name}", existing.line);
				}
				self.program.labels.insert(name.clone(), LabelTarget { index: self.program.statements.len() + 1, line: self.line });
				self.program.statements.push(Statement::single(Token::new(TokenType::Label, name)));
			},
			TokenType::BlockStart => {
				self.flush();
				self.nesting += 1;
				self.program.statements.push(Statement::single(Token::new(TokenType::BlockStart, "{")));
			},
			TokenType::BlockEnd => {
				self.flush();
				if self.nesting == 0 {
					anyhow::bail!("Closing unopened block");
				}
				self.nesting -= 1;
				self.program.statements.push(Statement::single(Token::new(TokenType::BlockEnd, "}")));
			},
			TokenType::StatementEnd => {
				if self.statement.is_empty() {
					anyhow::bail!("Missing statement");
				}
				self.flush();
			},
			_ => self.statement.push(Token::new(token_type, value)),
		}

		Ok(())
	}

	/// Flushes the statement buffer, if anything is in it, as a finished statement.
	fn flush(&mut self) {
		if !self.statement.is_empty() {
			self.program.statements.push(Statement::new(std::mem::take(&mut self.statement)));
		}
	}

	/// Flushes any remaining tokens and validates the block nesting.
	fn finish(mut self) -> anyhow::Result<Program> {
		self.flush();
		if self.nesting != 0 {
			anyhow::bail!("Unclosed open block");
		}
		Ok(self.program)
	}
}
