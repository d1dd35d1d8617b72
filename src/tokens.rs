use indexmap::IndexMap;

// Bring the `Casing` trait into scope, which allows us to use `.to_case()` on strings. This is used to convert `TokenType` enum variant names into lower case,
// which is useful for outputting human-readable errors. We assign this to `as _` to indicate clearly that the trait is not referenced directly and only used
// to bring its methods into scope to be called.
use convert_case::Casing as _;

/// A type of token in Kabap source code. The first step in running Kabap code is tokenization, which is the process of splitting a raw string of source code
/// into "tokens" which each have a "type" representing the kind of token it is, and a "value" representing the string of source code that is associated with
/// it. This enum defines the different "types" of values. Tokens themselves are stored in a separate `Token` struct, which has a `token_type: TokenType`
/// field; Keeping the type as a field (instead of making the value a subtype of each variant) lets the `.kat` codec iterate over all types of tokens to
/// resolve a sigil character back into a type.
///
/// # Conventions
///
/// These token types are named by what the token itself is, not by one specific usage in the language. The lowercase `Display` form of a variant name is
/// exactly the wording used in user-facing error messages ("block end", "line hint", and so on), so renaming a variant changes the messages users see.
#[derive(strum_macros::EnumIter, PartialEq, Eq, Debug, Clone, Copy)]
pub enum TokenType {
	/// The null token type. This is the state of the scanner's open token when no token is being accumulated. Tokens of this type never appear in a finished
	/// program.
	Null,

	/// The whitespace token type. Whitespace is detected by the scanner so it knows where other tokens end, but tokens of this type are discarded and never
	/// appear in a finished program.
	Whitespace,

	/// The comment token type. A comment starts at a double forward slash (//) and continues to the end of the line. Comments are discarded by the scanner
	/// and never appear in a finished program.
	Comment,

	/// The line hint token type. A line hint records the 1-based source line number that the following statements were written on, as a decimal string in
	/// the token value. Line hints are whole statements on their own and exist purely so runtime errors can point at the offending source line; The
	/// optimiser is free to discard them.
	LineHint,

	/// The statement end token type, produced by a semicolon. This is a delimiter only: it finishes the statement being assembled and is not stored inside
	/// the statement.
	StatementEnd,

	/// The block start token type, produced by an opening brace ({). A block start is a whole statement on its own. Every block start is eventually matched
	/// by a `BlockEnd` at the same nesting depth.
	BlockStart,

	/// The block end token type, produced by a closing brace (}). A block end is a whole statement on its own.
	BlockEnd,

	/// The flow token type. A reference whose value is one of the flow keywords (`break`, `goto`, `if`) is reclassified to this type when it closes.
	Flow,

	/// The operator token type. Operators accumulate from the characters `<=>!+-*/%^` and are validated against the known operator set when they close.
	Operator,

	/// The variable token type, introduced by a dollar sign ($). The token value is the variable name without the sigil, folded to lowercase.
	Variable,

	/// The string token type. A double quoted string; The quotes are not part of the token value. A backslash escapes the character after it.
	String,

	/// The number token type. A run of ASCII digits, optionally containing a dot as the decimal separator.
	Number,

	/// The reference token type. A dotted identifier such as `prefix.key`, resolved through the extension registry at run time. The value is folded to
	/// lowercase.
	Reference,

	/// The label token type, introduced by a colon (:). The token value is the label name without the sigil, folded to lowercase. A label is a whole
	/// statement on its own and names a `goto` target.
	Label,
}

impl TokenType {
	/// Returns the single-character sigil this token type is written as in the `.kat` interchange format, or `None` for the scanner-internal types that
	/// never appear in a finished program.
	#[must_use]
	pub const fn sigil(self) -> Option<char> {
		match self {
			Self::LineHint => Some('.'),
			Self::StatementEnd => Some(';'),
			Self::BlockStart => Some('{'),
			Self::BlockEnd => Some('}'),
			Self::Flow => Some('>'),
			Self::Operator => Some('_'),
			Self::Variable => Some('$'),
			Self::String => Some('"'),
			Self::Number => Some('#'),
			Self::Reference => Some('@'),
			Self::Label => Some(':'),
			Self::Null | Self::Whitespace | Self::Comment => None,
		}
	}
}

impl std::fmt::Display for TokenType {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", format!("{self:?}").to_case(convert_case::Case::Lower))
	}
}

/// A token in source code: a type paired with the lexeme it was scanned from. Sigils are not part of the value, so `$price` carries the value `price` and
/// `"hi"` carries the value `hi`. Line hints carry the line number as a decimal string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
	/// The type of the token.
	pub token_type: TokenType,

	/// The value of the token.
	pub value: String,
}

impl Token {
	/// Creates a token of the given type with the given value.
	#[must_use]
	pub fn new(token_type: TokenType, value: impl Into<String>) -> Self {
		Self { token_type, value: value.into() }
	}

	/// Creates a token of the given type with an empty value.
	#[must_use]
	pub fn empty(token_type: TokenType) -> Self {
		Self { token_type, value: String::new() }
	}
}

/// An ordered, non-empty sequence of tokens. A statement whose first token is a `LineHint`, `Label`, `BlockStart` or `BlockEnd` consists of that token
/// alone; Any other statement is executable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Statement {
	/// The tokens of the statement, in source order.
	pub tokens: Vec<Token>,
}

impl Statement {
	/// Creates a statement from the given tokens.
	#[must_use]
	pub fn new(tokens: Vec<Token>) -> Self {
		Self { tokens }
	}

	/// Creates a statement holding the single given token.
	#[must_use]
	pub fn single(token: Token) -> Self {
		Self { tokens: vec![token] }
	}

	/// Returns the type of the statement's first token.
	#[must_use]
	pub fn leading_type(&self) -> Option<TokenType> {
		self.tokens.first().map(|token| token.token_type)
	}

	/// Returns whether this statement is a lone token of the given type.
	#[must_use]
	pub fn is_lone(&self, token_type: TokenType) -> bool {
		self.tokens.len() == 1 && self.leading_type() == Some(token_type)
	}

	/// Returns whether this statement starts with a `Flow` token carrying the given keyword.
	#[must_use]
	pub fn starts_with_flow(&self, keyword: &str) -> bool {
		self.tokens.first().is_some_and(|token| token.token_type == TokenType::Flow && token.value == keyword)
	}
}

/// A jump target in the label table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelTarget {
	/// The index of the statement immediately following the label statement; `goto` resumes execution there.
	pub index: usize,

	/// The source line the label was declared on. Used to report duplicate declarations.
	pub line: usize,
}

/// A tokenized Kabap program: an ordered sequence of statements plus the label table collected while scanning. The statement index is the executor's
/// program counter.
#[derive(Debug, Clone, Default)]
pub struct Program {
	/// The statements of the program, in source order.
	pub statements: Vec<Statement>,

	/// The label table, mapping each (lowercase) label name to its jump target.
	pub labels: IndexMap<String, LabelTarget>,

	/// The highest optimisation level that has been applied to this program.
	pub optimised: u8,
}
