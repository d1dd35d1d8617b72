use indexmap::IndexMap;

use crate::tokens::{Program, TokenType};

/// Rewrites the given program at the given optimisation level. Each level includes the ones below it:
///
/// | Level | Effect |
/// |---|---|
/// | 0 | Nothing. |
/// | 1 | Reserved for literal folding; Currently rewrites nothing. |
/// | 2 | Discards every line hint statement and renumbers the label table to match. |
/// | 3 | Renames variables, labels and goto targets to generated short names. |
///
/// Discarding line hints trades error messages for size: runtime errors from an optimised program no longer carry a source line.
///
/// # Parameters
/// - `program`: The program to rewrite in place.
/// - `level`: The optimisation level, 0 to 3.
///
/// # Errors
/// If the level is negative or greater than 3.
pub fn optimise(program: &mut Program, level: i32) -> anyhow::Result<()> {
	if !(0..=3).contains(&level) {
		anyhow::bail!("Optimisation level is out of bounds");
	}

	if level >= 2 {
		discard_line_hints(program);
	}
	if level >= 3 {
		rename_identifiers(program);
	}

	program.optimised = program.optimised.max(level as u8);
	Ok(())
}

/// Removes every line hint statement, decrementing each label target by the number of statements removed before it so every `goto` still lands on the
/// statement following its label.
fn discard_line_hints(program: &mut Program) {
	// A label can target the index one past the end, so the prefix counts run one entry longer than the statement list.
	let mut removed = 0usize;
	let mut removed_before = Vec::with_capacity(program.statements.len() + 1);
	for statement in &program.statements {
		removed_before.push(removed);
		if statement.is_lone(TokenType::LineHint) {
			removed += 1;
		}
	}
	removed_before.push(removed);

	for target in program.labels.values_mut() {
		target.index -= removed_before[target.index];
	}

	program.statements.retain(|statement| !statement.is_lone(TokenType::LineHint));
}

/// Renames every variable, label and goto target to a short generated name. Names are assigned in first-encounter order using a spreadsheet column
/// scheme (`a`, `b`, .., `z`, `aa`, `ab`, ..). The rename map is keyed by the bare identifier, so a label, its goto targets and a same-named variable all
/// receive the same short name; Label/goto agreement is what keeps the program meaning intact.
fn rename_identifiers(program: &mut Program) {
	let mut names: IndexMap<String, String> = IndexMap::new();

	for statement in &mut program.statements {
		let is_goto = statement.starts_with_flow("goto");
		for (position, token) in statement.tokens.iter_mut().enumerate() {
			let renameable = match token.token_type {
				TokenType::Variable | TokenType::Label => true,
				TokenType::Reference => is_goto && position == 1,
				_ => false,
			};
			if renameable {
				let next = names.len();
				token.value = names.entry(token.value.clone()).or_insert_with(|| column_name(next)).clone();
			}
		}
	}

	let labels = std::mem::take(&mut program.labels);
	program.labels = labels.into_iter().map(|(name, target)| (names.get(&name).cloned().unwrap_or(name), target)).collect();
}

/// Returns the spreadsheet column name for the given zero-based index: 0 is `a`, 25 is `z`, 26 is `aa` and so on.
fn column_name(mut index: usize) -> String {
	let mut name = Vec::new();
	loop {
		name.push(char::from(b'a' + (index % 26) as u8));
		index /= 26;
		if index == 0 {
			break;
		}
		index -= 1;
	}
	name.reverse();
	name.into_iter().collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::lexer::tokenize;
	use crate::tokens::TokenType;

	#[test]
	fn rejects_levels_out_of_bounds() {
		let mut program = tokenize("$x = 1;").unwrap();
		assert_eq!(optimise(&mut program, -1).unwrap_err().to_string(), "Optimisation level is out of bounds");
		assert_eq!(optimise(&mut program, 4).unwrap_err().to_string(), "Optimisation level is out of bounds");
	}

	#[test]
	fn low_levels_rewrite_nothing() {
		let mut program = tokenize("$x = 1;\n$y = 2;").unwrap();
		let before = program.statements.clone();
		optimise(&mut program, 0).unwrap();
		assert_eq!(program.statements, before);
		optimise(&mut program, 1).unwrap();
		assert_eq!(program.statements, before);
		assert_eq!(program.optimised, 1);
	}

	#[test]
	fn level_two_discards_line_hints_and_renumbers_labels() {
		let mut program = tokenize(":top\n$n = 1;\ngoto top;").unwrap();
		optimise(&mut program, 2).unwrap();
		assert!(program.statements.iter().all(|statement| !statement.is_lone(TokenType::LineHint)));
		assert_eq!(program.statements.len(), 3);
		// The target still points at the statement following the label.
		assert_eq!(program.labels.get("top").unwrap().index, 1);
	}

	#[test]
	fn level_three_renames_in_first_encounter_order() {
		let mut program = tokenize(":top\n$count = $count + 1;\ngoto top;").unwrap();
		optimise(&mut program, 3).unwrap();

		// The label was met first and the variable second.
		assert_eq!(program.statements[0].tokens[0].value, "a");
		assert_eq!(program.statements[1].tokens[0].value, "b");
		// The goto target agrees with the renamed label, and the label table is rebuilt under the new name.
		assert_eq!(program.statements[2].tokens[1].value, "a");
		assert_eq!(program.labels.get("a").unwrap().index, 1);
		assert!(!program.labels.contains_key("top"));
	}

	#[test]
	fn short_names_follow_the_spreadsheet_column_scheme() {
		assert_eq!(column_name(0), "a");
		assert_eq!(column_name(25), "z");
		assert_eq!(column_name(26), "aa");
		assert_eq!(column_name(27), "ab");
		assert_eq!(column_name(51), "az");
		assert_eq!(column_name(52), "ba");
	}
}
