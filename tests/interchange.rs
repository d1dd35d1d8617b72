//! Round-trip behaviour of the `.kat` token interchange format through the public engine API.

use kabap::Kabap;

#[test]
fn the_header_records_the_engine_configuration() {
	let mut engine = Kabap::new();
	assert!(engine.script("return = 1;"));
	engine.scale_set(4);
	engine.watchdog_set(250);

	let saved = engine.tokens_save(0).unwrap();
	let header = saved.lines().next().unwrap();
	assert_eq!(header, "// Kabap=Tokens v=1 utf8=\u{2713} s=4 wd=250 o=1 e=kabap");
}

#[test]
fn saved_text_carries_no_trailing_newline() {
	let mut engine = Kabap::new();
	assert!(engine.script("return = 1;"));
	let saved = engine.tokens_save(0).unwrap();
	assert!(!saved.ends_with('\n'));
}

#[test]
fn tokens_reload_and_run_on_a_fresh_engine() {
	let mut engine = Kabap::new();
	assert!(engine.script("$price = 19.99; return = $price * 2;"));
	let saved = engine.tokens_save(0).unwrap();

	let mut fresh = Kabap::new();
	assert!(fresh.tokens_load(&saved));
	assert!(fresh.run());
	assert_eq!(fresh.stdout(), "39.98");
}

#[test]
fn minified_tokens_round_trip_idempotently() {
	let mut engine = Kabap::new();
	assert!(engine.script(":again\n$n = $n ++;\nif $n < 2;\ngoto again;\nreturn = $n;"));
	let minified = engine.tokens_save(3).unwrap();

	let mut second = Kabap::new();
	assert!(second.tokens_load(&minified));
	assert_eq!(second.tokens_save(0).unwrap(), minified);
}

#[test]
fn a_loaded_program_cannot_be_fed_back_as_a_script() {
	let mut engine = Kabap::new();
	assert!(engine.script("return = 1;"));
	let saved = engine.tokens_save(0).unwrap();

	let mut other = Kabap::new();
	assert!(!other.script(&saved));
	assert_eq!(other.stderr(), "Cannot load tokens as a script");
}

#[test]
fn comment_lines_after_the_header_are_skipped() {
	let text = "// Kabap=Tokens v=1 utf8=\u{2713} s=3 wd=1000 o=0 e=\n// made by hand\n@return\n_=\n#7";
	let mut engine = Kabap::new();
	assert!(engine.tokens_load(text));
	assert!(engine.run());
	assert_eq!(engine.stdout(), "7");
}

#[test]
fn foreign_headers_are_rejected() {
	let mut engine = Kabap::new();
	assert!(!engine.tokens_load("// Kabap=Tokens v=9 utf8=\u{2713} s=3 wd=1000 o=0 e="));
	assert_eq!(engine.stderr(), "Tokens were made by a newer version of Kabap");

	assert!(!engine.tokens_load("// Kabap=Tokens v=1 s=3 wd=1000 o=0 e="));
	assert_eq!(engine.stderr(), "Tokens must be UTF-8 encoded");
}
