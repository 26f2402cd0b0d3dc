/// Splits a raw text into normalized lines ready for tokenization.
///
/// - Every run of non-newline whitespace (spaces, tabs, `\r`) is removed
/// - Runs of newlines collapse, so no empty lines are produced
///
/// The tokenizer contract expects exactly this shape: one line at a time,
/// no embedded newlines, internal whitespace already gone.
pub(crate) fn normalize_lines(text: &str) -> Vec<String> {
	let mut lines = Vec::new();
	for raw in text.split('\n') {
		let line: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
		if !line.is_empty() {
			lines.push(line);
		}
	}
	lines
}
