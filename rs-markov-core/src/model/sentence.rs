/// Markers treated as sentence boundaries: the terminal period and the
/// opening and closing corner quotes.
const BOUNDARY_MARKERS: [char; 3] = ['。', '「', '」'];

/// Joins generated tokens into a display string.
///
/// With `strip` set, the result is trimmed to the single maximal span
/// between the first and the last boundary marker; without it the tokens
/// are returned verbatim.
pub fn extract(tokens: &[String], strip: bool) -> String {
	let text: String = tokens.concat();
	if strip { strip_to_sentence(&text) } else { text }
}

/// Two-pointer scan over boundary-marker positions.
///
/// The captured span runs from the first marker to the last marker in the
/// whole string (greedy, maximal) and needs at least one character between
/// them; otherwise the result is empty. One leading character is trimmed
/// when it is a closing quote or terminal period, one trailing character
/// when it is an opening quote.
fn strip_to_sentence(text: &str) -> String {
	let chars: Vec<char> = text.chars().collect();

	let mut first = None;
	let mut last = None;
	for (index, c) in chars.iter().enumerate() {
		if BOUNDARY_MARKERS.contains(c) {
			if first.is_none() {
				first = Some(index);
			}
			last = Some(index);
		}
	}

	let (Some(first), Some(last)) = (first, last) else {
		return String::new();
	};
	if last < first + 2 {
		return String::new();
	}

	let mut span = &chars[first..=last];
	if let Some(&head) = span.first() {
		if head == '。' || head == '」' {
			span = &span[1..];
		}
	}
	if span.last() == Some(&'「') {
		span = &span[..span.len() - 1];
	}

	span.iter().collect()
}
