//! Text normalization used to compare quoted evidence with the source.

/// Normalize text for substring comparison: lowercase, unify typographic
/// quotes and dashes, collapse all whitespace runs to one space.
#[must_use]
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for ch in text.chars() {
        let ch = match ch {
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{2032}' => '\'',
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{2033}' => '"',
            '\u{2010}'..='\u{2015}' | '\u{2212}' => '-',
            '\u{00A0}' | '\u{2007}' | '\u{202F}' => ' ',
            other => other,
        };
        if ch.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.extend(ch.to_lowercase());
    }
    out
}

/// Strip wrapping quotes, bullets and trailing sentence punctuation from a
/// quoted snippet. Expects already-normalized input.
#[must_use]
pub fn trim_quote(snippet: &str) -> &str {
    snippet
        .trim_matches(|c: char| {
            c.is_whitespace() || matches!(c, '"' | '\'' | '`' | '•' | '*' | '-' | '…')
        })
        .trim_end_matches(['.', ',', ';', ':', '!', '?'])
        .trim()
}

/// Split a quoted snippet on elisions (`...` or `…`), dropping empty parts.
#[must_use]
pub fn split_elisions(snippet: &str) -> Vec<&str> {
    snippet
        .split("...")
        .flat_map(|part| part.split('…'))
        .map(trim_quote)
        .filter(|part| !part.is_empty())
        .collect()
}
