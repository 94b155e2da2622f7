//! Presentation markup removal for spoken replies

/// Characters removed wherever they appear
const STRIPPED_CHARS: [char; 4] = ['*', '`', '_', '>'];

/// Sequences removed after the single characters
const STRIPPED_SEQUENCES: [&str; 2] = ["##", "- "];

/// Remove markdown emphasis, headings, code and quote markers, and `- ` bullets
///
/// Every `*` is removed, which also covers `**` bold markers and `* `
/// bullets. Removal repeats until nothing changes, so the result is stable:
/// `strip_markup(&strip_markup(x)) == strip_markup(x)`.
#[must_use]
pub fn strip_markup(text: &str) -> String {
    let mut current = strip_once(text);
    loop {
        let next = strip_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn strip_once(text: &str) -> String {
    let mut out: String = text.chars().filter(|c| !STRIPPED_CHARS.contains(c)).collect();
    for seq in STRIPPED_SEQUENCES {
        out = out.replace(seq, "");
    }
    out
}
