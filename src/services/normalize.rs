/// Clean raw OCR output into the form stored as a document's extract.
///
/// Drops every character that is neither a word character (alphanumeric or
/// `_`) nor whitespace, collapses whitespace runs to one space and trims the
/// ends. Total and idempotent.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;

    for c in text.chars() {
        if c.is_whitespace() {
            pending_space = !out.is_empty();
        } else if is_word_char(c) {
            if pending_space {
                out.push(' ');
                pending_space = false;
            }
            out.push(c);
        }
    }

    out
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}
