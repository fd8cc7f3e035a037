/// Number of characters shown when a record is displayed.
pub const TRUNCATION: usize = 20;

/// Cut `text` to `count` characters, appending `...` when anything was cut.
pub fn truncate(text: &str, count: usize) -> String {
    match text.char_indices().nth(count) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_owned(),
    }
}
