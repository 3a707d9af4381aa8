use ammonia;

/// Clean HTML content using the ammonia library.
///
/// Quiz names, question and answer texts and group descriptions are
/// user-supplied and rendered by arbitrary clients, so they are stored
/// sanitized: safe tags survive, anything scriptable is stripped.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}
