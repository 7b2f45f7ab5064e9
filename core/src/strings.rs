//! String helpers for configuration path lists.

/// Escape character honoured by [`split_enclosed`].
const ESCAPE: char = '\\';

/// Split `input` on `delimiter`, treating text between a pair of `enclosing`
/// characters as a single token.
///
/// - A backslash adds the following character verbatim.
/// - An enclosing character opens an enclosed section and is dropped; only the
///   same character closes it. Other enclosing characters inside are literal.
/// - `delimiter` inside an enclosed section is literal.
/// - `None` or an empty string yields no tokens.
///
/// When no enclosing character occurs anywhere in `input` the string is split
/// plainly, without escape processing, and empty tokens are dropped.
///
/// # Examples
///
/// ```
/// use launchpad_core::strings::split_enclosed;
///
/// assert_eq!(
///     split_enclosed(Some("a:'b:c':d"), ':', &['\'', '"']),
///     vec!["a", "b:c", "d"]
/// );
/// assert!(split_enclosed(Some(""), ':', &['\'']).is_empty());
/// ```
#[must_use]
pub fn split_enclosed(input: Option<&str>, delimiter: char, enclosing: &[char]) -> Vec<String> {
    let Some(input) = input.filter(|s| !s.is_empty()) else {
        return Vec::new();
    };

    if !input.contains(enclosing) {
        return input
            .split(delimiter)
            .filter(|token| !token.is_empty())
            .map(str::to_string)
            .collect();
    }

    let mut results = Vec::new();
    let mut current = String::new();
    let mut escaped = false;
    let mut open: Option<char> = None;

    for c in input.chars() {
        if escaped {
            escaped = false;
            current.push(c);
            continue;
        }
        if c == ESCAPE {
            escaped = true;
            continue;
        }
        match open {
            None if enclosing.contains(&c) => open = Some(c),
            None if c == delimiter => results.push(std::mem::take(&mut current)),
            Some(quote) if c == quote => open = None,
            _ => current.push(c),
        }
    }
    results.push(current);

    results
}
