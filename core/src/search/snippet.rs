const ELLIPSIS: &str = "...";

/// Cut a window of `max_length` characters around the earliest case-insensitive
/// match of any term, or the head of the text when nothing matches.
pub fn generate_snippet<S: AsRef<str>>(text: &str, terms: &[S], max_length: usize) -> String {
    if text.is_empty() {
        return String::new();
    }
    let chars: Vec<char> = text.chars().collect();
    let (lowered, origin) = lowercase_with_origin(&chars);

    let first = terms
        .iter()
        .filter_map(|term| {
            let needle: Vec<char> = term.as_ref().to_lowercase().chars().collect();
            find(&lowered, &needle)
        })
        .map(|i| origin[i])
        .min();

    match first {
        None if chars.len() > max_length => {
            let mut head: String = chars[..max_length].iter().collect();
            head.push_str(ELLIPSIS);
            head
        }
        None => text.to_string(),
        Some(pos) => {
            let start = pos.saturating_sub(max_length / 2);
            let end = (start + max_length).min(chars.len());
            let mut snippet = String::with_capacity(end - start + 2 * ELLIPSIS.len());
            if start > 0 {
                snippet.push_str(ELLIPSIS);
            }
            snippet.extend(&chars[start..end]);
            if end < chars.len() {
                snippet.push_str(ELLIPSIS);
            }
            snippet
        }
    }
}

/// Lowercase char by char, remembering which source char each output char came from.
fn lowercase_with_origin(chars: &[char]) -> (Vec<char>, Vec<usize>) {
    let mut lowered = Vec::with_capacity(chars.len());
    let mut origin = Vec::with_capacity(chars.len());
    for (i, c) in chars.iter().enumerate() {
        for lc in c.to_lowercase() {
            lowered.push(lc);
            origin.push(i);
        }
    }
    (lowered, origin)
}

fn find(haystack: &[char], needle: &[char]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
