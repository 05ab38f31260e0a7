use std::sync::OnceLock;

use regex::Regex;

/// Suffixes that turn any message into an explicit image request.
const IMAGE_SUFFIXES: [&str; 2] = [".gif", ".jpg"];

/// Derive the search keyword of a text message.
///
/// - `foo.gif` / `foo.jpg` always ask for `foo`.
/// - Otherwise an @-mention of the bot in an opted-in group asks for the text
///   with every `@name` token removed.
///
/// Returns `None` when no keyword applies or the keyword would be blank.
pub fn extract_keyword(text: &str, is_at: bool, group_opted_in: bool) -> Option<String> {
    if let Some(stem) = strip_image_suffix(text) {
        return non_blank(stem.to_string());
    }

    if is_at && group_opted_in {
        return non_blank(strip_mentions(text));
    }

    None
}

/// `text` without its last four characters when they are `.gif` or `.jpg`.
fn strip_image_suffix(text: &str) -> Option<&str> {
    let (idx, _) = text.char_indices().rev().nth(3)?;
    let (stem, suffix) = text.split_at(idx);
    IMAGE_SUFFIXES.contains(&suffix).then_some(stem)
}

pub fn strip_mentions(text: &str) -> String {
    static MENTION: OnceLock<Regex> = OnceLock::new();
    let re = MENTION.get_or_init(|| Regex::new(r"@\S+").expect("valid regex"));
    re.replace_all(text, "").trim().to_string()
}

fn non_blank(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
