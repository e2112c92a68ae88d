//! Invite-link detection in message text.

use std::sync::LazyLock;

use regex::Regex;

static GROUP_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https?://chat\.whatsapp\.com/([A-Za-z0-9]+)").expect("static pattern")
});

// Schemeless variant; links are often pasted without the scheme.
static GROUP_LINK_BARE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"chat\.whatsapp\.com/([A-Za-z0-9]+)").expect("static pattern"));

/// Whether the text contains a group invite link in either form.
pub fn has_group_link(text: &str) -> bool {
    GROUP_LINK.is_match(text) || GROUP_LINK_BARE.is_match(text)
}

/// Extract unique invite codes in first-match order. The schemeless pattern
/// is only consulted when the full-URL pattern found nothing.
pub fn extract_invite_codes(text: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }

    let mut codes = Vec::new();
    collect_codes(&GROUP_LINK, text, &mut codes);
    if codes.is_empty() {
        collect_codes(&GROUP_LINK_BARE, text, &mut codes);
    }
    codes
}

fn collect_codes(re: &Regex, text: &str, out: &mut Vec<String>) {
    for captures in re.captures_iter(text) {
        if let Some(code) = captures.get(1) {
            let code = code.as_str().to_string();
            if !out.contains(&code) {
                out.push(code);
            }
        }
    }
}

/// Strip an invite code down to its alphanumeric content.
pub fn normalize_invite_code(code: &str) -> String {
    code.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

/// A valid code is 10–30 alphanumeric characters.
pub fn validate_invite_code(code: &str) -> bool {
    (10..=30).contains(&code.len()) && code.chars().all(|c| c.is_ascii_alphanumeric())
}
