//! Input sanitizers shared by every write path into local fields.
//!
//! These follow the host platform's manual-entry rules: single-line text,
//! multi-line text, and raw URLs for storage.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

static SCRIPT_STYLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script[^>]*?>.*?</script>|<style[^>]*?>.*?</style>")
        .expect("valid script/style pattern")
});
static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[a-zA-Z/!?][^>]*>").expect("valid tag pattern"));
static OCTET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"%[a-fA-F0-9]{2}").expect("valid octet pattern"));
static BREAKS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\r\n\t ]+").expect("valid whitespace pattern"));
static URL_DISALLOWED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^a-zA-Z0-9\-~+_.?#=!&;,/:%@$|*'()\[\]\x{80}-\x{10FFFF}]")
        .expect("valid url charset pattern")
});
static SCHEME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([a-zA-Z][a-zA-Z0-9+.\-]*):").expect("valid scheme pattern"));

const ALLOWED_SCHEMES: [&str; 12] = [
    "http", "https", "ftp", "ftps", "mailto", "news", "irc", "feed", "tel", "sms", "webcal", "urn",
];

fn strip_tags(input: &str) -> String {
    let without_blocks = SCRIPT_STYLE.replace_all(input, "");
    let without_tags = TAG.replace_all(&without_blocks, "");
    without_tags.replace('<', "&lt;")
}

fn strip_octets(input: &str) -> String {
    let mut out = input.to_string();
    while OCTET.is_match(&out) {
        out = OCTET.replace_all(&out, "").into_owned();
    }
    out
}

/// Single-line text: tags stripped, whitespace runs (including line breaks
/// and tabs) collapsed to one space, percent-encoded octets removed, trimmed.
pub fn text_field(input: &str) -> String {
    let stripped = strip_tags(input);
    let collapsed = BREAKS.replace_all(&stripped, " ");
    strip_octets(&collapsed).trim().to_string()
}

/// Multi-line text: like [`text_field`] but line breaks are preserved.
pub fn textarea_field(input: &str) -> String {
    let stripped = strip_tags(input);
    strip_octets(&stripped).trim().to_string()
}

/// URL for storage. Relative references are kept; a bare host gets an
/// `http://` prefix; anything with a scheme outside the allow-list, or that
/// fails to parse, becomes the empty string.
pub fn url_raw(input: &str) -> String {
    let trimmed = input.trim().replace(' ', "%20");
    let cleaned = URL_DISALLOWED.replace_all(&trimmed, "").into_owned();
    if cleaned.is_empty() {
        return String::new();
    }
    if cleaned.starts_with(['/', '#', '?']) {
        return cleaned;
    }

    let candidate = match SCHEME.captures(&cleaned) {
        Some(caps) => {
            let scheme = caps[1].to_ascii_lowercase();
            if ALLOWED_SCHEMES.contains(&scheme.as_str()) {
                cleaned
            } else if scheme.contains('.') {
                // "example.com:8080/path" is a host with a port, not a scheme.
                format!("http://{cleaned}")
            } else {
                return String::new();
            }
        }
        None => format!("http://{cleaned}"),
    };

    match Url::parse(&candidate) {
        Ok(_) => candidate,
        Err(_) => String::new(),
    }
}
