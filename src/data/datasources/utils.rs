use once_cell::sync::Lazy;
use regex::Regex;

static MARKUP_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<.+?>").expect("invalid tag pattern"));
static HTTP_VERSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)http/[0-9.]+").expect("invalid http version pattern"));

/// Reduces an HTML error page to its text. Removes tags and the first
/// `HTTP/x.y` token, then trims. Falls back to the raw body if nothing is
/// left.
pub(crate) fn strip_markup(body: &str) -> String {
    let without_tags = MARKUP_TAG.replace_all(body, "");
    let text = HTTP_VERSION.replace(&without_tags, "");
    let text = text.trim();
    if text.is_empty() {
        body.to_owned()
    } else {
        text.to_owned()
    }
}

/// Reads the proxy to use from `http_proxy`, then `HTTP_PROXY`.
pub(crate) fn proxy_from_env() -> Option<String> {
    proxy_from(|key| std::env::var(key).ok())
}

fn proxy_from(lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    ["http_proxy", "HTTP_PROXY"]
        .into_iter()
        .filter_map(lookup)
        .find(|value| !value.trim().is_empty())
}
