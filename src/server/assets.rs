//! Static UI files compiled into the binary.

pub const LOGIN_HTML: &str = include_str!("../../static/login.html");
pub const FEED_HTML: &str = include_str!("../../static/feed.html");
pub const SETTINGS_HTML: &str = include_str!("../../static/settings.html");
pub const STATUS_HTML: &str = include_str!("../../static/status.html");
pub const FAVICON_SVG: &str = include_str!("../../static/favicon.svg");

const STYLE_CSS: &str = include_str!("../../static/style.css");
const APP_JS: &str = include_str!("../../static/app.js");

/// Content type and body of a file served under `/static/`.
pub fn lookup(path: &str) -> Option<(&'static str, &'static str)> {
    match path.trim_start_matches('/') {
        "style.css" => Some(("text/css; charset=utf-8", STYLE_CSS)),
        "app.js" => Some(("text/javascript; charset=utf-8", APP_JS)),
        "favicon.svg" => Some(("image/svg+xml", FAVICON_SVG)),
        _ => None,
    }
}
