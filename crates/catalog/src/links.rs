//! Hyperlink extraction from HTML directory indexes.

use percent_encoding::percent_decode_str;
use scraper::{Html, Selector};
use std::sync::LazyLock;

static ANCHOR_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

/// Prefixes of links that point somewhere other than a child entry: sort
/// controls (`?C=M;O=A`), absolute paths (parent directory), dotfiles and
/// dunder entries.
const NAVIGATION_PREFIXES: [&str; 4] = ["?", "/", ".", "__"];

/// Extract child entry links from a directory index page.
///
/// Returns `href` values in document order, percent-decoded, with navigation
/// and hidden entries removed. Directory entries keep their trailing `/`.
///
/// ```
/// use serverfiles_catalog::extract_links;
///
/// let html = r#"<a href="?C=N;O=D">Name</a> <a href="/newsf/">Parent</a>
///               <a href="GO/">GO/</a> <a href="wtest%20file.txt">wtest file.txt</a>"#;
/// assert_eq!(extract_links(html), ["GO/", "wtest file.txt"]);
/// ```
pub fn extract_links(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    document
        .select(&ANCHOR_SELECTOR)
        .filter_map(|anchor| anchor.value().attr("href"))
        .filter(|href| !href.is_empty() && !NAVIGATION_PREFIXES.iter().any(|prefix| href.starts_with(prefix)))
        .map(|href| percent_decode_str(href).decode_utf8_lossy().into_owned())
        .collect()
}
