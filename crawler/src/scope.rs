use lazy_static::lazy_static;
use regex::Regex;
use url::Url;

lazy_static! {
    static ref BINARY_EXT: Regex = Regex::new(
        r"(?i)\.(?:jpe?g|png|gif|bmp|webp|svg|ico|tiff?|pdf|docx?|xlsx?|pptx?|zip|rar|7z|gz|tgz|bz2|tar|exe|msi|dmg|apk|mp3|mp4|avi|mov|mkv|wmv|flv|wav|ogg|woff2?|ttf|eot)$"
    )
    .expect("valid regex");
    static ref EMAIL: Regex = Regex::new(r"[\w.+-]+@[\w-]+\.[\w.-]+").expect("valid regex");
    static ref TIMESTAMP: Regex =
        Regex::new(r"\d{4}-\d{2}-\d{2}[T_ ]?\d{2}[:\-]\d{2}|\b\d{10,13}\b").expect("valid regex");
}

/// Where a URL falls relative to a site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Inside the site; carries the path used as the dedup key.
    Internal(String),
    External,
    Denied(&'static str),
}

/// True when `url` equals `root` or continues it at a path or query boundary.
pub fn within_root(url: &str, root: &str) -> bool {
    let root = root.trim_end_matches('/');
    match url.strip_prefix(root) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || rest.starts_with('?') || rest.starts_with('#'),
        None => false,
    }
}

/// Raw anchor values that never lead to a crawlable page.
pub fn is_denied_href(href: &str) -> bool {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return true;
    }
    let lower = href.to_ascii_lowercase();
    if lower.starts_with("javascript:") || lower.starts_with("tel:") || lower.starts_with("mailto:") {
        return true;
    }
    href.chars().any(|c| c.is_whitespace() || !c.is_ascii())
}

/// Scope rules for one site crawl.
#[derive(Debug, Clone)]
pub struct ScopeFilter {
    root: String,
}

impl ScopeFilter {
    pub fn new(root: &str) -> Self {
        Self { root: root.trim_end_matches('/').to_string() }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn check(&self, url: &Url) -> Scope {
        if !matches!(url.scheme(), "http" | "https") {
            return Scope::Denied("scheme");
        }
        if !within_root(url.as_str(), &self.root) {
            return Scope::External;
        }
        let path = url.path();
        if BINARY_EXT.is_match(path) {
            return Scope::Denied("binary extension");
        }
        if EMAIL.is_match(url.as_str()) {
            return Scope::Denied("email address");
        }
        if TIMESTAMP.is_match(path) {
            return Scope::Denied("timestamp");
        }
        Scope::Internal(scope_key(url))
    }
}

/// Site-relative path identifying a page.
pub fn scope_key(url: &Url) -> String {
    match url.path() {
        "" => "/".to_string(),
        path => path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(url: &str) -> Scope {
        ScopeFilter::new("https://cats.example/").check(&Url::parse(url).unwrap())
    }

    #[test]
    fn internal_pages_keyed_by_path() {
        assert_eq!(check("https://cats.example"), Scope::Internal("/".into()));
        assert_eq!(check("https://cats.example/about?x=1#top"), Scope::Internal("/about".into()));
    }

    #[test]
    fn other_hosts_are_external() {
        assert_eq!(check("https://cats.example.org/"), Scope::External);
        assert_eq!(check("http://cats.example/"), Scope::External);
        assert_eq!(check("https://dogs.example/"), Scope::External);
    }

    #[test]
    fn deny_list() {
        assert_eq!(check("https://cats.example/photo.JPG"), Scope::Denied("binary extension"));
        assert_eq!(check("https://cats.example/files/report.pdf"), Scope::Denied("binary extension"));
        assert_eq!(check("https://cats.example/contact/info@cats.example"), Scope::Denied("email address"));
        assert_eq!(check("https://cats.example/news/2024-01-05T10:30"), Scope::Denied("timestamp"));
        assert!(matches!(
            ScopeFilter::new("https://cats.example").check(&Url::parse("ftp://cats.example/x").unwrap()),
            Scope::Denied(_)
        ));
    }

    #[test]
    fn denied_hrefs() {
        assert!(is_denied_href("javascript:void(0)"));
        assert!(is_denied_href("tel:+15550100"));
        assert!(is_denied_href("MAILTO:me@cats.example"));
        assert!(is_denied_href("/a page"));
        assert!(is_denied_href("/кошки"));
        assert!(is_denied_href("#section"));
        assert!(!is_denied_href("/about"));
        assert!(!is_denied_href("https://cats.example/a%20page"));
    }
}
