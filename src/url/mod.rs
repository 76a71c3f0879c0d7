//! URL helpers for Paper-Harvest
//!
//! Category names, article slugs and category page URLs are all derived from
//! URLs. The same derivations are used by the crawler when staging links, by
//! the fetcher when naming artifacts, and by the merge engine when resolving a
//! staging directory back to its category, so they live in one place.

use url::Url;

/// Returns the last non-empty path segment of a URL-ish string, without a
/// trailing `.htm`/`.html` suffix.
///
/// Query strings and fragments are ignored.
fn last_segment(raw: &str) -> &str {
    let without_fragment = raw.split('#').next().unwrap_or(raw);
    let without_query = without_fragment
        .split('?')
        .next()
        .unwrap_or(without_fragment);
    let segment = without_query
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or("");

    segment
        .strip_suffix(".html")
        .or_else(|| segment.strip_suffix(".htm"))
        .unwrap_or(segment)
}

/// Derives the category name used as the key of its staging locations
///
/// # Examples
///
/// ```
/// use paper_harvest::url::category_name;
///
/// assert_eq!(category_name("https://news.example.com/tai-chinh.htm"), "tai-chinh");
/// assert_eq!(category_name("https://news.example.com/the-gioi/"), "the-gioi");
/// ```
pub fn category_name(category_url: &str) -> String {
    last_segment(category_url).to_string()
}

/// Normalizes an arbitrary string into a filesystem-safe slug
///
/// Lowercases, keeps ASCII alphanumerics, `-` and `_`, and replaces every
/// other character with `_`.
pub fn sanitize_slug(raw: &str) -> String {
    raw.to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Derives the artifact slug of an article URL
///
/// # Examples
///
/// ```
/// use paper_harvest::url::article_slug;
///
/// assert_eq!(
///     article_slug("https://news.example.com/Gia-Vang-Tang.htm"),
///     "gia-vang-tang"
/// );
/// ```
pub fn article_slug(article_url: &str) -> String {
    let slug = sanitize_slug(last_segment(article_url));
    if slug.is_empty() {
        "index".to_string()
    } else {
        slug
    }
}

/// Human-readable title derived from an artifact slug
pub fn slug_title(slug: &str) -> String {
    slug.replace('_', " ")
}

/// Builds the URL of page `page` of a category listing
///
/// Any existing value of `page_param` is replaced.
pub fn page_url(category_url: &str, page_param: &str, page: u32) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(category_url)?;
    let retained: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != page_param)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    url.query_pairs_mut()
        .clear()
        .extend_pairs(retained)
        .append_pair(page_param, &page.to_string());

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_name_strips_extension() {
        assert_eq!(category_name("https://a.example/tai-chinh.htm"), "tai-chinh");
        assert_eq!(category_name("https://a.example/dau-tu.html"), "dau-tu");
        assert_eq!(category_name("https://a.example/the-gioi/"), "the-gioi");
    }

    #[test]
    fn test_category_name_ignores_query() {
        assert_eq!(
            category_name("https://a.example/tai-chinh.htm?page=3"),
            "tai-chinh"
        );
    }

    #[test]
    fn test_sanitize_slug() {
        assert_eq!(sanitize_slug("Hello World!"), "hello_world_");
        assert_eq!(sanitize_slug("keep-this_one"), "keep-this_one");
        assert_eq!(sanitize_slug("giá-vàng"), "gi_-v_ng");
    }

    #[test]
    fn test_article_slug() {
        assert_eq!(
            article_slug("https://a.example/tin-moi/Lai-Suat-Giam.htm"),
            "lai-suat-giam"
        );
        assert_eq!(article_slug("https://a.example/"), "a_example");
    }

    #[test]
    fn test_slug_title() {
        assert_eq!(slug_title("gia_vang-tang"), "gia vang-tang");
    }

    #[test]
    fn test_page_url_appends_param() {
        let url = page_url("https://a.example/tai-chinh.htm", "page", 3).unwrap();
        assert_eq!(url.as_str(), "https://a.example/tai-chinh.htm?page=3");
    }

    #[test]
    fn test_page_url_replaces_existing_param() {
        let url = page_url("https://a.example/list?sort=new&page=9", "page", 2).unwrap();
        assert_eq!(url.as_str(), "https://a.example/list?sort=new&page=2");
    }

    #[test]
    fn test_page_url_rejects_invalid() {
        assert!(page_url("not a url", "page", 1).is_err());
    }
}
