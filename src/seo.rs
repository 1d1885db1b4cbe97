//! robots.txt and sitemap.xml rendering from the route-rule table.
//!
//! Pure string assembly; the embedding application serves the output. Both
//! renderings respect the same kill switch and per-path decisions as request
//! classification, so crawler policy never disagrees with response headers.

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::routes::RouteRules;

/// A candidate sitemap entry supplied by the embedding application.
#[derive(Debug, Clone)]
pub struct SitemapEntry {
    pub path: String,
    pub last_modified: Option<OffsetDateTime>,
}

impl SitemapEntry {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            last_modified: None,
        }
    }

    pub fn modified(mut self, at: OffsetDateTime) -> Self {
        self.last_modified = Some(at);
        self
    }
}

/// Render robots.txt for the site.
///
/// A non-discoverable site disallows everything; otherwise every exact rule
/// declared non-indexable becomes a `Disallow` line, plus the restricted
/// prefix.
pub fn robots_txt(rules: &RouteRules, base_url: &str, global_discoverable: bool) -> String {
    if !global_discoverable {
        return String::from("User-agent: *\nDisallow: /\n");
    }

    let base = normalize_base_url(base_url);
    let mut body = String::from("User-agent: *\nAllow: /\n");

    for path in rules.disallowed_paths() {
        body.push_str(&format!("Disallow: {path}\n"));
    }
    if let Some(prefix) = rules.restricted_prefix() {
        body.push_str(&format!("Disallow: {}/\n", prefix.trim_end_matches('/')));
    }

    body.push_str(&format!("Sitemap: {base}sitemap.xml\n"));
    body
}

/// Render sitemap.xml from candidate entries.
///
/// Entries whose classification is non-indexable are omitted; priority and
/// change frequency come from the matched rule (or the permissive default).
pub fn sitemap_xml(
    rules: &RouteRules,
    base_url: &str,
    entries: &[SitemapEntry],
    global_discoverable: bool,
) -> String {
    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n",
    );

    if global_discoverable {
        let base = normalize_base_url(base_url);
        for entry in entries {
            let decision = rules.classify(&entry.path, global_discoverable);
            if decision.no_index {
                continue;
            }

            let loc = canonical_url(&base, &entry.path);
            xml.push_str("  <url>");
            xml.push_str(&format!("<loc>{loc}</loc>"));
            if let Some(lastmod) = entry
                .last_modified
                .and_then(|at| at.format(&Rfc3339).ok())
            {
                xml.push_str(&format!("<lastmod>{lastmod}</lastmod>"));
            }
            xml.push_str(&format!(
                "<changefreq>{}</changefreq>",
                decision.change_frequency.as_str()
            ));
            xml.push_str(&format!("<priority>{:.1}</priority>", decision.priority));
            xml.push_str("</url>\n");
        }
    }

    xml.push_str("</urlset>\n");
    xml
}

fn normalize_base_url(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    format!("{trimmed}/")
}

fn canonical_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    if path == "/" {
        base.to_string()
    } else {
        format!("{base}{path}")
    }
}
