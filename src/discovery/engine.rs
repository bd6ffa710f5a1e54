use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::cli::config::DiscoverySettings;
use crate::discovery::document::{PageDocument, PageElement, ANY_TAG};

/// Semantic content-item tags (stage 1)
const ARTICLE_TAGS: &[&str] = &["article"];

/// Heading family searched for a sample title
const HEADING_TAGS: &[&str] = &["h1", "h2", "h3", "h4"];

/// Block and list-item tags considered by the class-name heuristic (stage 2)
const CONTAINER_TAGS: &[&str] = &["div", "li"];

/// Navigation, list and block tags considered for pagination
const PAGINATION_TAGS: &[&str] = &["nav", "ul", "ol", "div"];

/// Which heuristic found the repeated elements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatedElementKind {
    Article,
    ClassHeuristic,
    #[default]
    None,
}

impl std::fmt::Display for RepeatedElementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RepeatedElementKind::Article => "<article> elements",
            RepeatedElementKind::ClassHeuristic => "post/item class containers",
            RepeatedElementKind::None => "none",
        };
        f.write_str(label)
    }
}

/// An anchor with its visible text. Text is kept whole; truncation is a display concern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSample {
    pub text: String,
    pub href: String,
}

/// What the engine inferred about one page
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DiscoveryReport {
    pub repeated_element_count: usize,
    pub repeated_element_kind: RepeatedElementKind,

    /// Outer HTML of the first repeated element
    pub sample_markup: Option<String>,

    pub sample_title: Option<String>,
    pub sample_link: Option<String>,
    pub sample_date: Option<String>,

    pub total_links: usize,
    pub pdf_links: Vec<LinkSample>,

    /// Same-site links outside the skip list, with absolute hrefs
    pub internal_links: Vec<LinkSample>,

    pub pagination_detected: bool,
    pub pagination_elements: usize,

    pub page_title: Option<String>,
}

#[derive(Debug, Default)]
struct RepeatedElements {
    kind: RepeatedElementKind,
    count: usize,
    markup: Option<String>,
    title: Option<String>,
    link: Option<String>,
    date: Option<String>,
}

/// Infers listing structure from an unfamiliar document.
///
/// Repeated items are searched from the most specific signal (`<article>`) to
/// the least specific (class-name keywords); links, pagination and the page
/// title are always collected, so a page without recognisable items still
/// yields a report.
#[derive(Debug, Clone)]
pub struct DiscoveryEngine {
    item_keywords: Vec<String>,
    date_tokens: Vec<String>,
    pagination_token: String,
    pdf_marker: String,
    internal_skip: Vec<String>,
}

fn lowercase_all(values: &[String]) -> Vec<String> {
    values.iter()
        .map(|v| v.to_lowercase())
        .filter(|v| !v.is_empty())
        .collect()
}

/// Whether the lower-cased class attribute contains any of the tokens
fn class_contains_any<E: PageElement>(element: &E, tokens: &[String]) -> bool {
    match element.attribute("class") {
        Some(class) => {
            let class = class.to_lowercase();
            tokens.iter().any(|token| class.contains(token.as_str()))
        }
        None => false,
    }
}

/// Host of `base` without a leading `www.`, so the apex and sibling subdomains count as the same site
fn site_root(base: &Url) -> Option<String> {
    let host = base.host_str()?.to_lowercase();
    Some(match host.strip_prefix("www.") {
        Some(root) if !root.is_empty() => root.to_string(),
        _ => host,
    })
}

fn non_empty(text: String) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

impl DiscoveryEngine {
    pub fn new(settings: &DiscoverySettings) -> Self {
        Self {
            item_keywords: lowercase_all(&settings.item_class_keywords),
            date_tokens: lowercase_all(&settings.date_class_tokens),
            pagination_token: settings.pagination_class_token.to_lowercase(),
            pdf_marker: settings.pdf_marker.to_lowercase(),
            internal_skip: settings.internal_link_skip.clone(),
        }
    }

    /// Analyse a parsed page. `page_url` is used only to resolve and classify internal links.
    pub fn discover<D: PageDocument>(&self, document: &D, page_url: Option<&Url>) -> DiscoveryReport {
        let repeated = self.find_repeated_elements(document);
        let (total_links, pdf_links, internal_links) = self.harvest_links(document, page_url);
        let pagination_elements = self.count_pagination(document);

        debug!(
            "Discovered {} repeated elements ({:?}), {} links, {} PDFs, {} pagination elements",
            repeated.count,
            repeated.kind,
            total_links,
            pdf_links.len(),
            pagination_elements
        );

        DiscoveryReport {
            repeated_element_count: repeated.count,
            repeated_element_kind: repeated.kind,
            sample_markup: repeated.markup,
            sample_title: repeated.title,
            sample_link: repeated.link,
            sample_date: repeated.date,
            total_links,
            pdf_links,
            internal_links,
            pagination_detected: pagination_elements > 0,
            pagination_elements,
            page_title: document.title(),
        }
    }

    fn find_repeated_elements<D: PageDocument>(&self, document: &D) -> RepeatedElements {
        let articles = document.select_tags(ARTICLE_TAGS);
        if let Some(first) = articles.first() {
            return RepeatedElements {
                kind: RepeatedElementKind::Article,
                count: articles.len(),
                markup: Some(first.markup()),
                title: self.sample_title(first),
                link: first.select_tags(&["a"])
                    .iter()
                    .find_map(|a| a.attribute("href").map(str::to_string)),
                date: self.sample_date(first),
            };
        }

        let containers: Vec<_> = document.select_tags(CONTAINER_TAGS)
            .into_iter()
            .filter(|element| class_contains_any(element, &self.item_keywords))
            .collect();
        if let Some(first) = containers.first() {
            debug!(
                "No <article> elements, class heuristic matched {} containers starting at <{}>",
                containers.len(),
                first.tag()
            );
            return RepeatedElements {
                kind: RepeatedElementKind::ClassHeuristic,
                count: containers.len(),
                markup: Some(first.markup()),
                ..RepeatedElements::default()
            };
        }

        RepeatedElements::default()
    }

    /// First h1-h4, falling back to the first anchor
    fn sample_title<E: PageElement>(&self, item: &E) -> Option<String> {
        item.first_tag(HEADING_TAGS)
            .or_else(|| item.first_tag(&["a"]))
            .and_then(|element| non_empty(element.text_content()))
    }

    /// First element with a date class, falling back to a `<time>` element
    fn sample_date<E: PageElement>(&self, item: &E) -> Option<String> {
        let dated = item.select_tags(ANY_TAG)
            .into_iter()
            .filter(|element| class_contains_any(element, &self.date_tokens))
            .find_map(|element| non_empty(element.text_content()));

        dated.or_else(|| {
            item.first_tag(&["time"]).and_then(|time| {
                time.attribute("datetime")
                    .map(str::to_string)
                    .or_else(|| non_empty(time.text_content()))
            })
        })
    }

    fn harvest_links<D: PageDocument>(
        &self,
        document: &D,
        page_url: Option<&Url>,
    ) -> (usize, Vec<LinkSample>, Vec<LinkSample>) {
        let anchors: Vec<_> = document.select_tags(&["a"])
            .into_iter()
            .filter_map(|a| {
                a.attribute("href").map(|href| LinkSample {
                    text: a.text_content(),
                    href: href.to_string(),
                })
            })
            .collect();

        let pdf_links = anchors.iter()
            .filter(|link| link.href.to_lowercase().contains(&self.pdf_marker))
            .cloned()
            .collect();

        let internal_links = match page_url.and_then(|base| site_root(base).map(|root| (base, root))) {
            Some((base, root)) => anchors.iter()
                .filter_map(|link| self.internal_link(base, &root, link))
                .collect(),
            None => Vec::new(),
        };

        (anchors.len(), pdf_links, internal_links)
    }

    /// Resolve `link` against `base` and keep it when it points into the site rooted at `root`
    fn internal_link(&self, base: &Url, root: &str, link: &LinkSample) -> Option<LinkSample> {
        let resolved = base.join(&link.href).ok()?;
        let host = resolved.host_str()?.to_lowercase();

        let same_site = host == root || host.ends_with(&format!(".{}", root));
        if !same_site {
            return None;
        }

        let href = resolved.to_string();
        if self.internal_skip.iter().any(|skip| href.contains(skip.as_str())) {
            return None;
        }

        Some(LinkSample {
            text: link.text.clone(),
            href,
        })
    }

    fn count_pagination<D: PageDocument>(&self, document: &D) -> usize {
        let token = std::slice::from_ref(&self.pagination_token);
        document.select_tags(PAGINATION_TAGS)
            .iter()
            .filter(|element| class_contains_any(*element, token))
            .count()
    }
}
