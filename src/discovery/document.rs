use scraper::{ElementRef, Html};

/// Tag list matching every element
pub const ANY_TAG: &[&str] = &["*"];

fn tag_matches(tags: &[&str], name: &str) -> bool {
    tags.iter().any(|tag| *tag == "*" || *tag == name)
}

/// Read-only view of one element of a parsed page
pub trait PageElement: Sized {
    /// Lower-case tag name
    fn tag(&self) -> &str;

    fn attribute(&self, name: &str) -> Option<&str>;

    /// Visible text, whitespace-normalised
    fn text_content(&self) -> String;

    /// Outer HTML of the element
    fn markup(&self) -> String;

    /// Descendants (not self) whose tag is one of `tags`, in document order.
    /// `"*"` matches any tag.
    fn select_tags(&self, tags: &[&str]) -> Vec<Self>;

    /// First descendant whose tag is one of `tags`
    fn first_tag(&self, tags: &[&str]) -> Option<Self> {
        self.select_tags(tags).into_iter().next()
    }
}

/// The minimal document capabilities the discovery engine relies on
pub trait PageDocument {
    type Element<'a>: PageElement
    where
        Self: 'a;

    /// All elements whose tag is one of `tags`, in document order
    fn select_tags(&self, tags: &[&str]) -> Vec<Self::Element<'_>>;

    /// Text of the `<title>` element, if present and non-empty
    fn title(&self) -> Option<String> {
        self.select_tags(&["title"])
            .first()
            .map(|title| title.text_content())
            .filter(|text| !text.is_empty())
    }
}

/// Trim each text fragment, drop the empty ones and join with single spaces
pub fn normalize_text<'a>(fragments: impl IntoIterator<Item = &'a str>) -> String {
    fragments.into_iter()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// A page parsed with `scraper`
pub struct HtmlPage {
    html: Html,
}

impl HtmlPage {
    pub fn parse(source: &str) -> Self {
        Self {
            html: Html::parse_document(source),
        }
    }
}

fn tagged_descendants<'a>(root: ElementRef<'a>, tags: &[&str], include_root: bool) -> Vec<ElementRef<'a>> {
    root.descendants()
        .skip(if include_root { 0 } else { 1 })
        .filter_map(ElementRef::wrap)
        .filter(|element| tag_matches(tags, element.value().name()))
        .collect()
}

impl<'a> PageElement for ElementRef<'a> {
    fn tag(&self) -> &str {
        self.value().name()
    }

    fn attribute(&self, name: &str) -> Option<&str> {
        self.value().attr(name)
    }

    fn text_content(&self) -> String {
        normalize_text(self.text())
    }

    fn markup(&self) -> String {
        self.html()
    }

    fn select_tags(&self, tags: &[&str]) -> Vec<Self> {
        tagged_descendants(*self, tags, false)
    }
}

impl PageDocument for HtmlPage {
    type Element<'a> = ElementRef<'a>;

    fn select_tags(&self, tags: &[&str]) -> Vec<ElementRef<'_>> {
        tagged_descendants(self.html.root_element(), tags, true)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!DOCTYPE html>
<html>
  <head><title>  Circulares -
      Superintendencia </title></head>
  <body>
    <div class="wrap">
      <h2>Listado</h2>
      <article id="first"><h3>Circular  N° 1</h3><p>Texto</p></article>
      <article id="second"><h3>Circular N° 2</h3></article>
    </div>
  </body>
</html>"#;

    #[test]
    fn html_page_selects_in_document_order() {
        let page = HtmlPage::parse(PAGE);
        let articles = page.select_tags(&["article"]);
        assert_eq!(articles.len(), 2);
        assert_eq!(articles[0].attribute("id"), Some("first"));
        assert_eq!(articles[1].attribute("id"), Some("second"));

        let mixed: Vec<_> = page.select_tags(&["h3", "h2"]).iter().map(|e| e.tag().to_string()).collect();
        assert_eq!(mixed, vec!["h2", "h3", "h3"]);
    }

    #[test]
    fn element_text_is_normalised() {
        let page = HtmlPage::parse(PAGE);
        let first = page.select_tags(&["article"])[0];
        assert_eq!(first.text_content(), "Circular N° 1 Texto");
        assert_eq!(first.first_tag(&["h1", "h2", "h3", "h4"]).map(|h| h.text_content()), Some("Circular N° 1".to_string()));
        assert!(first.markup().starts_with("<article id=\"first\">"));
    }

    #[test]
    fn element_selection_excludes_self() {
        let page = HtmlPage::parse("<div class=\"a\"><div class=\"b\"></div></div>");
        let outer = page.select_tags(&["div"])[0];
        let inner = outer.select_tags(&["div"]);
        assert_eq!(inner.len(), 1);
        assert_eq!(inner[0].attribute("class"), Some("b"));
    }

    #[test]
    fn title_is_read_when_present() {
        assert_eq!(HtmlPage::parse(PAGE).title(), Some("Circulares - Superintendencia".to_string()));
        assert_eq!(HtmlPage::parse("<html><body></body></html>").title(), None);
    }
}
