//! DOM inspection of a fetched page.

use super::ContentAnalysis;
use crate::url_model::ParsedUrl;
use scraper::{ElementRef, Html, Selector};

/// Maximum number of distinct external links kept in the summary.
pub const MAX_EXTERNAL_LINKS: usize = 10;

/// Signals derived from the page markup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageSignals {
    pub login_form: bool,
    pub submit_email: bool,
    pub iframe: bool,
    pub popup_window: bool,
    pub ratio_internal_links: f64,
    pub ratio_external_links: f64,
    pub safe_anchor: f64,
    pub external_favicon: bool,
    pub empty_title: bool,
    pub domain_in_title: bool,
}

pub struct HtmlAnalyzer;

impl HtmlAnalyzer {
    /// Inspect `html` as served for `page`. `domain` is the registrable domain
    /// looked for in the title.
    pub fn analyze(html: &str, page: &ParsedUrl, domain: &str) -> (PageSignals, ContentAnalysis) {
        let document = Html::parse_document(html);

        let forms = select_all(&document, "form");
        let login_form = forms
            .iter()
            .any(|form| form_has_input_type(form, "password"));
        let submit_email = forms.iter().any(|form| form_has_input_type(form, "email"));
        let iframe_count = select_all(&document, "iframe").len();

        let hrefs: Vec<&str> = select_all(&document, "a[href]")
            .iter()
            .filter_map(|a| a.value().attr("href"))
            .collect();
        let total_links = hrefs.len();

        let mut internal = 0usize;
        let mut external: Vec<&str> = Vec::new();
        let mut safe = 0usize;
        for &href in &hrefs {
            let netloc = ParsedUrl::parse(href).netloc;
            if netloc.is_empty() || netloc == page.netloc {
                internal += 1;
            } else {
                external.push(href);
            }
            if href.is_empty() || href.starts_with('#') {
                safe += 1;
            }
        }

        let ratio = |n: usize| {
            if total_links > 0 {
                n as f64 / total_links as f64
            } else {
                0.0
            }
        };

        let title = select_all(&document, "title")
            .first()
            .map(|t| t.text().collect::<String>());
        let title_text = title.as_deref().map(str::trim).unwrap_or("");
        let domain_in_title =
            !domain.is_empty() && title_text.to_lowercase().contains(&domain.to_lowercase());

        let signals = PageSignals {
            login_form,
            submit_email,
            iframe: iframe_count > 0,
            popup_window: html.to_lowercase().contains("window.open"),
            ratio_internal_links: ratio(internal),
            ratio_external_links: ratio(external.len()),
            safe_anchor: ratio(safe),
            external_favicon: has_external_favicon(&document, page),
            empty_title: title_text.is_empty(),
            domain_in_title,
        };

        let mut external_links: Vec<String> = Vec::new();
        for href in external {
            if external_links.len() == MAX_EXTERNAL_LINKS {
                break;
            }
            if !external_links.iter().any(|seen| seen == href) {
                external_links.push(href.to_string());
            }
        }

        let content = ContentAnalysis {
            link_count: total_links,
            form_count: forms.len(),
            iframe_count,
            title: title_text.to_string(),
            external_links,
        };

        (signals, content)
    }
}

fn select_all<'a>(document: &'a Html, css: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(css) {
        Ok(selector) => document.select(&selector).collect(),
        Err(e) => {
            log::error!("Invalid selector {css}: {e:?}");
            Vec::new()
        }
    }
}

fn form_has_input_type(form: &ElementRef<'_>, input_type: &str) -> bool {
    let Ok(selector) = Selector::parse("input[type]") else {
        return false;
    };
    form.select(&selector).any(|input| {
        input
            .value()
            .attr("type")
            .is_some_and(|t| t.trim().eq_ignore_ascii_case(input_type))
    })
}

fn has_external_favicon(document: &Html, page: &ParsedUrl) -> bool {
    select_all(document, "link[rel][href]")
        .iter()
        .filter(|link| {
            link.value()
                .attr("rel")
                .is_some_and(|rel| rel.split_whitespace().any(|r| r.eq_ignore_ascii_case("icon")))
        })
        .filter_map(|link| link.value().attr("href"))
        .next()
        .is_some_and(|href| {
            let netloc = ParsedUrl::parse(href).netloc;
            !netloc.is_empty() && netloc != page.netloc
        })
}
