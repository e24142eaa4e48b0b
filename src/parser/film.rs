use std::sync::OnceLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use super::join_list;

pub const MAX_GENRES: usize = 3;
const CREDITS_MARKER: &str = "Directed by";

/// Metadata pulled from a film page. Every field is independent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilmRecord {
    pub title: Option<String>,
    pub year: Option<String>,
    pub directors: Vec<String>,
    pub genres: Vec<String>,
    pub average_rating: Option<String>,
    pub runtime: Option<String>,
}

impl FilmRecord {
    pub fn cells(&self) -> Vec<(&'static str, Option<String>)> {
        vec![
            ("Title", self.title.clone()),
            ("Year", self.year.clone()),
            ("Directors", join_list(&self.directors)),
            ("Genres", join_list(&self.genres)),
            ("AverageRating", self.average_rating.clone()),
            ("Runtime", self.runtime.clone()),
        ]
    }
}

pub fn parse_page(html: &str) -> FilmRecord {
    let doc = Html::parse_document(html);
    let root = doc.root_element();

    FilmRecord {
        title: title(root),
        year: year(root),
        directors: directors(root),
        genres: genres(root),
        average_rating: average_rating(root),
        runtime: runtime(root),
    }
}

fn title(root: ElementRef) -> Option<String> {
    first(root, "h1.headline-1.primaryname")
        .map(|el| stripped_text(el, ""))
        .filter(|t| !t.is_empty())
}

/// Last whitespace token of the release date ("07 Apr 1960" -> "1960").
/// The token is taken as-is, without checking it is numeric.
fn year(root: ElementRef) -> Option<String> {
    let date = first(root, "h5.date")?;
    let text = stripped_text(date, "");
    text.split_whitespace().last().map(str::to_string)
}

/// Directors only count when the credits paragraph says "Directed by".
fn directors(root: ElementRef) -> Vec<String> {
    let Some(credits) = first(root, "p.credits") else {
        return Vec::new();
    };
    if !credits.text().collect::<String>().contains(CREDITS_MARKER) {
        return Vec::new();
    }
    select_all(credits, "span.directorlist a.contributor")
        .into_iter()
        .map(|a| stripped_text(a, ""))
        .collect()
}

fn genres(root: ElementRef) -> Vec<String> {
    let Some(block) = first(root, "div#tab-genres") else {
        return Vec::new();
    };
    select_all(block, "div.text-sluglist a.text-slug")
        .into_iter()
        .map(|a| stripped_text(a, ""))
        .take(MAX_GENRES)
        .collect()
}

fn average_rating(root: ElementRef) -> Option<String> {
    first(root, r#"meta[name="twitter:data2"]"#)
        .and_then(|m| m.value().attr("content"))
        .map(str::to_string)
}

/// First "<n> min"/"<n> mins" token in the page footer.
fn runtime(root: ElementRef) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\d+\s*mins?").unwrap());

    let footer = first(root, "p.text-link.text-footer")?;
    let text = stripped_text(footer, " ");
    re.find(&text).map(|m| m.as_str().to_string())
}

fn first<'a>(scope: ElementRef<'a>, selector: &str) -> Option<ElementRef<'a>> {
    select_all(scope, selector).into_iter().next()
}

fn select_all<'a>(scope: ElementRef<'a>, selector: &str) -> Vec<ElementRef<'a>> {
    let Ok(selector) = Selector::parse(selector) else {
        return vec![];
    };
    let found: Vec<_> = scope.select(&selector).collect();
    found
}

/// Text nodes trimmed, empties dropped, joined with `sep`.
fn stripped_text(el: ElementRef, sep: &str) -> String {
    el.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(sep)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap()
    }

    #[test]
    fn peeping_tom_page() {
        let r = parse_page(&fixture("peeping-tom"));
        assert_eq!(r.title.as_deref(), Some("Peeping Tom"));
        assert_eq!(r.year.as_deref(), Some("1960"));
        assert_eq!(r.directors, ["Michael Powell"]);
        assert_eq!(r.genres, ["Horror", "Thriller", "Drama"]);
        assert_eq!(r.average_rating.as_deref(), Some("3.94 out of 5"));
        assert_eq!(r.runtime.as_deref(), Some("101 mins"));
    }

    #[test]
    fn genres_capped_in_document_order() {
        let html = r#"
            <div id="tab-genres">
              <div class="text-sluglist">
                <a class="text-slug" href="/g/drama">Drama</a>
                <a class="text-slug" href="/g/crime">Crime</a>
                <a class="text-slug" href="/g/mystery">Mystery</a>
                <a class="text-slug" href="/g/noir">Noir</a>
              </div>
            </div>"#;
        let r = parse_page(html);
        assert_eq!(r.genres, ["Drama", "Crime", "Mystery"]);
    }

    #[test]
    fn directors_need_credits_marker() {
        let html = r#"
            <p class="credits">
              <span class="introduction">Written by</span>
              <span class="directorlist"><a class="contributor" href="/d/x">Someone Else</a></span>
            </p>"#;
        let r = parse_page(html);
        assert!(r.directors.is_empty());
    }

    #[test]
    fn directors_outside_credits_are_ignored() {
        let html = r#"
            <span class="directorlist"><a class="contributor">Loose Name</a></span>
            <p class="credits">Directed by</p>"#;
        let r = parse_page(html);
        assert!(r.directors.is_empty());
    }

    #[test]
    fn multiple_directors() {
        let html = r#"
            <p class="credits">
              <span class="introduction">Directed by</span>
              <span class="directorlist">
                <a class="contributor"><span class="prettify">Joel Coen</span></a>,
                <a class="contributor"><span class="prettify">Ethan Coen</span></a>
              </span>
            </p>"#;
        let r = parse_page(html);
        assert_eq!(r.directors, ["Joel Coen", "Ethan Coen"]);
    }

    #[test]
    fn missing_sections_are_independent() {
        let html = r#"
            <div id="tab-genres">
              <div class="text-sluglist"><a class="text-slug">Drama</a></div>
            </div>"#;
        let r = parse_page(html);
        assert_eq!(r.genres, ["Drama"]);
        assert_eq!(r.title, None);
        assert_eq!(r.year, None);
        assert!(r.directors.is_empty());
        assert_eq!(r.average_rating, None);
        assert_eq!(r.runtime, None);
    }

    #[test]
    fn year_is_last_token_unvalidated() {
        let r = parse_page(r#"<h5 class="date">Released 07 Apr 1960 (UK)</h5>"#);
        assert_eq!(r.year.as_deref(), Some("(UK)"));
    }

    #[test]
    fn runtime_first_match_singular() {
        let r = parse_page(
            r#"<p class="text-link text-footer">1 min <a>More at</a> 90 mins</p>"#,
        );
        assert_eq!(r.runtime.as_deref(), Some("1 min"));
    }

    #[test]
    fn runtime_hours_not_normalized() {
        let r = parse_page(r#"<p class="text-link text-footer">2 hrs</p>"#);
        assert_eq!(r.runtime, None);
    }

    #[test]
    fn empty_document() {
        assert_eq!(parse_page(""), FilmRecord::default());
    }
}
