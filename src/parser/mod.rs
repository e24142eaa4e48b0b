pub mod film;
pub mod lookup;

use crate::fetch::Content;
use film::FilmRecord;
use lookup::LookupRecord;

/// Separator used when a list field is flattened into one cell.
pub const LIST_SEPARATOR: &str = "; ";

/// What a fetched document yielded.
#[derive(Debug, Clone, PartialEq)]
pub enum Parsed {
    Film(FilmRecord),
    Lookup(LookupRecord),
    /// Lookup API answered, but with no matching title.
    NoMatch,
}

impl Parsed {
    /// Column/value pairs in the order columns should be introduced.
    /// `None` means the field was not found and the cell is left empty.
    pub fn cells(&self) -> Vec<(&'static str, Option<String>)> {
        match self {
            Parsed::Film(r) => r.cells(),
            Parsed::Lookup(r) => r.cells(),
            Parsed::NoMatch => Vec::new(),
        }
    }

    /// Short label for progress output.
    pub fn label(&self) -> Option<&str> {
        match self {
            Parsed::Film(r) => r.title.as_deref(),
            Parsed::Lookup(r) => r.kind.as_deref(),
            Parsed::NoMatch => None,
        }
    }
}

/// Parse structured content. Never fails: anything missing becomes `None`.
pub fn parse(content: &Content) -> Parsed {
    match content {
        Content::Page(html) => Parsed::Film(film::parse_page(html)),
        Content::Lookup(json) => match lookup::parse_response(json) {
            Some(r) => Parsed::Lookup(r),
            None => Parsed::NoMatch,
        },
    }
}

fn join_list(items: &[String]) -> Option<String> {
    if items.is_empty() {
        None
    } else {
        Some(items.join(LIST_SEPARATOR))
    }
}
