use serde_json::Value;

/// Fields kept from a lookup API match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LookupRecord {
    pub year: Option<String>,
    pub kind: Option<String>,
    pub genre: Option<String>,
    pub imdb_rating: Option<String>,
    pub runtime: Option<String>,
}

impl LookupRecord {
    pub fn cells(&self) -> Vec<(&'static str, Option<String>)> {
        vec![
            ("OMDbYear", self.year.clone()),
            ("Type", self.kind.clone()),
            ("Genre", self.genre.clone()),
            ("IMDbRating", self.imdb_rating.clone()),
            ("Runtime", self.runtime.clone()),
        ]
    }
}

/// `None` unless the API flagged the response as a match (`"Response": "True"`).
pub fn parse_response(json: &Value) -> Option<LookupRecord> {
    if json.get("Response").and_then(Value::as_str) != Some("True") {
        return None;
    }

    let field = |key: &str| json.get(key).and_then(Value::as_str).map(str::to_string);

    Some(LookupRecord {
        year: field("Year"),
        kind: field("Type"),
        genre: field("Genre"),
        imdb_rating: field("imdbRating"),
        runtime: field("Runtime"),
    })
}
