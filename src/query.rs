use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

use rand::Rng;
use regex::Regex;

use crate::table::{Table, TableError};

pub const DEFAULT_MAX_RUNTIME: u32 = 9999;

/// A watchlist row that is usable for querying.
#[derive(Debug, Clone, PartialEq)]
pub struct Movie {
    pub name: String,
    pub year: String,
    pub runtime_min: u32,
    pub genre: String,
    genre_lower: String,
}

impl fmt::Display for Movie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) - {} min - Genres: {}",
            self.name, self.year, self.runtime_min, self.genre
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Criteria {
    pub min_runtime: u32,
    pub max_runtime: u32,
    pub genres: Vec<String>,
}

impl Criteria {
    /// Missing bounds default to 0..9999; reversed bounds are swapped.
    /// The flag reports whether a swap happened.
    pub fn new(min: Option<u32>, max: Option<u32>, genres: &[String]) -> (Criteria, bool) {
        let mut lo = min.unwrap_or(0);
        let mut hi = max.unwrap_or(DEFAULT_MAX_RUNTIME);
        let swapped = lo > hi;
        if swapped {
            std::mem::swap(&mut lo, &mut hi);
        }
        let genres = genres
            .iter()
            .map(|g| g.trim().to_lowercase())
            .filter(|g| !g.is_empty() && g != "skip")
            .collect();
        (
            Criteria {
                min_runtime: lo,
                max_runtime: hi,
                genres,
            },
            swapped,
        )
    }

    /// Inclusive runtime window, and every genre term must appear.
    pub fn matches(&self, movie: &Movie) -> bool {
        (self.min_runtime..=self.max_runtime).contains(&movie.runtime_min)
            && self.genres.iter().all(|g| movie.genre_lower.contains(g.as_str()))
    }

    pub fn describe(&self) -> String {
        let mut s = format!(
            "runtime between {} and {} minutes",
            self.min_runtime, self.max_runtime
        );
        if self.genres.is_empty() {
            s.push_str(", no genre filter");
        } else {
            s.push_str(&format!(", requiring genres: {}", self.genres.join(", ")));
        }
        s
    }
}

pub fn load_movies(path: &Path, delimiter: u8) -> Result<Vec<Movie>, TableError> {
    let table = Table::load(path, delimiter, &["Runtime"])?;
    Ok(movies(&table))
}

/// Keep movies (when the table says what type a row is) with a parseable runtime.
pub fn movies(table: &Table) -> Vec<Movie> {
    let has_type = table.column("Type").is_some();
    let genre_col = if table.column("Genre").is_some() {
        "Genre"
    } else {
        "Genres"
    };

    (0..table.len())
        .filter(|&row| !has_type || table.get(row, "Type").eq_ignore_ascii_case("movie"))
        .filter_map(|row| {
            let runtime_min = runtime_minutes(table.get(row, "Runtime"))?;
            let genre = table.get(row, genre_col).to_string();
            Some(Movie {
                name: first_non_empty(table, row, &["Name", "Title"]).unwrap_or("N/A").to_string(),
                year: first_non_empty(table, row, &["OMDbYear", "Year"]).unwrap_or("N/A").to_string(),
                runtime_min,
                genre_lower: genre.to_lowercase(),
                genre,
            })
        })
        .collect()
}

pub fn filter<'a>(movies: &'a [Movie], criteria: &Criteria) -> Vec<&'a Movie> {
    movies.iter().filter(|m| criteria.matches(m)).collect()
}

/// Up to `n` distinct picks; everything when there are `n` or fewer.
pub fn suggest<'a, R: Rng + ?Sized>(matches: &[&'a Movie], n: usize, rng: &mut R) -> Vec<&'a Movie> {
    if matches.len() <= n {
        return matches.to_vec();
    }
    rand::seq::index::sample(rng, matches.len(), n)
        .into_iter()
        .map(|i| matches[i])
        .collect()
}

/// First run of digits ("101 min" -> 101).
fn runtime_minutes(text: &str) -> Option<u32> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\d+").unwrap());
    re.find(text)?.as_str().parse().ok()
}

fn first_non_empty<'t>(table: &'t Table, row: usize, columns: &[&str]) -> Option<&'t str> {
    columns
        .iter()
        .map(|c| table.get(row, c).trim())
        .find(|v| !v.is_empty())
}
