use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::fetch::LookupApi;
use crate::ingest::Pacer;

const DEFAULT_CONFIG_FILE: &str = "watchlist.toml";
const ENV_PREFIX: &str = "WATCHLIST";

/// Run settings. Layered as defaults < config file < `WATCHLIST_*` env < CLI flags.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub input: PathBuf,
    pub output: PathBuf,
    pub partial_output: PathBuf,
    pub url_column: String,
    pub title_column: String,
    pub year_column: String,
    pub delimiter: String,
    pub min_delay_secs: f64,
    pub max_delay_secs: f64,
    pub lookup_min_delay_secs: f64,
    pub lookup_max_delay_secs: f64,
    pub timeout_secs: u64,
    pub user_agent: String,
    pub omdb_url: String,
    pub omdb_api_key: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            input: PathBuf::from("Data/watchlist.csv"),
            output: PathBuf::from("Data/watchlist_with_metadata.csv"),
            partial_output: PathBuf::from("Data/watchlist_with_metadata_partial.csv"),
            url_column: "Letterboxd URI".into(),
            title_column: "Name".into(),
            year_column: "Year".into(),
            delimiter: ",".into(),
            min_delay_secs: 2.0,
            max_delay_secs: 10.0,
            lookup_min_delay_secs: 0.0,
            lookup_max_delay_secs: 0.0,
            timeout_secs: 30,
            user_agent: concat!("watchlist_scraper/", env!("CARGO_PKG_VERSION")).into(),
            omdb_url: "http://www.omdbapi.com/".into(),
            omdb_api_key: None,
        }
    }
}

impl Settings {
    /// Load from `explicit` (must exist) or `watchlist.toml` (optional), then env.
    pub fn load(explicit: Option<&Path>) -> Result<Settings> {
        let file = match explicit {
            Some(p) => File::from(p).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };
        let settings: Settings = Config::builder()
            .add_source(file)
            .add_source(Environment::with_prefix(ENV_PREFIX))
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        for (lo, hi, what) in [
            (self.min_delay_secs, self.max_delay_secs, "delay"),
            (self.lookup_min_delay_secs, self.lookup_max_delay_secs, "lookup delay"),
        ] {
            if !lo.is_finite() || !hi.is_finite() || lo < 0.0 || hi < 0.0 {
                bail!("{} bounds must be non-negative numbers, got {}..{}", what, lo, hi);
            }
            if lo > hi {
                bail!("min {} ({}s) exceeds max {} ({}s)", what, lo, what, hi);
            }
            if Duration::try_from_secs_f64(hi).is_err() {
                bail!("max {} of {}s is too large", what, hi);
            }
        }
        if self.timeout_secs == 0 {
            bail!("timeout_secs must be at least 1");
        }
        self.delimiter_byte()?;
        Ok(())
    }

    pub fn delimiter_byte(&self) -> Result<u8> {
        match self.delimiter.as_str() {
            "\\t" | "tab" => Ok(b'\t'),
            d if d.len() == 1 && d.is_ascii() => Ok(d.as_bytes()[0]),
            d => bail!("delimiter must be a single ASCII character, got {:?}", d),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn page_pacer(&self) -> Pacer {
        Pacer::new(
            Duration::from_secs_f64(self.min_delay_secs),
            Duration::from_secs_f64(self.max_delay_secs),
        )
    }

    pub fn lookup_pacer(&self) -> Pacer {
        Pacer::new(
            Duration::from_secs_f64(self.lookup_min_delay_secs),
            Duration::from_secs_f64(self.lookup_max_delay_secs),
        )
    }

    /// Lookup endpoint, if a non-empty key is configured.
    pub fn lookup_api(&self) -> Option<LookupApi> {
        let key = self.omdb_api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())?;
        Some(LookupApi {
            base_url: self.omdb_url.clone(),
            api_key: key.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let s = Settings::default();
        s.validate().unwrap();
        assert_eq!(s.delimiter_byte().unwrap(), b',');
        assert!(s.lookup_api().is_none());
    }

    #[test]
    fn file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            "input = \"lists/films.tsv\"\ndelimiter = \"tab\"\nmin_delay_secs = 1\nmax_delay_secs = 3.5\nomdb_api_key = \"abc\"\n",
        )
        .unwrap();

        let s = Settings::load(Some(path.as_path())).unwrap();
        assert_eq!(s.input, PathBuf::from("lists/films.tsv"));
        assert_eq!(s.delimiter_byte().unwrap(), b'\t');
        assert_eq!(s.min_delay_secs, 1.0);
        assert_eq!(s.max_delay_secs, 3.5);
        assert_eq!(s.url_column, "Letterboxd URI");
        assert_eq!(s.lookup_api().unwrap().api_key, "abc");
    }

    #[test]
    fn missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Settings::load(Some(dir.path().join("absent.toml").as_path())).is_err());
    }

    #[test]
    fn reversed_delay_rejected() {
        let s = Settings {
            min_delay_secs: 5.0,
            max_delay_secs: 1.0,
            ..Default::default()
        };
        assert!(s.validate().is_err());
    }

    #[test]
    fn huge_delay_rejected() {
        let s = Settings {
            max_delay_secs: 1e20,
            ..Default::default()
        };
        assert!(s.validate().is_err());

        let s = Settings {
            lookup_min_delay_secs: 1e30,
            lookup_max_delay_secs: 1e30,
            ..Default::default()
        };
        assert!(s.validate().is_err());
    }

    #[test]
    fn env_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("env.toml");
        std::fs::write(&path, "timeout_secs = 10\nyear_column = \"Released\"\n").unwrap();

        std::env::set_var("WATCHLIST_TIMEOUT_SECS", "45");
        let loaded = Settings::load(Some(path.as_path()));
        std::env::remove_var("WATCHLIST_TIMEOUT_SECS");

        let s = loaded.unwrap();
        assert_eq!(s.timeout_secs, 45);
        assert_eq!(s.year_column, "Released");
    }

    #[test]
    fn bad_delimiter_rejected() {
        let s = Settings {
            delimiter: ";;".into(),
            ..Default::default()
        };
        assert!(s.validate().is_err());
    }

    #[test]
    fn blank_key_is_no_key() {
        let s = Settings {
            omdb_api_key: Some("  ".into()),
            ..Default::default()
        };
        assert!(s.lookup_api().is_none());
    }
}
