use std::path::{Path, PathBuf};
use std::time::Duration;

use indicatif::ProgressBar;
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::fetch::{FetchError, Fetcher, Identifier};
use crate::parser::film::FilmRecord;
use crate::parser::lookup::LookupRecord;
use crate::parser::{self, Parsed};
use crate::table::{Table, TableError};

/// Randomized wait between fetches.
#[derive(Debug, Clone, Copy)]
pub struct Pacer {
    min: Duration,
    max: Duration,
}

impl Pacer {
    /// Bounds are reordered if given backwards.
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Pacer { min, max }
        } else {
            Pacer { min: max, max: min }
        }
    }

    #[cfg(test)]
    pub fn none() -> Self {
        Pacer::new(Duration::ZERO, Duration::ZERO)
    }

    pub fn next_delay(&self) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        let secs = rand::rng().random_range(self.min.as_secs_f64()..=self.max.as_secs_f64());
        Duration::from_secs_f64(secs)
    }

    /// Sleep for one delay. Returns `false` if cancelled first.
    pub async fn pause(&self, cancel: &CancellationToken) -> bool {
        let delay = self.next_delay();
        if delay.is_zero() {
            return !cancel.is_cancelled();
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = cancel.cancelled() => false,
        }
    }
}

/// Which columns a row's identifier comes from.
#[derive(Debug, Clone)]
pub enum SourceColumns {
    /// Film page URL, fetched directly.
    Page { url: String },
    /// Title + year, sent to the lookup API.
    Lookup { title: String, year: String },
}

impl SourceColumns {
    /// Columns the input table must have.
    pub fn required(&self) -> Vec<&str> {
        match self {
            SourceColumns::Page { url } => vec![url.as_str()],
            SourceColumns::Lookup { title, year } => vec![title.as_str(), year.as_str()],
        }
    }

    /// Metadata columns a completed run always carries, in merge order.
    pub fn record_columns(&self) -> Vec<&'static str> {
        let cells = match self {
            SourceColumns::Page { .. } => FilmRecord::default().cells(),
            SourceColumns::Lookup { .. } => LookupRecord::default().cells(),
        };
        cells.into_iter().map(|(column, _)| column).collect()
    }

    /// `None` when the row has nothing to fetch.
    pub fn identifier(&self, table: &Table, row: usize) -> Option<Identifier> {
        match self {
            SourceColumns::Page { url } => {
                let url = table.get(row, url).trim();
                (!url.is_empty()).then(|| Identifier::Url(url.to_string()))
            }
            SourceColumns::Lookup { title, year } => {
                let title = table.get(row, title).trim();
                let year = table.get(row, year).trim();
                if title.is_empty() || year.is_empty() {
                    return None;
                }
                Some(Identifier::TitleYear {
                    title: title.to_string(),
                    year: year.to_string(),
                })
            }
        }
    }
}

/// Checkpoint destinations.
#[derive(Debug, Clone)]
pub struct Outputs {
    pub final_path: PathBuf,
    pub partial_path: PathBuf,
    pub delimiter: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub rows: usize,
    pub fetched: usize,
    pub unmatched: usize,
    pub skipped: usize,
}

#[derive(Debug)]
pub enum RunOutcome {
    /// Every row visited; final output written.
    Completed(RunStats),
    /// Fetch failed at `row` (0-based); partial output written.
    Failed {
        row: usize,
        identifier: Identifier,
        error: FetchError,
        stats: RunStats,
    },
    /// Cancelled before `row` (0-based) was fetched; partial output written.
    Interrupted { row: usize, stats: RunStats },
}

impl RunOutcome {
    pub fn stats(&self) -> &RunStats {
        match self {
            RunOutcome::Completed(s) => s,
            RunOutcome::Failed { stats, .. } | RunOutcome::Interrupted { stats, .. } => stats,
        }
    }
}

/// Sequential scrape: fetch, parse, merge, pace. The first fetch failure
/// ends the run after a partial checkpoint.
pub struct Pipeline<F> {
    fetcher: F,
    source: SourceColumns,
    pacer: Pacer,
    outputs: Outputs,
    progress: ProgressBar,
}

impl<F: Fetcher> Pipeline<F> {
    pub fn new(fetcher: F, source: SourceColumns, pacer: Pacer, outputs: Outputs) -> Self {
        Pipeline {
            fetcher,
            source,
            pacer,
            outputs,
            progress: ProgressBar::hidden(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub async fn run(
        &self,
        table: &mut Table,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, TableError> {
        let total = table.len();
        let mut stats = RunStats {
            rows: total,
            ..Default::default()
        };
        self.progress.set_length(total as u64);
        info!(rows = total, "starting run");

        for idx in 0..total {
            if cancel.is_cancelled() {
                return self.interrupted(table, idx, stats);
            }

            let Some(id) = self.source.identifier(table, idx) else {
                warn!(row = idx + 1, "no identifier, skipping row");
                stats.skipped += 1;
                self.progress.inc(1);
                continue;
            };

            let content = match self.fetcher.fetch(&id).await {
                Ok(c) => c,
                Err(err) => {
                    self.progress.abandon();
                    error!(row = idx + 1, identifier = %id, "error processing row: {}", err);
                    self.checkpoint(table, &self.outputs.partial_path)?;
                    error!(
                        "saved partial results to {:?}, exiting",
                        self.outputs.partial_path
                    );
                    return Ok(RunOutcome::Failed {
                        row: idx,
                        identifier: id,
                        error: err,
                        stats,
                    });
                }
            };

            let parsed = parser::parse(&content);
            merge(table, idx, &parsed);

            let line = match (&parsed, parsed.label()) {
                (Parsed::NoMatch, _) => {
                    stats.unmatched += 1;
                    format!("[{}/{}] No match: {}", idx + 1, total, id)
                }
                (_, Some(label)) => {
                    stats.fetched += 1;
                    format!("[{}/{}] Done: {} ({})", idx + 1, total, id, label)
                }
                (_, None) => {
                    stats.fetched += 1;
                    format!("[{}/{}] Done: {}", idx + 1, total, id)
                }
            };
            self.progress.suspend(|| println!("{}", line));
            self.progress.inc(1);

            if idx + 1 < total && !self.pacer.pause(cancel).await {
                return self.interrupted(table, idx + 1, stats);
            }
        }

        self.progress.finish_and_clear();
        for column in self.source.record_columns() {
            table.ensure_column(column);
        }
        self.checkpoint(table, &self.outputs.final_path)?;
        info!(
            fetched = stats.fetched,
            unmatched = stats.unmatched,
            skipped = stats.skipped,
            "all done, results saved to {:?}",
            self.outputs.final_path
        );
        Ok(RunOutcome::Completed(stats))
    }

    fn interrupted(
        &self,
        table: &Table,
        row: usize,
        stats: RunStats,
    ) -> Result<RunOutcome, TableError> {
        self.progress.abandon();
        self.checkpoint(table, &self.outputs.partial_path)?;
        warn!(
            row = row + 1,
            "interrupted, saved partial results to {:?}", self.outputs.partial_path
        );
        Ok(RunOutcome::Interrupted { row, stats })
    }

    fn checkpoint(&self, table: &Table, path: &Path) -> Result<(), TableError> {
        table.save(path, self.outputs.delimiter)
    }
}

/// Write parsed cells into `row`, adding columns the table lacks.
/// Stale values in existing columns are overwritten, absent fields cleared.
pub fn merge(table: &mut Table, row: usize, parsed: &Parsed) {
    for (column, value) in parsed.cells() {
        let col = table.ensure_column(column);
        table.set(row, col, value.unwrap_or_default());
    }
}
