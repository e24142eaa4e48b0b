use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("failed to read or write {path:?}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("failed to write {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path:?} has no {column:?} column")]
    MissingColumn { path: PathBuf, column: String },
}

/// In-memory delimited table: an ordered header plus rows of cells.
///
/// Rows are always as wide as the header. Columns are only ever appended,
/// never removed, so indices handed out by [`Table::ensure_column`] stay valid.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Rows are fitted to the header width: short rows are padded, extra
    /// trailing cells are dropped.
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let width = headers.len();
        let rows = rows
            .into_iter()
            .map(|mut r| {
                r.resize(width, String::new());
                r
            })
            .collect();
        Table { headers, rows }
    }

    /// Load a table, failing if any of `required` is not in the header.
    pub fn load(path: &Path, delimiter: u8, required: &[&str]) -> Result<Table, TableError> {
        let csv_err = |source| TableError::Csv {
            path: path.to_path_buf(),
            source,
        };

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .from_path(path)
            .map_err(csv_err)?;

        let headers: Vec<String> = reader
            .headers()
            .map_err(csv_err)?
            .iter()
            .map(|h| h.to_string())
            .collect();

        for column in required {
            if !headers.iter().any(|h| h == column) {
                return Err(TableError::MissingColumn {
                    path: path.to_path_buf(),
                    column: column.to_string(),
                });
            }
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(csv_err)?;
            rows.push(record.iter().map(|c| c.to_string()).collect());
        }

        Ok(Table::new(headers, rows))
    }

    /// Write header + all rows. Parent directories are created as needed.
    pub fn save(&self, path: &Path, delimiter: u8) -> Result<(), TableError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|source| TableError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        }

        let csv_err = |source| TableError::Csv {
            path: path.to_path_buf(),
            source,
        };
        let mut writer = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .from_path(path)
            .map_err(csv_err)?;

        writer.write_record(&self.headers).map_err(csv_err)?;
        for row in &self.rows {
            writer.write_record(row).map_err(csv_err)?;
        }
        writer.flush().map_err(|source| TableError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(())
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Index of `name`, appending it (with empty cells) if it is new.
    pub fn ensure_column(&mut self, name: &str) -> usize {
        if let Some(idx) = self.column(name) {
            return idx;
        }
        self.headers.push(name.to_string());
        self.pad_rows();
        self.headers.len() - 1
    }

    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Cell by column name; empty when the column does not exist.
    pub fn get(&self, row: usize, name: &str) -> &str {
        self.column(name).map(|c| self.cell(row, c)).unwrap_or("")
    }

    pub fn set(&mut self, row: usize, col: usize, value: String) {
        if let Some(cell) = self.rows.get_mut(row).and_then(|r| r.get_mut(col)) {
            *cell = value;
        }
    }

    #[cfg(test)]
    pub fn row(&self, row: usize) -> &[String] {
        &self.rows[row]
    }

    fn pad_rows(&mut self) {
        let width = self.headers.len();
        for r in &mut self.rows {
            if r.len() < width {
                r.resize(width, String::new());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let p = dir.join(name);
        fs::write(&p, body).unwrap();
        p
    }

    #[test]
    fn load_keeps_header_order_and_pads_short_rows() {
        let dir = tempfile::tempdir().unwrap();
        let p = write(
            dir.path(),
            "in.csv",
            "Date,Name,Year,Letterboxd URI\n2024-01-02,Peeping Tom,1960,https://x/film/peeping-tom/\n2024-01-03,Short\n",
        );
        let t = Table::load(&p, b',', &["Letterboxd URI"]).unwrap();
        assert_eq!(t.headers(), ["Date", "Name", "Year", "Letterboxd URI"]);
        assert_eq!(t.len(), 2);
        assert_eq!(t.get(0, "Letterboxd URI"), "https://x/film/peeping-tom/");
        assert_eq!(t.row(1).len(), 4);
        assert_eq!(t.get(1, "Year"), "");
    }

    #[test]
    fn missing_required_column_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let p = write(dir.path(), "in.csv", "Name,Year\nX,1999\n");
        let err = Table::load(&p, b',', &["Letterboxd URI"]).unwrap_err();
        assert!(matches!(err, TableError::MissingColumn { ref column, .. } if column == "Letterboxd URI"));
    }

    #[test]
    fn unreadable_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Table::load(&dir.path().join("nope.csv"), b',', &[]).unwrap_err();
        assert!(matches!(err, TableError::Csv { .. }));
    }

    #[test]
    fn ensure_column_appends_once() {
        let mut t = Table::new(vec!["Name".into()], vec![vec!["A".into()], vec!["B".into()]]);
        let runtime = t.ensure_column("Runtime");
        assert_eq!(runtime, 1);
        assert_eq!(t.ensure_column("Runtime"), 1);
        assert_eq!(t.ensure_column("Name"), 0);
        assert_eq!(t.row(0), ["A", ""]);
        t.set(1, runtime, "101 mins".into());
        assert_eq!(t.get(1, "Runtime"), "101 mins");
    }

    #[test]
    fn save_writes_insertion_order_and_quotes() {
        let dir = tempfile::tempdir().unwrap();
        let mut t = Table::new(
            vec!["Name".into(), "Letterboxd URI".into()],
            vec![vec!["Crime, Inc.".into(), "https://x/1".into()]],
        );
        let g = t.ensure_column("Genres");
        t.set(0, g, "Drama; Crime".into());

        let out = dir.path().join("Data").join("out.csv");
        t.save(&out, b',').unwrap();

        let text = fs::read_to_string(&out).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("Name,Letterboxd URI,Genres"));
        assert_eq!(lines.next(), Some("\"Crime, Inc.\",https://x/1,Drama; Crime"));

        let back = Table::load(&out, b',', &["Genres"]).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn tab_delimiter() {
        let dir = tempfile::tempdir().unwrap();
        let p = write(dir.path(), "in.tsv", "Name\tYear\nHeat\t1995\n");
        let t = Table::load(&p, b'\t', &["Name"]).unwrap();
        assert_eq!(t.get(0, "Year"), "1995");
    }
}
