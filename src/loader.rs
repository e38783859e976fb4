use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use chrono::{Datelike, Local, NaiveDate};
use csv::StringRecord;

use crate::config::DataLayout;
use crate::convert;
use crate::error::Diagnostic;
use crate::models::{AgentRecord, EvaluationRecord, Metrics, Month, ScopeKey, Week};
use crate::normalize::{self, ColumnIndex, EVALUATION_ALIASES, METRIC_ALIASES};

/// Rows produced by one load together with whatever went wrong on the way.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset<T> {
    pub rows: Vec<T>,
    pub diagnostics: Vec<Diagnostic>,
}

impl<T> Default for Dataset<T> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            diagnostics: Vec::new(),
        }
    }
}

impl<T> Dataset<T> {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn record(&mut self, diagnostic: Diagnostic) {
        diagnostic.log();
        self.diagnostics.push(diagnostic);
    }
}

/// Identity of a cached load. Entries live until the process exits.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Month(Month),
    History,
    Daily { month: Month, agent: Option<String> },
    Weekly(Week),
    Evaluations { month: Month, agent: String },
}

#[derive(Debug, Default)]
struct LoadCache {
    records: HashMap<CacheKey, Rc<Dataset<AgentRecord>>>,
    evaluations: HashMap<CacheKey, Rc<Dataset<EvaluationRecord>>>,
}

/// A CSV file after header normalization.
struct RawTable {
    path: PathBuf,
    headers: Vec<String>,
    index: ColumnIndex,
    rows: Vec<StringRecord>,
}

impl RawTable {
    fn cell<'a>(&self, record: &'a StringRecord, column: &str) -> Option<&'a str> {
        self.index
            .get(column)
            .and_then(|idx| record.get(idx))
            .map(str::trim)
    }

    /// A column counts as empty when it is absent or every cell is blank.
    fn column_is_empty(&self, column: &str) -> bool {
        match self.index.get(column) {
            None => true,
            Some(idx) => self
                .rows
                .iter()
                .all(|row| row.get(idx).map_or(true, |cell| cell.trim().is_empty())),
        }
    }

    fn has_agent_column(&self) -> bool {
        self.index.contains(normalize::AGENT)
    }
}

/// Reads one export, recording a diagnostic instead of failing. Rows the
/// CSV reader rejects are skipped one by one.
fn read_table<T>(
    path: &Path,
    aliases: &[(&str, &str)],
    dataset: &mut Dataset<T>,
) -> Option<RawTable> {
    if !path.is_file() {
        dataset.record(Diagnostic::MissingSource {
            path: path.to_path_buf(),
        });
        return None;
    }

    let mut reader = match csv::Reader::from_path(path) {
        Ok(reader) => reader,
        Err(err) => {
            dataset.record(Diagnostic::SkippedSource {
                path: path.to_path_buf(),
                reason: err.to_string(),
            });
            return None;
        }
    };

    let headers = match reader.headers() {
        Ok(headers) => normalize::normalize_headers(headers.iter(), aliases),
        Err(err) => {
            dataset.record(Diagnostic::SkippedSource {
                path: path.to_path_buf(),
                reason: format!("unreadable header: {err}"),
            });
            return None;
        }
    };

    let mut rows = Vec::new();
    for (offset, result) in reader.records().enumerate() {
        match result {
            Ok(record) => rows.push(record),
            Err(err) => {
                let line = err
                    .position()
                    .map(|pos| pos.line())
                    .unwrap_or(offset as u64 + 2);
                dataset.record(Diagnostic::MalformedRow {
                    path: path.to_path_buf(),
                    line,
                    reason: err.to_string(),
                });
            }
        }
    }

    tracing::debug!(path = %path.display(), rows = rows.len(), "read export");

    Some(RawTable {
        path: path.to_path_buf(),
        index: ColumnIndex::new(&headers),
        headers,
        rows,
    })
}

fn agent_records(table: &RawTable, scope: &ScopeKey, date: Option<NaiveDate>) -> Vec<AgentRecord> {
    let time_columns: Vec<(&str, bool)> = normalize::TIME_COLUMNS
        .iter()
        .map(|column| (*column, table.column_is_empty(column)))
        .collect();

    let time = |record: &StringRecord, column: &str| -> Option<f64> {
        let empty = time_columns
            .iter()
            .any(|(name, empty)| *name == column && *empty);
        if empty {
            None
        } else {
            Some(convert::parse_time(table.cell(record, column).unwrap_or("")))
        }
    };

    table
        .rows
        .iter()
        .map(|record| AgentRecord {
            agent: table
                .cell(record, normalize::AGENT)
                .unwrap_or("")
                .to_string(),
            metrics: Metrics {
                handled: table
                    .cell(record, normalize::HANDLED)
                    .and_then(convert::parse_count),
                tma: time(record, normalize::TMA),
                tme: time(record, normalize::TME),
                tmia: time(record, normalize::TMIA),
                tmic: time(record, normalize::TMIC),
                fcr: table
                    .cell(record, normalize::FCR)
                    .and_then(convert::fcr_from_raw),
                satisfaction: table
                    .cell(record, normalize::SATISFACTION)
                    .and_then(convert::satisfaction_from_raw),
                nps: table
                    .cell(record, normalize::NPS)
                    .and_then(convert::nps_from_raw),
                evaluations: table
                    .cell(record, normalize::EVALUATIONS)
                    .and_then(convert::parse_count),
            },
            scope: scope.clone(),
            date,
        })
        .collect()
}

fn evaluation_records(table: &RawTable, scope: &ScopeKey, agent: &str) -> Vec<EvaluationRecord> {
    let optional = |record: &StringRecord, column: &str| {
        table
            .cell(record, column)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };

    table
        .rows
        .iter()
        .filter(|record| table.cell(record, normalize::AGENT) == Some(agent))
        .map(|record| {
            let score = optional(record, normalize::SCORE);
            EvaluationRecord {
                protocol: optional(record, normalize::PROTOCOL),
                score_value: score.as_deref().and_then(convert::parse_ratio),
                score,
                comment: optional(record, normalize::COMMENT),
                scope: scope.clone(),
            }
        })
        .collect()
}

/// `DD.MM.csv` becomes the label `DD/MM` and the sort key `DD`.
fn day_from_file_name(path: &Path) -> Option<(String, u32)> {
    let stem = path.file_stem()?.to_str()?;
    let day = stem.split('.').next()?.trim().parse::<u32>().ok()?;
    Some((stem.replace('.', "/"), day))
}

/// CSV files directly inside `folder`, in name order.
fn csv_files(folder: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(folder)?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .map_or(false, |ext| ext.eq_ignore_ascii_case("csv"))
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Loads exports from a [`DataLayout`] and memoizes each result by its
/// [`CacheKey`]. Nothing is ever evicted.
#[derive(Debug)]
pub struct Loader {
    layout: DataLayout,
    year: i32,
    cache: LoadCache,
}

impl Loader {
    pub fn new(layout: DataLayout) -> Self {
        Self {
            layout,
            year: Local::now().year(),
            cache: LoadCache::default(),
        }
    }

    /// Year used when turning daily file names into calendar dates.
    pub fn with_year(mut self, year: i32) -> Self {
        self.year = year;
        self
    }

    pub fn cached_loads(&self) -> usize {
        self.cache.records.len() + self.cache.evaluations.len()
    }

    /// Months that have a consolidated file, in calendar order.
    pub fn available_months(&self) -> Vec<Month> {
        Month::ALL
            .iter()
            .copied()
            .filter(|month| self.layout.month_file(*month).is_file())
            .collect()
    }

    /// One consolidated month file.
    pub fn month(&mut self, month: Month) -> Rc<Dataset<AgentRecord>> {
        let key = CacheKey::Month(month);
        if let Some(hit) = self.cache.records.get(&key) {
            return Rc::clone(hit);
        }

        let path = self.layout.month_file(month);
        let mut dataset = Dataset::default();
        if let Some(table) = read_table(&path, METRIC_ALIASES, &mut dataset) {
            check_schema(&table, &mut dataset);
            dataset.rows = agent_records(&table, &ScopeKey::month(month), None);
        }

        self.remember(key, dataset)
    }

    /// Every month file in the data directory, tagged with its month.
    pub fn history(&mut self) -> Rc<Dataset<AgentRecord>> {
        let key = CacheKey::History;
        if let Some(hit) = self.cache.records.get(&key) {
            return Rc::clone(hit);
        }

        let mut dataset = Dataset::default();
        let root = self.layout.root();
        if !root.is_dir() {
            dataset.record(Diagnostic::MissingSource {
                path: root.to_path_buf(),
            });
            return self.remember(key, dataset);
        }

        for month in self.available_months() {
            let path = self.layout.month_file(month);
            let Some(table) = read_table(&path, METRIC_ALIASES, &mut dataset) else {
                continue;
            };
            if table.rows.is_empty() || !table.has_agent_column() {
                dataset.record(Diagnostic::SkippedSource {
                    path: table.path.clone(),
                    reason: "no agent rows".to_string(),
                });
                continue;
            }
            let mut rows = agent_records(&table, &ScopeKey::month(month), None);
            dataset.rows.append(&mut rows);
        }

        self.remember(key, dataset)
    }

    /// Day files under `<month>/`, optionally narrowed to one agent.
    pub fn daily(&mut self, month: Month, agent: Option<&str>) -> Rc<Dataset<AgentRecord>> {
        let key = CacheKey::Daily {
            month,
            agent: agent.map(str::to_string),
        };
        if let Some(hit) = self.cache.records.get(&key) {
            return Rc::clone(hit);
        }

        let mut dataset = Dataset::default();
        let folder = self.layout.daily_folder(month);
        let files = match csv_files(&folder) {
            Ok(files) => files,
            Err(_) => {
                dataset.record(Diagnostic::MissingSource { path: folder });
                return self.remember(key, dataset);
            }
        };

        for path in files {
            let Some((label, day)) = day_from_file_name(&path) else {
                dataset.record(Diagnostic::SkippedSource {
                    path,
                    reason: "file name does not start with a day number".to_string(),
                });
                continue;
            };
            let Some(table) = read_table(&path, METRIC_ALIASES, &mut dataset) else {
                continue;
            };

            let date = NaiveDate::from_ymd_opt(self.year, month.number(), day);
            let mut rows = agent_records(&table, &ScopeKey::day(label, day), date);
            if let Some(name) = agent {
                rows.retain(|row| row.agent == name);
            }
            dataset.rows.append(&mut rows);
        }

        dataset
            .rows
            .sort_by_key(|row| row.scope.sort_index);
        self.remember(key, dataset)
    }

    /// One weekly ranking export. A file without an agent column comes back
    /// empty with a diagnostic saying so.
    pub fn weekly(&mut self, week: Week) -> Rc<Dataset<AgentRecord>> {
        let key = CacheKey::Weekly(week);
        if let Some(hit) = self.cache.records.get(&key) {
            return Rc::clone(hit);
        }

        let path = self.layout.week_file(week);
        let mut dataset = Dataset::default();
        if let Some(table) = read_table(&path, METRIC_ALIASES, &mut dataset) {
            if table.has_agent_column() {
                check_schema(&table, &mut dataset);
                let scope = ScopeKey::week(week.granularity(), week.label());
                dataset.rows = agent_records(&table, &scope, None);
            } else {
                dataset.record(Diagnostic::SkippedSource {
                    path: table.path.clone(),
                    reason: format!("missing {} column", normalize::AGENT),
                });
            }
        }

        self.remember(key, dataset)
    }

    /// Evaluation files under `<month>/notas/` for exactly one agent.
    pub fn evaluations(&mut self, month: Month, agent: &str) -> Rc<Dataset<EvaluationRecord>> {
        let key = CacheKey::Evaluations {
            month,
            agent: agent.to_string(),
        };
        if let Some(hit) = self.cache.evaluations.get(&key) {
            return Rc::clone(hit);
        }

        let mut dataset = Dataset::default();
        let folder = self.layout.evaluation_folder(month);
        match csv_files(&folder) {
            Ok(files) => {
                for path in files {
                    let Some((label, day)) = day_from_file_name(&path) else {
                        dataset.record(Diagnostic::SkippedSource {
                            path,
                            reason: "file name does not start with a day number".to_string(),
                        });
                        continue;
                    };
                    let Some(table) = read_table(&path, EVALUATION_ALIASES, &mut dataset) else {
                        continue;
                    };
                    if !table.has_agent_column() {
                        dataset.record(Diagnostic::SkippedSource {
                            path: table.path.clone(),
                            reason: format!("missing {} column", normalize::AGENT),
                        });
                        continue;
                    }
                    let mut rows = evaluation_records(&table, &ScopeKey::day(label, day), agent);
                    dataset.rows.append(&mut rows);
                }
                dataset.rows.sort_by_key(|row| row.scope.sort_index);
            }
            Err(_) => dataset.record(Diagnostic::MissingSource { path: folder }),
        }

        let dataset = Rc::new(dataset);
        self.cache.evaluations.insert(key, Rc::clone(&dataset));
        dataset
    }

    fn remember(&mut self, key: CacheKey, dataset: Dataset<AgentRecord>) -> Rc<Dataset<AgentRecord>> {
        let dataset = Rc::new(dataset);
        self.cache.records.insert(key, Rc::clone(&dataset));
        dataset
    }
}

fn check_schema<T>(table: &RawTable, dataset: &mut Dataset<T>) {
    let missing = normalize::missing_expected(&table.headers);
    if !missing.is_empty() {
        dataset.record(Diagnostic::SchemaMismatch {
            path: table.path.clone(),
            missing,
        });
    }
}
