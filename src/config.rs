use std::path::{Path, PathBuf};

use crate::models::{Month, Week};

pub const RANKING_FOLDER: &str = "semana";
pub const EVALUATION_FOLDER: &str = "notas";
pub const CURRENT_WEEK_FILE: &str = "ranking_semanal_atual.csv";
pub const PREVIOUS_WEEK_FILE: &str = "ranking_semanal_anterior.csv";

/// Where every export lives, relative to one data directory:
///
/// ```text
/// <root>/<month>.csv
/// <root>/<month>/<DD.MM>.csv
/// <root>/<month>/notas/<DD.MM>.csv
/// <root>/semana/ranking_semanal_{atual,anterior}.csv
/// ```
#[derive(Debug, Clone)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `name(stem)` under the root, falling back to the month's ASCII
    /// spelling when only that one exists on disk.
    fn month_entry(&self, month: Month, name: impl Fn(&str) -> String) -> PathBuf {
        let primary = self.root.join(name(month.file_stem()));
        if primary.exists() {
            return primary;
        }
        month
            .ascii_stem()
            .map(|stem| self.root.join(name(stem)))
            .filter(|path| path.exists())
            .unwrap_or(primary)
    }

    pub fn month_file(&self, month: Month) -> PathBuf {
        self.month_entry(month, |stem| format!("{stem}.csv"))
    }

    pub fn daily_folder(&self, month: Month) -> PathBuf {
        self.month_entry(month, str::to_string)
    }

    pub fn evaluation_folder(&self, month: Month) -> PathBuf {
        self.daily_folder(month).join(EVALUATION_FOLDER)
    }

    pub fn ranking_file(&self, file_name: &str) -> PathBuf {
        self.root.join(RANKING_FOLDER).join(file_name)
    }

    pub fn week_file(&self, week: Week) -> PathBuf {
        let file_name = match week {
            Week::Current => CURRENT_WEEK_FILE,
            Week::Previous => PREVIOUS_WEEK_FILE,
        };
        self.ranking_file(file_name)
    }
}

/// Runtime settings resolved from the command line and environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub layout: DataLayout,
    pub users_file: PathBuf,
}

impl Settings {
    pub fn new(data_dir: impl Into<PathBuf>, users_file: impl Into<PathBuf>) -> Self {
        Self {
            layout: DataLayout::new(data_dir),
            users_file: users_file.into(),
        }
    }
}
