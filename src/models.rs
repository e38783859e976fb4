use chrono::NaiveDate;

/// Calendar months in the order the exports are named.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Month {
    Janeiro,
    Fevereiro,
    Marco,
    Abril,
    Maio,
    Junho,
    Julho,
    Agosto,
    Setembro,
    Outubro,
    Novembro,
    Dezembro,
}

impl Month {
    pub const ALL: [Month; 12] = [
        Month::Janeiro,
        Month::Fevereiro,
        Month::Marco,
        Month::Abril,
        Month::Maio,
        Month::Junho,
        Month::Julho,
        Month::Agosto,
        Month::Setembro,
        Month::Outubro,
        Month::Novembro,
        Month::Dezembro,
    ];

    /// Lower-case name used for file and folder names.
    pub fn file_stem(self) -> &'static str {
        match self {
            Month::Janeiro => "janeiro",
            Month::Fevereiro => "fevereiro",
            Month::Marco => "março",
            Month::Abril => "abril",
            Month::Maio => "maio",
            Month::Junho => "junho",
            Month::Julho => "julho",
            Month::Agosto => "agosto",
            Month::Setembro => "setembro",
            Month::Outubro => "outubro",
            Month::Novembro => "novembro",
            Month::Dezembro => "dezembro",
        }
    }

    /// ASCII spelling some exports use instead of [`Month::file_stem`].
    pub fn ascii_stem(self) -> Option<&'static str> {
        match self {
            Month::Marco => Some("marco"),
            _ => None,
        }
    }

    pub fn label(self) -> String {
        let stem = self.file_stem();
        let mut chars = stem.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }

    /// Zero-based position in the calendar.
    pub fn sort_index(self) -> u32 {
        self as u32
    }

    /// One-based month number.
    pub fn number(self) -> u32 {
        self.sort_index() + 1
    }

    pub fn from_name(name: &str) -> Option<Month> {
        let name = name.trim().to_lowercase();
        Month::ALL.iter().copied().find(|month| {
            month.file_stem() == name || month.ascii_stem() == Some(name.as_str())
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Granularity {
    Month,
    Day,
    WeekCurrent,
    WeekPrevious,
}

/// The two weekly ranking exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Week {
    Current,
    Previous,
}

impl Week {
    pub fn granularity(self) -> Granularity {
        match self {
            Week::Current => Granularity::WeekCurrent,
            Week::Previous => Granularity::WeekPrevious,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Week::Current => "Semana atual",
            Week::Previous => "Semana anterior",
        }
    }
}

/// Identifies the period a record belongs to. `sort_index` carries the
/// chronological order the label alone cannot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopeKey {
    pub granularity: Granularity,
    pub label: String,
    pub sort_index: u32,
}

impl ScopeKey {
    pub fn month(month: Month) -> Self {
        Self {
            granularity: Granularity::Month,
            label: month.label(),
            sort_index: month.sort_index(),
        }
    }

    pub fn day(label: impl Into<String>, day: u32) -> Self {
        Self {
            granularity: Granularity::Day,
            label: label.into(),
            sort_index: day,
        }
    }

    pub fn week(granularity: Granularity, label: impl Into<String>) -> Self {
        Self {
            granularity,
            label: label.into(),
            sort_index: 0,
        }
    }
}

/// Metric columns of one row or one aggregated group. `None` means the
/// column was absent or the value could not be read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metrics {
    pub handled: Option<u64>,
    pub tma: Option<f64>,
    pub tme: Option<f64>,
    pub tmia: Option<f64>,
    pub tmic: Option<f64>,
    pub fcr: Option<f64>,
    pub satisfaction: Option<f64>,
    pub nps: Option<f64>,
    pub evaluations: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentRecord {
    pub agent: String,
    pub metrics: Metrics,
    pub scope: ScopeKey,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationRecord {
    pub protocol: Option<String>,
    pub score: Option<String>,
    /// `score` read as a number, when it is one.
    pub score_value: Option<f64>,
    pub comment: Option<String>,
    pub scope: ScopeKey,
}

/// Output of a group-by reduction.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRow {
    pub scope: Option<ScopeKey>,
    pub agent: Option<String>,
    pub metrics: Metrics,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankEntry {
    pub agent: String,
    pub value: f64,
    pub handled: u64,
}
