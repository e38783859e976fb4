use std::collections::HashMap;

pub const AGENT: &str = "Agente";
pub const HANDLED: &str = "QTD Atendimento";
pub const TMA: &str = "TMA";
pub const TME: &str = "TME";
pub const TMIA: &str = "TMIA";
pub const TMIC: &str = "TMIC";
pub const FCR: &str = "FCR";
pub const SATISFACTION: &str = "Satisfacao";
pub const NPS: &str = "NPS";
pub const EVALUATIONS: &str = "QTD Avaliacoes";

pub const PROTOCOL: &str = "Protocolo";
pub const SCORE: &str = "Nota";
pub const SOURCE_DAY: &str = "Dia (CSV)";
pub const COMMENT: &str = "Comentario";

pub const TIME_COLUMNS: [&str; 4] = [TMA, TME, TMIA, TMIC];

pub const EXPECTED_COLUMNS: [&str; 10] = [
    HANDLED,
    TMA,
    TME,
    TMIA,
    TMIC,
    FCR,
    SATISFACTION,
    NPS,
    EVALUATIONS,
    AGENT,
];

/// Aliases for monthly, daily and weekly exports, keyed by the stripped header.
pub const METRIC_ALIASES: &[(&str, &str)] = &[
    ("NOM_AGENTE", AGENT),
    ("QTDATENDIMENTO", HANDLED),
    ("SATISFACAO", SATISFACTION),
    ("QTDSATISFACAO", EVALUATIONS),
    ("QTD_ATENDIMENTO", HANDLED),
    ("QTD_SATISFACAO", EVALUATIONS),
    ("AGENTE", AGENT),
    ("QTDAVALIACOES", EVALUATIONS),
];

/// Aliases for the per-day evaluation exports.
pub const EVALUATION_ALIASES: &[(&str, &str)] = &[
    ("NOM_AGENTE", AGENT),
    ("NUM_PROTOCOLO", PROTOCOL),
    ("NOM_VALOR", SCORE),
    ("DIA", SOURCE_DAY),
    ("AGENTE", AGENT),
    ("PROTOCOLO", PROTOCOL),
    ("NOTA", SCORE),
    ("DIACSV", SOURCE_DAY),
    ("COMENTARIO", COMMENT),
    // "Comentário" loses its accented letter when stripped
    ("COMENTRIO", COMMENT),
];

/// Trims, upper-cases and drops everything outside `[A-Z0-9_]`, then applies `aliases`.
pub fn canonical_header(raw: &str, aliases: &[(&str, &str)]) -> String {
    let stripped: String = raw
        .trim()
        .to_uppercase()
        .chars()
        .filter(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || *c == '_')
        .collect();

    aliases
        .iter()
        .find(|(key, _)| *key == stripped)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or(stripped)
}

pub fn normalize_headers<'a, I>(raw: I, aliases: &[(&str, &str)]) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    raw.into_iter()
        .map(|header| canonical_header(header, aliases))
        .collect()
}

/// Expected columns absent from `headers`, in the fixed expected order.
pub fn missing_expected(headers: &[String]) -> Vec<&'static str> {
    EXPECTED_COLUMNS
        .iter()
        .copied()
        .filter(|expected| !headers.iter().any(|h| h == expected))
        .collect()
}

/// Position lookup over a normalized header row. The first occurrence of a
/// duplicated name wins.
#[derive(Debug, Clone, Default)]
pub struct ColumnIndex {
    positions: HashMap<String, usize>,
}

impl ColumnIndex {
    pub fn new(headers: &[String]) -> Self {
        let mut positions = HashMap::new();
        for (idx, header) in headers.iter().enumerate() {
            positions.entry(header.clone()).or_insert(idx);
        }
        Self { positions }
    }

    pub fn get(&self, column: &str) -> Option<usize> {
        self.positions.get(column).copied()
    }

    pub fn contains(&self, column: &str) -> bool {
        self.positions.contains_key(column)
    }
}
