use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::NaiveDate;

use crate::models::{AgentRecord, Granularity, MetricRow, Metrics, RankEntry, ScopeKey};

pub const TOP_N: usize = 3;

/// What a reduction groups by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grain {
    /// Everything in one row, as shown on the KPI cards.
    Total,
    /// One row per month or day.
    Period,
    /// One row per agent, across periods.
    Agent,
    /// One row per agent per month or day.
    PeriodAgent,
}

impl Grain {
    fn by_period(self) -> bool {
        matches!(self, Grain::Period | Grain::PeriodAgent)
    }

    fn by_agent(self) -> bool {
        matches!(self, Grain::Agent | Grain::PeriodAgent)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct GroupKey {
    period: Option<(u32, Granularity, String)>,
    agent: Option<String>,
}

#[derive(Debug, Default)]
struct Sum {
    total: u64,
    seen: bool,
}

impl Sum {
    fn push(&mut self, value: Option<u64>) {
        if let Some(value) = value {
            self.total = self.total.saturating_add(value);
            self.seen = true;
        }
    }

    fn value(&self) -> Option<u64> {
        self.seen.then_some(self.total)
    }
}

/// Arithmetic mean that ignores missing values.
#[derive(Debug, Default)]
struct Mean {
    total: f64,
    count: usize,
}

impl Mean {
    fn push(&mut self, value: Option<f64>) {
        if let Some(value) = value {
            self.total += value;
            self.count += 1;
        }
    }

    fn value(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.total / self.count as f64)
        }
    }
}

#[derive(Debug, Default)]
struct Group {
    scope: Option<ScopeKey>,
    handled: Sum,
    tma: Mean,
    tme: Mean,
    tmia: Mean,
    tmic: Mean,
    fcr: Mean,
    satisfaction: Mean,
    nps: Mean,
    evaluations: Sum,
}

impl Group {
    fn push(&mut self, record: &AgentRecord) {
        let metrics = &record.metrics;
        self.handled.push(metrics.handled);
        self.tma.push(metrics.tma);
        self.tme.push(metrics.tme);
        self.tmia.push(metrics.tmia);
        self.tmic.push(metrics.tmic);
        self.fcr.push(metrics.fcr);
        self.satisfaction.push(metrics.satisfaction);
        self.nps.push(metrics.nps);
        self.evaluations.push(metrics.evaluations);
    }

    fn metrics(&self) -> Metrics {
        Metrics {
            handled: self.handled.value(),
            tma: self.tma.value(),
            tme: self.tme.value(),
            tmia: self.tmia.value(),
            tmic: self.tmic.value(),
            fcr: self.fcr.value(),
            satisfaction: self.satisfaction.value(),
            nps: self.nps.value(),
            evaluations: self.evaluations.value(),
        }
    }
}

/// Groups `records` by `grain`, summing counts and averaging the rest.
/// Rows without an agent name are dropped first. Output is ordered by the
/// period's sort index, then by agent.
pub fn aggregate(records: &[AgentRecord], grain: Grain) -> Vec<MetricRow> {
    let mut groups: HashMap<GroupKey, Group> = HashMap::new();

    for record in records.iter() {
        let agent = record.agent.trim();
        if agent.is_empty() {
            continue;
        }

        let key = GroupKey {
            period: grain.by_period().then(|| {
                (
                    record.scope.sort_index,
                    record.scope.granularity,
                    record.scope.label.clone(),
                )
            }),
            agent: grain.by_agent().then(|| agent.to_string()),
        };

        let group = groups.entry(key).or_insert_with(|| Group {
            scope: grain.by_period().then(|| record.scope.clone()),
            ..Group::default()
        });
        group.push(record);
    }

    let mut rows: Vec<MetricRow> = groups
        .into_iter()
        .map(|(key, group)| MetricRow {
            metrics: group.metrics(),
            scope: group.scope,
            agent: key.agent,
        })
        .collect();

    rows.sort_by(|a, b| {
        let period = |row: &MetricRow| {
            row.scope
                .as_ref()
                .map(|scope| (scope.sort_index, scope.label.clone()))
        };
        period(a)
            .cmp(&period(b))
            .then_with(|| a.agent.cmp(&b.agent))
    });
    rows
}

/// One row per agent, best satisfaction first, then by handled volume.
/// Agents without a satisfaction value go last.
pub fn agent_comparison(records: &[AgentRecord]) -> Vec<MetricRow> {
    let mut rows = aggregate(records, Grain::Agent);
    rows.sort_by(|a, b| {
        let satisfaction = match (a.metrics.satisfaction, b.metrics.satisfaction) {
            (Some(a), Some(b)) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        satisfaction.then_with(|| b.metrics.handled.cmp(&a.metrics.handled))
    });
    rows
}

/// KPI figures over the whole set.
pub fn totals(records: &[AgentRecord]) -> Metrics {
    aggregate(records, Grain::Total)
        .into_iter()
        .next()
        .map(|row| row.metrics)
        .unwrap_or_default()
}

pub fn filter_agent(records: &[AgentRecord], agent: &str) -> Vec<AgentRecord> {
    records
        .iter()
        .filter(|record| record.agent == agent)
        .cloned()
        .collect()
}

/// Keeps records dated within `from..=to`. Undated records never match.
pub fn filter_dates(records: &[AgentRecord], from: NaiveDate, to: NaiveDate) -> Vec<AgentRecord> {
    records
        .iter()
        .filter(|record| matches!(record.date, Some(date) if date >= from && date <= to))
        .cloned()
        .collect()
}

pub fn date_bounds(records: &[AgentRecord]) -> Option<(NaiveDate, NaiveDate)> {
    let mut dates = records.iter().filter_map(|record| record.date);
    let first = dates.next()?;
    Some(dates.fold((first, first), |(min, max), date| {
        (min.min(date), max.max(date))
    }))
}

/// Distinct non-blank agent names, sorted.
pub fn agent_names(records: &[AgentRecord]) -> Vec<String> {
    let mut names: Vec<String> = records
        .iter()
        .map(|record| record.agent.trim())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect();
    names.sort();
    names.dedup();
    names
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankMetric {
    Fcr,
    Satisfaction,
    Tmia,
}

impl RankMetric {
    pub fn label(self) -> &'static str {
        match self {
            RankMetric::Fcr => "FCR",
            RankMetric::Satisfaction => "Satisfacao",
            RankMetric::Tmia => "TMIA",
        }
    }

    fn value(self, metrics: &Metrics) -> Option<f64> {
        match self {
            RankMetric::Fcr => metrics.fcr,
            RankMetric::Satisfaction => metrics.satisfaction,
            RankMetric::Tmia => metrics.tmia,
        }
    }

    /// 0% and 100% are placeholders in the exports, not real results.
    fn is_eligible(self, value: f64) -> bool {
        match self {
            RankMetric::Fcr => value > 0.0 && value < 1.0,
            RankMetric::Satisfaction => value > 0.0 && value < 5.0,
            RankMetric::Tmia => value > 0.0,
        }
    }

    fn higher_is_better(self) -> bool {
        matches!(self, RankMetric::Fcr | RankMetric::Satisfaction)
    }
}

/// Best `n` rows for `metric`. Ties go to the agent with more handled contacts.
pub fn top_n(rows: &[MetricRow], metric: RankMetric, n: usize) -> Vec<RankEntry> {
    let mut entries: Vec<RankEntry> = rows
        .iter()
        .filter_map(|row| {
            let agent = row.agent.clone()?;
            let value = metric.value(&row.metrics)?;
            metric.is_eligible(value).then(|| RankEntry {
                agent,
                value,
                handled: row.metrics.handled.unwrap_or(0),
            })
        })
        .collect();

    entries.sort_by(|a, b| {
        let primary = a.value.partial_cmp(&b.value).unwrap_or(Ordering::Equal);
        let primary = if metric.higher_is_better() {
            primary.reverse()
        } else {
            primary
        };
        primary.then_with(|| b.handled.cmp(&a.handled))
    });
    entries.truncate(n);
    entries
}

/// Top-three tables for one ranking source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RankingBoard {
    pub fcr: Vec<RankEntry>,
    pub satisfaction: Vec<RankEntry>,
    pub tmia: Vec<RankEntry>,
}

/// Consolidates `records` per agent and ranks them. Meant for weekly or
/// monthly exports, never for calendar-filtered daily data.
pub fn ranking_board(records: &[AgentRecord]) -> RankingBoard {
    let per_agent = aggregate(records, Grain::Agent);
    RankingBoard {
        fcr: top_n(&per_agent, RankMetric::Fcr, TOP_N),
        satisfaction: top_n(&per_agent, RankMetric::Satisfaction, TOP_N),
        tmia: top_n(&per_agent, RankMetric::Tmia, TOP_N),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::{parse_count, parse_time};
    use crate::models::Month;

    fn record(agent: &str, month: Month, metrics: Metrics) -> AgentRecord {
        AgentRecord {
            agent: agent.to_string(),
            metrics,
            scope: ScopeKey::month(month),
            date: None,
        }
    }

    fn ranked(agent: &str, handled: u64, fcr: f64, satisfaction: f64, tmia: f64) -> AgentRecord {
        record(
            agent,
            Month::Outubro,
            Metrics {
                handled: Some(handled),
                fcr: Some(fcr),
                satisfaction: Some(satisfaction),
                tmia: Some(tmia),
                ..Metrics::default()
            },
        )
    }

    #[test]
    fn sums_counts_and_averages_times_per_agent() {
        let records = vec![
            record(
                "Ana",
                Month::Outubro,
                Metrics {
                    handled: Some(10),
                    tma: Some(parse_time("01:30")),
                    ..Metrics::default()
                },
            ),
            record(
                "Ana",
                Month::Outubro,
                Metrics {
                    handled: Some(20),
                    tma: Some(parse_time("02:00")),
                    ..Metrics::default()
                },
            ),
        ];

        let rows = aggregate(&records, Grain::Agent);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].agent.as_deref(), Some("Ana"));
        assert_eq!(rows[0].metrics.handled, Some(30));
        assert!((rows[0].metrics.tma.unwrap() - 1.75).abs() < 1e-9);
    }

    #[test]
    fn huge_counts_do_not_overflow_the_sum() {
        let huge = |handled: Option<u64>| {
            record("Ana", Month::Outubro, Metrics { handled, ..Metrics::default() })
        };

        let rows = aggregate(&[huge(Some(u64::MAX)), huge(Some(5))], Grain::Agent);
        assert_eq!(rows[0].metrics.handled, Some(u64::MAX));

        let rows = aggregate(
            &[huge(parse_count("1e20")), huge(parse_count("5"))],
            Grain::Agent,
        );
        assert_eq!(rows[0].metrics.handled, Some(5));
    }

    #[test]
    fn missing_values_stay_out_of_means() {
        let records = vec![
            record("Ana", Month::Maio, Metrics { fcr: Some(0.8), ..Metrics::default() }),
            record("Bia", Month::Maio, Metrics { fcr: None, ..Metrics::default() }),
            record("Caio", Month::Maio, Metrics { fcr: Some(0.6), evaluations: Some(3), ..Metrics::default() }),
        ];

        let kpi = totals(&records);
        assert!((kpi.fcr.unwrap() - 0.7).abs() < 1e-9);
        assert_eq!(kpi.evaluations, Some(3));
        assert_eq!(kpi.handled, None);
        assert_eq!(kpi.nps, None);
    }

    #[test]
    fn blank_agents_are_dropped() {
        let records = vec![
            record("  ", Month::Maio, Metrics { handled: Some(99), ..Metrics::default() }),
            record("Ana", Month::Maio, Metrics { handled: Some(1), ..Metrics::default() }),
        ];
        assert_eq!(totals(&records).handled, Some(1));
        assert_eq!(agent_names(&records), vec!["Ana".to_string()]);
    }

    #[test]
    fn periods_sort_by_index_not_label() {
        let records: Vec<AgentRecord> = Month::ALL
            .iter()
            .rev()
            .map(|month| record("Ana", *month, Metrics { handled: Some(1), ..Metrics::default() }))
            .collect();

        let labels: Vec<String> = aggregate(&records, Grain::Period)
            .into_iter()
            .filter_map(|row| row.scope.map(|scope| scope.label))
            .collect();
        let expected: Vec<String> = Month::ALL.iter().map(|m| m.label()).collect();
        assert_eq!(labels, expected);
    }

    #[test]
    fn period_agent_grain_splits_both_ways() {
        let records = vec![
            record("Bia", Month::Abril, Metrics { handled: Some(1), ..Metrics::default() }),
            record("Ana", Month::Abril, Metrics { handled: Some(2), ..Metrics::default() }),
            record("Ana", Month::Janeiro, Metrics { handled: Some(3), ..Metrics::default() }),
        ];
        let rows = aggregate(&records, Grain::PeriodAgent);
        let keys: Vec<(String, String)> = rows
            .iter()
            .map(|row| {
                (
                    row.scope.as_ref().map(|s| s.label.clone()).unwrap_or_default(),
                    row.agent.clone().unwrap_or_default(),
                )
            })
            .collect();
        assert_eq!(
            keys,
            vec![
                ("Janeiro".to_string(), "Ana".to_string()),
                ("Abril".to_string(), "Ana".to_string()),
                ("Abril".to_string(), "Bia".to_string()),
            ]
        );
    }

    #[test]
    fn comparison_orders_by_satisfaction_then_volume() {
        let agent = |name: &str, handled: u64, satisfaction: Option<f64>| {
            record(
                name,
                Month::Outubro,
                Metrics {
                    handled: Some(handled),
                    satisfaction,
                    ..Metrics::default()
                },
            )
        };
        let records = vec![
            agent("Ana", 10, Some(4.0)),
            agent("Bia", 30, Some(4.5)),
            agent("Caio", 50, Some(4.0)),
            agent("Duda", 99, None),
            agent("Caio", 5, Some(4.0)),
        ];

        let order: Vec<(String, Option<u64>)> = agent_comparison(&records)
            .into_iter()
            .map(|row| (row.agent.unwrap_or_default(), row.metrics.handled))
            .collect();
        assert_eq!(
            order,
            vec![
                ("Bia".to_string(), Some(30)),
                ("Caio".to_string(), Some(55)),
                ("Ana".to_string(), Some(10)),
                ("Duda".to_string(), Some(99)),
            ]
        );
    }

    #[test]
    fn date_filter_excludes_undated_rows() {
        let day = |d: u32| NaiveDate::from_ymd_opt(2025, 10, d);
        let mut records = vec![
            record("Ana", Month::Outubro, Metrics::default()),
            record("Ana", Month::Outubro, Metrics::default()),
            record("Ana", Month::Outubro, Metrics::default()),
        ];
        records[0].date = day(1);
        records[1].date = day(15);

        assert_eq!(date_bounds(&records), Some((day(1).unwrap(), day(15).unwrap())));
        let kept = filter_dates(&records, day(10).unwrap(), day(31).unwrap());
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].date, day(15));
    }

    #[test]
    fn ranking_excludes_placeholder_extremes() {
        let records = vec![
            ranked("Perfeito", 50, 1.0, 5.0, 0.0),
            ranked("Zerado", 50, 0.0, 0.0, 0.0),
            ranked("Ana", 10, 0.9, 4.0, 2.0),
            ranked("Bia", 30, 0.8, 4.5, 1.0),
        ];
        let board = ranking_board(&records);
        let fcr: Vec<&str> = board.fcr.iter().map(|e| e.agent.as_str()).collect();
        assert_eq!(fcr, vec!["Ana", "Bia"]);
        let sat: Vec<&str> = board.satisfaction.iter().map(|e| e.agent.as_str()).collect();
        assert_eq!(sat, vec!["Bia", "Ana"]);
        let tmia: Vec<&str> = board.tmia.iter().map(|e| e.agent.as_str()).collect();
        assert_eq!(tmia, vec!["Bia", "Ana"]);
    }

    #[test]
    fn ranking_breaks_ties_on_volume_and_keeps_three() {
        let records = vec![
            ranked("Ana", 10, 0.9, 4.0, 2.0),
            ranked("Bia", 40, 0.9, 4.0, 2.0),
            ranked("Caio", 20, 0.9, 4.0, 2.0),
            ranked("Duda", 90, 0.5, 3.0, 3.0),
        ];
        let board = ranking_board(&records);
        let fcr: Vec<&str> = board.fcr.iter().map(|e| e.agent.as_str()).collect();
        assert_eq!(fcr, vec!["Bia", "Caio", "Ana"]);
        let tmia: Vec<&str> = board.tmia.iter().map(|e| e.agent.as_str()).collect();
        assert_eq!(tmia, vec!["Bia", "Caio", "Ana"]);
    }

    #[test]
    fn time_ranking_prefers_lower_values() {
        let rows = aggregate(
            &[
                ranked("Lento", 5, 0.5, 3.0, 9.0),
                ranked("Rapido", 5, 0.5, 3.0, 1.0),
            ],
            Grain::Agent,
        );
        let top = top_n(&rows, RankMetric::Tmia, 1);
        assert_eq!(top[0].agent, "Rapido");
        assert_eq!(top.len(), 1);
    }
}
