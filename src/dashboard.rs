use chrono::NaiveDate;

use crate::aggregate::{self, Grain, RankingBoard};
use crate::error::{AuthError, Diagnostic};
use crate::loader::{Dataset, Loader};
use crate::models::{AgentRecord, EvaluationRecord, MetricRow, Metrics, Month, Week};
use crate::session::Session;

#[derive(Debug, Clone, Default)]
pub struct Filters {
    pub agent: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

/// One agent's month, history, days and evaluations.
#[derive(Debug, Clone)]
pub struct AgentView {
    pub agent: String,
    pub month: Month,
    pub kpis: Option<Metrics>,
    pub month_rows: Vec<MetricRow>,
    pub history: Vec<MetricRow>,
    pub daily: Vec<MetricRow>,
    pub evaluations: Vec<EvaluationRecord>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone)]
pub struct RankingSection {
    pub title: String,
    pub board: Option<RankingBoard>,
    pub note: Option<String>,
}

/// The admin overview of every agent in a month.
#[derive(Debug, Clone)]
pub struct GlobalView {
    pub month: Month,
    /// Calendar window applied to daily data, when daily data exists.
    pub period: Option<(NaiveDate, NaiveDate)>,
    pub kpis: Metrics,
    /// Per-agent figures over the same rows as `kpis`.
    pub comparison: Vec<MetricRow>,
    pub rankings: Vec<RankingSection>,
    pub history: Vec<MetricRow>,
    pub daily: Vec<MetricRow>,
    pub agents: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone)]
pub enum DashboardView {
    Agent(AgentView),
    Global(GlobalView),
}

/// Latest month with a consolidated file unless one was asked for.
pub fn select_month(loader: &Loader, requested: Option<Month>) -> Option<Month> {
    requested.or_else(|| loader.available_months().last().copied())
}

/// Users always see their own agent; admins see one agent when `filters`
/// names one and the global view otherwise.
pub fn build(
    session: &Session,
    loader: &mut Loader,
    month: Month,
    filters: &Filters,
) -> Result<DashboardView, AuthError> {
    session.require_dashboard()?;

    if !session.is_admin() {
        return Ok(DashboardView::Agent(agent_view(
            loader,
            month,
            &session.agent,
            filters,
        )));
    }

    match filters.agent.as_deref() {
        Some(agent) => Ok(DashboardView::Agent(agent_view(loader, month, agent, filters))),
        None => Ok(DashboardView::Global(global_view(loader, month, filters))),
    }
}

fn collect<T>(diagnostics: &mut Vec<Diagnostic>, dataset: &Dataset<T>) {
    for diagnostic in &dataset.diagnostics {
        if !diagnostics.contains(diagnostic) {
            diagnostics.push(diagnostic.clone());
        }
    }
}

fn within_window(records: &[AgentRecord], filters: &Filters) -> (Vec<AgentRecord>, Option<(NaiveDate, NaiveDate)>) {
    let Some((min, max)) = aggregate::date_bounds(records) else {
        return (Vec::new(), None);
    };
    let from = filters.from.unwrap_or(min);
    let to = filters.to.unwrap_or(max);
    if from > to {
        tracing::warn!("empty calendar window {from} .. {to}");
    }
    (aggregate::filter_dates(records, from, to), Some((from, to)))
}

pub fn agent_view(loader: &mut Loader, month: Month, agent: &str, filters: &Filters) -> AgentView {
    let mut diagnostics = Vec::new();

    let consolidated = loader.month(month);
    collect(&mut diagnostics, &consolidated);
    let month_records = aggregate::filter_agent(&consolidated.rows, agent);
    let kpis = (!month_records.is_empty()).then(|| aggregate::totals(&month_records));
    let month_rows = aggregate::aggregate(&month_records, Grain::PeriodAgent);

    let history = loader.history();
    collect(&mut diagnostics, &history);
    let history = aggregate::aggregate(
        &aggregate::filter_agent(&history.rows, agent),
        Grain::Period,
    );

    let daily = loader.daily(month, Some(agent));
    collect(&mut diagnostics, &daily);
    let daily_records = if filters.from.is_some() || filters.to.is_some() {
        within_window(&daily.rows, filters).0
    } else {
        daily.rows.clone()
    };
    let daily = aggregate::aggregate(&daily_records, Grain::Period);

    let evaluations = loader.evaluations(month, agent);
    collect(&mut diagnostics, &evaluations);

    AgentView {
        agent: agent.to_string(),
        month,
        kpis,
        month_rows,
        history,
        daily,
        evaluations: evaluations.rows.clone(),
        diagnostics,
    }
}

fn ranking_section(title: String, dataset: &Dataset<AgentRecord>) -> RankingSection {
    if dataset.is_empty() {
        let note = dataset
            .diagnostics
            .first()
            .map(ToString::to_string)
            .unwrap_or_else(|| "no ranking data".to_string());
        return RankingSection {
            title,
            board: None,
            note: Some(note),
        };
    }
    RankingSection {
        title,
        board: Some(aggregate::ranking_board(&dataset.rows)),
        note: None,
    }
}

pub fn global_view(loader: &mut Loader, month: Month, filters: &Filters) -> GlobalView {
    let mut diagnostics = Vec::new();

    let consolidated = loader.month(month);
    collect(&mut diagnostics, &consolidated);
    let daily = loader.daily(month, None);
    collect(&mut diagnostics, &daily);

    let (selected, period) = match within_window(&daily.rows, filters) {
        (rows, Some(period)) => (rows, Some(period)),
        (_, None) => (consolidated.rows.clone(), None),
    };

    let agents = if period.is_some() {
        aggregate::agent_names(&daily.rows)
    } else {
        aggregate::agent_names(&consolidated.rows)
    };

    let mut rankings = Vec::new();
    for week in [Week::Current, Week::Previous] {
        let dataset = loader.weekly(week);
        collect(&mut diagnostics, &dataset);
        rankings.push(ranking_section(week.label().to_string(), &dataset));
    }
    rankings.push(ranking_section(
        format!("{} (consolidado)", month.label()),
        &consolidated,
    ));

    let history = loader.history();
    collect(&mut diagnostics, &history);

    GlobalView {
        month,
        period,
        kpis: aggregate::totals(&selected),
        comparison: aggregate::agent_comparison(&selected),
        rankings,
        history: aggregate::aggregate(&history.rows, Grain::Period),
        daily: if period.is_some() {
            aggregate::aggregate(&selected, Grain::PeriodAgent)
        } else {
            Vec::new()
        },
        agents,
        diagnostics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DataLayout;
    use crate::store::{CredentialStore, Role, BOOTSTRAP_LOGIN, DEFAULT_PASSWORD};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    const HEADER: &str = "nom_agente,qtd atendimento,tma,tme,tmia,tmic,fcr,satisfacao,nps,qtdsatisfacao\n";

    fn write(dir: &Path, relative: &str, contents: &str) {
        let path = dir.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, format!("{HEADER}{contents}")).unwrap();
    }

    fn fixture() -> (TempDir, Loader, CredentialStore) {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("data");
        write(&data, "setembro.csv", "Ana,5,01:00,,02:00,,50,60,10,1\n");
        write(
            &data,
            "outubro.csv",
            "Ana,10,01:30,,01:00,,80,90,10,2\nBia,20,02:00,,02:00,,60,70,20,3\n",
        );
        write(&data, "outubro/01.10.csv", "Ana,4,01:00,,,,80,90,,\nBia,6,02:00,,,,60,70,,\n");
        write(&data, "outubro/02.10.csv", "Ana,6,02:00,,,,70,80,,\n");
        write(&data, "semana/ranking_semanal_atual.csv", "Ana,10,,,01:00,,80,90,,\n");

        let loader = Loader::new(DataLayout::new(&data)).with_year(2025);
        let store = CredentialStore::new(dir.path().join("users.json"));
        (dir, loader, store)
    }

    fn admin(store: &CredentialStore) -> Session {
        let mut session = Session::start(store, BOOTSTRAP_LOGIN, DEFAULT_PASSWORD).unwrap();
        session.change_password(store, "pw", "pw").unwrap();
        session
    }

    #[test]
    fn defaults_to_latest_month() {
        let (_dir, loader, _store) = fixture();
        assert_eq!(select_month(&loader, None), Some(Month::Outubro));
        assert_eq!(select_month(&loader, Some(Month::Maio)), Some(Month::Maio));
    }

    #[test]
    fn first_access_cannot_open_dashboard() {
        let (_dir, mut loader, store) = fixture();
        let session = Session::start(&store, BOOTSTRAP_LOGIN, DEFAULT_PASSWORD).unwrap();
        assert!(matches!(
            build(&session, &mut loader, Month::Outubro, &Filters::default()),
            Err(AuthError::PasswordChangeRequired)
        ));
    }

    #[test]
    fn users_only_see_their_agent() {
        let (_dir, mut loader, store) = fixture();
        store.create_manual("ana", "Ana", Role::User).unwrap();
        store.change_password("ana", "pw").unwrap();
        let session = Session::start(&store, "ana", "pw").unwrap();

        let filters = Filters {
            agent: Some("Bia".to_string()),
            ..Filters::default()
        };
        let DashboardView::Agent(view) = build(&session, &mut loader, Month::Outubro, &filters).unwrap() else {
            panic!("expected agent view");
        };
        assert_eq!(view.agent, "Ana");
        assert_eq!(view.kpis.as_ref().and_then(|k| k.handled), Some(10));
        let months: Vec<String> = view
            .history
            .iter()
            .filter_map(|row| row.scope.as_ref().map(|s| s.label.clone()))
            .collect();
        assert_eq!(months, vec!["Setembro".to_string(), "Outubro".to_string()]);
        assert_eq!(view.daily.len(), 2);
    }

    #[test]
    fn global_view_uses_calendar_window_for_kpis_only() {
        let (_dir, mut loader, store) = fixture();
        let session = admin(&store);
        let filters = Filters {
            from: NaiveDate::from_ymd_opt(2025, 10, 2),
            ..Filters::default()
        };

        let DashboardView::Global(view) = build(&session, &mut loader, Month::Outubro, &filters).unwrap() else {
            panic!("expected global view");
        };
        assert_eq!(
            view.period,
            Some((
                NaiveDate::from_ymd_opt(2025, 10, 2).unwrap(),
                NaiveDate::from_ymd_opt(2025, 10, 2).unwrap()
            ))
        );
        assert_eq!(view.kpis.handled, Some(6));
        assert_eq!(view.agents, vec!["Ana".to_string(), "Bia".to_string()]);
        let compared: Vec<Option<&str>> = view.comparison.iter().map(|r| r.agent.as_deref()).collect();
        assert_eq!(compared, vec![Some("Ana")]);

        // rankings come from the consolidated files, not the window
        let monthly = view.rankings[2].board.as_ref().unwrap();
        let fcr: Vec<&str> = monthly.fcr.iter().map(|e| e.agent.as_str()).collect();
        assert_eq!(fcr, vec!["Ana", "Bia"]);
        assert!(view.rankings[0].board.is_some());
        assert!(view.rankings[1].board.is_none());
        assert!(view.rankings[1].note.is_some());
    }

    #[test]
    fn global_comparison_ranks_agents_over_the_whole_window() {
        let (_dir, mut loader, store) = fixture();
        let session = admin(&store);

        let DashboardView::Global(view) =
            build(&session, &mut loader, Month::Outubro, &Filters::default()).unwrap()
        else {
            panic!("expected global view");
        };
        let compared: Vec<(Option<&str>, Option<u64>)> = view
            .comparison
            .iter()
            .map(|row| (row.agent.as_deref(), row.metrics.handled))
            .collect();
        assert_eq!(compared, vec![(Some("Ana"), Some(10)), (Some("Bia"), Some(6))]);
    }

    #[test]
    fn global_view_falls_back_to_consolidated_month() {
        let (_dir, mut loader, store) = fixture();
        let session = admin(&store);

        let DashboardView::Global(view) =
            build(&session, &mut loader, Month::Setembro, &Filters::default()).unwrap()
        else {
            panic!("expected global view");
        };
        assert_eq!(view.period, None);
        assert_eq!(view.kpis.handled, Some(5));
        assert!(view.daily.is_empty());
    }
}
