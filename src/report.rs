use std::fmt::Write;

use crate::aggregate::{RankMetric, RankingBoard};
use crate::convert::{format_count, format_decimal, format_fcr, format_satisfaction, format_time};
use crate::dashboard::{AgentView, DashboardView, GlobalView, RankingSection};
use crate::error::Diagnostic;
use crate::models::{EvaluationRecord, MetricRow, Metrics, Month, RankEntry};
use crate::store::Accounts;

const METRIC_HEADERS: [&str; 8] = [
    "QTD Atendimento",
    "TMA",
    "TME",
    "TMIA",
    "FCR",
    "Satisfacao",
    "NPS",
    "QTD Avaliacoes",
];

fn metric_cells(metrics: &Metrics) -> [String; 8] {
    [
        format_count(metrics.handled),
        format_time(metrics.tma),
        format_time(metrics.tme),
        format_time(metrics.tmia),
        format_fcr(metrics.fcr),
        format_satisfaction(metrics.satisfaction),
        format_decimal(metrics.nps),
        format_count(metrics.evaluations),
    ]
}

fn table_row(output: &mut String, cells: &[String]) {
    let _ = writeln!(output, "| {} |", cells.join(" | "));
}

fn table_header(output: &mut String, headers: &[&str]) {
    let _ = writeln!(output, "| {} |", headers.join(" | "));
    let _ = writeln!(
        output,
        "|{}",
        headers.iter().map(|_| " --- |").collect::<String>()
    );
}

fn write_kpis(output: &mut String, metrics: &Metrics) {
    for (label, value) in METRIC_HEADERS.iter().zip(metric_cells(metrics)) {
        let _ = writeln!(output, "- **{label}**: {value}");
    }
}

/// Metric table keyed by period label, optionally with an agent column.
fn write_metric_table(output: &mut String, period_header: &str, rows: &[MetricRow], with_agent: bool) {
    let mut headers = vec![period_header];
    if with_agent {
        headers.push("Agente");
    }
    headers.extend(METRIC_HEADERS);
    table_header(output, &headers);

    for row in rows {
        let mut cells = vec![row
            .scope
            .as_ref()
            .map(|scope| scope.label.clone())
            .unwrap_or_default()];
        if with_agent {
            cells.push(row.agent.clone().unwrap_or_default());
        }
        cells.extend(metric_cells(&row.metrics));
        table_row(output, &cells);
    }
}

fn write_agent_table(output: &mut String, rows: &[MetricRow]) {
    let mut headers = vec!["Agente"];
    headers.extend(METRIC_HEADERS);
    table_header(output, &headers);

    for row in rows {
        let mut cells = vec![row.agent.clone().unwrap_or_default()];
        cells.extend(metric_cells(&row.metrics));
        table_row(output, &cells);
    }
}

fn write_evaluations(output: &mut String, evaluations: &[EvaluationRecord]) {
    let with_comment = evaluations.iter().any(|e| e.comment.is_some());
    let mut headers = vec!["Dia", "Protocolo", "Nota"];
    if with_comment {
        headers.push("Comentario");
    }
    table_header(output, &headers);

    for evaluation in evaluations {
        let mut cells = vec![
            evaluation.scope.label.clone(),
            evaluation.protocol.clone().unwrap_or_default(),
            evaluation.score.clone().unwrap_or_default(),
        ];
        if with_comment {
            cells.push(evaluation.comment.clone().unwrap_or_default());
        }
        table_row(output, &cells);
    }

    let scores: Vec<f64> = evaluations.iter().filter_map(|e| e.score_value).collect();
    if !scores.is_empty() {
        let average = scores.iter().sum::<f64>() / scores.len() as f64;
        let _ = writeln!(output);
        let _ = writeln!(
            output,
            "Average score: {average:.2} over {} evaluations",
            scores.len()
        );
    }
}

fn write_top(output: &mut String, title: &str, entries: &[RankEntry], format: impl Fn(f64) -> String) {
    let _ = writeln!(output, "**{title}**");
    if entries.is_empty() {
        let _ = writeln!(output, "- no eligible agents");
        return;
    }
    for (position, entry) in entries.iter().enumerate() {
        let _ = writeln!(
            output,
            "{}. {} ({}, {} atendimentos)",
            position + 1,
            entry.agent,
            format(entry.value),
            entry.handled
        );
    }
}

fn write_board(output: &mut String, board: &RankingBoard) {
    write_top(output, RankMetric::Fcr.label(), &board.fcr, |v| format_fcr(Some(v)));
    write_top(output, RankMetric::Satisfaction.label(), &board.satisfaction, |v| {
        format_satisfaction(Some(v))
    });
    write_top(output, RankMetric::Tmia.label(), &board.tmia, |v| format_time(Some(v)));
}

fn write_rankings(output: &mut String, sections: &[RankingSection]) {
    for section in sections {
        let _ = writeln!(output, "### {}", section.title);
        match (&section.board, &section.note) {
            (Some(board), _) => write_board(output, board),
            (None, Some(note)) => {
                let _ = writeln!(output, "_{note}_");
            }
            (None, None) => {
                let _ = writeln!(output, "_no ranking data_");
            }
        }
        let _ = writeln!(output);
    }
}

fn write_diagnostics(output: &mut String, diagnostics: &[Diagnostic]) {
    if diagnostics.is_empty() {
        return;
    }
    let _ = writeln!(output, "## Warnings");
    for diagnostic in diagnostics {
        let _ = writeln!(output, "- {diagnostic}");
    }
}

pub fn build_agent_report(view: &AgentView) -> String {
    let mut output = String::new();
    let month = view.month.label();

    let _ = writeln!(output, "# Agent Performance: {}", view.agent);
    let _ = writeln!(output);
    let _ = writeln!(output, "## {month} - Monthly Result");

    match &view.kpis {
        Some(kpis) => {
            write_kpis(&mut output, kpis);
            let _ = writeln!(output);
            write_metric_table(&mut output, "Mês", &view.month_rows, true);
        }
        None => {
            let _ = writeln!(output, "No data for {} in {month}.", view.agent);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Month by Month");
    if view.history.is_empty() {
        let _ = writeln!(output, "No history available.");
    } else {
        write_metric_table(&mut output, "Mês", &view.history, false);
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Day by Day ({month})");
    if view.daily.is_empty() {
        let _ = writeln!(output, "No daily data for {} in {month}.", view.agent);
    } else {
        write_metric_table(&mut output, "Dia", &view.daily, false);
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Evaluations");
    if view.evaluations.is_empty() {
        let _ = writeln!(output, "No evaluations for {} in {month}.", view.agent);
    } else {
        write_evaluations(&mut output, &view.evaluations);
    }

    let _ = writeln!(output);
    write_diagnostics(&mut output, &view.diagnostics);
    output
}

pub fn build_global_report(view: &GlobalView) -> String {
    let mut output = String::new();
    let month = view.month.label();

    let _ = writeln!(output, "# Global Dashboard - {month}");
    match view.period {
        Some((from, to)) => {
            let _ = writeln!(
                output,
                "Daily data from {} to {}",
                from.format("%d/%m/%Y"),
                to.format("%d/%m/%Y")
            );
        }
        None => {
            let _ = writeln!(output, "No daily data; showing the monthly consolidated file.");
        }
    }
    let _ = writeln!(output, "Agents: {}", view.agents.len());
    let _ = writeln!(output);

    let _ = writeln!(output, "## Aggregated Metrics");
    write_kpis(&mut output, &view.kpis);
    let _ = writeln!(output);

    let _ = writeln!(output, "## Agent Comparison");
    if view.comparison.is_empty() {
        let _ = writeln!(output, "No agent rows for {month}.");
    } else {
        write_agent_table(&mut output, &view.comparison);
    }
    let _ = writeln!(output);

    let _ = writeln!(output, "## Top 3 Rankings");
    let _ = writeln!(output, "Rankings use the consolidated weekly and monthly files and ignore the calendar window.");
    let _ = writeln!(output);
    write_rankings(&mut output, &view.rankings);

    let _ = writeln!(output, "## Month by Month (all agents)");
    if view.history.is_empty() {
        let _ = writeln!(output, "No history available.");
    } else {
        write_metric_table(&mut output, "Mês", &view.history, false);
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Day by Day (all agents)");
    if view.daily.is_empty() {
        let _ = writeln!(output, "No daily data for {month}.");
    } else {
        write_metric_table(&mut output, "Dia", &view.daily, true);
    }

    let _ = writeln!(output);
    write_diagnostics(&mut output, &view.diagnostics);
    output
}

pub fn build_report(view: &DashboardView) -> String {
    match view {
        DashboardView::Agent(view) => build_agent_report(view),
        DashboardView::Global(view) => build_global_report(view),
    }
}

pub fn build_user_table(accounts: &Accounts) -> String {
    let mut output = String::new();
    table_header(&mut output, &["Login", "Agente", "Role", "Primeiro acesso"]);
    for (login, account) in accounts {
        table_row(
            &mut output,
            &[
                login.clone(),
                account.agent.clone(),
                account.role.as_str().to_string(),
                if account.first_access { "yes" } else { "no" }.to_string(),
            ],
        );
    }
    output
}

pub fn build_month_list(months: &[Month]) -> String {
    if months.is_empty() {
        return "No monthly files found (expected e.g. janeiro.csv).\n".to_string();
    }
    months
        .iter()
        .map(|month| format!("- {}\n", month.label()))
        .collect()
}
