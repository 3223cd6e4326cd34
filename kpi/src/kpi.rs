//! KPI computation stage.
//!
//! Four independent indicators over one prepared collection. Callers filter
//! upstream (by sprint, type or month); nothing here restricts further.
//!
//! Thresholds:
//!   - deployment rate: `> 60` green, `< 40` red, otherwise yellow (40 and 60
//!     are both yellow)
//!   - schedule adherence: `>= 90` green, `>= 70` yellow, otherwise red
//!   - scope deviation: `<= 10` green, `<= 30` yellow, otherwise red
//!
//! Every ratio with a zero denominator is reported as `0` with the no-data
//! message.

use crate::prepare::parse_instant;
use crate::types::{KpiColor, KpiDashboardData, KpiResult, PreparedWorkItem};

pub const NO_DATA: &str = "Sem dados";
pub const DAYS_UNIT: &str = "dias";

pub const EPIC_TYPE: &str = "Epic";
pub const DEPLOYMENT_SOLUTION: &str = "implantação";
pub const DEVELOPMENT_SOLUTION: &str = "desenvolvimento";

const LEAD_TIME_HELP: &str = "Média da diferença absoluta entre Data Prospectar e Data Análise.";
const SCHEDULE_HELP: &str = "Entregas no prazo / Total fechado na sprint.";
const SCOPE_HELP: &str = "Itens Novos / Itens Planejados.";

pub fn compute_kpis(items: &[PreparedWorkItem]) -> KpiDashboardData {
    KpiDashboardData {
        analysis_lead_time: analysis_lead_time(items),
        deployment_rate: deployment_rate(items),
        schedule_adherence: schedule_adherence(items),
        scope_deviation: scope_deviation(items),
    }
}

fn no_data(help: Option<&str>) -> KpiResult {
    KpiResult {
        value: 0.0,
        message: Some(NO_DATA.to_string()),
        color: Some(KpiColor::Off),
        help: help.map(str::to_string),
        ..Default::default()
    }
}

fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    (part as f64 / whole as f64) * 100.0
}

/// Whole days elapsed between prospect and analysis, measured between
/// instants so differing offsets do not skew the span.
fn lead_time_days(item: &PreparedWorkItem) -> Option<i64> {
    item.parsed_prospect_date?;
    item.parsed_analysis_date?;
    let prospect = parse_instant(item.item.prospect_date.as_ref()?)?;
    let analysis = parse_instant(item.item.analysis_date.as_ref()?)?;
    Some((prospect - analysis).num_days().abs())
}

/// Mean of |prospect - analysis| in whole days.
pub fn analysis_lead_time(items: &[PreparedWorkItem]) -> KpiResult {
    let spans: Vec<i64> = items.iter().filter_map(lead_time_days).collect();

    if spans.is_empty() {
        return KpiResult {
            unit: Some(DAYS_UNIT.to_string()),
            ..no_data(Some(LEAD_TIME_HELP))
        };
    }

    let mean = spans.iter().sum::<i64>() as f64 / spans.len() as f64;
    KpiResult {
        value: mean,
        unit: Some(DAYS_UNIT.to_string()),
        help: Some(LEAD_TIME_HELP.to_string()),
        ..Default::default()
    }
}

pub fn classify_deployment(value: f64) -> (KpiColor, &'static str) {
    if value > 60.0 {
        (KpiColor::Green, "Foco em Entrega")
    } else if value < 40.0 {
        (KpiColor::Red, "Foco em Desenvolvimento")
    } else {
        (KpiColor::Yellow, "Equilíbrio")
    }
}

/// Share of deployment epics among epics tagged deployment or development.
pub fn deployment_rate(items: &[PreparedWorkItem]) -> KpiResult {
    let mut deployments = 0usize;
    let mut developments = 0usize;

    for prepared in items.iter().filter(|i| i.item.work_item_type == EPIC_TYPE) {
        let solution = prepared
            .item
            .solution_type
            .as_deref()
            .map(|s| s.trim().to_lowercase());
        match solution.as_deref() {
            Some(DEPLOYMENT_SOLUTION) => deployments += 1,
            Some(DEVELOPMENT_SOLUTION) => developments += 1,
            _ => {}
        }
    }

    let total = deployments + developments;
    if total == 0 {
        return no_data(None);
    }

    let value = percentage(deployments, total);
    let (color, label) = classify_deployment(value);
    KpiResult {
        value,
        message: Some(format!("{} Impl. | {} Dev.", deployments, developments)),
        classification: Some(label.to_string()),
        color: Some(color),
        ..Default::default()
    }
}

pub fn classify_schedule(value: f64) -> (KpiColor, &'static str) {
    if value >= 90.0 {
        (KpiColor::Green, "Excelente")
    } else if value >= 70.0 {
        (KpiColor::Yellow, "Razoável")
    } else {
        (KpiColor::Red, "Baixo Cumprimento")
    }
}

/// Share of closed items closed on or before their sprint's tolerance date.
///
/// An item whose sprint could not be resolved to dates is counted as late.
pub fn schedule_adherence(items: &[PreparedWorkItem]) -> KpiResult {
    let delivered: Vec<&PreparedWorkItem> = items
        .iter()
        .filter(|i| i.parsed_closed_date.is_some() && i.sprint_num.is_some())
        .collect();

    if delivered.is_empty() {
        return no_data(Some(SCHEDULE_HELP));
    }

    let on_time = delivered
        .iter()
        .filter(|i| matches!((i.parsed_closed_date, i.sprint_end_tol), (Some(closed), Some(tol)) if closed <= tol))
        .count();

    let value = percentage(on_time, delivered.len());
    let (color, label) = classify_schedule(value);
    KpiResult {
        value,
        message: Some(format!("{} ({}/{})", label, on_time, delivered.len())),
        classification: Some(label.to_string()),
        color: Some(color),
        help: Some(SCHEDULE_HELP.to_string()),
        ..Default::default()
    }
}

pub fn classify_scope(value: f64) -> (KpiColor, &'static str) {
    if value <= 10.0 {
        (KpiColor::Green, "Excelente")
    } else if value <= 30.0 {
        (KpiColor::Yellow, "Ajustes Naturais")
    } else {
        (KpiColor::Red, "Alto Desvio")
    }
}

/// Unplanned items (created on or after sprint start) per planned item.
pub fn scope_deviation(items: &[PreparedWorkItem]) -> KpiResult {
    let mut planned = 0usize;
    let mut unplanned = 0usize;

    for prepared in items.iter().filter(|i| i.sprint_num.is_some()) {
        if let (Some(created), Some(start)) = (prepared.parsed_created_date, prepared.sprint_start) {
            if created < start {
                planned += 1;
            } else {
                unplanned += 1;
            }
        }
    }

    // No planned items means no baseline; reported as 0, not infinity.
    if planned == 0 {
        return no_data(Some(SCOPE_HELP));
    }

    let value = percentage(unplanned, planned);
    let (color, label) = classify_scope(value);
    KpiResult {
        value,
        message: Some(format!("{} ({}/{})", label, unplanned, planned)),
        classification: Some(label.to_string()),
        color: Some(color),
        help: Some(SCOPE_HELP.to_string()),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::SprintCalendar;
    use crate::prepare::prepare_items;
    use crate::types::WorkItem;
    use proptest::prelude::*;

    fn item(id: i64, work_item_type: &str, created: &str, closed: &str) -> WorkItem {
        let mut item = WorkItem::new(id, work_item_type, "Sprint 36");
        item.state = "Closed".to_string();
        item.created_date = Some(created.into());
        item.closed_date = Some(closed.into());
        item
    }

    fn fixture() -> Vec<WorkItem> {
        let mut first = item(1, "Feature", "2026-02-01T10:00:00Z", "2026-02-10T10:00:00Z");
        first.prospect_date = Some("2026-02-01T10:00:00Z".into());
        first.analysis_date = Some("2026-02-03T10:00:00Z".into());
        first.solution_type = Some("Implantação".to_string());

        let mut second = item(2, "Epic", "2026-02-05T10:00:00Z", "2026-02-20T10:00:00Z");
        second.prospect_date = Some("2026-02-05T10:00:00Z".into());
        second.analysis_date = Some("2026-02-06T10:00:00Z".into());
        second.solution_type = Some("Desenvolvimento".to_string());

        vec![first, second]
    }

    fn kpis_for(items: &[WorkItem]) -> KpiDashboardData {
        compute_kpis(&prepare_items(items, &SprintCalendar::default()))
    }

    fn epic(id: i64, solution: &str) -> WorkItem {
        let mut e = WorkItem::new(id, "Epic", "Sprint 36");
        e.solution_type = Some(solution.to_string());
        e
    }

    #[test]
    fn empty_input_reports_no_data_everywhere() {
        let kpis = compute_kpis(&[]);
        for (_, result) in kpis.entries() {
            assert_eq!(result.value, 0.0);
            assert_eq!(result.color, Some(KpiColor::Off));
            assert_eq!(result.message.as_deref(), Some(NO_DATA));
        }
        assert_eq!(kpis.analysis_lead_time.unit.as_deref(), Some(DAYS_UNIT));
    }

    #[test]
    fn lead_time_averages_absolute_days() {
        let kpis = kpis_for(&fixture());
        assert_eq!(kpis.analysis_lead_time.value, 1.5);
        assert_eq!(kpis.analysis_lead_time.unit.as_deref(), Some("dias"));
        assert_eq!(kpis.analysis_lead_time.help.as_deref(), Some(LEAD_TIME_HELP));
    }

    #[test]
    fn lead_time_is_order_independent_and_truncates() {
        let mut reversed = WorkItem::new(1, "Task", "Sprint 36");
        reversed.prospect_date = Some("2026-02-10T00:00:00Z".into());
        reversed.analysis_date = Some("2026-02-07T00:00:00Z".into());
        let mut partial = WorkItem::new(2, "Task", "Sprint 36");
        partial.prospect_date = Some("2026-02-01T00:00:00Z".into());
        partial.analysis_date = Some("2026-02-02T23:00:00Z".into());
        let mut missing = WorkItem::new(3, "Task", "Sprint 36");
        missing.prospect_date = Some("2026-02-01T00:00:00Z".into());

        let kpis = kpis_for(&[reversed, partial, missing]);
        // 3 days and 1 day (47 hours truncated)
        assert_eq!(kpis.analysis_lead_time.value, 2.0);
    }

    #[test]
    fn lead_time_measures_real_elapsed_time_across_offsets() {
        let mut item = WorkItem::new(1, "Task", "Sprint 36");
        item.prospect_date = Some("2026-02-01T00:00:00+14:00".into());
        item.analysis_date = Some("2026-02-01T00:00:00-12:00".into());

        // 26 hours apart, although both read midnight on the same day
        let kpis = kpis_for(&[item]);
        assert_eq!(kpis.analysis_lead_time.value, 1.0);
        assert_eq!(kpis.analysis_lead_time.color, None);
    }

    #[test]
    fn deployment_rate_with_only_development_epic() {
        let kpis = kpis_for(&fixture());
        assert_eq!(kpis.deployment_rate.value, 0.0);
        assert!(kpis.deployment_rate.message.as_deref().unwrap().contains("0 Impl. | 1 Dev."));
        assert_eq!(kpis.deployment_rate.color, Some(KpiColor::Red));
        assert_eq!(kpis.deployment_rate.classification.as_deref(), Some("Foco em Desenvolvimento"));
    }

    #[test]
    fn deployment_rate_normalizes_solution_labels() {
        let items = vec![
            epic(1, "  IMPLANTAÇÃO "),
            epic(2, "implantação"),
            epic(3, "Implantação"),
            epic(4, "Desenvolvimento"),
            epic(5, "Outro"),
        ];
        let kpis = kpis_for(&items);
        assert_eq!(kpis.deployment_rate.value, 75.0);
        assert_eq!(kpis.deployment_rate.color, Some(KpiColor::Green));
        assert_eq!(kpis.deployment_rate.message.as_deref(), Some("3 Impl. | 1 Dev."));
    }

    #[test]
    fn deployment_rate_only_counts_exact_epic_type() {
        let mut lower = epic(1, "Implantação");
        lower.work_item_type = "epic".to_string();
        let kpis = kpis_for(&[lower, epic(2, "Sem classificação")]);
        assert_eq!(kpis.deployment_rate.value, 0.0);
        assert_eq!(kpis.deployment_rate.message.as_deref(), Some(NO_DATA));
        assert_eq!(kpis.deployment_rate.color, Some(KpiColor::Off));
    }

    #[test]
    fn deployment_boundaries_are_yellow() {
        assert_eq!(classify_deployment(60.0), (KpiColor::Yellow, "Equilíbrio"));
        assert_eq!(classify_deployment(40.0), (KpiColor::Yellow, "Equilíbrio"));
        assert_eq!(classify_deployment(60.01).0, KpiColor::Green);
        assert_eq!(classify_deployment(39.99).0, KpiColor::Red);

        let three_of_five = vec![
            epic(1, "Implantação"),
            epic(2, "Implantação"),
            epic(3, "Implantação"),
            epic(4, "Desenvolvimento"),
            epic(5, "Desenvolvimento"),
        ];
        let kpis = kpis_for(&three_of_five);
        assert_eq!(kpis.deployment_rate.value, 60.0);
        assert_eq!(kpis.deployment_rate.color, Some(KpiColor::Yellow));
    }

    #[test]
    fn schedule_counts_items_closed_within_tolerance() {
        let kpis = kpis_for(&fixture());
        assert_eq!(kpis.schedule_adherence.value, 50.0);
        assert!(kpis.schedule_adherence.message.as_deref().unwrap().contains("(1/2)"));
        assert_eq!(kpis.schedule_adherence.color, Some(KpiColor::Red));
    }

    #[test]
    fn schedule_tolerance_day_is_inclusive_at_midnight() {
        let on_tol = item(1, "Task", "2026-01-01", "2026-02-14T00:00:00Z");
        let after_tol = item(2, "Task", "2026-01-01", "2026-02-14T00:00:01Z");
        let kpis = kpis_for(&[on_tol, after_tol]);
        assert_eq!(kpis.schedule_adherence.message.as_deref(), Some("Baixo Cumprimento (1/2)"));
    }

    #[test]
    fn schedule_ignores_items_without_sprint_or_close_date() {
        let mut backlog = item(1, "Task", "2026-01-01", "2026-02-10");
        backlog.iteration = Some("Backlog".to_string());
        let mut open = item(2, "Task", "2026-01-01", "2026-02-10");
        open.closed_date = None;
        let done = item(3, "Task", "2026-01-01", "2026-02-10");

        let kpis = kpis_for(&[backlog, open, done]);
        assert_eq!(kpis.schedule_adherence.value, 100.0);
        assert_eq!(kpis.schedule_adherence.message.as_deref(), Some("Excelente (1/1)"));
        assert_eq!(kpis.schedule_adherence.color, Some(KpiColor::Green));
    }

    #[test]
    fn schedule_classification_thresholds() {
        assert_eq!(classify_schedule(90.0).0, KpiColor::Green);
        assert_eq!(classify_schedule(89.9), (KpiColor::Yellow, "Razoável"));
        assert_eq!(classify_schedule(70.0).0, KpiColor::Yellow);
        assert_eq!(classify_schedule(69.9).0, KpiColor::Red);
    }

    #[test]
    fn scope_deviation_without_planned_items_is_zero() {
        let kpis = kpis_for(&fixture());
        assert_eq!(kpis.scope_deviation.value, 0.0);
        assert_eq!(kpis.scope_deviation.color, Some(KpiColor::Off));
    }

    #[test]
    fn scope_deviation_counts_boundary_creation_as_unplanned() {
        let mut items: Vec<WorkItem> = (1..=4)
            .map(|id| item(id, "Task", "2026-01-10T09:00:00Z", "2026-02-10"))
            .collect();
        items.push(item(5, "Task", "2026-01-24T00:00:00Z", "2026-02-10"));

        let kpis = kpis_for(&items);
        assert_eq!(kpis.scope_deviation.value, 25.0);
        assert_eq!(kpis.scope_deviation.message.as_deref(), Some("Ajustes Naturais (1/4)"));
        assert_eq!(kpis.scope_deviation.color, Some(KpiColor::Yellow));
    }

    #[test]
    fn scope_classification_thresholds() {
        assert_eq!(classify_scope(10.0), (KpiColor::Green, "Excelente"));
        assert_eq!(classify_scope(30.0).0, KpiColor::Yellow);
        assert_eq!(classify_scope(30.5), (KpiColor::Red, "Alto Desvio"));
    }

    proptest! {
        #[test]
        fn compute_is_idempotent(
            specs in proptest::collection::vec(
                (0u32..60, 0i64..400, 0i64..400, any::<bool>(), 0usize..3),
                0..40,
            )
        ) {
            let base = chrono::NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
            let solutions = ["Implantação", "Desenvolvimento", ""];
            let items: Vec<WorkItem> = specs
                .iter()
                .enumerate()
                .map(|(id, (sprint, created, closed, is_epic, solution))| {
                    let mut w = WorkItem::new(id as i64, if *is_epic { "Epic" } else { "Task" }, &format!("Sprint {}", sprint));
                    w.created_date = Some((base + chrono::TimeDelta::days(*created)).into());
                    w.closed_date = Some((base + chrono::TimeDelta::days(*closed)).into());
                    w.prospect_date = w.created_date.clone();
                    w.analysis_date = w.closed_date.clone();
                    w.solution_type = Some(solutions[*solution].to_string());
                    w
                })
                .collect();

            let prepared = prepare_items(&items, &SprintCalendar::default());
            let first = compute_kpis(&prepared);
            let second = compute_kpis(&prepared);
            prop_assert_eq!(&first, &second);
            for ((_, a), (_, b)) in first.entries().iter().zip(second.entries().iter()) {
                prop_assert_eq!(a.value.to_bits(), b.value.to_bits());
                prop_assert!(a.value.is_finite());
            }
        }
    }
}
