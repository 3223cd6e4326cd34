//! Ticketing-system indicators over Orquestra support tickets: volume,
//! resolution time, reopenings and first-time success.
//!
//! Independent from the sprint engine. Tickets carry their own record shape
//! and never go through sprint preparation.

use log::debug;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::prepare::parse_instant;
use crate::types::{lenient_string, RawDate};

pub const FINISHED_STATUS: &str = "Finalizado";
pub const IN_PROGRESS_STATUS: &str = "Em andamento";

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Ticket is one Orquestra request as the ticket export carries it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    #[serde(rename = "Instancia")]
    pub instance: i64,
    #[serde(rename = "Tipo_Solicitacao", default, deserialize_with = "lenient_string")]
    pub request_type: String,
    #[serde(rename = "Nivel", default, deserialize_with = "lenient_string")]
    pub level: String,
    #[serde(rename = "Dt_Abertura", skip_serializing_if = "Option::is_none", default)]
    pub opened_at: Option<RawDate>,
    #[serde(rename = "Dt_Conclusao", skip_serializing_if = "Option::is_none", default)]
    pub concluded_at: Option<RawDate>,
    #[serde(rename = "Sistema", default, deserialize_with = "lenient_string")]
    pub system: String,
    /// `None` when the export has no usable count.
    #[serde(
        rename = "Qnt_Reabertura",
        skip_serializing_if = "Option::is_none",
        default,
        deserialize_with = "lenient_count"
    )]
    pub reopen_count: Option<i64>,
    #[serde(rename = "Situacao", default, deserialize_with = "lenient_string")]
    pub status: String,
}

fn lenient_count<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(n) => Ok(n.as_i64()),
        Value::Null => Ok(None),
        other => {
            debug!("ignoring non-numeric reopen count {}", other);
            Ok(None)
        }
    }
}

impl Ticket {
    pub fn is_finished(&self) -> bool {
        self.status == FINISHED_STATUS
    }

    /// Fractional days from opening to conclusion.
    pub fn resolution_days(&self) -> Option<f64> {
        let opened = parse_instant(self.opened_at.as_ref()?)?;
        let concluded = parse_instant(self.concluded_at.as_ref()?)?;
        Some((concluded - opened).num_milliseconds() as f64 / MILLIS_PER_DAY)
    }
}

/// TicketKpis summarises one ticket collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TicketKpis {
    pub total: usize,
    #[serde(rename = "finalizados")]
    pub finished: usize,
    #[serde(rename = "em_andamento")]
    pub in_progress: usize,
    /// Days, over finished tickets with a non-negative span.
    #[serde(rename = "tempo_medio_resolucao")]
    pub mean_resolution_days: f64,
    #[serde(rename = "reaberturas_media")]
    pub mean_reopenings: f64,
    /// Finished tickets never reopened, as a percentage of finished tickets.
    #[serde(rename = "taxa_sucesso")]
    pub success_rate: f64,
}

impl TicketKpis {
    /// Finished share of the whole collection, in percent.
    pub fn completion_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.finished as f64 / self.total as f64 * 100.0
    }
}

pub fn compute_ticket_kpis(tickets: &[Ticket]) -> TicketKpis {
    if tickets.is_empty() {
        return TicketKpis::default();
    }

    let finished: Vec<&Ticket> = tickets.iter().filter(|t| t.is_finished()).collect();
    let in_progress = tickets.iter().filter(|t| t.status == IN_PROGRESS_STATUS).count();

    let spans: Vec<f64> = finished
        .iter()
        .filter_map(|t| t.resolution_days())
        .filter(|days| *days >= 0.0)
        .collect();
    let mean_resolution_days = if spans.is_empty() {
        0.0
    } else {
        spans.iter().sum::<f64>() / spans.len() as f64
    };

    let reopenings: i64 = tickets.iter().map(|t| t.reopen_count.unwrap_or(0)).sum();
    // an unknown count is not a confirmed first-time resolution
    let never_reopened = finished.iter().filter(|t| t.reopen_count == Some(0)).count();
    let success_rate = if finished.is_empty() {
        0.0
    } else {
        never_reopened as f64 / finished.len() as f64 * 100.0
    };

    TicketKpis {
        total: tickets.len(),
        finished: finished.len(),
        in_progress,
        mean_resolution_days,
        mean_reopenings: reopenings as f64 / tickets.len() as f64,
        success_rate,
    }
}

/// TicketFilter restricts tickets by request type and system
#[derive(Debug, Clone, Default)]
pub struct TicketFilter {
    pub request_type: Option<String>,
    pub system: Option<String>,
}

impl TicketFilter {
    pub fn matches(&self, ticket: &Ticket) -> bool {
        if let Some(ref request_type) = self.request_type {
            if ticket.request_type != *request_type {
                return false;
            }
        }
        if let Some(ref system) = self.system {
            if ticket.system != *system {
                return false;
            }
        }
        true
    }

    pub fn apply(&self, tickets: Vec<Ticket>) -> Vec<Ticket> {
        tickets.into_iter().filter(|t| self.matches(t)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ticket(instance: i64, status: &str, opened: &str, concluded: &str, reopened: Option<i64>) -> Ticket {
        Ticket {
            instance,
            request_type: "Bug".to_string(),
            level: "N2".to_string(),
            opened_at: (!opened.is_empty()).then(|| opened.into()),
            concluded_at: (!concluded.is_empty()).then(|| concluded.into()),
            system: "Portal".to_string(),
            reopen_count: reopened,
            status: status.to_string(),
        }
    }

    #[test]
    fn empty_collection_is_all_zero() {
        let kpis = compute_ticket_kpis(&[]);
        assert_eq!(kpis, TicketKpis::default());
        assert_eq!(kpis.completion_rate(), 0.0);
    }

    #[test]
    fn computes_ticket_indicators() {
        let tickets = vec![
            ticket(1, "Finalizado", "2026-01-01 08:00:00", "2026-01-02 20:00:00", Some(0)),
            ticket(2, "Finalizado", "2026-01-01 08:00:00", "2026-01-04 08:00:00", Some(2)),
            ticket(3, "Em andamento", "2026-01-05 08:00:00", "", Some(1)),
            ticket(4, "Cancelado", "2026-01-05 08:00:00", "2026-01-06 08:00:00", None),
        ];

        let kpis = compute_ticket_kpis(&tickets);
        assert_eq!(kpis.total, 4);
        assert_eq!(kpis.finished, 2);
        assert_eq!(kpis.in_progress, 1);
        // 1.5 and 3 days; the cancelled ticket is not finished
        assert_eq!(kpis.mean_resolution_days, 2.25);
        assert_eq!(kpis.mean_reopenings, 0.75);
        assert_eq!(kpis.success_rate, 50.0);
        assert_eq!(kpis.completion_rate(), 50.0);
    }

    #[test]
    fn negative_and_undated_spans_are_skipped() {
        let tickets = vec![
            ticket(1, "Finalizado", "2026-01-03 00:00:00", "2026-01-01 00:00:00", Some(0)),
            ticket(2, "Finalizado", "", "2026-01-01 00:00:00", Some(0)),
            ticket(3, "Finalizado", "2026-01-01 00:00:00", "not a date", Some(0)),
        ];
        let kpis = compute_ticket_kpis(&tickets);
        assert_eq!(kpis.mean_resolution_days, 0.0);
        assert_eq!(kpis.success_rate, 100.0);

        let mut tickets = tickets;
        tickets.push(ticket(4, "Finalizado", "2026-01-01 00:00:00", "2026-01-01 06:00:00", Some(0)));
        assert_eq!(compute_ticket_kpis(&tickets).mean_resolution_days, 0.25);
    }

    #[test]
    fn unknown_reopen_count_is_not_a_success() {
        let tickets = vec![
            ticket(1, "Finalizado", "", "", Some(0)),
            ticket(2, "Finalizado", "", "", None),
        ];
        let kpis = compute_ticket_kpis(&tickets);
        assert_eq!(kpis.success_rate, 50.0);
        assert_eq!(kpis.mean_reopenings, 0.0);
    }

    #[test]
    fn no_finished_tickets_gives_zero_success() {
        let kpis = compute_ticket_kpis(&[ticket(1, "Em andamento", "", "", Some(3))]);
        assert_eq!(kpis.finished, 0);
        assert_eq!(kpis.success_rate, 0.0);
        assert_eq!(kpis.mean_reopenings, 3.0);
    }

    #[test]
    fn deserializes_ticket_export_shape() {
        let t: Ticket = serde_json::from_value(json!({
            "Instancia": 5012,
            "Tipo_Solicitacao": "Melhoria",
            "Nivel": "N1",
            "Dt_Abertura": "2026-01-10 09:30:00",
            "Dt_Conclusao": null,
            "Sistema": "SIGA",
            "Qnt_Reabertura": "dois",
            "Situacao": "Em andamento"
        }))
        .unwrap();

        assert_eq!(t.instance, 5012);
        assert_eq!(t.request_type, "Melhoria");
        assert_eq!(t.opened_at, Some(RawDate::from("2026-01-10 09:30:00")));
        assert_eq!(t.concluded_at, None);
        assert_eq!(t.reopen_count, None);
        assert!(!t.is_finished());

        let kpis = compute_ticket_kpis(&[t]);
        let value = serde_json::to_value(kpis).unwrap();
        assert_eq!(value["em_andamento"], json!(1));
        assert_eq!(value["taxa_sucesso"], json!(0.0));
        assert!(value.get("tempo_medio_resolucao").is_some());
    }

    #[test]
    fn filters_by_type_and_system() {
        let mut other = ticket(2, "Finalizado", "", "", Some(0));
        other.request_type = "Ajuste".to_string();
        other.system = "SIGA".to_string();
        let tickets = vec![ticket(1, "Finalizado", "", "", Some(0)), other];

        let by_type = TicketFilter { request_type: Some("Ajuste".to_string()), system: None };
        assert_eq!(by_type.apply(tickets.clone()).len(), 1);

        let both = TicketFilter {
            request_type: Some("Bug".to_string()),
            system: Some("SIGA".to_string()),
        };
        assert!(both.apply(tickets.clone()).is_empty());
        assert_eq!(TicketFilter::default().apply(tickets).len(), 2);
    }
}
