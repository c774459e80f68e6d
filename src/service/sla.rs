// service/sla.rs
use chrono::{DateTime, Duration, Utc};

use crate::models::{settingsmodel::SlaSettings, ticketmodel::TicketPriority};

pub const DEFAULT_HOURS_BAIXA: i64 = 48;
pub const DEFAULT_HOURS_MEDIA: i64 = 24;
pub const DEFAULT_HOURS_ALTA: i64 = 8;
pub const DEFAULT_HOURS_CRITICA: i64 = 4;

/// Lower-cases and strips the diacritics Portuguese priority labels carry.
pub fn normalize_label(label: &str) -> String {
    label
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'ç' => 'c',
            other => other,
        })
        .collect()
}

impl TicketPriority {
    /// Substring match on the normalized label; anything unrecognised is Media.
    pub fn from_label(label: &str) -> TicketPriority {
        let clean = normalize_label(label);
        if clean.contains("baixa") {
            TicketPriority::Baixa
        } else if clean.contains("media") {
            TicketPriority::Media
        } else if clean.contains("alta") {
            TicketPriority::Alta
        } else if clean.contains("critica") || clean.contains("urgente") {
            TicketPriority::Critica
        } else {
            TicketPriority::Media
        }
    }
}

/// Hour budget for a priority. `settings` is `None` when no settings row
/// exists; unset or non-positive fields fall back to the defaults.
pub fn sla_hours(priority: TicketPriority, settings: Option<&SlaSettings>) -> i64 {
    let configured = settings.and_then(|s| match priority {
        TicketPriority::Baixa => s.baixa,
        TicketPriority::Media => s.media,
        TicketPriority::Alta => s.alta,
        TicketPriority::Critica => s.critica,
    });

    match configured {
        Some(hours) if hours > 0 => hours as i64,
        _ => match priority {
            TicketPriority::Baixa => DEFAULT_HOURS_BAIXA,
            TicketPriority::Media => DEFAULT_HOURS_MEDIA,
            TicketPriority::Alta => DEFAULT_HOURS_ALTA,
            TicketPriority::Critica => DEFAULT_HOURS_CRITICA,
        },
    }
}

/// Deadline anchored at creation time, whatever moment it is computed at.
pub fn compute_due_at(
    created_at: DateTime<Utc>,
    priority: TicketPriority,
    settings: Option<&SlaSettings>,
) -> DateTime<Utc> {
    created_at + Duration::hours(sla_hours(priority, settings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn labels_match_ignoring_case_and_accents() {
        assert_eq!(TicketPriority::from_label("Baixa"), TicketPriority::Baixa);
        assert_eq!(TicketPriority::from_label("MÉDIA"), TicketPriority::Media);
        assert_eq!(TicketPriority::from_label(" alta "), TicketPriority::Alta);
        assert_eq!(TicketPriority::from_label("Crítica"), TicketPriority::Critica);
        assert_eq!(TicketPriority::from_label("Urgente!"), TicketPriority::Critica);
        assert_eq!(TicketPriority::from_label("prioridade alta"), TicketPriority::Alta);
    }

    #[test]
    fn unknown_label_defaults_to_media() {
        assert_eq!(TicketPriority::from_label(""), TicketPriority::Media);
        assert_eq!(TicketPriority::from_label("whenever"), TicketPriority::Media);
        assert_eq!(sla_hours(TicketPriority::from_label("whenever"), None), 24);
    }

    #[test]
    fn falls_back_to_defaults_without_settings() {
        assert_eq!(sla_hours(TicketPriority::Baixa, None), 48);
        assert_eq!(sla_hours(TicketPriority::Media, None), 24);
        assert_eq!(sla_hours(TicketPriority::Alta, None), 8);
        assert_eq!(sla_hours(TicketPriority::Critica, None), 4);
    }

    #[test]
    fn configured_hours_win_and_null_fields_fall_back() {
        let settings = SlaSettings {
            baixa: Some(72),
            media: None,
            alta: Some(6),
            critica: Some(0),
        };
        assert_eq!(sla_hours(TicketPriority::Baixa, Some(&settings)), 72);
        assert_eq!(sla_hours(TicketPriority::Media, Some(&settings)), 24);
        assert_eq!(sla_hours(TicketPriority::Alta, Some(&settings)), 6);
        assert_eq!(sla_hours(TicketPriority::Critica, Some(&settings)), 4);
    }

    #[test]
    fn due_at_stays_anchored_to_creation() {
        let settings = SlaSettings {
            baixa: Some(48),
            media: Some(24),
            alta: Some(8),
            critica: Some(4),
        };
        let created_at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        let due = compute_due_at(created_at, TicketPriority::from_label("Alta"), Some(&settings));
        assert_eq!(due, Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap());

        let due = compute_due_at(created_at, TicketPriority::from_label("Critica"), Some(&settings));
        assert_eq!(due, Utc.with_ymd_and_hms(2024, 1, 1, 4, 0, 0).unwrap());
    }
}
