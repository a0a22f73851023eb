//! Field formatters for human-readable output

use clap::ValueEnum;
use egk_card::{CardData, CardField, FieldSource, SessionOutcome, SessionReport};
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatMode {
    /// One `field=value` line per field, values as stored on the card
    Raw,
    /// Human-readable formatted output
    Human,
    /// JSON document
    Json,
}

impl FormatMode {
    pub fn description(&self) -> &'static str {
        match self {
            FormatMode::Raw => "Raw",
            FormatMode::Human => "Human-Readable",
            FormatMode::Json => "JSON",
        }
    }
}

/// Format a field value based on its field type
pub fn format_value(field: CardField, value: &str, mode: FormatMode) -> String {
    if mode != FormatMode::Human {
        return value.to_string();
    }

    match field {
        // Dates are stored as YYYYMMDD
        CardField::BirthDate | CardField::CoverageStart | CardField::PolicyExpiry => format_date(value),

        CardField::Sex => match value {
            "M" => "male (M)".to_string(),
            "W" => "female (W)".to_string(),
            "D" => "diverse (D)".to_string(),
            "X" => "unspecified (X)".to_string(),
            other => other.to_string(),
        },

        CardField::InsuranceType => match value {
            "1" => "member (1)".to_string(),
            "3" => "family member (3)".to_string(),
            "5" => "pensioner (5)".to_string(),
            other => other.to_string(),
        },

        CardField::MaxBufferSize if !value.is_empty() => format!("{} bytes", value),

        _ => value.to_string(),
    }
}

fn format_date(value: &str) -> String {
    let digits = value.len() == 8 && value.bytes().all(|b| b.is_ascii_digit());
    if digits {
        format!("{}.{}.{}", &value[6..8], &value[4..6], &value[0..4])
    } else {
        value.to_string()
    }
}

fn section_title(source: FieldSource) -> &'static str {
    match source {
        FieldSource::Patient => "Patient (EF.PD)",
        FieldSource::Insurance => "Insurance (EF.VD)",
        FieldSource::Card => "Card",
    }
}

fn is_xml(field: CardField) -> bool {
    matches!(field, CardField::PatientXml | CardField::InsuranceXml)
}

/// Format the card data; raw and human output leave out the container XML
pub fn format_card_data(data: &CardData, mode: FormatMode) -> Result<String, serde_json::Error> {
    let out = match mode {
        FormatMode::Raw => data
            .iter()
            .filter(|(field, _)| !is_xml(*field))
            .map(|(field, value)| format!("{}={}", field, value))
            .collect::<Vec<_>>()
            .join("\n"),

        FormatMode::Human => {
            let mut out = Vec::new();
            for source in [FieldSource::Patient, FieldSource::Insurance, FieldSource::Card] {
                out.push(format!("=== {} ===", section_title(source)));
                let mut any = false;
                for (field, value) in data.fields(source) {
                    if value.is_empty() || is_xml(field) {
                        continue;
                    }
                    any = true;
                    out.push(format!("  {:<22} {}", format!("{}:", field.label()), format_value(field, value, mode)));
                }
                if !any {
                    out.push("  (no data)".to_string());
                }
                out.push(String::new());
            }
            out.join("\n").trim_end().to_string()
        }

        FormatMode::Json => serde_json::to_string_pretty(data)?,
    };
    Ok(out)
}

/// Format a finished session: data or abort reason, then warnings
pub fn format_report(report: &SessionReport, mode: FormatMode) -> Result<String, serde_json::Error> {
    if mode == FormatMode::Json {
        let document = match &report.outcome {
            SessionOutcome::Complete(data) => json!({
                "status": "complete",
                "data": data,
                "state": report.state,
                "warnings": report.warnings,
            }),
            SessionOutcome::Aborted(reason) => json!({
                "status": "aborted",
                "reason": reason.to_string(),
                "step": reason.step(),
                "state": report.state,
                "warnings": report.warnings,
            }),
        };
        return serde_json::to_string_pretty(&document);
    }

    let mut out = match &report.outcome {
        SessionOutcome::Complete(data) => format_card_data(data, mode)?,
        SessionOutcome::Aborted(reason) => format!("Card read aborted: {}", reason),
    };

    if !report.warnings.is_empty() {
        out.push_str("\n\nWarnings:");
        for warning in &report.warnings {
            out.push_str(&format!("\n  - {}", warning));
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_date() {
        assert_eq!(format_value(CardField::BirthDate, "19800131", FormatMode::Human), "31.01.1980");
        assert_eq!(format_value(CardField::BirthDate, "19800131", FormatMode::Raw), "19800131");
        assert_eq!(format_value(CardField::PolicyExpiry, "2025", FormatMode::Human), "2025");
    }

    #[test]
    fn test_format_sex() {
        assert_eq!(format_value(CardField::Sex, "W", FormatMode::Human), "female (W)");
        assert_eq!(format_value(CardField::Sex, "Q", FormatMode::Human), "Q");
    }

    #[test]
    fn test_raw_lists_every_field_but_xml() {
        let mut data = CardData::new();
        data.set(CardField::FirstName, "Anna");
        let raw = format_card_data(&data, FormatMode::Raw).unwrap();
        assert!(raw.lines().any(|l| l == "firstName=Anna"));
        assert!(raw.lines().any(|l| l == "lastName="));
        assert!(!raw.contains("patientXml"));
        assert_eq!(raw.lines().count(), CardField::ALL.len() - 2);
    }

    #[test]
    fn test_human_skips_empty_fields() {
        let mut data = CardData::new();
        data.set(CardField::LastName, "Muster");
        let human = format_card_data(&data, FormatMode::Human).unwrap();
        assert!(human.contains("Muster"));
        assert!(human.contains("(no data)"));
        assert!(!human.contains("First Name"));
    }

    #[test]
    fn test_json_uses_field_names() {
        let mut data = CardData::new();
        data.set(CardField::InsuredId, "X110452291");
        let value: serde_json::Value = serde_json::from_str(&format_card_data(&data, FormatMode::Json).unwrap()).unwrap();
        assert_eq!(value["insuredId"], "X110452291");
        assert_eq!(value["firstName"], "");
    }
}
