use std::process::ExitCode;

use egk_card::CardField;
use serde_json::json;

use crate::formatters::FormatMode;

use super::{run_session, ReadOptions};

pub fn cmd_dump(options: &ReadOptions) -> ExitCode {
    let report = match run_session(options) {
        Some(report) => report,
        None => return ExitCode::FAILURE,
    };

    let data = match report.card_data() {
        Some(data) => data,
        None => {
            if let Some(reason) = report.abort_reason() {
                eprintln!("Card read aborted: {}", reason);
            }
            return ExitCode::FAILURE;
        }
    };

    if options.format == FormatMode::Json {
        let document = json!({
            "patientXml": data.get(CardField::PatientXml),
            "insuranceXml": data.get(CardField::InsuranceXml),
        });
        match serde_json::to_string_pretty(&document) {
            Ok(output) => println!("{}", output),
            Err(err) => {
                eprintln!("Failed to format containers: {}", err);
                return ExitCode::FAILURE;
            }
        }
        return ExitCode::SUCCESS;
    }

    for (title, field) in [("EF.PD", CardField::PatientXml), ("EF.VD", CardField::InsuranceXml)] {
        println!("=== {} ===\n", title);
        let xml = data.get(field);
        if xml.is_empty() {
            println!("(not read)");
        } else {
            println!("{}", xml);
        }
        println!();
    }

    for warning in &report.warnings {
        eprintln!("warning: {}", warning);
    }

    println!("=== Dump Complete ===");
    ExitCode::SUCCESS
}
