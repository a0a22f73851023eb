use std::process::ExitCode;

use crate::formatters::{self, FormatMode};

use super::{run_session, ReadOptions};

pub fn cmd_read(options: &ReadOptions) -> ExitCode {
    if options.format != FormatMode::Json {
        println!("eGK Reader - {} Mode\n", options.format.description());
    }

    let report = match run_session(options) {
        Some(report) => report,
        None => return ExitCode::FAILURE,
    };

    match formatters::format_report(&report, options.format) {
        Ok(output) => println!("{}", output),
        Err(err) => {
            eprintln!("Failed to format card data: {}", err);
            return ExitCode::FAILURE;
        }
    }

    if report.card_data().is_some() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
