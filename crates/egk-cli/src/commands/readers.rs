use std::ffi::CString;
use std::process::ExitCode;

use egk_card::CardReader;

pub fn cmd_readers() -> ExitCode {
    let reader = match CardReader::new() {
        Ok(r) => r,
        Err(err) => {
            eprintln!("Failed to establish PC/SC context: {}", err);
            return ExitCode::FAILURE;
        }
    };

    let names = match reader.list_readers() {
        Ok(names) => names,
        Err(err) => {
            eprintln!("Failed to list readers: {}", err);
            return ExitCode::FAILURE;
        }
    };

    if names.is_empty() {
        println!("No readers found");
        return ExitCode::FAILURE;
    }

    println!("Found {} reader(s):\n", names.len());
    for (i, name) in names.iter().enumerate() {
        let status = match CString::new(name.as_str()).map(|c| reader.card_present(&c)) {
            Ok(Ok(true)) => "card present",
            Ok(Ok(false)) => "empty",
            _ => "status unknown",
        };
        println!("  {}. {} [{}]", i + 1, name, status);
    }

    ExitCode::SUCCESS
}
