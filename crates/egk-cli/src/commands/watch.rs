use std::process::ExitCode;

use egk_card::SessionEvent;
use serde_json::json;

use crate::formatters::{self, FormatMode};
use crate::worker::{CardCommand, CardEvent, CardWorker};

use super::{load_profiles, ReadOptions};

pub fn cmd_watch(options: &ReadOptions, once: bool) -> ExitCode {
    let profiles = match load_profiles(options.profiles.as_deref()) {
        Ok(p) => p,
        Err(err) => {
            eprintln!("Failed to load card profiles: {}", err);
            return ExitCode::FAILURE;
        }
    };

    let (event_rx, command_tx) = CardWorker::spawn(profiles, options.session, options.reader.clone());
    let json = options.format == FormatMode::Json;

    if !json {
        println!("Waiting for cards (Ctrl+C to quit)\n");
    }

    let mut reader_reported = false;
    let mut exit = ExitCode::SUCCESS;

    for event in event_rx.iter() {
        match event {
            CardEvent::ReaderAvailable => reader_reported = false,
            CardEvent::ReaderUnavailable { error } => {
                if !reader_reported {
                    eprintln!("Reader unavailable: {}", error);
                    reader_reported = true;
                }
            }
            CardEvent::CardDetected { reader_name } => {
                if !json {
                    println!("Card detected in {}", reader_name);
                }
            }
            CardEvent::CardRemoved => {
                if !json {
                    println!("Card removed\n");
                }
            }
            CardEvent::Session(SessionEvent::Warning(warning)) => {
                if !json {
                    println!("warning: {}", warning);
                }
            }
            CardEvent::Session(SessionEvent::Complete(data)) => {
                if json {
                    println!("{}", json!({ "status": "complete", "data": data }));
                } else {
                    match formatters::format_card_data(&data, options.format) {
                        Ok(output) => println!("{}\n", output),
                        Err(err) => eprintln!("Failed to format card data: {}", err),
                    }
                }
                exit = ExitCode::SUCCESS;
                if once {
                    break;
                }
            }
            CardEvent::Session(SessionEvent::Aborted(reason)) => {
                if json {
                    println!("{}", json!({ "status": "aborted", "reason": reason.to_string() }));
                } else {
                    println!("Card read aborted: {}\n", reason);
                }
                exit = ExitCode::FAILURE;
                if once {
                    break;
                }
            }
        }
    }

    let _ = command_tx.send(CardCommand::Stop);
    exit
}
