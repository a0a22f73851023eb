use egk_card::{CardReader, EgkSession, EventSink, PcscError, ProfileTable, SessionEvent, SessionOptions};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::commands::open_channel;

/// Messages sent from the card worker to the front end
#[derive(Debug, Clone)]
pub enum CardEvent {
    /// Card was detected
    CardDetected { reader_name: String },
    /// Card was removed
    CardRemoved,
    /// Event of the running read session
    Session(SessionEvent),
    /// Reader is unavailable
    ReaderUnavailable { error: String },
    /// Reader became available
    ReaderAvailable,
}

/// Commands sent to the card worker
#[derive(Debug)]
pub enum CardCommand {
    /// Stop the worker thread
    Stop,
}

/// Forwards session events into the worker's event channel
struct Forward<'a>(&'a Sender<CardEvent>);

impl EventSink for Forward<'_> {
    fn emit(&mut self, event: SessionEvent) {
        let _ = self.0.send(CardEvent::Session(event));
    }
}

/// Background worker reading every card inserted into a reader
pub struct CardWorker {
    event_tx: Sender<CardEvent>,
    command_rx: Receiver<CardCommand>,
    profiles: ProfileTable,
    options: SessionOptions,
    reader_name: Option<String>,
}

impl CardWorker {
    /// Spawn a new card worker thread
    pub fn spawn(
        profiles: ProfileTable,
        options: SessionOptions,
        reader_name: Option<String>,
    ) -> (Receiver<CardEvent>, Sender<CardCommand>) {
        let (event_tx, event_rx) = mpsc::channel();
        let (command_tx, command_rx) = mpsc::channel();

        thread::spawn(move || {
            let worker = CardWorker {
                event_tx,
                command_rx,
                profiles,
                options,
                reader_name,
            };
            worker.run();
        });

        (event_rx, command_tx)
    }

    fn run(self) {
        info!("Card worker thread started");

        let mut reader: Option<CardReader> = None;
        let mut card_present = false;
        let mut last_reader_check: Option<Instant> = None;

        loop {
            // Check for stop command (non-blocking)
            if let Ok(CardCommand::Stop) = self.command_rx.try_recv() {
                info!("Card worker stopping");
                break;
            }

            // Try to get reader if we don't have one (check every 2 seconds)
            let check_due = last_reader_check.map_or(true, |t| t.elapsed() > Duration::from_secs(2));
            if reader.is_none() && check_due {
                match CardReader::new() {
                    Ok(r) => {
                        info!("Card reader initialized");
                        reader = Some(r);
                        let _ = self.event_tx.send(CardEvent::ReaderAvailable);
                    }
                    Err(e) => {
                        debug!("Card reader unavailable: {}", e);
                        let _ = self.event_tx.send(CardEvent::ReaderUnavailable {
                            error: format!("{}", e),
                        });
                    }
                }
                last_reader_check = Some(Instant::now());
            }

            // Check for card if we have a reader
            if let Some(ref r) = reader {
                let present = open_channel(r, self.reader_name.as_deref())
                    .and_then(|channel| r.card_present(channel.reader()).map(|present| (channel, present)));

                match present {
                    Ok((channel, true)) => {
                        if !card_present {
                            let reader_name = channel.reader_name();
                            info!(reader = %reader_name, "Card detected");
                            card_present = true;
                            let _ = self.event_tx.send(CardEvent::CardDetected { reader_name });

                            // One session per inserted card
                            EgkSession::new(channel, &self.profiles, self.options)
                                .run(&mut Forward(&self.event_tx));
                        }
                    }
                    Ok((_, false)) => {
                        if card_present {
                            info!("Card removed");
                            card_present = false;
                            let _ = self.event_tx.send(CardEvent::CardRemoved);
                        }
                    }
                    Err(PcscError::NoService | PcscError::ServiceStopped | PcscError::InvalidHandle) => {
                        info!("PC/SC service lost");
                        reader = None;
                        card_present = false;
                    }
                    Err(e) => {
                        debug!(error = %e, "No reader available");
                        if card_present {
                            card_present = false;
                            let _ = self.event_tx.send(CardEvent::CardRemoved);
                        }
                    }
                }
            }

            // Sleep briefly to avoid busy loop
            thread::sleep(Duration::from_millis(250));
        }

        info!("Card worker thread stopped");
    }
}
