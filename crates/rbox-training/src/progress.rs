use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Started { iteration: u64, parameters: usize },
    /// Emitted every `print_every` iterations.
    Report { iteration: u64, interval: u64, elapsed_secs: f64, smoothed_loss: f64 },
    Evaluated { iteration: u64, dev_loss: f64, samples: usize },
    Saved { iteration: u64, path: PathBuf, sha256: String },
    Finished { iteration: u64 },
}

pub trait ProgressSink {
    fn on_event(&mut self, event: ProgressEvent);
}

impl<S: ProgressSink + ?Sized> ProgressSink for Box<S> {
    fn on_event(&mut self, event: ProgressEvent) {
        (**self).on_event(event);
    }
}

#[derive(Debug, Default)]
pub struct StdoutProgressSink;

impl StdoutProgressSink {
    /// Human-readable line for an event; `None` for events that are only logged.
    #[must_use]
    pub fn format(event: &ProgressEvent) -> Option<String> {
        match event {
            ProgressEvent::Report { iteration, interval, elapsed_secs, smoothed_loss } => {
                Some(format!(
                    "Iter {iteration}, seconds for {interval} batch: {elapsed_secs:.2} , \
                     loss: {smoothed_loss:.6}"
                ))
            }
            ProgressEvent::Started { iteration, parameters } => {
                Some(format!("Starting at iter {iteration} with {parameters} parameters"))
            }
            ProgressEvent::Finished { iteration } => Some(format!("Finished at iter {iteration}")),
            ProgressEvent::Evaluated { .. } | ProgressEvent::Saved { .. } => None,
        }
    }
}

impl ProgressSink for StdoutProgressSink {
    fn on_event(&mut self, event: ProgressEvent) {
        if let Some(line) = Self::format(&event) {
            println!("{line}");
        }
    }
}
