//! Terminal progress and prompts for cache operations

use std::sync::Mutex;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use rnef_cache::local::format_bytes;
use rnef_cache::{ProgressReporter, TokenPrompt};

/// Spinner on stderr; hidden when output is quiet or machine readable
pub struct SpinnerProgress {
    enabled: bool,
    state: Mutex<SpinnerState>,
}

#[derive(Default)]
struct SpinnerState {
    bar: Option<ProgressBar>,
    message: String,
}

impl SpinnerProgress {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            state: Mutex::new(SpinnerState::default()),
        }
    }

    fn with_state(&self, f: impl FnOnce(&mut SpinnerState)) {
        if !self.enabled {
            return;
        }
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state);
    }
}

impl ProgressReporter for SpinnerProgress {
    fn start(&self, message: &str) {
        self.with_state(|state| {
            if let Some(bar) = state.bar.take() {
                bar.finish_and_clear();
            }
            let bar = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
                bar.set_style(style);
            }
            bar.set_message(message.to_string());
            bar.enable_steady_tick(Duration::from_millis(100));
            state.message = message.to_string();
            state.bar = Some(bar);
        });
    }

    fn message(&self, message: &str) {
        self.with_state(|state| {
            state.message = message.to_string();
            if let Some(bar) = &state.bar {
                bar.set_message(message.to_string());
            }
        });
    }

    fn stop(&self, message: &str) {
        self.with_state(|state| {
            if let Some(bar) = state.bar.take() {
                bar.finish_with_message(message.to_string());
            }
        });
    }

    fn bytes(&self, transferred: u64, total: Option<u64>) {
        self.with_state(|state| {
            let Some(bar) = &state.bar else {
                return;
            };
            let amount = match total {
                Some(total) => format!("{} / {}", format_bytes(transferred), format_bytes(total)),
                None => format_bytes(transferred),
            };
            bar.set_message(format!("{} ({})", state.message, amount));
        });
    }
}

/// Asks for a GitHub token on the terminal, never echoing it
pub struct TerminalTokenPrompt;

impl TokenPrompt for TerminalTokenPrompt {
    fn prompt(&self, message: &str) -> Option<String> {
        if !console::Term::stderr().is_term() {
            return None;
        }
        dialoguer::Password::new()
            .with_prompt(message)
            .interact()
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_spinner_is_silent() {
        let progress = SpinnerProgress::new(false);
        progress.start("Looking up");
        progress.bytes(10, Some(100));
        progress.stop("done");
        assert!(progress.state.lock().unwrap().bar.is_none());
    }
}
