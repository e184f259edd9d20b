use indicatif::{ProgressBar, ProgressStyle};
use std::sync::{Arc, Mutex};

/// How a single ticker left the screening loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickerResult {
    Screened { promoted: bool },
    Skipped,
}

/// Observer of the screening loop. Calls may arrive from rayon workers, so
/// implementations synchronise internally.
pub trait ProgressReporter: Send + Sync {
    /// `position` is 1-based.
    fn ticker_started(&self, position: usize, total: usize, ticker: &str);

    fn ticker_finished(&self, _ticker: &str, _result: TickerResult) {}

    fn finished(&self) {}
}

/// Reporter that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn ticker_started(&self, _position: usize, _total: usize, _ticker: &str) {}
}

#[derive(Clone, Default)]
pub struct ScreeningStatus {
    inner: Arc<Mutex<ScreeningStatusData>>,
}

#[derive(Default)]
struct ScreeningStatusData {
    total: usize,
    started: usize,
    screened: usize,
    skipped: usize,
    promoted: usize,
    current_ticker: Option<String>,
    done: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScreeningStatusSnapshot {
    pub total: usize,
    pub started: usize,
    pub screened: usize,
    pub skipped: usize,
    pub promoted: usize,
    pub current_ticker: Option<String>,
    pub done: bool,
}

impl ScreeningStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ScreeningStatusSnapshot {
        // A poisoned lock still holds the last consistent counters.
        let data = match self.inner.lock() {
            Ok(data) => data,
            Err(poisoned) => poisoned.into_inner(),
        };
        ScreeningStatusSnapshot {
            total: data.total,
            started: data.started,
            screened: data.screened,
            skipped: data.skipped,
            promoted: data.promoted,
            current_ticker: data.current_ticker.clone(),
            done: data.done,
        }
    }
}

impl ProgressReporter for ScreeningStatus {
    fn ticker_started(&self, _position: usize, total: usize, ticker: &str) {
        if let Ok(mut data) = self.inner.lock() {
            data.total = total;
            data.started += 1;
            data.current_ticker = Some(ticker.to_string());
        }
    }

    fn ticker_finished(&self, _ticker: &str, result: TickerResult) {
        if let Ok(mut data) = self.inner.lock() {
            match result {
                TickerResult::Screened { promoted } => {
                    data.screened += 1;
                    if promoted {
                        data.promoted += 1;
                    }
                }
                TickerResult::Skipped => data.skipped += 1,
            }
        }
    }

    fn finished(&self) {
        if let Ok(mut data) = self.inner.lock() {
            data.current_ticker = None;
            data.done = true;
        }
    }
}

/// Terminal progress bar backed by a `ScreeningStatus`.
pub struct TerminalProgress {
    bar: ProgressBar,
    status: ScreeningStatus,
}

impl TerminalProgress {
    pub fn new(total: usize) -> Self {
        let bar = ProgressBar::new(total as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        Self {
            bar,
            status: ScreeningStatus::new(),
        }
    }
}

impl ProgressReporter for TerminalProgress {
    fn ticker_started(&self, position: usize, total: usize, ticker: &str) {
        self.status.ticker_started(position, total, ticker);
        self.bar.set_message(ticker.to_string());
    }

    fn ticker_finished(&self, ticker: &str, result: TickerResult) {
        self.status.ticker_finished(ticker, result);
        self.bar.inc(1);
    }

    fn finished(&self) {
        self.status.finished();
        let snapshot = self.status.snapshot();
        self.bar.finish_with_message(format!(
            "{} screened, {} skipped, {} promoted",
            snapshot.screened, snapshot.skipped, snapshot.promoted
        ));
    }
}
