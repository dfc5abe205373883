//! Throughput tracking for long-running crawls.
//!
//! Counts priced vehicles, derives a vehicles-per-hour rate and formats the
//! periodic progress line and the end-of-run summary.

use std::time::{Duration, Instant};

const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(60);

/// Progress tracking state for a crawl.
#[derive(Debug, Clone)]
pub struct ProgressState {
    /// Number of vehicles priced so far.
    pub items_processed: u64,
    /// Timestamp when the crawl started.
    pub start_time: Instant,
    /// Last time progress was reported.
    pub last_update: Instant,
    /// Minimum interval between progress updates.
    pub update_interval: Duration,
    /// Current label of the work being done (e.g., "Janeiro/2024 carro").
    pub current_phase: Option<String>,
}

impl Default for ProgressState {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressState {
    /// Create a tracker with the default update interval.
    pub fn new() -> Self {
        Self::with_interval(DEFAULT_UPDATE_INTERVAL)
    }

    /// Create a tracker with a custom update interval.
    pub fn with_interval(update_interval: Duration) -> Self {
        let now = Instant::now();
        Self {
            items_processed: 0,
            start_time: now,
            last_update: now,
            update_interval,
            current_phase: None,
        }
    }

    /// Count newly priced vehicles.
    pub fn update(&mut self, new_items: u64) {
        self.items_processed = self.items_processed.saturating_add(new_items);
    }

    /// Time since the crawl started
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Vehicles priced per hour so far.
    pub fn rate_per_hour(&self) -> f64 {
        rate_per_hour(self.items_processed, self.elapsed())
    }

    /// Whether the update interval has passed since the last report.
    pub fn should_emit_update(&self) -> bool {
        self.items_processed > 0 && self.last_update.elapsed() >= self.update_interval
    }

    /// Call after emitting a progress line to reset the timer.
    pub fn mark_emitted(&mut self) {
        self.last_update = Instant::now();
    }

    /// Set descriptive phase label.
    pub fn set_phase<S: Into<String>>(&mut self, phase: Option<S>) {
        self.current_phase = phase.map(Into::into);
    }

    /// Format the periodic progress line.
    pub fn format_progress(&self) -> String {
        let mut message = format!(
            "[PROGRESS] Vehicles priced: {} | Elapsed: {} | Speed: {:.2} vehicles/hour",
            format_count(self.items_processed),
            format_duration(self.elapsed()),
            self.rate_per_hour()
        );
        if let Some(phase) = &self.current_phase {
            message.push_str(" | ");
            message.push_str(phase);
        }
        message
    }
}

/// Items per hour over `elapsed`; zero before any time has passed.
pub fn rate_per_hour(items: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        items as f64 / secs * 3600.0
    } else {
        0.0
    }
}

/// Format a duration as `00d 00h 00m 00s`.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;
    format!("{days:02}d {hours:02}h {minutes:02}m {seconds:02}s")
}

/// Format a count with `,` thousands separators.
pub fn format_count(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
