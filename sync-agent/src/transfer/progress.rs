//! Rate-limited progress reporting for scans and transfers.
//!
//! Producers call [`ProgressReporter::report`] as often as they like; the
//! reporter forwards at most one event per interval to the callback, plus a
//! final event from [`ProgressReporter::finish`].

use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default minimum spacing between two forwarded events (4 per second).
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_millis(250);

/// Progress of a catalog scan, updated once per drained folder.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScanProgress {
    pub folders_scanned: usize,
    pub files_scanned: usize,
    pub bytes_scanned: u64,
}

/// Progress information for the transfer phase of a sync run
#[derive(Debug, Clone, Serialize)]
pub struct TransferProgress {
    /// Total bytes to transfer
    pub total_bytes: u64,

    /// Bytes transferred so far
    pub transferred_bytes: u64,

    /// Current transfer speed in bytes/second
    pub bytes_per_second: u64,

    /// Estimated time remaining (seconds)
    pub eta_seconds: u64,

    /// Percentage complete (0-100)
    pub percent_complete: f64,

    /// Number of files processed
    pub files_processed: usize,

    /// Total number of files
    pub total_files: usize,

    /// Current file being processed
    pub current_file: Option<String>,
}

impl TransferProgress {
    pub fn new(total_bytes: u64, total_files: usize) -> Self {
        Self {
            total_bytes,
            transferred_bytes: 0,
            bytes_per_second: 0,
            eta_seconds: 0,
            percent_complete: 0.0,
            files_processed: 0,
            total_files,
            current_file: None,
        }
    }

    pub fn update(&mut self, transferred_bytes: u64) {
        self.transferred_bytes = transferred_bytes;
        self.percent_complete = if self.total_bytes > 0 {
            ((self.transferred_bytes as f64 / self.total_bytes as f64) * 100.0).min(100.0)
        } else if self.total_files == 0 {
            100.0
        } else {
            0.0
        };
    }

    pub fn set_current_file(&mut self, file_path: String) {
        self.current_file = Some(file_path);
    }

    pub fn increment_files(&mut self) {
        self.files_processed += 1;
    }

    pub fn is_complete(&self) -> bool {
        self.transferred_bytes >= self.total_bytes && self.files_processed >= self.total_files
    }
}

/// Transfer progress with time-based speed calculation
pub struct ProgressTracker {
    start_time: Instant,
    last_update_time: Instant,
    last_bytes: u64,
    progress: TransferProgress,
}

impl ProgressTracker {
    pub fn new(total_bytes: u64, total_files: usize) -> Self {
        let now = Instant::now();
        Self {
            start_time: now,
            last_update_time: now,
            last_bytes: 0,
            progress: TransferProgress::new(total_bytes, total_files),
        }
    }

    /// Update progress and recompute speed and ETA.
    pub fn update(&mut self, transferred_bytes: u64) -> &TransferProgress {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update_time).as_secs_f64();

        if elapsed > 0.0 {
            let bytes_diff = transferred_bytes.saturating_sub(self.last_bytes);
            self.progress.bytes_per_second = (bytes_diff as f64 / elapsed) as u64;
        }

        if self.progress.bytes_per_second > 0 {
            let remaining_bytes = self.progress.total_bytes.saturating_sub(transferred_bytes);
            self.progress.eta_seconds = remaining_bytes / self.progress.bytes_per_second;
        }

        self.progress.update(transferred_bytes);
        self.last_update_time = now;
        self.last_bytes = transferred_bytes;

        &self.progress
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average speed since start
    pub fn average_speed(&self) -> u64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            (self.progress.transferred_bytes as f64 / elapsed) as u64
        } else {
            0
        }
    }

    pub fn progress(&self) -> &TransferProgress {
        &self.progress
    }

    pub fn progress_mut(&mut self) -> &mut TransferProgress {
        &mut self.progress
    }
}

/// Event handed to progress callbacks.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum ProgressEvent {
    Scan(ScanProgress),
    Transfer(TransferProgress),
}

/// Callback for progress updates
pub type ProgressCallback = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;

/// Forwards progress events to a callback, at most once per interval.
pub struct ProgressReporter {
    callback: Option<ProgressCallback>,
    interval: Duration,
    last_sent: Option<Instant>,
}

impl ProgressReporter {
    pub fn new(callback: Option<ProgressCallback>, interval: Duration) -> Self {
        Self {
            callback,
            interval,
            last_sent: None,
        }
    }

    /// A reporter that drops everything.
    pub fn silent() -> Self {
        Self::new(None, DEFAULT_REPORT_INTERVAL)
    }

    /// Forward `event` unless another one went out less than an interval ago.
    /// Returns whether the event was forwarded.
    pub fn report(&mut self, event: ProgressEvent) -> bool {
        let Some(callback) = &self.callback else {
            return false;
        };
        let now = Instant::now();
        if let Some(last) = self.last_sent {
            if now.duration_since(last) < self.interval {
                return false;
            }
        }
        callback(&event);
        self.last_sent = Some(now);
        true
    }

    /// Forward `event` regardless of the interval.
    pub fn finish(&mut self, event: ProgressEvent) {
        if let Some(callback) = &self.callback {
            callback(&event);
            self.last_sent = Some(Instant::now());
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::silent()
    }
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

/// Format speed as human-readable string
pub fn format_speed(bytes_per_second: u64) -> String {
    format!("{}/s", format_bytes(bytes_per_second))
}

/// Format duration as human-readable string
pub fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_transfer_progress_update() {
        let mut progress = TransferProgress::new(1000, 10);
        progress.update(500);
        assert_eq!(progress.transferred_bytes, 500);
        assert!((progress.percent_complete - 50.0).abs() < 0.01);
    }

    #[test]
    fn test_empty_transfer_is_complete() {
        let mut progress = TransferProgress::new(0, 0);
        progress.update(0);
        assert!(progress.is_complete());
        assert!((progress.percent_complete - 100.0).abs() < 0.01);
    }

    #[test]
    fn test_progress_tracker() {
        let mut tracker = ProgressTracker::new(1000, 5);

        let prog = tracker.update(100);
        assert_eq!(prog.transferred_bytes, 100);

        thread::sleep(Duration::from_millis(100));
        let prog = tracker.update(500);
        assert_eq!(prog.transferred_bytes, 500);
        assert!(prog.bytes_per_second > 0);
    }

    #[test]
    fn test_reporter_is_rate_limited() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let callback: ProgressCallback = Arc::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        let mut reporter = ProgressReporter::new(Some(callback), Duration::from_secs(3600));

        assert!(reporter.report(ProgressEvent::Scan(ScanProgress::default())));
        for _ in 0..100 {
            assert!(!reporter.report(ProgressEvent::Scan(ScanProgress::default())));
        }
        reporter.finish(ProgressEvent::Scan(ScanProgress::default()));

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_silent_reporter() {
        let mut reporter = ProgressReporter::silent();
        assert!(!reporter.report(ProgressEvent::Scan(ScanProgress::default())));
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0.00 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1024 * 1024), "1.00 MB");
    }

    #[test]
    fn test_format_speed_and_duration() {
        assert_eq!(format_speed(1024), "1.00 KB/s");
        assert_eq!(format_duration(30), "30s");
        assert_eq!(format_duration(90), "1m 30s");
        assert_eq!(format_duration(3665), "1h 1m");
    }
}
