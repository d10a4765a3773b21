/*!
Progress reporting and cooperative cancellation for long running scans.

Index building and file surgery report how far through the file they are and
poll for cancellation once per record boundary through a [`ProgressSink`].
*/
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{info, warn};

/// Receives progress updates from a long running operation.
///
/// Every method has a no-op default so implementors only override what they
/// display.
pub trait ProgressSink {
    /// Switch between a bounded and an unbounded display
    fn set_indeterminate(&mut self, _indeterminate: bool) {}

    fn set_maximum(&mut self, _maximum: u64) {}

    fn set_current(&mut self, _current: u64) {}

    /// Polled at each record boundary. Returning `true` stops the operation
    /// before the next record is started.
    fn is_cancelled(&self) -> bool {
        false
    }

    /// A message meant for the user, usually a warning about the file content
    fn append_message(&mut self, _message: &str) {}
}

/// Discards all progress updates and never cancels
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {}

impl ProgressSink for () {}

impl<P: ProgressSink + ?Sized> ProgressSink for &mut P {
    fn set_indeterminate(&mut self, indeterminate: bool) {
        (**self).set_indeterminate(indeterminate)
    }

    fn set_maximum(&mut self, maximum: u64) {
        (**self).set_maximum(maximum)
    }

    fn set_current(&mut self, current: u64) {
        (**self).set_current(current)
    }

    fn is_cancelled(&self) -> bool {
        (**self).is_cancelled()
    }

    fn append_message(&mut self, message: &str) {
        (**self).append_message(message)
    }
}

/// A shareable flag another thread can raise to cancel an operation
#[derive(Debug, Default, Clone)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed)
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Writes progress to the [`log`] facade every `step` percent
#[derive(Debug, Clone)]
pub struct LogProgress {
    label: String,
    maximum: u64,
    step: u64,
    last_reported: Option<u64>,
    token: CancellationToken,
}

impl LogProgress {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            maximum: 100,
            step: 10,
            last_reported: None,
            token: CancellationToken::new(),
        }
    }

    pub fn with_step(mut self, step: u64) -> Self {
        self.step = step.max(1);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }
}

impl ProgressSink for LogProgress {
    fn set_maximum(&mut self, maximum: u64) {
        self.maximum = maximum;
        self.last_reported = None;
    }

    fn set_current(&mut self, current: u64) {
        let percent = percent_of(current, self.maximum);
        let bucket = percent / self.step;
        if self.last_reported.map_or(true, |last| bucket > last) {
            self.last_reported = Some(bucket);
            info!("{}: {percent}%", self.label);
        }
    }

    fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    fn append_message(&mut self, message: &str) {
        warn!("{}: {message}", self.label);
    }
}

/// `position` as a whole percentage of `total`. An empty total counts as done.
pub fn percent_of(position: u64, total: u64) -> u64 {
    if total == 0 {
        100
    } else {
        ((position as u128 * 100) / total as u128).min(100) as u64
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    /// Records what it is told and cancels after a fixed number of polls
    #[derive(Debug, Default)]
    pub(crate) struct RecordingProgress {
        pub maximum: u64,
        pub current: Vec<u64>,
        pub messages: Vec<String>,
        pub cancel_after: Option<usize>,
        pub polls: std::cell::Cell<usize>,
    }

    impl ProgressSink for RecordingProgress {
        fn set_maximum(&mut self, maximum: u64) {
            self.maximum = maximum;
        }

        fn set_current(&mut self, current: u64) {
            self.current.push(current);
        }

        fn is_cancelled(&self) -> bool {
            let polls = self.polls.get() + 1;
            self.polls.set(polls);
            self.cancel_after.is_some_and(|n| polls > n)
        }

        fn append_message(&mut self, message: &str) {
            self.messages.push(message.to_string());
        }
    }

    #[test]
    fn test_percent_of() {
        assert_eq!(percent_of(0, 0), 100);
        assert_eq!(percent_of(5, 10), 50);
        assert_eq!(percent_of(u64::MAX, u64::MAX), 100);
        assert_eq!(percent_of(20, 10), 100);
    }

    #[test_log::test]
    fn test_log_progress_step() {
        let mut sink = LogProgress::new("splitting").with_step(25);
        sink.set_maximum(200);
        sink.set_current(10);
        assert_eq!(sink.last_reported, Some(0));
        sink.set_current(40);
        assert_eq!(sink.last_reported, Some(0));
        sink.set_current(60);
        assert_eq!(sink.last_reported, Some(1));
        sink.set_current(200);
        assert_eq!(sink.last_reported, Some(4));

        let mut sink = LogProgress::new("indexing").with_step(0);
        sink.set_current(3);
        assert_eq!(sink.last_reported, Some(3));
    }

    #[test]
    fn test_token() {
        let token = CancellationToken::new();
        let sink = LogProgress::new("indexing").with_cancellation(token.clone());
        assert!(!sink.is_cancelled());
        token.cancel();
        assert!(sink.is_cancelled());
    }
}
