//! Edit coalescing.
//!
//! One slot for the whole server, not one per document: a change to any
//! document supersedes whatever was buffered. The debouncer does not own a
//! timer task; the server loop sleeps until [`Debouncer::deadline`] and then
//! calls [`Debouncer::take_expired`].

use std::time::Duration;

use tokio::time::Instant;
use url::Url;

/// Content to analyze for one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub uri: Url,
    pub text: String,
}

#[derive(Debug)]
pub struct PendingChange {
    pub event: ChangeEvent,
    pub armed_at: Instant,
}

#[derive(Debug)]
enum State {
    Idle,
    Armed(PendingChange),
}

#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    state: State,
}

impl Debouncer {
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            state: State::Idle,
        }
    }

    /// Buffer `event` and restart the idle window.
    ///
    /// Returns the change it superseded, if any.
    pub fn arm(&mut self, event: ChangeEvent, now: Instant) -> Option<ChangeEvent> {
        let previous = std::mem::replace(
            &mut self.state,
            State::Armed(PendingChange {
                event,
                armed_at: now,
            }),
        );
        match previous {
            State::Armed(pending) => Some(pending.event),
            State::Idle => None,
        }
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        matches!(self.state, State::Armed(_))
    }

    /// When the buffered change becomes due.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        match &self.state {
            State::Armed(pending) => Some(pending.armed_at + self.delay),
            State::Idle => None,
        }
    }

    /// Release the buffered change if its idle window has elapsed.
    pub fn take_expired(&mut self, now: Instant) -> Option<ChangeEvent> {
        match self.deadline() {
            Some(deadline) if deadline <= now => self.flush(),
            _ => None,
        }
    }

    /// Release the buffered change regardless of the window.
    pub fn flush(&mut self) -> Option<ChangeEvent> {
        match std::mem::replace(&mut self.state, State::Idle) {
            State::Armed(pending) => Some(pending.event),
            State::Idle => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(text: &str) -> ChangeEvent {
        ChangeEvent {
            uri: Url::parse("file:///p/a.lsc").unwrap(),
            text: text.to_string(),
        }
    }

    const DELAY: Duration = Duration::from_millis(300);

    #[test]
    fn test_idle_has_nothing() {
        let mut debouncer = Debouncer::new(DELAY);
        assert!(!debouncer.is_armed());
        assert!(debouncer.deadline().is_none());
        assert!(debouncer.flush().is_none());
        assert!(debouncer.take_expired(Instant::now()).is_none());
    }

    #[test]
    fn test_rearming_supersedes_and_restarts_window() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(DELAY);

        assert!(debouncer.arm(change("a"), start).is_none());
        let later = start + Duration::from_millis(200);
        let superseded = debouncer.arm(change("ab"), later).unwrap();

        assert_eq!(superseded.text, "a");
        assert_eq!(debouncer.deadline(), Some(later + DELAY));
    }

    #[test]
    fn test_take_expired_respects_window() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(DELAY);
        debouncer.arm(change("abc"), start);

        assert!(debouncer.take_expired(start + Duration::from_millis(299)).is_none());
        assert!(debouncer.is_armed());

        let fired = debouncer.take_expired(start + DELAY).unwrap();
        assert_eq!(fired.text, "abc");
        assert!(!debouncer.is_armed());
        assert!(debouncer.take_expired(start + DELAY * 2).is_none());
    }

    #[test]
    fn test_burst_yields_last_content_once() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(DELAY);
        for (i, text) in ["a", "ab", "abc", "abcd"].into_iter().enumerate() {
            debouncer.arm(change(text), start + Duration::from_millis(50 * i as u64));
        }

        let fired = debouncer.take_expired(start + Duration::from_secs(1));
        assert_eq!(fired.map(|e| e.text), Some("abcd".to_string()));
        assert!(debouncer.take_expired(start + Duration::from_secs(2)).is_none());
    }

    #[test]
    fn test_flush_releases_before_deadline() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(DELAY);
        debouncer.arm(change("x"), start);

        assert_eq!(debouncer.flush().map(|e| e.text), Some("x".to_string()));
        assert!(debouncer.deadline().is_none());
    }

    #[test]
    fn test_single_slot_across_documents() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(DELAY);
        debouncer.arm(change("a"), start);
        let other = ChangeEvent {
            uri: Url::parse("file:///p/b.lsc").unwrap(),
            text: "b".to_string(),
        };

        let superseded = debouncer.arm(other, start).unwrap();
        assert_eq!(superseded.uri.as_str(), "file:///p/a.lsc");
        assert_eq!(
            debouncer.flush().map(|e| e.uri.to_string()),
            Some("file:///p/b.lsc".to_string())
        );
    }
}
