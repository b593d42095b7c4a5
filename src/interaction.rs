//! Record of user interactions, handed explicitly to the components that
//! produce them.

use std::sync::{Mutex, PoisonError};

use web_time::{SystemTime, UNIX_EPOCH};

/// Something the user did.
#[derive(Debug, Clone, PartialEq)]
pub enum InteractionEvent {
    BeginDrawing { axis: usize },
    EndDrawing { axis: usize },
    SliceChanged { axis: usize, delta: i64 },
    Undo,
    Redo,
    LabelRemoved { label: u8 },
    HistoryCleared,
}

impl std::fmt::Display for InteractionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BeginDrawing { axis } => write!(f, "beginDrawing(axis) {}", axis),
            Self::EndDrawing { axis } => write!(f, "endDrawing(axis) {}", axis),
            Self::SliceChanged { axis, delta } => {
                write!(f, "changeSliceDelta(axis, num) {}, {}", axis, delta)
            }
            Self::Undo => write!(f, "undo()"),
            Self::Redo => write!(f, "redo()"),
            Self::LabelRemoved { label } => write!(f, "removeLabel(number) {}", label),
            Self::HistoryCleared => write!(f, "clearHistory()"),
        }
    }
}

/// An event with the time it was recorded, in seconds since the epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionEntry {
    pub timestamp: f64,
    pub event: InteractionEvent,
}

impl std::fmt::Display for InteractionEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6}: {}", self.timestamp, self.event)
    }
}

/// Seconds since the Unix epoch, 0.0 if the clock is before it.
pub fn now_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Receiver of interaction events.
pub trait InteractionSink: Send + Sync {
    fn record(&self, event: InteractionEvent);
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct InteractionLog {
    entries: Mutex<Vec<InteractionEntry>>,
}

impl InteractionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<InteractionEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn events(&self) -> Vec<InteractionEvent> {
        self.entries().into_iter().map(|e| e.event).collect()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl InteractionSink for InteractionLog {
    fn record(&self, event: InteractionEvent) {
        let entry = InteractionEntry {
            timestamp: now_seconds(),
            event,
        };
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }
}

/// Forwards events to the `log` facade at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl InteractionSink for LogSink {
    fn record(&self, event: InteractionEvent) {
        log::debug!(target: "voxlab::interaction", "{:.6}: {}", now_seconds(), event);
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl InteractionSink for NullSink {
    fn record(&self, _event: InteractionEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_keeps_order() {
        let log = InteractionLog::new();
        log.record(InteractionEvent::BeginDrawing { axis: 2 });
        log.record(InteractionEvent::EndDrawing { axis: 2 });
        log.record(InteractionEvent::Undo);
        assert_eq!(
            log.events(),
            vec![
                InteractionEvent::BeginDrawing { axis: 2 },
                InteractionEvent::EndDrawing { axis: 2 },
                InteractionEvent::Undo,
            ]
        );
        let entries = log.entries();
        assert!(entries[0].timestamp <= entries[2].timestamp);
    }

    #[test]
    fn test_entry_display() {
        let entry = InteractionEntry {
            timestamp: 1.5,
            event: InteractionEvent::SliceChanged { axis: 0, delta: -10 },
        };
        assert_eq!(entry.to_string(), "1.500000: changeSliceDelta(axis, num) 0, -10");
    }

    #[test]
    fn test_clear() {
        let log = InteractionLog::new();
        log.record(InteractionEvent::Redo);
        assert_eq!(log.len(), 1);
        log.clear();
        assert!(log.is_empty());
    }
}
