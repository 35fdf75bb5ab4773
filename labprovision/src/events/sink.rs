//! Event sink trait and the `tracing`-backed implementation.

use tracing::{debug, info, Level};

use super::ProvisionEvent;

/// Receives provisioning lifecycle events.
///
/// Sinks must never fail the provisioning run; implementations log and
/// swallow their own errors.
pub trait EventSink: Send + Sync {
    /// Records an event.
    fn emit(&self, event: &ProvisionEvent);
}

/// A sink that writes events through `tracing`.
///
/// Used by default, at debug level, when no sink is configured.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a logging sink with the specified level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    /// The level events are logged at.
    #[must_use]
    pub fn level(&self) -> Level {
        self.level
    }
}

impl EventSink for LoggingEventSink {
    fn emit(&self, event: &ProvisionEvent) {
        let event_type = event.event_type();
        let data = serde_json::to_string(event).unwrap_or_default();
        if self.level == Level::DEBUG {
            debug!(event_type, event_data = %data, "Event: {}", event_type);
        } else {
            info!(event_type, event_data = %data, "Event: {}", event_type);
        }
    }
}
