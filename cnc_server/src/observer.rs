//! Telemetry observers and the UI mirror.
//!
//! Observers are notified synchronously after every telemetry write and on
//! every method entry/exit. They are fire-and-forget: nothing they do can
//! fail or delay the write that triggered them.

use crate::model::Variant;
use crate::telemetry::PUBLISHED_VARIABLES;
use cnc_common::consts::METHOD_LOG_CAPACITY;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

/// Listener for telemetry writes and method log messages.
pub trait TelemetryObserver: Send + Sync {
    /// A published variable changed.
    fn update_variable(&self, name: &str, value: &Variant);

    /// A remote method logged `message`.
    fn log_method(&self, _method: &str, _message: &str) {}
}

/// Mirror of the published state, as shown by an operator panel.
///
/// Keeps the latest value of every published variable and a bounded log
/// per method channel.
pub struct UiMirror {
    values: Mutex<HashMap<String, Variant>>,
    logs: Mutex<HashMap<String, VecDeque<String>>>,
    log_capacity: usize,
}

impl UiMirror {
    /// Create an empty mirror.
    pub fn new() -> Self {
        Self::with_log_capacity(METHOD_LOG_CAPACITY)
    }

    /// Create an empty mirror keeping at most `log_capacity` lines per method.
    pub fn with_log_capacity(log_capacity: usize) -> Self {
        Self {
            values: Mutex::new(HashMap::new()),
            logs: Mutex::new(HashMap::new()),
            log_capacity: log_capacity.max(1),
        }
    }

    /// Latest mirrored value of `name`.
    pub fn value(&self, name: &str) -> Option<Variant> {
        self.values.lock().get(name).cloned()
    }

    /// Log lines of one method channel, oldest first.
    pub fn method_log(&self, method: &str) -> Vec<String> {
        self.logs
            .lock()
            .get(method)
            .map(|log| log.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// "Realtime Variables" panel, one `name: value` line per published
    /// variable in publication order. Unset variables show `N/A`.
    pub fn render(&self) -> Vec<String> {
        let values = self.values.lock();
        PUBLISHED_VARIABLES
            .iter()
            .map(|name| match values.get(*name) {
                Some(value) => format!("{name}: {value}"),
                None => format!("{name}: N/A"),
            })
            .collect()
    }
}

impl Default for UiMirror {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryObserver for UiMirror {
    fn update_variable(&self, name: &str, value: &Variant) {
        self.values.lock().insert(name.to_string(), value.clone());
    }

    fn log_method(&self, method: &str, message: &str) {
        let mut logs = self.logs.lock();
        let log = logs.entry(method.to_string()).or_default();
        if log.len() == self.log_capacity {
            log.pop_front();
        }
        log.push_back(message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn render_shows_na_until_written() {
        let mirror = UiMirror::new();
        let lines = mirror.render();
        assert_eq!(lines.len(), PUBLISHED_VARIABLES.len());
        assert_eq!(lines[0], "x_position_direct: N/A");

        mirror.update_variable("x_position_direct", &Variant::Double(12.5));
        assert_eq!(mirror.render()[0], "x_position_direct: 12.5");
    }

    #[test]
    fn timestamps_render_to_the_second() {
        let mirror = UiMirror::new();
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 15).unwrap();
        mirror.update_variable("server_timestamp", &Variant::DateTime(t));
        let last = mirror.render().pop().unwrap();
        assert_eq!(last, "server_timestamp: 2024-05-01 08:30:15");
    }

    #[test]
    fn method_log_is_bounded() {
        let mirror = UiMirror::with_log_capacity(2);
        mirror.log_method("run_gcode", "one");
        mirror.log_method("run_gcode", "two");
        mirror.log_method("run_gcode", "three");
        assert_eq!(mirror.method_log("run_gcode"), vec!["two", "three"]);
        assert!(mirror.method_log("stop_cnc_machine").is_empty());
    }
}
