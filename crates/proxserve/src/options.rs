//! Construction options.
//!
//! Every field is optional when deserializing, so a partial JSON document
//! such as `{"debug":{"trace":"verbose"}}` yields the defaults for the rest.

use std::time::Duration;

use serde::Deserialize;

/// Default delay before a detached wrapper is revoked, in milliseconds.
pub const DEFAULT_DESTROY_DELAY_MS: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Options {
    /// Destroy detached sub-wrappers after `debug.destroy_delay`.
    pub strict: bool,
    /// Let `splice`/`shift`/`unshift` emit only their raw per-cell events
    /// instead of one composite event.
    pub emit_raw_method_events: bool,
    /// Cosmetic label for the root, used in traces.
    pub name: String,
    pub debug: DebugOptions,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            strict: true,
            emit_raw_method_events: false,
            name: String::new(),
            debug: DebugOptions::default(),
        }
    }
}

impl Options {
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn emit_raw_method_events(mut self, raw: bool) -> Self {
        self.emit_raw_method_events = raw;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn destroy_delay(mut self, millis: u64) -> Self {
        self.debug.destroy_delay = millis;
        self
    }

    pub fn trace(mut self, level: TraceLevel) -> Self {
        self.debug.trace = level;
        self
    }

    pub(crate) fn destroy_delay_duration(&self) -> Duration {
        Duration::from_millis(self.debug.destroy_delay)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DebugOptions {
    /// Milliseconds between detaching a wrapper and revoking it.
    pub destroy_delay: u64,
    pub trace: TraceLevel,
}

impl Default for DebugOptions {
    fn default() -> Self {
        Self {
            destroy_delay: DEFAULT_DESTROY_DELAY_MS,
            trace: TraceLevel::None,
        }
    }
}

/// How much of each change is routed to the trace sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceLevel {
    #[default]
    None,
    Normal,
    Verbose,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = Options::default();
        assert!(options.strict);
        assert!(!options.emit_raw_method_events);
        assert_eq!(options.name, "");
        assert_eq!(options.debug.destroy_delay, 1000);
        assert_eq!(options.debug.trace, TraceLevel::None);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let options: Options =
            serde_json::from_str(r#"{"emitRawMethodEvents":true,"debug":{"trace":"verbose"}}"#)
                .unwrap();
        assert!(options.strict);
        assert!(options.emit_raw_method_events);
        assert_eq!(options.debug.destroy_delay, 1000);
        assert_eq!(options.debug.trace, TraceLevel::Verbose);
    }

    #[test]
    fn test_unknown_trace_level_is_rejected() {
        let parsed: Result<Options, _> = serde_json::from_str(r#"{"debug":{"trace":"loud"}}"#);
        assert!(parsed.is_err());
    }
}
