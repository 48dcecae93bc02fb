//! Change tracing.
//!
//! When `debug.trace` is not `none`, every event produced by a write is
//! handed to a [`TraceSink`] before it is dispatched. The default sink logs
//! through `tracing`.

use std::backtrace::{Backtrace, BacktraceStatus};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::events::{ChangeEvent, MethodArgs};
use crate::options::TraceLevel;

/// One traced change.
#[derive(Debug)]
pub struct TraceRecord<'a> {
    /// The `name` option of the tree.
    pub name: &'a str,
    /// Absolute path of the changed property.
    pub path: &'a str,
    pub event: &'a ChangeEvent,
    pub level: TraceLevel,
    /// Buffered for replay after a bulk array operation.
    pub deferred: bool,
}

impl TraceRecord<'_> {
    /// Human-readable one-line summary.
    pub fn describe(&self) -> String {
        let root = if self.name.is_empty() { "root" } else { self.name };
        let path = if self.path.is_empty() { "<root>" } else { self.path };
        let mut out = format!(
            "[{root}] {path} {kind}: {old:?} -> {new:?}",
            kind = self.event.kind,
            old = self.event.old_value,
            new = self.event.value,
        );
        match &self.event.args {
            Some(MethodArgs::Splice {
                start,
                delete_count,
                items,
            }) => out.push_str(&format!(" (start {start}, delete {delete_count}, insert {items:?})")),
            Some(MethodArgs::Unshift { items }) => out.push_str(&format!(" (insert {items:?})")),
            Some(MethodArgs::Shift) | None => {}
        }
        if self.deferred {
            out.push_str(" [deferred]");
        }
        out
    }
}

pub trait TraceSink {
    fn record(&self, record: &TraceRecord<'_>);
}

/// Sink writing to `tracing` at info level. Verbose records carry a
/// backtrace of the write.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl TraceSink for LogSink {
    fn record(&self, record: &TraceRecord<'_>) {
        match record.level {
            TraceLevel::None => {}
            TraceLevel::Normal => {
                tracing::info!(target: "proxserve::trace", "{}", record.describe());
            }
            TraceLevel::Verbose => {
                let backtrace = Backtrace::capture();
                if backtrace.status() != BacktraceStatus::Captured {
                    Diagnostics::global().warn_missing_backtrace();
                }
                tracing::info!(
                    target: "proxserve::trace",
                    %backtrace,
                    "{}",
                    record.describe()
                );
            }
        }
    }
}

/// Process-wide diagnostic flags.
pub(crate) struct Diagnostics {
    backtrace_warned: AtomicBool,
}

static DIAGNOSTICS: Diagnostics = Diagnostics::new();

impl Diagnostics {
    const fn new() -> Self {
        Self {
            backtrace_warned: AtomicBool::new(false),
        }
    }

    pub(crate) fn global() -> &'static Diagnostics {
        &DIAGNOSTICS
    }

    /// Warn once per process that verbose traces lack call stacks.
    pub(crate) fn warn_missing_backtrace(&self) -> bool {
        if self.backtrace_warned.swap(true, Ordering::Relaxed) {
            return false;
        }
        tracing::warn!("backtraces are disabled; set RUST_BACKTRACE=1 for verbose traces");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventType;
    use crate::value::Value;

    #[test]
    fn test_describe() {
        let event = ChangeEvent::new(String::new(), Value::from(2), Value::from(1), EventType::Update);
        let record = TraceRecord {
            name: "store",
            path: ".a",
            event: &event,
            level: TraceLevel::Normal,
            deferred: false,
        };
        assert_eq!(record.describe(), "[store] .a update: 1 -> 2");
    }

    #[test]
    fn test_describe_splice() {
        let mut event = ChangeEvent::new(String::new(), Value::array(), Value::array(), EventType::Splice);
        event.args = Some(MethodArgs::Splice {
            start: 1,
            delete_count: 0,
            items: vec![Value::from("x")],
        });
        let record = TraceRecord {
            name: "",
            path: "",
            event: &event,
            level: TraceLevel::Verbose,
            deferred: true,
        };
        assert_eq!(
            record.describe(),
            "[root] <root> splice: [] -> [] (start 1, delete 0, insert [\"x\"]) [deferred]"
        );
    }

    #[test]
    fn test_missing_backtrace_warning_fires_once() {
        let diagnostics = Diagnostics::new();
        assert!(diagnostics.warn_missing_backtrace());
        assert!(!diagnostics.warn_missing_backtrace());
    }
}
