// SPDX-License-Identifier: GPL-3.0-or-later

//! Logging support for the binaries: compiler-style message formatting
//! and warning aggregation.
//!
//! An analysis of a real code base produces many warnings (missing
//! includes, macro redefinitions, expression faults). The aggregator
//! inspects every warning as it passes through the logger and, at the
//! end of the run, emits meta-warnings that summarise what happened and
//! suggest fixes.

use log::{Level, LevelFilter, Log, Metadata, Record};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A meta-warning stands for a family of warnings. It matches
/// constituent warnings by substring and reports once, with a count and
/// suggested actions.
struct MetaWarning {
    /// Substring that identifies constituent warnings; the empty
    /// pattern matches every warning.
    pattern: &'static str,
    /// The summary message; `{}` is replaced with the count.
    message: &'static str,
    count: AtomicUsize,
}

impl MetaWarning {
    const fn new(pattern: &'static str, message: &'static str) -> MetaWarning {
        MetaWarning {
            pattern,
            message,
            count: AtomicUsize::new(0),
        }
    }

    fn inspect(&self, text: &str) {
        if text.contains(self.pattern) {
            self.count.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn summary(&self) -> Option<String> {
        let count = self.count.load(Ordering::Relaxed);
        if count == 0 {
            return None;
        }
        Some(self.message.replace("{}", &count.to_string()))
    }
}

static META_WARNINGS: [MetaWarning; 3] = [
    MetaWarning::new("", "{} warnings generated during preprocessing."),
    MetaWarning::new(
        "user include",
        "{} user include files could not be found.\n\
         \x20 These could contain important macros and includes.\n\
         \x20 Suggested solutions:\n\
         \x20 - Check that the file(s) exist in the code base.\n\
         \x20 - Check the include paths in the compilation database.\n\
         \x20 - Check if the include(s) should have used '<>'.",
    ),
    MetaWarning::new(
        "system include",
        "{} system include files could not be found.\n\
         \x20 These could define important feature macros.\n\
         \x20 Suggested solutions:\n\
         \x20 - Check that the file(s) exist on your system.\n\
         \x20 - Use .cbi/config to define system include paths.\n\
         \x20 - Use .cbi/config to define important macros.",
    ),
];

/// Wraps the real logger, inspecting every warning on its way through.
/// It filters nothing; the hook exists only to count.
struct WarningAggregator {
    inner: env_logger::Logger,
}

impl Log for WarningAggregator {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        if record.level() == Level::Warn {
            let text = record.args().to_string();
            for meta in &META_WARNINGS {
                meta.inspect(&text);
            }
        }
        self.inner.log(record);
    }

    fn flush(&self) {
        self.inner.flush()
    }
}

/// Install the aggregating logger for a binary. Messages format like
/// compiler diagnostics (`warning: ...`); info messages print bare.
pub fn init(level: LevelFilter) {
    let inner = env_logger::Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            if record.level() == Level::Info {
                writeln!(buf, "{}", record.args())
            } else {
                writeln!(
                    buf,
                    "{}: {}",
                    record.level().to_string().to_lowercase(),
                    record.args()
                )
            }
        })
        .build();
    log::set_max_level(inner.filter());
    let _ = log::set_boxed_logger(Box::new(WarningAggregator { inner }));
}

/// Emit the meta-warnings collected over the run, if any.
pub fn summarize() {
    for meta in &META_WARNINGS {
        if let Some(message) = meta.summary() {
            log::warn!("{message}");
        }
    }
}
