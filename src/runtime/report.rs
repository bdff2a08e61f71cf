//! Run reporting
//!
//! The engine emits fire-and-forget events through the [`Reporter`] trait.
//! [`HumanReporter`] prints one line per event, [`JsonReporter`] one JSON
//! object per line, and [`RecordingReporter`] keeps events in memory.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use colored::Colorize;
use serde::Serialize;

use crate::common::Error;
use crate::script::Value;

pub type Vars = BTreeMap<String, Value>;

/// Output verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Level {
    Off,
    #[default]
    Default,
    Info,
    Debug,
}

impl FromStr for Level {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" | "quiet" => Ok(Level::Off),
            "default" => Ok(Level::Default),
            "info" => Ok(Level::Info),
            "debug" => Ok(Level::Debug),
            other => Err(Error::Config(format!("unknown output level: {}", other))),
        }
    }
}

impl Level {
    /// Raise the level by `n` steps, saturating at `Debug`
    pub fn raised(self, n: u8) -> Level {
        (0..n).fold(self, |level, _| match level {
            Level::Off => Level::Default,
            Level::Default => Level::Info,
            Level::Info | Level::Debug => Level::Debug,
        })
    }
}

/// What an event is about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Plan,
    Serial,
    Parallel,
    Action,
    Check,
}

impl EventKind {
    fn as_str(self) -> &'static str {
        match self {
            EventKind::Plan => "plan",
            EventKind::Serial => "serial",
            EventKind::Parallel => "parallel",
            EventKind::Action => "action",
            EventKind::Check => "check",
        }
    }

    /// Minimum level at which start and finish events are shown
    fn level(self) -> Level {
        match self {
            EventKind::Plan | EventKind::Action | EventKind::Check => Level::Default,
            EventKind::Serial | EventKind::Parallel => Level::Info,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sink for run events
pub trait Reporter: Send + Sync {
    fn start(&self, kind: EventKind, name: &str);

    fn finish(&self, kind: EventKind, name: &str, ok: bool, elapsed: Duration, data: Option<&Vars>);

    /// One evaluated check, with the variables it saw
    fn check(&self, ok: bool, message: &str, vars: &Vars);

    fn error(&self, kind: EventKind, name: &str, message: &str);
}

fn check_level(ok: bool) -> Level {
    if ok {
        Level::Info
    } else {
        Level::Default
    }
}

/// Human-readable lines: `[#] {0.012s} name`
pub struct HumanReporter {
    out: Mutex<Box<dyn Write + Send>>,
    level: Level,
    color: bool,
    started: Instant,
}

impl HumanReporter {
    pub fn new(out: Box<dyn Write + Send>, level: Level, color: bool) -> Self {
        Self {
            out: Mutex::new(out),
            level,
            color,
            started: Instant::now(),
        }
    }

    pub fn stdout(level: Level, color: bool) -> Self {
        Self::new(Box::new(std::io::stdout()), level, color)
    }

    fn enabled(&self, level: Level) -> bool {
        self.level != Level::Off && self.level >= level
    }

    fn write_lines(&self, lines: &[String]) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        for line in lines {
            // Reporting must never fail the run.
            let _ = writeln!(out, "{}", line);
        }
        let _ = out.flush();
    }

    fn symbol(&self, kind: EventKind) -> String {
        let sym = match kind {
            EventKind::Plan => "#",
            EventKind::Serial => "-",
            EventKind::Parallel => "=",
            EventKind::Action => "!",
            EventKind::Check => "?",
        };
        if self.color && kind == EventKind::Action {
            sym.blue().to_string()
        } else {
            sym.to_string()
        }
    }

    fn mark(&self, ok: bool) -> String {
        match (ok, self.color) {
            (true, true) => "✓".green().to_string(),
            (false, true) => "✗".red().to_string(),
            (true, false) => "✓".to_string(),
            (false, false) => "✗".to_string(),
        }
    }

    fn name(&self, kind: EventKind, name: &str) -> String {
        if self.color && kind == EventKind::Plan {
            name.underline().to_string()
        } else {
            name.to_string()
        }
    }

    fn now(&self) -> String {
        format!("{{{:.3}s}}", self.started.elapsed().as_secs_f64())
    }

    fn dump_vars(lines: &mut Vec<String>, vars: &Vars) {
        for (k, v) in vars {
            lines.push(format!("      {}: {}", k, v));
        }
    }
}

impl Reporter for HumanReporter {
    fn start(&self, kind: EventKind, name: &str) {
        if !self.enabled(kind.level()) {
            return;
        }
        self.write_lines(&[format!(
            "[{}] {} {}",
            self.symbol(kind),
            self.now(),
            self.name(kind, name)
        )]);
    }

    fn finish(&self, kind: EventKind, name: &str, ok: bool, elapsed: Duration, data: Option<&Vars>) {
        if !self.enabled(kind.level()) {
            return;
        }
        let mut lines = vec![format!(
            "[{}] {} ({:?}) {} {}",
            self.symbol(kind),
            self.now(),
            elapsed,
            self.name(kind, name),
            self.mark(ok)
        )];
        if let Some(data) = data.filter(|_| self.enabled(Level::Debug)) {
            Self::dump_vars(&mut lines, data);
        }
        self.write_lines(&lines);
    }

    fn check(&self, ok: bool, message: &str, vars: &Vars) {
        if !self.enabled(check_level(ok)) {
            return;
        }
        let mut lines = vec![format!("[{}] {}", self.mark(ok), message)];
        if self.enabled(Level::Debug) {
            Self::dump_vars(&mut lines, vars);
        }
        self.write_lines(&lines);
    }

    fn error(&self, kind: EventKind, name: &str, message: &str) {
        if !self.enabled(Level::Default) {
            return;
        }
        let tag = if self.color {
            "E".red().bold().to_string()
        } else {
            "E".to_string()
        };
        self.write_lines(&[format!("[{}] {} {} {}: {}", tag, self.now(), kind, name, message)]);
    }
}

#[derive(Serialize)]
struct JsonEvent<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    timestamp: String,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    event: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pass: Option<bool>,
    /// Seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a Vars>,
    #[serde(skip_serializing_if = "Option::is_none")]
    vars: Option<&'a Vars>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

impl<'a> JsonEvent<'a> {
    fn new(kind: EventKind, message: &'a str) -> Self {
        Self {
            kind: kind.as_str(),
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            message,
            event: None,
            pass: None,
            duration: None,
            result: None,
            vars: None,
            error: None,
        }
    }
}

/// One JSON object per line
pub struct JsonReporter {
    out: Mutex<Box<dyn Write + Send>>,
    level: Level,
}

impl JsonReporter {
    pub fn new(out: Box<dyn Write + Send>, level: Level) -> Self {
        Self {
            out: Mutex::new(out),
            level,
        }
    }

    pub fn stdout(level: Level) -> Self {
        Self::new(Box::new(std::io::stdout()), level)
    }

    fn enabled(&self, level: Level) -> bool {
        self.level != Level::Off && self.level >= level
    }

    fn emit(&self, event: &JsonEvent<'_>) {
        let Ok(line) = serde_json::to_string(event) else {
            return;
        };
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = writeln!(out, "{}", line);
        let _ = out.flush();
    }
}

impl Reporter for JsonReporter {
    fn start(&self, kind: EventKind, name: &str) {
        if !self.enabled(kind.level()) {
            return;
        }
        let mut event = JsonEvent::new(kind, name);
        event.event = Some("start");
        self.emit(&event);
    }

    fn finish(&self, kind: EventKind, name: &str, ok: bool, elapsed: Duration, data: Option<&Vars>) {
        if !self.enabled(kind.level()) {
            return;
        }
        let mut event = JsonEvent::new(kind, name);
        event.event = Some("finish");
        event.pass = Some(ok);
        event.duration = Some(elapsed.as_secs_f64());
        if self.enabled(Level::Debug) {
            event.result = data;
        }
        self.emit(&event);
    }

    fn check(&self, ok: bool, message: &str, vars: &Vars) {
        if !self.enabled(check_level(ok)) {
            return;
        }
        let mut event = JsonEvent::new(EventKind::Check, message);
        event.pass = Some(ok);
        if self.enabled(Level::Debug) {
            event.vars = Some(vars);
        }
        self.emit(&event);
    }

    fn error(&self, kind: EventKind, name: &str, message: &str) {
        if !self.enabled(Level::Default) {
            return;
        }
        let mut event = JsonEvent::new(kind, name);
        event.event = Some("error");
        event.error = Some(message);
        self.emit(&event);
    }
}

/// A recorded event
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Start { kind: EventKind, name: String },
    Finish { kind: EventKind, name: String, ok: bool, data: Option<Vars> },
    Check { ok: bool, message: String, vars: Vars },
    Error { kind: EventKind, name: String, message: String },
}

/// Keeps every event in memory, in emission order
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<Event>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: Event) {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// `(ok, message)` of every check, in order
    pub fn checks(&self) -> Vec<(bool, String)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Check { ok, message, .. } => Some((ok, message)),
                _ => None,
            })
            .collect()
    }

    /// Messages of every error event, in order
    pub fn errors(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Error { message, .. } => Some(message),
                _ => None,
            })
            .collect()
    }
}

impl Reporter for RecordingReporter {
    fn start(&self, kind: EventKind, name: &str) {
        self.push(Event::Start {
            kind,
            name: name.to_string(),
        });
    }

    fn finish(&self, kind: EventKind, name: &str, ok: bool, _elapsed: Duration, data: Option<&Vars>) {
        self.push(Event::Finish {
            kind,
            name: name.to_string(),
            ok,
            data: data.cloned(),
        });
    }

    fn check(&self, ok: bool, message: &str, vars: &Vars) {
        self.push(Event::Check {
            ok,
            message: message.to_string(),
            vars: vars.clone(),
        });
    }

    fn error(&self, kind: EventKind, name: &str, message: &str) {
        self.push(Event::Error {
            kind,
            name: name.to_string(),
            message: message.to_string(),
        });
    }
}
