//! Analysis messages
//!
//! Every observation made during an analysis run is recorded as a
//! [`Message`]: it carries the run it belongs to, a sequence number, the time
//! elapsed since the invocation started, a severity and an optional hint on
//! how to fix the problem. Messages are mirrored to `tracing` as they are
//! logged.

use crate::target::TargetKey;
use std::fmt;
use std::time::{Duration, Instant};

/// Message severity, in ascending order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Verbose,
    Informational,
    Warning,
    /// A benchmark metric is out of its limits
    TestError,
    /// The run cannot be trusted: configuration or stored data is broken
    SetupError,
    /// The run cannot be trusted: measurement or analysis failed
    ExecutionError,
}

impl Severity {
    /// Setup and execution errors stop the current pass
    pub fn is_critical(&self) -> bool {
        *self >= Severity::SetupError
    }

    /// Test errors and above
    pub fn is_error(&self) -> bool {
        *self >= Severity::TestError
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Verbose => "verbose",
            Severity::Informational => "info",
            Severity::Warning => "warning",
            Severity::TestError => "test error",
            Severity::SetupError => "setup error",
            Severity::ExecutionError => "execution error",
        };
        f.write_str(s)
    }
}

/// Component that produced a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageSource {
    Analyser,
    Limits,
    Measurement,
    Concurrency,
}

impl fmt::Display for MessageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MessageSource::Analyser => "analyser",
            MessageSource::Limits => "limits",
            MessageSource::Measurement => "measurement",
            MessageSource::Concurrency => "concurrency",
        };
        f.write_str(s)
    }
}

/// A single recorded message
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub run_number: u32,
    pub sequence: u32,
    pub elapsed: Duration,
    pub source: MessageSource,
    pub severity: Severity,
    pub target: Option<TargetKey>,
    pub text: String,
    pub hint: Option<String>,
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{}.{} {:>8.3}s ({}) {}: ",
            self.run_number,
            self.sequence,
            self.elapsed.as_secs_f64(),
            self.source,
            self.severity
        )?;
        if let Some(target) = &self.target {
            write!(f, "{}: ", target)?;
        }
        f.write_str(&self.text)?;
        if let Some(hint) = &self.hint {
            write!(f, "\n    hint: {}", hint)?;
        }
        Ok(())
    }
}

/// Ordered message log for one competition invocation
#[derive(Debug)]
pub struct MessageLog {
    started: Instant,
    run_number: u32,
    messages: Vec<Message>,
    safe_to_continue: bool,
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageLog {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            run_number: 1,
            messages: Vec::new(),
            safe_to_continue: true,
        }
    }

    /// Begin a new run; messages logged afterwards belong to it
    pub fn start_run(&mut self, run_number: u32) {
        self.run_number = run_number;
        self.safe_to_continue = true;
    }

    pub fn run_number(&self) -> u32 {
        self.run_number
    }

    /// False once the current run logged a setup or execution error
    pub fn safe_to_continue(&self) -> bool {
        self.safe_to_continue
    }

    /// Record a message
    pub fn log(
        &mut self,
        source: MessageSource,
        severity: Severity,
        target: Option<&TargetKey>,
        text: impl Into<String>,
        hint: Option<String>,
    ) {
        let text = text.into();
        let target = target.cloned();

        let subject = target.as_ref().map(|t| t.to_string()).unwrap_or_default();
        match severity {
            Severity::Verbose => tracing::trace!(%source, benchmark = %subject, "{}", text),
            Severity::Informational => tracing::info!(%source, benchmark = %subject, "{}", text),
            Severity::Warning => tracing::warn!(%source, benchmark = %subject, "{}", text),
            _ => tracing::error!(%source, benchmark = %subject, %severity, "{}", text),
        }

        if severity.is_critical() {
            self.safe_to_continue = false;
        }

        let sequence = self.messages.len() as u32 + 1;
        self.messages.push(Message {
            run_number: self.run_number,
            sequence,
            elapsed: self.started.elapsed(),
            source,
            severity,
            target,
            text,
            hint,
        });
    }

    pub fn verbose(&mut self, source: MessageSource, target: Option<&TargetKey>, text: impl Into<String>) {
        self.log(source, Severity::Verbose, target, text, None);
    }

    pub fn info(&mut self, source: MessageSource, target: Option<&TargetKey>, text: impl Into<String>) {
        self.log(source, Severity::Informational, target, text, None);
    }

    pub fn warning(&mut self, source: MessageSource, target: Option<&TargetKey>, text: impl Into<String>) {
        self.log(source, Severity::Warning, target, text, None);
    }

    pub fn test_error(
        &mut self,
        source: MessageSource,
        target: Option<&TargetKey>,
        text: impl Into<String>,
        hint: Option<String>,
    ) {
        self.log(source, Severity::TestError, target, text, hint);
    }

    pub fn setup_error(
        &mut self,
        source: MessageSource,
        target: Option<&TargetKey>,
        text: impl Into<String>,
        hint: Option<String>,
    ) {
        self.log(source, Severity::SetupError, target, text, hint);
    }

    pub fn execution_error(
        &mut self,
        source: MessageSource,
        target: Option<&TargetKey>,
        text: impl Into<String>,
        hint: Option<String>,
    ) {
        self.log(source, Severity::ExecutionError, target, text, hint);
    }

    /// All messages in logging order
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Messages of a single run
    pub fn run_messages(&self, run_number: u32) -> impl Iterator<Item = &Message> {
        self.messages
            .iter()
            .filter(move |m| m.run_number == run_number)
    }

    /// Highest severity logged in a run
    pub fn max_severity(&self, run_number: u32) -> Option<Severity> {
        self.run_messages(run_number).map(|m| m.severity).max()
    }

    /// Count of messages of exactly `severity` in all runs
    pub fn count(&self, severity: Severity) -> usize {
        self.messages.iter().filter(|m| m.severity == severity).count()
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }
}
