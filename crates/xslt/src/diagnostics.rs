//! Non-fatal reports raised during compilation and execution.

use crate::error::Location;
use std::fmt;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// A construct was skipped; execution continues.
    Warning,
    /// Text produced by `xsl:message`.
    Message,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub location: Option<Location>,
}

impl Diagnostic {
    pub fn warning(message: impl Into<String>, location: Option<Location>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            location,
        }
    }

    pub fn message(text: impl Into<String>, location: Option<Location>) -> Self {
        Self {
            severity: Severity::Message,
            message: text.into(),
            location,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(location) => write!(f, "{} (at {})", self.message, location),
            None => f.write_str(&self.message),
        }
    }
}

/// Receives diagnostics. Shared by concurrent runs, so it takes `&self`.
pub trait DiagnosticListener: Send + Sync {
    fn report(&self, diagnostic: &Diagnostic);
}

/// Forwards diagnostics to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDiagnostics;

impl DiagnosticListener for LogDiagnostics {
    fn report(&self, diagnostic: &Diagnostic) {
        match diagnostic.severity {
            Severity::Warning => log::warn!("{}", diagnostic),
            Severity::Message => log::info!("xsl:message: {}", diagnostic),
        }
    }
}

/// Keeps every diagnostic in memory.
#[derive(Debug, Default)]
pub struct CollectedDiagnostics {
    items: Mutex<Vec<Diagnostic>>,
}

impl CollectedDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<Diagnostic> {
        self.items.lock().map(|items| items.clone()).unwrap_or_default()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.texts(Severity::Warning)
    }

    pub fn messages(&self) -> Vec<String> {
        self.texts(Severity::Message)
    }

    fn texts(&self, severity: Severity) -> Vec<String> {
        self.all()
            .into_iter()
            .filter(|d| d.severity == severity)
            .map(|d| d.message)
            .collect()
    }
}

impl DiagnosticListener for CollectedDiagnostics {
    fn report(&self, diagnostic: &Diagnostic) {
        log::debug!("collected diagnostic: {}", diagnostic);
        if let Ok(mut items) = self.items.lock() {
            items.push(diagnostic.clone());
        }
    }
}
