//! # Step reporting
//!
//! The harness records what it does through [`StepReporter`]; it never
//! formats or persists reports itself. [`TracingReporter`] forwards steps to
//! `tracing`, [`RecordingReporter`] keeps them in memory for assertions.

use std::sync::Mutex;
use tracing::{error, info, warn};

/// Reporting collaborator
pub trait StepReporter: Send + Sync {
    /// One attempted element action
    fn log_action(&self, name: &str, description: &str, target: &str, value: Option<&str>);

    fn pass(&self, message: &str);

    fn fail(&self, message: &str);

    fn warn(&self, message: &str);

    fn info(&self, message: &str);

    /// Failure evidence; ignored by default
    fn attach_screenshot(&self, _label: &str, _png: &[u8]) {}
}

/// Reporter backed by `tracing` events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl StepReporter for TracingReporter {
    fn log_action(&self, name: &str, description: &str, target: &str, value: Option<&str>) {
        info!(action = name, target = target, value = value, "{}", description);
    }

    fn pass(&self, message: &str) {
        info!(status = "pass", "{}", message);
    }

    fn fail(&self, message: &str) {
        error!(status = "fail", "{}", message);
    }

    fn warn(&self, message: &str) {
        warn!("{}", message);
    }

    fn info(&self, message: &str) {
        info!("{}", message);
    }

    fn attach_screenshot(&self, label: &str, png: &[u8]) {
        info!(bytes = png.len(), "Captured screenshot: {}", label);
    }
}

/// Recorded step kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepKind {
    Action,
    Pass,
    Fail,
    Warn,
    Info,
    Screenshot,
}

/// One recorded step
#[derive(Debug, Clone)]
pub struct Step {
    pub kind: StepKind,
    pub message: String,
    pub target: Option<String>,
    pub value: Option<String>,
    pub at: chrono::DateTime<chrono::Utc>,
}

/// In-memory reporter
#[derive(Debug, Default)]
pub struct RecordingReporter {
    steps: Mutex<Vec<Step>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> Vec<Step> {
        self.steps
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    pub fn count(&self, kind: StepKind) -> usize {
        self.steps().iter().filter(|s| s.kind == kind).count()
    }

    fn push(&self, kind: StepKind, message: &str, target: Option<&str>, value: Option<&str>) {
        if let Ok(mut steps) = self.steps.lock() {
            steps.push(Step {
                kind,
                message: message.to_string(),
                target: target.map(str::to_string),
                value: value.map(str::to_string),
                at: chrono::Utc::now(),
            });
        }
    }
}

impl StepReporter for RecordingReporter {
    fn log_action(&self, name: &str, description: &str, target: &str, value: Option<&str>) {
        self.push(
            StepKind::Action,
            &format!("{}: {}", name, description),
            Some(target),
            value,
        );
    }

    fn pass(&self, message: &str) {
        self.push(StepKind::Pass, message, None, None);
    }

    fn fail(&self, message: &str) {
        self.push(StepKind::Fail, message, None, None);
    }

    fn warn(&self, message: &str) {
        self.push(StepKind::Warn, message, None, None);
    }

    fn info(&self, message: &str) {
        self.push(StepKind::Info, message, None, None);
    }

    fn attach_screenshot(&self, label: &str, _png: &[u8]) {
        self.push(StepKind::Screenshot, label, None, None);
    }
}
