//! Stage status codes and their aggregation rules.

use std::fmt;

/// Outcome code of one plugin invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Code {
    Success,
    /// No node fits; the retry policy applies.
    Unschedulable,
    /// Will not fix itself; skip retry.
    UnschedulableAndUnresolvable,
    /// Internal failure, surfaced to the caller.
    Error,
    /// The plugin wants the workload to wait (Permit stage).
    Wait,
    /// The plugin opted out of this extension point for this workload.
    Skip,
}

impl Code {
    /// Severity rank used when aggregating statuses across plugins and
    /// nodes: `Error > UnschedulableAndUnresolvable > Unschedulable`.
    fn severity(self) -> u8 {
        match self {
            Code::Error => 3,
            Code::UnschedulableAndUnresolvable => 2,
            Code::Unschedulable => 1,
            Code::Success | Code::Wait | Code::Skip => 0,
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Code::Success => "Success",
            Code::Unschedulable => "Unschedulable",
            Code::UnschedulableAndUnresolvable => "UnschedulableAndUnresolvable",
            Code::Error => "Error",
            Code::Wait => "Wait",
            Code::Skip => "Skip",
        };
        f.write_str(s)
    }
}

/// The result a plugin returns from an extension point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    code: Code,
    reasons: Vec<String>,
    failed_plugins: Vec<String>,
}

impl Status {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            reasons: vec![message.into()],
            failed_plugins: Vec::new(),
        }
    }

    pub fn success() -> Self {
        Self {
            code: Code::Success,
            reasons: Vec::new(),
            failed_plugins: Vec::new(),
        }
    }

    pub fn unschedulable(message: impl Into<String>) -> Self {
        Self::new(Code::Unschedulable, message)
    }

    pub fn unresolvable(message: impl Into<String>) -> Self {
        Self::new(Code::UnschedulableAndUnresolvable, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Code::Error, message)
    }

    pub fn skip() -> Self {
        Self {
            code: Code::Skip,
            reasons: Vec::new(),
            failed_plugins: Vec::new(),
        }
    }

    pub fn wait(message: impl Into<String>) -> Self {
        Self::new(Code::Wait, message)
    }

    pub fn with_failed_plugin(mut self, plugin: impl Into<String>) -> Self {
        self.failed_plugins.push(plugin.into());
        self
    }

    pub fn code(&self) -> Code {
        self.code
    }

    pub fn message(&self) -> String {
        self.reasons.join(", ")
    }

    pub fn reasons(&self) -> &[String] {
        &self.reasons
    }

    pub fn failed_plugins(&self) -> &[String] {
        &self.failed_plugins
    }

    pub fn is_success(&self) -> bool {
        self.code == Code::Success
    }

    pub fn is_skip(&self) -> bool {
        self.code == Code::Skip
    }

    pub fn is_wait(&self) -> bool {
        self.code == Code::Wait
    }

    pub fn is_unschedulable(&self) -> bool {
        matches!(
            self.code,
            Code::Unschedulable | Code::UnschedulableAndUnresolvable
        )
    }

    /// Merge another status into this one, keeping the most severe
    /// code and accumulating reasons and failed plugins.
    pub fn merge(&mut self, other: Status) {
        if other.code.severity() > self.code.severity() {
            self.code = other.code;
        }
        self.reasons.extend(other.reasons);
        self.failed_plugins.extend(other.failed_plugins);
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::success()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reasons.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{}: {}", self.code, self.message())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_keeps_the_most_severe_code() {
        let mut status = Status::unschedulable("no room");
        status.merge(Status::error("boom"));
        assert_eq!(status.code(), Code::Error);

        let mut status = Status::error("boom");
        status.merge(Status::unresolvable("never"));
        assert_eq!(status.code(), Code::Error);

        let mut status = Status::unschedulable("no room");
        status.merge(Status::unresolvable("never"));
        assert_eq!(status.code(), Code::UnschedulableAndUnresolvable);
    }

    #[test]
    fn merge_accumulates_reasons_and_plugins() {
        let mut status = Status::unschedulable("a").with_failed_plugin("NodeResourcesFit");
        status.merge(Status::unschedulable("b").with_failed_plugin("NodeLabel"));
        assert_eq!(status.message(), "a, b");
        assert_eq!(status.failed_plugins(), ["NodeResourcesFit", "NodeLabel"]);
    }

    #[test]
    fn success_merging_failure_becomes_failure() {
        let mut status = Status::success();
        status.merge(Status::unschedulable("no room"));
        assert!(!status.is_success());
        assert!(status.is_unschedulable());
    }
}
