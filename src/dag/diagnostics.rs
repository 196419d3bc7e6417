// ABOUTME: Accumulated build-time diagnostics with kind tags and context
// ABOUTME: The builder reports problems best-effort instead of aborting early

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    UnresolvedReference,
    SelfReference,
    DuplicateDefinition,
    MalformedArity,
    EmptyExpression,
    MacroExpansion,
    InvalidPrototype,
    UnknownTarget,
}

impl DiagnosticKind {
    pub fn tag(&self) -> &'static str {
        match self {
            DiagnosticKind::UnresolvedReference => "unresolved-reference",
            DiagnosticKind::SelfReference => "self-reference",
            DiagnosticKind::DuplicateDefinition => "duplicate-definition",
            DiagnosticKind::MalformedArity => "malformed-arity",
            DiagnosticKind::EmptyExpression => "empty-expression",
            DiagnosticKind::MacroExpansion => "macro-expansion",
            DiagnosticKind::InvalidPrototype => "invalid-prototype",
            DiagnosticKind::UnknownTarget => "unknown-target",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone)]
pub struct BuildDiagnostic {
    pub kind: DiagnosticKind,
    pub severity: Severity,
    /// Where in the unit the problem sits, e.g. `wf.assign x` or `wf.task t`.
    pub context: String,
    pub message: String,
}

impl fmt::Display for BuildDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(
            f,
            "{severity}[{}] in `{}`: {}",
            self.kind.tag(),
            self.context,
            self.message
        )
    }
}

/// The outcome of a build: the diagnostics gathered across every unit.
#[derive(Debug, Default)]
pub struct BuildReport {
    diagnostics: Vec<BuildDiagnostic>,
}

impl BuildReport {
    pub fn push(&mut self, diagnostic: BuildDiagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn error(
        &mut self,
        kind: DiagnosticKind,
        context: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.push(BuildDiagnostic {
            kind,
            severity: Severity::Error,
            context: context.into(),
            message: message.into(),
        });
    }

    pub fn warning(
        &mut self,
        kind: DiagnosticKind,
        context: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.push(BuildDiagnostic {
            kind,
            severity: Severity::Warning,
            context: context.into(),
            message: message.into(),
        });
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn diagnostics(&self) -> &[BuildDiagnostic] {
        &self.diagnostics
    }

    pub fn errors(&self) -> impl Iterator<Item = &BuildDiagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &BuildDiagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_severity_split() {
        let mut report = BuildReport::default();
        assert!(!report.has_errors());

        report.warning(DiagnosticKind::UnknownTarget, "wf", "target never used");
        assert!(!report.has_errors());
        assert!(!report.is_empty());

        report.error(DiagnosticKind::UnresolvedReference, "wf.assign x", "no `y`");
        assert!(report.has_errors());
        assert_eq!(report.errors().count(), 1);
        assert_eq!(report.warnings().count(), 1);
    }

    #[test]
    fn test_diagnostic_display_carries_tag_and_context() {
        let d = BuildDiagnostic {
            kind: DiagnosticKind::SelfReference,
            severity: Severity::Error,
            context: "wf.assign x".to_string(),
            message: "assignment refers to itself".to_string(),
        };
        let text = d.to_string();
        assert!(text.contains("error[self-reference]"));
        assert!(text.contains("wf.assign x"));
    }
}
