// diag.rs — Unified diagnostics model
//
// Provides the shared diagnostic types used across all compiler phases.
// Unlike a source-language compiler, nac has no spans: diagnostics carry
// netlist node context (id, operator, resolved timing) instead, since that
// is what a front end needs to map an error back to its own IR.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;

use crate::id::NodeId;

// ── Diagnostic code ──────────────────────────────────────────────────────

/// A stable diagnostic code (e.g., `E0100`, `W0400`).
///
/// Codes are `&'static str` constants defined in the `codes` module.
/// Once assigned, a code must never be reassigned to a different semantic
/// meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiagCode(pub &'static str);

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable diagnostic codes. Grouped by failure class:
/// E01xx scheduling, E02xx consistency, E03xx unsupported constructs,
/// E05xx verification, W04xx warnings.
pub mod codes {
    use super::DiagCode;

    /// Operator latency cannot fit within one clock period.
    pub const E0100: DiagCode = DiagCode("E0100");
    /// Interface concurrency limit can never be satisfied.
    pub const E0101: DiagCode = DiagCode("E0101");
    /// Input scheduled before its driver's output.
    pub const E0200: DiagCode = DiagCode("E0200");
    /// Unscheduled node encountered by a downstream phase.
    pub const E0201: DiagCode = DiagCode("E0201");
    /// RTL requested for an output with no forward declaration.
    pub const E0202: DiagCode = DiagCode("E0202");
    /// Synonym ports resolved to different RTL objects.
    pub const E0203: DiagCode = DiagCode("E0203");
    /// Persistence range set after incarnations already exist.
    pub const E0204: DiagCode = DiagCode("E0204");
    /// Value requested earlier than its origin clock.
    pub const E0205: DiagCode = DiagCode("E0205");
    /// Node shape the allocator cannot lower.
    pub const E0300: DiagCode = DiagCode("E0300");
    /// Stage verification certificate failure.
    pub const E0500: DiagCode = DiagCode("E0500");
    /// Malformed netlist input.
    pub const E0301: DiagCode = DiagCode("E0301");
    /// Degenerate construct (e.g. element with no nodes).
    pub const W0400: DiagCode = DiagCode("W0400");
}

// ── Severity level ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagLevel {
    Error,
    Warning,
}

// ── Node context ─────────────────────────────────────────────────────────

/// Netlist context attached to a diagnostic: which node, what operator,
/// and (when already scheduled) its resolved start time.
#[derive(Debug, Clone)]
pub struct NodeRef {
    pub node: NodeId,
    pub operator: String,
    pub start_time: Option<f64>,
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.start_time {
            Some(t) => write!(f, "node {} ({}) @ t={}", self.node.0, self.operator, t),
            None => write!(f, "node {} ({})", self.node.0, self.operator),
        }
    }
}

// ── Diagnostic ───────────────────────────────────────────────────────────

/// A compiler diagnostic emitted by any phase.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: Option<DiagCode>,
    pub level: DiagLevel,
    pub message: String,
    pub node: Option<NodeRef>,
    pub hint: Option<String>,
    pub related: Vec<(NodeRef, String)>,
}

impl Diagnostic {
    /// Create a new diagnostic with no code, node context, hint, or
    /// related nodes.
    pub fn new(level: DiagLevel, message: impl Into<String>) -> Self {
        Self {
            code: None,
            level,
            message: message.into(),
            node: None,
            hint: None,
            related: Vec::new(),
        }
    }

    /// Shorthand for an error-level diagnostic with a code.
    pub fn error(code: DiagCode, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Error, message).with_code(code)
    }

    /// Attach a stable diagnostic code.
    pub fn with_code(mut self, code: DiagCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Attach the primary node context.
    pub fn with_node(mut self, node: NodeRef) -> Self {
        self.node = Some(node);
        self
    }

    /// Attach a remediation hint.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Attach a related node with a label.
    pub fn with_related(mut self, node: NodeRef, label: impl Into<String>) -> Self {
        self.related.push((node, label.into()));
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            DiagLevel::Error => "error",
            DiagLevel::Warning => "warning",
        };
        if let Some(code) = &self.code {
            write!(f, "{}[{}]: {}", level, code, self.message)?;
        } else {
            write!(f, "{}: {}", level, self.message)?;
        }
        if let Some(node) = &self.node {
            write!(f, "\n  at: {}", node)?;
        }
        for (node, label) in &self.related {
            write!(f, "\n  {}: {}", label, node)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\n  hint: {}", hint)?;
        }
        Ok(())
    }
}

/// True when any diagnostic in the slice is error-level.
pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(|d| d.level == DiagLevel::Error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_without_code() {
        let d = Diagnostic::new(DiagLevel::Error, "something failed");
        assert_eq!(format!("{d}"), "error: something failed");
    }

    #[test]
    fn display_with_code_and_node() {
        let d = Diagnostic::error(codes::E0100, "latency exceeds clock period").with_node(NodeRef {
            node: NodeId(7),
            operator: "mul".into(),
            start_time: Some(2.5),
        });
        let text = format!("{d}");
        assert!(text.starts_with("error[E0100]: latency exceeds clock period"));
        assert!(text.contains("node 7 (mul) @ t=2.5"));
    }

    #[test]
    fn builder_chain() {
        let d = Diagnostic::error(codes::E0203, "synonym mismatch")
            .with_hint("check cross-element wiring order")
            .with_related(
                NodeRef {
                    node: NodeId(1),
                    operator: "add".into(),
                    start_time: None,
                },
                "first declared here",
            );
        assert_eq!(d.code, Some(codes::E0203));
        assert_eq!(d.related.len(), 1);
        assert!(d.hint.is_some());
    }

    #[test]
    fn has_errors_detects_level() {
        let warn = Diagnostic::new(DiagLevel::Warning, "w");
        let err = Diagnostic::new(DiagLevel::Error, "e");
        assert!(!has_errors(&[warn.clone()]));
        assert!(has_errors(&[warn, err]));
    }
}
