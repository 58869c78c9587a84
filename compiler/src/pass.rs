// pass.rs — Pass identities and verification certificates
//
// Every backend stage produces, next to its artifact, a certificate of
// machine-checked obligations. Certificates make `--verify` output and
// test assertions uniform without threading stage-specific types through
// the driver.

use std::fmt;

/// Identity of a backend pass, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PassId {
    Validate,
    Schedule,
    Discover,
    Architect,
}

impl PassId {
    pub fn name(&self) -> &'static str {
        match self {
            PassId::Validate => "validate",
            PassId::Schedule => "schedule",
            PassId::Discover => "discover",
            PassId::Architect => "architect",
        }
    }

    /// Passes that must have run before this one.
    pub fn required_passes(&self) -> &'static [PassId] {
        match self {
            PassId::Validate => &[],
            PassId::Schedule => &[PassId::Validate],
            PassId::Discover => &[PassId::Validate, PassId::Schedule],
            PassId::Architect => &[PassId::Validate, PassId::Schedule, PassId::Discover],
        }
    }
}

impl fmt::Display for PassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A stage's verification certificate: named proof obligations with
/// their outcome.
pub trait StageCert {
    fn all_pass(&self) -> bool;
    fn obligations(&self) -> Vec<(&'static str, bool)>;

    /// One-line-per-obligation report.
    fn render(&self) -> String {
        let mut out = String::new();
        for (name, ok) in self.obligations() {
            out.push_str(if ok { "PASS " } else { "FAIL " });
            out.push_str(name);
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fake(bool);

    impl StageCert for Fake {
        fn all_pass(&self) -> bool {
            self.0
        }
        fn obligations(&self) -> Vec<(&'static str, bool)> {
            vec![("x", self.0)]
        }
    }

    #[test]
    fn pass_order_is_transitive() {
        assert!(PassId::Architect
            .required_passes()
            .contains(&PassId::Schedule));
        assert!(PassId::Validate.required_passes().is_empty());
    }

    #[test]
    fn render_marks_failures() {
        assert!(Fake(false).render().starts_with("FAIL"));
        assert!(Fake(true).render().starts_with("PASS"));
    }
}
