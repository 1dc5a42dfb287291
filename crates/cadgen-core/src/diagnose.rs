//! Failure diagnosis: map an execution failure to one repair directive.
//!
//! The rules are an ordered table of (predicate, directive template) pairs
//! evaluated first-match-wins. The final rule always matches, so exactly one
//! directive is produced for any input. Pure: no I/O, no state.

use serde::{Deserialize, Serialize};

use crate::domain::{Measurements, DEFAULT_EXPECTED_SOLIDS};

/// Minimum overlap, in mm, an additive feature must have with its parent.
pub const OVERLAP_EPSILON_MM: f64 = 0.1;

/// Kernel signatures of a failed geometric operation (typically a fillet).
const KERNEL_FAILURE_SIGNATURES: &[&str] = &["StdFail_NotDone", "BRep_API: command not done"];

const SYNTAX_SIGNATURES: &[&str] = &["SyntaxError", "IndentationError"];

/// A repair instruction for the generator, valid for one retry cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixDirective {
    /// Name of the rule that produced the directive.
    pub rule: String,
    pub text: String,
}

/// Everything a rule may look at.
#[derive(Debug, Clone, Copy)]
pub struct DiagnosisInput<'a> {
    pub diagnostic: &'a str,
    pub measurements: Option<&'a Measurements>,
    pub expected_solids: u32,
}

impl DiagnosisInput<'_> {
    fn solid_mismatch(&self) -> Option<u32> {
        self.measurements
            .and_then(|m| m.solid_count)
            .filter(|n| *n != self.expected_solids)
    }
}

/// One row of the decision table.
#[derive(Clone, Copy)]
pub struct DiagnosisRule {
    pub name: &'static str,
    matches: fn(&DiagnosisInput<'_>) -> bool,
    directive: fn(&DiagnosisInput<'_>) -> String,
}

impl DiagnosisRule {
    pub const fn new(
        name: &'static str,
        matches: fn(&DiagnosisInput<'_>) -> bool,
        directive: fn(&DiagnosisInput<'_>) -> String,
    ) -> Self {
        Self {
            name,
            matches,
            directive,
        }
    }

    pub fn matches(&self, input: &DiagnosisInput<'_>) -> bool {
        (self.matches)(input)
    }

    pub fn directive(&self, input: &DiagnosisInput<'_>) -> FixDirective {
        FixDirective {
            rule: self.name.to_string(),
            text: (self.directive)(input),
        }
    }
}

impl std::fmt::Debug for DiagnosisRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiagnosisRule")
            .field("name", &self.name)
            .finish()
    }
}

fn kernel_failure(input: &DiagnosisInput<'_>) -> bool {
    KERNEL_FAILURE_SIGNATURES
        .iter()
        .any(|sig| input.diagnostic.contains(sig))
}

fn kernel_failure_directive(_: &DiagnosisInput<'_>) -> String {
    "The .fillet() call crashed the OCC kernel (StdFail_NotDone). \
     Move ALL .fillet() and .chamfer() calls BEFORE any union()/cut()/shell() operations. \
     If a post-boolean fillet is essential, use NearestToPointSelector targeting ONE specific edge. \
     Never use broad selectors like .edges(\"|Z\").fillet(r) after boolean ops."
        .to_string()
}

fn solid_count(input: &DiagnosisInput<'_>) -> bool {
    input.solid_mismatch().is_some()
}

fn solid_count_directive(input: &DiagnosisInput<'_>) -> String {
    let n = input.solid_mismatch().unwrap_or_default();
    format!(
        "Got {n} disconnected solids instead of {expected}. \
         Ensure all union() features overlap the parent body by at least {OVERLAP_EPSILON_MM}mm. \
         Remember: Workplane('XZ').extrude(d) goes in the -Y direction. \
         Check that features are positioned within the body's coordinate span.",
        expected = input.expected_solids,
    )
}

fn syntax_error(input: &DiagnosisInput<'_>) -> bool {
    SYNTAX_SIGNATURES
        .iter()
        .any(|sig| input.diagnostic.contains(sig))
}

fn syntax_error_directive(input: &DiagnosisInput<'_>) -> String {
    format!("Fix this Python syntax error:\n{}", input.diagnostic)
}

fn open_wire(input: &DiagnosisInput<'_>) -> bool {
    input.diagnostic.to_lowercase().contains("wire not closed")
}

fn open_wire_directive(_: &DiagnosisInput<'_>) -> String {
    "Wire not closed error. Check that polyline points form a closed loop \
     with no coincident consecutive points and no self-intersections."
        .to_string()
}

fn no_geometry(input: &DiagnosisInput<'_>) -> bool {
    input.diagnostic.to_lowercase().contains("no output")
        || input.diagnostic.contains("STEP file not produced")
}

fn no_geometry_directive(_: &DiagnosisInput<'_>) -> String {
    "Code ran but produced no geometry. Ensure the `result` variable \
     holds a valid CadQuery Workplane object with solid geometry."
        .to_string()
}

fn fallback(_: &DiagnosisInput<'_>) -> bool {
    true
}

fn fallback_directive(input: &DiagnosisInput<'_>) -> String {
    if input.diagnostic.trim().is_empty() {
        "Fix the error in this code.".to_string()
    } else {
        format!("Fix this runtime error:\n{}", input.diagnostic)
    }
}

/// The standard decision table, highest priority first.
pub const STANDARD_RULES: &[DiagnosisRule] = &[
    DiagnosisRule::new("kernel_failure", kernel_failure, kernel_failure_directive),
    DiagnosisRule::new("solid_count", solid_count, solid_count_directive),
    DiagnosisRule::new("syntax_error", syntax_error, syntax_error_directive),
    DiagnosisRule::new("open_wire", open_wire, open_wire_directive),
    DiagnosisRule::new("no_geometry", no_geometry, no_geometry_directive),
    DiagnosisRule::new("runtime_error", fallback, fallback_directive),
];

/// Ordered rule table plus the expected solid count it checks against.
#[derive(Debug, Clone)]
pub struct Diagnoser {
    rules: Vec<DiagnosisRule>,
    expected_solids: u32,
}

impl Default for Diagnoser {
    fn default() -> Self {
        Self::standard(DEFAULT_EXPECTED_SOLIDS)
    }
}

impl Diagnoser {
    pub fn standard(expected_solids: u32) -> Self {
        Self {
            rules: STANDARD_RULES.to_vec(),
            expected_solids,
        }
    }

    pub fn expected_solids(&self) -> u32 {
        self.expected_solids
    }

    /// First matching rule for the given failure.
    pub fn classify(&self, diagnostic: &str, measurements: Option<&Measurements>) -> &DiagnosisRule {
        let input = self.input(diagnostic, measurements);
        self.rules
            .iter()
            .find(|rule| rule.matches(&input))
            .unwrap_or(&STANDARD_RULES[STANDARD_RULES.len() - 1])
    }

    /// Produce the directive for the given failure.
    pub fn diagnose(&self, diagnostic: &str, measurements: Option<&Measurements>) -> FixDirective {
        let input = self.input(diagnostic, measurements);
        self.classify(diagnostic, measurements).directive(&input)
    }

    fn input<'a>(
        &self,
        diagnostic: &'a str,
        measurements: Option<&'a Measurements>,
    ) -> DiagnosisInput<'a> {
        DiagnosisInput {
            diagnostic,
            measurements,
            expected_solids: self.expected_solids,
        }
    }
}

/// Diagnose against the standard table and a single expected solid.
pub fn diagnose(diagnostic: &str, measurements: Option<&Measurements>) -> FixDirective {
    Diagnoser::default().diagnose(diagnostic, measurements)
}
