//! # Validator & Repairer
//!
//! Pass 3. Checks the candidate Kit's schema, timing, protocol coverage,
//! and groundedness against the Ground Truth, runs the hallucination
//! heuristic, optionally applies bounded rule-based repair, and stamps the
//! final quality scores and review flag onto the Kit.
//!
//! Checks run independently and aggregate; nothing short-circuits.
//! Validation findings are data, never exceptions.

use serde::{Deserialize, Serialize};

use crate::ground_truth::GroundTruth;
use crate::kit::{parse_time_minutes, Kit, KitContent};
use crate::protocols::ContentProtocol;

pub mod hallucination;
pub mod repair;
pub mod scoring;

pub use hallucination::HallucinationConfig;
pub use scoring::{coverage_score, grounding_score};

// ============================================================================
// Findings
// ============================================================================

/// Severity of a validation finding. Only errors are hard failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

/// Which check produced a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    Schema,
    Timing,
    Protocol,
    Grounding,
    Coverage,
    Hallucination,
}

/// A single validation finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    pub check: CheckKind,
    pub message: String,
}

impl Finding {
    pub fn error(check: CheckKind, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            check,
            message: message.into(),
        }
    }

    pub fn warning(check: CheckKind, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            check,
            message: message.into(),
        }
    }
}

/// Aggregated validation output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ValidationResult {
    pub errors: Vec<Finding>,
    pub warnings: Vec<Finding>,
    pub grounding_score: f64,
    pub coverage_score: f64,
    /// Candidate hallucinations from the jargon heuristic.
    pub hallucinations: Vec<String>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

// ============================================================================
// Options
// ============================================================================

/// Quality thresholds. Violations become warning findings, not failures.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Thresholds {
    pub min_grounding: f64,
    pub min_coverage: f64,
    pub max_hallucinations: usize,
    pub require_all_warnings_used: bool,
    pub validate_timing: bool,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            min_grounding: 0.8,
            min_coverage: 0.7,
            max_hallucinations: 0,
            require_all_warnings_used: true,
            validate_timing: true,
        }
    }
}

/// Options for [`validate_and_repair`].
#[derive(Debug, Clone, Default)]
pub struct ValidateOptions {
    pub thresholds: Thresholds,
    /// Attempt rule-based repair when hard errors exist. Repair never
    /// re-invokes generation.
    pub auto_repair: bool,
    pub hallucination: HallucinationConfig,
}

/// Result of Pass 3: the (possibly repaired) Kit plus its findings.
#[derive(Debug)]
pub struct ValidationOutcome {
    pub kit: Kit,
    pub result: ValidationResult,
    pub was_repaired: bool,
}

// ============================================================================
// Entry point
// ============================================================================

/// Validate a candidate Kit against its Ground Truth, optionally repair,
/// and stamp scores plus the review flag.
pub fn validate_and_repair(
    kit: Kit,
    gt: &GroundTruth,
    protocol: &dyn ContentProtocol,
    opts: &ValidateOptions,
) -> ValidationOutcome {
    let mut kit = kit;
    let mut result = run_checks(&kit.content, gt, protocol, opts);
    let mut was_repaired = false;

    if opts.auto_repair && !result.errors.is_empty() {
        let errors_before = result.errors.len();
        let (repaired, applied) = repair::repair(kit.content.clone(), gt);
        let rerun = run_checks(&repaired, gt, protocol, opts);

        // The attempt is always returned; whether it helped is re-inspected
        kit.content = repaired;
        was_repaired = true;
        result = rerun;
        for action in &applied {
            result
                .warnings
                .push(Finding::warning(CheckKind::Schema, format!("repaired: {}", action)));
        }
        if result.errors.len() >= errors_before {
            result.warnings.push(Finding::warning(
                CheckKind::Schema,
                "repair incomplete: error count did not decrease",
            ));
        }
    }

    kit.grounding_score = result.grounding_score;
    kit.coverage_score = result.coverage_score;

    if !result.errors.is_empty() {
        kit.needs_review = true;
        for finding in &result.errors {
            kit.review_reasons.push(finding.message.clone());
        }
    }
    if result.grounding_score < opts.thresholds.min_grounding {
        kit.needs_review = true;
        kit.review_reasons.push(format!(
            "grounding score {:.2} below threshold {:.2}",
            result.grounding_score, opts.thresholds.min_grounding
        ));
    }

    tracing::debug!(
        grounding = result.grounding_score,
        coverage = result.coverage_score,
        errors = result.errors.len(),
        warnings = result.warnings.len(),
        was_repaired,
        "validation finished"
    );

    ValidationOutcome {
        kit,
        result,
        was_repaired,
    }
}

/// Run every check and aggregate the findings.
fn run_checks(
    content: &KitContent,
    gt: &GroundTruth,
    protocol: &dyn ContentProtocol,
    opts: &ValidateOptions,
) -> ValidationResult {
    let mut findings = schema_check(content);
    if opts.thresholds.validate_timing {
        findings.extend(timing_check(content));
    }
    findings.extend(protocol.validate(content, gt));

    let hallucinations = hallucination::detect(content, gt, &opts.hallucination);
    let grounding = scoring::grounding_score(content, gt);
    let coverage = scoring::coverage_score(content, gt);

    // Threshold checks: warning severity by design
    if grounding < opts.thresholds.min_grounding {
        findings.push(Finding::warning(
            CheckKind::Grounding,
            format!(
                "grounding score {:.2} below threshold {:.2}",
                grounding, opts.thresholds.min_grounding
            ),
        ));
    }
    if coverage < opts.thresholds.min_coverage {
        findings.push(Finding::warning(
            CheckKind::Coverage,
            format!(
                "coverage score {:.2} below threshold {:.2}",
                coverage, opts.thresholds.min_coverage
            ),
        ));
    }
    if hallucinations.len() > opts.thresholds.max_hallucinations {
        findings.push(Finding::warning(
            CheckKind::Hallucination,
            format!("candidate hallucinations: {}", hallucinations.join(", ")),
        ));
    }
    if opts.thresholds.require_all_warnings_used && !gt.warnings.is_empty() {
        let used = crate::protocols::used_fraction(content, gt, crate::kit::Collection::Warnings);
        if used < 1.0 {
            findings.push(Finding::warning(
                CheckKind::Coverage,
                format!("only {:.0}% of source warnings are referenced", used * 100.0),
            ));
        }
    }
    let requirements = protocol.coverage_requirements();
    let primary_used = crate::protocols::used_fraction(content, gt, requirements.collection);
    if primary_used < requirements.min_fraction {
        findings.push(Finding::warning(
            CheckKind::Coverage,
            format!(
                "{} coverage {:.2} below the {} protocol minimum {:.2}",
                requirements.collection,
                primary_used,
                protocol.id(),
                requirements.min_fraction
            ),
        ));
    }

    let (errors, warnings): (Vec<Finding>, Vec<Finding>) = findings
        .into_iter()
        .partition(|f| f.severity == Severity::Error);

    ValidationResult {
        errors,
        warnings,
        grounding_score: grounding,
        coverage_score: coverage,
        hallucinations,
    }
}

// ============================================================================
// Schema check
// ============================================================================

/// Required sections and per-item required fields. Grounded items without a
/// source ref are a warning, not an error.
fn schema_check(content: &KitContent) -> Vec<Finding> {
    let mut findings = Vec::new();

    if content.quick_start.one_liner.trim().is_empty() {
        findings.push(Finding::error(CheckKind::Schema, "quick start is missing its one-liner"));
    }
    if content.teacher_script.is_empty() {
        findings.push(Finding::error(CheckKind::Schema, "teacher script is empty"));
    }
    for (i, item) in content.teacher_script.iter().enumerate() {
        if item.time.trim().is_empty() {
            findings.push(Finding::error(
                CheckKind::Schema,
                format!("script item {} has no time", i),
            ));
        }
        if item.content.trim().is_empty() {
            findings.push(Finding::error(
                CheckKind::Schema,
                format!("script item {} has no content", i),
            ));
        }
        if item.is_grounded && item.source_ref.is_none() {
            findings.push(Finding::warning(
                CheckKind::Schema,
                format!("script item {} is marked grounded but has no source ref", i),
            ));
        }
    }
    if content.discussion_questions.is_empty() {
        findings.push(Finding::warning(CheckKind::Schema, "no discussion questions"));
    }
    if content.student_handout.title.trim().is_empty()
        && content.student_handout.exercises.is_empty()
    {
        findings.push(Finding::warning(CheckKind::Schema, "student handout is empty"));
    }

    findings
}

// ============================================================================
// Timing check
// ============================================================================

/// Whole-minute offsets, within the declared lesson duration, phases in
/// order. All warning severity.
fn timing_check(content: &KitContent) -> Vec<Finding> {
    let mut findings = Vec::new();
    let total = content.quick_start.time_allocation.total();

    let mut core_max: Option<u32> = None;
    for (i, item) in content.teacher_script.iter().enumerate() {
        match parse_time_minutes(&item.time) {
            None => {
                if !item.time.trim().is_empty() {
                    findings.push(Finding::warning(
                        CheckKind::Timing,
                        format!("script item {} has unparseable time '{}'", i, item.time),
                    ));
                }
            }
            Some(minutes) => {
                if total > 0 && minutes > total {
                    findings.push(Finding::warning(
                        CheckKind::Timing,
                        format!(
                            "script item {} at {} minutes exceeds the {}-minute lesson",
                            i, minutes, total
                        ),
                    ));
                }
                if item.phase == crate::kit::Phase::Core {
                    core_max = Some(core_max.map_or(minutes, |m| m.max(minutes)));
                }
            }
        }
    }

    // Phase ordering: the core phase must not sit entirely before the start
    // phase's declared duration
    if let Some(core_max) = core_max {
        if core_max < content.quick_start.time_allocation.start {
            findings.push(Finding::warning(
                CheckKind::Timing,
                "core phase ends before the declared start phase duration",
            ));
        }
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kit::{ActionKind, Collection, Phase, ScriptItem, SourceRef, TimeAllocation};
    use crate::protocols::{ProtocolRegistry, THEORY_ID};

    fn theory_gt() -> GroundTruth {
        let registry = ProtocolRegistry::with_defaults();
        let text = "# Anatomie van de huid\n\n\
            De **opperhuid** beschermt. De **lederhuid** voedt. Het **onderhuids bindweefsel** isoleert.\n\
            Samen vormen zij de huid als orgaan en regelen zij temperatuur en vochtbalans voor het hele lichaam.\n";
        crate::ground_truth::extract("m", text, &registry.pooled_rules())
    }

    fn script_item(phase: Phase, action: ActionKind, content: &str) -> ScriptItem {
        ScriptItem {
            time: "0:00".into(),
            phase,
            action,
            content: content.into(),
            source_ref: None,
            is_grounded: false,
            expected_answers: None,
            if_no_answer: None,
            slide: None,
        }
    }

    fn minimal_content() -> KitContent {
        let mut content = KitContent::default();
        content.quick_start.one_liner = "Les over de huid".into();
        content.quick_start.time_allocation = TimeAllocation {
            start: 5,
            core: 15,
            closing: 5,
        };
        let mut intro = script_item(Phase::Start, ActionKind::Open, "Welkom");
        intro.time = "0:00".into();
        content.teacher_script.push(intro);
        for i in 0..3 {
            let mut item = script_item(Phase::Core, ActionKind::Introduce, "Bespreek de laag");
            item.time = crate::kit::format_minutes(5 + i);
            item.is_grounded = true;
            item.source_ref = Some(SourceRef::new(Collection::KeyConcepts, i as usize));
            content.teacher_script.push(item);
        }
        let mut close = script_item(Phase::Closing, ActionKind::Summary, "Samenvatting");
        close.time = "20:00".into();
        content.teacher_script.push(close);
        content
    }

    #[test]
    fn test_clean_kit_validates_without_errors() {
        let gt = theory_gt();
        assert!(gt.key_concepts.len() >= 3, "fixture should extract 3 concepts");
        let registry = ProtocolRegistry::with_defaults();
        let protocol = registry.get(THEORY_ID).unwrap();
        let kit = Kit::from_content(minimal_content(), THEORY_ID, &gt.source_hash);

        let outcome = validate_and_repair(kit, &gt, protocol.as_ref(), &ValidateOptions::default());
        assert!(outcome.result.is_valid(), "errors: {:?}", outcome.result.errors);
        assert!(!outcome.was_repaired);
        assert_eq!(outcome.kit.grounding_score, 1.0);
    }

    #[test]
    fn test_schema_errors_are_hard_and_grounded_without_ref_is_warning() {
        let mut content = minimal_content();
        content.quick_start.one_liner.clear();
        content.teacher_script[1].source_ref = None; // still marked grounded

        let findings = schema_check(&content);
        assert!(findings
            .iter()
            .any(|f| f.severity == Severity::Error && f.message.contains("one-liner")));
        assert!(findings
            .iter()
            .any(|f| f.severity == Severity::Warning && f.message.contains("grounded")));
    }

    #[test]
    fn test_timing_check_flags_out_of_range_and_unparseable() {
        let mut content = minimal_content();
        content.teacher_script[1].time = "straks".into();
        content.teacher_script[4].time = "45:00".into();

        let findings = timing_check(&content);
        assert!(findings.iter().any(|f| f.message.contains("unparseable")));
        assert!(findings.iter().any(|f| f.message.contains("exceeds")));
    }

    #[test]
    fn test_timing_check_flags_phase_ordering() {
        let mut content = minimal_content();
        // All core items squeezed before the declared 5-minute start phase
        for item in &mut content.teacher_script {
            if item.phase == Phase::Core {
                item.time = "2:00".into();
            }
        }
        let findings = timing_check(&content);
        assert!(findings
            .iter()
            .any(|f| f.message.contains("core phase ends before")));
    }

    #[test]
    fn test_repair_fills_quick_start_and_decreases_errors() {
        let gt = theory_gt();
        let registry = ProtocolRegistry::with_defaults();
        let protocol = registry.get(THEORY_ID).unwrap();

        let mut content = minimal_content();
        content.quick_start.one_liner.clear();
        let kit = Kit::from_content(content, THEORY_ID, &gt.source_hash);

        let opts = ValidateOptions {
            auto_repair: true,
            ..Default::default()
        };
        let outcome = validate_and_repair(kit, &gt, protocol.as_ref(), &opts);
        assert!(outcome.was_repaired);
        assert!(outcome.result.is_valid(), "errors: {:?}", outcome.result.errors);
        assert!(!outcome.kit.content.quick_start.one_liner.is_empty());
        assert!(outcome
            .result
            .warnings
            .iter()
            .any(|w| w.message.starts_with("repaired:")));
    }

    #[test]
    fn test_needs_review_set_on_low_grounding() {
        let gt = theory_gt();
        let registry = ProtocolRegistry::with_defaults();
        let protocol = registry.get(THEORY_ID).unwrap();

        let mut content = minimal_content();
        // Grounded claims pointing nowhere drag the score to zero
        for item in &mut content.teacher_script {
            if item.is_grounded {
                item.source_ref = Some(SourceRef::new(Collection::Procedures, 9));
            }
        }
        let kit = Kit::from_content(content, THEORY_ID, &gt.source_hash);
        let outcome =
            validate_and_repair(kit, &gt, protocol.as_ref(), &ValidateOptions::default());

        assert_eq!(outcome.kit.grounding_score, 0.0);
        assert!(outcome.kit.needs_review);
        assert!(outcome
            .kit
            .review_reasons
            .iter()
            .any(|r| r.contains("grounding score")));
    }
}
