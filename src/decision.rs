//! Per-cycle phase selection.
//!
//! Before each cycle the working directory is inspected (bounded walk) and
//! combined with the previous reply to pick the next phase. The phase's
//! instruction text feeds the prompt builder.

use std::path::Path;
use walkdir::WalkDir;

use crate::session::Methodology;

/// Files whose presence marks a scaffolded project.
const MANIFEST_NAMES: &[&str] = &[
    "Cargo.toml",
    "package.json",
    "pyproject.toml",
    "setup.py",
    "go.mod",
    "pom.xml",
    "build.gradle",
    "Makefile",
];

/// Markers of an installed test framework.
const TEST_FRAMEWORK_MARKERS: &[&str] = &[
    "jest.config.js",
    "jest.config.ts",
    "vitest.config.ts",
    "pytest.ini",
    "conftest.py",
    "phpunit.xml",
    "karma.conf.js",
];

/// Reply phrases indicating failing tests.
const FAILING_TEST_PATTERNS: &[&str] = &[
    "test failed",
    "tests failed",
    "failing test",
    "failures:",
    "assertion failed",
    "red phase",
];

/// Reply phrases indicating a broken build.
const BUILD_ERROR_PATTERNS: &[&str] = &[
    "compilation error",
    "build failed",
    "cannot compile",
    "syntax error",
    "compile error",
];

/// Reply phrases indicating a green test run.
const PASSING_TEST_PATTERNS: &[&str] = &[
    "all tests pass",
    "tests passed",
    "tests are passing",
    "test suite passed",
    "green phase",
];

/// Directory walk depth bound; deep trees say nothing new about phase.
const INSPECTION_DEPTH: usize = 3;

/// Maximum entries examined per inspection.
const INSPECTION_BUDGET: usize = 500;

// =============================================================================
// Inspection
// =============================================================================

/// What the working directory currently looks like.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProjectInspection {
    /// No files at all.
    pub is_empty: bool,
    /// A recognized build manifest exists.
    pub has_manifest: bool,
    /// A test framework appears to be installed.
    pub has_test_framework: bool,
    /// Test files exist.
    pub has_tests: bool,
}

/// Inspect a working directory, bounded in depth and entry count.
#[must_use]
pub fn inspect_project(dir: &Path) -> ProjectInspection {
    let mut inspection = ProjectInspection {
        is_empty: true,
        ..Default::default()
    };

    let entries = WalkDir::new(dir)
        .max_depth(INSPECTION_DEPTH)
        .into_iter()
        .filter_map(|e| e.ok())
        .take(INSPECTION_BUDGET);

    for entry in entries {
        if !entry.file_type().is_file() {
            continue;
        }
        inspection.is_empty = false;

        let name = entry.file_name().to_string_lossy();
        if MANIFEST_NAMES.iter().any(|m| name == *m) {
            inspection.has_manifest = true;
        }
        if TEST_FRAMEWORK_MARKERS.iter().any(|m| name == *m) {
            inspection.has_test_framework = true;
        }
        if is_test_file(&name, entry.path()) {
            inspection.has_tests = true;
        }
    }

    // A Rust or Go toolchain carries its test runner with the manifest
    if has_builtin_test_runner(dir) {
        inspection.has_test_framework = true;
    }

    inspection
}

fn is_test_file(name: &str, path: &Path) -> bool {
    let in_test_dir = path
        .components()
        .any(|c| matches!(c.as_os_str().to_str(), Some("tests" | "test" | "__tests__")));
    in_test_dir
        || name.contains(".test.")
        || name.contains(".spec.")
        || name.starts_with("test_")
        || name.ends_with("_test.go")
        || name.ends_with("_test.py")
}

fn has_builtin_test_runner(dir: &Path) -> bool {
    dir.join("Cargo.toml").exists() || dir.join("go.mod").exists()
}

// =============================================================================
// Outcome of the previous cycle
// =============================================================================

/// What the previous reply said about the project's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LastOutcome {
    /// No previous cycle.
    #[default]
    FirstCycle,
    /// The reply reported failing tests.
    TestsFailing,
    /// The reply reported a green run.
    TestsPassing,
    /// The reply reported build/compile errors.
    BuildErrors,
    /// Nothing recognizable.
    Inconclusive,
}

/// Classify the previous reply.
#[must_use]
pub fn classify_last_reply(reply: Option<&str>) -> LastOutcome {
    let Some(reply) = reply else {
        return LastOutcome::FirstCycle;
    };
    let lower = reply.to_lowercase();

    // Build breakage outranks test results: nothing runs until it compiles
    if BUILD_ERROR_PATTERNS.iter().any(|p| lower.contains(p)) {
        return LastOutcome::BuildErrors;
    }
    if FAILING_TEST_PATTERNS.iter().any(|p| lower.contains(p)) {
        return LastOutcome::TestsFailing;
    }
    if PASSING_TEST_PATTERNS.iter().any(|p| lower.contains(p)) {
        return LastOutcome::TestsPassing;
    }
    LastOutcome::Inconclusive
}

// =============================================================================
// Phases
// =============================================================================

/// The phase the next cycle should work on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    // TDD branches
    /// Empty directory: create the project skeleton.
    Scaffold,
    /// Files exist but no manifest: analyze what is there first.
    CompatibilityAnalysis,
    /// Scaffolded but no test framework yet.
    InstallTestFramework,
    /// Framework present, no tests: write failing tests first.
    AuthorFailingTests,
    /// Failing tests on record: make them pass.
    Implement,
    /// Green: refactor and move to the next feature.
    Refactor,
    /// The build is broken: fix it before anything else.
    FixFirst,
    // Classic branches
    /// Understand the current state before touching anything.
    Analyze,
    /// Verify the last change actually works.
    Verify,
    /// Continue with the next piece of the plan.
    Iterate,
}

impl Phase {
    /// Short phase name for logs and events.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Scaffold => "scaffold",
            Self::CompatibilityAnalysis => "compatibility-analysis",
            Self::InstallTestFramework => "install-test-framework",
            Self::AuthorFailingTests => "author-failing-tests",
            Self::Implement => "implement",
            Self::Refactor => "refactor",
            Self::FixFirst => "fix-first",
            Self::Analyze => "analyze",
            Self::Verify => "verify",
            Self::Iterate => "iterate",
        }
    }

    /// The instruction text this phase contributes to the prompt.
    #[must_use]
    pub fn instruction(&self) -> &'static str {
        match self {
            Self::Scaffold => {
                "The project directory is empty. Scaffold the project: create \
                 the directory layout, the build manifest, and a minimal entry \
                 point that builds."
            }
            Self::CompatibilityAnalysis => {
                "The directory contains files but no recognizable build \
                 manifest. Analyze the existing content, decide how the plan \
                 fits it, and set up the build around it without destroying \
                 existing work."
            }
            Self::InstallTestFramework => {
                "The project is scaffolded but has no test framework. Install \
                 and configure one appropriate for the stack, with a trivial \
                 passing test proving the runner works."
            }
            Self::AuthorFailingTests => {
                "Write failing tests for the next unimplemented feature of the \
                 plan. Do not implement the feature yet; the tests must fail \
                 for the right reason."
            }
            Self::Implement => {
                "Tests are failing. Implement the minimum code needed to make \
                 them pass, then run the suite and report the result."
            }
            Self::Refactor => {
                "The test suite is green. Refactor what was just written if it \
                 needs it, then pick the next feature from the plan and start \
                 its red phase."
            }
            Self::FixFirst => {
                "The build is broken. Fix the compilation errors before doing \
                 anything else, then run the tests and report."
            }
            Self::Analyze => {
                "Review the project directory and the plan. Identify the next \
                 concrete piece of work and describe how you will do it, then \
                 start on it."
            }
            Self::Verify => {
                "Verify the changes from the previous iteration: build the \
                 project, exercise what was added, and report any problems \
                 found."
            }
            Self::Iterate => {
                "Continue with the next unfinished item of the plan. Implement \
                 it end to end and report what changed."
            }
        }
    }
}

/// Pick the next phase from methodology, directory state, and the
/// previous reply.
#[must_use]
pub fn next_phase(
    methodology: Methodology,
    inspection: ProjectInspection,
    last: LastOutcome,
) -> Phase {
    match methodology {
        Methodology::Tdd => next_tdd_phase(inspection, last),
        Methodology::Classic => next_classic_phase(inspection, last),
    }
}

fn next_tdd_phase(inspection: ProjectInspection, last: LastOutcome) -> Phase {
    // Broken builds preempt everything
    if last == LastOutcome::BuildErrors {
        return Phase::FixFirst;
    }
    if inspection.is_empty {
        return Phase::Scaffold;
    }
    if !inspection.has_manifest {
        return Phase::CompatibilityAnalysis;
    }
    if !inspection.has_test_framework {
        return Phase::InstallTestFramework;
    }
    if !inspection.has_tests {
        return Phase::AuthorFailingTests;
    }
    match last {
        LastOutcome::TestsFailing => Phase::Implement,
        LastOutcome::TestsPassing => Phase::Refactor,
        // No signal: drive the red phase forward
        _ => Phase::AuthorFailingTests,
    }
}

fn next_classic_phase(inspection: ProjectInspection, last: LastOutcome) -> Phase {
    if last == LastOutcome::BuildErrors {
        return Phase::FixFirst;
    }
    if inspection.is_empty {
        return Phase::Scaffold;
    }
    match last {
        LastOutcome::FirstCycle => Phase::Analyze,
        LastOutcome::Inconclusive => Phase::Verify,
        _ => Phase::Iterate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_empty_dir_scaffolds() {
        let dir = TempDir::new().unwrap();
        let inspection = inspect_project(dir.path());
        assert!(inspection.is_empty);
        assert_eq!(
            next_phase(Methodology::Tdd, inspection, LastOutcome::FirstCycle),
            Phase::Scaffold
        );
    }

    #[test]
    fn test_files_without_manifest_analyze_compat() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("notes.txt"), "stuff").unwrap();
        let inspection = inspect_project(dir.path());
        assert!(!inspection.is_empty);
        assert!(!inspection.has_manifest);
        assert_eq!(
            next_phase(Methodology::Tdd, inspection, LastOutcome::FirstCycle),
            Phase::CompatibilityAnalysis
        );
    }

    #[test]
    fn test_manifest_without_framework_installs_one() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("package.json"), "{}").unwrap();
        let inspection = inspect_project(dir.path());
        assert!(inspection.has_manifest);
        assert!(!inspection.has_test_framework);
        assert_eq!(
            next_phase(Methodology::Tdd, inspection, LastOutcome::FirstCycle),
            Phase::InstallTestFramework
        );
    }

    #[test]
    fn test_framework_without_tests_goes_red() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("package.json"), "{}").unwrap();
        fs::write(dir.path().join("jest.config.js"), "module.exports = {}").unwrap();
        let inspection = inspect_project(dir.path());
        assert!(inspection.has_test_framework);
        assert!(!inspection.has_tests);
        assert_eq!(
            next_phase(Methodology::Tdd, inspection, LastOutcome::FirstCycle),
            Phase::AuthorFailingTests
        );
    }

    #[test]
    fn test_cargo_project_counts_as_framework() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Cargo.toml"), "[package]").unwrap();
        fs::create_dir(dir.path().join("tests")).unwrap();
        fs::write(dir.path().join("tests").join("it.rs"), "").unwrap();
        let inspection = inspect_project(dir.path());
        assert!(inspection.has_test_framework);
        assert!(inspection.has_tests);
    }

    #[test]
    fn test_failing_tests_drive_implement() {
        let inspection = ProjectInspection {
            is_empty: false,
            has_manifest: true,
            has_test_framework: true,
            has_tests: true,
        };
        assert_eq!(
            next_phase(Methodology::Tdd, inspection, LastOutcome::TestsFailing),
            Phase::Implement
        );
    }

    #[test]
    fn test_passing_tests_drive_refactor() {
        let inspection = ProjectInspection {
            is_empty: false,
            has_manifest: true,
            has_test_framework: true,
            has_tests: true,
        };
        assert_eq!(
            next_phase(Methodology::Tdd, inspection, LastOutcome::TestsPassing),
            Phase::Refactor
        );
    }

    #[test]
    fn test_build_errors_preempt_everything() {
        let inspection = ProjectInspection {
            is_empty: false,
            has_manifest: true,
            has_test_framework: true,
            has_tests: true,
        };
        for methodology in [Methodology::Tdd, Methodology::Classic] {
            assert_eq!(
                next_phase(methodology, inspection, LastOutcome::BuildErrors),
                Phase::FixFirst
            );
        }
    }

    #[test]
    fn test_classify_last_reply_patterns() {
        assert_eq!(classify_last_reply(None), LastOutcome::FirstCycle);
        assert_eq!(
            classify_last_reply(Some("2 tests failed in auth module")),
            LastOutcome::TestsFailing
        );
        assert_eq!(
            classify_last_reply(Some("All tests pass now.")),
            LastOutcome::TestsPassing
        );
        assert_eq!(
            classify_last_reply(Some("the build failed with 3 errors")),
            LastOutcome::BuildErrors
        );
        assert_eq!(
            classify_last_reply(Some("wrote some documentation")),
            LastOutcome::Inconclusive
        );
    }

    #[test]
    fn test_build_errors_outrank_test_failures() {
        // A reply mentioning both: compilation wins
        assert_eq!(
            classify_last_reply(Some("build failed, and 3 tests failed too")),
            LastOutcome::BuildErrors
        );
    }

    #[test]
    fn test_classic_sequence() {
        let inspection = ProjectInspection {
            is_empty: false,
            has_manifest: true,
            ..Default::default()
        };
        assert_eq!(
            next_phase(Methodology::Classic, inspection, LastOutcome::FirstCycle),
            Phase::Analyze
        );
        assert_eq!(
            next_phase(Methodology::Classic, inspection, LastOutcome::Inconclusive),
            Phase::Verify
        );
        assert_eq!(
            next_phase(Methodology::Classic, inspection, LastOutcome::TestsPassing),
            Phase::Iterate
        );
    }

    #[test]
    fn test_every_phase_has_instruction() {
        for phase in [
            Phase::Scaffold,
            Phase::CompatibilityAnalysis,
            Phase::InstallTestFramework,
            Phase::AuthorFailingTests,
            Phase::Implement,
            Phase::Refactor,
            Phase::FixFirst,
            Phase::Analyze,
            Phase::Verify,
            Phase::Iterate,
        ] {
            assert!(!phase.instruction().is_empty());
        }
    }
}
