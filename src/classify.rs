use regex::Regex;
use serde::Deserialize;

/// Outcome assigned to a single line of test output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// Progress or success indicator (rendered green).
    Pass,
    /// Anything else, including blank lines (rendered red).
    Fail,
}

/// Patterns that mark a line of `lein test` output as good news.
const PASS_PATTERNS: &[&str] = &[
    r"Testing.*",
    r"0 failures.*",
    r"Ran \d+ tests containing \d+ assertions.*",
];

/// Ordered line classifier: the first rule whose regex finds a match decides
/// the verdict, otherwise the fallback applies.
#[derive(Debug, Clone)]
pub struct Classifier {
    rules: Vec<(Regex, Verdict)>,
    fallback: Verdict,
}

impl Classifier {
    /// The built-in `lein test` rules with a `Fail` fallback.
    #[cfg(test)]
    pub fn new() -> Result<Self, regex::Error> {
        Self::with_rules(std::iter::empty())
    }

    /// Build a classifier with `extra` rules evaluated ahead of the built-in ones.
    ///
    /// Returns the first pattern that fails to compile.
    pub fn with_rules<'a, I>(extra: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = (&'a str, Verdict)>,
    {
        let builtin = PASS_PATTERNS.iter().map(|p| (*p, Verdict::Pass));
        let rules = extra
            .into_iter()
            .chain(builtin)
            .map(|(pattern, verdict)| Ok((Regex::new(pattern)?, verdict)))
            .collect::<Result<Vec<_>, regex::Error>>()?;
        Ok(Self {
            rules,
            fallback: Verdict::Fail,
        })
    }

    pub fn classify(&self, line: &str) -> Verdict {
        self.rules
            .iter()
            .find(|(re, _)| re.is_match(line))
            .map(|(_, verdict)| *verdict)
            .unwrap_or(self.fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_testing_namespace_line_passes() {
        let c = Classifier::new().unwrap();
        assert_eq!(c.classify("Testing myproject.core-test"), Verdict::Pass);
    }

    #[test]
    fn test_zero_failures_summary_passes() {
        let c = Classifier::new().unwrap();
        assert_eq!(c.classify("0 failures, 0 errors."), Verdict::Pass);
    }

    #[test]
    fn test_ran_summary_with_multi_digit_counts_passes() {
        let c = Classifier::new().unwrap();
        assert_eq!(
            c.classify("Ran 12 tests containing 34 assertions."),
            Verdict::Pass
        );
        assert_eq!(
            c.classify("Ran 3 tests containing 5 assertions."),
            Verdict::Pass
        );
    }

    #[test]
    fn test_failure_line_fails() {
        let c = Classifier::new().unwrap();
        assert_eq!(c.classify("FAIL in (test-foo)"), Verdict::Fail);
        assert_eq!(c.classify("2 failures, 0 errors."), Verdict::Fail);
        assert_eq!(
            c.classify("Ran tests containing assertions."),
            Verdict::Fail,
            "counts are required"
        );
    }

    #[test]
    fn test_blank_line_falls_back_to_fail() {
        let c = Classifier::new().unwrap();
        assert_eq!(c.classify(""), Verdict::Fail);
        assert_eq!(c.classify("   "), Verdict::Fail);
    }

    #[test]
    fn test_patterns_match_anywhere_in_line() {
        let c = Classifier::new().unwrap();
        assert_eq!(c.classify("lein: Testing foo"), Verdict::Pass);
        // Unanchored search: "10 failures" contains "0 failures".
        assert_eq!(c.classify("10 failures"), Verdict::Pass);
    }

    #[test]
    fn test_extra_rules_take_precedence() {
        let c = Classifier::with_rules([("^Testing slow", Verdict::Fail), ("OK$", Verdict::Pass)])
            .unwrap();
        assert_eq!(c.classify("Testing slow.integration-test"), Verdict::Fail);
        assert_eq!(c.classify("Testing fast.unit-test"), Verdict::Pass);
        assert_eq!(c.classify("all OK"), Verdict::Pass);
        assert_eq!(c.classify("FAIL in (x)"), Verdict::Fail);
    }

    #[test]
    fn test_builtin_rules_compile() {
        let c = Classifier::new().unwrap();
        assert_eq!(c.rules.len(), PASS_PATTERNS.len());
        assert_eq!(c.fallback, Verdict::Fail);
    }

    #[test]
    fn test_invalid_extra_rule_is_rejected() {
        assert!(Classifier::with_rules([("(unclosed", Verdict::Pass)]).is_err());
    }

    #[test]
    fn test_classification_is_deterministic() {
        let c = Classifier::new().unwrap();
        let lines = ["Testing a", "FAIL in (b)", "", "0 failures, 1 error."];
        let first: Vec<Verdict> = lines.iter().map(|l| c.classify(l)).collect();
        let second: Vec<Verdict> = lines.iter().map(|l| c.classify(l)).collect();
        assert_eq!(first, second);
    }
}
