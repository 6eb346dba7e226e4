//! Token usage counters.

use serde::{Deserialize, Serialize};
use std::ops::AddAssign;

/// Input/output token counts.
///
/// Serialized with a derived `total_tokens` field so that session and run
/// files carry the total without readers re-deriving it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "TokenUsageRepr", from = "TokenUsageRepr")]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }

    pub fn is_zero(&self) -> bool {
        self.input_tokens == 0 && self.output_tokens == 0
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.input_tokens = self.input_tokens.saturating_add(rhs.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(rhs.output_tokens);
    }
}

#[derive(Serialize, Deserialize)]
struct TokenUsageRepr {
    input_tokens: u64,
    output_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

impl From<TokenUsage> for TokenUsageRepr {
    fn from(usage: TokenUsage) -> Self {
        Self {
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            total_tokens: usage.total(),
        }
    }
}

impl From<TokenUsageRepr> for TokenUsage {
    fn from(repr: TokenUsageRepr) -> Self {
        Self::new(repr.input_tokens, repr.output_tokens)
    }
}

// ===== TokenAccountant =====

/// Running token counters for one scope (a session or a whole run).
///
/// # Invariants
///
/// - Counters never decrease
/// - All-zero reports are ignored and do not count as a report
///
/// Fed synchronously from the event path; there is never more than one writer.
#[derive(Debug, Clone, Default)]
pub struct TokenAccountant {
    usage: TokenUsage,
    reports: u64,
}

impl TokenAccountant {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one usage report. Returns `false` (no-op) for an all-zero report.
    pub fn record(&mut self, input_tokens: u64, output_tokens: u64) -> bool {
        let report = TokenUsage::new(input_tokens, output_tokens);
        if report.is_zero() {
            return false;
        }
        self.usage += report;
        self.reports += 1;
        true
    }

    /// Roll a finished scope's totals into this one.
    pub fn absorb(&mut self, totals: TokenUsage) {
        if !totals.is_zero() {
            self.usage += totals;
        }
    }

    pub fn totals(&self) -> TokenUsage {
        self.usage
    }

    /// Number of non-zero reports recorded.
    pub fn reports(&self) -> u64 {
        self.reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_usage_total() {
        let usage = TokenUsage::new(100, 50);
        assert_eq!(usage.total(), 150);
    }

    #[test]
    fn test_token_usage_default() {
        let usage = TokenUsage::default();
        assert_eq!(usage.input_tokens, 0);
        assert_eq!(usage.output_tokens, 0);
        assert!(usage.is_zero());
    }

    #[test]
    fn test_token_usage_serializes_total() {
        let json = serde_json::to_value(TokenUsage::new(150, 25)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"input_tokens": 150, "output_tokens": 25, "total_tokens": 175})
        );
    }

    #[test]
    fn test_token_usage_deserializes_without_total() {
        let usage: TokenUsage =
            serde_json::from_str(r#"{"input_tokens": 3, "output_tokens": 4}"#).unwrap();
        assert_eq!(usage, TokenUsage::new(3, 4));
    }

    #[test]
    fn test_token_usage_saturates() {
        let mut usage = TokenUsage::new(u64::MAX - 1, 5);
        assert_eq!(usage.total(), u64::MAX);
        usage += TokenUsage::new(10, u64::MAX);
        assert_eq!(usage, TokenUsage::new(u64::MAX, u64::MAX));
    }

    #[test]
    fn accountant_sums_reports() {
        let mut accountant = TokenAccountant::new();
        assert!(accountant.record(100, 20));
        assert!(accountant.record(50, 5));

        assert_eq!(accountant.totals(), TokenUsage::new(150, 25));
        assert_eq!(accountant.totals().total(), 175);
        assert_eq!(accountant.reports(), 2);
    }

    #[test]
    fn accountant_ignores_zero_reports() {
        let mut accountant = TokenAccountant::new();
        assert!(!accountant.record(0, 0));
        assert_eq!(accountant.reports(), 0);
        assert!(accountant.totals().is_zero());
    }

    #[test]
    fn accountant_accepts_output_only_report() {
        let mut accountant = TokenAccountant::new();
        assert!(accountant.record(0, 7));
        assert_eq!(accountant.totals(), TokenUsage::new(0, 7));
    }

    #[test]
    fn accountant_absorb_adds_session_totals() {
        let mut run = TokenAccountant::new();
        run.absorb(TokenUsage::new(10, 1));
        run.absorb(TokenUsage::new(5, 2));
        assert_eq!(run.totals(), TokenUsage::new(15, 3));
        assert_eq!(run.reports(), 0, "absorb is not a report");
    }
}
