//! `TokenBudget` (§4.G): optional, cumulative prompt/completion token
//! tracking against a configured ceiling.

use crate::message::Usage;

#[derive(Debug, Clone, Copy)]
pub struct TokenBudgetConfig {
    pub max_tokens: u64,
    /// Fraction (0.0-1.0) of `max_tokens` that, once crossed, emits a
    /// warning without blocking.
    pub warning_threshold: f64,
    /// Tokens held back from `max_tokens` as headroom for the request that
    /// would push the budget over the edge.
    pub reserve_tokens: u64,
}

impl TokenBudgetConfig {
    pub fn delegate_default() -> Self {
        Self {
            max_tokens: 50_000,
            warning_threshold: 0.7,
            reserve_tokens: 1_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetCheck {
    Ok,
    Warning,
    Exceeded,
}

/// Owned by a single `Agent` (§5: "no cross-agent sharing").
pub struct TokenBudget {
    config: TokenBudgetConfig,
    used: u64,
    warning_emitted: bool,
}

impl TokenBudget {
    pub fn new(config: TokenBudgetConfig) -> Self {
        Self {
            config,
            used: 0,
            warning_emitted: false,
        }
    }

    pub fn used(&self) -> u64 {
        self.used
    }

    pub fn limit(&self) -> u64 {
        self.config.max_tokens.saturating_sub(self.config.reserve_tokens)
    }

    /// Checks whether a request estimated to cost `estimated_tokens` can be
    /// accepted without exceeding `max_tokens - reserve_tokens`. Does not
    /// mutate state; callers must still call `record` after a request
    /// actually completes.
    pub fn check(&mut self, estimated_tokens: u64) -> BudgetCheck {
        if self.used.saturating_add(estimated_tokens) > self.limit() {
            return BudgetCheck::Exceeded;
        }
        let threshold =
            (self.config.max_tokens as f64 * self.config.warning_threshold) as u64;
        if self.used.saturating_add(estimated_tokens) >= threshold {
            if !self.warning_emitted {
                self.warning_emitted = true;
                return BudgetCheck::Warning;
            }
        }
        BudgetCheck::Ok
    }

    pub fn record(&mut self, usage: Usage) {
        self.used = self.used.saturating_add(usage.total());
    }

    pub fn reset(&mut self) {
        self.used = 0;
        self.warning_emitted = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_requests_that_would_exceed_the_limit() {
        let mut budget = TokenBudget::new(TokenBudgetConfig {
            max_tokens: 1_000,
            warning_threshold: 0.9,
            reserve_tokens: 100,
        });
        assert_eq!(budget.check(850), BudgetCheck::Ok);
        budget.record(Usage {
            prompt_tokens: 850,
            completion_tokens: 0,
        });
        // limit is 900; already at 850, so another 100 tokens exceeds it.
        assert_eq!(budget.check(100), BudgetCheck::Exceeded);
    }

    #[test]
    fn warns_once_past_threshold_then_stays_ok() {
        let mut budget = TokenBudget::new(TokenBudgetConfig {
            max_tokens: 1_000,
            warning_threshold: 0.5,
            reserve_tokens: 0,
        });
        assert_eq!(budget.check(600), BudgetCheck::Warning);
        budget.record(Usage {
            prompt_tokens: 600,
            completion_tokens: 0,
        });
        assert_eq!(budget.check(10), BudgetCheck::Ok);
    }

    #[test]
    fn reset_zeroes_the_accumulator() {
        let mut budget = TokenBudget::new(TokenBudgetConfig::delegate_default());
        budget.record(Usage {
            prompt_tokens: 1_000,
            completion_tokens: 500,
        });
        assert_eq!(budget.used(), 1_500);
        budget.reset();
        assert_eq!(budget.used(), 0);
    }
}
