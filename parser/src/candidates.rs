use crate::{
    api::{CandidateRule, CandidatesCollection, RuleList, TokenList},
    token::TokenType,
};

/// Elements shared by `a` and `b` at the start; empty when they differ at
/// the first position.
pub fn longest_common_prefix<T: PartialEq + Clone>(a: &[T], b: &[T]) -> Vec<T> {
    a.iter()
        .zip(b.iter())
        .take_while(|(x, y)| x == y)
        .map(|(x, _)| x.clone())
        .collect()
}

impl CandidatesCollection {
    pub fn clear(&mut self) {
        self.tokens.clear();
        self.rules.clear();
        self.cancelled = false;
    }

    /// Add a token candidate. A token seen before keeps only the part of
    /// its following list both occurrences agree on.
    pub fn add_token(&mut self, token: TokenType, following: &[TokenType]) {
        match self.tokens.get_mut(&token) {
            None => {
                self.tokens.insert(token, following.to_vec());
            }
            Some(prev) => {
                if prev.as_slice() != following {
                    *prev = longest_common_prefix(prev, following);
                }
            }
        }
    }

    /// Add a rule candidate, unless the same rule was already recorded with
    /// the same path. Returns true if the entry was stored.
    ///
    /// Entries are keyed by rule index only, so a different path replaces
    /// the previous entry.
    pub fn add_rule(&mut self, rule_index: usize, start_token_index: usize, path: RuleList) -> bool {
        if let Some(prev) = self.rules.get(&rule_index) {
            if prev.rule_list == path {
                return false;
            }
        }
        self.rules.insert(
            rule_index,
            CandidateRule {
                start_token_index,
                rule_list: path,
            },
        );
        true
    }

    pub fn token_list(&self) -> TokenList {
        self.tokens.keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty() && self.rules.is_empty()
    }
}
