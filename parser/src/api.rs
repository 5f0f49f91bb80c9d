use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::token::TokenType;

macro_rules! id_type {
    ($name:ident) => {
        #[derive(Serialize, Deserialize, Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Debug)]
        #[serde(transparent)]
        pub struct $name(pub usize);
    };
}

// Identity of an automaton; the shared follow-set cache is keyed by it.
id_type!(GrammarId);

pub type TokenList = Vec<TokenType>;
pub type RuleList = Vec<usize>;

/// Options of a single completion engine.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct CompletionOptions {
    /// Tokens which are never reported as candidates. They are still
    /// matched when walking over the input.
    pub ignored_tokens: BTreeSet<TokenType>,

    /// Rules to report as a whole instead of enumerating the tokens they
    /// can start with.
    pub preferred_rules: BTreeSet<usize>,

    /// When several preferred rules are on the call stack, report the most
    /// deeply nested one. The default is to report the outermost one.
    pub translate_rules_top_down: bool,

    /// Stop the walk after this many milliseconds and report the
    /// result as cancelled.
    pub timeout_ms: Option<u64>,

    /// Remember rule exit positions within one query. Turning this off
    /// gives the same results, only slower.
    pub memoize_rule_ends: bool,

    /// Log the collected candidates after every query.
    pub show_result: bool,

    /// Log every ATN state processed during the walk.
    pub show_debug_output: bool,

    /// With `show_debug_output`, also log the outgoing transitions.
    pub debug_output_with_transitions: bool,

    /// With `show_debug_output`, also log the rule call stack.
    pub show_rule_stack: bool,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            ignored_tokens: BTreeSet::new(),
            preferred_rules: BTreeSet::new(),
            translate_rules_top_down: false,
            timeout_ms: None,
            memoize_rule_ends: true,
            show_result: false,
            show_debug_output: false,
            debug_output_with_transitions: false,
            show_rule_stack: false,
        }
    }
}

impl CompletionOptions {
    pub fn any_debug_output(&self) -> bool {
        self.show_result || self.show_debug_output
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CandidateRule {
    /// Stream index of the token where the rule starts.
    pub start_token_index: usize,
    /// Rules which lead to this one, outermost first.
    pub rule_list: RuleList,
}

/// The result of a completion query.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct CandidatesCollection {
    /// Candidate token and the tokens which always follow it.
    pub tokens: BTreeMap<TokenType, TokenList>,
    /// Candidate (preferred) rules, by rule index.
    pub rules: BTreeMap<usize, CandidateRule>,
    /// The walk was cancelled or timed out; the candidates are incomplete.
    #[serde(default)]
    pub cancelled: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct CompletionStats {
    pub states_processed: usize,
    pub rules_entered: usize,
    pub shortcut_hits: usize,
    pub pruned_rules: usize,
    pub compute_time_us: u64,
}
