mod builder;
mod interval;

pub use builder::{AtnBuilder, NodeRef};
pub use interval::{Interval, IntervalSet};

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

use crate::{
    api::GrammarId,
    token::{TokenType, EOF, MIN_USER_TOKEN_TYPE},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AtnStateKind {
    Basic,
    RuleStart,
    BlockStart,
    PlusBlockStart,
    StarBlockStart,
    TokenStart,
    RuleStop,
    BlockEnd,
    StarLoopBack,
    StarLoopEntry,
    PlusLoopBack,
    LoopEnd,
}

impl AtnStateKind {
    pub fn name(&self) -> &'static str {
        match self {
            AtnStateKind::Basic => "basic",
            AtnStateKind::RuleStart => "rule start",
            AtnStateKind::BlockStart => "block start",
            AtnStateKind::PlusBlockStart => "plus block start",
            AtnStateKind::StarBlockStart => "star block start",
            AtnStateKind::TokenStart => "token start",
            AtnStateKind::RuleStop => "rule stop",
            AtnStateKind::BlockEnd => "block end",
            AtnStateKind::StarLoopBack => "star loop back",
            AtnStateKind::StarLoopEntry => "star loop entry",
            AtnStateKind::PlusLoopBack => "plus loop back",
            AtnStateKind::LoopEnd => "loop end",
        }
    }
}

/// An outgoing edge of an ATN state. Targets are state numbers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transition {
    Epsilon {
        target: usize,
    },
    Atom {
        target: usize,
        label: TokenType,
    },
    Range {
        target: usize,
        from: TokenType,
        to: TokenType,
    },
    Set {
        target: usize,
        set: IntervalSet,
    },
    NotSet {
        target: usize,
        set: IntervalSet,
    },
    Wildcard {
        target: usize,
    },
    /// Call of another rule; `target` is the callee's rule start state and
    /// `follow_state` the return point in the caller.
    Rule {
        target: usize,
        rule_index: usize,
        follow_state: usize,
        #[serde(default)]
        precedence: i32,
    },
    Predicate {
        target: usize,
        rule_index: usize,
        pred_index: usize,
        #[serde(default)]
        ctx_dependent: bool,
    },
    /// Gate of a left-recursive rule alternative; passes when `precedence`
    /// is at least the precedence the rule was entered with.
    Precedence {
        target: usize,
        precedence: i32,
    },
    Action {
        target: usize,
        rule_index: usize,
        action_index: usize,
    },
}

impl Transition {
    pub fn target(&self) -> usize {
        match self {
            Transition::Epsilon { target }
            | Transition::Atom { target, .. }
            | Transition::Range { target, .. }
            | Transition::Set { target, .. }
            | Transition::NotSet { target, .. }
            | Transition::Wildcard { target }
            | Transition::Rule { target, .. }
            | Transition::Predicate { target, .. }
            | Transition::Precedence { target, .. }
            | Transition::Action { target, .. } => *target,
        }
    }

    pub fn is_epsilon(&self) -> bool {
        matches!(
            self,
            Transition::Epsilon { .. }
                | Transition::Rule { .. }
                | Transition::Predicate { .. }
                | Transition::Precedence { .. }
                | Transition::Action { .. }
        )
    }

    /// The symbols this transition consumes, with `NotSet` already
    /// complemented against the user token range. `None` for epsilon-like
    /// transitions and for the wildcard.
    pub fn match_set(&self, max_token_type: TokenType) -> Option<IntervalSet> {
        match self {
            Transition::Atom { label, .. } => Some(IntervalSet::single(*label)),
            Transition::Range { from, to, .. } => Some(IntervalSet::of(*from, *to)),
            Transition::Set { set, .. } => Some(set.clone()),
            Transition::NotSet { set, .. } => {
                Some(set.complement(MIN_USER_TOKEN_TYPE, max_token_type))
            }
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtnState {
    pub number: usize,
    pub kind: AtnStateKind,
    pub rule_index: usize,
    /// Only meaningful on rule start states.
    #[serde(default)]
    pub left_recursive: bool,
    pub transitions: Vec<Transition>,
}

/// The augmented transition network of a grammar: one sub-graph per rule.
///
/// This is read-only input to the completion engine. It is normally
/// produced by a grammar compiler (or `AtnBuilder`) and shared between
/// many queries through an `Arc`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Atn {
    /// Identity used to key the shared follow-set cache.
    pub grammar_id: GrammarId,
    pub grammar_name: String,
    pub max_token_type: TokenType,
    pub states: Vec<AtnState>,
    pub rule_to_start_state: Vec<usize>,
    pub rule_to_stop_state: Vec<usize>,
    pub rule_names: Vec<String>,
    /// Display names indexed by token type; entry 0 is unused.
    #[serde(default)]
    pub token_names: Vec<String>,
}

impl Atn {
    #[inline(always)]
    pub fn state(&self, number: usize) -> &AtnState {
        &self.states[number]
    }

    pub fn num_rules(&self) -> usize {
        self.rule_names.len()
    }

    pub fn rule_start(&self, rule_index: usize) -> &AtnState {
        self.state(self.rule_to_start_state[rule_index])
    }

    pub fn rule_stop(&self, rule_index: usize) -> &AtnState {
        self.state(self.rule_to_stop_state[rule_index])
    }

    pub fn rule_name(&self, rule_index: usize) -> &str {
        self.rule_names
            .get(rule_index)
            .map(|s| s.as_str())
            .unwrap_or("<invalid rule>")
    }

    pub fn rule_index(&self, name: &str) -> Option<usize> {
        self.rule_names.iter().position(|n| n == name)
    }

    pub fn token_type(&self, name: &str) -> Option<TokenType> {
        if name == "EOF" {
            return Some(EOF);
        }
        self.token_names
            .iter()
            .position(|n| n == name)
            .filter(|&i| i > 0)
            .map(|i| i as TokenType)
    }

    pub fn display_name(&self, token_type: TokenType) -> String {
        if token_type == EOF {
            return "EOF".to_string();
        }
        match self.token_names.get(token_type.max(0) as usize) {
            Some(name) if token_type > 0 && !name.is_empty() => name.clone(),
            _ => token_type.to_string(),
        }
    }

    pub fn dbg_tokens(&self, tokens: &[TokenType]) -> String {
        tokens
            .iter()
            .map(|&t| self.display_name(t))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn dbg_rules(&self, rules: &[usize]) -> String {
        rules
            .iter()
            .map(|&r| self.rule_name(r))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Check the structural invariants the completion engine relies on.
    pub fn validate(&self) -> Result<()> {
        let n = self.num_rules();
        ensure!(n > 0, "ATN has no rules");
        ensure!(
            self.rule_to_start_state.len() == n && self.rule_to_stop_state.len() == n,
            "rule start/stop tables do not match {} rule names",
            n
        );
        ensure!(
            self.max_token_type >= 0,
            "invalid max token type {}",
            self.max_token_type
        );

        for (idx, state) in self.states.iter().enumerate() {
            ensure!(
                state.number == idx,
                "state at position {} has number {}",
                idx,
                state.number
            );
            ensure!(
                state.rule_index < n,
                "state {} belongs to unknown rule {}",
                idx,
                state.rule_index
            );
            for t in &state.transitions {
                let target = t.target();
                ensure!(
                    target < self.states.len(),
                    "state {} has dangling transition to {}",
                    idx,
                    target
                );
                if let Transition::Rule {
                    rule_index,
                    follow_state,
                    ..
                } = t
                {
                    ensure!(
                        *rule_index < n && self.rule_to_start_state[*rule_index] == target,
                        "state {} calls rule {} through non-start state {}",
                        idx,
                        rule_index,
                        target
                    );
                    ensure!(
                        *follow_state < self.states.len(),
                        "state {} has dangling follow state {}",
                        idx,
                        follow_state
                    );
                }
            }
        }

        for rule in 0..n {
            let start = self.rule_to_start_state[rule];
            let stop = self.rule_to_stop_state[rule];
            ensure!(
                start < self.states.len() && stop < self.states.len(),
                "rule {} has start/stop state out of range",
                self.rule_name(rule)
            );
            ensure!(
                self.states[start].kind == AtnStateKind::RuleStart
                    && self.states[stop].kind == AtnStateKind::RuleStop,
                "rule {} start/stop states have wrong kinds",
                self.rule_name(rule)
            );
        }

        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let atn: Atn = serde_json::from_str(json)?;
        atn.validate()?;
        Ok(atn)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap()
    }
}
