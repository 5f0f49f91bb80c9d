use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use lazy_static::lazy_static;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    api::{GrammarId, RuleList, TokenList},
    atn::{Atn, AtnStateKind, IntervalSet, Transition},
    context::PredicateEvaluator,
    token::MIN_USER_TOKEN_TYPE,
};

const DEBUG: bool = true;

macro_rules! debug {
    ($($arg:tt)*) => {
        if cfg!(feature = "logging") && DEBUG {
            eprintln!($($arg)*);
        }
    }
}

/// Symbols which can be matched next, together with the rules entered on
/// the way there.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FollowSetWithPath {
    pub intervals: IntervalSet,
    pub path: RuleList,
    /// Tokens which always follow when `intervals` is a single symbol.
    /// Not filtered by ignored tokens.
    pub following: TokenList,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FollowSetsHolder {
    pub sets: Vec<FollowSetWithPath>,
    pub combined: IntervalSet,
    /// False when the end of the rule is reachable without consuming
    /// anything, so tokens after the rule can follow as well.
    pub is_exhaustive: bool,
}

pub struct FollowSetAnalyzer<'a> {
    atn: &'a Atn,
    predicates: &'a dyn PredicateEvaluator,
}

impl<'a> FollowSetAnalyzer<'a> {
    pub fn new(atn: &'a Atn, predicates: &'a dyn PredicateEvaluator) -> Self {
        FollowSetAnalyzer { atn, predicates }
    }

    pub fn determine_follow_sets(&self, start: usize, stop: usize) -> Result<FollowSetsHolder> {
        let mut sets = vec![];
        let mut state_stack = FxHashSet::default();
        let mut rule_stack = vec![];
        let is_exhaustive =
            self.collect_follow_sets(start, stop, &mut sets, &mut state_stack, &mut rule_stack)?;

        let mut combined = IntervalSet::new();
        for set in &sets {
            combined.add_set(&set.intervals);
        }

        Ok(FollowSetsHolder {
            sets,
            combined,
            is_exhaustive,
        })
    }

    // state_stack holds the states on the current path only
    fn collect_follow_sets(
        &self,
        s: usize,
        stop: usize,
        sets: &mut Vec<FollowSetWithPath>,
        state_stack: &mut FxHashSet<usize>,
        rule_stack: &mut Vec<usize>,
    ) -> Result<bool> {
        if !state_stack.insert(s) {
            return Ok(true);
        }
        let r = self.collect_from_state(s, stop, sets, state_stack, rule_stack);
        state_stack.remove(&s);
        r
    }

    fn collect_from_state(
        &self,
        s: usize,
        stop: usize,
        sets: &mut Vec<FollowSetWithPath>,
        state_stack: &mut FxHashSet<usize>,
        rule_stack: &mut Vec<usize>,
    ) -> Result<bool> {
        let state = self.atn.state(s);
        if s == stop || state.kind == AtnStateKind::RuleStop {
            return Ok(false);
        }

        let mut is_exhaustive = true;
        for transition in &state.transitions {
            match transition {
                Transition::Rule {
                    target,
                    rule_index,
                    follow_state,
                    ..
                } => {
                    if rule_stack.contains(rule_index) {
                        continue;
                    }
                    rule_stack.push(*rule_index);
                    let r = self.collect_follow_sets(*target, stop, sets, state_stack, rule_stack);
                    rule_stack.pop();
                    if !r? {
                        let next = self.collect_follow_sets(
                            *follow_state,
                            stop,
                            sets,
                            state_stack,
                            rule_stack,
                        )?;
                        is_exhaustive &= next;
                    }
                }
                Transition::Predicate {
                    target,
                    rule_index,
                    pred_index,
                    ctx_dependent,
                } => {
                    if self
                        .predicates
                        .evaluate(*rule_index, *pred_index, *ctx_dependent)?
                    {
                        let next =
                            self.collect_follow_sets(*target, stop, sets, state_stack, rule_stack)?;
                        is_exhaustive &= next;
                    }
                }
                Transition::Wildcard { .. } => {
                    sets.push(FollowSetWithPath {
                        intervals: IntervalSet::of(MIN_USER_TOKEN_TYPE, self.atn.max_token_type),
                        path: rule_stack.clone(),
                        following: vec![],
                    });
                }
                t if t.is_epsilon() => {
                    let next =
                        self.collect_follow_sets(t.target(), stop, sets, state_stack, rule_stack)?;
                    is_exhaustive &= next;
                }
                t => {
                    if let Some(intervals) = t.match_set(self.atn.max_token_type) {
                        if intervals.is_empty() {
                            continue;
                        }
                        let following = if intervals.single_symbol().is_some() {
                            following_tokens(self.atn, t.target())
                        } else {
                            vec![]
                        };
                        sets.push(FollowSetWithPath {
                            intervals,
                            path: rule_stack.clone(),
                            following,
                        });
                    }
                }
            }
        }

        Ok(is_exhaustive)
    }
}

/// Tokens which must be matched after entering `start`: follows the chain
/// of single-symbol transitions (and plain epsilons) within the rule until
/// the path branches, reaches the rule end, or needs a rule call, predicate
/// or a multi-symbol set.
pub fn following_tokens(atn: &Atn, start: usize) -> TokenList {
    let mut result = vec![];
    let mut visited = FxHashSet::default();
    let mut curr = start;
    while visited.insert(curr) {
        let state = atn.state(curr);
        if state.kind == AtnStateKind::RuleStop || state.transitions.len() != 1 {
            break;
        }
        let t = &state.transitions[0];
        match t {
            Transition::Epsilon { target } => curr = *target,
            _ => match t
                .match_set(atn.max_token_type)
                .and_then(|s| s.single_symbol())
            {
                Some(symbol) => {
                    result.push(symbol);
                    curr = t.target();
                }
                None => break,
            },
        }
    }
    result
}

lazy_static! {
    static ref GLOBAL_FOLLOW_SETS: Arc<FollowSetCache> = Arc::new(FollowSetCache::new());
}

type StateMap = FxHashMap<usize, Arc<FollowSetsHolder>>;

/// Follow sets per (grammar, rule start state), shared between queries and
/// between engine instances.
#[derive(Default)]
pub struct FollowSetCache {
    by_grammar: Mutex<FxHashMap<GrammarId, StateMap>>,
}

impl FollowSetCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide cache.
    pub fn global() -> Arc<FollowSetCache> {
        GLOBAL_FOLLOW_SETS.clone()
    }

    fn lock(&self) -> MutexGuard<'_, FxHashMap<GrammarId, StateMap>> {
        // holders are only ever inserted whole, so a poisoned map is still valid
        self.by_grammar.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, grammar_id: GrammarId, state: usize) -> Option<Arc<FollowSetsHolder>> {
        self.lock()
            .get(&grammar_id)
            .and_then(|m| m.get(&state))
            .cloned()
    }

    /// Look up the follow sets of the rule starting at `rule_start`, computing
    /// them on first use. The computation runs without holding the lock; when
    /// two threads race, the first stored result is returned to both.
    pub fn get_or_compute(
        &self,
        atn: &Atn,
        rule_start: usize,
        predicates: &dyn PredicateEvaluator,
    ) -> Result<Arc<FollowSetsHolder>> {
        if let Some(holder) = self.get(atn.grammar_id, rule_start) {
            return Ok(holder);
        }

        let rule_index = atn.state(rule_start).rule_index;
        let stop = atn.rule_to_stop_state[rule_index];
        let holder = FollowSetAnalyzer::new(atn, predicates).determine_follow_sets(rule_start, stop)?;
        debug!(
            "follow sets of {} ({}): {} sets, combined {}, exhaustive: {}",
            atn.rule_name(rule_index),
            rule_start,
            holder.sets.len(),
            holder.combined,
            holder.is_exhaustive
        );

        let mut map = self.lock();
        let holder = map
            .entry(atn.grammar_id)
            .or_default()
            .entry(rule_start)
            .or_insert_with(|| Arc::new(holder))
            .clone();
        Ok(holder)
    }

    pub fn num_states(&self, grammar_id: GrammarId) -> usize {
        self.lock().get(&grammar_id).map_or(0, |m| m.len())
    }

    /// Drop everything cached for the grammar, e.g. after its automaton
    /// was replaced under the same id.
    pub fn clear_grammar(&self, grammar_id: GrammarId) {
        self.lock().remove(&grammar_id);
    }
}
