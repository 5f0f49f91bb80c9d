use anyhow::Result;
use serde::{Deserialize, Serialize};

/// The rule invocation a query starts from: the walk begins at this rule's
/// start state, with the token window starting at `start_token_index`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct RuleContext {
    pub rule_index: usize,
    pub start_token_index: usize,
}

impl RuleContext {
    pub fn new(rule_index: usize, start_token_index: usize) -> Self {
        RuleContext {
            rule_index,
            start_token_index,
        }
    }
}

/// Evaluates semantic predicates embedded in the grammar, in the state of
/// the parser the completion is computed for.
///
/// Errors are propagated out of the query unchanged.
pub trait PredicateEvaluator {
    fn evaluate(&self, rule_index: usize, pred_index: usize, ctx_dependent: bool) -> Result<bool>;
}

/// Treats every predicate as true.
#[derive(Clone, Copy, Debug, Default)]
pub struct AcceptAllPredicates;

impl PredicateEvaluator for AcceptAllPredicates {
    fn evaluate(&self, _rule_index: usize, _pred_index: usize, _ctx_dependent: bool) -> Result<bool> {
        Ok(true)
    }
}

impl<F> PredicateEvaluator for F
where
    F: Fn(usize, usize, bool) -> Result<bool>,
{
    fn evaluate(&self, rule_index: usize, pred_index: usize, ctx_dependent: bool) -> Result<bool> {
        self(rule_index, pred_index, ctx_dependent)
    }
}
