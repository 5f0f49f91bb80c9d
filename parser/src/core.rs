use std::{
    collections::BTreeSet,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::{ensure, Result};
use instant::Instant;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    api::{CandidatesCollection, CompletionOptions, CompletionStats},
    atn::{Atn, AtnState, AtnStateKind, Transition},
    context::{PredicateEvaluator, RuleContext},
    follow::{following_tokens, FollowSetCache, FollowSetsHolder},
    infoln, loginfo,
    token::{token_window, Token, TokenStream, TokenType, MIN_USER_TOKEN_TYPE},
    translate::{RuleTranslator, RuleWithStartToken},
    warn, Logger,
};

/// Positions in the token window where a rule walk ended.
pub type RuleEndStatus = BTreeSet<usize>;

#[derive(Clone, Copy, Debug)]
struct PipelineEntry {
    state: usize,
    token_pos: usize,
}

/// Candidates offered at the caret, together with the call stack they were
/// found under.
#[derive(Clone, Debug)]
struct CaretEvent {
    stack: Vec<RuleWithStartToken>,
    tokens: Vec<(TokenType, Vec<TokenType>)>,
}

/// Memoized outcome of a rule walk. `events` hold stacks relative to the
/// frame of the rule itself, so they can be replayed under another caller.
#[derive(Clone, Debug, Default)]
struct RuleMemo {
    ends: RuleEndStatus,
    events: Vec<CaretEvent>,
}

/// Computes completion candidates for one token stream.
///
/// The automaton and the follow-set cache are shared; everything else is
/// owned by the engine and reset on every `collect_candidates()` call.
pub struct CodeCompletionCore<'a> {
    atn: Arc<Atn>,
    token_stream: &'a dyn TokenStream,
    predicates: &'a dyn PredicateEvaluator,
    follow_sets: Arc<FollowSetCache>,
    pub options: CompletionOptions,
    pub logger: Logger,
    cancel: Option<Arc<AtomicBool>>,
    last_stats: CompletionStats,
}

impl<'a> CodeCompletionCore<'a> {
    pub fn new(
        atn: Arc<Atn>,
        token_stream: &'a dyn TokenStream,
        predicates: &'a dyn PredicateEvaluator,
    ) -> Result<Self> {
        atn.validate()?;
        Ok(Self::from_parts(
            atn,
            token_stream,
            predicates,
            FollowSetCache::global(),
            CompletionOptions::default(),
            Logger::default(),
        ))
    }

    pub(crate) fn from_parts(
        atn: Arc<Atn>,
        token_stream: &'a dyn TokenStream,
        predicates: &'a dyn PredicateEvaluator,
        follow_sets: Arc<FollowSetCache>,
        options: CompletionOptions,
        logger: Logger,
    ) -> Self {
        CodeCompletionCore {
            atn,
            token_stream,
            predicates,
            follow_sets,
            options,
            logger,
            cancel: None,
            last_stats: CompletionStats::default(),
        }
    }

    /// Use `cache` instead of the process-wide follow-set cache.
    pub fn with_follow_set_cache(mut self, cache: Arc<FollowSetCache>) -> Self {
        self.follow_sets = cache;
        self
    }

    /// Setting the flag makes a running (or any later) query stop early and
    /// report its result as cancelled.
    pub fn set_cancel_flag(&mut self, flag: Arc<AtomicBool>) {
        self.cancel = Some(flag);
    }

    pub fn atn(&self) -> &Arc<Atn> {
        &self.atn
    }

    pub fn last_stats(&self) -> &CompletionStats {
        &self.last_stats
    }

    /// Collect the tokens and preferred rules which can appear at the token
    /// with stream index `caret_token_index`.
    ///
    /// With `context`, the walk starts at that rule and at its first token;
    /// otherwise at rule 0 and the start of the stream.
    pub fn collect_candidates(
        &mut self,
        caret_token_index: usize,
        context: Option<&RuleContext>,
    ) -> Result<CandidatesCollection> {
        let t0 = Instant::now();
        let ctx = context.copied().unwrap_or_default();
        ensure!(
            ctx.rule_index < self.atn.num_rules(),
            "unknown start rule {}",
            ctx.rule_index
        );

        let mut walker = Walker {
            atn: &self.atn,
            options: &self.options,
            predicates: self.predicates,
            follow_sets: &self.follow_sets,
            logger: &mut self.logger,
            translator: RuleTranslator::new(
                &self.options.preferred_rules,
                self.options.translate_rules_top_down,
            ),
            tokens: token_window(self.token_stream, ctx.start_token_index, caret_token_index),
            token_start_index: ctx.start_token_index,
            call_stack: vec![],
            precedence_stack: vec![],
            shortcut_map: FxHashMap::default(),
            candidates: CandidatesCollection::default(),
            stats: CompletionStats::default(),
            deadline: self
                .options
                .timeout_ms
                .map(|ms| t0 + Duration::from_millis(ms)),
            cancel: self.cancel.as_deref(),
            cancelled: false,
            record_events: !self.options.preferred_rules.is_empty(),
            events: vec![],
        };

        let start_state = self.atn.rule_to_start_state[ctx.rule_index];
        let r = walker.process_rule(start_state, 0, 0);
        debug_assert!(walker.call_stack.is_empty());
        walker.stats.compute_time_us = t0.elapsed().as_micros() as u64;
        r?;

        walker.candidates.cancelled = walker.cancelled;
        if walker.cancelled {
            if self.cancel.as_ref().map_or(false, |c| c.load(Ordering::Relaxed)) {
                infoln!(
                    walker,
                    "candidate collection cancelled after {} states",
                    walker.stats.states_processed
                );
            } else {
                warn!(
                    walker,
                    "candidate collection timed out after {} states",
                    walker.stats.states_processed
                );
            }
        }
        if walker.options.show_result {
            walker.log_result();
        }

        let candidates = walker.candidates;
        self.last_stats = walker.stats;
        if self.options.show_result {
            loginfo!(
                self.logger,
                "stats: {}",
                serde_json::to_string(&self.last_stats)?
            );
        }
        Ok(candidates)
    }
}

/// Per-query state of the ATN walk.
struct Walker<'w> {
    atn: &'w Atn,
    options: &'w CompletionOptions,
    predicates: &'w dyn PredicateEvaluator,
    follow_sets: &'w FollowSetCache,
    logger: &'w mut Logger,
    translator: RuleTranslator<'w>,
    tokens: Vec<Token>,
    token_start_index: usize,
    call_stack: Vec<RuleWithStartToken>,
    precedence_stack: Vec<i32>,
    // (rule, token position, precedence for left-recursive rules)
    shortcut_map: FxHashMap<(usize, usize, i32), RuleMemo>,
    candidates: CandidatesCollection,
    stats: CompletionStats,
    deadline: Option<Instant>,
    cancel: Option<&'w AtomicBool>,
    cancelled: bool,
    // Only needed when preferred rules make caret results depend on the stack.
    record_events: bool,
    events: Vec<CaretEvent>,
}

fn cut_ignored<'t>(ignored: &BTreeSet<TokenType>, following: &'t [TokenType]) -> &'t [TokenType] {
    let n = following
        .iter()
        .take_while(|t| !ignored.contains(t))
        .count();
    &following[..n]
}

impl Walker<'_> {
    fn check_cancelled(&mut self) -> bool {
        if !self.cancelled {
            let flagged = self.cancel.map_or(false, |c| c.load(Ordering::Relaxed));
            let expired = self.deadline.map_or(false, |d| Instant::now() >= d);
            self.cancelled = flagged || expired;
        }
        self.cancelled
    }

    #[inline(always)]
    fn caret_pos(&self) -> usize {
        self.tokens.len() - 1
    }

    #[inline(always)]
    fn is_ignored(&self, token: TokenType) -> bool {
        self.options.ignored_tokens.contains(&token)
    }

    /// Offer `tokens` at the caret under `stack`, unless a preferred rule on
    /// the stack takes their place.
    fn emit_at_caret(
        &mut self,
        stack: &[RuleWithStartToken],
        tokens: Vec<(TokenType, Vec<TokenType>)>,
    ) {
        if !self.translator.translate_stack(stack, &mut self.candidates) {
            for (symbol, following) in &tokens {
                if self.options.show_debug_output {
                    infoln!(self, "=====> collected: {}", self.atn.display_name(*symbol));
                }
                self.candidates.add_token(*symbol, following);
            }
        }
        if self.record_events {
            self.events.push(CaretEvent {
                stack: stack.to_vec(),
                tokens,
            });
        }
    }

    fn replay(&mut self, events: &[CaretEvent]) {
        for ev in events {
            let mut stack = self.call_stack.clone();
            stack.extend_from_slice(&ev.stack);
            self.emit_at_caret(&stack, ev.tokens.clone());
        }
    }

    fn caret_tokens(
        &self,
        symbols: impl Iterator<Item = TokenType>,
        following: &[TokenType],
    ) -> Vec<(TokenType, Vec<TokenType>)> {
        let following = cut_ignored(&self.options.ignored_tokens, following);
        symbols
            .filter(|t| !self.is_ignored(*t))
            .map(|t| (t, following.to_vec()))
            .collect()
    }

    fn process_rule(
        &mut self,
        start_state: usize,
        token_pos: usize,
        precedence: i32,
    ) -> Result<RuleEndStatus> {
        if self.check_cancelled() {
            return Ok(RuleEndStatus::new());
        }

        let atn = self.atn;
        let start = atn.state(start_state);
        let rule_index = start.rule_index;
        let key = (
            rule_index,
            token_pos,
            if start.left_recursive { precedence } else { 0 },
        );
        if self.options.memoize_rule_ends {
            if let Some(memo) = self.shortcut_map.get(&key) {
                let memo = memo.clone();
                self.stats.shortcut_hits += 1;
                if self.options.show_debug_output {
                    infoln!(self, "=====> shortcut");
                }
                self.replay(&memo.events);
                return Ok(memo.ends);
            }
        }
        self.stats.rules_entered += 1;

        let follow_sets = self
            .follow_sets
            .get_or_compute(atn, start_state, self.predicates)?;

        self.call_stack.push(RuleWithStartToken {
            start_token_index: self.tokens[token_pos].index,
            rule_index,
        });
        let depth = self.call_stack.len() - 1;
        let first_event = self.events.len();
        let r = self.walk_rule(start, token_pos, precedence, &follow_sets);
        self.call_stack.pop();
        let result = r?;

        if self.options.memoize_rule_ends && !self.cancelled {
            let events = self.events[first_event..]
                .iter()
                .map(|ev| CaretEvent {
                    stack: ev.stack[depth..].to_vec(),
                    tokens: ev.tokens.clone(),
                })
                .collect();
            self.shortcut_map.insert(
                key,
                RuleMemo {
                    ends: result.clone(),
                    events,
                },
            );
        }
        Ok(result)
    }

    fn walk_rule(
        &mut self,
        start: &AtnState,
        token_pos: usize,
        precedence: i32,
        follow_sets: &FollowSetsHolder,
    ) -> Result<RuleEndStatus> {
        let mut result = RuleEndStatus::new();

        if token_pos >= self.caret_pos() {
            if self.translator.is_preferred(start.rule_index) {
                // the rule is reported as a whole, no need to look inside
                let stack = self.call_stack.clone();
                self.emit_at_caret(&stack, vec![]);
            } else {
                self.collect_follow_sets_at_caret(token_pos, follow_sets);
            }

            if !follow_sets.is_exhaustive {
                result.insert(token_pos);
            }
            return Ok(result);
        }

        let current_symbol = self.tokens[token_pos].token_type;
        if follow_sets.is_exhaustive && !follow_sets.combined.contains(current_symbol) {
            self.stats.pruned_rules += 1;
            return Ok(result);
        }

        if start.left_recursive {
            self.precedence_stack.push(precedence);
        }
        let r = self.run_pipeline(start.number, token_pos, &mut result);
        if start.left_recursive {
            self.precedence_stack.pop();
        }
        r?;

        Ok(result)
    }

    fn collect_follow_sets_at_caret(&mut self, token_pos: usize, follow_sets: &FollowSetsHolder) {
        // rules from the follow sets start at the same token as the current rule
        let start_token_index = self.tokens[token_pos].index;
        for set in &follow_sets.sets {
            let mut full_path = self.call_stack.clone();
            full_path.extend(set.path.iter().map(|&rule_index| RuleWithStartToken {
                start_token_index,
                rule_index,
            }));
            let tokens = self.caret_tokens(set.intervals.iter(), &set.following);
            self.emit_at_caret(&full_path, tokens);
        }
    }

    fn run_pipeline(
        &mut self,
        start_state: usize,
        token_pos: usize,
        result: &mut RuleEndStatus,
    ) -> Result<()> {
        let atn = self.atn;
        let mut pipeline = vec![PipelineEntry {
            state: start_state,
            token_pos,
        }];
        // Within one rule walk the stacks are fixed, so revisiting a state at
        // the same position adds nothing new.
        let mut seen = FxHashSet::default();

        while let Some(entry) = pipeline.pop() {
            if self.check_cancelled() {
                break;
            }
            if !seen.insert((entry.state, entry.token_pos)) {
                continue;
            }
            self.stats.states_processed += 1;

            let current_symbol = self.tokens[entry.token_pos].token_type;
            let at_caret = entry.token_pos >= self.caret_pos();
            let state = atn.state(entry.state);

            if self.options.show_debug_output {
                self.print_description(state, entry.token_pos);
                if self.options.show_rule_stack {
                    self.print_rule_state();
                }
            }

            if state.kind == AtnStateKind::RuleStop {
                result.insert(entry.token_pos);
                continue;
            }

            for transition in &state.transitions {
                match transition {
                    Transition::Rule {
                        target,
                        follow_state,
                        precedence,
                        ..
                    } => {
                        let end_status = self.process_rule(*target, entry.token_pos, *precedence)?;
                        for position in end_status {
                            pipeline.push(PipelineEntry {
                                state: *follow_state,
                                token_pos: position,
                            });
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
                            pipeline.push(PipelineEntry {
                                state: *target,
                                token_pos: entry.token_pos,
                            });
                        }
                    }

                    Transition::Precedence { target, precedence } => {
                        let top = self.precedence_stack.last();
                        if top.map_or(false, |&top| *precedence >= top) {
                            pipeline.push(PipelineEntry {
                                state: *target,
                                token_pos: entry.token_pos,
                            });
                        }
                    }

                    Transition::Wildcard { target } => {
                        if at_caret {
                            let tokens =
                                self.caret_tokens(MIN_USER_TOKEN_TYPE..=atn.max_token_type, &[]);
                            let stack = self.call_stack.clone();
                            self.emit_at_caret(&stack, tokens);
                        } else {
                            pipeline.push(PipelineEntry {
                                state: *target,
                                token_pos: entry.token_pos + 1,
                            });
                        }
                    }

                    t if t.is_epsilon() => {
                        pipeline.push(PipelineEntry {
                            state: t.target(),
                            token_pos: entry.token_pos,
                        });
                    }

                    t => {
                        let set = match t.match_set(atn.max_token_type) {
                            Some(set) if !set.is_empty() => set,
                            _ => continue,
                        };
                        if at_caret {
                            let following = if set.single_symbol().is_some() {
                                following_tokens(atn, t.target())
                            } else {
                                vec![]
                            };
                            let tokens = self.caret_tokens(set.iter(), &following);
                            let stack = self.call_stack.clone();
                            self.emit_at_caret(&stack, tokens);
                        } else if set.contains(current_symbol) {
                            if self.options.show_debug_output {
                                infoln!(self, "=====> consumed: {}", atn.display_name(current_symbol));
                            }
                            pipeline.push(PipelineEntry {
                                state: t.target(),
                                token_pos: entry.token_pos + 1,
                            });
                        }
                    }
                }
            }
        }

        Ok(())
    }

    fn print_description(&mut self, state: &AtnState, token_pos: usize) {
        let indent = "  ".repeat(self.call_stack.len().saturating_sub(1));

        let mut transitions = String::new();
        if self.options.debug_output_with_transitions {
            for t in &state.transitions {
                let symbols = t
                    .match_set(self.atn.max_token_type)
                    .map(|s| s.to_vec())
                    .unwrap_or_default();
                let labels = match symbols.as_slice() {
                    [] => "ε".to_string(),
                    [first, .., last] if symbols.len() > 2 => format!(
                        "{} .. {}",
                        self.atn.display_name(*first),
                        self.atn.display_name(*last)
                    ),
                    _ => symbols
                        .iter()
                        .map(|&s| self.atn.display_name(s))
                        .collect::<Vec<_>>()
                        .join(", "),
                };
                let target = self.atn.state(t.target());
                transitions.push_str(&format!(
                    "\n{}\t({}) [{} {}] in {}",
                    indent,
                    labels,
                    target.number,
                    target.kind.name(),
                    self.atn.rule_name(target.rule_index)
                ));
            }
        }

        let index = self.token_start_index + token_pos;
        let marker = if token_pos >= self.caret_pos() {
            format!("<<{}>>", index)
        } else {
            format!("<{}>", index)
        };
        infoln!(
            self,
            "{}{} Current state: [{} {}] in {}{}",
            indent,
            marker,
            state.number,
            state.kind.name(),
            self.atn.rule_name(state.rule_index),
            transitions
        );
    }

    fn print_rule_state(&mut self) {
        if self.call_stack.is_empty() {
            infoln!(self, "<empty stack>");
            return;
        }
        for frame in &self.call_stack {
            infoln!(self, "{}", self.atn.rule_name(frame.rule_index));
        }
    }

    fn log_result(&mut self) {
        infoln!(self, "States processed: {}", self.stats.states_processed);

        infoln!(self, "\n\nCollected rules:\n");
        for (rule, candidate) in &self.candidates.rules {
            infoln!(
                self,
                "{}, path: {}",
                self.atn.rule_name(*rule),
                self.atn.dbg_rules(&candidate.rule_list)
            );
        }

        infoln!(self, "\n\nCollected tokens:\n");
        for (token, following) in &self.candidates.tokens {
            infoln!(
                self,
                "{} {}",
                self.atn.display_name(*token),
                self.atn.dbg_tokens(following)
            );
        }
        infoln!(self, "\n\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        atn::AtnBuilder,
        context::AcceptAllPredicates,
        token::{VecTokenStream, EOF},
    };

    fn walker<'w>(
        atn: &'w Atn,
        options: &'w CompletionOptions,
        cache: &'w FollowSetCache,
        logger: &'w mut Logger,
        tokens: &[TokenType],
        caret: usize,
    ) -> Walker<'w> {
        let stream = VecTokenStream::from_types(tokens);
        Walker {
            atn,
            options,
            predicates: &AcceptAllPredicates,
            follow_sets: cache,
            logger,
            translator: RuleTranslator::new(&options.preferred_rules, options.translate_rules_top_down),
            tokens: token_window(&stream, 0, caret),
            token_start_index: 0,
            call_stack: vec![],
            precedence_stack: vec![],
            shortcut_map: FxHashMap::default(),
            candidates: CandidatesCollection::default(),
            stats: CompletionStats::default(),
            deadline: None,
            cancel: None,
            cancelled: false,
            record_events: !options.preferred_rules.is_empty(),
            events: vec![],
        }
    }

    #[test]
    fn pruned_rule_walks_nothing() {
        // start: (a | b) EOF; a: X Y; b: Z
        let mut b = AtnBuilder::new("T");
        let t = b.add_tokens(&["X", "Y", "Z"]);
        let start = b.declare_rule("start");
        let ra = b.declare_rule("a");
        let rb = b.declare_rule("b");
        let ca = b.rule_ref(ra);
        let cb = b.rule_ref(rb);
        let alt = b.select(&[ca, cb]);
        let eof = b.token(EOF);
        let body = b.join(&[alt, eof]);
        b.set_rule_body(start, body);
        let x = b.token(t[0]);
        let y = b.token(t[1]);
        let body = b.join(&[x, y]);
        b.set_rule_body(ra, body);
        let z = b.token(t[2]);
        b.set_rule_body(rb, z);
        let atn = b.finalize().unwrap();

        let options = CompletionOptions::default();
        let cache = FollowSetCache::new();
        let mut logger = Logger::default();
        let mut w = walker(&atn, &options, &cache, &mut logger, &[t[2]], 1);
        let r = w.process_rule(atn.rule_to_start_state[ra], 0, 0).unwrap();
        assert!(r.is_empty());
        assert_eq!(w.stats.states_processed, 0);
        assert_eq!(w.stats.pruned_rules, 1);
        assert!(w.call_stack.is_empty());

        // EOF is only collected, never consumed, so start has no exit
        let r = w.process_rule(atn.rule_to_start_state[start], 0, 0).unwrap();
        assert!(r.is_empty());
        assert_eq!(w.candidates.token_list(), vec![EOF]);
        assert_eq!(w.stats.pruned_rules, 1);
        assert_eq!(w.stats.shortcut_hits, 1);
    }

    #[test]
    fn empty_rule_at_caret_stays_active() {
        // start: A empty; empty: ;
        let mut b = AtnBuilder::new("T");
        let a = b.add_token("A");
        let start = b.declare_rule("start");
        let empty = b.declare_rule("empty");
        let ta = b.token(a);
        let call = b.rule_ref(empty);
        let body = b.join(&[ta, call]);
        b.set_rule_body(start, body);
        let body = b.empty();
        b.set_rule_body(empty, body);
        let atn = b.finalize().unwrap();

        let options = CompletionOptions::default();
        let cache = FollowSetCache::new();
        let mut logger = Logger::default();
        let mut w = walker(&atn, &options, &cache, &mut logger, &[a], 1);
        let r = w.process_rule(atn.rule_to_start_state[empty], 1, 0).unwrap();
        assert_eq!(r.into_iter().collect::<Vec<_>>(), vec![1]);
        assert!(!cache
            .get(atn.grammar_id, atn.rule_to_start_state[empty])
            .unwrap()
            .is_exhaustive);

        // the parent walks past the empty rule to its own end
        let r = w.process_rule(atn.rule_to_start_state[start], 0, 0).unwrap();
        assert_eq!(r.into_iter().collect::<Vec<_>>(), vec![1]);
        assert!(w.candidates.tokens.is_empty());
    }

    #[test]
    fn memo_is_transparent() {
        // start: a B | a C; a: A
        let mut b = AtnBuilder::new("T");
        let t = b.add_tokens(&["A", "B", "C"]);
        let start = b.declare_rule("start");
        let ra = b.declare_rule("a");
        let c1 = b.rule_ref(ra);
        let tb = b.token(t[1]);
        let alt1 = b.join(&[c1, tb]);
        let c2 = b.rule_ref(ra);
        let tc = b.token(t[2]);
        let alt2 = b.join(&[c2, tc]);
        let body = b.select(&[alt1, alt2]);
        b.set_rule_body(start, body);
        let ta = b.token(t[0]);
        b.set_rule_body(ra, ta);
        let atn = Arc::new(b.finalize().unwrap());

        let stream = VecTokenStream::from_types(&[t[0]]);
        let mut core = CodeCompletionCore::new(atn.clone(), &stream, &AcceptAllPredicates)
            .unwrap()
            .with_follow_set_cache(Arc::new(FollowSetCache::new()));
        let with_memo = core.collect_candidates(1, None).unwrap();
        assert_eq!(core.last_stats().shortcut_hits, 1);

        core.options.memoize_rule_ends = false;
        let without_memo = core.collect_candidates(1, None).unwrap();
        assert_eq!(core.last_stats().shortcut_hits, 0);
        assert_eq!(with_memo, without_memo);
        assert_eq!(with_memo.token_list(), vec![t[1], t[2]]);
    }

    #[test]
    fn memo_replays_caret_results_under_new_stack() {
        // start: p | q; p: D a B; q: D a C; a: A
        let mut b = AtnBuilder::new("T");
        let t = b.add_tokens(&["A", "B", "C", "D"]);
        let start = b.declare_rule("start");
        let rp = b.declare_rule("p");
        let rq = b.declare_rule("q");
        let ra = b.declare_rule("a");
        let cp = b.rule_ref(rp);
        let cq = b.rule_ref(rq);
        let body = b.select(&[cp, cq]);
        b.set_rule_body(start, body);
        for (rule, last) in [(rp, t[1]), (rq, t[2])] {
            let td = b.token(t[3]);
            let call = b.rule_ref(ra);
            let tl = b.token(last);
            let body = b.join(&[td, call, tl]);
            b.set_rule_body(rule, body);
        }
        let ta = b.token(t[0]);
        b.set_rule_body(ra, ta);
        let atn = Arc::new(b.finalize().unwrap());

        let stream = VecTokenStream::from_types(&[t[3], t[0]]);
        let mut core = CodeCompletionCore::new(atn.clone(), &stream, &AcceptAllPredicates)
            .unwrap()
            .with_follow_set_cache(Arc::new(FollowSetCache::new()));
        core.options.preferred_rules = BTreeSet::from([rp, rq]);

        // `a` at the caret is walked once, `q` still gets its own candidate
        let with_memo = core.collect_candidates(1, None).unwrap();
        assert_eq!(core.last_stats().shortcut_hits, 1);
        assert!(with_memo.tokens.is_empty());
        assert_eq!(with_memo.rules.keys().copied().collect::<Vec<_>>(), vec![rp, rq]);
        for r in with_memo.rules.values() {
            assert_eq!(r.start_token_index, 0);
            assert_eq!(r.rule_list, vec![start]);
        }

        core.options.memoize_rule_ends = false;
        let without_memo = core.collect_candidates(1, None).unwrap();
        assert_eq!(with_memo, without_memo);

        core.options.preferred_rules.clear();
        core.options.memoize_rule_ends = true;
        let plain = core.collect_candidates(1, None).unwrap();
        assert_eq!(plain.token_list(), vec![t[0]]);
        assert!(plain.rules.is_empty());
    }

    #[test]
    fn cut_ignored_stops_at_first_ignored() {
        let ignored = BTreeSet::from([3]);
        assert_eq!(cut_ignored(&ignored, &[1, 2, 3, 4]), &[1, 2]);
        assert_eq!(cut_ignored(&ignored, &[3, 1]), &[] as &[TokenType]);
        assert_eq!(cut_ignored(&ignored, &[1]), &[1]);
    }

    #[test]
    fn unknown_start_rule_is_rejected() {
        let mut b = AtnBuilder::new("T");
        let a = b.add_token("A");
        let r = b.declare_rule("r");
        let body = b.token(a);
        b.set_rule_body(r, body);
        let atn = Arc::new(b.finalize().unwrap());
        let stream = VecTokenStream::from_types(&[a]);
        let mut core = CodeCompletionCore::new(atn, &stream, &AcceptAllPredicates).unwrap();
        assert!(core
            .collect_candidates(0, Some(&RuleContext::new(5, 0)))
            .is_err());
    }
}
