use std::{collections::HashMap, sync::atomic::AtomicUsize};

use anyhow::{bail, ensure, Result};

use super::{Atn, AtnState, AtnStateKind, IntervalSet, Transition};
use crate::{api::GrammarId, token::TokenType};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct NodeRef {
    idx: usize,
    builder_id: usize,
}

#[derive(Clone, Debug, PartialEq)]
enum Node {
    Token(TokenType),
    Set(Vec<TokenType>),
    NotSet(Vec<TokenType>),
    Range(TokenType, TokenType),
    Wildcard,
    RuleRef { rule: usize, precedence: i32 },
    Predicate { pred_index: usize, ctx_dependent: bool },
    Precedence(i32),
    Action(usize),
    Join(Vec<usize>),
    Select(Vec<usize>),
    Optional(usize),
    ZeroOrMore(usize),
    OneOrMore(usize),
}

struct RuleDef {
    name: String,
    body: Option<usize>,
    left_recursive: bool,
}

/// Builds an `Atn` from rule bodies composed of element nodes, wiring the
/// states the way a grammar compiler lays them out (block start/end pairs,
/// loop entry/back states, rule start/stop states).
///
/// Rules are declared first so that bodies can refer to them recursively.
/// Left-recursive rules have to be given in their rewritten form: a primary
/// part followed by a loop of `precedence(n)`-gated alternatives, with
/// recursive calls made through `rule_ref_prec`.
pub struct AtnBuilder {
    grammar_name: String,
    grammar_id: GrammarId,
    builder_id: usize,
    token_names: Vec<String>,
    tokens_by_name: HashMap<String, TokenType>,
    rules: Vec<RuleDef>,
    nodes: Vec<Node>,
}

static COUNTER: AtomicUsize = AtomicUsize::new(1);

fn next_id() -> usize {
    COUNTER.fetch_add(1, std::sync::atomic::Ordering::Relaxed)
}

impl AtnBuilder {
    /// Each builder gets a fresh `GrammarId`, unless overridden with
    /// `set_grammar_id()`.
    pub fn new(grammar_name: &str) -> Self {
        Self {
            grammar_name: grammar_name.to_string(),
            grammar_id: GrammarId(next_id()),
            builder_id: next_id(),
            token_names: vec![String::new()],
            tokens_by_name: HashMap::new(),
            rules: vec![],
            nodes: vec![],
        }
    }

    pub fn set_grammar_id(&mut self, id: GrammarId) -> &mut Self {
        self.grammar_id = id;
        self
    }

    pub fn grammar_id(&self) -> GrammarId {
        self.grammar_id
    }

    /// Token types are assigned sequentially from 1. Adding a name twice
    /// returns the existing type.
    pub fn add_token(&mut self, name: &str) -> TokenType {
        if let Some(t) = self.tokens_by_name.get(name) {
            return *t;
        }
        let t = self.token_names.len() as TokenType;
        self.token_names.push(name.to_string());
        self.tokens_by_name.insert(name.to_string(), t);
        t
    }

    pub fn add_tokens(&mut self, names: &[&str]) -> Vec<TokenType> {
        names.iter().map(|n| self.add_token(n)).collect()
    }

    pub fn declare_rule(&mut self, name: &str) -> usize {
        self.rules.push(RuleDef {
            name: name.to_string(),
            body: None,
            left_recursive: false,
        });
        self.rules.len() - 1
    }

    pub fn set_left_recursive(&mut self, rule: usize) {
        self.rules[rule].left_recursive = true;
    }

    pub fn set_rule_body(&mut self, rule: usize, body: NodeRef) {
        let idx = self.child_nodes(&[body])[0];
        assert!(
            self.rules[rule].body.is_none(),
            "rule {} already has a body",
            self.rules[rule].name
        );
        self.rules[rule].body = Some(idx);
    }

    fn add_node(&mut self, node: Node) -> NodeRef {
        let r = NodeRef {
            idx: self.nodes.len(),
            builder_id: self.builder_id,
        };
        self.nodes.push(node);
        r
    }

    fn child_nodes(&self, options: &[NodeRef]) -> Vec<usize> {
        options
            .iter()
            .map(|e| {
                assert!(e.builder_id == self.builder_id, "node from another builder");
                e.idx
            })
            .collect()
    }

    pub fn token(&mut self, token_type: TokenType) -> NodeRef {
        self.add_node(Node::Token(token_type))
    }

    /// Shorthand for `token(add_token(name))`.
    pub fn named(&mut self, name: &str) -> NodeRef {
        let t = self.add_token(name);
        self.token(t)
    }

    pub fn set(&mut self, symbols: &[TokenType]) -> NodeRef {
        self.add_node(Node::Set(symbols.to_vec()))
    }

    pub fn not_set(&mut self, symbols: &[TokenType]) -> NodeRef {
        self.add_node(Node::NotSet(symbols.to_vec()))
    }

    pub fn range(&mut self, from: TokenType, to: TokenType) -> NodeRef {
        self.add_node(Node::Range(from, to))
    }

    pub fn wildcard(&mut self) -> NodeRef {
        self.add_node(Node::Wildcard)
    }

    pub fn rule_ref(&mut self, rule: usize) -> NodeRef {
        self.rule_ref_prec(rule, 0)
    }

    pub fn rule_ref_prec(&mut self, rule: usize, precedence: i32) -> NodeRef {
        assert!(rule < self.rules.len(), "undeclared rule {}", rule);
        self.add_node(Node::RuleRef { rule, precedence })
    }

    pub fn predicate(&mut self, pred_index: usize) -> NodeRef {
        self.add_node(Node::Predicate {
            pred_index,
            ctx_dependent: false,
        })
    }

    pub fn ctx_predicate(&mut self, pred_index: usize) -> NodeRef {
        self.add_node(Node::Predicate {
            pred_index,
            ctx_dependent: true,
        })
    }

    pub fn precedence(&mut self, precedence: i32) -> NodeRef {
        self.add_node(Node::Precedence(precedence))
    }

    pub fn action(&mut self, action_index: usize) -> NodeRef {
        self.add_node(Node::Action(action_index))
    }

    pub fn join(&mut self, values: &[NodeRef]) -> NodeRef {
        let ch = self.child_nodes(values);
        self.add_node(Node::Join(ch))
    }

    pub fn select(&mut self, options: &[NodeRef]) -> NodeRef {
        let ch = self.child_nodes(options);
        self.add_node(Node::Select(ch))
    }

    pub fn empty(&mut self) -> NodeRef {
        self.join(&[])
    }

    pub fn optional(&mut self, value: NodeRef) -> NodeRef {
        let ch = self.child_nodes(&[value]);
        self.add_node(Node::Optional(ch[0]))
    }

    pub fn zero_or_more(&mut self, elt: NodeRef) -> NodeRef {
        let ch = self.child_nodes(&[elt]);
        self.add_node(Node::ZeroOrMore(ch[0]))
    }

    pub fn one_or_more(&mut self, elt: NodeRef) -> NodeRef {
        let ch = self.child_nodes(&[elt]);
        self.add_node(Node::OneOrMore(ch[0]))
    }

    pub fn finalize(&self) -> Result<Atn> {
        ensure!(!self.rules.is_empty(), "grammar {} has no rules", self.grammar_name);
        let mut bodies = vec![];
        for r in &self.rules {
            match r.body {
                Some(b) => bodies.push(b),
                None => bail!("rule {} has no body", r.name),
            }
        }
        let max_token_type = (self.token_names.len() - 1) as TokenType;
        for node in &self.nodes {
            let symbols: Vec<TokenType> = match node {
                Node::Token(t) => vec![*t],
                Node::Set(s) | Node::NotSet(s) => s.clone(),
                Node::Range(a, b) => vec![*a, *b],
                _ => vec![],
            };
            for t in symbols {
                ensure!(
                    t == crate::token::EOF || (t > 0 && t <= max_token_type),
                    "undeclared token type {}",
                    t
                );
            }
        }

        self.check_loops()?;

        let mut c = Compiler {
            nodes: &self.nodes,
            states: vec![],
            rule_to_start_state: vec![],
            rule_to_stop_state: vec![],
        };

        for (idx, r) in self.rules.iter().enumerate() {
            let start = c.new_state(AtnStateKind::RuleStart, idx);
            c.states[start].left_recursive = r.left_recursive;
            c.rule_to_start_state.push(start);
        }
        for idx in 0..self.rules.len() {
            let stop = c.new_state(AtnStateKind::RuleStop, idx);
            c.rule_to_stop_state.push(stop);
        }

        for (idx, &body) in bodies.iter().enumerate() {
            let (left, right) = c.compile(body, idx);
            c.epsilon(c.rule_to_start_state[idx], left);
            c.epsilon(right, c.rule_to_stop_state[idx]);
        }

        let atn = Atn {
            grammar_id: self.grammar_id,
            grammar_name: self.grammar_name.clone(),
            max_token_type,
            states: c.states,
            rule_to_start_state: c.rule_to_start_state,
            rule_to_stop_state: c.rule_to_stop_state,
            rule_names: self.rules.iter().map(|r| r.name.clone()).collect(),
            token_names: self.token_names.clone(),
        };
        atn.validate()?;
        Ok(atn)
    }

    /// For every node, whether it can complete without consuming a token.
    /// Children always have lower indices than their parents, so one pass
    /// per round suffices; rounds repeat until rule results settle.
    fn nullable_nodes(&self) -> Vec<bool> {
        let mut rule_nullable = vec![false; self.rules.len()];
        let mut nullable = vec![false; self.nodes.len()];
        loop {
            for (idx, node) in self.nodes.iter().enumerate() {
                nullable[idx] = match node {
                    Node::Token(_)
                    | Node::Set(_)
                    | Node::NotSet(_)
                    | Node::Range(..)
                    | Node::Wildcard => false,
                    Node::RuleRef { rule, .. } => rule_nullable[*rule],
                    Node::Predicate { .. } | Node::Precedence(_) | Node::Action(_) => true,
                    Node::Join(seq) => seq.iter().all(|&n| nullable[n]),
                    Node::Select(alts) => alts.iter().any(|&n| nullable[n]),
                    Node::Optional(_) | Node::ZeroOrMore(_) => true,
                    Node::OneOrMore(n) => nullable[*n],
                };
            }
            let mut changed = false;
            for (idx, r) in self.rules.iter().enumerate() {
                if let Some(body) = r.body {
                    if nullable[body] && !rule_nullable[idx] {
                        rule_nullable[idx] = true;
                        changed = true;
                    }
                }
            }
            if !changed {
                return nullable;
            }
        }
    }

    // A closure over something that can match nothing would make the walk
    // cycle without consuming input.
    fn check_loops(&self) -> Result<()> {
        let nullable = self.nullable_nodes();
        for r in &self.rules {
            let mut todo: Vec<usize> = r.body.into_iter().collect();
            while let Some(idx) = todo.pop() {
                match &self.nodes[idx] {
                    Node::ZeroOrMore(n) | Node::OneOrMore(n) => {
                        ensure!(
                            !nullable[*n],
                            "rule {} has a loop whose body can match nothing",
                            r.name
                        );
                        todo.push(*n);
                    }
                    Node::Optional(n) => todo.push(*n),
                    Node::Join(ch) | Node::Select(ch) => todo.extend_from_slice(ch),
                    _ => {}
                }
            }
        }
        Ok(())
    }
}

struct Compiler<'a> {
    nodes: &'a [Node],
    states: Vec<AtnState>,
    rule_to_start_state: Vec<usize>,
    rule_to_stop_state: Vec<usize>,
}

impl Compiler<'_> {
    fn new_state(&mut self, kind: AtnStateKind, rule_index: usize) -> usize {
        let number = self.states.len();
        self.states.push(AtnState {
            number,
            kind,
            rule_index,
            left_recursive: false,
            transitions: vec![],
        });
        number
    }

    fn add(&mut self, from: usize, t: Transition) {
        self.states[from].transitions.push(t);
    }

    fn epsilon(&mut self, from: usize, target: usize) {
        self.add(from, Transition::Epsilon { target });
    }

    // A pair of basic states joined by a single transition.
    fn edge(&mut self, rule: usize, mk: impl FnOnce(usize) -> Transition) -> (usize, usize) {
        let left = self.new_state(AtnStateKind::Basic, rule);
        let right = self.new_state(AtnStateKind::Basic, rule);
        self.add(left, mk(right));
        (left, right)
    }

    /// Returns the (entry, exit) states of the compiled node.
    fn compile(&mut self, node: usize, rule: usize) -> (usize, usize) {
        let nodes = self.nodes;
        match &nodes[node] {
            Node::Token(t) => {
                let label = *t;
                self.edge(rule, |target| Transition::Atom { target, label })
            }
            Node::Set(s) => {
                let set = IntervalSet::from_symbols(s);
                self.edge(rule, |target| Transition::Set { target, set })
            }
            Node::NotSet(s) => {
                let set = IntervalSet::from_symbols(s);
                self.edge(rule, |target| Transition::NotSet { target, set })
            }
            Node::Range(from, to) => {
                let (from, to) = (*from, *to);
                self.edge(rule, |target| Transition::Range { target, from, to })
            }
            Node::Wildcard => self.edge(rule, |target| Transition::Wildcard { target }),
            Node::RuleRef {
                rule: callee,
                precedence,
            } => {
                let (callee, precedence) = (*callee, *precedence);
                let callee_start = self.rule_to_start_state[callee];
                let left = self.new_state(AtnStateKind::Basic, rule);
                let right = self.new_state(AtnStateKind::Basic, rule);
                self.add(
                    left,
                    Transition::Rule {
                        target: callee_start,
                        rule_index: callee,
                        follow_state: right,
                        precedence,
                    },
                );
                (left, right)
            }
            Node::Predicate {
                pred_index,
                ctx_dependent,
            } => {
                let (pred_index, ctx_dependent) = (*pred_index, *ctx_dependent);
                self.edge(rule, |target| Transition::Predicate {
                    target,
                    rule_index: rule,
                    pred_index,
                    ctx_dependent,
                })
            }
            Node::Precedence(p) => {
                let precedence = *p;
                self.edge(rule, |target| Transition::Precedence { target, precedence })
            }
            Node::Action(a) => {
                let action_index = *a;
                self.edge(rule, |target| Transition::Action {
                    target,
                    rule_index: rule,
                    action_index,
                })
            }
            Node::Join(seq) => {
                if seq.is_empty() {
                    return self.edge(rule, |target| Transition::Epsilon { target });
                }
                let (first, mut prev) = self.compile(seq[0], rule);
                for &n in &seq[1..] {
                    let (l, r) = self.compile(n, rule);
                    self.epsilon(prev, l);
                    prev = r;
                }
                (first, prev)
            }
            Node::Select(alts) => {
                let start = self.new_state(AtnStateKind::BlockStart, rule);
                let end = self.new_state(AtnStateKind::BlockEnd, rule);
                for &n in alts {
                    let (l, r) = self.compile(n, rule);
                    self.epsilon(start, l);
                    self.epsilon(r, end);
                }
                (start, end)
            }
            Node::Optional(n) => {
                let n = *n;
                let start = self.new_state(AtnStateKind::BlockStart, rule);
                let end = self.new_state(AtnStateKind::BlockEnd, rule);
                let (l, r) = self.compile(n, rule);
                self.epsilon(start, l);
                self.epsilon(start, end);
                self.epsilon(r, end);
                (start, end)
            }
            Node::ZeroOrMore(n) => {
                let n = *n;
                let entry = self.new_state(AtnStateKind::StarLoopEntry, rule);
                let block_start = self.new_state(AtnStateKind::StarBlockStart, rule);
                let block_end = self.new_state(AtnStateKind::BlockEnd, rule);
                let loop_back = self.new_state(AtnStateKind::StarLoopBack, rule);
                let loop_end = self.new_state(AtnStateKind::LoopEnd, rule);
                let (l, r) = self.compile(n, rule);
                self.epsilon(entry, block_start);
                self.epsilon(entry, loop_end);
                self.epsilon(block_start, l);
                self.epsilon(r, block_end);
                self.epsilon(block_end, loop_back);
                self.epsilon(loop_back, entry);
                (entry, loop_end)
            }
            Node::OneOrMore(n) => {
                let n = *n;
                let block_start = self.new_state(AtnStateKind::PlusBlockStart, rule);
                let block_end = self.new_state(AtnStateKind::BlockEnd, rule);
                let loop_back = self.new_state(AtnStateKind::PlusLoopBack, rule);
                let loop_end = self.new_state(AtnStateKind::LoopEnd, rule);
                let (l, r) = self.compile(n, rule);
                self.epsilon(block_start, l);
                self.epsilon(r, block_end);
                self.epsilon(block_end, loop_back);
                self.epsilon(loop_back, block_start);
                self.epsilon(loop_back, loop_end);
                (block_start, loop_end)
            }
        }
    }
}
