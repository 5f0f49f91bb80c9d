use std::sync::Arc;

use anyhow::Result;
use c3_parser::{
    atn::{Atn, AtnBuilder},
    token::{DEFAULT_CHANNEL, HIDDEN_CHANNEL},
    AcceptAllPredicates, CandidatesCollection, CodeCompletionCore, CompletionOptions,
    FollowSetCache, RuleContext, TokenType, VecTokenStream,
};
use lazy_static::lazy_static;

lazy_static! {
    pub static ref SUM_ATN: Arc<Atn> = Arc::new(sum_grammar().unwrap());
    pub static ref EXPR_ATN: Arc<Atn> = Arc::new(expr_grammar().unwrap());
    pub static ref WHITEBOX_ATN: Arc<Atn> = Arc::new(whitebox_grammar().unwrap());
    pub static ref CALC_ATN: Arc<Atn> = Arc::new(calc_grammar().unwrap());
}

/// expression: ID (PLUS expression)?
pub fn sum_grammar() -> Result<Atn> {
    let mut b = AtnBuilder::new("Sum");
    b.add_tokens(&["ID", "PLUS"]);
    let expression = b.declare_rule("expression");

    let id = b.named("ID");
    let plus = b.named("PLUS");
    let rec = b.rule_ref(expression);
    let tail = b.join(&[plus, rec]);
    let tail = b.optional(tail);
    let body = b.join(&[id, tail]);
    b.set_rule_body(expression, body);

    b.finalize()
}

/// A small expression language with assignments and operator precedence:
///
/// ```text
/// expression: assignment | simpleExpression;
/// assignment: (VAR | LET) ID EQUAL simpleExpression;
/// simpleExpression
///     : simpleExpression (PLUS | MINUS) simpleExpression
///     | simpleExpression (MULTIPLY | DIVIDE) simpleExpression
///     | variableRef
///     | functionRef
///     ;
/// variableRef: ID;
/// functionRef: ID OPEN_PAR CLOSE_PAR;
/// ```
///
/// `WS` goes to the hidden channel.
pub fn expr_grammar() -> Result<Atn> {
    let mut b = AtnBuilder::new("Expr");
    b.add_tokens(&[
        "VAR", "LET", "PLUS", "MINUS", "MULTIPLY", "DIVIDE", "EQUAL", "OPEN_PAR", "CLOSE_PAR",
        "ID", "WS",
    ]);
    let expression = b.declare_rule("expression");
    let assignment = b.declare_rule("assignment");
    let simple_expression = b.declare_rule("simpleExpression");
    let variable_ref = b.declare_rule("variableRef");
    let function_ref = b.declare_rule("functionRef");

    let a = b.rule_ref(assignment);
    let s = b.rule_ref(simple_expression);
    let body = b.select(&[a, s]);
    b.set_rule_body(expression, body);

    let var = b.named("VAR");
    let let_ = b.named("LET");
    let kw = b.select(&[var, let_]);
    let id = b.named("ID");
    let eq = b.named("EQUAL");
    let s = b.rule_ref(simple_expression);
    let body = b.join(&[kw, id, eq, s]);
    b.set_rule_body(assignment, body);

    // left recursion removed: primary part, then a loop of precedence-gated
    // binary operators
    b.set_left_recursive(simple_expression);
    let v = b.rule_ref(variable_ref);
    let f = b.rule_ref(function_ref);
    let primary = b.select(&[v, f]);
    let p2 = b.precedence(2);
    let plus = b.named("PLUS");
    let minus = b.named("MINUS");
    let additive = b.select(&[plus, minus]);
    let rhs = b.rule_ref_prec(simple_expression, 3);
    let alt1 = b.join(&[p2, additive, rhs]);
    let p1 = b.precedence(1);
    let mul = b.named("MULTIPLY");
    let div = b.named("DIVIDE");
    let multiplicative = b.select(&[mul, div]);
    let rhs = b.rule_ref_prec(simple_expression, 2);
    let alt2 = b.join(&[p1, multiplicative, rhs]);
    let ops = b.select(&[alt1, alt2]);
    let ops = b.zero_or_more(ops);
    let body = b.join(&[primary, ops]);
    b.set_rule_body(simple_expression, body);

    let id = b.named("ID");
    b.set_rule_body(variable_ref, id);

    let id = b.named("ID");
    let open = b.named("OPEN_PAR");
    let close = b.named("CLOSE_PAR");
    let body = b.join(&[id, open, close]);
    b.set_rule_body(function_ref, body);

    b.finalize()
}

/// Grammar exercising the corner cases of follow-set computation: empty
/// rules, optional and repeated tokens, alternatives sharing a prefix.
/// Every `testN` rule is a separate entry point.
pub fn whitebox_grammar() -> Result<Atn> {
    let mut b = AtnBuilder::new("Whitebox");
    b.add_tokens(&[
        "LOREM",
        "IPSUM",
        "DOLOR",
        "SIT",
        "AMET",
        "CONSECTETUR",
        "ADIPISCING",
        "WS",
    ]);
    let names = [
        "test1", "rule1", "rule2", "rule3", "rule4", "rule5", "test2", "rule7", "rule8", "rule9",
        "rule10", "rule11", "test3", "rule13", "test4", "rule15", "rule16", "test5", "rule18",
        "rule19", "test6", "rule21", "rule22", "test7", "test8",
    ];
    let rules: Vec<usize> = names.iter().map(|n| b.declare_rule(n)).collect();
    let r = |name: &str| rules[names.iter().position(|n| *n == name).unwrap()];

    // test1: rule1 ADIPISCING;
    // rule1: rule2 CONSECTETUR;
    // rule2: LOREM rule3 rule5 SIT* AMET?;
    // rule3: rule4 DOLOR?;
    // rule4: IPSUM?;
    // rule5: ;
    // test2..rule11 is the same with the empty rule first
    for (test, r1, r2, r3, r4, r5, empty_first) in [
        ("test1", "rule1", "rule2", "rule3", "rule4", "rule5", false),
        ("test2", "rule7", "rule8", "rule9", "rule10", "rule11", true),
    ] {
        let call = b.rule_ref(r(r1));
        let adipiscing = b.named("ADIPISCING");
        let body = b.join(&[call, adipiscing]);
        b.set_rule_body(r(test), body);

        let call = b.rule_ref(r(r2));
        let consectetur = b.named("CONSECTETUR");
        let body = b.join(&[call, consectetur]);
        b.set_rule_body(r(r1), body);

        let lorem = b.named("LOREM");
        let c3 = b.rule_ref(r(r3));
        let c5 = b.rule_ref(r(r5));
        let sit = b.named("SIT");
        let sits = b.zero_or_more(sit);
        let amet = b.named("AMET");
        let amet = b.optional(amet);
        let body = if empty_first {
            b.join(&[lorem, c5, c3, sits, amet])
        } else {
            b.join(&[lorem, c3, c5, sits, amet])
        };
        b.set_rule_body(r(r2), body);

        let c4 = b.rule_ref(r(r4));
        let dolor = b.named("DOLOR");
        let dolor = b.optional(dolor);
        let body = b.join(&[c4, dolor]);
        b.set_rule_body(r(r3), body);

        let ipsum = b.named("IPSUM");
        let body = b.optional(ipsum);
        b.set_rule_body(r(r4), body);

        let body = b.empty();
        b.set_rule_body(r(r5), body);
    }

    // test3: LOREM IPSUM? rule13 AMET+ CONSECTETUR;
    // rule13: (DOLOR | SIT)*;
    let lorem = b.named("LOREM");
    let ipsum = b.named("IPSUM");
    let ipsum = b.optional(ipsum);
    let c13 = b.rule_ref(r("rule13"));
    let amet = b.named("AMET");
    let amets = b.one_or_more(amet);
    let consectetur = b.named("CONSECTETUR");
    let body = b.join(&[lorem, ipsum, c13, amets, consectetur]);
    b.set_rule_body(r("test3"), body);
    let dolor = b.add_token("DOLOR");
    let sit = b.add_token("SIT");
    let set = b.set(&[dolor, sit]);
    let body = b.zero_or_more(set);
    b.set_rule_body(r("rule13"), body);

    // test4, test5, test6: LOREM (rule15 | rule16);
    for test in ["test4", "test5", "test6"] {
        let lorem = b.named("LOREM");
        let c15 = b.rule_ref(r("rule15"));
        let c16 = b.rule_ref(r("rule16"));
        let alts = b.select(&[c15, c16]);
        let body = b.join(&[lorem, alts]);
        b.set_rule_body(r(test), body);
    }

    // rule15: IPSUM DOLOR SIT;
    // rule16: IPSUM DOLOR AMET;
    // rule18: IPSUM DOLOR (SIT | CONSECTETUR);
    // rule19: IPSUM DOLOR AMET;
    // rule21: IPSUM DOLOR SIT;
    // rule22: IPSUM DOLOR (AMET | CONSECTETUR);
    for (rule, last) in [
        ("rule15", &["SIT"][..]),
        ("rule16", &["AMET"][..]),
        ("rule18", &["SIT", "CONSECTETUR"][..]),
        ("rule19", &["AMET"][..]),
        ("rule21", &["SIT"][..]),
        ("rule22", &["AMET", "CONSECTETUR"][..]),
    ] {
        let ipsum = b.named("IPSUM");
        let dolor = b.named("DOLOR");
        let last = if last.len() == 1 {
            b.named(last[0])
        } else {
            let types = b.add_tokens(last);
            b.set(&types)
        };
        let body = b.join(&[ipsum, dolor, last]);
        b.set_rule_body(r(rule), body);
    }

    // test7: LOREM (IPSUM DOLOR SIT | IPSUM DOLOR AMET);
    // test8: LOREM (IPSUM DOLOR SIT AMET | IPSUM DOLOR SIT CONSECTETUR);
    for (test, alts) in [
        ("test7", [&["IPSUM", "DOLOR", "SIT"][..], &["IPSUM", "DOLOR", "AMET"][..]]),
        (
            "test8",
            [
                &["IPSUM", "DOLOR", "SIT", "AMET"][..],
                &["IPSUM", "DOLOR", "SIT", "CONSECTETUR"][..],
            ],
        ),
    ] {
        let lorem = b.named("LOREM");
        let mut options = vec![];
        for alt in alts {
            let seq: Vec<_> = alt.iter().map(|t| b.named(t)).collect();
            options.push(b.join(&seq));
        }
        let alts = b.select(&options);
        let body = b.join(&[lorem, alts]);
        b.set_rule_body(r(test), body);
    }

    b.finalize()
}

/// Left-recursive calculator, in the form a grammar compiler produces:
///
/// ```text
/// start: expr EOF;
/// expr: expr MUL expr | expr PLUS expr | primary;
/// primary: INT | LPAREN expr RPAREN;
/// mul_start: expr[2] EOF;
/// ```
pub fn calc_grammar() -> Result<Atn> {
    let mut b = AtnBuilder::new("Calc");
    b.add_tokens(&["INT", "MUL", "PLUS", "LPAREN", "RPAREN"]);
    let start = b.declare_rule("start");
    let expr = b.declare_rule("expr");
    let primary = b.declare_rule("primary");
    let mul_start = b.declare_rule("mul_start");

    let call = b.rule_ref(expr);
    let eof = b.token(c3_parser::EOF);
    let body = b.join(&[call, eof]);
    b.set_rule_body(start, body);

    b.set_left_recursive(expr);
    let first = b.rule_ref(primary);
    let p2 = b.precedence(2);
    let mul = b.named("MUL");
    let rhs = b.rule_ref_prec(expr, 3);
    let alt1 = b.join(&[p2, mul, rhs]);
    let p1 = b.precedence(1);
    let plus = b.named("PLUS");
    let rhs = b.rule_ref_prec(expr, 2);
    let alt2 = b.join(&[p1, plus, rhs]);
    let ops = b.select(&[alt1, alt2]);
    let ops = b.zero_or_more(ops);
    let body = b.join(&[first, ops]);
    b.set_rule_body(expr, body);

    let int = b.named("INT");
    let lparen = b.named("LPAREN");
    let inner = b.rule_ref(expr);
    let rparen = b.named("RPAREN");
    let nested = b.join(&[lparen, inner, rparen]);
    let body = b.select(&[int, nested]);
    b.set_rule_body(primary, body);

    let call = b.rule_ref_prec(expr, 2);
    let eof = b.token(c3_parser::EOF);
    let body = b.join(&[call, eof]);
    b.set_rule_body(mul_start, body);

    b.finalize()
}

/// start: ({p0}? A | {p1}? B | C) EOF;
///
/// Built fresh on every call, so each test gets its own grammar id and
/// follow sets computed with its own predicates.
pub fn predicate_grammar() -> Result<Atn> {
    let mut b = AtnBuilder::new("Predicates");
    b.add_tokens(&["A", "B", "C"]);
    let start = b.declare_rule("start");
    let p0 = b.predicate(0);
    let a = b.named("A");
    let alt1 = b.join(&[p0, a]);
    let p1 = b.predicate(1);
    let bb = b.named("B");
    let alt2 = b.join(&[p1, bb]);
    let c = b.named("C");
    let alts = b.select(&[alt1, alt2, c]);
    let eof = b.token(c3_parser::EOF);
    let body = b.join(&[alts, eof]);
    b.set_rule_body(start, body);
    b.finalize()
}

pub fn tok(atn: &Atn, name: &str) -> TokenType {
    atn.token_type(name)
        .unwrap_or_else(|| panic!("unknown token {}", name))
}

pub fn rule(atn: &Atn, name: &str) -> usize {
    atn.rule_index(name)
        .unwrap_or_else(|| panic!("unknown rule {}", name))
}

/// Turn a space-separated list of token names into a token stream; `WS`
/// tokens go to the hidden channel.
pub fn lex(atn: &Atn, input: &str) -> VecTokenStream {
    VecTokenStream::new(input.split_whitespace().map(|name| {
        let channel = if name == "WS" {
            HIDDEN_CHANNEL
        } else {
            DEFAULT_CHANNEL
        };
        (tok(atn, name), channel)
    }))
}

/// Run one query on `input` with a private follow-set cache.
pub fn collect(
    atn: &Arc<Atn>,
    input: &str,
    caret: usize,
    start_rule: Option<&str>,
    options: &CompletionOptions,
) -> CandidatesCollection {
    let stream = lex(atn, input);
    let mut core = CodeCompletionCore::new(atn.clone(), &stream, &AcceptAllPredicates)
        .unwrap()
        .with_follow_set_cache(Arc::new(FollowSetCache::new()));
    core.options = options.clone();
    let ctx = start_rule.map(|name| RuleContext::new(rule(atn, name), 0));
    core.collect_candidates(caret, ctx.as_ref()).unwrap()
}

pub fn options_with(preferred: &[&str], atn: &Atn) -> CompletionOptions {
    let mut options = CompletionOptions::default();
    options.preferred_rules = preferred.iter().map(|name| rule(atn, name)).collect();
    options
}

/// Token candidates as "NAME: FOLLOWING..." strings, sorted by token type.
pub fn token_strings(atn: &Atn, candidates: &CandidatesCollection) -> Vec<String> {
    candidates
        .tokens
        .iter()
        .map(|(t, following)| {
            let mut s = format!("{}:", atn.display_name(*t));
            for f in following {
                s.push(' ');
                s.push_str(&atn.display_name(*f));
            }
            s
        })
        .collect()
}

/// Rule candidates as "name@start: path..." strings, sorted by rule index.
pub fn rule_strings(atn: &Atn, candidates: &CandidatesCollection) -> Vec<String> {
    candidates
        .rules
        .iter()
        .map(|(r, c)| {
            let mut s = format!("{}@{}:", atn.rule_name(*r), c.start_token_index);
            for p in &c.rule_list {
                s.push(' ');
                s.push_str(atn.rule_name(*p));
            }
            s
        })
        .collect()
}

fn sorted(v: &[&str]) -> Vec<String> {
    let mut r: Vec<String> = v.iter().map(|s| s.to_string()).collect();
    r.sort();
    r
}

/// Check the token and rule candidates, ignoring order.
pub fn check_candidates(
    atn: &Atn,
    candidates: &CandidatesCollection,
    tokens: &[&str],
    rules: &[&str],
) {
    let mut got_tokens = token_strings(atn, candidates);
    got_tokens.sort();
    let mut got_rules = rule_strings(atn, candidates);
    got_rules.sort();
    println!("tokens: {:?}\nrules: {:?}", got_tokens, got_rules);
    assert_eq!(got_tokens, sorted(tokens), "token candidates differ");
    assert_eq!(got_rules, sorted(rules), "rule candidates differ");
    assert!(!candidates.cancelled);
}

/// Check only which tokens are candidates.
pub fn check_token_names(atn: &Atn, candidates: &CandidatesCollection, expected: &[&str]) {
    let mut got: Vec<String> = candidates
        .tokens
        .keys()
        .map(|t| atn.display_name(*t))
        .collect();
    got.sort();
    println!("tokens: {:?}", got);
    assert_eq!(got, sorted(expected));
}
