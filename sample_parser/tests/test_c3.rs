use c3_parser::CompletionOptions;
use sample_parser::*;

const EXPR_INPUT: &str = "VAR WS ID WS EQUAL WS ID WS PLUS WS ID OPEN_PAR CLOSE_PAR";

#[test]
fn test_sum_grammar() {
    let atn = &*SUM_ATN;
    let opts = CompletionOptions::default();

    let c = collect(atn, "ID PLUS ID", 1, None, &opts);
    check_candidates(atn, &c, &["PLUS:"], &[]);

    let c = collect(atn, "ID PLUS ID", 2, None, &opts);
    check_candidates(atn, &c, &["ID:"], &[]);

    let c = collect(atn, "ID PLUS ID", 0, None, &opts);
    check_candidates(atn, &c, &["ID:"], &[]);

    let mut opts = options_with(&["expression"], atn);
    opts.translate_rules_top_down = true;
    let c = collect(atn, "ID PLUS ID", 2, None, &opts);
    check_candidates(atn, &c, &[], &["expression@2: expression"]);

    opts.translate_rules_top_down = false;
    let c = collect(atn, "ID PLUS ID", 2, None, &opts);
    check_candidates(atn, &c, &[], &["expression@0:"]);
}

#[test]
fn test_expr_no_options() {
    let atn = &*EXPR_ATN;
    let opts = CompletionOptions::default();

    let c = collect(atn, EXPR_INPUT, 0, None, &opts);
    check_candidates(atn, &c, &["VAR: ID EQUAL", "LET: ID EQUAL", "ID:"], &[]);

    // the whitespace after `var` sits before `c`
    let c = collect(atn, EXPR_INPUT, 1, None, &opts);
    check_candidates(atn, &c, &["ID: EQUAL"], &[]);

    let c = collect(atn, EXPR_INPUT, 2, None, &opts);
    check_candidates(atn, &c, &["ID: EQUAL"], &[]);

    let c = collect(atn, EXPR_INPUT, 4, None, &opts);
    check_candidates(atn, &c, &["EQUAL:"], &[]);

    let c = collect(atn, EXPR_INPUT, 6, None, &opts);
    check_candidates(atn, &c, &["ID:"], &[]);

    let c = collect(atn, EXPR_INPUT, 8, None, &opts);
    check_candidates(
        atn,
        &c,
        &[
            "PLUS:",
            "MINUS:",
            "MULTIPLY:",
            "DIVIDE:",
            "OPEN_PAR: CLOSE_PAR",
        ],
        &[],
    );
}

fn typical_options() -> CompletionOptions {
    let atn = &*EXPR_ATN;
    let mut opts = options_with(&["functionRef", "variableRef"], atn);
    opts.ignored_tokens = ["ID", "PLUS", "MINUS", "MULTIPLY", "DIVIDE", "EQUAL"]
        .iter()
        .map(|n| tok(atn, n))
        .collect();
    opts
}

#[test]
fn test_expr_typical_setup() {
    let atn = &*EXPR_ATN;
    let opts = typical_options();

    // following lists are cut at the first ignored token
    let c = collect(atn, EXPR_INPUT, 0, None, &opts);
    check_candidates(
        atn,
        &c,
        &["VAR:", "LET:"],
        &[
            "variableRef@0: expression simpleExpression",
            "functionRef@0: expression simpleExpression",
        ],
    );

    let c = collect(atn, EXPR_INPUT, 2, None, &opts);
    check_candidates(atn, &c, &[], &[]);

    let c = collect(atn, EXPR_INPUT, 4, None, &opts);
    check_candidates(atn, &c, &[], &[]);

    let c = collect(atn, EXPR_INPUT, 6, None, &opts);
    check_candidates(
        atn,
        &c,
        &[],
        &[
            "variableRef@6: expression assignment simpleExpression",
            "functionRef@6: expression assignment simpleExpression",
        ],
    );

    // only the function call can continue after `a`
    let c = collect(atn, EXPR_INPUT, 7, None, &opts);
    check_candidates(
        atn,
        &c,
        &[],
        &["functionRef@6: expression assignment simpleExpression"],
    );
}

#[test]
fn test_recursive_preferred_rule() {
    let atn = &*EXPR_ATN;
    let input = "VAR WS ID WS EQUAL WS ID WS PLUS WS ID";
    let mut opts = options_with(&["simpleExpression"], atn);

    let c = collect(atn, input, 6, None, &opts);
    check_candidates(atn, &c, &[], &["simpleExpression@6: expression assignment"]);

    // bottom-up reports the outermost expression
    let c = collect(atn, input, 10, None, &opts);
    check_candidates(atn, &c, &[], &["simpleExpression@6: expression assignment"]);

    opts.translate_rules_top_down = true;
    let c = collect(atn, input, 10, None, &opts);
    check_candidates(
        atn,
        &c,
        &[],
        &["simpleExpression@10: expression assignment simpleExpression"],
    );
}

#[test]
fn test_candidate_rules_with_different_start_tokens() {
    let atn = &*EXPR_ATN;
    let mut opts = options_with(&["assignment", "variableRef"], atn);
    opts.translate_rules_top_down = true;

    let c = collect(atn, EXPR_INPUT, 0, None, &opts);
    check_candidates(
        atn,
        &c,
        &["ID: OPEN_PAR CLOSE_PAR"],
        &[
            "assignment@0: expression",
            "variableRef@0: expression simpleExpression",
        ],
    );

    let c = collect(atn, EXPR_INPUT, 6, None, &opts);
    check_candidates(
        atn,
        &c,
        &[],
        &[
            "assignment@0: expression",
            "variableRef@6: expression assignment simpleExpression",
        ],
    );
}

#[test]
fn test_whitebox_optional_and_empty_rules() {
    let atn = &*WHITEBOX_ATN;
    let opts = CompletionOptions::default();
    let all = ["IPSUM:", "DOLOR:", "SIT:", "AMET:", "CONSECTETUR:"];

    let c = collect(atn, "LOREM", 1, Some("test1"), &opts);
    check_candidates(atn, &c, &all, &[]);

    let c = collect(atn, "LOREM", 1, Some("test2"), &opts);
    check_candidates(atn, &c, &all, &[]);

    let c = collect(atn, "LOREM", 1, Some("test3"), &opts);
    check_candidates(atn, &c, &["IPSUM:", "DOLOR:", "SIT:", "AMET:"], &[]);
}

#[test]
fn test_whitebox_shared_prefix() {
    let atn = &*WHITEBOX_ATN;
    let opts = CompletionOptions::default();

    for rule in ["test4", "test5", "test6", "test7"] {
        let c = collect(atn, "LOREM IPSUM", 2, Some(rule), &opts);
        check_candidates(atn, &c, &["DOLOR:"], &[]);
    }

    let c = collect(atn, "LOREM IPSUM", 2, Some("test8"), &opts);
    check_candidates(atn, &c, &["DOLOR: SIT"], &[]);

    let mut opts = CompletionOptions::default();
    opts.ignored_tokens.insert(tok(atn, "SIT"));
    let c = collect(atn, "LOREM IPSUM", 2, Some("test8"), &opts);
    check_candidates(atn, &c, &["DOLOR:"], &[]);
}

#[test]
fn test_whitebox_preferred_rules() {
    let atn = &*WHITEBOX_ATN;

    // rule3 swallows IPSUM and DOLOR, but is empty-able
    let opts = options_with(&["rule3"], atn);
    let c = collect(atn, "LOREM", 1, Some("test1"), &opts);
    check_candidates(
        atn,
        &c,
        &["SIT:", "AMET:", "CONSECTETUR:"],
        &["rule3@1: test1 rule1 rule2"],
    );

    let mut opts = options_with(&["rule2", "rule3"], atn);
    let c = collect(atn, "LOREM", 1, Some("test1"), &opts);
    check_candidates(atn, &c, &["CONSECTETUR:"], &["rule2@0: test1 rule1"]);

    opts.translate_rules_top_down = true;
    let c = collect(atn, "LOREM", 1, Some("test1"), &opts);
    check_candidates(
        atn,
        &c,
        &["CONSECTETUR:"],
        &["rule2@0: test1 rule1", "rule3@1: test1 rule1 rule2"],
    );
}

#[test]
fn test_hidden_tokens_and_context_start() {
    let atn = &*WHITEBOX_ATN;
    let opts = CompletionOptions::default();
    let all = ["IPSUM:", "DOLOR:", "SIT:", "AMET:", "CONSECTETUR:"];

    // caret on the hidden whitespace moves to the next visible token
    let c = collect(atn, "LOREM WS", 1, Some("test1"), &opts);
    check_candidates(atn, &c, &all, &[]);

    let c = collect(atn, "WS LOREM WS WS", 2, Some("test1"), &opts);
    check_candidates(atn, &c, &all, &[]);

    // context starting at the second token
    let stream = lex(atn, "IPSUM LOREM");
    let mut core = c3_parser::CodeCompletionCore::new(
        WHITEBOX_ATN.clone(),
        &stream,
        &c3_parser::AcceptAllPredicates,
    )
    .unwrap();
    let ctx = c3_parser::RuleContext::new(rule(atn, "test1"), 1);
    let c = core.collect_candidates(2, Some(&ctx)).unwrap();
    check_candidates(atn, &c, &all, &[]);
}

#[test]
fn test_precedence_climbing() {
    let atn = &*CALC_ATN;
    let opts = CompletionOptions::default();

    let c = collect(atn, "INT MUL", 2, Some("start"), &opts);
    check_candidates(atn, &c, &["INT:", "LPAREN:"], &[]);

    let c = collect(atn, "INT", 1, Some("start"), &opts);
    check_candidates(atn, &c, &["MUL:", "PLUS:", "EOF:"], &[]);

    // entered at precedence 2, only the tighter operator applies
    let c = collect(atn, "INT", 1, Some("mul_start"), &opts);
    check_candidates(atn, &c, &["MUL:", "EOF:"], &[]);

    let c = collect(atn, "LPAREN INT", 2, Some("start"), &opts);
    check_candidates(atn, &c, &["MUL:", "PLUS:", "RPAREN:"], &[]);
}

#[test]
fn test_ignored_tokens() {
    let atn = &*EXPR_ATN;
    let mut opts = CompletionOptions::default();
    opts.ignored_tokens.insert(tok(atn, "LET"));
    opts.ignored_tokens.insert(tok(atn, "EQUAL"));

    let c = collect(atn, EXPR_INPUT, 0, None, &opts);
    check_candidates(atn, &c, &["VAR: ID", "ID:"], &[]);
    check_token_names(atn, &c, &["ID", "VAR"]);
}
