//! End-to-end execution tests driven through the public API.

use rant::{Limits, Program, RunOptions, RuntimeErrorKind};

fn run(source: &str, seed: u64) -> String {
    let program = Program::compile(source).expect("pattern should compile");
    let result = program.run(&RunOptions::seeded(seed)).expect("run should succeed");
    result.main().to_string()
}

#[test]
fn repeater_with_separator() {
    for seed in 0..20 {
        assert_eq!(run(r"[rep:3][sep:,\s]{a}", seed), "a, a, a");
    }
}

#[test]
fn hex_groups_have_fixed_shape() {
    let shape = regex::Regex::new("^[0-9a-f]{8} [0-9a-f]{8} [0-9a-f]{8} [0-9a-f]{8}$").unwrap();
    for seed in 0..20 {
        let out = run(r"[rep:4][sep:\s]{\8,x}", seed);
        assert_eq!(out.len(), 35);
        assert!(shape.is_match(&out), "bad shape: {}", out);
    }
}

#[test]
fn deferred_send_is_patched_in() {
    let out = run(
        r#"The following word is [get:N] characters long: "[mark:a]X[mark:b]"[send:N;[dist:a;b]]"#,
        0,
    );
    assert_eq!(out, r#"The following word is 1 characters long: "X""#);
}

#[test]
fn verbal_number_format() {
    assert_eq!(run("[numfmt:verbal-en][num:1;1]", 0), "one");
    assert_eq!(run("[numfmt:verbal-en][num:123;123]", 0), "one hundred twenty-three");
}

#[test]
fn synchronized_blocks_emit_the_same_sequence() {
    let source = "[sync:x;ordered][rep:4][sep:,]{a|b|c}:[sync:x;ordered][rep:4][sep:,]{a|b|c}";
    for seed in 0..10 {
        assert_eq!(run(source, seed), "a,b,c,a:a,b,c,a");
    }
}

#[test]
fn runs_are_deterministic_per_seed() {
    let program =
        Program::compile(r"[rep:20][sep:-]{a|b|c|d} \8,x [num:1;100]").unwrap();
    for seed in 0..10 {
        let first = program.run(&RunOptions::seeded(seed)).unwrap();
        let second = program.run(&RunOptions::seeded(seed)).unwrap();
        assert_eq!(first.main(), second.main());
    }
}

#[test]
fn mark_distance_measures_characters() {
    assert_eq!(run("[mark:a]hello[mark:b][dist:a;b]", 0), "hello5");
}

#[test]
fn unset_mark_is_a_runtime_error() {
    let program = Program::compile("[mark:a][dist:a;b]").unwrap();
    let error = program.run(&RunOptions::seeded(0)).unwrap_err();
    assert!(matches!(error.kind, RuntimeErrorKind::UnknownMark { .. }));
}

#[test]
fn send_without_target_is_a_runtime_error() {
    let program = Program::compile("[send:nowhere;text]").unwrap();
    let error = program.run(&RunOptions::seeded(0)).unwrap_err();
    assert!(matches!(error.kind, RuntimeErrorKind::UnknownTarget { .. }));
}

#[test]
fn subroutines_bind_positional_parameters() {
    let out = run("$[pair:thing]{[@thing] and [@thing]}[$pair:cats]", 0);
    assert_eq!(out, "cats and cats");
}

#[test]
fn subroutine_scope_is_popped_after_the_call() {
    let program = Program::compile("$[say:w]{[@w]}[$say:hi][@w]").unwrap();
    let error = program.run(&RunOptions::seeded(0)).unwrap_err();
    assert!(matches!(error.kind, RuntimeErrorKind::UnknownVariable { .. }));
}

#[test]
fn undefined_subroutine_is_a_runtime_error() {
    let program = Program::compile("[$ghost]").unwrap();
    let error = program.run(&RunOptions::seeded(0)).unwrap_err();
    assert!(matches!(error.kind, RuntimeErrorKind::UnknownSubroutine { .. }));
}

#[test]
fn arithmetic_assigns_and_prints() {
    assert_eq!(run("[@x=2+3*4][@x]", 0), "14");
    assert_eq!(run("[@(2+3)*4]", 0), "20");
    assert_eq!(run("[@x=10][@x/4]", 0), "2.5");
}

#[test]
fn division_by_zero_is_a_runtime_error() {
    let program = Program::compile("[@1/0]").unwrap();
    let error = program.run(&RunOptions::seeded(0)).unwrap_err();
    assert!(matches!(error.kind, RuntimeErrorKind::DivisionByZero));
}

#[test]
fn conditionals_choose_branches() {
    assert_eq!(run("[@x=5][if:[@x>3];big;small]", 0), "big");
    assert_eq!(run("[@x=1][if:[@x>3];big;small]", 0), "small");
    assert_eq!(run("[if:true;yes]", 0), "yes");
    assert_eq!(run("[if:false;yes]", 0), "");
}

#[test]
fn replacer_rewrites_matches() {
    assert_eq!(run("%/a+/:baaanana;x%", 0), "bxnxnx");
    assert_eq!(run("%/A/i:banana;o%", 0), "bonono");
}

#[test]
fn replacer_supports_group_references() {
    assert_eq!(run("%/(an)/:banana;$1$1%", 0), "banananana");
}

#[test]
fn list_items_join_with_spaces() {
    assert_eq!(run("@(one;two;three)", 0), "one two three");
}

#[test]
fn capitalization_modes() {
    assert_eq!(run("[caps:upper]loud", 0), "LOUD");
    assert_eq!(run("[caps:word]hello there world", 0), "Hello There World");
    assert_eq!(run("[caps:sentence]one. two. three", 0), "One. Two. Three");
    assert_eq!(run("[caps:first]abc abc", 0), "Abc abc");
}

#[test]
fn capitalization_is_scoped_to_the_block() {
    assert_eq!(run("{[caps:upper]a}b", 0), "Ab");
}

#[test]
fn article_resolves_against_next_word() {
    assert_eq!(run(r"\a owl", 0), "an owl");
    assert_eq!(run(r"\a cat", 0), "a cat");
}

#[test]
fn public_channel_passes_through_and_is_recorded() {
    let program = Program::compile("[chan:notes;public;hello] main").unwrap();
    let result = program.run(&RunOptions::seeded(0)).unwrap();
    assert_eq!(result.main(), "hello main");
    assert_eq!(result.channel("notes"), Some("hello"));
}

#[test]
fn private_channel_never_appears() {
    let program = Program::compile("[chan:secret;private;hidden]shown").unwrap();
    let result = program.run(&RunOptions::seeded(0)).unwrap();
    assert_eq!(result.main(), "shown");
    assert_eq!(result.channel("secret"), None);
}

#[test]
fn internal_channel_flushes_into_parent() {
    let program = Program::compile("[chan:inner;internal;late]-early").unwrap();
    let result = program.run(&RunOptions::seeded(0)).unwrap();
    assert_eq!(result.main(), "late-early");
    assert_eq!(result.channel("inner"), None);
}

#[test]
fn step_budget_aborts_runaway_repeaters() {
    let program = Program::compile("[rep:100000]{a}").unwrap();
    let options = RunOptions {
        seed: Some(0),
        limits: Limits {
            max_steps: 1_000,
            ..Limits::default()
        },
        ..Default::default()
    };
    let error = program.run(&options).unwrap_err();
    assert!(matches!(error.kind, RuntimeErrorKind::StepBudget { .. }));
}

#[test]
fn output_budget_aborts_large_output() {
    let program = Program::compile("[rep:100]{abcdefghij}").unwrap();
    let options = RunOptions {
        seed: Some(0),
        limits: Limits {
            max_output: 50,
            ..Limits::default()
        },
        ..Default::default()
    };
    let error = program.run(&options).unwrap_err();
    assert!(matches!(error.kind, RuntimeErrorKind::OutputBudget { .. }));
}

#[test]
fn runtime_errors_carry_spans() {
    let source = "text [$ghost]";
    let program = Program::compile(source).unwrap();
    let error = program.run(&RunOptions::seeded(0)).unwrap_err();
    assert!(error.span.start >= 5);
    assert!(error.span.end <= source.len());
}
