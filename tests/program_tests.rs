//! Program surface: names, arguments, channels, registry discovery, and
//! runtime defenses for programs loaded from untrusted bytes.

use std::rc::Rc;

use rant::rst::{Rst, RstKind};
use rant::{
    canonicalize, ArgsSchema, FunctionRegistry, Program, ProgramArgs, RunOptions,
    RuntimeErrorKind, Span,
};

#[test]
fn compile_canonicalizes_the_name() {
    let program = Program::compile_named("x", " stories / animals ").unwrap();
    assert_eq!(program.name, "stories/animals");
}

#[test]
fn invalid_name_fails_compilation() {
    let error = Program::compile_named("x", "bad?name").unwrap_err();
    assert!(error.diagnostics.iter().any(|d| d.code == "invalid-name"));
}

#[test]
fn canonical_names_are_fixed_points() {
    for name in ["a", "a/b", " a / b ", "deep/er/path"] {
        let canonical = canonicalize(name).unwrap();
        assert_eq!(canonicalize(&canonical).unwrap(), canonical);
    }
}

#[test]
fn program_args_are_visible_as_variables() {
    let program = Program::compile("hello [@name], you seem [@mood]").unwrap();
    let mut args = ProgramArgs::new();
    args.set("name", "Avery").set("mood", "ready");
    let options = RunOptions {
        seed: Some(0),
        args: Some(&args),
        ..Default::default()
    };
    let result = program.run(&options).unwrap();
    assert_eq!(result.main(), "hello Avery, you seem ready");
}

#[test]
fn schema_built_args_use_aliases() {
    let schema = ArgsSchema::new().aliased_field("display_name", "name");
    let args = schema.build(&["Rook"]);

    let program = Program::compile("[@name]").unwrap();
    let options = RunOptions {
        seed: Some(0),
        args: Some(&args),
        ..Default::default()
    };
    assert_eq!(program.run(&options).unwrap().main(), "Rook");
}

#[test]
fn missing_argument_is_a_runtime_error() {
    let program = Program::compile("[@name]").unwrap();
    let error = program.run(&RunOptions::seeded(0)).unwrap_err();
    assert!(matches!(error.kind, RuntimeErrorKind::UnknownVariable { .. }));
}

#[test]
fn run_result_lists_all_public_channels() {
    let program =
        Program::compile("[chan:a;public;alpha][chan:b;private;beta]main").unwrap();
    let result = program.run(&RunOptions::seeded(0)).unwrap();
    let names: Vec<&str> = result.channels().map(|(name, _)| name).collect();
    assert_eq!(names, vec!["main", "a"]);
}

#[test]
fn modules_record_subroutine_definitions() {
    let program = Program::compile("$[word]{cat}$[phrase]{a [$word]}").unwrap();
    let modules = program.modules.as_ref().unwrap();
    assert!(modules.contains_key("word"));
    assert!(modules.contains_key("phrase"));
}

#[test]
fn patterns_without_subroutines_have_no_module_table() {
    let program = Program::compile("plain").unwrap();
    assert!(program.modules.is_none());
}

#[test]
fn registry_discovery_api() {
    let registry = FunctionRegistry::with_builtins();

    assert!(registry.exists("rep"));
    assert!(registry.exists("R"));
    assert!(!registry.exists("nope"));

    assert!(registry.names().contains(&"numfmt"));
    assert!(registry.names_and_aliases().contains(&"rn"));
    assert_eq!(registry.aliases("sync"), vec!["x"]);

    let description = registry.description("sep", 1).unwrap();
    assert!(description.contains("separator"));
    assert!(registry.description("sep", 2).is_none());
}

#[test]
fn custom_registries_are_checked_at_compile_time() {
    let registry = FunctionRegistry::new();
    let error = Program::compile_with("[rep:1]{a}", "p", &registry).unwrap_err();
    assert!(error.diagnostics.iter().any(|d| d.code == "unknown-function"));
}

/// Build and reload a program whose root is a bare `Tag` node with text
/// arguments, the way a hand-crafted `.rpgm` file could encode one. Such a
/// node bypasses every compile-time check and parser special case, so it
/// always dispatches through the registry at run time.
fn loaded_tag_program(name: &str, args: &[&str]) -> Program {
    let args = args
        .iter()
        .map(|text| Rc::new(Rst::new(Span::default(), RstKind::Text((*text).to_string()))))
        .collect();
    let root = Rst::new(
        Span::new(0, 6),
        RstKind::Tag {
            name: name.to_string(),
            args,
        },
    );
    let bytes = rant::codec::serialize_program(&root);
    Program::load(&bytes).unwrap()
}

#[test]
fn loaded_tag_with_unknown_function_errors_at_runtime() {
    // Compile-time checks cannot vouch for hand-crafted program files.
    let program = loaded_tag_program("mystery", &[]);
    let error = program.run(&RunOptions::seeded(0)).unwrap_err();
    assert!(matches!(error.kind, RuntimeErrorKind::UnknownFunction { .. }));
}

#[test]
fn loaded_tag_with_wrong_arity_errors_at_runtime() {
    let program = loaded_tag_program("rep", &["1", "2"]);
    let error = program.run(&RunOptions::seeded(0)).unwrap_err();
    assert!(matches!(error.kind, RuntimeErrorKind::WrongArity { .. }));
}

#[test]
fn loaded_if_tag_dispatches_through_the_registry() {
    // The parser compiles `[if:…]` into a dedicated node; a bare tag only
    // exists in loaded programs and must run through the registry handler.
    let program = loaded_tag_program("if", &["true", "yes"]);
    assert_eq!(program.run(&RunOptions::seeded(0)).unwrap().main(), "yes");

    let program = loaded_tag_program("if", &["false", "yes", "no"]);
    assert_eq!(program.run(&RunOptions::seeded(0)).unwrap().main(), "no");

    let program = loaded_tag_program("if", &["false", "yes"]);
    assert_eq!(program.run(&RunOptions::seeded(0)).unwrap().main(), "");
}

#[test]
fn loaded_chan_tag_dispatches_through_the_registry() {
    let program = loaded_tag_program("chan", &["side", "public", "hello"]);
    let result = program.run(&RunOptions::seeded(0)).unwrap();
    assert_eq!(result.main(), "hello");
    assert_eq!(result.channel("side"), Some("hello"));

    let program = loaded_tag_program("chan", &["scratch", "private", "hidden"]);
    let result = program.run(&RunOptions::seeded(0)).unwrap();
    assert_eq!(result.main(), "");
    assert_eq!(result.channel("scratch"), None);
}

#[test]
fn loaded_chan_tag_rejects_bad_visibility() {
    let program = loaded_tag_program("chan", &["side", "sideways", "x"]);
    let error = program.run(&RunOptions::seeded(0)).unwrap_err();
    assert!(matches!(error.kind, RuntimeErrorKind::InvalidArgument { .. }));
}

#[test]
fn one_program_many_runs() {
    let program = Program::compile("[rep:3]{a|b}").unwrap();
    let baseline = program.run(&RunOptions::seeded(7)).unwrap();
    for _ in 0..5 {
        let again = program.run(&RunOptions::seeded(7)).unwrap();
        assert_eq!(baseline, again);
    }
}

#[test]
fn different_seeds_eventually_differ() {
    let program = Program::compile(r"[rep:16]{a|b|c|d}").unwrap();
    let reference = program.run(&RunOptions::seeded(0)).unwrap().main().to_string();
    let mut any_different = false;
    for seed in 1..10 {
        if program.run(&RunOptions::seeded(seed)).unwrap().main() != reference {
            any_different = true;
        }
    }
    assert!(any_different);
}

#[test]
fn compile_error_display_reports_the_first_error() {
    let error = Program::compile("[ghost]").unwrap_err();
    let rendered = error.to_string();
    assert!(rendered.contains("ghost"), "unhelpful message: {}", rendered);
}

#[test]
fn diagnostics_render_with_source_context() {
    let error = Program::compile("ok [ghost] rest").unwrap_err();
    let diagnostic = error.diagnostics.iter().find(|d| d.is_error()).unwrap();
    let rendered = diagnostic.display_with_source("ok [ghost] rest");
    assert!(rendered.contains("^"));
    assert!(rendered.contains("ok [ghost] rest"));
}
