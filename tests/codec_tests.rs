//! Binary round-trip: structural equality and behavioral equivalence of
//! saved and reloaded programs.

use rant::{Dictionary, LoadError, Program, RunOptions};

const PATTERNS: &[&str] = &[
    "plain text with spaces",
    "{a|b|c}",
    "{(2)a|(0.5)b|c}",
    r"[rep:4][sep:,\s]{x|y}",
    r"{\8,x}\a owl",
    "[@x=2+3][@x][if:[@x>4];big;small]",
    "$[greet:name]{hello [@name]}[$greet:world]",
    "@(a;b;c)%/a+/i:banana;x%",
    "<noun-animal.plural?/^.a/(1-2)::=w>",
    "[chan:side;public;note][mark:a]text[mark:b][dist:a;b]",
    "[numfmt:verbal-en][num:3;3] `verbatim {x}` [caps:word]done",
];

#[test]
fn serialized_programs_round_trip_structurally() {
    for source in PATTERNS {
        let program = Program::compile(source).unwrap();
        let bytes = program.save();
        let reloaded = Program::load(&bytes).unwrap();
        assert_eq!(*program.root, *reloaded.root, "structural drift for {}", source);
    }
}

#[test]
fn reloaded_programs_produce_identical_output() {
    let dict = Dictionary::builtin();
    for source in PATTERNS {
        let program = Program::compile(source).unwrap();
        let reloaded = Program::load(&program.save()).unwrap();
        for seed in 0..10 {
            let options = RunOptions {
                seed: Some(seed),
                dictionary: Some(&dict),
                ..Default::default()
            };
            let original = program.run(&options).unwrap();
            let options = RunOptions {
                seed: Some(seed),
                dictionary: Some(&dict),
                ..Default::default()
            };
            let restored = reloaded.run(&options).unwrap();
            assert_eq!(
                original.main(),
                restored.main(),
                "behavioral drift for {} seed {}",
                source,
                seed
            );
        }
    }
}

#[test]
fn double_round_trip_is_stable() {
    for source in PATTERNS {
        let program = Program::compile(source).unwrap();
        let once = program.save();
        let twice = Program::load(&once).unwrap().save();
        assert_eq!(once, twice, "byte drift for {}", source);
    }
}

#[test]
fn query_round_trip_matches_original_behavior() {
    let dict = Dictionary::builtin();
    let program = Program::compile("<noun-animal.plural>").unwrap();
    let reloaded = Program::load(&program.save()).unwrap();
    for seed in 0..20 {
        let options = RunOptions {
            seed: Some(seed),
            dictionary: Some(&dict),
            ..Default::default()
        };
        let a = program.run(&options).unwrap();
        let options = RunOptions {
            seed: Some(seed),
            dictionary: Some(&dict),
            ..Default::default()
        };
        let b = reloaded.run(&options).unwrap();
        assert_eq!(a.main(), b.main());
    }
}

#[test]
fn magic_header_is_present() {
    let program = Program::compile("x").unwrap();
    let bytes = program.save();
    assert_eq!(&bytes[..4], b"RPGM");
}

#[test]
fn bad_magic_is_rejected() {
    let program = Program::compile("x").unwrap();
    let mut bytes = program.save();
    bytes[0] = b'X';
    assert!(matches!(Program::load(&bytes), Err(LoadError::BadMagic)));
}

#[test]
fn empty_input_is_rejected() {
    assert!(matches!(Program::load(&[]), Err(LoadError::BadMagic)));
}

#[test]
fn truncated_program_is_rejected() {
    let program = Program::compile("some longer pattern {a|b}").unwrap();
    let bytes = program.save();
    for cut in [5, bytes.len() / 2, bytes.len() - 1] {
        assert!(
            matches!(Program::load(&bytes[..cut]), Err(LoadError::UnexpectedEof)),
            "cut at {} not rejected",
            cut
        );
    }
}

#[test]
fn save_and_load_through_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("greeting.rpgm");

    let program = Program::compile("[rep:2][sep:-]{hi}").unwrap();
    program.save_file(&path).unwrap();

    let reloaded = Program::load_file(&path).unwrap();
    assert_eq!(reloaded.name, "greeting");
    assert_eq!(reloaded.origin, rant::ProgramOrigin::File);

    let result = reloaded.run(&RunOptions::seeded(1)).unwrap();
    assert_eq!(result.main(), "hi-hi");
}

#[test]
fn loaded_programs_have_stream_origin_and_no_source() {
    let program = Program::compile("abc").unwrap();
    let reloaded = Program::load(&program.save()).unwrap();
    assert_eq!(reloaded.origin, rant::ProgramOrigin::Stream);
    assert!(reloaded.source.is_none());
    assert_eq!(reloaded.name, "stream");
}
