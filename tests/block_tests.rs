//! Block evaluation: separators, iteration probes, weights, selectors.

use rant::{Program, RunOptions};

fn run(source: &str, seed: u64) -> String {
    let program = Program::compile(source).expect("pattern should compile");
    let result = program.run(&RunOptions::seeded(seed)).expect("run should succeed");
    result.main().to_string()
}

#[test]
fn separator_fires_strictly_between_iterations() {
    for k in 1..=8 {
        let source = format!("[rep:{}][sep:;]{{a}}", k);
        for seed in 0..5 {
            let out = run(&source, seed);
            assert_eq!(out.matches(';').count(), k - 1, "k={} out={}", k, out);
            assert!(!out.starts_with(';'));
            assert!(!out.ends_with(';'));
        }
    }
}

#[test]
fn zero_rep_produces_nothing() {
    assert_eq!(run("[rep:0][sep:;]{a}", 0), "");
}

#[test]
fn before_and_after_wrap_each_iteration() {
    assert_eq!(run("[rep:2][before:(][after:)]{a}", 0), "(a)(a)");
}

#[test]
fn repnum_is_one_based() {
    assert_eq!(run("[rep:4][sep:,]{[repnum]}", 0), "1,2,3,4");
}

#[test]
fn first_and_last_probes() {
    assert_eq!(run("[rep:3]{[first:(]a[last:)]}", 0), "(aaa)");
}

#[test]
fn even_odd_probes() {
    assert_eq!(run("[rep:4][sep:,]{[even:e][odd:o]}", 0), "o,e,o,e");
}

#[test]
fn notlast_probe() {
    assert_eq!(run("[rep:3]{a[notlast:-]}", 0), "a-a-a");
}

#[test]
fn nth_with_and_without_offset() {
    assert_eq!(run("[rep:6][sep:,]{[nth:3;x]}", 0), "x,,,x,,");
    assert_eq!(run("[rep:6][sep:,]{[nth:3;1;x]}", 0), ",x,,,x,");
}

#[test]
fn separators_can_be_whole_patterns() {
    let out = run(r"[rep:3][sep:{,|;}\s]{a}", 0);
    assert_eq!(out.len(), 7, "unexpected shape: {}", out);
    assert_eq!(out.matches('a').count(), 3);
}

#[test]
fn pending_attributes_are_consumed_by_one_block() {
    // The second block is not a repeater; [rep] armed only the first.
    assert_eq!(run("[rep:3]{a}{b}", 0), "aaab");
}

#[test]
fn zero_weight_branch_is_never_selected() {
    for seed in 0..40 {
        let out = run("[rep:10]{(0)x|y}", seed);
        assert_eq!(out, "yyyyyyyyyy");
    }
}

#[test]
fn heavy_weight_dominates() {
    // With weight 1000 vs 1, seeing zero heavy picks over 20 draws across
    // many seeds would be astronomically unlikely.
    let mut heavy = 0usize;
    let mut total = 0usize;
    for seed in 0..20 {
        let out = run("[rep:20]{(1000)h|l}", seed);
        heavy += out.matches('h').count();
        total += 20;
    }
    assert!(heavy as f64 / total as f64 > 0.9);
}

#[test]
fn ordered_selector_cycles_in_order() {
    assert_eq!(run("[sel:ordered][rep:7][sep:,]{a|b|c}", 0), "a,b,c,a,b,c,a");
}

#[test]
fn ping_pong_selector_bounces() {
    assert_eq!(run("[sel:ping-pong][rep:6]{a|b|c}", 0), "abcbab");
}

#[test]
fn locked_selector_repeats_one_branch() {
    for seed in 0..20 {
        let out = run("[sel:locked][rep:8]{a|b|c|d}", seed);
        let first = out.chars().next().unwrap();
        assert!(out.chars().all(|c| c == first), "not locked: {}", out);
    }
}

#[test]
fn no_repeat_selector_never_repeats_adjacently() {
    for seed in 0..30 {
        let out = run("[sel:no-repeat][rep:30]{a|b}", seed);
        for pair in out.as_bytes().windows(2) {
            assert_ne!(pair[0], pair[1], "repeat in {}", out);
        }
    }
}

#[test]
fn rand_shuffle_covers_all_branches_each_cycle() {
    for seed in 0..30 {
        let out = run("[sel:rand-shuffle][rep:9]{a|b|c}", seed);
        for cycle in out.as_bytes().chunks(3) {
            let mut sorted = cycle.to_vec();
            sorted.sort_unstable();
            assert_eq!(sorted, b"abc", "bad cycle in {}", out);
        }
    }
}

#[test]
fn rand_shuffle_has_no_boundary_repeats() {
    for seed in 0..30 {
        let out = run("[sel:rand-shuffle][rep:12]{a|b|c}", seed);
        let bytes = out.as_bytes();
        for boundary in [3, 6, 9] {
            assert_ne!(bytes[boundary - 1], bytes[boundary], "boundary repeat in {}", out);
        }
    }
}

#[test]
fn cdeck_replays_the_same_cycle() {
    for seed in 0..20 {
        let out = run("[sel:cdeck][rep:8]{a|b|c|d}", seed);
        assert_eq!(out[..4], out[4..], "cdeck drifted: {}", out);
    }
}

#[test]
fn synced_blocks_with_different_shapes_rebind() {
    // Three branches, then four: the synchronizer rebinds on shape change.
    let out = run(
        "[sync:s;ordered]{a|b|c}[sync:s;ordered]{w|x|y|z}",
        0,
    );
    assert_eq!(out, "aw");
}

#[test]
fn locked_synchronizer_matches_across_blocks() {
    for seed in 0..20 {
        let out = run("[sync:k;locked]{a|b|c}-[sync:k;locked]{a|b|c}", seed);
        let (left, right) = out.split_once('-').unwrap();
        assert_eq!(left, right);
    }
}

#[test]
fn nested_blocks_keep_their_own_state() {
    let out = run("[rep:2][sep:,]{x[rep:2]{y}}", 0);
    assert_eq!(out, "xyy,xyy");
}
