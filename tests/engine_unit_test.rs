use tabcrunch::config::{Config, Delimiter, NumericFormat};
use tabcrunch::engine::Engine;
use tabcrunch::ops::parser::{parse, parse_with_groups};

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn run(cfg: &Config, spec: &[&str], input: &str) -> anyhow::Result<String> {
    let mut plan = parse(&args(spec))?;
    let mut engine = Engine::new(cfg, &mut plan);
    let mut out = Vec::new();
    engine.run(input.as_bytes(), &mut out)?;
    Ok(String::from_utf8(out).unwrap())
}

fn run_grouped(cfg: &Config, groups: &str, spec: &[&str], input: &str) -> anyhow::Result<String> {
    let mut plan = parse_with_groups(groups, &args(spec))?;
    let mut engine = Engine::new(cfg, &mut plan);
    let mut out = Vec::new();
    engine.run(input.as_bytes(), &mut out)?;
    Ok(String::from_utf8(out).unwrap())
}

#[test]
fn whole_input_is_one_group_without_keys() {
    let cfg = Config::default();
    let input = "1\n2\n3\n4\n5\n6\n7\n8\n9\n10\n";
    let got = run(&cfg, &["sum", "1", "mean", "1"], input).unwrap();
    assert_eq!(got, "55 5.5\n");
}

#[test]
fn grouped_sums_follow_input_order() {
    let cfg = Config::default();
    let got = run_grouped(&cfg, "1", &["sum", "2"], "A 10\nA 5\nB 9\nB 11\n").unwrap();
    assert_eq!(got, "A 15\nB 20\n");
}

#[test]
fn presorted_unsorted_input_groups_per_run() {
    // without sorting, non-contiguous keys close separate groups
    let cfg = Config::default();
    let got = run_grouped(&cfg, "1", &["sum", "2"], "A 10\nC 4\nA 5\n").unwrap();
    assert_eq!(got, "A 10\nC 4\nA 5\n");
}

#[test]
fn transpose_rectangular_input() {
    let cfg = Config::default();
    let got = run(&cfg, &["transpose"], "1 4\n2 5\n3 6\n").unwrap();
    assert_eq!(got, "1 2 3\n4 5 6\n");
}

#[test]
fn transpose_round_trip() {
    let cfg = Config::default();
    let input = "a b c\nd e f\n";
    let once = run(&cfg, &["transpose"], input).unwrap();
    let twice = run(&cfg, &["transpose"], &once).unwrap();
    assert_eq!(twice, input);
}

#[test]
fn transpose_ragged_needs_no_strict() {
    let mut cfg = Config::default();
    let err = run(&cfg, &["transpose"], "1 2\n3\n").unwrap_err().to_string();
    assert!(err.contains("transpose input error"), "{err}");

    cfg.strict = false;
    let got = run(&cfg, &["transpose"], "1 2\n3\n").unwrap();
    assert_eq!(got, "1 3\n2 N/A\n");
}

#[test]
fn crosstab_matrix_with_headers() {
    let cfg = Config {
        header_in: true,
        header_out: true,
        ..Config::default()
    };
    let input = "x y v\na p 1\na q 2\nb p 3\nb q 4\n";
    let got = run(&cfg, &["crosstab", "1,2", "sum", "3"], input).unwrap();
    assert_eq!(got, " p q\na 1 2\nb 3 4\n");
}

#[test]
fn crosstab_missing_cell_uses_filler() {
    let cfg = Config::default();
    let input = "a p 1\nb q 4\n";
    let got = run(&cfg, &["crosstab", "1,2", "sum", "3"], input).unwrap();
    assert_eq!(got, " p q\na 1 N/A\nb N/A 4\n");
}

#[test]
fn named_columns_resolve_through_header() {
    let cfg = Config {
        header_in: true,
        ..Config::default()
    };
    let input = "k\n1\n1\n2\n3\n3\n3\n";
    let got = run(&cfg, &["groupby", "k", "count", "k", "mode", "k"], input).unwrap();
    assert_eq!(got, "1 2 1\n2 1 2\n3 3 3\n");
}

#[test]
fn unknown_column_name_is_reported() {
    let cfg = Config {
        header_in: true,
        ..Config::default()
    };
    let err = run(&cfg, &["groupby", "nope", "count", "nope"], "k\n1\n")
        .unwrap_err()
        .to_string();
    assert!(err.contains("column name 'nope' not found"), "{err}");
}

#[test]
fn percentile_by_interpolation() {
    let cfg = Config::default();
    let got = run(&cfg, &["perc:90", "1"], "2.5\n3.5\n5\n7\n9\n").unwrap();
    assert_eq!(got, "8.2\n");
}

#[test]
fn countunique_honors_case_flag() {
    let input = "a\na\nA\nb\n";

    let cfg = Config::default();
    assert_eq!(run(&cfg, &["countunique", "1"], input).unwrap(), "3\n");

    let cfg = Config {
        case_insensitive: true,
        ..Config::default()
    };
    assert_eq!(run(&cfg, &["countunique", "1"], input).unwrap(), "2\n");
}

#[test]
fn case_insensitive_grouping_merges_keys() {
    let cfg = Config {
        case_insensitive: true,
        ..Config::default()
    };
    let got = run_grouped(&cfg, "1", &["sum", "2"], "a 1\nA 2\n").unwrap();
    assert_eq!(got, "a 3\n");
}

#[test]
fn header_out_synthesizes_names() {
    let cfg = Config {
        header_out: true,
        ..Config::default()
    };
    let got = run_grouped(&cfg, "1", &["sum", "2"], "A 10\n").unwrap();
    assert_eq!(got, "GroupBy(field-1) sum(field-2)\nA 10\n");
}

#[test]
fn header_out_includes_op_parameters() {
    let cfg = Config {
        header_in: true,
        header_out: true,
        ..Config::default()
    };
    let got = run(&cfg, &["perc:40", "score"], "score\n10\n20\n").unwrap();
    assert!(got.starts_with("perc:40(score)\n"), "{got}");
}

#[test]
fn header_only_input_emits_only_header_row() {
    let cfg = Config {
        header_in: true,
        header_out: true,
        ..Config::default()
    };
    let got = run(&cfg, &["groupby", "x", "sum", "y"], "x y\n").unwrap();
    assert_eq!(got, "GroupBy(x) sum(y)\n");
}

#[test]
fn empty_input_produces_no_output() {
    let cfg = Config {
        header_in: true,
        header_out: true,
        ..Config::default()
    };
    let got = run(&cfg, &["groupby", "1", "sum", "2"], "").unwrap();
    assert_eq!(got, "");
}

#[test]
fn full_line_keeps_the_extremal_record() {
    let cfg = Config {
        full_line: true,
        ..Config::default()
    };
    let got = run_grouped(&cfg, "1", &["min", "2"], "A 9 x\nA 3 y\nA 5 z\n").unwrap();
    assert_eq!(got, "A 3 y 3\n");
}

#[test]
fn strict_mode_rejects_short_records() {
    let cfg = Config::default();
    let err = run(&cfg, &["sum", "2"], "1 2\n3\n").unwrap_err().to_string();
    assert_eq!(
        err,
        "invalid input: field 2 requested, line 2 has only 1 fields"
    );
}

#[test]
fn non_strict_mode_fills_missing_fields() {
    let cfg = Config {
        strict: false,
        ..Config::default()
    };
    let got = run(&cfg, &["last", "2"], "a 1\nb\n").unwrap();
    assert_eq!(got, "N/A\n");
}

#[test]
fn invalid_numeric_input_is_fatal() {
    let cfg = Config::default();
    let err = run(&cfg, &["sum", "1"], "1\npear\n").unwrap_err().to_string();
    assert_eq!(err, "invalid numeric input in line 2 field 1: 'pear'");
}

#[test]
fn narm_skips_unparseable_values() {
    let cfg = Config {
        narm: true,
        ..Config::default()
    };
    let got = run(&cfg, &["sum", "1", "count", "1"], "1\nNA\n3\n").unwrap();
    // count is textual and unaffected by numeric filtering
    assert_eq!(got, "4 3\n");
}

#[test]
fn narm_skips_both_halves_of_a_pair() {
    let cfg = Config {
        narm: true,
        ..Config::default()
    };
    let input = "1 2\nNA 5\n2 4\n3 6\n";
    let got = run(&cfg, &["ppearson", "1:2"], input).unwrap();
    assert_eq!(got, "1\n");
}

#[test]
fn pair_symmetry() {
    let cfg = Config::default();
    let input = "1 5\n2 9\n3 4\n4 7\n";
    let a = run(&cfg, &["pcov", "1:2"], input).unwrap();
    let b = run(&cfg, &["pcov", "2:1"], input).unwrap();
    assert_eq!(a, b);
}

#[test]
fn reverse_fields_and_identity() {
    let cfg = Config::default();
    let got = run(&cfg, &["reverse"], "1 2 3\n4 5 6\n").unwrap();
    assert_eq!(got, "3 2 1\n6 5 4\n");

    let twice = run(&cfg, &["reverse"], &got).unwrap();
    assert_eq!(twice, "1 2 3\n4 5 6\n");
}

#[test]
fn rmdup_keeps_first_occurrence_and_is_idempotent() {
    let cfg = Config::default();
    let input = "a 1\nb 2\na 3\nc 4\nb 5\n";
    let once = run(&cfg, &["rmdup", "1"], input).unwrap();
    assert_eq!(once, "a 1\nb 2\nc 4\n");

    let twice = run(&cfg, &["rmdup", "1"], &once).unwrap();
    assert_eq!(twice, once);
}

#[test]
fn check_reports_shape() {
    let cfg = Config::default();
    let got = run(&cfg, &["check"], "1 2\n3 4\n5 6\n").unwrap();
    assert_eq!(got, "3 lines, 2 fields\n");

    let got = run(&cfg, &["check"], "1 2\n").unwrap();
    assert_eq!(got, "1 line, 2 fields\n");

    let err = run(&cfg, &["check"], "1 2\n3\n").unwrap_err().to_string();
    assert!(err.contains("check failed: line 2 has 1 fields"), "{err}");

    let err = run(&cfg, &["check", "5", "lines"], "1\n2\n")
        .unwrap_err()
        .to_string();
    assert!(err.contains("input had 2 lines (expecting 5)"), "{err}");

    let err = run(&cfg, &["check", "3", "fields"], "1 2\n")
        .unwrap_err()
        .to_string();
    assert!(err.contains("has 2 fields (expecting 3)"), "{err}");
}

#[test]
fn per_line_transforms_emit_one_row_per_record() {
    let cfg = Config::default();
    let got = run(&cfg, &["md5", "1"], "hello\nworld\n").unwrap();
    assert_eq!(
        got,
        "5d41402abc4b2a76b9719d911017c592\n7d793037a0760186574b0282f2f435e7\n"
    );
}

#[test]
fn per_line_cut_selects_fields() {
    let cfg = Config::default();
    let got = run(&cfg, &["cut", "2,1"], "a b\nc d\n").unwrap();
    assert_eq!(got, "b a\nd c\n");
}

#[test]
fn comment_lines_are_ignored() {
    let cfg = Config {
        skip_comments: true,
        ..Config::default()
    };
    let got = run(&cfg, &["sum", "1"], "# header\n1\n ; note\n2\n").unwrap();
    assert_eq!(got, "3\n");
}

#[test]
fn single_byte_delimiter_and_empty_fields() {
    let cfg = Config {
        delimiter: Delimiter::Byte(b','),
        out_delimiter: b',',
        ..Config::default()
    };
    let got = run_grouped(&cfg, "1", &["count", "2"], "a,1\na,\nb,3\n").unwrap();
    assert_eq!(got, "a,2\nb,1\n");
}

#[test]
fn zero_terminated_records() {
    let cfg = Config {
        eol: 0,
        ..Config::default()
    };
    let got = run_grouped(&cfg, "1", &["sum", "2"], "A 1\0A 2\0").unwrap();
    assert_eq!(got, "A 3\0");
}

#[test]
fn output_delimiter_override() {
    let cfg = Config {
        out_delimiter: b'|',
        ..Config::default()
    };
    let got = run_grouped(&cfg, "1", &["sum", "2"], "A 1\nA 2\n").unwrap();
    assert_eq!(got, "A|3\n");
}

#[test]
fn rounding_applies_to_numeric_output() {
    let cfg = Config {
        format: NumericFormat::Fixed { decimals: 2 },
        ..Config::default()
    };
    let got = run(&cfg, &["mean", "1"], "1\n2\n").unwrap();
    assert_eq!(got, "1.50\n");
}

#[test]
fn skurt_of_tiny_group_is_nan() {
    let cfg = Config::default();
    let got = run(&cfg, &["skurt", "1"], "1\n2\n3\n").unwrap();
    assert_eq!(got, "nan\n");
}

#[test]
fn percentile_of_single_record_group() {
    let cfg = Config::default();
    let got = run(&cfg, &["perc:5", "1", "perc:95", "1"], "42\n").unwrap();
    assert_eq!(got, "42 42\n");
}

#[test]
fn collapse_preserves_insertion_order_per_group() {
    let cfg = Config::default();
    let got = run_grouped(
        &cfg,
        "1",
        &["collapse", "2", "unique", "2"],
        "x b\nx a\nx b\ny z\n",
    )
    .unwrap();
    assert_eq!(got, "x b,a,b a,b\ny z z\n");
}

#[test]
fn noop_echoes_only_with_full() {
    let mut cfg = Config::default();
    assert_eq!(run(&cfg, &["noop"], "1 2\n").unwrap(), "");

    cfg.full_line = true;
    assert_eq!(run(&cfg, &["noop"], "1 2\n").unwrap(), "1 2\n");
}

#[test]
fn seeded_rand_is_deterministic() {
    let cfg = Config {
        seed: Some(7),
        ..Config::default()
    };
    let input = "a\nb\nc\nd\ne\n";
    let first = run(&cfg, &["rand", "1"], input).unwrap();
    let second = run(&cfg, &["rand", "1"], input).unwrap();
    assert_eq!(first, second);
    assert!(["a\n", "b\n", "c\n", "d\n", "e\n"].contains(&first.as_str()));
}
