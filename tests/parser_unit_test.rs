use tabcrunch::ops::kernel::OpParams;
use tabcrunch::ops::parser::{parse, parse_with_groups};
use tabcrunch::ops::{Mode, OpKind};

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[test]
fn plain_operation_implies_groupby() {
    let plan = parse(&args(&["sum", "1", "mean", "2"])).unwrap();
    assert_eq!(plan.mode, Mode::GroupBy);
    assert!(plan.groups.is_empty());
    assert_eq!(plan.ops.len(), 2);
    assert_eq!(plan.ops[0].kind, OpKind::Sum);
    assert_eq!(plan.ops[0].field, 1);
    assert_eq!(plan.ops[1].kind, OpKind::Mean);
    assert_eq!(plan.ops[1].field, 2);
}

#[test]
fn groupby_mode_with_columns() {
    let plan = parse(&args(&["groupby", "1,4", "sum", "2"])).unwrap();
    assert_eq!(plan.mode, Mode::GroupBy);
    assert_eq!(plan.groups.len(), 2);
    assert_eq!(plan.groups[0].num, 1);
    assert_eq!(plan.groups[1].num, 4);
}

#[test]
fn mode_aliases() {
    assert_eq!(parse(&args(&["gb", "1", "count", "1"])).unwrap().mode, Mode::GroupBy);
    assert_eq!(parse(&args(&["dedup", "2"])).unwrap().mode, Mode::RemoveDups);
    assert_eq!(parse(&args(&["nop"])).unwrap().mode, Mode::Noop);
    assert_eq!(parse(&args(&["Transpose"])).unwrap().mode, Mode::Transpose);
}

#[test]
fn field_range_expands() {
    let plan = parse(&args(&["sum", "2-4"])).unwrap();
    let fields: Vec<usize> = plan.ops.iter().map(|op| op.field).collect();
    assert_eq!(fields, vec![2, 3, 4]);
    assert!(plan.ops.iter().all(|op| op.kind == OpKind::Sum));
}

#[test]
fn comma_list_and_range_mix() {
    let plan = parse(&args(&["max", "1,3-5,7"])).unwrap();
    let fields: Vec<usize> = plan.ops.iter().map(|op| op.field).collect();
    assert_eq!(fields, vec![1, 3, 4, 5, 7]);
}

#[test]
fn inverted_range_is_rejected() {
    let err = parse(&args(&["sum", "5-2"])).unwrap_err().to_string();
    assert!(err.contains("invalid field range"), "{err}");
}

#[test]
fn pair_links_slave_to_master() {
    let plan = parse(&args(&["pcov", "2:6"])).unwrap();
    assert_eq!(plan.ops.len(), 2);
    assert!(plan.ops[0].slave);
    assert_eq!(plan.ops[0].field, 2);
    assert!(plan.ops[1].master);
    assert_eq!(plan.ops[1].field, 6);
    assert_eq!(plan.ops[1].slave_idx, 0);
}

#[test]
fn pair_required_for_paired_kinds() {
    let err = parse(&args(&["ppearson", "2"])).unwrap_err().to_string();
    assert!(err.contains("requires field pairs"), "{err}");

    let err = parse(&args(&["sum", "1:2"])).unwrap_err().to_string();
    assert!(err.contains("cannot use pair of fields"), "{err}");
}

#[test]
fn percentile_parameter() {
    let plan = parse(&args(&["perc:40", "1"])).unwrap();
    assert_eq!(plan.ops[0].params, OpParams::Percentile(40));

    // default
    let plan = parse(&args(&["perc", "1"])).unwrap();
    assert_eq!(plan.ops[0].params, OpParams::Percentile(95));

    let err = parse(&args(&["perc:0", "1"])).unwrap_err().to_string();
    assert!(err.contains("invalid percentile"), "{err}");
    let err = parse(&args(&["perc:101", "1"])).unwrap_err().to_string();
    assert!(err.contains("invalid percentile"), "{err}");
}

#[test]
fn trimmean_parameter_bounds() {
    let plan = parse(&args(&["trimmean:0.25", "1"])).unwrap();
    assert_eq!(plan.ops[0].params, OpParams::TrimFraction(0.25));

    let err = parse(&args(&["trimmean:0.6", "1"])).unwrap_err().to_string();
    assert!(err.contains("invalid trim mean value"), "{err}");
}

#[test]
fn whitespace_stops_parameter_list() {
    // 'perc:10: 4' must not read 4 as a second parameter
    let err = parse(&args(&["perc:10:", "4"])).unwrap_err().to_string();
    assert!(err.contains("missing parameter"), "{err}");
}

#[test]
fn extra_parameters_are_rejected() {
    let err = parse(&args(&["sum:3", "1"])).unwrap_err().to_string();
    assert!(err.contains("too many parameters"), "{err}");

    let err = parse(&args(&["bin:10:20", "1"])).unwrap_err().to_string();
    assert!(err.contains("too many parameters"), "{err}");
}

#[test]
fn strbin_zero_bucket_is_rejected() {
    let err = parse(&args(&["strbin:0", "1"])).unwrap_err().to_string();
    assert!(err.contains("strbin bucket size must not be zero"), "{err}");
}

#[test]
fn getnum_types() {
    let plan = parse(&args(&["getnum:h", "1"])).unwrap();
    assert!(matches!(plan.ops[0].params, OpParams::GetNum(_)));

    let err = parse(&args(&["getnum:x", "1"])).unwrap_err().to_string();
    assert!(err.contains("invalid getnum type"), "{err}");
}

#[test]
fn named_fields_require_headers() {
    let plan = parse(&args(&["groupby", "name", "sum", "score"])).unwrap();
    assert!(plan.header_required);
    assert_eq!(plan.groups[0].name.as_deref(), Some("name"));
    assert_eq!(plan.ops[0].field_name.as_deref(), Some("score"));
}

#[test]
fn named_range_is_rejected() {
    let err = parse(&args(&["sum", "a-b"])).unwrap_err().to_string();
    assert!(err.contains("must be numeric"), "{err}");
}

#[test]
fn crosstab_constraints() {
    let plan = parse(&args(&["crosstab", "1,2", "sum", "3"])).unwrap();
    assert_eq!(plan.mode, Mode::Crosstab);
    assert_eq!(plan.groups.len(), 2);
    assert_eq!(plan.ops.len(), 1);

    let err = parse(&args(&["crosstab", "1", "sum", "3"]))
        .unwrap_err()
        .to_string();
    assert!(err.contains("requires exactly 2 fields"), "{err}");

    let err = parse(&args(&["crosstab", "1,2", "sum", "3", "mean", "4"]))
        .unwrap_err()
        .to_string();
    assert!(err.contains("one operation"), "{err}");
}

#[test]
fn crosstab_defaults_to_count() {
    let plan = parse(&args(&["crosstab", "1,2"])).unwrap();
    assert_eq!(plan.ops.len(), 1);
    assert_eq!(plan.ops[0].kind, OpKind::Count);
    assert_eq!(plan.ops[0].field, 1);
}

#[test]
fn rmdup_takes_one_column() {
    let plan = parse(&args(&["rmdup", "3"])).unwrap();
    assert_eq!(plan.mode, Mode::RemoveDups);
    assert_eq!(plan.groups[0].num, 3);

    let err = parse(&args(&["rmdup", "1,2"])).unwrap_err().to_string();
    assert!(err.contains("exactly 1 field"), "{err}");
}

#[test]
fn check_arguments() {
    let plan = parse(&args(&["check"])).unwrap();
    assert_eq!(plan.mode, Mode::TabularCheck);
    assert_eq!(plan.check.n_lines, None);
    assert_eq!(plan.check.n_fields, None);

    let plan = parse(&args(&["check", "7", "lines", "2", "fields"])).unwrap();
    assert_eq!(plan.check.n_lines, Some(7));
    assert_eq!(plan.check.n_fields, Some(2));

    let plan = parse(&args(&["check", "columns", "4"])).unwrap();
    assert_eq!(plan.check.n_fields, Some(4));

    let err = parse(&args(&["check", "0", "lines"])).unwrap_err().to_string();
    assert!(err.contains("invalid value zero"), "{err}");

    let err = parse(&args(&["check", "2", "lines", "3", "rows"]))
        .unwrap_err()
        .to_string();
    assert!(err.contains("already set"), "{err}");
}

#[test]
fn conflicting_and_unknown_operations() {
    let err = parse(&args(&["sum", "1", "transpose"])).unwrap_err().to_string();
    assert!(err.contains("conflicting operation"), "{err}");

    let err = parse(&args(&["frobnicate", "1"])).unwrap_err().to_string();
    assert!(err.contains("invalid operation"), "{err}");

    // per-line op mixed into a groupby program
    let err = parse(&args(&["sum", "1", "md5", "2"])).unwrap_err().to_string();
    assert!(err.contains("expecting groupby operations"), "{err}");
}

#[test]
fn extra_operand_after_mode_block() {
    let err = parse(&args(&["transpose", "1"])).unwrap_err().to_string();
    assert!(err.contains("extra operand"), "{err}");
}

#[test]
fn premode_group_option() {
    let plan = parse_with_groups("1,3", &args(&["sum", "2", "count", "2"])).unwrap();
    assert_eq!(plan.mode, Mode::GroupBy);
    let groups: Vec<usize> = plan.groups.iter().map(|g| g.num).collect();
    assert_eq!(groups, vec![1, 3]);
    assert_eq!(plan.ops.len(), 2);
}

#[test]
fn zero_field_is_invalid() {
    let err = parse(&args(&["sum", "0"])).unwrap_err().to_string();
    assert!(err.contains("invalid field"), "{err}");
}

#[test]
fn missing_field_after_operation() {
    let err = parse(&args(&["sum"])).unwrap_err().to_string();
    assert!(err.contains("missing field"), "{err}");
}
