//! The processing engine: group driver plus the reshaping modes.
//!
//! The group driver streams records, compares each record's key fields to
//! the first record of the open group, and closes the group (summarize,
//! emit, reset) on change. Two record buffers are swapped instead of
//! copied; the retained buffer is also updated when an operation reports
//! `keep_line` so `--full` prints the relevant line.

pub mod crosstab;
pub mod sort_pipe;

use std::cmp::Ordering;
use std::io::{BufRead, Write};
use std::mem;

use ahash::AHashSet;
use anyhow::{anyhow, bail, Result};

use crate::config::Config;
use crate::engine::crosstab::Crosstab;
use crate::headers::ColumnHeaders;
use crate::ops::kernel::{cmp_bytes, FieldOp, OpParams};
use crate::ops::parser::{GroupColumn, ProgramPlan};
use crate::ops::{Mode, OpKind};
use crate::record::{Record, RecordReader};

pub struct Engine<'a> {
    cfg: &'a Config,
    plan: &'a mut ProgramPlan,
    headers: ColumnHeaders,
    line_number: u64,
    lines_in_group: u64,
}

impl<'a> Engine<'a> {
    pub fn new(cfg: &'a Config, plan: &'a mut ProgramPlan) -> Self {
        if let Some(seed) = cfg.seed {
            // distinct deterministic streams per op instance
            for (i, op) in plan.ops.iter_mut().enumerate() {
                if op.kind == OpKind::Rand {
                    op.seed_rng(seed.wrapping_add(i as u64));
                }
            }
        }
        Self {
            cfg,
            plan,
            headers: ColumnHeaders::new(),
            line_number: 0,
            lines_in_group: 0,
        }
    }

    pub fn groups(&self) -> &[GroupColumn] {
        &self.plan.groups
    }

    /// Process the header line ahead of the main input stream. Used by the
    /// sort bridge, which must not let the header reach the subprocess.
    pub fn read_header<R: BufRead, W: Write>(&mut self, input: R, out: &mut W) -> Result<()> {
        let mut reader = RecordReader::new(input, self.cfg.eol, self.cfg.skip_comments);
        let mut rec = Record::new();
        if reader.read_into(&mut rec, self.cfg.delimiter)? {
            self.line_number += 1;
            self.headers.load(&rec, true);
            self.plan.resolve_names(&self.headers)?;
            if self.cfg.header_out {
                self.print_column_headers(out)?;
            }
        }
        Ok(())
    }

    /// Run the program over `input`, writing results to `out`.
    pub fn run<R: BufRead, W: Write>(&mut self, input: R, out: &mut W) -> Result<()> {
        match self.plan.mode {
            Mode::GroupBy | Mode::PerLine => self.process_stream(input, out, None),
            Mode::Crosstab => {
                let mut matrix = Crosstab::new();
                self.process_stream(input, out, Some(&mut matrix))?;
                matrix.print(out, self.cfg)
            }
            Mode::Transpose => self.transpose(input, out),
            Mode::Reverse => self.reverse_fields(input, out),
            Mode::RemoveDups => self.remove_dups(input, out),
            Mode::TabularCheck => self.tabular_check(input, out),
            Mode::Noop => self.noop(input, out),
        }
    }

    /// The grouping driver shared by groupby, per-line, and crosstab modes.
    fn process_stream<R: BufRead, W: Write>(
        &mut self,
        input: R,
        out: &mut W,
        mut matrix: Option<&mut Crosstab>,
    ) -> Result<()> {
        let mut reader = RecordReader::new(input, self.cfg.eol, self.cfg.skip_comments);
        let mut thisline = Record::new();
        let mut group_first = Record::new();
        let mut have_group = false;
        let line_mode = self.plan.mode == Mode::PerLine;

        if self.cfg.header_in && self.line_number == 0 {
            if reader.read_into(&mut thisline, self.cfg.delimiter)? {
                self.line_number += 1;
                self.headers.load(&thisline, true);
                self.plan.resolve_names(&self.headers)?;
                if self.cfg.header_out {
                    self.print_column_headers(out)?;
                }
            }
        }

        loop {
            if !reader.read_into(&mut thisline, self.cfg.delimiter)? {
                break;
            }
            self.line_number += 1;

            // without an input header, a requested output header is
            // synthesized from the first data record's arity
            if self.line_number == 1 && self.cfg.header_out && !self.cfg.header_in {
                self.headers.load(&thisline, false);
                self.print_column_headers(out)?;
            }

            let new_group;
            if !self.plan.groups.is_empty() || line_mode {
                new_group = !have_group
                    || line_mode
                    || self.different(&thisline, &group_first)?;
                if new_group {
                    self.process_group(&group_first, out, matrix.as_deref_mut())?;
                    have_group = false;
                }
            } else {
                // no keys: the entire input is one group
                new_group = !have_group;
            }

            self.lines_in_group += 1;
            let keep_line = self.collect_record(&thisline)?;

            if new_group || keep_line {
                mem::swap(&mut group_first, &mut thisline);
                have_group = true;
            }
        }

        self.process_group(&group_first, out, matrix.as_deref_mut())?;
        Ok(())
    }

    /// Close the current group: summarize, emit, reset.
    fn process_group<W: Write>(
        &mut self,
        group_line: &Record,
        out: &mut W,
        matrix: Option<&mut Crosstab>,
    ) -> Result<()> {
        if self.lines_in_group > 0 {
            match matrix {
                Some(matrix) => {
                    let row_field = self.plan.groups[0].num;
                    let col_field = self.plan.groups[1].num;
                    let row =
                        field_of(self.cfg, group_line, row_field, self.line_number)?.to_vec();
                    let col =
                        field_of(self.cfg, group_line, col_field, self.line_number)?.to_vec();
                    let op = self
                        .plan
                        .ops
                        .first_mut()
                        .ok_or_else(|| anyhow!("internal error: crosstab without operation"))?;
                    let value = op.summarize(None, self.cfg)?;
                    matrix.add(&row, &col, value);
                }
                None => {
                    self.print_input_line(group_line, out)?;
                    summarize_ops(self.cfg, &mut self.plan.ops, out)?;
                }
            }
        }
        self.lines_in_group = 0;
        for op in &mut self.plan.ops {
            op.reset();
        }
        Ok(())
    }

    /// Feed the record to every operation; paired ops ingest both fields
    /// together so --narm skips both halves on a bad value.
    fn collect_record(&mut self, rec: &Record) -> Result<bool> {
        let cfg = self.cfg;
        let line = self.line_number;
        let ops = &mut self.plan.ops;
        let mut keep_line = false;

        let mut i = 0;
        while i < ops.len() {
            if ops[i].slave {
                let slave_field = ops[i].field;
                let master_field = ops[i + 1].field;
                let sval = field_of(cfg, rec, slave_field, line)?;
                let mval = field_of(cfg, rec, master_field, line)?;
                let x = parse_number(sval);
                let y = parse_number(mval);
                let skip = cfg.narm
                    && (x.map_or(true, f64::is_nan) || y.map_or(true, f64::is_nan));
                if !skip {
                    match (x, y) {
                        (Some(x), Some(y)) => {
                            keep_line |= ops[i].collect(sval, x)?;
                            keep_line |= ops[i + 1].collect(mval, y)?;
                        }
                        (None, _) => return Err(numeric_error(line, slave_field, sval)),
                        (_, None) => return Err(numeric_error(line, master_field, mval)),
                    }
                }
                i += 2;
                continue;
            }

            let field = ops[i].field;
            let val = field_of(cfg, rec, field, line)?;
            if ops[i].is_numeric() {
                match parse_number(val) {
                    Some(n) if cfg.narm && n.is_nan() => {}
                    Some(n) => keep_line |= ops[i].collect(val, n)?,
                    None if cfg.narm => {}
                    None => return Err(numeric_error(line, field, val)),
                }
            } else {
                match ops[i].collect(val, 0.0) {
                    Ok(keep) => keep_line |= keep,
                    Err(e) => bail!(
                        "{e} in line {line} field {field}: '{}'",
                        String::from_utf8_lossy(val)
                    ),
                }
            }
            i += 1;
        }
        Ok(keep_line)
    }

    /// Key comparison against the group's first record.
    fn different(&self, a: &Record, b: &Record) -> Result<bool> {
        for grp in &self.plan.groups {
            let s1 = field_of(self.cfg, a, grp.num, self.line_number)?;
            let s2 = field_of(self.cfg, b, grp.num, self.line_number)?;
            if cmp_bytes(s1, s2, self.cfg.case_insensitive) != Ordering::Equal {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// The group prefix of an output row: the whole retained line with
    /// --full, the key fields otherwise.
    fn print_input_line<W: Write>(&self, rec: &Record, out: &mut W) -> Result<()> {
        let sep = [self.cfg.out_delimiter];
        if self.cfg.full_line {
            for i in 1..=rec.num_fields() {
                out.write_all(field_of(self.cfg, rec, i, self.line_number)?)?;
                out.write_all(&sep)?;
            }
        } else {
            for grp in &self.plan.groups {
                out.write_all(field_of(self.cfg, rec, grp.num, self.line_number)?)?;
                out.write_all(&sep)?;
            }
        }
        Ok(())
    }

    fn print_column_headers<W: Write>(&self, out: &mut W) -> Result<()> {
        // the crosstab matrix prints its own header row
        if self.plan.mode == Mode::Crosstab {
            return Ok(());
        }
        let sep = [self.cfg.out_delimiter];

        if self.cfg.full_line {
            for n in 1..=self.headers.len() {
                out.write_all(self.headers.name_of(n).as_bytes())?;
                out.write_all(&sep)?;
            }
        } else {
            for grp in &self.plan.groups {
                if grp.num > self.headers.len() {
                    return Err(not_enough_fields(
                        grp.num,
                        self.line_number,
                        self.headers.len(),
                    ));
                }
                write!(out, "GroupBy({})", self.headers.name_of(grp.num))?;
                out.write_all(&sep)?;
            }
        }

        let last = self.plan.ops.len().saturating_sub(1);
        for (i, op) in self.plan.ops.iter().enumerate() {
            if op.slave {
                continue;
            }
            if op.field > self.headers.len() {
                return Err(not_enough_fields(
                    op.field,
                    self.line_number,
                    self.headers.len(),
                ));
            }
            write!(out, "{}", op.info.name)?;
            match op.params {
                OpParams::Percentile(p) => write!(out, ":{p}")?,
                OpParams::TrimFraction(t) if op.kind == OpKind::TrimmedMean => {
                    write!(out, ":{t}")?
                }
                _ => {}
            }
            write!(out, "({})", self.headers.name_of(op.field))?;
            if i != last {
                out.write_all(&sep)?;
            }
        }
        out.write_all(&[self.cfg.eol])?;
        Ok(())
    }

    /// Buffer the whole input and emit it column-major.
    fn transpose<R: BufRead, W: Write>(&mut self, input: R, out: &mut W) -> Result<()> {
        let mut reader = RecordReader::new(input, self.cfg.eol, self.cfg.skip_comments);
        let mut lines: Vec<Record> = Vec::new();
        let mut max_fields = 0;
        let mut prev_fields = 0;

        loop {
            let mut rec = Record::new();
            if !reader.read_into(&mut rec, self.cfg.delimiter)? {
                break;
            }
            self.line_number += 1;
            let num_fields = rec.num_fields();
            if self.cfg.strict && self.line_number > 1 && num_fields != prev_fields {
                bail!(
                    "transpose input error: line {} has {} fields (previous lines had {}); \
                     use --no-strict to allow lines with varying number of fields",
                    self.line_number,
                    num_fields,
                    prev_fields
                );
            }
            prev_fields = num_fields;
            max_fields = max_fields.max(num_fields);
            lines.push(rec);
        }

        let sep = [self.cfg.out_delimiter];
        for i in 1..=max_fields {
            for (j, line) in lines.iter().enumerate() {
                if j > 0 {
                    out.write_all(&sep)?;
                }
                match line.field(i) {
                    Some(s) => out.write_all(s)?,
                    None => out.write_all(self.cfg.filler.as_bytes())?,
                }
            }
            out.write_all(&[self.cfg.eol])?;
        }
        Ok(())
    }

    /// Emit every record with its field order reversed.
    fn reverse_fields<R: BufRead, W: Write>(&mut self, input: R, out: &mut W) -> Result<()> {
        let mut reader = RecordReader::new(input, self.cfg.eol, self.cfg.skip_comments);
        let mut rec = Record::new();
        let mut prev_fields = 0;
        let sep = [self.cfg.out_delimiter];

        loop {
            if !reader.read_into(&mut rec, self.cfg.delimiter)? {
                break;
            }
            self.line_number += 1;
            let num_fields = rec.num_fields();

            if self.cfg.strict && self.line_number > 1 && num_fields != prev_fields {
                bail!(
                    "reverse-field input error: line {} has {} fields (previous lines had {}); \
                     use --no-strict to allow lines with varying number of fields",
                    self.line_number,
                    num_fields,
                    prev_fields
                );
            }
            prev_fields = num_fields;

            if self.line_number == 1 {
                // a consumed header is echoed only when headers are printed
                if self.cfg.header_in && !self.cfg.header_out {
                    continue;
                }
                if !self.cfg.header_in && self.cfg.header_out {
                    self.headers.load(&rec, false);
                    for i in (1..=num_fields).rev() {
                        if i < num_fields {
                            out.write_all(&sep)?;
                        }
                        out.write_all(self.headers.name_of(i).as_bytes())?;
                    }
                    out.write_all(&[self.cfg.eol])?;
                }
            }

            for i in (1..=num_fields).rev() {
                if i < num_fields {
                    out.write_all(&sep)?;
                }
                if let Some(s) = rec.field(i) {
                    out.write_all(s)?;
                }
            }
            out.write_all(&[self.cfg.eol])?;
        }
        Ok(())
    }

    /// Print only the first record for each distinct key.
    fn remove_dups<R: BufRead, W: Write>(&mut self, input: R, out: &mut W) -> Result<()> {
        let mut reader = RecordReader::new(input, self.cfg.eol, self.cfg.skip_comments);
        let mut rec = Record::new();
        let mut seen: AHashSet<Vec<u8>> = AHashSet::new();

        if self.cfg.header_in && reader.read_into(&mut rec, self.cfg.delimiter)? {
            self.line_number += 1;
            if self.plan.header_required {
                self.headers.load(&rec, true);
                self.plan.resolve_names(&self.headers)?;
            }
            if self.cfg.header_out {
                out.write_all(rec.bytes())?;
                out.write_all(&[self.cfg.eol])?;
            }
        }

        let key_col = self.plan.groups[0].num;
        loop {
            if !reader.read_into(&mut rec, self.cfg.delimiter)? {
                break;
            }
            self.line_number += 1;
            let key = rec.field(key_col).ok_or_else(|| {
                not_enough_fields(key_col, self.line_number, rec.num_fields())
            })?;
            if seen.insert(key.to_vec()) {
                out.write_all(rec.bytes())?;
                out.write_all(&[self.cfg.eol])?;
            }
        }
        Ok(())
    }

    /// Verify the input is tabular; report the offending lines otherwise.
    fn tabular_check<R: BufRead, W: Write>(&mut self, input: R, out: &mut W) -> Result<()> {
        let mut reader = RecordReader::new(input, self.cfg.eol, self.cfg.skip_comments);
        let mut thisline = Record::new();
        let mut prevline = Record::new();
        let mut prev_fields = 0;

        let expect_lines = self.plan.check.n_lines;
        let expect_fields = self.plan.check.n_fields;

        loop {
            if !reader.read_into(&mut thisline, self.cfg.delimiter)? {
                break;
            }
            self.line_number += 1;
            let num_fields = thisline.num_fields();

            if let Some(expected) = expect_fields {
                if expected != num_fields as u64 {
                    print_check_line(self.line_number, &thisline);
                    bail!(
                        "check failed: line {} has {} fields (expecting {})",
                        self.line_number,
                        num_fields,
                        expected
                    );
                }
            } else if self.line_number > 1 && num_fields != prev_fields {
                print_check_line(self.line_number - 1, &prevline);
                print_check_line(self.line_number, &thisline);
                bail!(
                    "check failed: line {} has {} fields (previous line had {})",
                    self.line_number,
                    num_fields,
                    prev_fields
                );
            }
            prev_fields = num_fields;
            mem::swap(&mut prevline, &mut thisline);
        }

        if let Some(expected) = expect_lines {
            if expected != self.line_number {
                bail!(
                    "check failed: input had {} lines (expecting {})",
                    self.line_number,
                    expected
                );
            }
        }

        write_plural(out, self.line_number, "line")?;
        write!(out, ", ")?;
        write_plural(out, prev_fields as u64, "field")?;
        out.write_all(&[self.cfg.eol])?;
        Ok(())
    }

    /// Read and parse the input without any processing; echoes lines only
    /// with --full.
    fn noop<R: BufRead, W: Write>(&mut self, input: R, out: &mut W) -> Result<()> {
        let mut reader = RecordReader::new(input, self.cfg.eol, self.cfg.skip_comments);
        let mut rec = Record::new();
        loop {
            if !reader.read_into(&mut rec, self.cfg.delimiter)? {
                break;
            }
            self.line_number += 1;
            if self.cfg.full_line {
                out.write_all(rec.bytes())?;
                out.write_all(&[self.cfg.eol])?;
            }
        }
        Ok(())
    }
}

fn write_plural<W: Write>(out: &mut W, n: u64, word: &str) -> Result<()> {
    if n == 1 {
        write!(out, "{n} {word}")?;
    } else {
        write!(out, "{n} {word}s")?;
    }
    Ok(())
}

fn print_check_line(line_number: u64, rec: &Record) {
    eprintln!(
        "line {} ({} fields):\n  {}",
        line_number,
        rec.num_fields(),
        String::from_utf8_lossy(rec.bytes())
    );
}

/// Emit every non-slave operation's summary, joined by the output
/// delimiter; masters read their slave's buffer by index.
fn summarize_ops<W: Write>(cfg: &Config, ops: &mut [FieldOp], out: &mut W) -> Result<()> {
    let last = ops.len().saturating_sub(1);
    for i in 0..ops.len() {
        if ops[i].slave {
            continue;
        }
        let (left, right) = ops.split_at_mut(i);
        let op = &mut right[0];
        let slave_values = if op.master {
            Some(left[op.slave_idx].values())
        } else {
            None
        };
        let result = op.summarize(slave_values, cfg)?;
        out.write_all(&result)?;
        if i != last {
            out.write_all(&[cfg.out_delimiter])?;
        }
    }
    out.write_all(&[cfg.eol])?;
    Ok(())
}

/// Field access with the strict/filler policy.
fn field_of<'r>(cfg: &'r Config, rec: &'r Record, n: usize, line: u64) -> Result<&'r [u8]> {
    match rec.field(n) {
        Some(s) => Ok(s),
        None if !cfg.strict => Ok(cfg.filler.as_bytes()),
        None => Err(not_enough_fields(n, line, rec.num_fields())),
    }
}

fn not_enough_fields(needed: usize, line: u64, found: usize) -> anyhow::Error {
    anyhow!("invalid input: field {needed} requested, line {line} has only {found} fields")
}

fn numeric_error(line: u64, field: usize, value: &[u8]) -> anyhow::Error {
    anyhow!(
        "invalid numeric input in line {line} field {field}: '{}'",
        String::from_utf8_lossy(value)
    )
}

/// Locale-independent numeric parsing; blanks are trimmed, the decimal
/// point is always '.'.
fn parse_number(s: &[u8]) -> Option<f64> {
    let text = std::str::from_utf8(s).ok()?.trim();
    if text.is_empty() {
        return None;
    }
    text.parse().ok()
}
