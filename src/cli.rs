//! CLI surface: flag parsing, configuration assembly, and the top-level
//! driving of the engine over stdin/stdout.

use std::io::{self, BufWriter, Write};

use anyhow::{bail, Result};
use clap::Parser;

use crate::config::{Config, Delimiter, NumericFormat, DEFAULT_FILLER};
use crate::engine::{sort_pipe, Engine};
use crate::format::FloatFormat;
use crate::ops::parser;

const AFTER_HELP: &str = "\x1b[1mPrimary operations:\x1b[0m
  groupby, crosstab, transpose, reverse, rmdup, check, noop

\x1b[1mPer-line operations:\x1b[0m
  base64, debase64, md5, sha1, sha256, sha512,
  bin, strbin, round, floor, ceil, trunc, frac,
  dirname, basename, barename, extname, getnum, cut

\x1b[1mNumeric grouping operations:\x1b[0m
  sum, min, max, absmin, absmax, range

\x1b[1mTextual/numeric grouping operations:\x1b[0m
  count, first, last, rand, unique, collapse, countunique

\x1b[1mStatistical grouping operations:\x1b[0m
  mean, trimmean, median, q1, q3, iqr, perc, mode, antimode,
  pstdev, sstdev, pvar, svar, mad, madraw,
  pskew, sskew, pkurt, skurt, dpo, jarque,
  scov, pcov, spearson, ppearson

\x1b[1mExamples:\x1b[0m
  Sum and mean of column 1:
    seq 10 | tabcrunch sum 1 mean 1

  Per-key sums over unsorted input:
    tabcrunch -s -g 1 sum 2 < data.txt

  Pivot a long table:
    tabcrunch -H crosstab 1,2 sum 3 < data.txt";

// Help heading constants for consistency
const GROUPING: &str = "Grouping";
const FILE_OPS: &str = "File Operation";
const GENERAL: &str = "General";

#[derive(Parser)]
#[command(name = "tabcrunch")]
#[command(version)]
#[command(
    about = "High-performance CLI for grouping, aggregating, and reshaping delimited text streams"
)]
#[command(after_help = AFTER_HELP)]
#[command(arg_required_else_help = true)]
#[command(max_term_width = 100)]
pub struct Cli {
    /// Group via fields X[,Y,Z]; equivalent to primary operation 'groupby'
    #[arg(short = 'g', long = "group", value_name = "COLS", help_heading = GROUPING)]
    pub group: Option<String>,

    /// Print the entire input line before op results (default: only keys)
    #[arg(short = 'f', long = "full", help_heading = GROUPING)]
    pub full: bool,

    /// First input line is column headers
    #[arg(long = "header-in", help_heading = GROUPING)]
    pub header_in: bool,

    /// Print column headers as first line
    #[arg(long = "header-out", help_heading = GROUPING)]
    pub header_out: bool,

    /// Same as '--header-in --header-out'
    #[arg(short = 'H', long = "headers", help_heading = GROUPING)]
    pub headers: bool,

    /// Ignore upper/lower case when comparing text for grouping and string
    /// operations
    #[arg(short = 'i', long = "ignore-case", help_heading = GROUPING)]
    pub ignore_case: bool,

    /// Sort the input before grouping; removes the need to pipe input
    /// through 'sort'
    #[arg(short = 's', long = "sort", help_heading = GROUPING)]
    pub sort: bool,

    /// Skip comment lines (starting with '#' or ';' and optional
    /// whitespace)
    #[arg(short = 'C', long = "skip-comments", help_heading = GROUPING)]
    pub skip_comments: bool,

    /// Allow lines with varying number of fields
    #[arg(long = "no-strict", help_heading = FILE_OPS)]
    pub no_strict: bool,

    /// Fill missing values with X
    #[arg(short = 'F', long = "filler", value_name = "X", default_value = DEFAULT_FILLER, help_heading = FILE_OPS)]
    pub filler: String,

    /// Use X as input field delimiter (default: whitespace run)
    #[arg(short = 't', long = "field-separator", value_name = "X", help_heading = GENERAL)]
    pub field_separator: Option<String>,

    /// Use whitespace (one or more spaces/tabs) as field delimiter
    #[arg(short = 'W', long = "whitespace", help_heading = GENERAL)]
    pub whitespace: bool,

    /// Use TAB as field delimiter
    #[arg(short = 'T', long = "tab", help_heading = GENERAL)]
    pub tab: bool,

    /// Use X as output field delimiter (default: same as input delimiter)
    #[arg(long = "output-delimiter", value_name = "X", help_heading = GENERAL)]
    pub output_delimiter: Option<String>,

    /// End lines with a 0 byte, not newline
    #[arg(short = 'z', long = "zero-terminated", help_heading = GENERAL)]
    pub zero_terminated: bool,

    /// Skip NA values (records whose value does not parse as a number)
    #[arg(long = "narm", help_heading = GENERAL)]
    pub narm: bool,

    /// Round numeric output to N decimal places
    #[arg(short = 'R', long = "round", value_name = "N", help_heading = GENERAL)]
    pub round: Option<usize>,

    /// Print numeric values with a printf-style floating-point FORMAT
    #[arg(long = "format", value_name = "FORMAT", help_heading = GENERAL)]
    pub format: Option<String>,

    /// Seed for the 'rand' operation (default: OS entropy)
    #[arg(long = "seed", value_name = "N", help_heading = GENERAL)]
    pub seed: Option<u64>,

    /// Operation specification: [mode] op field [op field ...]
    #[arg(trailing_var_arg = true, value_name = "OP")]
    pub ops: Vec<String>,
}

fn single_byte(s: &str) -> Result<u8> {
    match s.as_bytes() {
        [b] => Ok(*b),
        _ => bail!("the delimiter must be a single character"),
    }
}

fn build_config(cli: &Cli) -> Result<Config> {
    let mut cfg = Config::default();

    if cli.tab {
        cfg.delimiter = Delimiter::Byte(b'\t');
        cfg.out_delimiter = b'\t';
    }
    if let Some(sep) = &cli.field_separator {
        let b = single_byte(sep)?;
        cfg.delimiter = Delimiter::Byte(b);
        cfg.out_delimiter = b;
    }
    if cli.whitespace {
        cfg.delimiter = Delimiter::Whitespace;
        cfg.out_delimiter = b'\t';
    }
    // an explicit output delimiter beats whatever was inferred above
    if let Some(sep) = &cli.output_delimiter {
        cfg.out_delimiter = single_byte(sep)?;
    }

    if cli.zero_terminated {
        cfg.eol = 0;
    }
    cfg.case_insensitive = cli.ignore_case;
    cfg.skip_comments = cli.skip_comments;
    cfg.header_in = cli.headers || cli.header_in;
    cfg.header_out = cli.headers || cli.header_out;
    cfg.full_line = cli.full;
    cfg.sort_input = cli.sort;
    cfg.strict = !cli.no_strict;
    cfg.narm = cli.narm;
    cfg.filler = cli.filler.clone();
    cfg.seed = cli.seed;

    if let Some(decimals) = cli.round {
        cfg.format = NumericFormat::Fixed { decimals };
    }
    if let Some(fmt) = &cli.format {
        cfg.format = NumericFormat::Custom(FloatFormat::parse(fmt)?);
    }

    Ok(cfg)
}

pub fn run(cli: Cli) -> Result<()> {
    if cli.ops.is_empty() {
        bail!("missing operation specifiers");
    }

    let cfg = build_config(&cli)?;
    let mut plan = match &cli.group {
        Some(spec) => parser::parse_with_groups(spec, &cli.ops)?,
        None => parser::parse(&cli.ops)?,
    };

    if plan.header_required && !cfg.header_in {
        bail!("-H or --header-in must be used with named columns");
    }

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let stdin = io::stdin();

    let use_sort = cfg.sort_input && !plan.groups.is_empty();
    let mut engine = Engine::new(&cfg, &mut plan);

    if use_sort {
        if cfg.header_in {
            engine.read_header(stdin.lock(), &mut out)?;
        }
        let (pipe, reader) = sort_pipe::spawn(&cfg, engine.groups(), cfg.header_in)?;
        engine.run(reader, &mut out)?;
        out.flush()?;
        pipe.finish()?;
    } else {
        engine.run(stdin.lock(), &mut out)?;
        out.flush()?;
    }
    Ok(())
}
