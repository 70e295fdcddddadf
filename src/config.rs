//! Shared record/field configuration threaded through the whole pipeline.
//!
//! Built once from the CLI and never mutated afterwards.

use crate::format::FloatFormat;

/// How input lines are split into fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    /// A run of one or more spaces/tabs acts as a single delimiter.
    /// Leading blanks do not open an empty field; trailing blanks are trimmed.
    Whitespace,
    /// A single byte; every occurrence separates two fields, so a run of
    /// k delimiters yields k+1 fields (possibly empty).
    Byte(u8),
}

impl Delimiter {
    pub fn is_whitespace(&self) -> bool {
        matches!(self, Delimiter::Whitespace)
    }
}

/// Numeric output formatting selected by `--round` / `--format`.
#[derive(Debug, Clone)]
pub enum NumericFormat {
    /// `%g`-style with the given number of significant digits.
    General { precision: usize },
    /// Fixed number of decimal places (`--round=N`).
    Fixed { decimals: usize },
    /// User-supplied printf-style format (`--format=FMT`), pre-validated.
    Custom(FloatFormat),
}

/// Default significant digits for numeric output.
pub const DEFAULT_PRECISION: usize = 14;

/// Default filler for missing fields and absent crosstab cells.
pub const DEFAULT_FILLER: &str = "N/A";

#[derive(Debug, Clone)]
pub struct Config {
    pub delimiter: Delimiter,
    pub out_delimiter: u8,
    /// Record terminator byte: b'\n', or 0 with --zero-terminated.
    pub eol: u8,
    pub case_insensitive: bool,
    pub filler: String,
    /// Reject records whose field count is too small for a requested field.
    pub strict: bool,
    /// Skip unparseable numeric values instead of aborting.
    pub narm: bool,
    /// Skip lines starting with '#' or ';' (after optional blanks).
    pub skip_comments: bool,
    pub header_in: bool,
    pub header_out: bool,
    /// Print the entire retained group line before the aggregate columns.
    pub full_line: bool,
    /// Pipe input through an external `sort` before grouping.
    pub sort_input: bool,
    /// Deterministic seed for the `rand` operation; OS entropy when absent.
    pub seed: Option<u64>,
    pub format: NumericFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            delimiter: Delimiter::Whitespace,
            out_delimiter: b' ',
            eol: b'\n',
            case_insensitive: false,
            filler: DEFAULT_FILLER.to_string(),
            strict: true,
            narm: false,
            skip_comments: false,
            header_in: false,
            header_out: false,
            full_line: false,
            sort_input: false,
            seed: None,
            format: NumericFormat::General {
                precision: DEFAULT_PRECISION,
            },
        }
    }
}
