//! Operation and processing-mode definitions.
//!
//! Every operation kind carries a static descriptor: its DSL name, value
//! category, whether its accumulator initializes from the first observed
//! value, and the processing mode the keyword implies.

pub mod kernel;
pub mod parser;
pub mod scanner;

use once_cell::sync::Lazy;

use ahash::AHashMap;

/// Processing mode of the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    GroupBy,
    Transpose,
    Reverse,
    PerLine,
    RemoveDups,
    Crosstab,
    TabularCheck,
    Noop,
}

impl Mode {
    pub fn name(&self) -> &'static str {
        match self {
            Mode::GroupBy => "groupby",
            Mode::Transpose => "transpose",
            Mode::Reverse => "reverse",
            Mode::PerLine => "line",
            Mode::RemoveDups => "rmdup",
            Mode::Crosstab => "crosstab",
            Mode::TabularCheck => "check",
            Mode::Noop => "noop",
        }
    }
}

/// Value category of an operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpType {
    /// Online numeric accumulator (sum, min, mean, ...).
    NumericScalar,
    /// Buffers all numeric values of the group (median, stdev, ...).
    NumericVector,
    /// Online textual accumulator (count, first, last, ...).
    StringScalar,
    /// Buffers all string values of the group (unique, collapse, ...).
    StringVector,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Count,
    Sum,
    Min,
    Max,
    AbsMin,
    AbsMax,
    Range,
    First,
    Last,
    Rand,
    Mean,
    Median,
    Quartile1,
    Quartile3,
    Iqr,
    Percentile,
    PStdev,
    SStdev,
    PVariance,
    SVariance,
    Mad,
    MadRaw,
    SSkewness,
    PSkewness,
    SExcessKurtosis,
    PExcessKurtosis,
    JarqueBera,
    DpOmnibus,
    Mode,
    Antimode,
    Unique,
    Collapse,
    CountUnique,
    PCovariance,
    SCovariance,
    PPearson,
    SPearson,
    TrimmedMean,
    Base64,
    DeBase64,
    Md5,
    Sha1,
    Sha256,
    Sha512,
    Bin,
    StrBin,
    Floor,
    Ceil,
    Round,
    Trunc,
    Frac,
    DirName,
    BaseName,
    ExtName,
    BareName,
    GetNum,
    Cut,
}

/// Static metadata for one operation kind.
#[derive(Debug)]
pub struct OpInfo {
    pub name: &'static str,
    pub kind: OpKind,
    pub op_type: OpType,
    /// Initialize the accumulator from the first observed value
    /// (min/max/absmin/absmax have no constant neutral element).
    pub auto_first: bool,
    /// Processing mode this keyword implies when used first.
    pub mode: Mode,
}

impl OpInfo {
    pub fn is_numeric(&self) -> bool {
        matches!(self.op_type, OpType::NumericScalar | OpType::NumericVector)
    }

    /// Paired-statistics kinds take a `slave:master` field pair.
    pub fn needs_pair(&self) -> bool {
        matches!(
            self.kind,
            OpKind::PCovariance | OpKind::SCovariance | OpKind::PPearson | OpKind::SPearson
        )
    }
}

use Mode::{GroupBy, PerLine};
use OpType::{NumericScalar, NumericVector, StringScalar, StringVector};

macro_rules! op {
    ($name:literal, $kind:ident, $ty:expr, $auto:literal, $mode:expr) => {
        OpInfo {
            name: $name,
            kind: OpKind::$kind,
            op_type: $ty,
            auto_first: $auto,
            mode: $mode,
        }
    };
}

pub static OPERATIONS: &[OpInfo] = &[
    op!("count", Count, StringScalar, false, GroupBy),
    op!("sum", Sum, NumericScalar, false, GroupBy),
    op!("min", Min, NumericScalar, true, GroupBy),
    op!("max", Max, NumericScalar, true, GroupBy),
    op!("absmin", AbsMin, NumericScalar, true, GroupBy),
    op!("absmax", AbsMax, NumericScalar, true, GroupBy),
    op!("range", Range, NumericScalar, true, GroupBy),
    op!("first", First, StringScalar, false, GroupBy),
    op!("last", Last, StringScalar, false, GroupBy),
    op!("rand", Rand, StringScalar, false, GroupBy),
    op!("mean", Mean, NumericScalar, false, GroupBy),
    op!("median", Median, NumericVector, false, GroupBy),
    op!("q1", Quartile1, NumericVector, false, GroupBy),
    op!("q3", Quartile3, NumericVector, false, GroupBy),
    op!("iqr", Iqr, NumericVector, false, GroupBy),
    op!("perc", Percentile, NumericVector, false, GroupBy),
    op!("pstdev", PStdev, NumericVector, false, GroupBy),
    op!("sstdev", SStdev, NumericVector, false, GroupBy),
    op!("pvar", PVariance, NumericVector, false, GroupBy),
    op!("svar", SVariance, NumericVector, false, GroupBy),
    op!("mad", Mad, NumericVector, false, GroupBy),
    op!("madraw", MadRaw, NumericVector, false, GroupBy),
    op!("sskew", SSkewness, NumericVector, false, GroupBy),
    op!("pskew", PSkewness, NumericVector, false, GroupBy),
    op!("skurt", SExcessKurtosis, NumericVector, false, GroupBy),
    op!("pkurt", PExcessKurtosis, NumericVector, false, GroupBy),
    op!("jarque", JarqueBera, NumericVector, false, GroupBy),
    op!("dpo", DpOmnibus, NumericVector, false, GroupBy),
    op!("mode", Mode, NumericVector, false, GroupBy),
    op!("antimode", Antimode, NumericVector, false, GroupBy),
    op!("unique", Unique, StringVector, false, GroupBy),
    op!("collapse", Collapse, StringVector, false, GroupBy),
    op!("countunique", CountUnique, StringVector, false, GroupBy),
    op!("pcov", PCovariance, NumericVector, false, GroupBy),
    op!("scov", SCovariance, NumericVector, false, GroupBy),
    op!("ppearson", PPearson, NumericVector, false, GroupBy),
    op!("spearson", SPearson, NumericVector, false, GroupBy),
    op!("trimmean", TrimmedMean, NumericVector, false, GroupBy),
    op!("base64", Base64, StringScalar, false, PerLine),
    op!("debase64", DeBase64, StringScalar, false, PerLine),
    op!("md5", Md5, StringScalar, false, PerLine),
    op!("sha1", Sha1, StringScalar, false, PerLine),
    op!("sha256", Sha256, StringScalar, false, PerLine),
    op!("sha512", Sha512, StringScalar, false, PerLine),
    op!("bin", Bin, NumericScalar, false, PerLine),
    op!("strbin", StrBin, StringScalar, false, PerLine),
    op!("floor", Floor, NumericScalar, false, PerLine),
    op!("ceil", Ceil, NumericScalar, false, PerLine),
    op!("round", Round, NumericScalar, false, PerLine),
    op!("trunc", Trunc, NumericScalar, false, PerLine),
    op!("frac", Frac, NumericScalar, false, PerLine),
    op!("dirname", DirName, StringScalar, false, PerLine),
    op!("basename", BaseName, StringScalar, false, PerLine),
    op!("extname", ExtName, StringScalar, false, PerLine),
    op!("barename", BareName, StringScalar, false, PerLine),
    op!("getnum", GetNum, StringScalar, false, PerLine),
    op!("cut", Cut, StringScalar, false, PerLine),
];

static OPS_BY_NAME: Lazy<AHashMap<&'static str, &'static OpInfo>> =
    Lazy::new(|| OPERATIONS.iter().map(|info| (info.name, info)).collect());

static MODES_BY_NAME: Lazy<AHashMap<&'static str, Mode>> = Lazy::new(|| {
    [
        ("groupby", Mode::GroupBy),
        ("grouping", Mode::GroupBy),
        ("gb", Mode::GroupBy),
        ("transpose", Mode::Transpose),
        ("reverse", Mode::Reverse),
        ("rmdup", Mode::RemoveDups),
        ("dedup", Mode::RemoveDups),
        ("crosstab", Mode::Crosstab),
        ("ct", Mode::Crosstab),
        ("check", Mode::TabularCheck),
        ("noop", Mode::Noop),
        ("nop", Mode::Noop),
    ]
    .into_iter()
    .collect()
});

/// Look up an operation keyword (case-insensitive).
pub fn find_operation(name: &str) -> Option<&'static OpInfo> {
    OPS_BY_NAME.get(name.to_ascii_lowercase().as_str()).copied()
}

/// Look up a processing-mode keyword (case-insensitive).
pub fn find_mode(name: &str) -> Option<Mode> {
    MODES_BY_NAME
        .get(name.to_ascii_lowercase().as_str())
        .copied()
}

/// Info record for a kind; table lookup cannot fail for a valid kind.
pub fn op_info(kind: OpKind) -> &'static OpInfo {
    OPERATIONS
        .iter()
        .find(|info| info.kind == kind)
        .expect("operation kind present in table")
}
