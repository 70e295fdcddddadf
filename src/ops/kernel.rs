//! Field operation instances: accumulator state, collect, summarize, reset.
//!
//! One [`FieldOp`] pairs an operation kind with an input field. Scalar
//! kinds fold values online; vector kinds buffer the whole group (required
//! for order statistics) in either a numeric vector or a byte arena with
//! span table, both reused across groups.

use anyhow::{anyhow, bail, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha1::{Digest, Sha1};
use sha2::{Sha256, Sha512};
use std::cmp::Ordering;

use crate::config::Config;
use crate::format::format_number;
use crate::ops::{op_info, OpInfo, OpKind, OpType};
use crate::stats;
use crate::stats::{Df, ModeKind};

/// The byte joining collapsed/uniqued strings.
const COLLAPSE_SEPARATOR: u8 = b',';

/// Number types accepted by `getnum`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GetNumType {
    Hex,
    Octal,
    Integer,
    Natural,
    Decimal,
    PositiveDecimal,
}

impl GetNumType {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'h' => Some(Self::Hex),
            'o' => Some(Self::Octal),
            'i' => Some(Self::Integer),
            'n' => Some(Self::Natural),
            'd' => Some(Self::Decimal),
            'p' => Some(Self::PositiveDecimal),
            _ => None,
        }
    }
}

/// Per-kind parameter, populated by the DSL parser.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OpParams {
    None,
    /// `perc:N`, 1..=100.
    Percentile(u64),
    /// `trimmean:F`, 0..=0.5.
    TrimFraction(f64),
    /// `bin:SIZE`.
    BinSize(f64),
    /// `strbin:N`, nonzero.
    StrBinBuckets(u64),
    GetNum(GetNumType),
}

/// One operation instance bound to one input field.
#[derive(Debug)]
pub struct FieldOp {
    pub kind: OpKind,
    pub info: &'static OpInfo,
    /// 1-based input field; 0 until a named reference is resolved.
    pub field: usize,
    /// Unresolved header name, if the field was referenced by name.
    pub field_name: Option<String>,
    pub slave: bool,
    pub master: bool,
    /// Index of the slave op immediately preceding a master op.
    pub slave_idx: usize,
    pub params: OpParams,

    first: bool,
    count: u64,
    value: f64,
    /// Second scalar slot, used by `range` for the running maximum.
    value2: f64,
    values: Vec<f64>,
    str_buf: Vec<u8>,
    str_spans: Vec<(usize, usize)>,
    text: Vec<u8>,
    rng: Option<StdRng>,
}

impl FieldOp {
    pub fn new(kind: OpKind, field: usize, field_name: Option<String>) -> Self {
        let params = match kind {
            OpKind::Percentile => OpParams::Percentile(95),
            OpKind::TrimmedMean => OpParams::TrimFraction(0.0),
            OpKind::Bin => OpParams::BinSize(100.0),
            OpKind::StrBin => OpParams::StrBinBuckets(10),
            OpKind::GetNum => OpParams::GetNum(GetNumType::PositiveDecimal),
            _ => OpParams::None,
        };
        Self {
            kind,
            info: op_info(kind),
            field,
            field_name,
            slave: false,
            master: false,
            slave_idx: 0,
            params,
            first: true,
            count: 0,
            value: 0.0,
            value2: 0.0,
            values: Vec::new(),
            str_buf: Vec::new(),
            str_spans: Vec::new(),
            text: Vec::new(),
            rng: None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.info.is_numeric()
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Buffered numeric values (paired masters read their slave's buffer).
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Fix the reservoir RNG seed; entropy-seeded otherwise.
    pub fn seed_rng(&mut self, seed: u64) {
        self.rng = Some(StdRng::seed_from_u64(seed));
    }

    /// Ingest one value. `num` carries the parsed number for numeric kinds.
    /// Returns `keep_line`: whether the current input line should replace
    /// the retained group line (`--full` prints the retained line).
    pub fn collect(&mut self, s: &[u8], num: f64) -> Result<bool> {
        let mut keep_line = false;
        self.count += 1;

        if self.first && self.info.auto_first {
            self.value = num;
            self.value2 = num;
        }

        match self.kind {
            OpKind::Sum | OpKind::Mean => {
                self.value += num;
                keep_line = self.first;
            }
            OpKind::Count => {
                keep_line = self.first;
            }
            OpKind::Min => {
                if num < self.value {
                    self.value = num;
                    keep_line = true;
                }
            }
            OpKind::Max => {
                if num > self.value {
                    self.value = num;
                    keep_line = true;
                }
            }
            OpKind::AbsMin => {
                if num.abs() < self.value.abs() {
                    self.value = num;
                    keep_line = true;
                }
            }
            OpKind::AbsMax => {
                if num.abs() > self.value.abs() {
                    self.value = num;
                    keep_line = true;
                }
            }
            OpKind::Range => {
                if num < self.value {
                    self.value = num;
                }
                if num > self.value2 {
                    self.value2 = num;
                }
                keep_line = self.first;
            }
            OpKind::First => {
                if self.first {
                    self.text.clear();
                    self.text.extend_from_slice(s);
                    keep_line = true;
                }
            }
            OpKind::Last => {
                self.text.clear();
                self.text.extend_from_slice(s);
                keep_line = true;
            }
            OpKind::Rand => {
                // reservoir of size 1: the n-th value replaces with odds 1/n
                if self.first {
                    self.text.clear();
                    self.text.extend_from_slice(s);
                    keep_line = true;
                } else {
                    let rng = self.rng.get_or_insert_with(StdRng::from_entropy);
                    if rng.gen_range(0..self.count) == 0 {
                        self.text.clear();
                        self.text.extend_from_slice(s);
                        keep_line = true;
                    }
                }
            }
            OpKind::Median
            | OpKind::Quartile1
            | OpKind::Quartile3
            | OpKind::Iqr
            | OpKind::Percentile
            | OpKind::PStdev
            | OpKind::SStdev
            | OpKind::PVariance
            | OpKind::SVariance
            | OpKind::Mad
            | OpKind::MadRaw
            | OpKind::SSkewness
            | OpKind::PSkewness
            | OpKind::SExcessKurtosis
            | OpKind::PExcessKurtosis
            | OpKind::JarqueBera
            | OpKind::DpOmnibus
            | OpKind::Mode
            | OpKind::Antimode
            | OpKind::TrimmedMean
            | OpKind::PCovariance
            | OpKind::SCovariance
            | OpKind::PPearson
            | OpKind::SPearson => {
                self.values.push(num);
            }
            OpKind::Unique | OpKind::Collapse | OpKind::CountUnique => {
                let start = self.str_buf.len();
                self.str_buf.extend_from_slice(s);
                self.str_spans.push((start, s.len()));
            }
            OpKind::DeBase64 => {
                let decoded = BASE64
                    .decode(s)
                    .map_err(|_| anyhow!("invalid base64 input"))?;
                self.text = decoded;
            }
            OpKind::Base64
            | OpKind::Md5
            | OpKind::Sha1
            | OpKind::Sha256
            | OpKind::Sha512
            | OpKind::StrBin
            | OpKind::DirName
            | OpKind::BaseName
            | OpKind::ExtName
            | OpKind::BareName
            | OpKind::GetNum
            | OpKind::Cut => {
                self.text.clear();
                self.text.extend_from_slice(s);
            }
            OpKind::Bin
            | OpKind::Floor
            | OpKind::Ceil
            | OpKind::Round
            | OpKind::Trunc
            | OpKind::Frac => {
                self.value = num;
            }
        }

        self.first = false;
        Ok(keep_line)
    }

    /// Produce the group summary as output bytes. `slave_values` must carry
    /// the slave buffer for a master op and is ignored otherwise.
    pub fn summarize(&mut self, slave_values: Option<&[f64]>, cfg: &Config) -> Result<Vec<u8>> {
        let numeric = |v: f64| format_number(v, &cfg.format).into_bytes();
        let n = self.count;

        // --narm can leave a numeric buffer empty even though the group
        // itself had records
        if self.values.is_empty() && self.info.op_type == OpType::NumericVector {
            return Ok(numeric(f64::NAN));
        }

        let out = match self.kind {
            OpKind::Count => numeric(n as f64),
            OpKind::Sum | OpKind::Min | OpKind::Max | OpKind::AbsMin | OpKind::AbsMax => {
                numeric(self.value)
            }
            OpKind::Range => numeric(self.value2 - self.value),
            OpKind::Mean => numeric(self.value / n as f64),
            OpKind::Median => {
                stats::sort_values(&mut self.values);
                numeric(stats::median(&self.values))
            }
            OpKind::Quartile1 => {
                stats::sort_values(&mut self.values);
                numeric(stats::percentile(&self.values, 0.25))
            }
            OpKind::Quartile3 => {
                stats::sort_values(&mut self.values);
                numeric(stats::percentile(&self.values, 0.75))
            }
            OpKind::Iqr => {
                stats::sort_values(&mut self.values);
                numeric(
                    stats::percentile(&self.values, 0.75) - stats::percentile(&self.values, 0.25),
                )
            }
            OpKind::Percentile => {
                let OpParams::Percentile(p) = self.params else {
                    bail!("internal error: percentile parameter missing");
                };
                stats::sort_values(&mut self.values);
                numeric(stats::percentile(&self.values, p as f64 / 100.0))
            }
            OpKind::PStdev => numeric(stats::stdev(&self.values, Df::Population)),
            OpKind::SStdev => numeric(stats::stdev(&self.values, Df::Sample)),
            OpKind::PVariance => numeric(stats::variance(&self.values, Df::Population)),
            OpKind::SVariance => numeric(stats::variance(&self.values, Df::Sample)),
            OpKind::Mad => {
                stats::sort_values(&mut self.values);
                numeric(stats::mad(&self.values, 1.4826))
            }
            OpKind::MadRaw => {
                stats::sort_values(&mut self.values);
                numeric(stats::mad(&self.values, 1.0))
            }
            OpKind::PSkewness => numeric(stats::skewness(&self.values, Df::Population)),
            OpKind::SSkewness => numeric(stats::skewness(&self.values, Df::Sample)),
            OpKind::PExcessKurtosis => numeric(stats::excess_kurtosis(&self.values, Df::Population)),
            OpKind::SExcessKurtosis => numeric(stats::excess_kurtosis(&self.values, Df::Sample)),
            OpKind::JarqueBera => numeric(stats::jarque_bera_pvalue(&self.values)),
            OpKind::DpOmnibus => numeric(stats::dp_omnibus_pvalue(&self.values)),
            OpKind::Mode => {
                stats::sort_values(&mut self.values);
                numeric(stats::mode_value(&self.values, ModeKind::Mode))
            }
            OpKind::Antimode => {
                stats::sort_values(&mut self.values);
                numeric(stats::mode_value(&self.values, ModeKind::Antimode))
            }
            OpKind::TrimmedMean => {
                let OpParams::TrimFraction(t) = self.params else {
                    bail!("internal error: trimmean parameter missing");
                };
                stats::sort_values(&mut self.values);
                numeric(stats::trimmed_mean(&self.values, t))
            }
            OpKind::PCovariance | OpKind::SCovariance | OpKind::PPearson | OpKind::SPearson => {
                let xs = slave_values
                    .ok_or_else(|| anyhow!("internal error: paired op without slave values"))?;
                let ys = &self.values;
                match self.kind {
                    OpKind::PCovariance => numeric(stats::covariance(xs, ys, Df::Population)),
                    OpKind::SCovariance => numeric(stats::covariance(xs, ys, Df::Sample)),
                    _ => numeric(stats::pearson_corr(xs, ys)),
                }
            }
            OpKind::Unique => self.unique_value(cfg.case_insensitive),
            OpKind::Collapse => self.collapse_value(),
            OpKind::CountUnique => numeric(self.count_unique(cfg.case_insensitive) as f64),
            OpKind::First | OpKind::Last | OpKind::Rand | OpKind::Cut | OpKind::DeBase64 => {
                self.text.clone()
            }
            OpKind::Base64 => BASE64.encode(&self.text).into_bytes(),
            OpKind::Md5 => format!("{:x}", md5::compute(&self.text)).into_bytes(),
            OpKind::Sha1 => hex::encode(Sha1::digest(&self.text)).into_bytes(),
            OpKind::Sha256 => hex::encode(Sha256::digest(&self.text)).into_bytes(),
            OpKind::Sha512 => hex::encode(Sha512::digest(&self.text)).into_bytes(),
            OpKind::Bin => {
                let OpParams::BinSize(size) = self.params else {
                    bail!("internal error: bin parameter missing");
                };
                let mut v = (self.value / size).floor() * size;
                if v == 0.0 {
                    v = 0.0; // normalize negative zero
                }
                numeric(v)
            }
            OpKind::StrBin => {
                let OpParams::StrBinBuckets(buckets) = self.params else {
                    bail!("internal error: strbin parameter missing");
                };
                numeric((pjw_hash(&self.text) % buckets) as f64)
            }
            OpKind::Floor => numeric(self.value.floor()),
            OpKind::Ceil => numeric(self.value.ceil()),
            OpKind::Round => numeric(self.value.round()),
            OpKind::Trunc => numeric(self.value.trunc()),
            OpKind::Frac => numeric(self.value.fract()),
            OpKind::DirName => dirname(&self.text),
            OpKind::BaseName => basename(&self.text).to_vec(),
            OpKind::ExtName => guess_extension(basename(&self.text)).to_vec(),
            OpKind::BareName => {
                let base = basename(&self.text);
                let ext = guess_extension(base);
                if ext.is_empty() {
                    base.to_vec()
                } else {
                    base[..base.len() - ext.len() - 1].to_vec()
                }
            }
            OpKind::GetNum => {
                let OpParams::GetNum(ty) = self.params else {
                    bail!("internal error: getnum parameter missing");
                };
                numeric(extract_number(&self.text, ty))
            }
        };
        Ok(out)
    }

    /// Reset accumulator state for the next group; buffers keep their
    /// capacity.
    pub fn reset(&mut self) {
        self.first = true;
        self.count = 0;
        self.value = 0.0;
        self.value2 = 0.0;
        self.values.clear();
        self.str_buf.clear();
        self.str_spans.clear();
        self.text.clear();
    }

    fn string_slices(&self) -> Vec<&[u8]> {
        self.str_spans
            .iter()
            .map(|&(start, len)| &self.str_buf[start..start + len])
            .collect()
    }

    fn sorted_slices(&self, case_insensitive: bool) -> Vec<&[u8]> {
        let mut slices = self.string_slices();
        slices.sort_by(|a, b| cmp_bytes(a, b, case_insensitive));
        slices
    }

    fn unique_value(&self, case_insensitive: bool) -> Vec<u8> {
        let slices = self.sorted_slices(case_insensitive);
        let mut out = Vec::with_capacity(self.str_buf.len());
        let mut last: Option<&[u8]> = None;
        for s in slices {
            if let Some(prev) = last {
                if cmp_bytes(prev, s, case_insensitive) == Ordering::Equal {
                    continue;
                }
                out.push(COLLAPSE_SEPARATOR);
            }
            out.extend_from_slice(s);
            last = Some(s);
        }
        out
    }

    fn collapse_value(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.str_buf.len() + self.str_spans.len());
        for (i, s) in self.string_slices().iter().enumerate() {
            if i > 0 {
                out.push(COLLAPSE_SEPARATOR);
            }
            out.extend_from_slice(s);
        }
        out
    }

    fn count_unique(&self, case_insensitive: bool) -> usize {
        let slices = self.sorted_slices(case_insensitive);
        let mut count = 0;
        let mut last: Option<&[u8]> = None;
        for s in slices {
            if !matches!(last, Some(prev) if cmp_bytes(prev, s, case_insensitive) == Ordering::Equal)
            {
                count += 1;
            }
            last = Some(s);
        }
        count
    }
}

/// Byte comparison honoring the global case flag (ASCII folding).
pub fn cmp_bytes(a: &[u8], b: &[u8], case_insensitive: bool) -> Ordering {
    if case_insensitive {
        let fold = |x: &u8| x.to_ascii_lowercase();
        a.iter().map(fold).cmp(b.iter().map(fold))
    } else {
        a.cmp(b)
    }
}

/// gnulib-style rotating hash used for string binning.
fn pjw_hash(s: &[u8]) -> u64 {
    let mut h: u64 = 0;
    for &b in s {
        h = (b as u64).wrapping_add(h.rotate_left(9));
    }
    h
}

fn strip_trailing_slashes(p: &[u8]) -> &[u8] {
    let mut end = p.len();
    while end > 1 && p[end - 1] == b'/' {
        end -= 1;
    }
    &p[..end]
}

fn basename(p: &[u8]) -> &[u8] {
    if p.is_empty() {
        return b".";
    }
    let p = strip_trailing_slashes(p);
    if p == b"/" {
        return b"/";
    }
    match p.iter().rposition(|&b| b == b'/') {
        Some(i) => &p[i + 1..],
        None => p,
    }
}

fn dirname(p: &[u8]) -> Vec<u8> {
    if p.is_empty() {
        return b".".to_vec();
    }
    let p = strip_trailing_slashes(p);
    match p.iter().rposition(|&b| b == b'/') {
        None => b".".to_vec(),
        Some(0) => b"/".to_vec(),
        Some(i) => strip_trailing_slashes(&p[..i]).to_vec(),
    }
}

/// Guess the extension of a file name: up to two trailing dot-separated
/// components of 1-4 alphanumeric characters each (`tar.gz` counts as one
/// extension). Returned without the leading dot; empty when there is none.
fn guess_extension(base: &[u8]) -> &[u8] {
    fn one_component(name: &[u8]) -> Option<usize> {
        let dot = name.iter().rposition(|&b| b == b'.')?;
        if dot == 0 {
            return None; // dot-file, not an extension
        }
        let ext = &name[dot + 1..];
        if ext.is_empty() || ext.len() > 4 || !ext.iter().all(u8::is_ascii_alphanumeric) {
            return None;
        }
        Some(dot)
    }

    match one_component(base) {
        None => b"",
        Some(dot) => match one_component(&base[..dot]) {
            Some(dot2) => &base[dot2 + 1..],
            None => &base[dot + 1..],
        },
    }
}

/// Extract the first number of the requested type from a string;
/// 0 when no number is found.
fn extract_number(s: &[u8], ty: GetNumType) -> f64 {
    let allow_sign = matches!(ty, GetNumType::Integer | GetNumType::Decimal);
    let is_start = |i: usize, b: u8| -> bool {
        match ty {
            GetNumType::Hex => b.is_ascii_hexdigit(),
            GetNumType::Octal => (b'0'..=b'7').contains(&b),
            _ => {
                b.is_ascii_digit()
                    || (allow_sign
                        && b == b'-'
                        && s.get(i + 1).is_some_and(u8::is_ascii_digit))
            }
        }
    };

    let Some(start) = (0..s.len()).find(|&i| is_start(i, s[i])) else {
        return 0.0;
    };

    match ty {
        GetNumType::Hex => parse_radix(&s[start..], 16),
        GetNumType::Octal => parse_radix(&s[start..], 8),
        GetNumType::Natural | GetNumType::Integer => {
            let mut end = start;
            if s[end] == b'-' {
                end += 1;
            }
            while end < s.len() && s[end].is_ascii_digit() {
                end += 1;
            }
            lossy_parse(&s[start..end])
        }
        GetNumType::Decimal | GetNumType::PositiveDecimal => {
            let mut end = start;
            if s[end] == b'-' {
                end += 1;
            }
            let mut seen_dot = false;
            while end < s.len() {
                let b = s[end];
                if b.is_ascii_digit() {
                    end += 1;
                } else if b == b'.' && !seen_dot && s.get(end + 1).is_some_and(u8::is_ascii_digit) {
                    seen_dot = true;
                    end += 1;
                } else {
                    break;
                }
            }
            lossy_parse(&s[start..end])
        }
    }
}

fn parse_radix(s: &[u8], radix: u32) -> f64 {
    let mut v: u64 = 0;
    for &b in s {
        let Some(d) = (b as char).to_digit(radix) else {
            break;
        };
        v = v.wrapping_mul(radix as u64).wrapping_add(d as u64);
    }
    v as f64
}

fn lossy_parse(s: &[u8]) -> f64 {
    std::str::from_utf8(s)
        .ok()
        .and_then(|t| t.parse().ok())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_helpers() {
        assert_eq!(basename(b"/usr/lib/foo.txt"), b"foo.txt");
        assert_eq!(basename(b"foo.txt"), b"foo.txt");
        assert_eq!(basename(b"/usr/lib/"), b"lib");
        assert_eq!(basename(b"/"), b"/");
        assert_eq!(dirname(b"/usr/lib/foo.txt"), b"/usr/lib".to_vec());
        assert_eq!(dirname(b"foo.txt"), b".".to_vec());
        assert_eq!(dirname(b"/foo"), b"/".to_vec());
    }

    #[test]
    fn extension_guessing() {
        assert_eq!(guess_extension(b"foo.txt"), b"txt");
        assert_eq!(guess_extension(b"foo.tar.gz"), b"tar.gz");
        assert_eq!(guess_extension(b"archive.backup.tar"), b"tar");
        assert_eq!(guess_extension(b"noext"), b"");
        assert_eq!(guess_extension(b".bashrc"), b"");
    }

    #[test]
    fn getnum_extraction() {
        assert_eq!(extract_number(b"foo-123.45xx", GetNumType::PositiveDecimal), 123.45);
        assert_eq!(extract_number(b"foo-123.45xx", GetNumType::Decimal), -123.45);
        assert_eq!(extract_number(b"foo-123.45xx", GetNumType::Integer), -123.0);
        assert_eq!(extract_number(b"foo-123.45xx", GetNumType::Natural), 123.0);
        assert_eq!(extract_number(b"xff", GetNumType::Hex), 255.0);
        assert_eq!(extract_number(b"18", GetNumType::Octal), 1.0);
        assert_eq!(extract_number(b"none", GetNumType::Natural), 0.0);
    }

    #[test]
    fn pjw_hash_is_stable() {
        assert_eq!(pjw_hash(b"abc"), pjw_hash(b"abc"));
        assert_ne!(pjw_hash(b"abc"), pjw_hash(b"abd"));
    }
}
