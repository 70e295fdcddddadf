//! Parser for the operation mini-language.
//!
//! Turns the trailing CLI arguments into a [`ProgramPlan`]: processing
//! mode, group-by columns, and the ordered operation list with ranges
//! expanded and `slave:master` pairs linked by index.

use anyhow::{bail, Result};

use crate::headers::ColumnHeaders;
use crate::ops::kernel::{FieldOp, GetNumType, OpParams};
use crate::ops::scanner::{Scanner, Token};
use crate::ops::{find_mode, find_operation, Mode, OpInfo, OpKind};

/// One group-by column, possibly still referenced by header name.
#[derive(Debug, Clone)]
pub struct GroupColumn {
    /// 1-based column; 0 until a named reference is resolved.
    pub num: usize,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CheckParams {
    pub n_lines: Option<u64>,
    pub n_fields: Option<u64>,
}

/// The parsed program: mode, group columns, operations.
#[derive(Debug)]
pub struct ProgramPlan {
    pub mode: Mode,
    pub groups: Vec<GroupColumn>,
    pub ops: Vec<FieldOp>,
    /// Some field/group reference uses a header name, so --header-in is
    /// mandatory.
    pub header_required: bool,
    pub check: CheckParams,
}

impl ProgramPlan {
    /// Resolve named references once headers are known.
    pub fn resolve_names(&mut self, headers: &ColumnHeaders) -> Result<()> {
        for grp in &mut self.groups {
            if let Some(name) = grp.name.take() {
                match headers.index_of(&name) {
                    Some(n) => grp.num = n,
                    None => bail!("column name '{name}' not found in input file"),
                }
            }
        }
        for op in &mut self.ops {
            if let Some(name) = op.field_name.take() {
                match headers.index_of(&name) {
                    Some(n) => op.field = n,
                    None => bail!("column name '{name}' not found in input file"),
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
struct ParsedField {
    num: usize,
    name: Option<String>,
    range: bool,
    pair: bool,
}

#[derive(Debug, Clone)]
enum ParsedParam {
    Int(u64),
    Float(f64),
    Word(String),
}

struct Parser {
    scanner: Scanner,
    plan: ProgramPlan,
    fields: Vec<ParsedField>,
    params: Vec<ParsedParam>,
}

/// Parse a full program from the trailing CLI arguments.
pub fn parse(args: &[String]) -> Result<ProgramPlan> {
    let mut parser = Parser::new(Scanner::from_args(args));
    parser.parse_mode_or_op()?;
    Ok(parser.plan)
}

/// Parse with `-g COLS`: the group list comes from the option argument and
/// the trailing arguments hold only operations.
pub fn parse_with_groups(group_spec: &str, args: &[String]) -> Result<ProgramPlan> {
    let mut parser = Parser::new(Scanner::from_args(&[group_spec.to_string()]));
    parser.plan.mode = Mode::GroupBy;
    parser.parse_mode_column_list(Mode::GroupBy)?;
    if parser.scanner.peek()? != Token::End {
        bail!("invalid group specification '{group_spec}'");
    }

    parser.scanner = Scanner::from_args(args);
    parser.parse_operations(Mode::GroupBy)?;
    if parser.plan.ops.is_empty() {
        bail!("missing operation");
    }
    Ok(parser.plan)
}

impl Parser {
    fn new(scanner: Scanner) -> Self {
        Self {
            scanner,
            plan: ProgramPlan {
                mode: Mode::GroupBy,
                groups: Vec::new(),
                ops: Vec::new(),
                header_required: false,
                check: CheckParams::default(),
            },
            fields: Vec::new(),
            params: Vec::new(),
        }
    }

    fn parse_mode_or_op(&mut self) -> Result<()> {
        self.scanner.peek()?;
        let first = self.scanner.text.clone();

        if find_mode(&first).is_some() {
            return self.parse_mode();
        }
        if let Some(info) = find_operation(&first) {
            self.plan.mode = info.mode;
            self.parse_operations(info.mode)?;
            if self.plan.ops.is_empty() {
                bail!("missing operation");
            }
            return Ok(());
        }
        bail!("invalid operation '{first}'");
    }

    fn parse_mode(&mut self) -> Result<()> {
        self.scanner.next_token()?;
        let mode = match find_mode(&self.scanner.text) {
            Some(m) => m,
            None => bail!("invalid operation '{}'", self.scanner.text),
        };
        self.plan.mode = mode;

        match mode {
            Mode::Transpose | Mode::Reverse | Mode::Noop => {}

            Mode::TabularCheck => self.parse_mode_check()?,

            Mode::RemoveDups => {
                self.parse_mode_column_list(mode)?;
                if self.plan.groups.len() != 1 {
                    bail!(
                        "rmdup requires exactly 1 field, found {}",
                        self.plan.groups.len()
                    );
                }
            }

            Mode::Crosstab => {
                self.parse_mode_column_list(mode)?;
                if self.plan.groups.len() != 2 {
                    bail!(
                        "crosstab requires exactly 2 fields, found {}",
                        self.plan.groups.len()
                    );
                }
                self.parse_operations(mode)?;
                if self.plan.ops.is_empty() {
                    // default crosstab aggregate: count of the row column
                    let num = self.plan.groups[0].num;
                    let name = self.plan.groups[0].name.clone();
                    if name.is_some() {
                        self.plan.header_required = true;
                    }
                    self.plan.ops.push(FieldOp::new(OpKind::Count, num, name));
                } else if self.plan.ops.len() > 1 {
                    bail!(
                        "crosstab supports one operation, found {}",
                        self.plan.ops.len()
                    );
                }
            }

            Mode::GroupBy => {
                self.parse_mode_column_list(mode)?;
                self.parse_operations(mode)?;
                if self.plan.ops.is_empty() {
                    bail!("missing operation");
                }
            }

            Mode::PerLine => unreachable!("per-line mode has no keyword"),
        }

        if self.scanner.peek()? != Token::End {
            bail!("extra operand '{}'", self.scanner.text);
        }
        Ok(())
    }

    fn parse_mode_column(&mut self, mode: Mode) -> Result<()> {
        match self.scanner.next_token()? {
            Token::Identifier => {
                self.plan.header_required = true;
                self.plan.groups.push(GroupColumn {
                    num: 0,
                    name: Some(self.scanner.text.clone()),
                });
                Ok(())
            }
            Token::Integer if self.scanner.val_int > 0 => {
                self.plan.groups.push(GroupColumn {
                    num: self.scanner.val_int as usize,
                    name: None,
                });
                Ok(())
            }
            Token::Comma | Token::End => {
                bail!("missing field for operation '{}'", mode.name())
            }
            _ => bail!(
                "invalid field '{}' for operation '{}'",
                self.scanner.text,
                mode.name()
            ),
        }
    }

    fn parse_mode_column_list(&mut self, mode: Mode) -> Result<()> {
        self.parse_mode_column(mode)?;
        while self.scanner.peek()? == Token::Comma {
            self.scanner.next_token()?;
            self.parse_mode_column(mode)?;
        }
        // group columns cannot use ranges or pairs
        match self.scanner.peek()? {
            Token::Dash => bail!("invalid field range for operation '{}'", mode.name()),
            Token::Colon => bail!("invalid field pair for operation '{}'", mode.name()),
            _ => Ok(()),
        }
    }

    fn parse_mode_check(&mut self) -> Result<()> {
        while self.scanner.peek()? != Token::End {
            let tok = self.scanner.next_token()?;
            let (value, set_lines) = if tok == Token::Integer {
                let value = self.scanner.val_int;
                if self.scanner.next_token()? != Token::Identifier {
                    bail!(
                        "invalid option '{}' for operation check",
                        self.scanner.text
                    );
                }
                (value, check_keyword(&self.scanner.text)?)
            } else {
                let set_lines = check_keyword(&self.scanner.text)?;
                if self.scanner.next_token()? != Token::Integer {
                    bail!("number expected after option in operation 'check'");
                }
                (self.scanner.val_int, set_lines)
            };

            if value == 0 {
                bail!("invalid value zero for lines/fields in operation 'check'");
            }
            if set_lines {
                if self.plan.check.n_lines.is_some() {
                    bail!("number of lines/rows already set in operation 'check'");
                }
                self.plan.check.n_lines = Some(value);
            } else {
                if self.plan.check.n_fields.is_some() {
                    bail!("number of fields/columns already set in operation 'check'");
                }
                self.plan.check.n_fields = Some(value);
            }
        }
        Ok(())
    }

    fn parse_operations(&mut self, mode: Mode) -> Result<()> {
        while self.scanner.peek()? != Token::End {
            self.parse_operation(mode)?;
        }
        Ok(())
    }

    fn parse_operation(&mut self, mode: Mode) -> Result<()> {
        self.fields.clear();
        self.params.clear();

        self.scanner.next_token()?;
        let name = self.scanner.text.clone();
        let info = match find_operation(&name) {
            Some(info) => info,
            None => {
                if find_mode(&name).is_some() {
                    bail!("conflicting operation '{name}'");
                }
                bail!("invalid operation '{name}'");
            }
        };

        if !compatible_modes(mode, info.mode) {
            bail!(
                "conflicting operation found: expecting {} operations, \
                 but found {} operation '{}'",
                mode.name(),
                info.mode.name(),
                name
            );
        }

        self.parse_operation_params(info)?;
        self.parse_operation_column_list(info)?;
        self.create_field_ops(info)
    }

    /// Operation parameters (`perc:40`). Whitespace is significant here so
    /// that `perc:10: 4` fails instead of taking `4` as a parameter.
    fn parse_operation_params(&mut self, info: &'static OpInfo) -> Result<()> {
        self.scanner.keep_whitespace = true;
        let result = self.parse_operation_params_inner(info);
        self.scanner.keep_whitespace = false;
        result
    }

    fn parse_operation_params_inner(&mut self, info: &'static OpInfo) -> Result<()> {
        while self.scanner.peek()? == Token::Colon {
            self.scanner.next_token()?;
            match self.scanner.next_token()? {
                Token::Integer => self.params.push(ParsedParam::Int(self.scanner.val_int)),
                Token::Float => self.params.push(ParsedParam::Float(self.scanner.val_float)),
                Token::Identifier if info.kind == OpKind::GetNum => {
                    self.params.push(ParsedParam::Word(self.scanner.text.clone()))
                }
                Token::Whitespace | Token::End => {
                    bail!("missing parameter for operation '{}'", info.name)
                }
                _ => bail!(
                    "invalid parameter '{}' for operation '{}'",
                    self.scanner.text,
                    info.name
                ),
            }
        }
        if self.scanner.peek()? == Token::Whitespace {
            self.scanner.next_token()?;
        }
        Ok(())
    }

    fn parse_operation_column_list(&mut self, info: &'static OpInfo) -> Result<()> {
        self.parse_operation_column(info)?;
        while self.scanner.peek()? == Token::Comma {
            self.scanner.next_token()?;
            self.parse_operation_column(info)?;
        }
        Ok(())
    }

    fn parse_operation_column(&mut self, info: &'static OpInfo) -> Result<()> {
        let p = self.parse_simple_column(info, false, false)?;
        let p_idx = self.fields.len();
        self.fields.push(p);

        if self.scanner.peek()? == Token::Colon {
            self.scanner.next_token()?;
            self.fields[p_idx].pair = true;
            let q = self.parse_simple_column(info, false, true)?;
            self.fields.push(q);
        }

        if self.scanner.peek()? == Token::Dash {
            self.scanner.next_token()?;
            self.fields[p_idx].range = true;
            let q = self.parse_simple_column(info, true, false)?;
            let from = &self.fields[p_idx];
            if from.name.is_some() || q.name.is_some() {
                bail!("field range for '{}' must be numeric", info.name);
            }
            if from.num >= q.num {
                bail!("invalid field range for operation '{}'", info.name);
            }
            self.fields.push(q);
        }
        Ok(())
    }

    fn parse_simple_column(
        &mut self,
        info: &'static OpInfo,
        in_range: bool,
        in_pair: bool,
    ) -> Result<ParsedField> {
        match self.scanner.next_token()? {
            Token::Identifier => Ok(ParsedField {
                name: Some(self.scanner.text.clone()),
                ..Default::default()
            }),
            Token::Comma => bail!("missing field for operation '{}'", info.name),
            Token::End => {
                if in_range {
                    bail!("invalid field range for operation '{}'", info.name);
                }
                if in_pair {
                    bail!("invalid field pair for operation '{}'", info.name);
                }
                bail!("missing field for operation '{}'", info.name);
            }
            Token::Dash => bail!("invalid field range for operation '{}'", info.name),
            Token::Colon => bail!("invalid field pair for operation '{}'", info.name),
            Token::Integer if self.scanner.val_int > 0 => Ok(ParsedField {
                num: self.scanner.val_int as usize,
                ..Default::default()
            }),
            _ => bail!(
                "invalid field '{}' for operation '{}'",
                self.scanner.text,
                info.name
            ),
        }
    }

    fn create_field_ops(&mut self, info: &'static OpInfo) -> Result<()> {
        let fields = std::mem::take(&mut self.fields);
        let mut i = 0;
        while i < fields.len() {
            let f = &fields[i];
            self.add_op(info, f.num, f.name.clone())?;

            if info.needs_pair() && !f.pair {
                bail!("operation '{}' requires field pairs", info.name);
            }
            if !info.needs_pair() && f.pair {
                bail!("operation '{}' cannot use pair of fields", info.name);
            }

            if f.range {
                let to = fields[i + 1].num;
                i += 1;
                for num in f.num + 1..=to {
                    self.add_op(info, num, None)?;
                }
            }

            if f.pair {
                let slave_idx = self.plan.ops.len() - 1;
                self.plan.ops[slave_idx].slave = true;

                let other = &fields[i + 1];
                i += 1;
                self.add_op(info, other.num, other.name.clone())?;
                let master = self
                    .plan
                    .ops
                    .last_mut()
                    .expect("op pushed just above");
                master.master = true;
                master.slave_idx = slave_idx;
            }

            i += 1;
        }
        Ok(())
    }

    fn add_op(&mut self, info: &'static OpInfo, num: usize, name: Option<String>) -> Result<()> {
        if name.is_some() {
            self.plan.header_required = true;
        }
        let mut op = FieldOp::new(info.kind, num, name);
        self.set_op_params(&mut op)?;
        self.plan.ops.push(op);
        Ok(())
    }

    fn set_op_params(&mut self, op: &mut FieldOp) -> Result<()> {
        let too_many = |name: &str| format!("too many parameters for operation '{name}'");

        match op.kind {
            OpKind::Bin => {
                if self.params.len() > 1 {
                    bail!(too_many("bin"));
                }
                if let Some(p) = self.params.first() {
                    let size = match p {
                        ParsedParam::Int(v) => *v as f64,
                        ParsedParam::Float(f) => *f,
                        ParsedParam::Word(w) => {
                            bail!("invalid parameter '{w}' for operation 'bin'")
                        }
                    };
                    op.params = OpParams::BinSize(size);
                }
            }
            OpKind::StrBin => {
                if self.params.len() > 1 {
                    bail!(too_many("strbin"));
                }
                if let Some(p) = self.params.first() {
                    let buckets = match p {
                        ParsedParam::Int(v) => *v,
                        _ => bail!("invalid parameter for operation 'strbin'"),
                    };
                    if buckets == 0 {
                        bail!("strbin bucket size must not be zero");
                    }
                    op.params = OpParams::StrBinBuckets(buckets);
                }
            }
            OpKind::Percentile => {
                if self.params.len() > 1 {
                    bail!(too_many("perc"));
                }
                if let Some(p) = self.params.first() {
                    let pct = match p {
                        ParsedParam::Int(v) => *v,
                        ParsedParam::Float(f) => bail!("invalid percentile value {f}"),
                        ParsedParam::Word(w) => bail!("invalid percentile value {w}"),
                    };
                    if pct == 0 || pct > 100 {
                        bail!("invalid percentile value {pct}");
                    }
                    op.params = OpParams::Percentile(pct);
                }
            }
            OpKind::TrimmedMean => {
                if self.params.len() > 1 {
                    bail!(too_many("trimmean"));
                }
                if let Some(p) = self.params.first() {
                    let t = match p {
                        ParsedParam::Int(v) => *v as f64,
                        ParsedParam::Float(f) => *f,
                        ParsedParam::Word(w) => {
                            bail!("invalid parameter '{w}' for operation 'trimmean'")
                        }
                    };
                    if !(0.0..=0.5).contains(&t) {
                        bail!("invalid trim mean value {t} (expected 0 <= X <= 0.5)");
                    }
                    op.params = OpParams::TrimFraction(t);
                }
            }
            OpKind::GetNum => {
                if self.params.len() > 1 {
                    bail!(too_many("getnum"));
                }
                if let Some(p) = self.params.first() {
                    let word = match p {
                        ParsedParam::Word(w) => w.clone(),
                        ParsedParam::Int(v) => v.to_string(),
                        ParsedParam::Float(f) => f.to_string(),
                    };
                    let c = word.chars().next().unwrap_or(' ');
                    match GetNumType::from_char(c) {
                        Some(ty) => op.params = OpParams::GetNum(ty),
                        None => bail!("invalid getnum type '{c}'"),
                    }
                }
            }
            _ => {
                if !self.params.is_empty() {
                    bail!(too_many(op.info.name));
                }
            }
        }
        Ok(())
    }
}

fn compatible_modes(current: Mode, added: Mode) -> bool {
    current == added || (current == Mode::Crosstab && added == Mode::GroupBy)
}

fn check_keyword(s: &str) -> Result<bool> {
    match s {
        "lines" | "line" | "rows" | "row" => Ok(true),
        "fields" | "field" | "columns" | "column" | "col" => Ok(false),
        _ => bail!("invalid option '{s}' for operation check"),
    }
}
