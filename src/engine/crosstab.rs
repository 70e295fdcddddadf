//! Cross-tabulation sink.
//!
//! Collects one formatted aggregate per (row, col) group and prints the
//! matrix at end of input: sorted column headers, then one line per sorted
//! row with the filler in absent cells.

use std::io::Write;

use ahash::{AHashMap, AHashSet};
use anyhow::Result;

use crate::config::Config;

#[derive(Debug, Default)]
pub struct Crosstab {
    cells: AHashMap<(Vec<u8>, Vec<u8>), Vec<u8>>,
    rows: AHashSet<Vec<u8>>,
    cols: AHashSet<Vec<u8>>,
}

impl Crosstab {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one group's aggregate. The first value wins if the same
    /// (row, col) pair closes more than once.
    pub fn add(&mut self, row: &[u8], col: &[u8], value: Vec<u8>) {
        self.rows.insert(row.to_vec());
        self.cols.insert(col.to_vec());
        self.cells
            .entry((row.to_vec(), col.to_vec()))
            .or_insert(value);
    }

    pub fn print<W: Write>(&self, out: &mut W, cfg: &Config) -> Result<()> {
        let mut rows: Vec<&Vec<u8>> = self.rows.iter().collect();
        let mut cols: Vec<&Vec<u8>> = self.cols.iter().collect();
        rows.sort_unstable();
        cols.sort_unstable();

        let sep = [cfg.out_delimiter];
        let eol = [cfg.eol];

        // header row: leading separator, then the column names
        for col in &cols {
            out.write_all(&sep)?;
            out.write_all(col)?;
        }
        out.write_all(&eol)?;

        for row in &rows {
            out.write_all(row)?;
            for col in &cols {
                out.write_all(&sep)?;
                match self.cells.get(&((*row).clone(), (*col).clone())) {
                    Some(value) => out.write_all(value)?,
                    None => out.write_all(cfg.filler.as_bytes())?,
                }
            }
            out.write_all(&eol)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prints_sorted_matrix_with_filler() {
        let cfg = Config::default();
        let mut ct = Crosstab::new();
        ct.add(b"b", b"q", b"4".to_vec());
        ct.add(b"a", b"p", b"1".to_vec());
        ct.add(b"b", b"p", b"3".to_vec());

        let mut out = Vec::new();
        ct.print(&mut out, &cfg).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), " p q\na 1 N/A\nb 3 4\n");
    }

    #[test]
    fn first_value_wins_on_duplicate_cell() {
        let cfg = Config::default();
        let mut ct = Crosstab::new();
        ct.add(b"r", b"c", b"1".to_vec());
        ct.add(b"r", b"c", b"2".to_vec());

        let mut out = Vec::new();
        ct.print(&mut out, &cfg).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), " c\nr 1\n");
    }
}
