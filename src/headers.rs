//! Column header registry.
//!
//! Populated from the first input record, either storing the header names
//! (`--header-in`) or just the field count, in which case names are
//! synthesized as `field-<n>`.

use crate::record::Record;

#[derive(Debug, Default)]
pub struct ColumnHeaders {
    names: Option<Vec<String>>,
    count: usize,
}

impl ColumnHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture headers from `record`. With `store_names`, field contents
    /// become the column names; otherwise only the arity is kept.
    pub fn load(&mut self, record: &Record, store_names: bool) {
        self.count = record.num_fields();
        if store_names {
            let names = (1..=self.count)
                .map(|i| {
                    String::from_utf8_lossy(record.field(i).unwrap_or_default()).into_owned()
                })
                .collect();
            self.names = Some(names);
        } else {
            self.names = None;
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.count > 0
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Display name of a 1-based column.
    pub fn name_of(&self, n: usize) -> String {
        match &self.names {
            Some(names) if n >= 1 && n <= names.len() => names[n - 1].clone(),
            _ => format!("field-{n}"),
        }
    }

    /// Resolve a header name to its 1-based index. Duplicates are allowed;
    /// the first match wins.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names
            .as_ref()?
            .iter()
            .position(|h| h == name)
            .map(|i| i + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Delimiter;
    use crate::record::RecordReader;
    use std::io::Cursor;

    fn record_of(line: &[u8]) -> Record {
        let mut reader = RecordReader::new(Cursor::new(line.to_vec()), b'\n', false);
        let mut rec = Record::new();
        reader.read_into(&mut rec, Delimiter::Whitespace).unwrap();
        rec
    }

    #[test]
    fn stored_names_resolve_first_match() {
        let mut headers = ColumnHeaders::new();
        headers.load(&record_of(b"x y x z\n"), true);
        assert_eq!(headers.len(), 4);
        assert_eq!(headers.index_of("x"), Some(1));
        assert_eq!(headers.index_of("z"), Some(4));
        assert_eq!(headers.index_of("missing"), None);
        assert_eq!(headers.name_of(2), "y");
    }

    #[test]
    fn count_only_synthesizes_names() {
        let mut headers = ColumnHeaders::new();
        headers.load(&record_of(b"10 20 30\n"), false);
        assert_eq!(headers.len(), 3);
        assert_eq!(headers.index_of("10"), None);
        assert_eq!(headers.name_of(2), "field-2");
    }
}
