//! Minimal FASTA reader

use anyhow::{bail, Result};
use std::io::BufRead;

/// One FASTA entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub id: String,
    pub sequence: String,
}

/// Read every record from `reader`.
///
/// Header lines start with `>`; the id is the first word of the header.
/// Sequence lines are concatenated and blank lines are skipped.
pub fn read_records(reader: impl BufRead) -> Result<Vec<Record>> {
    let mut records: Vec<Record> = Vec::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(header) = line.strip_prefix('>') {
            let id = header.split_whitespace().next().unwrap_or_default();
            records.push(Record {
                id: id.to_string(),
                sequence: String::new(),
            });
            continue;
        }

        match records.last_mut() {
            Some(record) => record.sequence.push_str(line),
            None => bail!("line {}: sequence data before the first '>' header", line_no + 1),
        }
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiline_records() {
        let fasta = ">sp|P1 first protein\nMKTV\nRQER\n\n>second\nKALT\n";
        let records = read_records(fasta.as_bytes()).unwrap();

        assert_eq!(
            records,
            vec![
                Record {
                    id: "sp|P1".to_string(),
                    sequence: "MKTVRQER".to_string()
                },
                Record {
                    id: "second".to_string(),
                    sequence: "KALT".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_sequence_before_header_rejected() {
        assert!(read_records("MKTV\n>x\nKALT\n".as_bytes()).is_err());
    }

    #[test]
    fn test_empty_input() {
        assert!(read_records("".as_bytes()).unwrap().is_empty());
    }
}
