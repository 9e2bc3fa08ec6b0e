//! `.uncertainty` file format.
//!
//! Tab-delimited text with `\n` line endings. The first line is a header
//! starting with `#`; every following line is one position:
//!
//! ```text
//! #sequence_name	offset	match	mismatch_A	mismatch_C	mismatch_G	mismatch_T	deletion	insertion_after
//! chr1	1	12	0	0	1	0	0	0
//! ```
//!
//! Offsets are 1-based, rows ascend by (sequence name, offset) and positions
//! without any observation are never written.

use std::collections::BTreeMap;
use std::io::{self, BufRead, BufWriter, Write};
use std::path::Path;

use tracing::debug;

use super::classify::{Category, NUM_CATEGORIES};
use super::{CategoryCounts, Position, UncertaintyTable};
use crate::UncertaintyError;

const STREAM_DESTINATION: &str = "output stream";

/// Header line (without the trailing newline).
pub fn header_line() -> String {
    let mut header = String::from("#sequence_name\toffset");
    for category in Category::ALL {
        header.push('\t');
        header.push_str(category.column_name());
    }
    header
}

fn write_rows<W: Write>(writer: &mut W, table: &UncertaintyTable) -> io::Result<()> {
    writeln!(writer, "{}", header_line())?;
    for (position, counts) in table.iter().filter(|(_, counts)| !counts.is_zero()) {
        write!(writer, "{}\t{}", position.sequence, position.offset)?;
        for count in counts.as_array() {
            write!(writer, "\t{count}")?;
        }
        writer.write_all(b"\n")?;
    }
    writer.flush()
}

/// Write a table to an already opened sink.
pub fn write_uncertainty<W: Write>(
    writer: &mut W,
    table: &UncertaintyTable,
) -> Result<(), UncertaintyError> {
    write_rows(writer, table).map_err(|source| UncertaintyError::OutputWrite {
        destination: STREAM_DESTINATION.to_string(),
        source,
    })
}

/// Render a table into a string (useful for tests and snapshots).
pub fn render_uncertainty(table: &UncertaintyTable) -> Result<String, UncertaintyError> {
    let mut buffer = Vec::new();
    write_uncertainty(&mut buffer, table)?;
    String::from_utf8(buffer).map_err(|err| UncertaintyError::OutputWrite {
        destination: STREAM_DESTINATION.to_string(),
        source: io::Error::new(io::ErrorKind::InvalidData, err),
    })
}

/// Write a table to `path` atomically.
///
/// Rows go to a temporary file in the destination directory which is renamed
/// over `path` once complete, so `path` never holds a partial table.
pub fn write_uncertainty_file(
    path: impl AsRef<Path>,
    table: &UncertaintyTable,
) -> Result<(), UncertaintyError> {
    let path = path.as_ref();
    let wrap = |source: io::Error| UncertaintyError::OutputWrite {
        destination: path.display().to_string(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::Builder::new()
        .prefix(".uncertainty-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(wrap)?;

    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        write_rows(&mut writer, table).map_err(wrap)?;
    }
    tmp.as_file().sync_all().map_err(wrap)?;
    tmp.persist(path).map_err(|err| wrap(err.error))?;

    debug!(path = %path.display(), rows = table.len(), "uncertainty file written");
    Ok(())
}

/// Parse an uncertainty file back into a table.
///
/// Rows must be strictly ascending; all-zero rows are accepted and dropped.
pub fn parse_uncertainty<R: BufRead>(reader: R) -> Result<UncertaintyTable, UncertaintyError> {
    let mut rows: BTreeMap<Position, CategoryCounts> = BTreeMap::new();
    let mut previous: Option<Position> = None;

    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let malformed = |reason: String| UncertaintyError::MalformedRecord {
            line: line_no,
            reason,
        };

        let line = line.map_err(|err| malformed(err.to_string()))?;
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 2 + NUM_CATEGORIES {
            return Err(malformed(format!(
                "expected {} columns, found {}",
                2 + NUM_CATEGORIES,
                fields.len()
            )));
        }
        if fields[0].is_empty() {
            return Err(malformed("empty sequence name".to_string()));
        }
        let offset: u32 = fields[1]
            .parse()
            .ok()
            .filter(|&offset| offset > 0)
            .ok_or_else(|| malformed(format!("invalid offset '{}'", fields[1])))?;

        let mut counts = [0u64; NUM_CATEGORIES];
        for (slot, (field, category)) in counts
            .iter_mut()
            .zip(fields[2..].iter().zip(Category::ALL))
        {
            *slot = field
                .parse()
                .map_err(|_| malformed(format!("invalid {} count '{}'", category, field)))?;
        }

        let position = Position::new(fields[0], offset);
        if let Some(previous) = &previous {
            if *previous >= position {
                return Err(malformed(format!(
                    "{position} does not follow {previous}"
                )));
            }
        }
        previous = Some(position.clone());

        let counts = CategoryCounts::from_array(counts);
        if !counts.is_zero() {
            rows.insert(position, counts);
        }
    }

    Ok(UncertaintyTable::from_rows(rows))
}
