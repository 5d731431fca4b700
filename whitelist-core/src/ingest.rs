//! Incremental reading of the raw login log
//!
//! Bridges the store's ingestion cursor and the event extractor: resumes
//! at the persisted byte offset and reports the offset after the last
//! complete line, so the store can commit it together with the counts.

use crate::error::{Result, WhitelistError};
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;

/// Complete lines read past the cursor, and where they end
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSlice {
    pub lines: Vec<String>,
    /// Byte offset just past the last complete line read
    pub end_offset: u64,
}

/// Read all complete lines starting at `cursor`
///
/// A trailing line without a newline is still being written by the log
/// router and is left for the next run. If the file is shorter than the
/// cursor the log was rotated underneath us and reading restarts from the
/// beginning.
pub fn read_from(path: &Path, cursor: u64) -> Result<LogSlice> {
    let log_err = |source| WhitelistError::LogRead {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(log_err)?;
    let len = file.metadata().map_err(log_err)?.len();

    let start = if len < cursor {
        tracing::info!(
            path = %path.display(),
            cursor,
            len,
            "log shorter than cursor, assuming rotation and restarting"
        );
        0
    } else {
        cursor
    };

    let mut reader = BufReader::new(file);
    reader.seek(SeekFrom::Start(start)).map_err(log_err)?;

    let mut lines = Vec::new();
    let mut end_offset = start;
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let n = reader.read_until(b'\n', &mut buf).map_err(log_err)?;
        if n == 0 {
            break;
        }
        if buf.last() != Some(&b'\n') {
            // Partial trailing line
            break;
        }
        end_offset += n as u64;
        // Tolerate stray non-UTF-8 bytes instead of failing the run
        let line = String::from_utf8_lossy(&buf);
        lines.push(line.trim_end().to_string());
    }

    Ok(LogSlice { lines, end_offset })
}
