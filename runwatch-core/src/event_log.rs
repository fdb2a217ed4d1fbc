// Copyright (c) The runwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reading captured real-time events.
//!
//! An event log is a JSON Lines file: one wire event per line. Blank lines are
//! skipped.

use crate::errors::EventLogError;
use camino::Utf8Path;
use runwatch_metadata::RunEvent;
use std::{
    fs::File,
    io::{BufRead, BufReader},
};

/// An iterator over the events of an event log.
#[derive(Debug)]
pub struct EventLogReader<R> {
    reader: R,
    line: usize,
    buf: String,
}

impl EventLogReader<BufReader<File>> {
    /// Opens an event log file.
    pub fn open(path: &Utf8Path) -> Result<Self, EventLogError> {
        let file = File::open(path).map_err(|error| EventLogError::Open {
            path: path.to_owned(),
            error,
        })?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> EventLogReader<R> {
    /// Creates a reader over any buffered source.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: 0,
            buf: String::new(),
        }
    }

    /// Returns the 1-based number of the last line read.
    pub fn line(&self) -> usize {
        self.line
    }
}

impl<R: BufRead> Iterator for EventLogReader<R> {
    type Item = Result<RunEvent, EventLogError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            self.line += 1;
            match self.reader.read_line(&mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(error) => {
                    return Some(Err(EventLogError::Read {
                        line: self.line,
                        error,
                    }));
                }
            }

            let trimmed = self.buf.trim();
            if trimmed.is_empty() {
                continue;
            }
            return Some(
                serde_json::from_str(trimmed).map_err(|error| EventLogError::Parse {
                    line: self.line,
                    error,
                }),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::Utf8TempDir;
    use indoc::indoc;
    use runwatch_metadata::RunId;

    #[test]
    fn reads_events_and_skips_blank_lines() {
        let input = indoc! {r#"
            {"id": "r1", "kind": "upsert", "fields": {"status": "pending"}}

            {"id": "r1", "kind": "delete"}
        "#};
        let events: Vec<RunEvent> = EventLogReader::new(input.as_bytes())
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1], RunEvent::Delete { id: RunId::new("r1") });
    }

    #[test]
    fn parse_errors_report_line_numbers() {
        let input = indoc! {r#"
            {"id": "r1", "kind": "upsert"}

            {"id": "r2", "kind": "rename"}
        "#};
        let mut reader = EventLogReader::new(input.as_bytes());
        assert!(reader.next().unwrap().is_ok());
        let err = reader.next().unwrap().unwrap_err();
        assert_eq!(err.line(), Some(3));
        assert_eq!(err.to_string(), "invalid event on line 3");
        assert!(reader.next().is_none());
    }

    #[test]
    fn open_reports_missing_files() {
        let dir = Utf8TempDir::new().unwrap();
        let err = EventLogReader::open(&dir.path().join("events.jsonl")).unwrap_err();
        assert!(matches!(err, EventLogError::Open { .. }), "{err:?}");
        assert_eq!(err.line(), None);
    }
}
