use crate::models::AttemptInput;
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TailError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Tail a JSON-lines file of login attempts written by the auth service
///
/// Each line holds one `AttemptInput`. Lines that do not parse are logged
/// and skipped. A file that shrinks (rotated or truncated) is read again
/// from the start.
pub struct FileTailer {
    file_path: PathBuf,
    from_beginning: bool,
    reader: Option<BufReader<File>>,
    file_position: u64,
    pending: String,
}

impl FileTailer {
    /// Create a tailer that starts at the end of the file
    pub fn new(file_path: PathBuf) -> Self {
        FileTailer {
            file_path,
            from_beginning: false,
            reader: None,
            file_position: 0,
            pending: String::new(),
        }
    }

    /// Replay lines already in the file before tailing
    pub fn from_beginning(mut self, from_beginning: bool) -> Self {
        self.from_beginning = from_beginning;
        self
    }

    fn io_error(&self, source: std::io::Error) -> TailError {
        TailError::Io {
            path: self.file_path.display().to_string(),
            source,
        }
    }

    /// Initialize the file reader
    pub fn initialize(&mut self) -> Result<(), TailError> {
        let file = File::open(&self.file_path).map_err(|e| self.io_error(e))?;
        let mut reader = BufReader::new(file);

        let start = if self.from_beginning {
            SeekFrom::Start(0)
        } else {
            SeekFrom::End(0)
        };
        self.file_position = reader.seek(start).map_err(|e| self.io_error(e))?;
        self.reader = Some(reader);
        self.pending.clear();

        Ok(())
    }

    /// Read attempts appended since the last call
    pub fn read_attempts(&mut self) -> Result<Vec<AttemptInput>, TailError> {
        if self.reader.is_none() {
            self.initialize()?;
        }
        self.reopen_if_truncated()?;

        let mut attempts = Vec::new();
        let mut lines = Vec::new();

        if let Some(reader) = self.reader.as_mut() {
            loop {
                let mut line = String::new();
                let bytes_read = match reader.read_line(&mut line) {
                    Ok(n) => n,
                    Err(e) => {
                        return Err(TailError::Io {
                            path: self.file_path.display().to_string(),
                            source: e,
                        })
                    }
                };

                if bytes_read == 0 {
                    break; // EOF
                }
                self.file_position += bytes_read as u64;

                // Keep a partially written line until its newline arrives
                if !line.ends_with('\n') {
                    self.pending.push_str(&line);
                    break;
                }
                let mut full = std::mem::take(&mut self.pending);
                full.push_str(&line);
                lines.push(full);
            }
        }

        for line in lines {
            if let Some(attempt) = Self::parse_line(&line) {
                attempts.push(attempt);
            }
        }

        Ok(attempts)
    }

    fn reopen_if_truncated(&mut self) -> Result<(), TailError> {
        let len = std::fs::metadata(&self.file_path)
            .map_err(|e| self.io_error(e))?
            .len();
        if len < self.file_position {
            log::info!("{:?} was truncated, reading from the start", self.file_path);
            self.from_beginning = true;
            self.initialize()?;
        }
        Ok(())
    }

    /// Parse one JSON line; blank and malformed lines yield `None`
    pub fn parse_line(line: &str) -> Option<AttemptInput> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }
        match serde_json::from_str(trimmed) {
            Ok(attempt) => Some(attempt),
            Err(e) => {
                log::warn!("Skipping malformed attempt line: {}", e);
                None
            }
        }
    }

    /// Check if the file still exists and is readable
    pub fn is_valid(&self) -> bool {
        self.file_path.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FailureReason, UserType};
    use std::io::Write;
    use tempfile::NamedTempFile;

    const FAILED: &str = r#"{"email":"a@x.com","user_type":"seller","success":false,"failure_reason":"invalid_password","ip_address":"10.0.0.1","attempted_at":"2024-03-01T12:00:00Z"}"#;
    const SUCCEEDED: &str = r#"{"email":"b@x.com","user_type":"buyer","success":true,"ip_address":"10.0.0.2"}"#;

    #[test]
    fn test_parse_line() {
        let attempt = FileTailer::parse_line(FAILED).unwrap();
        assert_eq!(attempt.email, "a@x.com");
        assert_eq!(attempt.user_type, UserType::Seller);
        assert_eq!(attempt.failure_reason, Some(FailureReason::InvalidPassword));
        assert_eq!(attempt.ip_address.to_string(), "10.0.0.1");

        assert!(FileTailer::parse_line("not json").is_none());
        assert!(FileTailer::parse_line("   \n").is_none());
    }

    #[test]
    fn test_tail_new_lines_only() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}", FAILED).unwrap();

        let mut tailer = FileTailer::new(file.path().to_path_buf());
        assert!(tailer.read_attempts().unwrap().is_empty());

        writeln!(file, "{}", SUCCEEDED).unwrap();
        writeln!(file, "garbage").unwrap();
        let attempts = tailer.read_attempts().unwrap();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].email, "b@x.com");
    }

    #[test]
    fn test_from_beginning_and_partial_line() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}", FAILED).unwrap();
        let (head, tail) = SUCCEEDED.split_at(20);
        write!(file, "{}", head).unwrap();
        file.flush().unwrap();

        let mut tailer = FileTailer::new(file.path().to_path_buf()).from_beginning(true);
        assert_eq!(tailer.read_attempts().unwrap().len(), 1);

        writeln!(file, "{}", tail).unwrap();
        let attempts = tailer.read_attempts().unwrap();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].email, "b@x.com");
    }

    #[test]
    fn test_missing_file() {
        let mut tailer = FileTailer::new(PathBuf::from("/nonexistent/attempts.jsonl"));
        assert!(!tailer.is_valid());
        assert!(matches!(tailer.read_attempts(), Err(TailError::Io { .. })));
    }
}
