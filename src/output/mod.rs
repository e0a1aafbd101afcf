use crate::models::{LoginAttempt, SecurityAlert};
use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Output handler for attempts and alerts
pub struct OutputHandler {
    format: OutputFormat,
    writer: Option<Box<dyn Write + Send>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Jsonl,
    Console,
}

impl OutputFormat {
    /// Unknown names fall back to JSON lines
    pub fn from_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "console" => OutputFormat::Console,
            _ => OutputFormat::Jsonl,
        }
    }
}

impl OutputHandler {
    /// Create a handler appending to `file_path`, or writing to stdout
    pub fn new(format: OutputFormat, file_path: Option<PathBuf>) -> Result<Self, OutputError> {
        let writer: Option<Box<dyn Write + Send>> = match (&format, file_path) {
            (OutputFormat::Console, _) => None,
            (_, Some(path)) => {
                let file = OpenOptions::new().create(true).append(true).open(path)?;
                Some(Box::new(BufWriter::new(file)))
            }
            (_, None) => None,
        };

        Ok(OutputHandler { format, writer })
    }

    pub fn write_alert(&mut self, alert: &SecurityAlert) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(alert)?;
                self.write_output(&format!("{}\n", json))
            }
            OutputFormat::Jsonl => {
                let json = serde_json::to_string(alert)?;
                self.write_output(&format!("{}\n", json))
            }
            OutputFormat::Console => {
                let output = format!(
                    "[{}] #{} {} ({}) {} - {} <{}>, IP: {}, status: {}\n",
                    alert.created_at.format("%Y-%m-%d %H:%M:%S"),
                    alert.id,
                    alert.alert_type,
                    alert.severity,
                    alert.description,
                    alert.email,
                    alert.user_type,
                    alert.ip_address,
                    alert.status
                );
                self.write_output(&output)
            }
        }
    }

    pub fn write_attempt(&mut self, attempt: &LoginAttempt) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(attempt)?;
                self.write_output(&format!("{}\n", json))
            }
            OutputFormat::Jsonl => {
                let json = serde_json::to_string(attempt)?;
                self.write_output(&format!("{}\n", json))
            }
            OutputFormat::Console => {
                let outcome = match attempt.failure_reason {
                    Some(reason) => format!("FAILED ({})", reason),
                    None => "OK".to_string(),
                };
                let factors: Vec<&str> =
                    attempt.risk_factors.iter().map(|f| f.factor.as_str()).collect();
                let output = format!(
                    "[{}] #{} {} <{}> from {}: {}, risk {} [{}]{}\n",
                    attempt.created_at.format("%Y-%m-%d %H:%M:%S"),
                    attempt.id,
                    attempt.email,
                    attempt.user_type,
                    attempt.ip_address,
                    outcome,
                    attempt.risk_score,
                    factors.join(", "),
                    if attempt.blocked { " BLOCKED" } else { "" }
                );
                self.write_output(&output)
            }
        }
    }

    fn write_output(&mut self, data: &str) -> Result<(), OutputError> {
        match &mut self.writer {
            Some(writer) => {
                writer.write_all(data.as_bytes())?;
                writer.flush()?;
            }
            None => {
                print!("{}", data);
                io::stdout().flush()?;
            }
        }
        Ok(())
    }

    /// Flush any buffered output
    pub fn flush(&mut self) -> Result<(), OutputError> {
        if let Some(writer) = &mut self.writer {
            writer.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AttemptInput, FailureReason, UserType};
    use chrono::{TimeZone, Utc};

    fn attempt() -> LoginAttempt {
        let mut attempt = LoginAttempt::pending(AttemptInput::failure(
            "a@x.com",
            UserType::Seller,
            FailureReason::AccountSuspended,
            "1.1.1.1".parse().unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        ));
        attempt.id = 9;
        attempt
    }

    #[test]
    fn test_format_names() {
        assert_eq!(OutputFormat::from_name("JSON"), OutputFormat::Json);
        assert_eq!(OutputFormat::from_name("console"), OutputFormat::Console);
        assert_eq!(OutputFormat::from_name("xml"), OutputFormat::Jsonl);
    }

    #[test]
    fn test_jsonl_file_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attempts.jsonl");

        let mut handler = OutputHandler::new(OutputFormat::Jsonl, Some(path.clone())).unwrap();
        handler.write_attempt(&attempt()).unwrap();
        handler.write_attempt(&attempt()).unwrap();
        handler.flush().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: LoginAttempt = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed, attempt());
    }

    #[test]
    fn test_console_file_path_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("never.log");
        let mut handler = OutputHandler::new(OutputFormat::Console, Some(path.clone())).unwrap();
        handler.write_attempt(&attempt()).unwrap();
        assert!(!path.exists());
    }
}
