use async_trait::async_trait;
use logrelay_schema::Log;
use std::io::{Stdout, Write};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::LogWriter;
use crate::error::SinkError;

/// Prints every record as one JSON line. Meant for debugging; it never fails a batch.
pub struct ConsoleWriter<O = Stdout> {
    out: O,
}

impl ConsoleWriter<Stdout> {
    pub fn stdout() -> Self {
        Self {
            out: std::io::stdout(),
        }
    }
}

impl<O: Write + Send> ConsoleWriter<O> {
    pub fn new(out: O) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> O {
        self.out
    }
}

#[async_trait]
impl<O: Write + Send> LogWriter for ConsoleWriter<O> {
    async fn write_logs(
        &mut self,
        _cancel: &CancellationToken,
        logs: &[Log],
    ) -> Result<(), SinkError> {
        for log in logs {
            let written = serde_json::to_string(log)
                .map_err(std::io::Error::from)
                .and_then(|line| writeln!(self.out, "{line}"));
            if let Err(err) = written {
                warn!(uuid = %log.uuid, error = %err, "Failed to print log");
            }
        }
        if let Err(err) = self.out.flush() {
            warn!(error = %err, "Failed to flush console output");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn log(uuid: &str, text: &str) -> Log {
        serde_json::from_value(json!({
            "uuid": uuid,
            "text": text,
            "time": "2024-03-01T10:00:00Z"
        }))
        .expect("valid log")
    }

    #[tokio::test]
    async fn prints_one_json_line_per_record_in_order() {
        let mut writer = ConsoleWriter::new(Vec::new());
        let logs = vec![
            log("0b5e4c1a-6a0c-4a49-9d55-3b1f2f3b8a11", "first"),
            log("1b5e4c1a-6a0c-4a49-9d55-3b1f2f3b8a11", "second"),
        ];

        writer
            .write_logs(&CancellationToken::new(), &logs)
            .await
            .expect("console never fails");

        let out = String::from_utf8(writer.into_inner()).expect("utf8");
        let lines: Vec<Value> = out
            .lines()
            .map(|l| serde_json::from_str(l).expect("json line"))
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["text"], "first");
        assert_eq!(lines[1]["text"], "second");
    }

    #[tokio::test]
    async fn empty_batch_prints_nothing() {
        let mut writer = ConsoleWriter::new(Vec::new());
        writer
            .write_logs(&CancellationToken::new(), &[])
            .await
            .expect("console never fails");
        assert!(writer.into_inner().is_empty());
    }
}
