//! Output sinks for finished measurement records.

use crate::error::{AnemometerError, AppResult};
use crate::output::OutputRecord;
use std::io::Write;
use tokio::sync::mpsc;

/// Destination for one [`OutputRecord`] per processed burst.
pub trait RecordSink: Send {
    /// Hand a finished record to the sink.
    fn emit(&mut self, record: OutputRecord) -> AppResult<()>;
}

impl RecordSink for Vec<OutputRecord> {
    fn emit(&mut self, record: OutputRecord) -> AppResult<()> {
        self.push(record);
        Ok(())
    }
}

/// Writes each record as one line of JSON.
pub struct JsonLinesSink<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> JsonLinesSink<W> {
    /// Wrap a writer.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Recover the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> RecordSink for JsonLinesSink<W> {
    fn emit(&mut self, record: OutputRecord) -> AppResult<()> {
        serde_json::to_writer(&mut self.writer, &record).map_err(|err| {
            if err.is_io() {
                AnemometerError::Io(err.into())
            } else {
                AnemometerError::Json(err)
            }
        })?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Forwards records into an unbounded tokio channel.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<OutputRecord>,
}

impl ChannelSink {
    /// Create a sink and the receiving half of its channel.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<OutputRecord>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl RecordSink for ChannelSink {
    fn emit(&mut self, record: OutputRecord) -> AppResult<()> {
        self.tx
            .send(record)
            .map_err(|_| AnemometerError::Sink("record receiver dropped".to_string()))
    }
}
