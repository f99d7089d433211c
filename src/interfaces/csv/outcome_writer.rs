use super::event_reader::EventType;
use crate::application::verification::VerificationResult;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
struct OutcomeRow<'a> {
    reference: &'a str,
    source: EventType,
    outcome: &'static str,
    detail: String,
}

/// Writes one CSV row per verification: `reference,source,outcome,detail`.
///
/// `detail` is `user/course` for paid outcomes and the reason otherwise.
pub struct OutcomeWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> OutcomeWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_outcome(
        &mut self,
        reference: &str,
        source: EventType,
        result: &VerificationResult,
    ) -> Result<()> {
        let (outcome, detail) = match result {
            VerificationResult::Paid { enrollment } => ("paid", enrollment.key().to_string()),
            VerificationResult::Failed { reason } => ("failed", reason.to_string()),
            VerificationResult::Retry { reason } => ("retry", reason.to_string()),
        };
        self.writer.serialize(OutcomeRow {
            reference,
            source,
            outcome,
            detail,
        })?;
        self.writer.flush()?;
        Ok(())
    }
}
