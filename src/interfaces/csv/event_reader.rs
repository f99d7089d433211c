use crate::domain::identity::{CourseId, UserId};
use crate::domain::money::{Amount, Currency};
use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::io::Read;

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    /// Checkout initialized; carries the purchase details.
    Checkout,
    /// Browser returned from the gateway redirect.
    Callback,
    /// Gateway webhook delivery.
    Webhook,
}

/// One row of the event log: `type, reference, user, course, amount, currency`.
///
/// Only `checkout` rows use the trailing columns.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct EventRecord {
    pub r#type: EventType,
    pub reference: String,
    pub user: Option<UserId>,
    pub course: Option<CourseId>,
    pub amount: Option<Amount>,
    pub currency: Option<Currency>,
}

impl EventRecord {
    /// The purchase details of a `checkout` row.
    pub fn checkout_details(&self) -> Result<(UserId, CourseId, Amount, Currency)> {
        match (&self.user, &self.course, self.amount, &self.currency) {
            (Some(user), Some(course), Some(amount), Some(currency)) => {
                Ok((user.clone(), course.clone(), amount, currency.clone()))
            }
            _ => Err(EngineError::ValidationError(format!(
                "checkout {} needs user, course, amount and currency",
                self.reference
            ))),
        }
    }
}

/// Reads payment events from a CSV source.
///
/// Wraps `csv::Reader`, trimming whitespace and tolerating short rows so
/// callback lines can omit the purchase columns.
pub struct EventReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> EventReader<R> {
    /// Creates a new `EventReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily reads and deserializes events, one `Result` per row.
    pub fn events(self) -> impl Iterator<Item = Result<EventRecord>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(EngineError::from))
    }
}
