//! Reconciliation of inbound HL7 messages with stored records.

use crate::records::RecordStore;
use crate::status::StatusCode;
use crate::{PatientError, PatientResult};
use hl7::{InboundMessage, MessageType};
use std::sync::Arc;

/// Applies inbound messages to a [`RecordStore`].
pub struct MessageReconciler {
    records: Arc<RecordStore>,
    accept_unmatched_results: bool,
}

impl MessageReconciler {
    /// A reconciler using the store's configured handling of unmatched results.
    pub fn new(records: Arc<RecordStore>) -> Self {
        let accept_unmatched_results = records.config().accept_unmatched_results();
        Self {
            records,
            accept_unmatched_results,
        }
    }

    pub fn with_accept_unmatched_results(mut self, accept: bool) -> Self {
        self.accept_unmatched_results = accept;
        self
    }

    /// Parses one ER7 message and merges it.
    ///
    /// Orders (ORM^O01, OML^O21) and admissions append to the matched record. Results (ORU^R01)
    /// replace the request they answer. A message with no PID is [`StatusCode::NoMatch`].
    /// When PID-2 is empty a new record id is derived from the ids already stored.
    ///
    /// # Errors
    ///
    /// Returns [`PatientError::Hl7`] if the message cannot be parsed,
    /// [`PatientError::InvalidInput`] for message types that carry nothing to merge, or any
    /// store error.
    pub fn ingest(&self, text: &str) -> PatientResult<StatusCode> {
        let message = InboundMessage::from_er7(text)?;
        let control = message.control_id.as_deref().unwrap_or("<none>");

        let Some(mut patient) = message.patient else {
            tracing::info!("{} message {control} names no patient", message.message_type);
            return Ok(StatusCode::NoMatch);
        };
        if patient.id.is_none() {
            patient.id = Some(self.records.next_record_id()?);
        }

        let status = match &message.message_type {
            MessageType::AdtA01 | MessageType::OrmO01 | MessageType::OmlO21 => {
                self.records.merge_order(patient)?
            }
            MessageType::OruR01 => self
                .records
                .merge_result(patient, self.accept_unmatched_results)?,
            other => {
                return Err(PatientError::InvalidInput(format!(
                    "cannot reconcile {other} message {control}"
                )))
            }
        };

        tracing::info!("{} message {control}: {status}", message.message_type);
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;
    use crate::config::CoreConfig;
    use crate::constants::NIL_RECORD_ID;
    use crate::store::MemoryStore;
    use chrono::NaiveDate;

    const ORDER: &str = "MSH|^~\\&|LAB|HOSP|PAMS|PAMS|202407010900||ORM^O01|1001|T|2.4\r\
PID|1|0a1b2c3d-0000-0000-0000-000000000001|SYN00042^^^PAS^MR||Brown^Tom||1975-01-01|M\r\
ORC|NW|PL-1|FL-1||SC\r\
OBR|1|||^Liver Function Test|||\r";

    const RESULT: &str = "MSH|^~\\&|LAB|HOSP|PAMS|PAMS|202407020900||ORU^R01|1002|T|2.4\r\
PID|1||SYN00042^^^PAS^MR||Brown^Tom||1975-01-01|M\r\
ORC|RE|PL-1|FL-1\r\
OBR|1|||^Liver Function Test|||||||||||||||||||||F\r\
OBX|1|TX|Liver Function Test||Normal||||||F\r";

    fn reconciler() -> (Arc<RecordStore>, MessageReconciler) {
        let today = NaiveDate::from_ymd_opt(2024, 7, 4).expect("valid date");
        let records = Arc::new(RecordStore::with_allocator(
            Arc::new(MemoryStore::new()),
            Arc::new(CoreConfig::default()),
            Clock::Fixed(today),
        ));
        (records.clone(), MessageReconciler::new(records))
    }

    #[test]
    fn test_order_then_result() {
        let (records, reconciler) = reconciler();
        let id = "0a1b2c3d-0000-0000-0000-000000000001";

        assert_eq!(reconciler.ingest(ORDER).expect("order"), StatusCode::Created);
        let stored = records.get(id).expect("get").expect("present");
        assert_eq!(stored.observations.len(), 1);
        assert_eq!(stored.observations[0].status.as_deref(), Some("SC"));

        assert_eq!(reconciler.ingest(RESULT).expect("result"), StatusCode::Updated);
        let stored = records.get(id).expect("get").expect("present");
        assert_eq!(stored.observations.len(), 1);
        assert_eq!(stored.observations[0].status.as_deref(), Some("F"));
    }

    #[test]
    fn test_missing_record_id_is_derived() {
        let (records, reconciler) = reconciler();
        assert_eq!(reconciler.ingest(RESULT).expect("result"), StatusCode::Created);
        assert!(records.exists(NIL_RECORD_ID).expect("exists"));
    }

    #[test]
    fn test_unmatched_result_can_be_discarded() {
        let (_, reconciler) = reconciler();
        reconciler.ingest(ORDER).expect("order");

        let stray = RESULT.replace("PL-1|FL-1", "PL-9|FL-9");
        let strict = reconciler.with_accept_unmatched_results(false);
        assert_eq!(strict.ingest(&stray).expect("result"), StatusCode::Discarded);
    }

    #[test]
    fn test_message_without_patient() {
        let (_, reconciler) = reconciler();
        let text = "MSH|^~\\&|LAB|HOSP|PAMS|PAMS|202407010900||ORM^O01|1003|T|2.4\r";
        assert_eq!(reconciler.ingest(text).expect("ingest"), StatusCode::NoMatch);
    }

    #[test]
    fn test_unsupported_type_is_rejected() {
        let (_, reconciler) = reconciler();
        let text = "MSH|^~\\&|LAB|HOSP|PAMS|PAMS|202407010900||ADT^A08|1004|T|2.4\r\
PID|1||SYN00042^^^PAS^MR||Brown^Tom||1975-01-01|M\r";
        assert!(matches!(
            reconciler.ingest(text),
            Err(PatientError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_garbage_is_an_error() {
        let (_, reconciler) = reconciler();
        assert!(matches!(reconciler.ingest(""), Err(PatientError::Hl7(_))));
    }
}
