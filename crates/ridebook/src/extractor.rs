//! FieldExtractor: structured fields from one order record.
//!
//! Every field chain is scoped to the record element. A document-wide
//! lookup would silently pick up the neighbour's vehicle number.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::driver::{AutomationDriver, ElementHandle};
use crate::locator::LocatorChain;
use crate::resolver::SelectorResolver;
use crate::result::RidebookResult;

/// Placeholder for a field that could not be resolved
pub const FIELD_NOT_FOUND: &str = "N/A";

/// Tokens that mark a fee/amount string
pub const FEE_TOKENS: &[&str] = &["元", "$", "NT", "TWD", "費用", "車費", "金額", "車資"];

/// A fee needs at least one digit and one currency/amount token.
///
/// Rejects bare numbers such as order ids (`"12345"`).
#[must_use]
pub fn is_valid_fee(text: &str) -> bool {
    let upper = text.to_uppercase();
    text.chars().any(|c| c.is_ascii_digit()) && FEE_TOKENS.iter().any(|t| upper.contains(t))
}

/// A date-time needs at least one digit
#[must_use]
pub fn is_valid_date_time(text: &str) -> bool {
    text.chars().any(|c| c.is_ascii_digit())
}

/// Key used to deduplicate records
pub type RecordKey = (String, String, String, String);

/// Fields extracted from a retained record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedRecord {
    /// Ride date and time as displayed
    pub date_time: String,
    /// Vehicle plate
    pub vehicle_number: String,
    /// Driver name / contact
    pub driver_info: String,
    /// Fee as displayed
    pub fee_text: String,
    /// Pagination iteration that first produced the record
    pub source_iteration: usize,
}

impl ExtractedRecord {
    /// Deduplication key; ignores `source_iteration`
    #[must_use]
    pub fn key(&self) -> RecordKey {
        (
            self.date_time.clone(),
            self.vehicle_number.clone(),
            self.driver_info.clone(),
            self.fee_text.clone(),
        )
    }

    /// Number of non-mandatory fields that fell back to [`FIELD_NOT_FOUND`]
    #[must_use]
    pub fn missing_fields(&self) -> usize {
        [&self.vehicle_number, &self.driver_info, &self.fee_text]
            .iter()
            .filter(|f| f.as_str() == FIELD_NOT_FOUND)
            .count()
    }
}

/// Result of extracting one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    /// All mandatory fields present
    Extracted(ExtractedRecord),
    /// The date-time could not be resolved; record skipped
    MissingDateTime,
}

/// Locator chains for each field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldChains {
    /// Date-time chain
    pub date_time: LocatorChain,
    /// Vehicle number chain
    pub vehicle_number: LocatorChain,
    /// Driver info chain
    pub driver_info: LocatorChain,
    /// Fee chain
    pub fee_text: LocatorChain,
}

/// Extracts [`ExtractedRecord`]s from record elements
#[derive(Debug)]
pub struct FieldExtractor<'d, D: AutomationDriver + ?Sized> {
    resolver: SelectorResolver<'d, D>,
    chains: FieldChains,
}

impl<'d, D: AutomationDriver + ?Sized> FieldExtractor<'d, D> {
    /// Create an extractor
    pub const fn new(driver: &'d D, chains: FieldChains) -> Self {
        Self {
            resolver: SelectorResolver::new(driver),
            chains,
        }
    }

    async fn field<F>(
        &self,
        chain: &LocatorChain,
        record: &ElementHandle,
        accept: F,
    ) -> RidebookResult<Option<String>>
    where
        F: Fn(&str) -> bool + Send + Sync,
    {
        Ok(self
            .resolver
            .resolve_text(chain, Some(record), accept)
            .await?
            .map(|(_, text)| text))
    }

    /// Extract fields from `record`.
    ///
    /// `evidence` is corroboration text cached by the status classifier; it
    /// stands in for the driver info when that chain finds nothing.
    pub async fn extract(
        &self,
        record: &ElementHandle,
        evidence: Option<&str>,
        iteration: usize,
    ) -> RidebookResult<Extraction> {
        let Some(date_time) = self
            .field(&self.chains.date_time, record, is_valid_date_time)
            .await?
        else {
            warn!(id = %record.id, "record has no date-time, skipping");
            return Ok(Extraction::MissingDateTime);
        };
        let vehicle_number = self
            .field(&self.chains.vehicle_number, record, |_| true)
            .await?;
        let driver_info = self
            .field(&self.chains.driver_info, record, |_| true)
            .await?
            .or_else(|| evidence.map(str::to_string));
        let fee_text = self.field(&self.chains.fee_text, record, is_valid_fee).await?;

        let extracted = ExtractedRecord {
            date_time,
            vehicle_number: vehicle_number.unwrap_or_else(|| FIELD_NOT_FOUND.to_string()),
            driver_info: driver_info.unwrap_or_else(|| FIELD_NOT_FOUND.to_string()),
            fee_text: fee_text.unwrap_or_else(|| FIELD_NOT_FOUND.to_string()),
            source_iteration: iteration,
        };
        if extracted.missing_fields() > 0 {
            warn!(
                id = %record.id,
                missing = extracted.missing_fields(),
                "record extracted with missing fields"
            );
        } else {
            debug!(id = %record.id, date_time = %extracted.date_time, "record extracted");
        }
        Ok(Extraction::Extracted(extracted))
    }
}
