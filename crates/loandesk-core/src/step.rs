//! Data-collection steps and submission payloads

use crate::case_file::FileId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// One named stage of case-file data collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    Customer,
    Address,
    Associates,
    Income,
    Liabilities,
    Collateral,
    Bank,
    Photos,
}

impl Step {
    /// Default declared order for a new case file
    pub const ALL: [Step; 8] = [
        Step::Customer,
        Step::Address,
        Step::Associates,
        Step::Income,
        Step::Liabilities,
        Step::Collateral,
        Step::Bank,
        Step::Photos,
    ];

    /// Wire name of the step
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Customer => "customer",
            Step::Address => "address",
            Step::Associates => "associates",
            Step::Income => "income",
            Step::Liabilities => "liabilities",
            Step::Collateral => "collateral",
            Step::Bank => "bank",
            Step::Photos => "photos",
        }
    }

    /// Path segment under `/customer-file`
    #[inline]
    #[must_use]
    pub fn segment(&self) -> &'static str {
        match self {
            Step::Customer => "customer_details",
            Step::Address => "customer_address",
            Step::Associates => "customer_associates",
            Step::Income => "customer_income",
            Step::Liabilities => "customer_liabilities",
            Step::Collateral => "customer_collateral",
            Step::Bank => "customer_bank",
            Step::Photos => "customer_photos",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Step {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Step::ALL
            .iter()
            .copied()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| format!("unknown step '{s}'"))
    }
}

/// Result of a step submission as seen by the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    /// Whether the server acknowledged the submission
    pub success: bool,
    /// Identifier assigned by the server on first creation
    pub file_id: Option<FileId>,
}

impl StepOutcome {
    /// Acknowledged submission
    #[inline]
    #[must_use]
    pub fn success(file_id: Option<FileId>) -> Self {
        Self {
            success: true,
            file_id,
        }
    }

    /// Rejected submission
    #[inline]
    #[must_use]
    pub fn failure() -> Self {
        Self {
            success: false,
            file_id: None,
        }
    }
}

/// File carried by a step submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Form field the file is bound to
    pub field: String,
    /// Original file name
    pub file_name: String,
    /// MIME type
    pub mime: String,
    /// Raw content
    pub bytes: Vec<u8>,
}

/// Form data submitted for one step
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepPayload {
    /// JSON form fields
    pub fields: Map<String, Value>,
    /// Files; any attachment turns the request into multipart
    pub attachments: Vec<Attachment>,
}

impl StepPayload {
    /// Payload from a JSON value; non-object values are wrapped under `value`
    #[must_use]
    pub fn from_json(value: Value) -> Self {
        let fields = match value {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        Self {
            fields,
            attachments: Vec::new(),
        }
    }

    /// Add a file
    #[must_use]
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Whether the request must be sent as multipart
    #[inline]
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        !self.attachments.is_empty()
    }
}
