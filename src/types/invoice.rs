//! Invoice types

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::defaults::DUPLICATE_AMOUNT_TOLERANCE;

/// Utility invoice attached to a client (stored inside the client document)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub due_date: NaiveDate,
    pub amount: f64,
    pub reference_month: Option<String>,
    pub consumption_kwh: Option<f64>,
    pub status: Option<String>,
    pub imported_at: DateTime<Utc>,
}

impl Invoice {
    /// Same due date and amount within the duplicate tolerance.
    pub fn is_same_as(&self, due_date: NaiveDate, amount: f64) -> bool {
        self.due_date == due_date && (self.amount - amount).abs() < DUPLICATE_AMOUNT_TOLERANCE
    }
}

/// Normalized invoice row, ready for persistence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceRecord {
    pub installation_id: String,
    pub due_date: NaiveDate,
    pub amount: f64,
    pub reference_month: Option<String>,
    pub consumption_kwh: Option<f64>,
    pub status: Option<String>,
}

impl InvoiceRecord {
    pub fn to_invoice(&self) -> Invoice {
        Invoice {
            due_date: self.due_date,
            amount: self.amount,
            reference_month: self.reference_month.clone(),
            consumption_kwh: self.consumption_kwh,
            status: self.status.clone(),
            imported_at: Utc::now(),
        }
    }
}
