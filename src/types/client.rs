//! Client types

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::invoice::Invoice;

/// Client entity (one consumer unit subscribed to a GD plant)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: Uuid,
    pub tenant_id: String,
    pub name: String,
    pub cpf: Option<String>,
    pub cnpj: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,

    // Address
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,

    // Utility contract
    pub installation_id: Option<String>,
    pub plant: Option<String>,
    pub discount_percent: Option<f64>,
    pub contract_date: Option<NaiveDate>,

    pub notes: Option<String>,
    #[sqlx(json)]
    pub invoices: Vec<Invoice>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Client {
    /// The document used as natural key: CNPJ wins over CPF.
    pub fn document(&self) -> Option<&str> {
        self.cnpj.as_deref().or(self.cpf.as_deref())
    }
}

/// GD plant (usina) that clients are allocated to
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Plant {
    pub id: Uuid,
    pub tenant_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Natural key used to find an existing client
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum ClientKey {
    /// Formatted CPF or CNPJ
    Document(String),
    /// Utility installation number (UC)
    Installation(String),
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientKey::Document(doc) => write!(f, "documento {}", doc),
            ClientKey::Installation(id) => write!(f, "instalação {}", id),
        }
    }
}

/// Request to create a client; also the normalized record of a client-base row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateClientRequest {
    pub name: String,
    pub cpf: Option<String>,
    pub cnpj: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub installation_id: Option<String>,
    pub plant: Option<String>,
    pub discount_percent: Option<f64>,
    pub contract_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

impl CreateClientRequest {
    pub fn document(&self) -> Option<&str> {
        self.cnpj.as_deref().or(self.cpf.as_deref())
    }

    /// Patch that overwrites only the fields present in this record.
    pub fn to_patch(&self) -> UpdateClientRequest {
        UpdateClientRequest {
            name: Some(self.name.clone()),
            cpf: self.cpf.clone(),
            cnpj: self.cnpj.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            street: self.street.clone(),
            city: self.city.clone(),
            state: self.state.clone(),
            postal_code: self.postal_code.clone(),
            installation_id: self.installation_id.clone(),
            plant: self.plant.clone(),
            discount_percent: self.discount_percent,
            contract_date: self.contract_date,
            notes: self.notes.clone(),
            invoices: None,
        }
    }
}

/// Partial update; `None` leaves the stored value untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateClientRequest {
    pub name: Option<String>,
    pub cpf: Option<String>,
    pub cnpj: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub installation_id: Option<String>,
    pub plant: Option<String>,
    pub discount_percent: Option<f64>,
    pub contract_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub invoices: Option<Vec<Invoice>>,
}

impl UpdateClientRequest {
    /// Apply the patch to an in-memory client.
    pub fn apply_to(&self, client: &mut Client) {
        if let Some(ref v) = self.name {
            client.name = v.clone();
        }
        macro_rules! merge {
            ($($field:ident),*) => {
                $(if self.$field.is_some() {
                    client.$field = self.$field.clone();
                })*
            };
        }
        merge!(
            cpf, cnpj, email, phone, street, city, state, postal_code,
            installation_id, plant, discount_percent, contract_date, notes
        );
        if let Some(ref invoices) = self.invoices {
            client.invoices = invoices.clone();
        }
        client.updated_at = Utc::now();
    }
}
