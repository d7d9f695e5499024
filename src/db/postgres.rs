//! PostgreSQL client store
//!
//! Clients keep their invoices in a JSONB column so an invoice import is a
//! single row update, the same shape as the document store the CRM used.

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::StoreError;
use crate::types::{Client, ClientKey, CreateClientRequest, Plant, UpdateClientRequest};

use super::store::ClientStore;

const CLIENT_COLUMNS: &str = r#"
    id, tenant_id, name, cpf, cnpj, email, phone,
    street, city, state, postal_code,
    installation_id, plant, discount_percent, contract_date,
    notes, invoices, created_at, updated_at
"#;

pub struct PgClientStore {
    pool: PgPool,
}

impl PgClientStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn get(&self, id: Uuid) -> Result<Client, StoreError> {
        let sql = format!("SELECT {} FROM clients WHERE id = $1", CLIENT_COLUMNS);
        sqlx::query_as::<_, Client>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::ClientNotFound(id))
    }
}

#[async_trait]
impl ClientStore for PgClientStore {
    async fn search(&self, tenant_id: &str, key: &ClientKey) -> Result<Option<Client>, StoreError> {
        let (filter, value) = match key {
            ClientKey::Document(doc) => ("(cpf = $2 OR cnpj = $2)", doc.as_str()),
            ClientKey::Installation(id) => ("TRIM(installation_id) = $2", id.trim()),
        };
        let sql = format!(
            "SELECT {} FROM clients WHERE tenant_id = $1 AND {} ORDER BY created_at LIMIT 1",
            CLIENT_COLUMNS, filter
        );

        let client = sqlx::query_as::<_, Client>(&sql)
            .bind(tenant_id)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;

        Ok(client)
    }

    async fn create(&self, tenant_id: &str, record: &CreateClientRequest) -> Result<Client, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO clients (
                id, tenant_id, name, cpf, cnpj, email, phone,
                street, city, state, postal_code,
                installation_id, plant, discount_percent, contract_date,
                notes, invoices, created_at, updated_at
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7,
                $8, $9, $10, $11,
                $12, $13, $14, $15,
                $16, '[]'::jsonb, NOW(), NOW()
            )
            RETURNING {}
            "#,
            CLIENT_COLUMNS
        );

        let client = sqlx::query_as::<_, Client>(&sql)
            .bind(Uuid::new_v4())
            .bind(tenant_id)
            .bind(&record.name)
            .bind(&record.cpf)
            .bind(&record.cnpj)
            .bind(&record.email)
            .bind(&record.phone)
            .bind(&record.street)
            .bind(&record.city)
            .bind(&record.state)
            .bind(&record.postal_code)
            .bind(&record.installation_id)
            .bind(&record.plant)
            .bind(record.discount_percent)
            .bind(record.contract_date)
            .bind(&record.notes)
            .fetch_one(&self.pool)
            .await?;

        Ok(client)
    }

    async fn update(&self, id: Uuid, patch: &UpdateClientRequest) -> Result<Client, StoreError> {
        let mut client = self.get(id).await?;
        patch.apply_to(&mut client);

        let sql = format!(
            r#"
            UPDATE clients SET
                name = $2, cpf = $3, cnpj = $4, email = $5, phone = $6,
                street = $7, city = $8, state = $9, postal_code = $10,
                installation_id = $11, plant = $12, discount_percent = $13,
                contract_date = $14, notes = $15, invoices = $16, updated_at = $17
            WHERE id = $1
            RETURNING {}
            "#,
            CLIENT_COLUMNS
        );

        let updated = sqlx::query_as::<_, Client>(&sql)
            .bind(id)
            .bind(&client.name)
            .bind(&client.cpf)
            .bind(&client.cnpj)
            .bind(&client.email)
            .bind(&client.phone)
            .bind(&client.street)
            .bind(&client.city)
            .bind(&client.state)
            .bind(&client.postal_code)
            .bind(&client.installation_id)
            .bind(&client.plant)
            .bind(client.discount_percent)
            .bind(client.contract_date)
            .bind(&client.notes)
            .bind(Json(&client.invoices))
            .bind(client.updated_at)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::ClientNotFound(id))?;

        Ok(updated)
    }

    async fn find_or_create_plant(&self, tenant_id: &str, name: &str) -> Result<(Plant, bool), StoreError> {
        let name = name.trim();

        let inserted = sqlx::query_as::<_, Plant>(
            r#"
            INSERT INTO plants (id, tenant_id, name, created_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (tenant_id, LOWER(name)) DO NOTHING
            RETURNING id, tenant_id, name, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(tenant_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(plant) = inserted {
            return Ok((plant, true));
        }

        let existing = sqlx::query_as::<_, Plant>(
            r#"
            SELECT id, tenant_id, name, created_at
            FROM plants
            WHERE tenant_id = $1 AND LOWER(name) = LOWER($2)
            "#,
        )
        .bind(tenant_id)
        .bind(name)
        .fetch_one(&self.pool)
        .await?;

        Ok((existing, false))
    }
}
