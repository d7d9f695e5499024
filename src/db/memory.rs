//! In-process client store for tests and dry runs

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::error::StoreError;
use crate::types::{Client, ClientKey, CreateClientRequest, Plant, UpdateClientRequest};

use super::store::ClientStore;

#[derive(Default)]
pub struct MemoryClientStore {
    clients: Mutex<Vec<Client>>,
    plants: Mutex<Vec<Plant>>,
}

impl MemoryClientStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clients(&self) -> Vec<Client> {
        self.clients.lock().clone()
    }

    pub fn plants(&self) -> Vec<Plant> {
        self.plants.lock().clone()
    }
}

fn matches(client: &Client, key: &ClientKey) -> bool {
    match key {
        ClientKey::Document(doc) => {
            client.cpf.as_deref() == Some(doc.as_str()) || client.cnpj.as_deref() == Some(doc.as_str())
        }
        ClientKey::Installation(id) => client.installation_id.as_deref().map(str::trim) == Some(id.trim()),
    }
}

#[async_trait]
impl ClientStore for MemoryClientStore {
    async fn search(&self, tenant_id: &str, key: &ClientKey) -> Result<Option<Client>, StoreError> {
        Ok(self
            .clients
            .lock()
            .iter()
            .find(|c| c.tenant_id == tenant_id && matches(c, key))
            .cloned())
    }

    async fn create(&self, tenant_id: &str, record: &CreateClientRequest) -> Result<Client, StoreError> {
        let now = Utc::now();
        let client = Client {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.to_string(),
            name: record.name.clone(),
            cpf: record.cpf.clone(),
            cnpj: record.cnpj.clone(),
            email: record.email.clone(),
            phone: record.phone.clone(),
            street: record.street.clone(),
            city: record.city.clone(),
            state: record.state.clone(),
            postal_code: record.postal_code.clone(),
            installation_id: record.installation_id.clone(),
            plant: record.plant.clone(),
            discount_percent: record.discount_percent,
            contract_date: record.contract_date,
            notes: record.notes.clone(),
            invoices: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        self.clients.lock().push(client.clone());
        Ok(client)
    }

    async fn update(&self, id: Uuid, patch: &UpdateClientRequest) -> Result<Client, StoreError> {
        let mut clients = self.clients.lock();
        let client = clients
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(StoreError::ClientNotFound(id))?;
        patch.apply_to(client);
        Ok(client.clone())
    }

    async fn find_or_create_plant(&self, tenant_id: &str, name: &str) -> Result<(Plant, bool), StoreError> {
        let wanted = name.trim().to_lowercase();
        let mut plants = self.plants.lock();

        if let Some(existing) = plants
            .iter()
            .find(|p| p.tenant_id == tenant_id && p.name.to_lowercase() == wanted)
        {
            return Ok((existing.clone(), false));
        }

        let plant = Plant {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.to_string(),
            name: name.trim().to_string(),
            created_at: Utc::now(),
        };
        plants.push(plant.clone());
        Ok((plant, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, cpf: &str) -> CreateClientRequest {
        CreateClientRequest {
            name: name.to_string(),
            cpf: Some(cpf.to_string()),
            installation_id: Some("3001234567".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_search_by_document_is_tenant_scoped() {
        let store = MemoryClientStore::new();
        store.create("gd-sul", &record("Maria", "529.982.247-25")).await.unwrap();

        let key = ClientKey::Document("529.982.247-25".to_string());
        assert!(store.search("gd-sul", &key).await.unwrap().is_some());
        assert!(store.search("gd-norte", &key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_search_by_installation() {
        let store = MemoryClientStore::new();
        store.create("gd-sul", &record("Maria", "529.982.247-25")).await.unwrap();

        let found = store
            .search("gd-sul", &ClientKey::Installation("3001234567".to_string()))
            .await
            .unwrap();
        assert_eq!(found.map(|c| c.name), Some("Maria".to_string()));
    }

    #[tokio::test]
    async fn test_update_unknown_client() {
        let store = MemoryClientStore::new();
        let err = store.update(Uuid::nil(), &UpdateClientRequest::default()).await.unwrap_err();
        assert!(matches!(err, StoreError::ClientNotFound(_)));
    }

    #[tokio::test]
    async fn test_find_or_create_plant_is_case_insensitive() {
        let store = MemoryClientStore::new();
        let (first, created) = store.find_or_create_plant("gd-sul", "Usina Norte").await.unwrap();
        assert!(created);

        let (again, created) = store.find_or_create_plant("gd-sul", " usina norte ").await.unwrap();
        assert!(!created);
        assert_eq!(again.id, first.id);

        let (_, created) = store.find_or_create_plant("gd-norte", "Usina Norte").await.unwrap();
        assert!(created);
        assert_eq!(store.plants().len(), 2);
    }
}
