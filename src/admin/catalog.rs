use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::error::GameError;
use crate::store::{decode_children, generate_push_key, list_as, DocumentStore, Subscription};
use crate::types::{GameEvent, GhostTemplate, Location};

/// A record kept under one top-level collection and edited from the admin
/// panel.
pub trait CatalogRecord: Serialize + DeserializeOwned + Send + Sync + 'static {
    const COLLECTION: &'static str;

    /// Stores the generated key inside the record. Records without an id
    /// field ignore it.
    fn assign_id(&mut self, _id: &str) {}

    fn validate(&self) -> Result<(), GameError>;
}

impl CatalogRecord for GhostTemplate {
    const COLLECTION: &'static str = "ghosts";

    fn assign_id(&mut self, id: &str) {
        self.id = id.to_string();
    }

    fn validate(&self) -> Result<(), GameError> {
        if self.name.trim().is_empty() {
            return Err(GameError::Validation(
                "O nome do fantasma é obrigatório.".to_string(),
            ));
        }
        if self.model_url.trim().is_empty() {
            return Err(GameError::Validation(
                "A URL do modelo .glb é obrigatória.".to_string(),
            ));
        }
        Ok(())
    }
}

impl CatalogRecord for GameEvent {
    const COLLECTION: &'static str = "events";

    fn assign_id(&mut self, id: &str) {
        self.id = id.to_string();
    }

    fn validate(&self) -> Result<(), GameError> {
        if self.name.trim().is_empty() {
            return Err(GameError::Validation(
                "O nome do evento é obrigatório.".to_string(),
            ));
        }
        let Some((start, end)) = self.window() else {
            return Err(GameError::Validation(
                "Datas e horários do evento são inválidos.".to_string(),
            ));
        };
        if end < start {
            return Err(GameError::Validation(
                "O término do evento deve ser posterior ao início.".to_string(),
            ));
        }
        Ok(())
    }
}

impl CatalogRecord for Location {
    const COLLECTION: &'static str = "locations";

    fn validate(&self) -> Result<(), GameError> {
        if self.name.trim().is_empty() {
            return Err(GameError::Validation(
                "O nome do local é obrigatório.".to_string(),
            ));
        }
        if !(-90.0..=90.0).contains(&self.lat) || !(-180.0..=180.0).contains(&self.lon) {
            return Err(GameError::Validation(
                "Coordenadas do local são inválidas.".to_string(),
            ));
        }
        if self.hunting_radius.is_some_and(|radius| radius <= 0.0) {
            return Err(GameError::Validation(
                "O raio de caça deve ser positivo.".to_string(),
            ));
        }
        Ok(())
    }
}

pub struct Catalog<T> {
    store: Arc<dyn DocumentStore>,
    _record: PhantomData<fn() -> T>,
}

pub type GhostManager = Catalog<GhostTemplate>;
pub type EventManager = Catalog<GameEvent>;
pub type LocationManager = Catalog<Location>;

impl<T: CatalogRecord> Catalog<T> {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            _record: PhantomData,
        }
    }

    fn record_path(id: &str) -> String {
        format!("{}/{id}", T::COLLECTION)
    }

    /// Writes a new record under a generated key and returns the key.
    pub async fn add(&self, mut record: T) -> Result<String, GameError> {
        record.validate()?;
        let id = generate_push_key();
        record.assign_id(&id);
        let value = serde_json::to_value(&record)
            .map_err(|error| GameError::Validation(error.to_string()))?;
        self.store.set(&Self::record_path(&id), value).await?;
        info!(collection = T::COLLECTION, id = %id, "catalog record added");
        Ok(id)
    }

    pub async fn list(&self) -> Result<Vec<(String, T)>, GameError> {
        Ok(list_as::<T>(self.store.as_ref(), T::COLLECTION).await?)
    }

    /// Full collection snapshot now and after every change.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(Vec<(String, T)>) + Send + Sync + 'static,
    {
        self.store.subscribe(
            T::COLLECTION,
            Arc::new(move |value: Value| callback(decode_children(T::COLLECTION, value))),
        )
    }

    /// Merges `fields` into an existing record. The merged record must still
    /// validate.
    pub async fn update(&self, id: &str, fields: Value) -> Result<(), GameError> {
        let path = Self::record_path(id);
        let Value::Object(patch) = &fields else {
            return Err(GameError::Validation(
                "Dados de atualização inválidos.".to_string(),
            ));
        };
        let Some(mut current) = self.store.get(&path).await? else {
            return Err(GameError::Validation(format!("Registro '{id}' não encontrado.")));
        };
        if let Value::Object(base) = &mut current {
            for (key, value) in patch {
                base.insert(key.clone(), value.clone());
            }
        }
        let merged: T = serde_json::from_value(current)
            .map_err(|error| GameError::Validation(error.to_string()))?;
        merged.validate()?;

        self.store.update(&path, fields).await?;
        info!(collection = T::COLLECTION, id, "catalog record updated");
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> Result<(), GameError> {
        self.store.remove(&Self::record_path(id)).await?;
        info!(collection = T::COLLECTION, id, "catalog record deleted");
        Ok(())
    }
}
