use std::collections::BTreeMap;
use std::str::FromStr;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::broker::topic::TopicId;
use crate::config::StoreSettings;
use crate::publisher::SnapshotSource;
use crate::utils::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableStatus {
    Available,
    Reserved,
    Occupied,
}

impl FromStr for TableStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(TableStatus::Available),
            "reserved" => Ok(TableStatus::Reserved),
            "occupied" => Ok(TableStatus::Occupied),
            other => Err(StoreError::InvalidStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub table_no: u32,
    pub status: TableStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSummary {
    pub id: u32,
    pub name: String,
}

#[derive(Debug)]
struct Store {
    name: String,
    tables: BTreeMap<u32, Table>,
}

/// The topic a store's events are published on.
pub fn store_topic(store_id: u32) -> TopicId {
    store_id.to_string()
}

/// Stores numbered `1..=count`, each with tables `1..=tables_per_store`,
/// every table starting out available.
#[derive(Debug)]
pub struct Catalog {
    stores: RwLock<BTreeMap<u32, Store>>,
}

impl Catalog {
    pub fn new(count: u32, tables_per_store: u32) -> Self {
        let stores = (1..=count)
            .map(|id| {
                let tables = (1..=tables_per_store)
                    .map(|no| {
                        (
                            no,
                            Table {
                                table_no: no,
                                status: TableStatus::Available,
                            },
                        )
                    })
                    .collect();
                let store = Store {
                    name: format!("Store {id}"),
                    tables,
                };
                (id, store)
            })
            .collect();
        Self {
            stores: RwLock::new(stores),
        }
    }

    pub fn from_settings(settings: &StoreSettings) -> Self {
        Self::new(settings.count, settings.tables_per_store)
    }

    pub fn stores(&self) -> Vec<StoreSummary> {
        self.stores
            .read()
            .iter()
            .map(|(id, store)| StoreSummary {
                id: *id,
                name: store.name.clone(),
            })
            .collect()
    }

    pub fn contains(&self, store_id: u32) -> bool {
        self.stores.read().contains_key(&store_id)
    }

    /// Topic of every store, for declaring them on the registry.
    pub fn topics(&self) -> Vec<TopicId> {
        self.stores.read().keys().copied().map(store_topic).collect()
    }

    pub fn tables(&self, store_id: u32) -> Result<Vec<Table>, StoreError> {
        let stores = self.stores.read();
        let store = stores
            .get(&store_id)
            .ok_or_else(|| StoreError::StoreNotFound(store_id.to_string()))?;
        Ok(store.tables.values().cloned().collect())
    }

    /// Sets a table's status and returns the store's tables as they stand
    /// right after the change.
    pub fn update_status(
        &self,
        store_id: u32,
        table_no: u32,
        status: &str,
    ) -> Result<Vec<Table>, StoreError> {
        let mut stores = self.stores.write();
        let store = stores
            .get_mut(&store_id)
            .ok_or_else(|| StoreError::StoreNotFound(store_id.to_string()))?;
        let table = store.tables.get_mut(&table_no).ok_or(StoreError::TableNotFound {
            store: store_id,
            table: table_no,
        })?;
        table.status = status.parse()?;
        Ok(store.tables.values().cloned().collect())
    }
}

impl SnapshotSource for Catalog {
    fn snapshot(&self, topic: &TopicId) -> Result<Value, StoreError> {
        let store_id = topic
            .parse::<u32>()
            .map_err(|_| StoreError::StoreNotFound(topic.clone()))?;
        Ok(json!(self.tables(store_id)?))
    }
}
