//! # JSON File Store Module
//!
//! Single-file fallback backend for deployments without PostgreSQL.
//! Every mutation is applied to a copy, written out (temp file + rename)
//! while the data lock is held, and only then becomes visible, so memory
//! and file always hold the same committed state.
//! [`JsonStore::in_memory`] skips the file entirely and backs the tests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::db::{Store, StoreResult};
use crate::errors::StoreError;
use crate::models::{Category, NewOrder, Order, Profile};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreData {
    profiles: BTreeMap<i64, Profile>,
    orders: BTreeMap<i64, Order>,
    next_id: i64,
}

impl Default for StoreData {
    fn default() -> Self {
        Self {
            profiles: BTreeMap::new(),
            orders: BTreeMap::new(),
            next_id: 1,
        }
    }
}

/// Profiles and orders kept in memory, optionally mirrored to a JSON file
#[derive(Debug)]
pub struct JsonStore {
    path: Option<PathBuf>,
    data: Mutex<StoreData>,
}

impl JsonStore {
    /// Store that never touches disk
    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: Mutex::new(StoreData::default()),
        }
    }

    /// Open the store at `path`, starting empty if the file does not exist
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let data = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "Storage file not found, starting empty");
                StoreData::default()
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path: Some(path),
            data: Mutex::new(data),
        })
    }

    async fn persist(&self, data: &StoreData) -> StoreResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let bytes = serde_json::to_vec_pretty(data)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        debug!(path = %path.display(), "Storage file written");
        Ok(())
    }

    /// Apply `change` to a copy of the data and publish it only once the file
    /// write succeeded; a failed write leaves the store untouched.
    async fn commit<T>(
        &self,
        change: impl FnOnce(&mut StoreData) -> StoreResult<T> + Send,
    ) -> StoreResult<T> {
        let mut data = self.data.lock().await;
        let mut next = data.clone();
        let result = change(&mut next)?;
        self.persist(&next).await?;
        *data = next;
        Ok(result)
    }
}

#[async_trait]
impl Store for JsonStore {
    async fn upsert_profile(&self, profile: &Profile) -> StoreResult<()> {
        self.commit(|data| {
            data.profiles.insert(profile.user_id, profile.clone());
            Ok(())
        })
        .await
    }

    async fn get_profile(&self, user_id: i64) -> StoreResult<Profile> {
        let data = self.data.lock().await;
        data.profiles.get(&user_id).cloned().ok_or(StoreError::NotFound)
    }

    async fn delete_profile(&self, user_id: i64) -> StoreResult<()> {
        self.commit(|data| {
            data.profiles
                .remove(&user_id)
                .map(|_| ())
                .ok_or(StoreError::NotFound)
        })
        .await
    }

    async fn create_order(&self, order: NewOrder) -> StoreResult<i64> {
        self.commit(|data| {
            if data.orders.values().any(|o| o.creator_id == order.creator_id) {
                return Err(StoreError::OrderConflict {
                    creator_id: order.creator_id,
                });
            }
            let id = data.next_id;
            data.next_id += 1;
            data.orders.insert(id, Order::from_new(id, order));
            Ok(id)
        })
        .await
    }

    async fn get_order_by_creator(&self, user_id: i64) -> StoreResult<Order> {
        let data = self.data.lock().await;
        data.orders
            .values()
            .find(|o| o.creator_id == user_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_order_by_id(&self, id: i64) -> StoreResult<Order> {
        let data = self.data.lock().await;
        data.orders.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    async fn delete_order_by_id(&self, id: i64) -> StoreResult<()> {
        self.commit(|data| {
            data.orders
                .remove(&id)
                .map(|_| ())
                .ok_or(StoreError::NotFound)
        })
        .await
    }

    async fn update_order(&self, order: &Order) -> StoreResult<()> {
        self.commit(|data| {
            let stored = data.orders.get_mut(&order.id).ok_or(StoreError::NotFound)?;
            stored.category = order.category;
            stored.text = order.text.clone();
            stored.photo_file_id = order.photo_file_id.clone();
            Ok(())
        })
        .await
    }

    async fn increment_complaint(&self, order_id: i64) -> StoreResult<u32> {
        self.commit(|data| {
            let order = data.orders.get_mut(&order_id).ok_or(StoreError::NotFound)?;
            order.complaints += 1;
            Ok(order.complaints)
        })
        .await
    }

    async fn list_orders_by_category(&self, category: Category) -> StoreResult<Vec<Order>> {
        let data = self.data.lock().await;
        Ok(data
            .orders
            .values()
            .filter(|o| o.category == category)
            .cloned()
            .collect())
    }
}
