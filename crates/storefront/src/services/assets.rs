//! Design asset storage and relocation.
//!
//! Customers upload design files before an order exists. Uploads land under
//! `temp/{upload_session}/` and are moved to `orders/{order_id}/` once the
//! order is confirmed (paid, or placed as cash on delivery). Line item asset
//! paths are rewritten to match.

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, instrument};

use caseforge_core::OrderId;

use crate::db::{OrderStore, RepositoryError};

/// Key prefix for uploads not yet claimed by an order.
pub const TEMP_PREFIX: &str = "temp";

/// Key prefix for assets that belong to an order.
pub const ORDERS_PREFIX: &str = "orders";

/// Errors from asset storage.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("invalid asset key: {0}")]
    InvalidKey(String),

    #[error("asset I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Flat key/value blob storage for design files.
///
/// Keys are `/`-separated relative paths such as `temp/abc/front.png`.
#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), AssetError>;

    /// Keys directly under `prefix`, sorted. A missing prefix is empty.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, AssetError>;

    async fn rename(&self, from: &str, to: &str) -> Result<(), AssetError>;

    async fn exists(&self, key: &str) -> Result<bool, AssetError>;
}

/// Asset store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct LocalAssetStore {
    root: PathBuf,
}

impl LocalAssetStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory, for serving assets over HTTP.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, AssetError> {
        validate_key(key)?;
        Ok(key.split('/').fold(self.root.clone(), |path, part| path.join(part)))
    }
}

/// Reject keys that could escape the root or collide with odd filenames.
pub fn validate_key(key: &str) -> Result<(), AssetError> {
    let valid = !key.is_empty()
        && key.split('/').all(|segment| {
            !segment.is_empty()
                && segment != "."
                && segment != ".."
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        });

    if valid {
        Ok(())
    } else {
        Err(AssetError::InvalidKey(key.to_string()))
    }
}

#[async_trait]
impl AssetStore for LocalAssetStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), AssetError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, AssetError> {
        let dir = self.resolve(prefix)?;
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file()
                && let Some(name) = entry.file_name().to_str()
            {
                keys.push(format!("{prefix}/{name}"));
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), AssetError> {
        let source = self.resolve(from)?;
        let target = self.resolve(to)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::rename(&source, &target).await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, AssetError> {
        let path = self.resolve(key)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }
}

/// The upload session folder of a temporary key (`temp/{session}`).
fn temp_folder(key: &str) -> Option<&str> {
    let rest = key.strip_prefix(TEMP_PREFIX)?.strip_prefix('/')?;
    let (session, _) = rest.split_once('/')?;
    let end = TEMP_PREFIX.len() + 1 + session.len();
    key.get(..end)
}

/// Where a temporary key lands once its order claims it.
fn order_key(order_id: OrderId, key: &str) -> Option<String> {
    let name = key.rsplit('/').next()?;
    Some(format!("{ORDERS_PREFIX}/{order_id}/{name}"))
}

/// Move an order's temporary uploads under `orders/{order_id}/` and rewrite
/// line item paths.
///
/// Every file in each referenced upload session folder is moved. Running it
/// again finds nothing left under `temp/` and changes nothing. Returns the
/// number of files moved.
///
/// # Errors
///
/// Returns an error if the order's line items cannot be read, or a move or
/// path rewrite fails.
#[instrument(skip(orders, assets), fields(order_id = %order_id))]
pub async fn relocate_order_assets(
    orders: &dyn OrderStore,
    assets: &dyn AssetStore,
    order_id: OrderId,
) -> Result<usize, AssetError> {
    let lines = orders.line_items(order_id).await?;

    let folders: BTreeSet<&str> = lines
        .iter()
        .flat_map(|line| line.design_assets.iter())
        .filter_map(|key| temp_folder(key))
        .collect();

    let mut moved = 0;
    for folder in folders {
        for key in assets.list(folder).await? {
            let Some(target) = order_key(order_id, &key) else {
                continue;
            };
            assets.rename(&key, &target).await?;
            moved += 1;
        }
    }

    for line in &lines {
        let mut rewritten = Vec::with_capacity(line.design_assets.len());
        for key in &line.design_assets {
            let target = match (temp_folder(key), order_key(order_id, key)) {
                (Some(_), Some(target)) if assets.exists(&target).await? => target,
                _ => key.clone(),
            };
            rewritten.push(target);
        }

        if rewritten != line.design_assets {
            orders.update_line_item_assets(line.id, &rewritten).await?;
        }
    }

    if moved > 0 {
        info!(moved, "Relocated design assets");
    } else {
        debug!("No temporary design assets to relocate");
    }

    Ok(moved)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use rust_decimal::Decimal;

    use caseforge_core::{PaymentMethod, PhoneNumber};

    use super::*;
    use crate::db::{InventoryStore, MemoryStore};
    use crate::models::{NewLineItem, NewOrder};

    async fn order_with_assets(store: &MemoryStore, assets: Vec<String>) -> OrderId {
        let item = store
            .upsert_item("Galaxy S24", "Ốp dẻo", Decimal::from(120_000), 10, 2)
            .await
            .unwrap();
        let order = store
            .create_order(&NewOrder {
                customer_name: "Nguyễn Văn A".to_string(),
                customer_phone: PhoneNumber::parse("0912345678").unwrap(),
                customer_email: None,
                shipping_address: "1 Lê Lợi, Quận 1, TP.HCM".to_string(),
                to_district_id: Some(1442),
                to_ward_code: Some("20109".to_string()),
                payment_method: PaymentMethod::Cod,
                subtotal: Decimal::from(120_000),
                shipping_fee: Decimal::ZERO,
                total: Decimal::from(120_000),
                note: None,
                line_items: vec![NewLineItem {
                    inventory_item_id: item.id,
                    quantity: 1,
                    unit_price: Decimal::from(120_000),
                    design_assets: assets,
                }],
            })
            .await
            .unwrap();
        order.id
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("temp/abc-123/front.png").is_ok());
        assert!(validate_key("../etc/passwd").is_err());
        assert!(validate_key("temp//a.png").is_err());
        assert!(validate_key("/abs.png").is_err());
        assert!(validate_key("temp/a b.png").is_err());
        assert!(validate_key("").is_err());
    }

    #[test]
    fn test_temp_folder() {
        assert_eq!(temp_folder("temp/s1/a.png"), Some("temp/s1"));
        assert_eq!(temp_folder("orders/5/a.png"), None);
        assert_eq!(temp_folder("temp/a.png"), None);
        assert_eq!(temp_folder("temporary/s1/a.png"), None);
    }

    #[tokio::test]
    async fn test_list_missing_prefix_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let assets = LocalAssetStore::new(dir.path());
        assert!(assets.list("temp/nothing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_put_list_rename() {
        let dir = tempfile::tempdir().unwrap();
        let assets = LocalAssetStore::new(dir.path());

        assets.put("temp/s1/b.png", b"b").await.unwrap();
        assets.put("temp/s1/a.png", b"a").await.unwrap();
        assert_eq!(
            assets.list("temp/s1").await.unwrap(),
            vec!["temp/s1/a.png".to_string(), "temp/s1/b.png".to_string()]
        );

        assets.rename("temp/s1/a.png", "orders/1/a.png").await.unwrap();
        assert!(assets.exists("orders/1/a.png").await.unwrap());
        assert!(!assets.exists("temp/s1/a.png").await.unwrap());
    }

    #[tokio::test]
    async fn test_relocate_moves_session_folder_and_rewrites_paths() {
        let dir = tempfile::tempdir().unwrap();
        let assets = LocalAssetStore::new(dir.path());
        assets.put("temp/s1/front.png", b"front").await.unwrap();
        assets.put("temp/s1/preview.jpg", b"preview").await.unwrap();

        let store = Arc::new(MemoryStore::new());
        let order_id = order_with_assets(&store, vec!["temp/s1/front.png".to_string()]).await;

        let moved = relocate_order_assets(store.as_ref(), &assets, order_id)
            .await
            .unwrap();
        assert_eq!(moved, 2);

        let lines = store.line_items(order_id).await.unwrap();
        assert_eq!(
            lines[0].design_assets,
            vec![format!("orders/{order_id}/front.png")]
        );
        assert!(assets.list("temp/s1").await.unwrap().is_empty());
        assert_eq!(assets.list(&format!("orders/{order_id}")).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_relocate_twice_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let assets = LocalAssetStore::new(dir.path());
        assets.put("temp/s2/front.png", b"front").await.unwrap();

        let store = Arc::new(MemoryStore::new());
        let order_id = order_with_assets(&store, vec!["temp/s2/front.png".to_string()]).await;

        assert_eq!(
            relocate_order_assets(store.as_ref(), &assets, order_id)
                .await
                .unwrap(),
            1
        );
        assert_eq!(
            relocate_order_assets(store.as_ref(), &assets, order_id)
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_relocate_rewrites_paths_already_moved() {
        let dir = tempfile::tempdir().unwrap();
        let assets = LocalAssetStore::new(dir.path());

        let store = Arc::new(MemoryStore::new());
        let order_id = order_with_assets(&store, vec!["temp/s3/front.png".to_string()]).await;
        // A previous attempt moved the file but never rewrote the line item.
        assets
            .put(&format!("orders/{order_id}/front.png"), b"front")
            .await
            .unwrap();

        assert_eq!(
            relocate_order_assets(store.as_ref(), &assets, order_id)
                .await
                .unwrap(),
            0
        );
        let lines = store.line_items(order_id).await.unwrap();
        assert_eq!(
            lines[0].design_assets,
            vec![format!("orders/{order_id}/front.png")]
        );
    }
}
