use serde::Serialize;
use serde::de::DeserializeOwned;
use slatedb::Db;
use slatedb::object_store::local::LocalFileSystem;
use slatedb::object_store::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Persistent state store backed by SlateDB on a local filesystem.
/// Holds leases, nodes, health checks and remediation records as JSON.
#[derive(Clone)]
pub struct StateStore {
    db: Db,
}

impl StateStore {
    /// Open (or create) a state store rooted at `path` on the local filesystem.
    pub async fn new(path: &str) -> anyhow::Result<Self> {
        info!("Opening SlateDB state store at {}", path);

        std::fs::create_dir_all(path)
            .map_err(|e| anyhow::anyhow!("Failed to create data directory {}: {}", path, e))?;

        let object_store = Arc::new(
            LocalFileSystem::new_with_prefix(path)
                .map_err(|e| anyhow::anyhow!("Failed to create local object store: {}", e))?,
        );
        let db = Db::open(Path::from("/"), object_store)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to open SlateDB: {}", e))?;
        Ok(Self { db })
    }

    /// Store a value under the given key.
    pub async fn put(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        self.db
            .put(key.as_bytes(), value)
            .await
            .map_err(|e| anyhow::anyhow!("SlateDB put failed: {}", e))
            .map(|_| ())
    }

    /// Retrieve the value for a key, or `None` if it does not exist.
    pub async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        match self.db.get(key.as_bytes()).await {
            Ok(Some(bytes)) => Ok(Some(bytes.to_vec())),
            Ok(None) => Ok(None),
            Err(e) => Err(anyhow::anyhow!("SlateDB get failed: {}", e)),
        }
    }

    /// Delete a key from the store. Deleting a missing key is not an error.
    pub async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.db
            .delete(key.as_bytes())
            .await
            .map_err(|e| anyhow::anyhow!("SlateDB delete failed: {}", e))
            .map(|_| ())
    }

    /// List all key-value pairs whose keys start with `prefix`.
    /// Returns them as `(key_string, raw_bytes)`.
    pub async fn list_prefix(&self, prefix: &str) -> anyhow::Result<Vec<(String, Vec<u8>)>> {
        let mut results = Vec::new();
        let mut iter = self
            .db
            .scan_prefix(prefix.as_bytes())
            .await
            .map_err(|e| anyhow::anyhow!("SlateDB scan_prefix failed: {}", e))?;

        while let Some(kv) = iter
            .next()
            .await
            .map_err(|e| anyhow::anyhow!("SlateDB scan of {} failed: {}", prefix, e))?
        {
            let key = String::from_utf8_lossy(&kv.key).to_string();
            results.push((key, kv.value.to_vec()));
        }
        Ok(results)
    }

    /// Serialize `value` as JSON and store it under `key`.
    pub async fn put_json<T: Serialize>(&self, key: &str, value: &T) -> anyhow::Result<()> {
        let data = serde_json::to_vec(value)?;
        self.put(key, &data).await
    }

    /// Fetch and decode a JSON value, or `None` if the key does not exist.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<T>> {
        match self.get(key).await? {
            Some(data) => {
                let value = serde_json::from_slice(&data)
                    .map_err(|e| anyhow::anyhow!("Failed to decode {}: {}", key, e))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Decode every JSON value under `prefix`. Entries that fail to decode
    /// are skipped with a warning.
    pub async fn list_json<T: DeserializeOwned>(&self, prefix: &str) -> anyhow::Result<Vec<T>> {
        let entries = self.list_prefix(prefix).await?;
        let mut values = Vec::with_capacity(entries.len());
        for (key, data) in entries {
            match serde_json::from_slice(&data) {
                Ok(v) => values.push(v),
                Err(e) => warn!("Skipping undecodable entry {}: {}", key, e),
            }
        }
        Ok(values)
    }

    /// Gracefully close the state store.
    pub async fn close(self) -> anyhow::Result<()> {
        info!("Closing SlateDB state store");
        self.db
            .close()
            .await
            .map_err(|e| anyhow::anyhow!("SlateDB close failed: {}", e))
    }
}
