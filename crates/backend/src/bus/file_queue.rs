// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable, file-backed work queues between the model workers (C3, §4.3).
//!
//! Each file holds a JSON array of records, guarded by a single async lock.
//! Writes go to a sibling `.tmp` file and are atomically renamed over the
//! target (§4.3, §8 property 5: readers never observe a partial array).

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::Mutex;

/// A JSON-array file used as a durable work queue.
///
/// `T` must carry an `id` field accessible via [`Keyed::id`] so that
/// `update_status` can find the records to mutate.
pub struct FileQueue<T> {
    path: PathBuf,
    lock: Mutex<()>,
    _marker: std::marker::PhantomData<T>,
}

/// Records stored in a [`FileQueue`] must expose a stable string id.
pub trait Keyed {
    fn id(&self) -> &str;
}

impl<T> FileQueue<T>
where
    T: Serialize + DeserializeOwned + Clone + Keyed + Send + Sync + 'static,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()), _marker: std::marker::PhantomData }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the full array. A missing file is treated as empty (§4.3).
    async fn load_locked(&self) -> anyhow::Result<Vec<T>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading {}", self.path.display()))?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        let records: Vec<T> = serde_json::from_str(&content)
            .with_context(|| format!("parsing {}", self.path.display()))?;
        Ok(records)
    }

    /// Atomically replace the file's contents with `records`: write to a
    /// sibling temp file, then rename over the target.
    async fn write_locked(&self, records: &[T]) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.with_context(|| {
                format!("creating parent directory for {}", self.path.display())
            })?;
        }
        let tmp_path = self.path.with_extension("tmp");
        let body = serde_json::to_string_pretty(records)?;
        tokio::fs::write(&tmp_path, body)
            .await
            .with_context(|| format!("writing {}", tmp_path.display()))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .with_context(|| format!("renaming {} -> {}", tmp_path.display(), self.path.display()))?;
        Ok(())
    }

    /// Append one record to the file.
    pub async fn append(&self, record: T) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let mut records = self.load_locked().await?;
        records.push(record);
        self.write_locked(&records).await
    }

    /// Append several records as a single atomic write.
    pub async fn append_many(&self, new_records: impl IntoIterator<Item = T>) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let mut records = self.load_locked().await?;
        records.extend(new_records);
        self.write_locked(&records).await
    }

    /// All records for which `predicate` returns true.
    pub async fn load_where(&self, predicate: impl Fn(&T) -> bool) -> anyhow::Result<Vec<T>> {
        let _guard = self.lock.lock().await;
        let records = self.load_locked().await?;
        Ok(records.into_iter().filter(predicate).collect())
    }

    /// Non-destructive copy of the whole file.
    pub async fn snapshot(&self) -> anyhow::Result<Vec<T>> {
        let _guard = self.lock.lock().await;
        self.load_locked().await
    }

    /// Apply `mutate` to every record whose id is in `ids`, then write the
    /// whole array back atomically. Returns the ids that were actually
    /// found and mutated (the rest lost whatever race `mutate` was guarding
    /// against and are silently skipped, per §4.6 step 2's re-read-before-
    /// transition contract).
    pub async fn update_many(
        &self,
        ids: &[String],
        mutate: impl Fn(&mut T),
    ) -> anyhow::Result<Vec<String>> {
        let _guard = self.lock.lock().await;
        let mut records = self.load_locked().await?;
        let mut touched = Vec::new();
        for record in records.iter_mut() {
            if ids.iter().any(|id| id == record.id()) {
                mutate(record);
                touched.push(record.id().to_owned());
            }
        }
        self.write_locked(&records).await?;
        Ok(touched)
    }

    /// Read-modify-write a single record, guarded by the file lock. `mutate`
    /// returns `false` to signal the transition should be skipped (e.g. the
    /// record already changed state — §4.7 step 2's race-loss case).
    pub async fn try_transition(
        &self,
        id: &str,
        mutate: impl FnOnce(&mut T) -> bool,
    ) -> anyhow::Result<bool> {
        let _guard = self.lock.lock().await;
        let mut records = self.load_locked().await?;
        let mut applied = false;
        if let Some(record) = records.iter_mut().find(|r| r.id() == id) {
            applied = mutate(record);
        }
        if applied {
            self.write_locked(&records).await?;
        }
        Ok(applied)
    }
}
