//! JSON-file-backed group catalog.

use std::collections::BTreeMap;
use std::path::PathBuf;

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::{
    EngineError, FileRecord, Group, GroupSummary, SourceEntry, SourceStatus, WebpageRecord,
};

type Catalog = BTreeMap<Uuid, Group>;

/// Owns the catalog file.
///
/// Every operation takes the process-wide lock, reads the whole file,
/// mutates in memory, and writes the whole file back, which makes each call
/// atomic with respect to other calls in the same process. Multiple
/// processes sharing one catalog file are not protected; see DESIGN.md.
#[derive(Debug)]
pub struct GroupManager {
    catalog_file: PathBuf,
    data_path: PathBuf,
    lock: Mutex<()>,
}

impl GroupManager {
    pub fn new(data_path: impl Into<PathBuf>, catalog_file: impl Into<PathBuf>) -> Self {
        Self {
            catalog_file: catalog_file.into(),
            data_path: data_path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Creates a group with a fresh id and its physical directory.
    pub async fn create_group(&self, name: &str, description: &str) -> Result<Group, EngineError> {
        let _guard = self.lock.lock().await;
        let mut catalog = self.load().await?;

        if catalog.values().any(|g| g.name == name) {
            return Err(EngineError::conflict(format!(
                "group '{name}' already exists"
            )));
        }

        let id = Uuid::new_v4();
        let directory = self.data_path.join(id.to_string());
        tokio::fs::create_dir_all(&directory)
            .await
            .map_err(|e| EngineError::storage(format!("create {}: {e}", directory.display())))?;

        let group = Group::new(id, name, description, directory.to_string_lossy());
        catalog.insert(id, group.clone());
        self.store(&catalog).await?;

        tracing::info!(group_id = %id, name, "group created");
        Ok(group)
    }

    pub async fn list_groups(&self) -> Result<Vec<GroupSummary>, EngineError> {
        let _guard = self.lock.lock().await;
        let catalog = self.load().await?;
        Ok(catalog.values().map(Group::summary).collect())
    }

    pub async fn get_group(&self, group_id: Uuid) -> Result<Group, EngineError> {
        let _guard = self.lock.lock().await;
        let catalog = self.load().await?;
        catalog
            .get(&group_id)
            .cloned()
            .ok_or_else(|| EngineError::not_found(format!("group {group_id}")))
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Option<Group>, EngineError> {
        let _guard = self.lock.lock().await;
        let catalog = self.load().await?;
        Ok(catalog.values().find(|g| g.name == name).cloned())
    }

    /// Merged file + webpage listing for one group.
    pub async fn list_sources(&self, group_id: Uuid) -> Result<Vec<SourceEntry>, EngineError> {
        Ok(self.get_group(group_id).await?.sources())
    }

    /// Appends a file record; the file name must be unique in the group.
    pub async fn add_file_meta(
        &self,
        group_id: Uuid,
        record: FileRecord,
    ) -> Result<(), EngineError> {
        let _guard = self.lock.lock().await;
        let mut catalog = self.load().await?;
        let group = group_mut(&mut catalog, group_id)?;

        if group.file_by_name(&record.original_name).is_some() {
            return Err(EngineError::duplicate_source(format!(
                "file '{}' already exists in group {group_id}",
                record.original_name
            )));
        }

        group.files.push(record);
        self.store(&catalog).await
    }

    /// Appends a webpage record; the URL must be unique in the group.
    pub async fn add_webpage_meta(
        &self,
        group_id: Uuid,
        record: WebpageRecord,
    ) -> Result<(), EngineError> {
        let _guard = self.lock.lock().await;
        let mut catalog = self.load().await?;
        let group = group_mut(&mut catalog, group_id)?;

        if group.webpage_by_url(&record.url).is_some() {
            return Err(EngineError::duplicate_source(format!(
                "webpage '{}' already exists in group {group_id}",
                record.url
            )));
        }

        group.webpages.push(record);
        self.store(&catalog).await
    }

    pub async fn update_file_status(
        &self,
        group_id: Uuid,
        file_id: Uuid,
        status: SourceStatus,
    ) -> Result<(), EngineError> {
        let _guard = self.lock.lock().await;
        let mut catalog = self.load().await?;
        let group = group_mut(&mut catalog, group_id)?;

        let record = group
            .files
            .iter_mut()
            .find(|f| f.id == file_id)
            .ok_or_else(|| EngineError::not_found(format!("file {file_id} in group {group_id}")))?;
        record.status = status;

        self.store(&catalog).await
    }

    pub async fn update_webpage_status(
        &self,
        group_id: Uuid,
        webpage_id: Uuid,
        status: SourceStatus,
    ) -> Result<(), EngineError> {
        let _guard = self.lock.lock().await;
        let mut catalog = self.load().await?;
        let group = group_mut(&mut catalog, group_id)?;

        let record = group
            .webpages
            .iter_mut()
            .find(|w| w.id == webpage_id)
            .ok_or_else(|| {
                EngineError::not_found(format!("webpage {webpage_id} in group {group_id}"))
            })?;
        record.status = status;

        self.store(&catalog).await
    }

    /// Removes a file record and returns it.
    pub async fn remove_file_meta(
        &self,
        group_id: Uuid,
        file_id: Uuid,
    ) -> Result<FileRecord, EngineError> {
        let _guard = self.lock.lock().await;
        let mut catalog = self.load().await?;
        let group = group_mut(&mut catalog, group_id)?;

        let position = group
            .files
            .iter()
            .position(|f| f.id == file_id)
            .ok_or_else(|| EngineError::not_found(format!("file {file_id} in group {group_id}")))?;
        let record = group.files.remove(position);

        self.store(&catalog).await?;
        Ok(record)
    }

    /// Removes a webpage record and returns it.
    pub async fn remove_webpage_meta(
        &self,
        group_id: Uuid,
        webpage_id: Uuid,
    ) -> Result<WebpageRecord, EngineError> {
        let _guard = self.lock.lock().await;
        let mut catalog = self.load().await?;
        let group = group_mut(&mut catalog, group_id)?;

        let position = group
            .webpages
            .iter()
            .position(|w| w.id == webpage_id)
            .ok_or_else(|| {
                EngineError::not_found(format!("webpage {webpage_id} in group {group_id}"))
            })?;
        let record = group.webpages.remove(position);

        self.store(&catalog).await?;
        Ok(record)
    }

    /// Removes a group's catalog entry. Returns `None` when the group was
    /// not present, which callers treat as already-deleted.
    pub async fn remove_group(&self, group_id: Uuid) -> Result<Option<Group>, EngineError> {
        let _guard = self.lock.lock().await;
        let mut catalog = self.load().await?;
        let removed = catalog.remove(&group_id);
        if removed.is_some() {
            self.store(&catalog).await?;
        }
        Ok(removed)
    }

    async fn load(&self) -> Result<Catalog, EngineError> {
        match tokio::fs::read(&self.catalog_file).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                EngineError::catalog_io(format!("parse {}: {e}", self.catalog_file.display()))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Catalog::new()),
            Err(e) => Err(EngineError::catalog_io(format!(
                "read {}: {e}",
                self.catalog_file.display()
            ))),
        }
    }

    async fn store(&self, catalog: &Catalog) -> Result<(), EngineError> {
        if let Some(parent) = self.catalog_file.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                EngineError::catalog_io(format!("create {}: {e}", parent.display()))
            })?;
        }
        let json = serde_json::to_vec_pretty(catalog)
            .map_err(|e| EngineError::catalog_io(format!("encode catalog: {e}")))?;
        tokio::fs::write(&self.catalog_file, json).await.map_err(|e| {
            EngineError::catalog_io(format!("write {}: {e}", self.catalog_file.display()))
        })
    }
}

fn group_mut(catalog: &mut Catalog, group_id: Uuid) -> Result<&mut Group, EngineError> {
    catalog
        .get_mut(&group_id)
        .ok_or_else(|| EngineError::not_found(format!("group {group_id}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn manager(dir: &std::path::Path) -> GroupManager {
        GroupManager::new(dir.join("data"), dir.join("data/group_meta.json"))
    }

    #[tokio::test]
    async fn test_create_group_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let group = manager(dir.path())
            .create_group("astronomy", "space notes")
            .await
            .unwrap();

        let reloaded = manager(dir.path()).get_group(group.id).await.unwrap();
        assert_eq!(reloaded.name, "astronomy");
        assert_eq!(reloaded.description, "space notes");
        assert!(std::path::Path::new(&reloaded.directory).is_dir());
    }

    #[tokio::test]
    async fn test_duplicate_group_name_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        manager.create_group("astronomy", "").await.unwrap();

        let err = manager.create_group("astronomy", "again").await.unwrap_err();
        assert!(matches!(err, EngineError::Conflict { .. }));
        assert_eq!(manager.list_groups().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_add_file_meta_rejects_duplicate_names() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        let group = manager.create_group("g", "").await.unwrap();

        manager
            .add_file_meta(group.id, FileRecord::new("stars.txt", "stars.txt", 10))
            .await
            .unwrap();
        let err = manager
            .add_file_meta(group.id, FileRecord::new("stars.txt", "stars_1.txt", 12))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::DuplicateSource { .. }));

        let group = manager.get_group(group.id).await.unwrap();
        assert_eq!(group.files.len(), 1);
    }

    #[tokio::test]
    async fn test_add_file_meta_to_missing_group() {
        let dir = tempfile::tempdir().unwrap();
        let err = manager(dir.path())
            .add_file_meta(Uuid::new_v4(), FileRecord::new("a.txt", "a.txt", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_add_webpage_meta_rejects_duplicate_urls() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        let group = manager.create_group("g", "").await.unwrap();

        manager
            .add_webpage_meta(group.id, WebpageRecord::new("https://example.com/a"))
            .await
            .unwrap();
        let err = manager
            .add_webpage_meta(group.id, WebpageRecord::new("https://example.com/a"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::DuplicateSource { .. }));
    }

    #[tokio::test]
    async fn test_update_file_status() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        let group = manager.create_group("g", "").await.unwrap();
        let record = FileRecord::new("a.txt", "a.txt", 1);
        let file_id = record.id;
        manager.add_file_meta(group.id, record).await.unwrap();

        manager
            .update_file_status(group.id, file_id, SourceStatus::Completed)
            .await
            .unwrap();
        let group = manager.get_group(group.id).await.unwrap();
        assert_eq!(group.files[0].status, SourceStatus::Completed);

        let err = manager
            .update_file_status(group.id, Uuid::new_v4(), SourceStatus::Failed)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_remove_file_meta_returns_the_record() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        let group = manager.create_group("g", "").await.unwrap();
        let record = FileRecord::new("a.txt", "stored_a.txt", 1);
        let file_id = record.id;
        manager.add_file_meta(group.id, record).await.unwrap();

        let removed = manager.remove_file_meta(group.id, file_id).await.unwrap();
        assert_eq!(removed.stored_path, "stored_a.txt");
        assert!(manager.get_group(group.id).await.unwrap().files.is_empty());
    }

    #[tokio::test]
    async fn test_remove_group_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        let group = manager.create_group("g", "").await.unwrap();

        let removed = manager.remove_group(group.id).await.unwrap();
        assert!(removed.is_some());
        assert!(manager.remove_group(group.id).await.unwrap().is_none());
        assert!(manager.list_groups().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_sources_merges_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        let group = manager.create_group("g", "").await.unwrap();
        manager
            .add_file_meta(group.id, FileRecord::new("a.txt", "a.txt", 1))
            .await
            .unwrap();
        manager
            .add_webpage_meta(group.id, WebpageRecord::new("https://example.com"))
            .await
            .unwrap();

        let sources = manager.list_sources(group.id).await.unwrap();
        assert_eq!(sources.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_adds_to_distinct_groups() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Arc::new(manager(dir.path()));
        let first = manager.create_group("first", "").await.unwrap();
        let second = manager.create_group("second", "").await.unwrap();

        let (a, b) = tokio::join!(
            manager.add_file_meta(first.id, FileRecord::new("a.txt", "a.txt", 1)),
            manager.add_file_meta(second.id, FileRecord::new("b.txt", "b.txt", 2)),
        );
        a.unwrap();
        b.unwrap();

        let first = manager.get_group(first.id).await.unwrap();
        let second = manager.get_group(second.id).await.unwrap();
        assert_eq!(first.files.len(), 1);
        assert_eq!(first.files[0].original_name, "a.txt");
        assert_eq!(second.files.len(), 1);
        assert_eq!(second.files[0].original_name, "b.txt");
    }

    #[tokio::test]
    async fn test_corrupt_catalog_surfaces_catalog_io() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        std::fs::create_dir_all(dir.path().join("data")).unwrap();
        std::fs::write(dir.path().join("data/group_meta.json"), b"{ not json").unwrap();

        let err = manager.list_groups().await.unwrap_err();
        assert!(matches!(err, EngineError::CatalogIo { .. }));
    }
}
