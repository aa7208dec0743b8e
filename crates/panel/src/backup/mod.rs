//! Backup engine — pause-freeze-archive-resume, retention, restore.
//!
//! Archives are gzip-compressed tars produced by the system `tar` binary;
//! a non-zero exit fails the operation and writes no row. A running
//! container is paused for the duration of the copy, and the unpause is
//! guaranteed on every exit path including cancellation.

pub mod ticker;

use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::process::Command;

use runtime::DockerClient;

use crate::error::{ApiError, ApiResult};
use crate::scheduler::{Scheduler, ServerStatus};
use crate::store::backups::Backup;
use crate::store::servers::Server;
use crate::store::{now_unix, Store};

pub struct BackupEngine {
    store: Arc<Store>,
    docker: Arc<DockerClient>,
    scheduler: Arc<Scheduler>,
    backup_root: PathBuf,
    host_data: PathBuf,
    /// Per-server creation locks; two creates for one server never
    /// interleave.
    locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

impl BackupEngine {
    pub fn new(
        store: Arc<Store>,
        docker: Arc<DockerClient>,
        scheduler: Arc<Scheduler>,
        backup_root: impl Into<PathBuf>,
        host_data: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            docker,
            scheduler,
            backup_root: backup_root.into(),
            host_data: host_data.into(),
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, server_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .entry(server_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    pub fn file_path(&self, backup: &Backup) -> PathBuf {
        self.backup_root.join(&backup.server_id).join(&backup.filename)
    }

    /// Create a snapshot of a server's `/data/` volumes.
    pub async fn create(&self, server_id: &str) -> ApiResult<Backup> {
        let lock = self.lock_for(server_id);
        let _guard = lock.lock().await;

        let server = self
            .store
            .server_by_id(server_id)?
            .ok_or_else(|| ApiError::NotFound(format!("Server '{server_id}'")))?;

        let name = self.scheduler.container_name(server_id);
        let status = self.scheduler.status(server_id).await?;

        // Freeze the game while the archiver walks its files. A failed
        // pause is logged and the copy proceeds unfrozen.
        let pause = if status == ServerStatus::Running {
            match self.docker.pause_container(&name).await {
                Ok(()) => Some(PauseGuard::new(Arc::clone(&self.docker), name.clone())),
                Err(e) => {
                    tracing::warn!(container = %name, error = %e,
                        "pause failed; archiving without freeze");
                    None
                }
            }
        } else {
            None
        };

        let result = self.archive_and_record(&server).await;

        if let Some(pause) = pause {
            pause.release().await;
        }

        let backup = result?;
        self.apply_retention(server_id).await?;
        tracing::info!(server = server_id, filename = %backup.filename, "backup created");
        Ok(backup)
    }

    /// Steps that do not touch the container: select volumes, run the
    /// archiver, record the row.
    async fn archive_and_record(&self, server: &Server) -> ApiResult<Backup> {
        let relative_dirs = data_relative_dirs(&server.volumes);
        if relative_dirs.is_empty() {
            return Err(ApiError::Invalid("No /data/ volumes configured".to_string()));
        }

        let dir = self.backup_root.join(&server.id);
        tokio::fs::create_dir_all(&dir).await?;

        let created_at = now_unix();
        let filename = backup_filename(&server.id, created_at);
        let archive_path = dir.join(&filename);

        let status = Command::new("tar")
            .arg("-czf")
            .arg(&archive_path)
            .arg("-C")
            .arg(&self.host_data)
            .args(&relative_dirs)
            .status()
            .await?;
        if !status.success() {
            let _ = tokio::fs::remove_file(&archive_path).await;
            return Err(ApiError::Internal(format!("tar exited with {status}")));
        }

        let size_bytes = tokio::fs::metadata(&archive_path).await?.len() as i64;
        let id = self
            .store
            .backup_insert(&server.id, &filename, size_bytes, created_at)?;

        Ok(Backup {
            id,
            server_id: server.id.clone(),
            filename,
            size_bytes,
            created_at,
        })
    }

    /// Drop oldest backups until the per-server cap holds.
    async fn apply_retention(&self, server_id: &str) -> ApiResult<()> {
        let max = self.store.panel_setting_u64("max_backups_per_server")? as i64;
        while self.store.backup_count(server_id)? > max {
            let Some(oldest) = self.store.backup_oldest(server_id)? else {
                break;
            };
            let path = self.file_path(&oldest);
            if let Err(e) = tokio::fs::remove_file(&path).await {
                tracing::warn!(path = %path.display(), error = %e,
                    "retention could not unlink archive");
            }
            self.store.backup_delete(oldest.id)?;
            tracing::info!(server = server_id, filename = %oldest.filename,
                "backup pruned by retention");
        }
        Ok(())
    }

    /// Extract a backup into the data tree. Refused while the server runs.
    pub async fn restore(&self, server_id: &str, backup_id: i64) -> ApiResult<()> {
        let lock = self.lock_for(server_id);
        let _guard = lock.lock().await;

        if self.scheduler.status(server_id).await? == ServerStatus::Running {
            return Err(ApiError::Invalid(
                "Cannot restore while server is running".to_string(),
            ));
        }

        let backup = self.resolve(server_id, backup_id)?;
        self.extract(&backup).await
    }

    async fn extract(&self, backup: &Backup) -> ApiResult<()> {
        let path = self.file_path(backup);
        if !path.exists() {
            return Err(ApiError::NotFound(format!(
                "Backup file '{}'",
                backup.filename
            )));
        }

        let status = Command::new("tar")
            .arg("-xzf")
            .arg(&path)
            .arg("-C")
            .arg(&self.host_data)
            .status()
            .await?;
        if !status.success() {
            return Err(ApiError::Internal(format!("tar exited with {status}")));
        }
        tracing::info!(server = %backup.server_id, filename = %backup.filename,
            "backup restored");
        Ok(())
    }

    /// Delete a backup: best-effort unlink, then the row.
    pub async fn delete(&self, server_id: &str, backup_id: i64) -> ApiResult<()> {
        let backup = self.resolve(server_id, backup_id)?;
        let path = self.file_path(&backup);
        if let Err(e) = tokio::fs::remove_file(&path).await {
            tracing::warn!(path = %path.display(), error = %e,
                "could not unlink archive; removing row anyway");
        }
        self.store.backup_delete(backup.id)?;
        Ok(())
    }

    pub fn resolve(&self, server_id: &str, backup_id: i64) -> ApiResult<Backup> {
        let backup = self
            .store
            .backup_by_id(backup_id)?
            .filter(|b| b.server_id == server_id)
            .ok_or_else(|| ApiError::NotFound(format!("Backup {backup_id}")))?;
        Ok(backup)
    }
}

/// Host paths under `/data/`, rewritten to paths relative to the data
/// mount. Volumes elsewhere (engine sockets, config mounts) are skipped.
fn data_relative_dirs(volumes: &std::collections::HashMap<String, String>) -> Vec<String> {
    let mut dirs: Vec<String> = volumes
        .keys()
        .filter_map(|host| host.strip_prefix("/data/"))
        .filter(|rel| !rel.is_empty())
        .map(str::to_string)
        .collect();
    dirs.sort();
    dirs
}

fn backup_filename(server_id: &str, created_at: i64) -> String {
    let stamp = chrono::DateTime::from_timestamp(created_at, 0)
        .unwrap_or_default()
        .format("%Y-%m-%d_%H-%M-%S");
    format!("{server_id}_{stamp}.tar.gz")
}

/// Guarantees the paused container resumes on every exit path. `release`
/// is the orderly path; `Drop` covers cancellation and panics by spawning
/// the unpause.
struct PauseGuard {
    docker: Arc<DockerClient>,
    name: String,
    armed: bool,
}

impl PauseGuard {
    fn new(docker: Arc<DockerClient>, name: String) -> Self {
        Self {
            docker,
            name,
            armed: true,
        }
    }

    async fn release(mut self) {
        self.armed = false;
        if let Err(e) = self.docker.unpause_container(&self.name).await {
            tracing::warn!(container = %self.name, error = %e, "unpause failed");
        }
    }
}

impl Drop for PauseGuard {
    fn drop(&mut self) {
        if self.armed {
            let docker = Arc::clone(&self.docker);
            let name = std::mem::take(&mut self.name);
            tokio::spawn(async move {
                if let Err(e) = docker.unpause_container(&name).await {
                    tracing::warn!(container = %name, error = %e, "unpause failed");
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::testing::RecordingNotifier;
    use std::collections::HashMap;
    use std::path::Path;

    fn engine(root: &Path, data: &Path) -> (Arc<Store>, BackupEngine) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let docker = Arc::new(DockerClient::new("/tmp/panel-test-no-engine.sock").unwrap());
        let scheduler = Arc::new(Scheduler::new(
            Arc::clone(&store),
            Arc::clone(&docker),
            Arc::new(RecordingNotifier::default()),
            "game-panel-".to_string(),
        ));
        let engine = BackupEngine::new(
            Arc::clone(&store),
            docker,
            scheduler,
            root.to_path_buf(),
            data.to_path_buf(),
        );
        (store, engine)
    }

    fn server_with_volume(id: &str) -> Server {
        Server {
            id: id.to_string(),
            name: format!("Server {id}"),
            game_type: "minecraft".to_string(),
            docker_image: "itzg/minecraft-server:latest".to_string(),
            port: 25565,
            env_vars: HashMap::new(),
            volumes: HashMap::from([(format!("/data/{id}"), "/data".to_string())]),
            created_at: 0,
            banner_path: None,
            accent_color: None,
        }
    }

    #[test]
    fn only_data_volumes_are_selected() {
        let volumes = HashMap::from([
            ("/data/mc".to_string(), "/data".to_string()),
            ("/var/run/docker.sock".to_string(), "/var/run/docker.sock".to_string()),
            ("/data/mc-mods".to_string(), "/mods".to_string()),
        ]);
        assert_eq!(data_relative_dirs(&volumes), vec!["mc", "mc-mods"]);
    }

    #[test]
    fn filename_format() {
        let name = backup_filename("mc", 1_767_139_200); // 2025-12-31T00:00:00Z
        assert_eq!(name, "mc_2025-12-31_00-00-00.tar.gz");
    }

    #[tokio::test]
    async fn archive_restore_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let data = tmp.path().join("host-data");
        let root = tmp.path().join("backups");
        std::fs::create_dir_all(data.join("mc/world")).unwrap();
        std::fs::write(data.join("mc/world/level.dat"), b"seed=42").unwrap();

        let (store, engine) = engine(&root, &data);
        let server = server_with_volume("mc");
        store.server_insert(&server).unwrap();

        let backup = engine.archive_and_record(&server).await.unwrap();
        assert!(engine.file_path(&backup).exists());
        assert!(backup.size_bytes > 0);
        assert_eq!(store.backup_count("mc").unwrap(), 1);

        // Mutate, then restore the snapshot over it.
        std::fs::write(data.join("mc/world/level.dat"), b"corrupted").unwrap();
        engine.extract(&backup).await.unwrap();
        assert_eq!(
            std::fs::read(data.join("mc/world/level.dat")).unwrap(),
            b"seed=42"
        );
    }

    #[tokio::test]
    async fn server_without_data_volume_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let (store, engine) = engine(&tmp.path().join("b"), &tmp.path().join("d"));
        let mut server = server_with_volume("mc");
        server.volumes = HashMap::from([(
            "/opt/elsewhere".to_string(),
            "/data".to_string(),
        )]);
        store.server_insert(&server).unwrap();

        let err = engine.archive_and_record(&server).await.unwrap_err();
        assert!(matches!(err, ApiError::Invalid(msg) if msg.contains("No /data/ volumes")));
        assert_eq!(store.backup_count("mc").unwrap(), 0);
    }

    #[tokio::test]
    async fn retention_prunes_oldest_row_and_file() {
        let tmp = tempfile::tempdir().unwrap();
        let data = tmp.path().join("host-data");
        let root = tmp.path().join("backups");
        std::fs::create_dir_all(data.join("mc")).unwrap();
        std::fs::write(data.join("mc/save.dat"), b"x").unwrap();

        let (store, engine) = engine(&root, &data);
        store.panel_setting_set("max_backups_per_server", "3").unwrap();
        let server = server_with_volume("mc");
        store.server_insert(&server).unwrap();

        // Four snapshots with distinct recorded timestamps.
        let mut filenames = Vec::new();
        for i in 0..4 {
            let backup = engine.archive_and_record(&server).await.unwrap();
            // Re-stamp so created_at ordering is deterministic within a second.
            store
                .with(|conn| {
                    conn.execute(
                        "UPDATE backups SET created_at = ?2 WHERE id = ?1",
                        rusqlite::params![backup.id, 1000 + i],
                    )
                })
                .unwrap();
            // Distinct filenames per row so files survive independently.
            let renamed = format!("mc_2026-01-0{}_00-00-00.tar.gz", i + 1);
            std::fs::rename(
                engine.file_path(&backup),
                root.join("mc").join(&renamed),
            )
            .unwrap();
            store
                .with(|conn| {
                    conn.execute(
                        "UPDATE backups SET filename = ?2 WHERE id = ?1",
                        rusqlite::params![backup.id, renamed.clone()],
                    )
                })
                .unwrap();
            filenames.push(renamed);
        }

        engine.apply_retention("mc").await.unwrap();

        let remaining = store.backups_for_server("mc").unwrap();
        assert_eq!(remaining.len(), 3);
        assert!(!remaining.iter().any(|b| b.filename == filenames[0]));
        assert!(!root.join("mc").join(&filenames[0]).exists());
        assert!(root.join("mc").join(&filenames[3]).exists());
    }

    #[tokio::test]
    async fn delete_is_best_effort_on_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let (store, engine) = engine(&tmp.path().join("b"), &tmp.path().join("d"));
        store.server_insert(&server_with_volume("mc")).unwrap();
        let id = store
            .backup_insert("mc", "mc_2026-01-01_00-00-00.tar.gz", 1, 100)
            .unwrap();

        engine.delete("mc", id).await.unwrap();
        assert!(store.backup_by_id(id).unwrap().is_none());
    }

    #[tokio::test]
    async fn resolve_rejects_foreign_server() {
        let tmp = tempfile::tempdir().unwrap();
        let (store, engine) = engine(&tmp.path().join("b"), &tmp.path().join("d"));
        let id = store
            .backup_insert("mc", "mc_2026-01-01_00-00-00.tar.gz", 1, 100)
            .unwrap();
        assert!(engine.resolve("vh", id).is_err());
        assert!(engine.resolve("mc", id).is_ok());
    }
}
