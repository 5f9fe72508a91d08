use async_trait::async_trait;
use chrono::Utc;
use sda_core::{FileRecord, FileStatus};
use sda_db::{ArchivedFile, DbError, DbResult, FileRepository, VerifiedFile};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// File repository over a map, keeping status monotonic like the SQL one.
#[derive(Default)]
pub struct MemoryRepository {
    files: Mutex<HashMap<i64, FileRecord>>,
    headers: Mutex<HashMap<i64, Vec<u8>>>,
    fail_persist: AtomicBool,
    mutations: AtomicUsize,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: FileRecord) {
        self.files.lock().unwrap().insert(record.id, record);
    }

    pub fn insert_header(&self, file_id: i64, header: Vec<u8>) {
        self.headers.lock().unwrap().insert(file_id, header);
    }

    pub fn file(&self, file_id: i64) -> FileRecord {
        self.files.lock().unwrap()[&file_id].clone()
    }

    pub fn set_fail_persist(&self, fail: bool) {
        self.fail_persist.store(fail, Ordering::SeqCst);
    }

    /// Number of successful mark_* calls.
    pub fn mutations(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    fn check_persist(&self) -> DbResult<()> {
        if self.fail_persist.load(Ordering::SeqCst) {
            return Err(DbError::InvalidData("injected persistence failure".to_string()));
        }
        Ok(())
    }

    fn advance(record: &mut FileRecord, status: FileStatus) {
        if record.status.can_advance_to(status) {
            record.status = status;
        }
    }
}

/// A freshly registered and archived file.
pub fn archived_record(id: i64, user: &str, filepath: &str, archive_path: &str) -> FileRecord {
    FileRecord {
        id,
        submission_user: user.to_string(),
        submission_file_path: filepath.to_string(),
        archive_file_path: Some(archive_path.to_string()),
        archive_file_size: None,
        decrypted_file_size: None,
        archive_file_checksum: None,
        decrypted_file_checksum: None,
        stable_id: None,
        status: FileStatus::Archived,
        updated_at: Utc::now(),
    }
}

/// A verified file, ready to be copied to backup.
pub fn completed_record(
    id: i64,
    user: &str,
    filepath: &str,
    archive_path: &str,
    size: i64,
    checksum: &str,
) -> FileRecord {
    FileRecord {
        archive_file_size: Some(size),
        decrypted_file_checksum: Some(checksum.to_string()),
        status: FileStatus::Completed,
        ..archived_record(id, user, filepath, archive_path)
    }
}

fn matches(record: &FileRecord, user: &str, filepath: &str, checksum: &str) -> bool {
    record.submission_user == user
        && record.submission_file_path == filepath
        && record.decrypted_file_checksum.as_deref() == Some(checksum)
        && record.status >= FileStatus::Completed
}

#[async_trait]
impl FileRepository for MemoryRepository {
    async fn get_archived(
        &self,
        user: &str,
        filepath: &str,
        checksum: &str,
    ) -> DbResult<ArchivedFile> {
        let files = self.files.lock().unwrap();
        files
            .values()
            .find(|r| matches(r, user, filepath, checksum))
            .and_then(|r| {
                Some(ArchivedFile {
                    archive_path: r.archive_file_path.clone()?,
                    size: r.archive_file_size?,
                })
            })
            .ok_or_else(|| DbError::NotFound(format!("archived file {} of {}", filepath, user)))
    }

    async fn get_header(&self, file_id: i64) -> DbResult<Vec<u8>> {
        self.headers
            .lock()
            .unwrap()
            .get(&file_id)
            .cloned()
            .ok_or_else(|| DbError::NotFound(format!("header of file {}", file_id)))
    }

    async fn mark_completed(&self, file: &VerifiedFile, file_id: i64) -> DbResult<()> {
        self.check_persist()?;
        let mut files = self.files.lock().unwrap();
        let record = files
            .get_mut(&file_id)
            .ok_or_else(|| DbError::NotFound(format!("file {}", file_id)))?;

        record.archive_file_size = Some(file.archive_size);
        record.archive_file_checksum = Some(file.archive_checksum.clone());
        record.decrypted_file_size = Some(file.decrypted_size);
        record.decrypted_file_checksum = Some(file.decrypted_checksum.clone());
        Self::advance(record, FileStatus::Completed);
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn mark_ready(
        &self,
        accession_id: &str,
        user: &str,
        filepath: &str,
        checksum: &str,
    ) -> DbResult<()> {
        self.check_persist()?;
        let mut files = self.files.lock().unwrap();
        let record = files
            .values_mut()
            .find(|r| matches(r, user, filepath, checksum))
            .ok_or_else(|| DbError::NotFound(format!("file {} of {}", filepath, user)))?;

        record.stable_id = Some(accession_id.to_string());
        Self::advance(record, FileStatus::Ready);
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
