//! Whole-file encryption helpers.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::driver::ConnectionFactory;
use crate::error::{DatabaseError, DatabaseResult};
use crate::manager::DatabaseManager;

/// Encrypt a plaintext database file in place.
///
/// The encrypted copy is written to `temp_filename` first and then moved
/// over the original. Refuses to run if the source is missing or the
/// temporary file already exists.
pub fn encrypt_plain_database_in_place(
    filename: &Path,
    temp_filename: &Path,
    passphrase: &str,
    factory: Arc<dyn ConnectionFactory>,
) -> DatabaseResult<()> {
    if !filename.exists() {
        return Err(DatabaseError::Encryption(format!(
            "no such database: {}",
            filename.display()
        )));
    }
    if temp_filename.exists() {
        return Err(DatabaseError::Encryption(format!(
            "temporary file already exists: {}",
            temp_filename.display()
        )));
    }

    info!(file = %filename.display(), "Encrypting plaintext database in place");
    let exported = {
        let db = DatabaseManager::open(filename, "encrypt_in_place", factory, false)?;
        db.set_vacuum_on_close(false);
        db.encrypt_to_another(temp_filename, passphrase)
    };
    if !exported {
        if temp_filename.exists() {
            fs::remove_file(temp_filename)?;
        }
        return Err(DatabaseError::Encryption(format!(
            "failed to export encrypted copy of {}",
            filename.display()
        )));
    }

    fs::remove_file(filename)?;
    fs::rename(temp_filename, filename)?;
    info!(file = %filename.display(), "Database encrypted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::SqlCipherDriver;

    fn driver() -> Arc<dyn ConnectionFactory> {
        Arc::new(SqlCipherDriver::new())
    }

    #[test]
    fn test_refuses_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let err = encrypt_plain_database_in_place(
            &dir.path().join("absent.sqlite"),
            &dir.path().join("tmp.sqlite"),
            "pw",
            driver(),
        )
        .unwrap_err();
        assert!(matches!(err, DatabaseError::Encryption(_)));
    }

    #[test]
    fn test_refuses_existing_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("plain.sqlite");
        let temp = dir.path().join("tmp.sqlite");
        fs::write(&temp, b"occupied").unwrap();
        {
            let db = DatabaseManager::open(&source, "setup", driver(), false).unwrap();
            assert!(db.exec("CREATE TABLE t (x INTEGER)"));
        }
        let err = encrypt_plain_database_in_place(&source, &temp, "pw", driver()).unwrap_err();
        assert!(matches!(err, DatabaseError::Encryption(_)));
        assert_eq!(fs::read(&temp).unwrap(), b"occupied");
    }

    #[test]
    fn test_encrypts_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("plain.sqlite");
        let temp = dir.path().join("tmp.sqlite");
        {
            let db = DatabaseManager::open(&source, "setup", driver(), false).unwrap();
            assert!(db.exec("CREATE TABLE t (x INTEGER)"));
            assert!(db.exec("INSERT INTO t (x) VALUES (42)"));
        }
        encrypt_plain_database_in_place(&source, &temp, "pw", driver()).unwrap();
        assert!(!temp.exists());

        let locked = DatabaseManager::open(&source, "locked", driver(), false).unwrap();
        locked.set_vacuum_on_close(false);
        assert!(!locked.can_read_database());
        drop(locked);

        let db = DatabaseManager::open(&source, "keyed", driver(), false).unwrap();
        db.set_vacuum_on_close(false);
        assert!(db.pragma_key("pw"));
        assert!(db.can_read_database());
        assert_eq!(db.fetch_int("SELECT x FROM t", 0), 42);
    }
}
