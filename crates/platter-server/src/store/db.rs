use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use redb::{Database, ReadableTable, TableDefinition};
use serde::{de::DeserializeOwned, Serialize};

/// All record tables map a hex id to a bincode-encoded record.
pub(crate) type RecordTable = TableDefinition<'static, &'static str, &'static [u8]>;

pub(crate) const ALBUMS: RecordTable = TableDefinition::new("albums");
pub(crate) const USERS: RecordTable = TableDefinition::new("users");
pub(crate) const PURCHASES: RecordTable = TableDefinition::new("purchases");

const ID_BYTES: usize = 12;

/// Thread-safe handle to the redb store.
///
/// Every method is blocking; async callers should go through
/// `tokio::task::spawn_blocking`.
#[derive(Clone)]
pub struct Store {
    pub(crate) db: Arc<Database>,
}

impl Store {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path).context("open redb database")?;

        // Ensure all tables exist.
        let write_txn = db.begin_write()?;
        write_txn.open_table(ALBUMS)?;
        write_txn.open_table(USERS)?;
        write_txn.open_table(PURCHASES)?;
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    pub(crate) fn put_record<T: Serialize>(
        &self,
        table: RecordTable,
        id: &str,
        record: &T,
    ) -> Result<()> {
        let bytes = encode(record)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(table)?;
            table.insert(id, bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub(crate) fn get_record<T: DeserializeOwned>(
        &self,
        table: RecordTable,
        id: &str,
    ) -> Result<Option<T>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(table)?;
        let raw_bytes: Option<Vec<u8>> = table.get(id)?.map(|guard| guard.value().to_vec());
        raw_bytes.map(|bytes| decode(&bytes)).transpose()
    }

    pub(crate) fn list_records<T: DeserializeOwned>(&self, table: RecordTable) -> Result<Vec<T>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(table)?;

        let mut records = Vec::new();
        for item in table.iter()? {
            let (_k, v) = item?;
            records.push(decode(v.value())?);
        }
        Ok(records)
    }

    /// Delete a record by id. Returns true if it existed.
    pub(crate) fn remove_record(&self, table: RecordTable, id: &str) -> Result<bool> {
        let write_txn = self.db.begin_write()?;
        let existed = write_txn.open_table(table)?.remove(id)?.is_some();
        write_txn.commit()?;
        Ok(existed)
    }
}

/// Generate a record id: 24 lowercase hex characters.
pub fn generate_id() -> String {
    use rand::Rng;
    let mut bytes = [0u8; ID_BYTES];
    rand::thread_rng().fill(&mut bytes);
    hex::encode(bytes)
}

pub(crate) fn encode<T: Serialize>(record: &T) -> Result<Vec<u8>> {
    bincode::serde::encode_to_vec(record, bincode::config::standard()).context("bincode encode")
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let (record, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .context("bincode decode")?;
    Ok(record)
}
