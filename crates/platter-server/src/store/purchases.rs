use anyhow::Result;
use tracing::debug;

use super::db::{decode, generate_id, Store, ALBUMS, PURCHASES, USERS};
use super::model::{Album, Purchase, PurchaseRecord, UserProfile, UserRecord};

impl Store {
    /// Store a purchase. References are not checked against existing
    /// users or albums.
    pub fn create_purchase(&self, user: &str, album: &str) -> Result<PurchaseRecord> {
        let record = PurchaseRecord {
            id: generate_id(),
            user: user.to_owned(),
            album: album.to_owned(),
        };
        self.put_record(PURCHASES, &record.id, &record)?;
        debug!(purchase_id = %record.id, "stored purchase");
        Ok(record)
    }

    #[cfg(test)]
    pub(crate) fn get_purchase(&self, id: &str) -> Result<Option<PurchaseRecord>> {
        self.get_record(PURCHASES, id)
    }

    /// Fetch a purchase with its user and album expanded, all from one
    /// read snapshot.
    pub fn get_purchase_populated(&self, id: &str) -> Result<Option<Purchase>> {
        let read_txn = self.db.begin_read()?;

        let purchases = read_txn.open_table(PURCHASES)?;
        let raw_bytes: Option<Vec<u8>> = purchases.get(id)?.map(|guard| guard.value().to_vec());
        let record: PurchaseRecord = match raw_bytes {
            None => return Ok(None),
            Some(bytes) => decode(&bytes)?,
        };

        let users = read_txn.open_table(USERS)?;
        let user = match users.get(record.user.as_str())? {
            Some(guard) => Some(UserProfile::from(&decode::<UserRecord>(guard.value())?)),
            None => None,
        };

        let albums = read_txn.open_table(ALBUMS)?;
        let album = match albums.get(record.album.as_str())? {
            Some(guard) => Some(decode::<Album>(guard.value())?),
            None => None,
        };

        Ok(Some(Purchase {
            id: record.id,
            user,
            album,
        }))
    }
}
