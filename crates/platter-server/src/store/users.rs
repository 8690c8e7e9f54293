use anyhow::Result;
use redb::ReadableTable;
use tracing::debug;

use super::db::{decode, encode, generate_id, Store, USERS};
use super::model::UserRecord;

impl Store {
    /// Insert a user unless one with the same email already exists.
    ///
    /// The email check and the insert share one write transaction. Returns
    /// `None` when the email is taken.
    pub fn create_user(
        &self,
        name: Option<String>,
        email: &str,
        password_hash: String,
    ) -> Result<Option<UserRecord>> {
        let user = UserRecord {
            id: generate_id(),
            name,
            email: email.to_owned(),
            password_hash,
        };
        let bytes = encode(&user)?;

        let write_txn = self.db.begin_write()?;
        let created = {
            let mut table = write_txn.open_table(USERS)?;
            let mut taken = false;
            for item in table.iter()? {
                let (_k, v) = item?;
                let existing: UserRecord = decode(v.value())?;
                if existing.email == email {
                    taken = true;
                    break;
                }
            }
            if !taken {
                table.insert(user.id.as_str(), bytes.as_slice())?;
            }
            !taken
        };
        write_txn.commit()?;

        if created {
            debug!(user_id = %user.id, "stored user");
        }
        Ok(created.then_some(user))
    }

    #[cfg(test)]
    pub(crate) fn get_user(&self, id: &str) -> Result<Option<UserRecord>> {
        self.get_record(USERS, id)
    }

    /// Find a user by exact email match. Scans all records.
    pub fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(USERS)?;

        for item in table.iter()? {
            let (_k, v) = item?;
            let user: UserRecord = decode(v.value())?;
            if user.email == email {
                return Ok(Some(user));
            }
        }
        Ok(None)
    }
}
