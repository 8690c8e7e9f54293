use anyhow::Result;
use redb::ReadableTable;
use tracing::debug;

use super::db::{generate_id, Store, ALBUMS};
use super::model::{Album, AlbumFields};

impl Store {
    pub fn list_albums(&self) -> Result<Vec<Album>> {
        self.list_records(ALBUMS)
    }

    pub fn get_album(&self, id: &str) -> Result<Option<Album>> {
        self.get_record(ALBUMS, id)
    }

    /// Insert a new album under a freshly generated id.
    pub fn create_album(&self, fields: AlbumFields) -> Result<Album> {
        let album = Album::from_fields(generate_id(), fields);
        self.put_record(ALBUMS, &album.id, &album)?;
        debug!(album_id = %album.id, "stored album");
        Ok(album)
    }

    /// Overwrite every field of an existing album. Fields missing from
    /// `fields` are cleared. Returns `None` if no album has this id.
    pub fn replace_album(&self, id: &str, fields: AlbumFields) -> Result<Option<Album>> {
        let album = Album::from_fields(id.to_owned(), fields);
        let bytes = super::db::encode(&album)?;

        let write_txn = self.db.begin_write()?;
        let replaced = {
            let mut table = write_txn.open_table(ALBUMS)?;
            let exists = table.get(id)?.is_some();
            if exists {
                table.insert(id, bytes.as_slice())?;
            }
            exists
        };
        write_txn.commit()?;

        Ok(replaced.then_some(album))
    }

    /// Delete an album by id. Returns true if it existed.
    pub fn delete_album(&self, id: &str) -> Result<bool> {
        self.remove_record(ALBUMS, id)
    }
}
