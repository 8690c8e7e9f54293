pub mod albums;
pub mod db;
pub mod model;
pub mod purchases;
pub mod users;

pub use db::{generate_id, Store};
pub use model::{Album, AlbumFields, Purchase, PurchaseRecord, UserProfile, UserRecord};
