use sea_orm::entity::prelude::*;

/// A database model that represents a key-value record.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "kv")]
pub struct Model {
    /// The record key.
    #[sea_orm(primary_key, auto_increment = false)]
    pub key: Vec<u8>,
    /// The record value.
    pub value: Vec<u8>,
}

/// The relation for the key-value model.
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

/// The active model behavior for the key-value model.
impl ActiveModelBehavior for ActiveModel {}
