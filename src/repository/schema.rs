//! Sea-query schema definitions for the feeds table.

use sea_query::{ColumnDef, Iden, Index, Table, TableCreateStatement};

/// Feeds table schema.
#[derive(Iden)]
pub enum Feeds {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "title"]
    Title,
    #[iden = "description"]
    Description,
    #[iden = "created_at"]
    CreatedAt,
}

/// `CREATE TABLE IF NOT EXISTS feeds`.
pub fn create_feeds_table() -> TableCreateStatement {
    Table::create()
        .table(Feeds::Table)
        .if_not_exists()
        .col(ColumnDef::new(Feeds::Id).text().not_null().primary_key())
        .col(ColumnDef::new(Feeds::Title).text().not_null())
        .col(ColumnDef::new(Feeds::Description).text().not_null())
        .col(
            ColumnDef::new(Feeds::CreatedAt)
                .timestamp_with_time_zone()
                .not_null(),
        )
        .to_owned()
}

/// Index backing newest-first listing.
pub fn create_created_at_index() -> sea_query::IndexCreateStatement {
    Index::create()
        .if_not_exists()
        .name("idx_feeds_created_at")
        .table(Feeds::Table)
        .col(Feeds::CreatedAt)
        .to_owned()
}
