pub use sea_orm_migration::prelude::*;

mod m20260710_000001_landing;
mod m20260712_000001_staging;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260710_000001_landing::Migration),
            Box::new(m20260712_000001_staging::Migration),
        ]
    }
}

/// Table reference for a landing table.
///
/// Postgres gets a real `lnd` schema; SQLite (used by the test suite) has no
/// schema support, so the name degrades to a `lnd_` prefix.
pub fn landing_table(backend: sea_orm::DbBackend, name: &str) -> TableRef {
    qualified(backend, "lnd", name)
}

/// Table reference for a staging table.
pub fn staging_table(backend: sea_orm::DbBackend, name: &str) -> TableRef {
    qualified(backend, "stg", name)
}

fn qualified(backend: sea_orm::DbBackend, schema: &str, name: &str) -> TableRef {
    match backend {
        sea_orm::DbBackend::Sqlite => Alias::new(format!("{schema}_{name}")).into_table_ref(),
        _ => (Alias::new(schema), Alias::new(name)).into_table_ref(),
    }
}
