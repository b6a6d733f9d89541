pub use sea_orm_migration::prelude::*;

mod m20250418_120000_create_identity_tables;
mod m20250418_121500_create_client_tables;
mod m20250502_093000_create_token_tables;
mod m20250610_140000_add_audit_log;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250418_120000_create_identity_tables::Migration),
            Box::new(m20250418_121500_create_client_tables::Migration),
            Box::new(m20250502_093000_create_token_tables::Migration),
            Box::new(m20250610_140000_add_audit_log::Migration),
        ]
    }
}
