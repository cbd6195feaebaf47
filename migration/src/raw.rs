use sea_orm_migration::{
    async_trait, sea_orm::ConnectionTrait, DbErr, MigrationName, MigrationTrait, SchemaManager,
};

/// A migration written as plain SQLite statements
pub trait RawSql: Send + Sync + 'static {
    const NAME: &'static str;

    fn up_sql() -> &'static str;
    fn down_sql() -> &'static str;

    fn boxed() -> Box<dyn MigrationTrait>
    where
        Self: Sized,
    {
        Box::new(RawMigration::<Self>(std::marker::PhantomData))
    }
}

/// Declares a migration from `sql/<name>/up.sql` and `sql/<name>/down.sql`
#[macro_export]
macro_rules! sql_migration {
    ($name:expr) => {
        paste::paste! {
            pub struct [<Sql $name:camel>];

            impl RawSql for [<Sql $name:camel>] {
                const NAME: &'static str = $name;

                fn up_sql() -> &'static str {
                    include_str!(concat!("sql/", $name, "/up.sql"))
                }

                fn down_sql() -> &'static str {
                    include_str!(concat!("sql/", $name, "/down.sql"))
                }
            }
        }
    };
}

pub struct RawMigration<T: RawSql>(std::marker::PhantomData<T>);

impl<T: RawSql> MigrationName for RawMigration<T> {
    fn name(&self) -> &str {
        T::NAME
    }
}

#[async_trait::async_trait]
impl<T: RawSql> MigrationTrait for RawMigration<T> {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(T::up_sql())
            .await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(T::down_sql())
            .await?;
        Ok(())
    }
}
