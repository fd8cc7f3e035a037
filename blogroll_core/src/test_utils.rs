use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, Set};
use sea_orm_migration::MigratorTrait;

use crate::{
    entity::prelude::{GroupActiveModel, UserActiveModel},
    ids::{GroupId, UserId},
    models::migrator::Migrator,
};

/// Create a fresh, migrated in-memory SQLite database.
///
/// The pool is capped at one connection: every new connection to
/// `sqlite::memory:` would otherwise open its own empty database.
pub async fn setup_test_db() -> DatabaseConnection {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).sqlx_logging(false);

    let db = Database::connect(options)
        .await
        .expect("Failed to create in-memory database");

    Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");

    db
}

pub async fn create_test_user(db: &DatabaseConnection, username: &str) -> UserId {
    let user = UserActiveModel {
        username: Set(username.to_string()),
        ..Default::default()
    };
    user.insert(db).await.expect("Failed to insert user").id
}

pub async fn create_test_group(db: &DatabaseConnection, slug: &str) -> GroupId {
    let group = GroupActiveModel {
        title: Set(format!("Group {slug}")),
        slug: Set(slug.to_string()),
        description: Set("Test group".to_string()),
        ..Default::default()
    };
    group.insert(db).await.expect("Failed to insert group").id
}
