use sea_orm::DatabaseConnection;
use thiserror::Error;

use crate::{
    entity::prelude::*,
    error::{ErrorKind, ResourceError},
    ids::UserId,
};

const USERNAME_MAX_CHARS: usize = 150;

#[derive(Debug, Error)]
pub enum UsersServiceError {
    #[error("fatal database error")]
    DbError(#[from] DbErr),

    #[error("user not found")]
    UserNotFound,

    #[error("username is already taken")]
    UsernameTaken,

    #[error("invalid username: {0}")]
    InvalidUsername(&'static str),
}

impl From<UsersServiceError> for ResourceError {
    fn from(error: UsersServiceError) -> Self {
        match error {
            UsersServiceError::DbError(error) => ResourceError::infra(error),
            UsersServiceError::UserNotFound => ResourceError::new(ErrorKind::NotFound, error),
            UsersServiceError::UsernameTaken => ResourceError::new(ErrorKind::AlreadyExists, error),
            UsersServiceError::InvalidUsername(_) => {
                ResourceError::new(ErrorKind::ValidationFailed, error)
            }
        }
    }
}

fn validate_username(username: &str) -> Result<(), UsersServiceError> {
    if username.is_empty() {
        return Err(UsersServiceError::InvalidUsername("must not be empty"));
    }
    if username.chars().count() > USERNAME_MAX_CHARS {
        return Err(UsersServiceError::InvalidUsername("at most 150 characters"));
    }
    if !username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '@' | '+' | '-'))
    {
        return Err(UsersServiceError::InvalidUsername(
            "letters, digits and _ . @ + - only",
        ));
    }
    Ok(())
}

/// Local mirror of the externally owned user accounts.
#[derive(Clone)]
pub struct UsersService {
    db: DatabaseConnection,
}

impl UsersService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Register a username so posts, comments and follows can reference it
    #[tracing::instrument(skip(self))]
    pub async fn register(&self, username: &str) -> Result<UserModel, UsersServiceError> {
        validate_username(username)?;

        let user = UserActiveModel {
            username: Set(username.to_owned()),
            ..Default::default()
        };

        match user.insert(&self.db).await {
            Ok(user) => {
                tracing::info!(user_id = %user.id, "registered user");
                Ok(user)
            }
            Err(error) => match error.sql_err() {
                Some(SqlErr::UniqueConstraintViolation(_)) => Err(UsersServiceError::UsernameTaken),
                _ => Err(error.into()),
            },
        }
    }

    /// Get a user by ID
    pub async fn get_user(&self, user_id: UserId) -> Result<UserModel, UsersServiceError> {
        User::find_by_id(user_id)
            .one(&self.db)
            .await?
            .ok_or(UsersServiceError::UserNotFound)
    }

    /// Resolve a username
    pub async fn by_username(&self, username: &str) -> Result<UserModel, UsersServiceError> {
        User::find()
            .filter(UserColumn::Username.eq(username))
            .one(&self.db)
            .await?
            .ok_or(UsersServiceError::UserNotFound)
    }

    /// Delete a user together with everything that references them: their
    /// comments, comments left on their posts, their posts and follow edges in
    /// both directions.
    #[tracing::instrument(skip(self))]
    pub async fn delete_user(&self, user_id: UserId) -> Result<(), UsersServiceError> {
        let txn = self.db.begin().await?;

        if User::find_by_id(user_id).one(&txn).await?.is_none() {
            return Err(UsersServiceError::UserNotFound);
        }

        let post_ids: Vec<_> = Post::find()
            .filter(PostColumn::AuthorId.eq(user_id))
            .all(&txn)
            .await?
            .into_iter()
            .map(|p| p.id)
            .collect();

        Comment::delete_many()
            .filter(CommentColumn::AuthorId.eq(user_id))
            .exec(&txn)
            .await?;

        if !post_ids.is_empty() {
            Comment::delete_many()
                .filter(CommentColumn::PostId.is_in(post_ids))
                .exec(&txn)
                .await?;
        }

        let posts = Post::delete_many()
            .filter(PostColumn::AuthorId.eq(user_id))
            .exec(&txn)
            .await?;

        Follow::delete_many()
            .filter(
                FollowColumn::UserId
                    .eq(user_id)
                    .or(FollowColumn::AuthorId.eq(user_id)),
            )
            .exec(&txn)
            .await?;

        User::delete_by_id(user_id).exec(&txn).await?;

        txn.commit().await?;
        tracing::info!(posts_removed = posts.rows_affected, "deleted user");
        Ok(())
    }
}
