use std::collections::BTreeSet;

use sea_orm::DatabaseConnection;
use thiserror::Error;

use crate::{
    entity::prelude::*,
    error::{ErrorKind, ResourceError},
    ids::UserId,
    requester::Requester,
};

#[derive(Debug, Error)]
pub enum FollowsServiceError {
    #[error("fatal database error")]
    DbError(#[from] DbErr),

    #[error("login required to follow authors")]
    AuthenticationRequired,

    #[error("users cannot follow themselves")]
    SelfFollowAttempt,

    #[error("author does not exist")]
    UnknownAuthor,

    #[error("already following this author")]
    AlreadyFollowing,
}

impl From<FollowsServiceError> for ResourceError {
    fn from(error: FollowsServiceError) -> Self {
        match error {
            FollowsServiceError::DbError(error) => ResourceError::infra(error),
            FollowsServiceError::AuthenticationRequired => {
                ResourceError::new(ErrorKind::AuthenticationRequired, error)
            }
            FollowsServiceError::SelfFollowAttempt => {
                ResourceError::new(ErrorKind::SelfReferenceRejected, error)
            }
            FollowsServiceError::UnknownAuthor => ResourceError::new(ErrorKind::NotFound, error),
            FollowsServiceError::AlreadyFollowing => {
                ResourceError::new(ErrorKind::AlreadyExists, error)
            }
        }
    }
}

/// The directed follower -> author graph.
#[derive(Clone)]
pub struct FollowsService {
    db: DatabaseConnection,
}

impl FollowsService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Add the edge `requester -> author_id`
    #[tracing::instrument(skip(self))]
    pub async fn follow(
        &self,
        requester: Requester,
        author_id: UserId,
    ) -> Result<FollowModel, FollowsServiceError> {
        let user_id = requester
            .user_id()
            .ok_or(FollowsServiceError::AuthenticationRequired)?;

        if user_id == author_id {
            tracing::warn!("rejected self-follow");
            return Err(FollowsServiceError::SelfFollowAttempt);
        }

        if User::find_by_id(author_id).one(&self.db).await?.is_none() {
            return Err(FollowsServiceError::UnknownAuthor);
        }

        let follow = FollowActiveModel {
            user_id: Set(user_id),
            author_id: Set(author_id),
            ..Default::default()
        };

        // The unique index settles races between concurrent follows.
        match follow.insert(&self.db).await {
            Ok(follow) => {
                tracing::info!(follow_id = %follow.id, "followed author");
                Ok(follow)
            }
            Err(error) => match error.sql_err() {
                Some(SqlErr::UniqueConstraintViolation(_)) => {
                    Err(FollowsServiceError::AlreadyFollowing)
                }
                _ => Err(error.into()),
            },
        }
    }

    /// Remove the edge if it exists. Unfollowing someone you don't follow is a
    /// no-op.
    #[tracing::instrument(skip(self))]
    pub async fn unfollow(
        &self,
        requester: Requester,
        author_id: UserId,
    ) -> Result<(), FollowsServiceError> {
        let user_id = requester
            .user_id()
            .ok_or(FollowsServiceError::AuthenticationRequired)?;

        let removed = Follow::delete_many()
            .filter(FollowColumn::UserId.eq(user_id))
            .filter(FollowColumn::AuthorId.eq(author_id))
            .exec(&self.db)
            .await?;

        tracing::debug!(removed = removed.rows_affected, "unfollowed author");
        Ok(())
    }

    pub async fn is_following(
        &self,
        user_id: UserId,
        author_id: UserId,
    ) -> Result<bool, FollowsServiceError> {
        let count = Follow::find()
            .filter(FollowColumn::UserId.eq(user_id))
            .filter(FollowColumn::AuthorId.eq(author_id))
            .count(&self.db)
            .await?;

        Ok(count > 0)
    }

    /// Everyone `user_id` follows
    pub async fn followed_authors(
        &self,
        user_id: UserId,
    ) -> Result<BTreeSet<UserId>, FollowsServiceError> {
        let follows = Follow::find()
            .filter(FollowColumn::UserId.eq(user_id))
            .all(&self.db)
            .await?;

        Ok(follows.into_iter().map(|f| f.author_id).collect())
    }

    /// Everyone following `author_id`
    pub async fn followers(
        &self,
        author_id: UserId,
    ) -> Result<BTreeSet<UserId>, FollowsServiceError> {
        let follows = Follow::find()
            .filter(FollowColumn::AuthorId.eq(author_id))
            .all(&self.db)
            .await?;

        Ok(follows.into_iter().map(|f| f.user_id).collect())
    }

    pub async fn follow_username(
        &self,
        requester: Requester,
        username: &str,
    ) -> Result<FollowModel, FollowsServiceError> {
        let author = self.resolve_author(username).await?;
        self.follow(requester, author).await
    }

    pub async fn unfollow_username(
        &self,
        requester: Requester,
        username: &str,
    ) -> Result<(), FollowsServiceError> {
        let author = self.resolve_author(username).await?;
        self.unfollow(requester, author).await
    }

    async fn resolve_author(&self, username: &str) -> Result<UserId, FollowsServiceError> {
        User::find()
            .filter(UserColumn::Username.eq(username))
            .one(&self.db)
            .await?
            .map(|user| user.id)
            .ok_or(FollowsServiceError::UnknownAuthor)
    }
}
