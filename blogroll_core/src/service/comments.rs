use chrono::Utc;
use sea_orm::DatabaseConnection;
use thiserror::Error;

use crate::{
    entity::prelude::*,
    error::{ErrorKind, ResourceError},
    ids::{CommentId, PostId},
    models::view::CommentView,
    requester::Requester,
};

#[derive(Debug, Error)]
pub enum CommentsServiceError {
    #[error("fatal database error")]
    DbError(#[from] DbErr),

    #[error("login required to comment")]
    AuthenticationRequired,

    #[error("post not found")]
    PostNotFound,

    #[error("comment not found")]
    CommentNotFound,

    #[error("only the author may delete this comment")]
    PermissionDenied,

    #[error("comment text must not be empty")]
    EmptyText,
}

impl From<CommentsServiceError> for ResourceError {
    fn from(error: CommentsServiceError) -> Self {
        match error {
            CommentsServiceError::DbError(error) => ResourceError::infra(error),
            CommentsServiceError::AuthenticationRequired => {
                ResourceError::new(ErrorKind::AuthenticationRequired, error)
            }
            CommentsServiceError::PostNotFound | CommentsServiceError::CommentNotFound => {
                ResourceError::new(ErrorKind::NotFound, error)
            }
            CommentsServiceError::PermissionDenied => {
                ResourceError::new(ErrorKind::PermissionDenied, error)
            }
            CommentsServiceError::EmptyText => {
                ResourceError::new(ErrorKind::ValidationFailed, error)
            }
        }
    }
}

#[derive(Clone)]
pub struct CommentsService {
    db: DatabaseConnection,
}

impl CommentsService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Comment on a post as the requester
    #[tracing::instrument(skip(self, text))]
    pub async fn add_comment(
        &self,
        requester: Requester,
        post_id: PostId,
        text: &str,
    ) -> Result<CommentId, CommentsServiceError> {
        let author_id = requester
            .user_id()
            .ok_or(CommentsServiceError::AuthenticationRequired)?;

        if text.trim().is_empty() {
            return Err(CommentsServiceError::EmptyText);
        }

        if Post::find_by_id(post_id).one(&self.db).await?.is_none() {
            return Err(CommentsServiceError::PostNotFound);
        }

        let comment = CommentActiveModel {
            post_id: Set(post_id),
            author_id: Set(author_id),
            text: Set(text.to_owned()),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;

        tracing::info!(comment_id = %comment.id, "added comment");
        Ok(comment.id)
    }

    /// Comments on a post, oldest first
    pub async fn list_comments(
        &self,
        post_id: PostId,
    ) -> Result<Vec<CommentView>, CommentsServiceError> {
        if Post::find_by_id(post_id).one(&self.db).await?.is_none() {
            return Err(CommentsServiceError::PostNotFound);
        }

        let comments = Comment::find()
            .filter(CommentColumn::PostId.eq(post_id))
            .order_by_asc(CommentColumn::CreatedAt)
            .order_by_asc(CommentColumn::Id)
            .all(&self.db)
            .await?;

        Ok(CommentView::load_many(&self.db, comments).await?)
    }

    /// Delete a comment (only by author)
    #[tracing::instrument(skip(self))]
    pub async fn delete_comment(
        &self,
        requester: Requester,
        comment_id: CommentId,
    ) -> Result<(), CommentsServiceError> {
        let user_id = requester
            .user_id()
            .ok_or(CommentsServiceError::AuthenticationRequired)?;

        let comment = Comment::find_by_id(comment_id)
            .one(&self.db)
            .await?
            .ok_or(CommentsServiceError::CommentNotFound)?;

        if comment.author_id != user_id {
            tracing::warn!(author_id = %comment.author_id, "rejected delete by non-author");
            return Err(CommentsServiceError::PermissionDenied);
        }

        comment.delete(&self.db).await?;
        Ok(())
    }
}
