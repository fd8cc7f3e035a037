use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    entity::prelude::*,
    error::{ErrorKind, ResourceError},
    ids::{GroupId, PostId, UserId},
    models::view::PostView,
    requester::Requester,
};

#[derive(Debug, Error)]
pub enum PostsServiceError {
    #[error("fatal database error")]
    DbError(#[from] DbErr),

    #[error("login required to write posts")]
    AuthenticationRequired,

    #[error("post not found")]
    PostNotFound,

    #[error("only the author may change this post")]
    PermissionDenied,

    #[error("post text must not be empty")]
    EmptyText,

    #[error("no group with slug {0:?}")]
    InvalidGroup(String),
}

impl From<PostsServiceError> for ResourceError {
    fn from(error: PostsServiceError) -> Self {
        match error {
            PostsServiceError::DbError(error) => ResourceError::infra(error),
            PostsServiceError::AuthenticationRequired => {
                ResourceError::new(ErrorKind::AuthenticationRequired, error)
            }
            PostsServiceError::PostNotFound => ResourceError::new(ErrorKind::NotFound, error),
            PostsServiceError::PermissionDenied => {
                ResourceError::new(ErrorKind::PermissionDenied, error)
            }
            PostsServiceError::EmptyText | PostsServiceError::InvalidGroup(_) => {
                ResourceError::new(ErrorKind::ValidationFailed, error)
            }
        }
    }
}

/// What an author submits when writing or editing a post.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostDraft {
    pub text: String,
    /// Slug of the group to file the post under.
    pub group: Option<String>,
    /// Path of an already stored image.
    pub image: Option<String>,
    /// On edit, drop the current image when no new one is given.
    #[serde(default)]
    pub clear_image: bool,
}

impl PostDraft {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn in_group(mut self, slug: impl Into<String>) -> Self {
        self.group = Some(slug.into());
        self
    }

    pub fn with_image(mut self, path: impl Into<String>) -> Self {
        self.image = Some(path.into());
        self.clear_image = false;
        self
    }

    pub fn without_image(mut self) -> Self {
        self.image = None;
        self.clear_image = true;
        self
    }
}

#[derive(Clone)]
pub struct PostsService {
    db: DatabaseConnection,
}

impl PostsService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Publish a new post as the requester
    #[tracing::instrument(skip(self, draft))]
    pub async fn create_post(
        &self,
        requester: Requester,
        draft: PostDraft,
    ) -> Result<PostId, PostsServiceError> {
        let author_id = requester
            .user_id()
            .ok_or(PostsServiceError::AuthenticationRequired)?;

        let text = validate_text(draft.text)?;
        let group_id = self.resolve_group(draft.group.as_deref()).await?;

        let post = PostActiveModel {
            author_id: Set(author_id),
            text: Set(text),
            group_id: Set(group_id),
            image: Set(draft.image),
            created_at: Set(Utc::now()),
            ..Default::default()
        };

        let post = post.insert(&self.db).await?;
        tracing::info!(post_id = %post.id, "created post");
        Ok(post.id)
    }

    /// Replace text and group of a post. The image is replaced when the draft
    /// carries one, removed when the draft asks for that and kept otherwise.
    #[tracing::instrument(skip(self, draft))]
    pub async fn edit_post(
        &self,
        requester: Requester,
        post_id: PostId,
        draft: PostDraft,
    ) -> Result<PostModel, PostsServiceError> {
        let user_id = requester
            .user_id()
            .ok_or(PostsServiceError::AuthenticationRequired)?;

        let post = self.get_post(post_id).await?;
        if post.author_id != user_id {
            tracing::warn!(author_id = %post.author_id, "rejected change by non-author");
            return Err(PostsServiceError::PermissionDenied);
        }

        let text = validate_text(draft.text)?;
        let group_id = self.resolve_group(draft.group.as_deref()).await?;

        let mut post_active: PostActiveModel = post.into();
        post_active.text = Set(text);
        post_active.group_id = Set(group_id);
        match (draft.image, draft.clear_image) {
            (Some(image), _) => post_active.image = Set(Some(image)),
            (None, true) => post_active.image = Set(None),
            (None, false) => {}
        }

        let updated = post_active.update(&self.db).await?;
        Ok(updated)
    }

    /// Delete a post and its comments (only by author)
    #[tracing::instrument(skip(self))]
    pub async fn delete_post(
        &self,
        requester: Requester,
        post_id: PostId,
    ) -> Result<(), PostsServiceError> {
        let user_id = requester
            .user_id()
            .ok_or(PostsServiceError::AuthenticationRequired)?;

        let txn = self.db.begin().await?;

        let post = Post::find_by_id(post_id)
            .one(&txn)
            .await?
            .ok_or(PostsServiceError::PostNotFound)?;

        if post.author_id != user_id {
            tracing::warn!(author_id = %post.author_id, "rejected change by non-author");
            return Err(PostsServiceError::PermissionDenied);
        }

        Comment::delete_many()
            .filter(CommentColumn::PostId.eq(post_id))
            .exec(&txn)
            .await?;
        Post::delete_by_id(post_id).exec(&txn).await?;

        txn.commit().await?;
        Ok(())
    }

    /// Get a specific post by ID
    pub async fn get_post(&self, post_id: PostId) -> Result<PostModel, PostsServiceError> {
        Post::find_by_id(post_id)
            .one(&self.db)
            .await?
            .ok_or(PostsServiceError::PostNotFound)
    }

    /// Get a post with its author and group resolved
    pub async fn get_post_view(&self, post_id: PostId) -> Result<PostView, PostsServiceError> {
        let post = self.get_post(post_id).await?;
        Ok(PostView::load_one(&self.db, post).await?)
    }

    /// Count total posts by a user
    pub async fn count_posts_by_author(&self, author_id: UserId) -> Result<u64, PostsServiceError> {
        let count = Post::find()
            .filter(PostColumn::AuthorId.eq(author_id))
            .count(&self.db)
            .await?;

        Ok(count)
    }

    async fn resolve_group(&self, slug: Option<&str>) -> Result<Option<GroupId>, PostsServiceError> {
        let Some(slug) = slug else {
            return Ok(None);
        };

        let group = Group::find()
            .filter(GroupColumn::Slug.eq(slug))
            .one(&self.db)
            .await?
            .ok_or_else(|| PostsServiceError::InvalidGroup(slug.to_owned()))?;

        Ok(Some(group.id))
    }
}

fn validate_text(text: String) -> Result<String, PostsServiceError> {
    if text.trim().is_empty() {
        return Err(PostsServiceError::EmptyText);
    }
    Ok(text)
}
