use sea_orm::{sea_query::Expr, DatabaseConnection};
use thiserror::Error;

use crate::{
    entity::prelude::*,
    error::{ErrorKind, ResourceError},
};

const TITLE_MAX_CHARS: usize = 200;
const SLUG_MAX_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum GroupsServiceError {
    #[error("fatal database error")]
    DbError(#[from] DbErr),

    #[error("group not found")]
    GroupNotFound,

    #[error("slug is already in use")]
    SlugTaken,

    #[error("invalid group: {0}")]
    Invalid(&'static str),
}

impl From<GroupsServiceError> for ResourceError {
    fn from(error: GroupsServiceError) -> Self {
        match error {
            GroupsServiceError::DbError(error) => ResourceError::infra(error),
            GroupsServiceError::GroupNotFound => ResourceError::new(ErrorKind::NotFound, error),
            GroupsServiceError::SlugTaken => ResourceError::new(ErrorKind::AlreadyExists, error),
            GroupsServiceError::Invalid(_) => ResourceError::new(ErrorKind::ValidationFailed, error),
        }
    }
}

fn validate_title(title: &str) -> Result<(), GroupsServiceError> {
    if title.trim().is_empty() {
        return Err(GroupsServiceError::Invalid("title must not be empty"));
    }
    if title.chars().count() > TITLE_MAX_CHARS {
        return Err(GroupsServiceError::Invalid("title is at most 200 characters"));
    }
    Ok(())
}

fn validate_slug(slug: &str) -> Result<(), GroupsServiceError> {
    if slug.is_empty() || slug.len() > SLUG_MAX_CHARS {
        return Err(GroupsServiceError::Invalid("slug must be 1 to 200 characters"));
    }
    if !slug
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(GroupsServiceError::Invalid(
            "slug may contain ASCII letters, digits, - and _ only",
        ));
    }
    Ok(())
}

#[derive(Clone)]
pub struct GroupsService {
    db: DatabaseConnection,
}

impl GroupsService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create a new group
    #[tracing::instrument(skip(self, description))]
    pub async fn create_group(
        &self,
        title: &str,
        slug: &str,
        description: &str,
    ) -> Result<GroupModel, GroupsServiceError> {
        validate_title(title)?;
        validate_slug(slug)?;

        let group = GroupActiveModel {
            title: Set(title.trim().to_owned()),
            slug: Set(slug.to_owned()),
            description: Set(description.to_owned()),
            ..Default::default()
        };

        match group.insert(&self.db).await {
            Ok(group) => {
                tracing::info!(group_id = %group.id, "created group");
                Ok(group)
            }
            Err(error) => match error.sql_err() {
                Some(SqlErr::UniqueConstraintViolation(_)) => Err(GroupsServiceError::SlugTaken),
                _ => Err(error.into()),
            },
        }
    }

    /// Get a specific group by slug
    pub async fn get_group(&self, slug: &str) -> Result<GroupModel, GroupsServiceError> {
        Group::find()
            .filter(GroupColumn::Slug.eq(slug))
            .one(&self.db)
            .await?
            .ok_or(GroupsServiceError::GroupNotFound)
    }

    /// List all groups by title
    pub async fn list_groups(&self) -> Result<Vec<GroupModel>, GroupsServiceError> {
        let groups = Group::find()
            .order_by_asc(GroupColumn::Title)
            .order_by_asc(GroupColumn::Id)
            .all(&self.db)
            .await?;

        Ok(groups)
    }

    /// Change title and description. The slug stays fixed.
    #[tracing::instrument(skip(self, description))]
    pub async fn update_group(
        &self,
        slug: &str,
        title: &str,
        description: &str,
    ) -> Result<GroupModel, GroupsServiceError> {
        validate_title(title)?;

        let group = self.get_group(slug).await?;

        let mut group_active: GroupActiveModel = group.into();
        group_active.title = Set(title.trim().to_owned());
        group_active.description = Set(description.to_owned());

        let updated = group_active.update(&self.db).await?;
        Ok(updated)
    }

    /// Delete a group. Its posts stay and lose their group.
    #[tracing::instrument(skip(self))]
    pub async fn delete_group(&self, slug: &str) -> Result<(), GroupsServiceError> {
        let txn = self.db.begin().await?;

        let group = Group::find()
            .filter(GroupColumn::Slug.eq(slug))
            .one(&txn)
            .await?
            .ok_or(GroupsServiceError::GroupNotFound)?;

        let detached = Post::update_many()
            .col_expr(PostColumn::GroupId, Expr::value(Option::<i64>::None))
            .filter(PostColumn::GroupId.eq(group.id))
            .exec(&txn)
            .await?;

        Group::delete_by_id(group.id).exec(&txn).await?;

        txn.commit().await?;
        tracing::info!(
            group_id = %group.id,
            posts_detached = detached.rows_affected,
            "deleted group"
        );
        Ok(())
    }
}
