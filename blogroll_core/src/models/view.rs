use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    entity::prelude::*,
    ids::{CommentId, GroupId, PostId, UserId},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: UserId,
    pub username: String,
}

impl From<UserModel> for UserRef {
    fn from(user: UserModel) -> Self {
        Self {
            id: user.id,
            username: user.username,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRef {
    pub id: GroupId,
    pub title: String,
    pub slug: String,
}

impl From<GroupModel> for GroupRef {
    fn from(group: GroupModel) -> Self {
        Self {
            id: group.id,
            title: group.title,
            slug: group.slug,
        }
    }
}

/// A post as it appears in any feed. Comments are not part of it; they are
/// loaded for the single-post detail view only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostView {
    pub id: PostId,
    pub author: UserRef,
    pub text: String,
    pub group: Option<GroupRef>,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentView {
    pub id: CommentId,
    pub post_id: PostId,
    pub author: UserRef,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl PostView {
    /// Resolve authors and groups for a batch of posts with one query per
    /// table, preserving the input order.
    pub async fn load_many<C>(db: &C, posts: Vec<PostModel>) -> Result<Vec<PostView>, DbErr>
    where
        C: ConnectionTrait,
    {
        if posts.is_empty() {
            return Ok(Vec::new());
        }

        let author_ids: BTreeSet<UserId> = posts.iter().map(|p| p.author_id).collect();
        let group_ids: BTreeSet<GroupId> = posts.iter().filter_map(|p| p.group_id).collect();

        let authors = load_users(db, author_ids).await?;

        let groups: HashMap<GroupId, GroupRef> = if group_ids.is_empty() {
            HashMap::new()
        } else {
            Group::find()
                .filter(GroupColumn::Id.is_in(group_ids))
                .all(db)
                .await?
                .into_iter()
                .map(|g| (g.id, GroupRef::from(g)))
                .collect()
        };

        let views = posts
            .into_iter()
            .filter_map(|post| {
                // The author was deleted between the two reads, and the post with them.
                let Some(author) = authors.get(&post.author_id).cloned() else {
                    tracing::debug!(post_id = %post.id, "skipping post of deleted author");
                    return None;
                };
                // A group deleted between the two reads shows as no group.
                let group = post.group_id.and_then(|id| groups.get(&id).cloned());

                Some(PostView {
                    id: post.id,
                    author,
                    text: post.text,
                    group,
                    image: post.image,
                    created_at: post.created_at,
                })
            })
            .collect();

        Ok(views)
    }

    pub async fn load_one<C>(db: &C, post: PostModel) -> Result<PostView, DbErr>
    where
        C: ConnectionTrait,
    {
        let id = post.id;
        PostView::load_many(db, vec![post])
            .await?
            .pop()
            .ok_or_else(|| DbErr::RecordNotFound(format!("post {id}")))
    }
}

impl CommentView {
    pub async fn load_many<C>(
        db: &C,
        comments: Vec<CommentModel>,
    ) -> Result<Vec<CommentView>, DbErr>
    where
        C: ConnectionTrait,
    {
        if comments.is_empty() {
            return Ok(Vec::new());
        }

        let author_ids: BTreeSet<UserId> = comments.iter().map(|c| c.author_id).collect();
        let authors = load_users(db, author_ids).await?;

        let views = comments
            .into_iter()
            .filter_map(|comment| {
                let author = authors.get(&comment.author_id).cloned()?;

                Some(CommentView {
                    id: comment.id,
                    post_id: comment.post_id,
                    author,
                    text: comment.text,
                    created_at: comment.created_at,
                })
            })
            .collect();

        Ok(views)
    }
}

async fn load_users<C>(db: &C, ids: BTreeSet<UserId>) -> Result<HashMap<UserId, UserRef>, DbErr>
where
    C: ConnectionTrait,
{
    let users = User::find()
        .filter(UserColumn::Id.is_in(ids))
        .all(db)
        .await?;

    Ok(users.into_iter().map(|u| (u.id, UserRef::from(u))).collect())
}
