//! Feed composition.
//!
//! Every feed is a newest-first list of [`PostView`]s cut into fixed-size
//! pages. The global feed is the only one that goes through the short-lived
//! cache; the others are paged in the database.

use std::sync::Arc;

use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    cache::{CacheKey, TtlCache},
    config::FeedSettings,
    entity::prelude::*,
    error::{ErrorKind, ResourceError},
    ids::PostId,
    models::view::{CommentView, GroupRef, PostView, UserRef},
    pagination::{paginate, Page, PageBounds, PageRequest},
    requester::Requester,
    service::follows::{FollowsService, FollowsServiceError},
};

/// The cache shared by every [`FeedService`] of one runtime.
pub type FeedCache = TtlCache<CacheKey, Arc<Vec<PostView>>>;

/// Which posts a feed shows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeedScope {
    Global,
    /// Posts filed under the group with this slug.
    Group(String),
    /// Posts written by the user with this username.
    Author(String),
    /// Posts by everyone the requester follows.
    Following,
}

#[derive(Debug, Error)]
pub enum FeedServiceError {
    #[error("fatal database error")]
    DbError(#[from] DbErr),

    #[error("group not found")]
    GroupNotFound,

    #[error("user not found")]
    UserNotFound,

    #[error("post not found")]
    PostNotFound,

    #[error("login required for the following feed")]
    AuthenticationRequired,

    #[error(transparent)]
    Follows(#[from] FollowsServiceError),
}

impl From<FeedServiceError> for ResourceError {
    fn from(error: FeedServiceError) -> Self {
        match error {
            FeedServiceError::DbError(error) => ResourceError::infra(error),
            FeedServiceError::GroupNotFound
            | FeedServiceError::UserNotFound
            | FeedServiceError::PostNotFound => ResourceError::new(ErrorKind::NotFound, error),
            FeedServiceError::AuthenticationRequired => {
                ResourceError::new(ErrorKind::AuthenticationRequired, error)
            }
            FeedServiceError::Follows(error) => error.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupPage {
    pub group: GroupRef,
    pub description: String,
    pub page: Page<PostView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfilePage {
    pub author: UserRef,
    pub posts_count: u64,
    /// Whether the requester follows `author`. Always false when anonymous.
    pub following: bool,
    pub page: Page<PostView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostDetail {
    pub post: PostView,
    pub author_posts_count: u64,
    pub comments: Vec<CommentView>,
}

#[derive(Clone)]
pub struct FeedService {
    db: DatabaseConnection,
    follows: FollowsService,
    cache: Arc<FeedCache>,
    settings: FeedSettings,
}

impl FeedService {
    pub fn new(
        db: DatabaseConnection,
        follows: FollowsService,
        cache: Arc<FeedCache>,
        settings: FeedSettings,
    ) -> Self {
        Self {
            db,
            follows,
            cache,
            settings,
        }
    }

    /// One page of the feed for `scope` as seen by `requester`
    #[tracing::instrument(skip(self))]
    pub async fn compose(
        &self,
        scope: FeedScope,
        requester: Requester,
        request: PageRequest,
    ) -> Result<Page<PostView>, FeedServiceError> {
        match scope {
            FeedScope::Global => {
                let posts = self
                    .cache
                    .get_or_populate(CacheKey::GlobalFeed, self.settings.global_ttl, || {
                        self.load_global()
                    })
                    .await?;
                Ok(paginate(&posts, self.settings.page_size, request))
            }
            FeedScope::Group(slug) => {
                let group = self.find_group(&slug).await?;
                self.fetch_page(Post::find().filter(PostColumn::GroupId.eq(group.id)), request)
                    .await
            }
            FeedScope::Author(username) => {
                let author = self.find_user(&username).await?;
                self.fetch_page(Post::find().filter(PostColumn::AuthorId.eq(author.id)), request)
                    .await
            }
            FeedScope::Following => {
                let user_id = requester
                    .user_id()
                    .ok_or(FeedServiceError::AuthenticationRequired)?;

                let authors = self.follows.followed_authors(user_id).await?;
                if authors.is_empty() {
                    let bounds = PageBounds::resolve(0, self.settings.page_size, request);
                    return Ok(Page::new(Vec::new(), bounds));
                }

                self.fetch_page(Post::find().filter(PostColumn::AuthorId.is_in(authors)), request)
                    .await
            }
        }
    }

    /// A group's header and one page of its posts
    pub async fn group_page(
        &self,
        slug: &str,
        request: PageRequest,
    ) -> Result<GroupPage, FeedServiceError> {
        let group = self.find_group(slug).await?;
        let page = self
            .fetch_page(Post::find().filter(PostColumn::GroupId.eq(group.id)), request)
            .await?;

        let description = group.description.clone();
        Ok(GroupPage {
            group: group.into(),
            description,
            page,
        })
    }

    /// An author's profile: post count, follow state and one page of posts
    pub async fn profile_page(
        &self,
        username: &str,
        requester: Requester,
        request: PageRequest,
    ) -> Result<ProfilePage, FeedServiceError> {
        let author = self.find_user(username).await?;

        let page = self
            .fetch_page(Post::find().filter(PostColumn::AuthorId.eq(author.id)), request)
            .await?;

        let following = match requester.user_id() {
            Some(user_id) => self.follows.is_following(user_id, author.id).await?,
            None => false,
        };

        Ok(ProfilePage {
            author: author.into(),
            posts_count: page.total_items,
            following,
            page,
        })
    }

    /// A single post with its comments, oldest first
    pub async fn post_detail(&self, post_id: PostId) -> Result<PostDetail, FeedServiceError> {
        let post = Post::find_by_id(post_id)
            .one(&self.db)
            .await?
            .ok_or(FeedServiceError::PostNotFound)?;

        let author_posts_count = Post::find()
            .filter(PostColumn::AuthorId.eq(post.author_id))
            .count(&self.db)
            .await?;

        let comments = Comment::find()
            .filter(CommentColumn::PostId.eq(post_id))
            .order_by_asc(CommentColumn::CreatedAt)
            .order_by_asc(CommentColumn::Id)
            .all(&self.db)
            .await?;

        Ok(PostDetail {
            post: PostView::load_one(&self.db, post).await?,
            author_posts_count,
            comments: CommentView::load_many(&self.db, comments).await?,
        })
    }

    /// Drop the cached global feed so the next request rebuilds it
    pub async fn refresh_global(&self) {
        self.cache.invalidate(&CacheKey::GlobalFeed).await;
    }

    async fn load_global(&self) -> Result<Arc<Vec<PostView>>, FeedServiceError> {
        let posts = newest_first(Post::find()).all(&self.db).await?;
        tracing::debug!(posts = posts.len(), "composed global feed");
        Ok(Arc::new(PostView::load_many(&self.db, posts).await?))
    }

    async fn fetch_page(
        &self,
        select: Select<Post>,
        request: PageRequest,
    ) -> Result<Page<PostView>, FeedServiceError> {
        let page_size = self.settings.page_size.max(1);
        let paginator = newest_first(select).paginate(&self.db, page_size);

        let total = paginator.num_items().await?;
        let bounds = PageBounds::resolve(total, page_size, request);
        let posts = paginator.fetch_page(bounds.index()).await?;

        let items = PostView::load_many(&self.db, posts).await?;
        Ok(Page::new(items, bounds))
    }

    async fn find_group(&self, slug: &str) -> Result<GroupModel, FeedServiceError> {
        Group::find()
            .filter(GroupColumn::Slug.eq(slug))
            .one(&self.db)
            .await?
            .ok_or(FeedServiceError::GroupNotFound)
    }

    async fn find_user(&self, username: &str) -> Result<UserModel, FeedServiceError> {
        User::find()
            .filter(UserColumn::Username.eq(username))
            .one(&self.db)
            .await?
            .ok_or(FeedServiceError::UserNotFound)
    }
}

fn newest_first(select: Select<Post>) -> Select<Post> {
    select
        .order_by_desc(PostColumn::CreatedAt)
        .order_by_desc(PostColumn::Id)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{DateTime, TimeZone, Utc};

    use super::*;
    use crate::{
        cache::ManualClock,
        ids::{GroupId, UserId},
        test_utils::{create_test_group, create_test_user, setup_test_db},
    };

    struct Fixture {
        db: DatabaseConnection,
        feed: FeedService,
        clock: ManualClock,
    }

    fn setup_feed(db: DatabaseConnection) -> Fixture {
        let clock = ManualClock::new();
        let cache = Arc::new(FeedCache::new(Arc::new(clock.clone())));
        let feed = FeedService::new(
            db.clone(),
            FollowsService::new(db.clone()),
            cache,
            FeedSettings::default(),
        );
        Fixture { db, feed, clock }
    }

    fn at(second: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + second, 0).unwrap()
    }

    async fn insert_post(
        db: &DatabaseConnection,
        author_id: UserId,
        group_id: Option<GroupId>,
        text: &str,
        created_at: DateTime<Utc>,
    ) -> PostId {
        PostActiveModel {
            author_id: Set(author_id),
            text: Set(text.to_string()),
            group_id: Set(group_id),
            image: Set(None),
            created_at: Set(created_at),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap()
        .id
    }

    fn texts(page: &Page<PostView>) -> Vec<&str> {
        page.items.iter().map(|p| p.text.as_str()).collect()
    }

    #[tokio::test]
    async fn test_group_feed_pages_newest_first() {
        let Fixture { db, feed, .. } = setup_feed(setup_test_db().await);
        let author = create_test_user(&db, "painter").await;
        let art = create_test_group(&db, "art").await;
        let other = create_test_group(&db, "other").await;

        for i in 1..=15 {
            insert_post(&db, author, Some(art), &format!("art {i}"), at(i)).await;
        }
        insert_post(&db, author, Some(other), "elsewhere", at(100)).await;

        let scope = FeedScope::Group("art".to_string());
        let first = feed
            .compose(scope.clone(), Requester::Anonymous, PageRequest::FIRST)
            .await
            .unwrap();
        assert_eq!(first.len(), 10);
        assert_eq!(first.num_pages, 2);
        assert_eq!(first.total_items, 15);
        assert_eq!(first.items[0].text, "art 15");
        assert_eq!(first.items[9].text, "art 6");
        assert!(first.has_next());
        assert!(!first.has_previous());

        let second = feed
            .compose(scope.clone(), Requester::Anonymous, PageRequest::new(2))
            .await
            .unwrap();
        assert_eq!(texts(&second), ["art 5", "art 4", "art 3", "art 2", "art 1"]);
        assert!(!second.has_next());
        assert!(second.has_previous());

        let clamped_high = feed
            .compose(scope.clone(), Requester::Anonymous, PageRequest::new(99))
            .await
            .unwrap();
        assert_eq!(clamped_high, second);

        let clamped_low = feed
            .compose(scope, Requester::Anonymous, PageRequest::new(-3))
            .await
            .unwrap();
        assert_eq!(clamped_low, first);
    }

    #[tokio::test]
    async fn test_ties_break_by_id_descending() {
        let Fixture { db, feed, .. } = setup_feed(setup_test_db().await);
        let author = create_test_user(&db, "writer").await;

        let older_id = insert_post(&db, author, None, "inserted first", at(0)).await;
        let newer_id = insert_post(&db, author, None, "inserted second", at(0)).await;

        let page = feed
            .compose(FeedScope::Author("writer".into()), Requester::Anonymous, PageRequest::FIRST)
            .await
            .unwrap();
        let ids: Vec<_> = page.items.iter().map(|p| p.id).collect();
        assert_eq!(ids, [newer_id, older_id]);
    }

    #[tokio::test]
    async fn test_following_feed_has_exactly_followed_authors() {
        let Fixture { db, feed, .. } = setup_feed(setup_test_db().await);
        let reader = create_test_user(&db, "reader").await;
        let followed = create_test_user(&db, "followed").await;
        let stranger = create_test_user(&db, "stranger").await;

        insert_post(&db, followed, None, "from followed 1", at(1)).await;
        insert_post(&db, stranger, None, "from stranger", at(2)).await;
        insert_post(&db, followed, None, "from followed 2", at(3)).await;
        insert_post(&db, reader, None, "from reader", at(4)).await;

        let empty = feed
            .compose(FeedScope::Following, reader.into(), PageRequest::FIRST)
            .await
            .unwrap();
        assert!(empty.is_empty());
        assert_eq!(empty.num_pages, 1);

        feed.follows.follow(reader.into(), followed).await.unwrap();

        let page = feed
            .compose(FeedScope::Following, reader.into(), PageRequest::FIRST)
            .await
            .unwrap();
        assert_eq!(texts(&page), ["from followed 2", "from followed 1"]);
        assert!(page.items.iter().all(|p| p.author.id == followed));

        feed.follows.unfollow(reader.into(), followed).await.unwrap();
        let page = feed
            .compose(FeedScope::Following, reader.into(), PageRequest::FIRST)
            .await
            .unwrap();
        assert!(page.is_empty());
    }

    #[tokio::test]
    async fn test_following_feed_requires_login() {
        let Fixture { feed, .. } = setup_feed(setup_test_db().await);

        let result = feed
            .compose(FeedScope::Following, Requester::Anonymous, PageRequest::FIRST)
            .await;
        assert!(matches!(result, Err(FeedServiceError::AuthenticationRequired)));

        let kind = ResourceError::from(result.unwrap_err()).kind();
        assert_eq!(kind, ErrorKind::AuthenticationRequired);
    }

    #[tokio::test]
    async fn test_unknown_group_and_author() {
        let Fixture { feed, .. } = setup_feed(setup_test_db().await);

        let group = feed
            .compose(FeedScope::Group("nope".into()), Requester::Anonymous, PageRequest::FIRST)
            .await;
        assert!(matches!(group, Err(FeedServiceError::GroupNotFound)));

        let author = feed
            .compose(FeedScope::Author("nobody".into()), Requester::Anonymous, PageRequest::FIRST)
            .await;
        assert!(matches!(author, Err(FeedServiceError::UserNotFound)));

        assert!(matches!(
            feed.profile_page("nobody", Requester::Anonymous, PageRequest::FIRST).await,
            Err(FeedServiceError::UserNotFound)
        ));
        assert!(matches!(
            feed.group_page("nope", PageRequest::FIRST).await,
            Err(FeedServiceError::GroupNotFound)
        ));
    }

    #[tokio::test]
    async fn test_global_feed_is_cached_for_ttl() {
        let Fixture { db, feed, clock } = setup_feed(setup_test_db().await);
        let author = create_test_user(&db, "author").await;

        insert_post(&db, author, None, "before", at(1)).await;

        let first = feed
            .compose(FeedScope::Global, Requester::Anonymous, PageRequest::FIRST)
            .await
            .unwrap();
        assert_eq!(texts(&first), ["before"]);

        insert_post(&db, author, None, "after", at(2)).await;

        clock.advance(Duration::from_secs(19));
        let stale = feed
            .compose(FeedScope::Global, Requester::Anonymous, PageRequest::FIRST)
            .await
            .unwrap();
        assert_eq!(stale, first, "snapshot is reused within the TTL");

        clock.advance(Duration::from_secs(1));
        let fresh = feed
            .compose(FeedScope::Global, Requester::Anonymous, PageRequest::FIRST)
            .await
            .unwrap();
        assert_eq!(texts(&fresh), ["after", "before"]);
    }

    #[tokio::test]
    async fn test_refresh_global_drops_snapshot() {
        let Fixture { db, feed, .. } = setup_feed(setup_test_db().await);
        let author = create_test_user(&db, "author").await;

        let empty = feed
            .compose(FeedScope::Global, Requester::Anonymous, PageRequest::FIRST)
            .await
            .unwrap();
        assert!(empty.is_empty());

        insert_post(&db, author, None, "new", at(1)).await;
        feed.refresh_global().await;

        let page = feed
            .compose(FeedScope::Global, Requester::Anonymous, PageRequest::FIRST)
            .await
            .unwrap();
        assert_eq!(texts(&page), ["new"]);
    }

    #[tokio::test]
    async fn test_profile_page() {
        let Fixture { db, feed, .. } = setup_feed(setup_test_db().await);
        let author = create_test_user(&db, "author").await;
        let reader = create_test_user(&db, "reader").await;

        for i in 1..=12 {
            insert_post(&db, author, None, &format!("post {i}"), at(i)).await;
        }

        let anonymous = feed
            .profile_page("author", Requester::Anonymous, PageRequest::new(2))
            .await
            .unwrap();
        assert_eq!(anonymous.author.username, "author");
        assert_eq!(anonymous.posts_count, 12);
        assert!(!anonymous.following);
        assert_eq!(texts(&anonymous.page), ["post 2", "post 1"]);

        feed.follows.follow(reader.into(), author).await.unwrap();
        let as_reader = feed
            .profile_page("author", reader.into(), PageRequest::FIRST)
            .await
            .unwrap();
        assert!(as_reader.following);
        assert_eq!(as_reader.page.len(), 10);
    }

    #[tokio::test]
    async fn test_group_page() {
        let Fixture { db, feed, .. } = setup_feed(setup_test_db().await);
        let author = create_test_user(&db, "author").await;
        let art = create_test_group(&db, "art").await;

        insert_post(&db, author, Some(art), "sketch", at(1)).await;

        let page = feed.group_page("art", PageRequest::FIRST).await.unwrap();
        assert_eq!(page.group.slug, "art");
        assert_eq!(page.description, "Test group");
        assert_eq!(texts(&page.page), ["sketch"]);
        assert_eq!(
            page.page.items[0].group.as_ref().map(|g| g.id),
            Some(art)
        );
    }

    #[tokio::test]
    async fn test_post_detail() {
        let Fixture { db, feed, .. } = setup_feed(setup_test_db().await);
        let author = create_test_user(&db, "author").await;
        let reader = create_test_user(&db, "reader").await;

        let post_id = insert_post(&db, author, None, "look", at(1)).await;
        insert_post(&db, author, None, "another", at(2)).await;

        for (who, text, second) in [(reader, "first", 5), (author, "reply", 6)] {
            CommentActiveModel {
                post_id: Set(post_id),
                author_id: Set(who),
                text: Set(text.to_string()),
                created_at: Set(at(second)),
                ..Default::default()
            }
            .insert(&db)
            .await
            .unwrap();
        }

        let detail = feed.post_detail(post_id).await.unwrap();
        assert_eq!(detail.post.text, "look");
        assert_eq!(detail.author_posts_count, 2);
        let comments: Vec<_> = detail
            .comments
            .iter()
            .map(|c| (c.author.username.as_str(), c.text.as_str()))
            .collect();
        assert_eq!(comments, [("reader", "first"), ("author", "reply")]);

        let missing = feed.post_detail(PostId::from_i64(999)).await;
        assert!(matches!(missing, Err(FeedServiceError::PostNotFound)));
    }
}
