use tokio::sync::OnceCell;

use std::sync::Arc;

use sea_orm::{DatabaseConnection, DbErr};
use thiserror::Error;

use crate::{
    cache::{Clock, SystemClock},
    config::{BlogrollConfig, ConfigError, FeedSettings},
    service::{
        comments::CommentsService,
        feed::{FeedCache, FeedService},
        follows::FollowsService,
        groups::GroupsService,
        posts::PostsService,
        users::UsersService,
    },
};

pub mod cache;
pub mod config;
pub mod entity;
pub mod error;
pub mod ids;
pub mod models;
pub mod pagination;
pub mod requester;
pub mod service;
pub mod telemetry;
pub mod util;

#[cfg(test)]
mod test_utils;

static BLOGROLL_CORE: OnceCell<Arc<BlogrollCore>> = OnceCell::const_new();

/// Process-wide runtime, started from the default config on first use.
pub async fn core() -> Result<Arc<BlogrollCore>, StartupError> {
    BLOGROLL_CORE
        .get_or_try_init(|| async move {
            let config = config::get_or_init().await?;
            Ok::<_, StartupError>(Arc::new(BlogrollCore::start(config).await?))
        })
        .await
        .cloned()
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to load config")]
    Config(#[from] ConfigError),

    #[error("failed to open or migrate the database")]
    Db(#[from] DbErr),
}

/// Main runtime handle for Blogroll.
///
/// All services share one connection pool and one feed cache.
#[derive(Clone)]
pub struct BlogrollCore {
    pub db: DatabaseConnection,
    pub settings: FeedSettings,

    pub users: UsersService,
    pub groups: GroupsService,
    pub posts: PostsService,
    pub comments: CommentsService,
    pub follows: FollowsService,
    pub feed: FeedService,
}

impl BlogrollCore {
    pub async fn start(config: BlogrollConfig) -> Result<Self, StartupError> {
        if telemetry::init(&config.log_filter).is_err() {
            tracing::debug!("tracing subscriber already installed");
        }
        tracing::info!(?config, "starting blogroll core");

        // DB + migrations
        let db = models::open_or_create_db(&config).await?;
        models::migrate_up(&db).await?;

        Ok(Self::from_connection(
            db,
            config.feed_settings(),
            Arc::new(SystemClock),
        ))
    }

    /// Wire the services around an already migrated database.
    pub fn from_connection(
        db: DatabaseConnection,
        settings: FeedSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let feed_cache = Arc::new(FeedCache::new(clock));
        let follows = FollowsService::new(db.clone());

        Self {
            users: UsersService::new(db.clone()),
            groups: GroupsService::new(db.clone()),
            posts: PostsService::new(db.clone()),
            comments: CommentsService::new(db.clone()),
            feed: FeedService::new(db.clone(), follows.clone(), feed_cache, settings),
            follows,
            settings,
            db,
        }
    }

    pub async fn shutdown(self) -> Result<(), DbErr> {
        self.db.close().await
    }
}

pub mod prelude {
    pub use super::cache;
    pub use super::config;
    pub use super::entity;
    pub use super::error::{ErrorKind, ResourceError};
    pub use super::ids::{CommentId, FollowId, GroupId, PostId, UserId};
    pub use super::models::view::{CommentView, GroupRef, PostView, UserRef};
    pub use super::pagination::{Page, PageRequest};
    pub use super::requester::Requester;
    pub use super::service;
    pub use super::service::feed::FeedScope;
    pub use super::service::posts::PostDraft;
    pub use super::{BlogrollCore, StartupError};
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::prelude::*;
    use super::*;
    use crate::cache::ManualClock;
    use crate::test_utils::setup_test_db;

    #[tokio::test]
    async fn test_services_share_one_store_and_cache() {
        let clock = ManualClock::new();
        let core = BlogrollCore::from_connection(
            setup_test_db().await,
            FeedSettings::default(),
            Arc::new(clock.clone()),
        );

        let alice = core.users.register("alice").await.unwrap();
        let bob = core.users.register("bob").await.unwrap();
        core.groups.create_group("Art", "art", "").await.unwrap();

        let post_id = core
            .posts
            .create_post(alice.id.into(), PostDraft::new("hello").in_group("art"))
            .await
            .unwrap();
        core.comments
            .add_comment(bob.id.into(), post_id, "welcome")
            .await
            .unwrap();
        core.follows.follow(bob.id.into(), alice.id).await.unwrap();

        let following = core
            .feed
            .compose(FeedScope::Following, bob.id.into(), PageRequest::FIRST)
            .await
            .unwrap();
        assert_eq!(following.len(), 1);
        assert_eq!(following.items[0].id, post_id);

        let global = core
            .feed
            .compose(FeedScope::Global, Requester::Anonymous, PageRequest::FIRST)
            .await
            .unwrap();
        assert_eq!(global.len(), 1);

        // Deleting is visible to the database-backed feeds right away, but
        // the global feed keeps its snapshot until the TTL runs out.
        core.posts.delete_post(alice.id.into(), post_id).await.unwrap();

        let global = core
            .feed
            .compose(FeedScope::Global, Requester::Anonymous, PageRequest::FIRST)
            .await
            .unwrap();
        assert_eq!(global.len(), 1);

        clock.advance(Duration::from_secs(20));
        let global = core
            .feed
            .compose(FeedScope::Global, Requester::Anonymous, PageRequest::FIRST)
            .await
            .unwrap();
        assert!(global.is_empty());

        let profile = core
            .feed
            .profile_page("alice", bob.id.into(), PageRequest::FIRST)
            .await
            .unwrap();
        assert_eq!(profile.posts_count, 0);
        assert!(profile.following);

        core.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_ungrouped_post_reaches_every_feed() {
        let clock = ManualClock::new();
        let core = BlogrollCore::from_connection(
            setup_test_db().await,
            FeedSettings {
                global_ttl: Duration::MAX,
                ..FeedSettings::default()
            },
            Arc::new(clock.clone()),
        );

        let alice = core.users.register("alice").await.unwrap();
        let post_id = core
            .posts
            .create_post(alice.id.into(), PostDraft::new("no group"))
            .await
            .unwrap();

        let view = core.posts.get_post_view(post_id).await.unwrap();
        assert_eq!(view.group, None);

        for scope in [FeedScope::Global, FeedScope::Author("alice".to_string())] {
            let page = core
                .feed
                .compose(scope, Requester::Anonymous, PageRequest::FIRST)
                .await
                .unwrap();
            assert_eq!(page.len(), 1);
            assert_eq!(page.items[0].id, post_id);
            assert_eq!(page.items[0].group, None);
        }

        clock.advance(Duration::from_secs(3600));
        let global = core
            .feed
            .compose(FeedScope::Global, Requester::Anonymous, PageRequest::FIRST)
            .await
            .unwrap();
        assert_eq!(global.len(), 1);
    }

    #[tokio::test]
    async fn test_errors_map_to_kinds() {
        let core = BlogrollCore::from_connection(
            setup_test_db().await,
            FeedSettings::default(),
            Arc::new(SystemClock),
        );

        let alice = core.users.register("alice").await.unwrap();

        let cases: Vec<(ResourceError, ErrorKind)> = vec![
            (
                core.follows.follow(alice.id.into(), alice.id).await.unwrap_err().into(),
                ErrorKind::SelfReferenceRejected,
            ),
            (
                core.posts
                    .create_post(Requester::Anonymous, PostDraft::new("x"))
                    .await
                    .unwrap_err()
                    .into(),
                ErrorKind::AuthenticationRequired,
            ),
            (
                core.posts
                    .create_post(alice.id.into(), PostDraft::new(""))
                    .await
                    .unwrap_err()
                    .into(),
                ErrorKind::ValidationFailed,
            ),
            (
                core.feed.post_detail(PostId::from_i64(1)).await.unwrap_err().into(),
                ErrorKind::NotFound,
            ),
            (
                core.users.register("alice").await.unwrap_err().into(),
                ErrorKind::AlreadyExists,
            ),
        ];

        for (error, kind) in cases {
            assert_eq!(error.kind(), kind, "{error}");
        }
    }
}
