use anyhow::anyhow;
use async_trait::async_trait;
use nb_core::error::{StoreError, StoreResult};
use nb_core::models::{Comment, Post, PostFilter};
use nb_core::traits::{OrderDir, PostOrderBy, PostPage, PostRepository};
use uuid::Uuid;

use crate::{window, Table};

/// In-memory post repository. Filtering, sorting and windowing all happen
/// in-process over a snapshot taken under the read lock.
pub struct MemoryPostRepository {
    posts: Table<Post>,
    comments: Table<Comment>,
}

impl MemoryPostRepository {
    pub fn new(posts: Table<Post>, comments: Table<Comment>) -> Self {
        MemoryPostRepository { posts, comments }
    }
}

fn matches(post: &Post, filter: &PostFilter) -> bool {
    if let Some(author_id) = filter.author_id {
        if post.author_id != author_id {
            return false;
        }
    }
    if let Some(enabled) = filter.comments_enabled {
        if post.comments_enabled != enabled {
            return false;
        }
    }
    true
}

fn sort_posts(posts: &mut [Post], order_by: PostOrderBy, order_dir: OrderDir) {
    posts.sort_by(|a, b| {
        let ord = match order_by {
            PostOrderBy::CreatedAt => a.created_at.cmp(&b.created_at),
            PostOrderBy::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            PostOrderBy::Title => a.title.cmp(&b.title),
        };
        // id tiebreak keeps pagination windows stable across identical keys
        let ord = ord.then_with(|| a.id.cmp(&b.id));
        match order_dir {
            OrderDir::Asc => ord,
            OrderDir::Desc => ord.reverse(),
        }
    });
}

#[async_trait]
impl PostRepository for MemoryPostRepository {
    async fn create(&self, post: &Post) -> StoreResult<()> {
        let mut posts = self.posts.write().await;
        if posts.contains_key(&post.id) {
            return Err(StoreError::backend(anyhow!(
                "post {} already exists",
                post.id
            )));
        }
        posts.insert(post.id, post.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> StoreResult<Post> {
        let posts = self.posts.read().await;
        posts.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    async fn list(&self, filter: &PostFilter, page: &PostPage) -> StoreResult<Vec<Post>> {
        let posts = self.posts.read().await;
        let mut selected: Vec<Post> = posts
            .values()
            .filter(|post| matches(post, filter))
            .cloned()
            .collect();
        drop(posts);

        sort_posts(&mut selected, page.order_by, page.order_dir);
        Ok(window(selected, page.offset, page.limit))
    }

    async fn count(&self, filter: &PostFilter) -> StoreResult<usize> {
        let posts = self.posts.read().await;
        Ok(posts.values().filter(|post| matches(post, filter)).count())
    }

    async fn update(&self, post: &Post) -> StoreResult<()> {
        let mut posts = self.posts.write().await;
        match posts.get_mut(&post.id) {
            Some(stored) => {
                *stored = post.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound),
        }
    }

    async fn delete(&self, id: Uuid) -> StoreResult<()> {
        let mut posts = self.posts.write().await;
        match posts.remove(&id) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound),
        }
    }

    async fn exists(&self, id: Uuid) -> StoreResult<bool> {
        let posts = self.posts.read().await;
        Ok(posts.contains_key(&id))
    }

    async fn list_with_comment_counts(
        &self,
        filter: &PostFilter,
        page: &PostPage,
    ) -> StoreResult<Vec<(Post, i64)>> {
        let selected = self.list(filter, page).await?;

        let comments = self.comments.read().await;
        let mut result = Vec::with_capacity(selected.len());
        for post in selected {
            let count = comments
                .values()
                .filter(|comment| comment.post_id == post.id)
                .count() as i64;
            result.push((post, count));
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_repositories;
    use nb_core::models::PostInput;

    fn post(author_id: Uuid, title: &str, comments_enabled: bool) -> Post {
        Post::new(PostInput {
            title: title.to_string(),
            content: "body".to_string(),
            author_id,
            comments_enabled,
        })
    }

    fn page(limit: usize) -> PostPage {
        PostPage {
            offset: 0,
            limit,
            order_by: PostOrderBy::CreatedAt,
            order_dir: OrderDir::Desc,
        }
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let repos = memory_repositories();
        let p = post(Uuid::now_v7(), "hello", true);
        repos.post.create(&p).await.unwrap();

        let fetched = repos.post.get_by_id(p.id).await.unwrap();
        assert_eq!(fetched.title, "hello");
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let repos = memory_repositories();
        let err = repos.post.get_by_id(Uuid::now_v7()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn duplicate_create_is_a_backend_error() {
        let repos = memory_repositories();
        let p = post(Uuid::now_v7(), "once", true);
        repos.post.create(&p).await.unwrap();
        let err = repos.post.create(&p).await.unwrap_err();
        assert!(!err.is_not_found());
    }

    #[tokio::test]
    async fn stored_rows_are_isolated_from_caller_mutation() {
        let repos = memory_repositories();
        let mut p = post(Uuid::now_v7(), "original", true);
        repos.post.create(&p).await.unwrap();

        // mutating our local copy must not leak into the store
        p.title = "mutated".to_string();
        let mut fetched = repos.post.get_by_id(p.id).await.unwrap();
        assert_eq!(fetched.title, "original");

        // and mutating a fetched copy must not either
        fetched.title = "also mutated".to_string();
        assert_eq!(
            repos.post.get_by_id(p.id).await.unwrap().title,
            "original"
        );
    }

    #[tokio::test]
    async fn filters_combine_by_conjunction() {
        let repos = memory_repositories();
        let author = Uuid::now_v7();
        repos.post.create(&post(author, "a", true)).await.unwrap();
        repos.post.create(&post(author, "b", false)).await.unwrap();
        repos
            .post
            .create(&post(Uuid::now_v7(), "c", true))
            .await
            .unwrap();

        let filter = PostFilter {
            author_id: Some(author),
            comments_enabled: Some(true),
        };
        let listed = repos.post.list(&filter, &page(10)).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].title, "a");
        assert_eq!(repos.post.count(&filter).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn listing_orders_and_windows() {
        let repos = memory_repositories();
        for title in ["first", "second", "third"] {
            repos
                .post
                .create(&post(Uuid::now_v7(), title, true))
                .await
                .unwrap();
        }

        let newest_first = repos
            .post
            .list(&PostFilter::default(), &page(2))
            .await
            .unwrap();
        assert_eq!(newest_first.len(), 2);
        assert_eq!(newest_first[0].title, "third");

        let by_title = repos
            .post
            .list(
                &PostFilter::default(),
                &PostPage {
                    offset: 1,
                    limit: 10,
                    order_by: PostOrderBy::Title,
                    order_dir: OrderDir::Asc,
                },
            )
            .await
            .unwrap();
        assert_eq!(by_title[0].title, "second");
    }

    #[tokio::test]
    async fn update_and_delete_respect_the_not_found_sentinel() {
        let repos = memory_repositories();
        let p = post(Uuid::now_v7(), "victim", true);

        assert!(repos.post.update(&p).await.unwrap_err().is_not_found());
        assert!(repos.post.delete(p.id).await.unwrap_err().is_not_found());

        repos.post.create(&p).await.unwrap();
        assert!(repos.post.exists(p.id).await.unwrap());
        repos.post.delete(p.id).await.unwrap();
        assert!(!repos.post.exists(p.id).await.unwrap());
    }

    #[tokio::test]
    async fn comment_counts_come_from_the_shared_table() {
        use nb_core::models::CommentInput;
        use nb_core::traits::CommentRepository;

        let repos = memory_repositories();
        let p = post(Uuid::now_v7(), "counted", true);
        repos.post.create(&p).await.unwrap();

        for i in 0..3 {
            let comment = Comment::new(
                CommentInput {
                    post_id: p.id,
                    parent_id: None,
                    content: format!("c{i}"),
                    author_id: Uuid::now_v7(),
                },
                0,
            );
            repos.comment.create(&comment).await.unwrap();
        }

        let rows = repos
            .post
            .list_with_comment_counts(&PostFilter::default(), &page(10))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].1, 3);
    }
}
