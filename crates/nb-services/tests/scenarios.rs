//! End-to-end scenarios over the in-memory backend: post lifecycle,
//! hierarchical comments, pagination, and live subscriptions through the
//! service manager.

use nb_core::config::CoreConfig;
use nb_core::cursor::decode_cursor;
use nb_core::error::ErrorKind;
use nb_core::models::{
    flatten_comments_tree, CommentAction, CommentFilter, CommentInput, CommentUpdateInput,
    PaginationInput, PostFilter, PostInput, PostUpdateInput,
};
use nb_db_memory::memory_repositories;
use nb_services::ServiceManager;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

fn manager() -> ServiceManager {
    ServiceManager::new(memory_repositories(), CoreConfig::default())
}

fn post_input(author_id: Uuid, title: &str, comments_enabled: bool) -> PostInput {
    PostInput {
        title: title.to_string(),
        content: "body".to_string(),
        author_id,
        comments_enabled,
    }
}

fn comment_input(post_id: Uuid, parent_id: Option<Uuid>, content: &str) -> CommentInput {
    CommentInput {
        post_id,
        parent_id,
        content: content.to_string(),
        author_id: Uuid::now_v7(),
    }
}

fn first(n: i32) -> PaginationInput {
    PaginationInput {
        first: Some(n),
        ..Default::default()
    }
}

#[tokio::test]
async fn post_lifecycle_create_get_update_forbidden_delete() {
    let mgr = manager();
    let author = Uuid::now_v7();
    let intruder = Uuid::now_v7();

    let created = mgr
        .posts()
        .create_post(PostInput {
            title: "A".to_string(),
            content: "B".to_string(),
            author_id: author,
            comments_enabled: true,
        })
        .await
        .unwrap();
    assert_eq!(created.created_at, created.updated_at);

    let fetched = mgr.posts().get_post(created.id).await.unwrap();
    assert_eq!(fetched.title, "A");
    assert_eq!(fetched.author_id, author);

    let updated = mgr
        .posts()
        .update_post(
            created.id,
            PostUpdateInput {
                title: Some("A2".to_string()),
                ..Default::default()
            },
            author,
        )
        .await
        .unwrap();
    assert_eq!(updated.title, "A2");
    assert!(updated.updated_at > updated.created_at);
    assert_eq!(updated.created_at, created.created_at);

    let err = mgr
        .posts()
        .update_post(
            created.id,
            PostUpdateInput {
                title: Some("A3".to_string()),
                ..Default::default()
            },
            intruder,
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    mgr.posts().delete_post(created.id, author).await.unwrap();
    let err = mgr.posts().get_post(created.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn comment_tree_nests_three_levels() {
    let mgr = manager();
    let post = mgr
        .posts()
        .create_post(post_input(Uuid::now_v7(), "P", true))
        .await
        .unwrap();

    let c1 = mgr
        .comments()
        .create_comment(comment_input(post.id, None, "c1"))
        .await
        .unwrap();
    assert_eq!(c1.depth, 0);

    let c2 = mgr
        .comments()
        .create_comment(comment_input(post.id, Some(c1.id), "c2"))
        .await
        .unwrap();
    assert_eq!(c2.depth, 1);

    let c3 = mgr
        .comments()
        .create_comment(comment_input(post.id, Some(c2.id), "c3"))
        .await
        .unwrap();
    assert_eq!(c3.depth, 2);

    let tree = mgr.comments().get_comments_tree(post.id).await.unwrap();
    assert_eq!(tree.len(), 1);
    assert_eq!(tree[0].id, c1.id);
    assert_eq!(tree[0].children.len(), 1);
    assert_eq!(tree[0].children[0].id, c2.id);
    assert_eq!(tree[0].children[0].children.len(), 1);
    assert_eq!(tree[0].children[0].children[0].id, c3.id);
    assert!(tree[0].children[0].children[0].children.is_empty());

    // depth invariant holds for every node of the returned tree
    for node in flatten_comments_tree(&tree) {
        match node.parent_id {
            None => assert_eq!(node.depth, 0),
            Some(_) => assert!(node.depth > 0),
        }
    }
}

#[tokio::test]
async fn commenting_on_a_disabled_post_is_forbidden() {
    let mgr = manager();
    let post = mgr
        .posts()
        .create_post(post_input(Uuid::now_v7(), "muted", false))
        .await
        .unwrap();

    let err = mgr
        .comments()
        .create_comment(comment_input(post.id, None, "no entry"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::CommentsDisabled);
    assert!(err.is_forbidden());
    assert_eq!(err.to_string(), "comments are disabled for this post");
}

#[tokio::test]
async fn parent_from_another_post_is_rejected_citing_parent_id() {
    let mgr = manager();
    let post_a = mgr
        .posts()
        .create_post(post_input(Uuid::now_v7(), "PA", true))
        .await
        .unwrap();
    let post_b = mgr
        .posts()
        .create_post(post_input(Uuid::now_v7(), "PB", true))
        .await
        .unwrap();

    let ca = mgr
        .comments()
        .create_comment(comment_input(post_a.id, None, "on A"))
        .await
        .unwrap();

    let err = mgr
        .comments()
        .create_comment(comment_input(post_b.id, Some(ca.id), "crossed"))
        .await
        .unwrap_err();

    assert!(err.is_validation());
    assert_eq!(err.kind(), ErrorKind::InvalidParent);
    assert_eq!(err.details().get("field").unwrap(), "parent_id");
}

#[tokio::test]
async fn nesting_stops_at_the_depth_ceiling() {
    let mgr = manager();
    let post = mgr
        .posts()
        .create_post(post_input(Uuid::now_v7(), "deep", true))
        .await
        .unwrap();

    // depths 0..=50 are all accepted
    let mut parent: Option<Uuid> = None;
    let mut deepest = None;
    for depth in 0..=50 {
        let comment = mgr
            .comments()
            .create_comment(comment_input(post.id, parent, &format!("d{depth}")))
            .await
            .unwrap();
        assert_eq!(comment.depth, depth);
        parent = Some(comment.id);
        deepest = Some(comment);
    }

    // one more would sit at depth 51
    let err = mgr
        .comments()
        .create_comment(comment_input(post.id, Some(deepest.unwrap().id), "too deep"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.to_string().contains("comment depth cannot exceed 50"));
}

#[tokio::test]
async fn subscription_fan_out_and_cancellation() {
    let mgr = manager();
    let post = mgr
        .posts()
        .create_post(post_input(Uuid::now_v7(), "live", true))
        .await
        .unwrap();

    let cancel_s1 = CancellationToken::new();
    let mut s1 = mgr
        .subscriptions()
        .subscribe(cancel_s1.clone(), post.id)
        .await
        .unwrap();
    let mut s2 = mgr
        .subscriptions()
        .subscribe(CancellationToken::new(), post.id)
        .await
        .unwrap();

    let comment = mgr
        .comments()
        .create_comment(comment_input(post.id, None, "C"))
        .await
        .unwrap();

    for stream in [&mut s1, &mut s2] {
        let event = stream.recv().await.unwrap();
        assert_eq!(event.post_id, post.id);
        assert_eq!(event.action, CommentAction::Created);
        assert_eq!(event.comment.as_ref().unwrap().id, comment.id);
        assert_eq!(event.comment.as_ref().unwrap().content, "C");
    }

    cancel_s1.cancel();
    // s1's watcher removes it; its stream must close within a bound
    tokio::time::timeout(std::time::Duration::from_secs(2), async {
        assert!(s1.recv().await.is_none());
    })
    .await
    .expect("cancelled subscriber stream did not close");

    let c2 = mgr
        .comments()
        .create_comment(comment_input(post.id, None, "C2"))
        .await
        .unwrap();

    let event = s2.recv().await.unwrap();
    assert_eq!(event.comment.as_ref().unwrap().id, c2.id);
}

#[tokio::test]
async fn update_and_delete_emit_events() {
    let mgr = manager();
    let author = Uuid::now_v7();
    let post = mgr
        .posts()
        .create_post(post_input(Uuid::now_v7(), "watched", true))
        .await
        .unwrap();

    let comment = mgr
        .comments()
        .create_comment(CommentInput {
            post_id: post.id,
            parent_id: None,
            content: "v1".to_string(),
            author_id: author,
        })
        .await
        .unwrap();

    let mut stream = mgr
        .subscriptions()
        .subscribe(CancellationToken::new(), post.id)
        .await
        .unwrap();

    mgr.comments()
        .update_comment(
            comment.id,
            CommentUpdateInput {
                content: Some("v2".to_string()),
            },
            author,
        )
        .await
        .unwrap();

    let event = stream.recv().await.unwrap();
    assert_eq!(event.action, CommentAction::Updated);
    assert_eq!(event.comment.as_ref().unwrap().content, "v2");

    mgr.comments().delete_comment(comment.id, author).await.unwrap();
    let event = stream.recv().await.unwrap();
    assert_eq!(event.action, CommentAction::Deleted);
    assert!(event.comment.is_none());
    assert_eq!(event.comment_id, comment.id);
}

#[tokio::test]
async fn deleting_a_comment_sweeps_its_descendants() {
    let mgr = manager();
    let author = Uuid::now_v7();
    let post = mgr
        .posts()
        .create_post(post_input(Uuid::now_v7(), "pruned", true))
        .await
        .unwrap();

    let root = mgr
        .comments()
        .create_comment(CommentInput {
            post_id: post.id,
            parent_id: None,
            content: "root".to_string(),
            author_id: author,
        })
        .await
        .unwrap();
    let child = mgr
        .comments()
        .create_comment(comment_input(post.id, Some(root.id), "child"))
        .await
        .unwrap();
    let grandchild = mgr
        .comments()
        .create_comment(comment_input(post.id, Some(child.id), "grandchild"))
        .await
        .unwrap();
    let bystander = mgr
        .comments()
        .create_comment(comment_input(post.id, None, "bystander"))
        .await
        .unwrap();

    mgr.comments().delete_comment(root.id, author).await.unwrap();

    for id in [root.id, child.id, grandchild.id] {
        let err = mgr.comments().get_comment(id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound, "descendant {id} survived");
    }
    assert!(mgr.comments().get_comment(bystander.id).await.is_ok());
}

#[tokio::test]
async fn deleting_a_post_cascades_to_its_comments() {
    let mgr = manager();
    let author = Uuid::now_v7();
    let post = mgr
        .posts()
        .create_post(post_input(author, "doomed", true))
        .await
        .unwrap();

    let root = mgr
        .comments()
        .create_comment(comment_input(post.id, None, "root"))
        .await
        .unwrap();
    mgr.comments()
        .create_comment(comment_input(post.id, Some(root.id), "reply"))
        .await
        .unwrap();

    mgr.posts().delete_post(post.id, author).await.unwrap();

    let err = mgr.comments().get_comments_tree(post.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let err = mgr.comments().get_comment(root.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn pagination_derives_has_next_from_the_filtered_total() {
    let mgr = manager();
    let author = Uuid::now_v7();
    for i in 0..7 {
        mgr.posts()
            .create_post(post_input(author, &format!("p{i}"), true))
            .await
            .unwrap();
    }

    // full page with remainder
    let page = mgr
        .posts()
        .list_posts(PostFilter::default(), first(5))
        .await
        .unwrap();
    assert_eq!(page.len(), 5);
    assert!(page.page_info.has_next_page);

    // the whole set fits
    let page = mgr
        .posts()
        .list_posts(PostFilter::default(), first(7))
        .await
        .unwrap();
    assert_eq!(page.len(), 7);
    assert!(!page.page_info.has_next_page);

    // zero-size window over a non-empty set
    let page = mgr
        .posts()
        .list_posts(PostFilter::default(), first(0))
        .await
        .unwrap();
    assert!(page.is_empty());
    assert!(page.page_info.start_cursor.is_none());
    assert!(page.page_info.end_cursor.is_none());

    // both directions at once is a validation error
    let err = mgr
        .posts()
        .list_posts(
            PostFilter::default(),
            PaginationInput {
                first: Some(2),
                last: Some(2),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    // over the ceiling
    let err = mgr
        .posts()
        .list_posts(PostFilter::default(), first(101))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn edge_cursors_decode_back_to_their_nodes() {
    let mgr = manager();
    let post = mgr
        .posts()
        .create_post(post_input(Uuid::now_v7(), "cursors", true))
        .await
        .unwrap();
    for i in 0..3 {
        mgr.comments()
            .create_comment(comment_input(post.id, None, &format!("c{i}")))
            .await
            .unwrap();
    }

    let page = mgr
        .comments()
        .list_comments(
            CommentFilter {
                post_id: Some(post.id),
                ..Default::default()
            },
            first(10),
        )
        .await
        .unwrap();

    assert_eq!(page.len(), 3);
    for edge in &page.edges {
        let (ts, id) = decode_cursor(&edge.cursor).unwrap();
        assert_eq!(id, edge.node.id);
        assert_eq!(ts.timestamp(), edge.node.created_at.timestamp());
    }

    // comments come back oldest-first
    let contents: Vec<&str> = page.nodes().map(|c| c.content.as_str()).collect();
    assert_eq!(contents, vec!["c0", "c1", "c2"]);
}

#[tokio::test]
async fn fan_out_accounting_is_exact_after_quiescence() {
    let mgr = manager();
    let post = mgr
        .posts()
        .create_post(post_input(Uuid::now_v7(), "counted", true))
        .await
        .unwrap();

    let subscribers = 3usize;
    let publishes = 10u64;
    let mut streams = Vec::new();
    for _ in 0..subscribers {
        streams.push(
            mgr.subscriptions()
                .subscribe(CancellationToken::new(), post.id)
                .await
                .unwrap(),
        );
    }

    for i in 0..publishes {
        mgr.comments()
            .create_comment(comment_input(post.id, None, &format!("n{i}")))
            .await
            .unwrap();
    }

    // every publish ran against the same live subscriber set
    let metrics = mgr.metrics().await;
    assert_eq!(
        metrics.messages_sent + metrics.messages_dropped,
        publishes * subscribers as u64
    );
    // default capacity comfortably holds ten events, so nothing dropped
    assert_eq!(metrics.messages_dropped, 0);
    mgr.health().await.unwrap();
}

#[tokio::test]
async fn manager_close_shuts_every_stream() {
    let mgr = manager();
    let post = mgr
        .posts()
        .create_post(post_input(Uuid::now_v7(), "closing", true))
        .await
        .unwrap();

    let mut s1 = mgr
        .subscriptions()
        .subscribe(CancellationToken::new(), post.id)
        .await
        .unwrap();
    let mut s2 = mgr
        .subscriptions()
        .subscribe(CancellationToken::new(), post.id)
        .await
        .unwrap();

    mgr.close().await;

    assert!(s1.recv().await.is_none());
    assert!(s2.recv().await.is_none());
    assert_eq!(mgr.subscriptions().total_subscriber_count(), 0);
    mgr.health().await.unwrap();
}

#[tokio::test]
async fn comment_subtree_and_depth_statistics() {
    let mgr = manager();
    let post = mgr
        .posts()
        .create_post(post_input(Uuid::now_v7(), "stats", true))
        .await
        .unwrap();

    let root = mgr
        .comments()
        .create_comment(comment_input(post.id, None, "root"))
        .await
        .unwrap();
    let reply = mgr
        .comments()
        .create_comment(comment_input(post.id, Some(root.id), "reply"))
        .await
        .unwrap();
    mgr.comments()
        .create_comment(comment_input(post.id, Some(reply.id), "leaf"))
        .await
        .unwrap();
    mgr.comments()
        .create_comment(comment_input(post.id, None, "other root"))
        .await
        .unwrap();

    let subtree = mgr
        .comments()
        .get_comment_with_children(reply.id)
        .await
        .unwrap();
    assert_eq!(subtree.id, reply.id);
    assert_eq!(subtree.children.len(), 1);
    assert_eq!(subtree.children[0].content, "leaf");

    let stats = mgr
        .comments()
        .comment_depth_statistics(post.id)
        .await
        .unwrap();
    assert_eq!(stats.get(&0), Some(&2));
    assert_eq!(stats.get(&1), Some(&1));
    assert_eq!(stats.get(&2), Some(&1));
}

#[tokio::test]
async fn whole_flow_works_over_sqlite_too() {
    let repos = nb_db_sqlite::sqlite_repositories("sqlite::memory:")
        .await
        .unwrap();
    let mgr = ServiceManager::new(repos, CoreConfig::default());
    let author = Uuid::now_v7();

    let post = mgr
        .posts()
        .create_post(post_input(author, "on sqlite", true))
        .await
        .unwrap();
    let root = mgr
        .comments()
        .create_comment(comment_input(post.id, None, "root"))
        .await
        .unwrap();
    mgr.comments()
        .create_comment(comment_input(post.id, Some(root.id), "reply"))
        .await
        .unwrap();

    let tree = mgr.comments().get_comments_tree(post.id).await.unwrap();
    assert_eq!(tree.len(), 1);
    assert_eq!(tree[0].children.len(), 1);

    mgr.posts().delete_post(post.id, author).await.unwrap();
    assert_eq!(
        mgr.comments()
            .get_comment(root.id)
            .await
            .unwrap_err()
            .kind(),
        ErrorKind::NotFound
    );
}

#[tokio::test]
async fn comment_update_rules_mirror_post_rules() {
    let mgr = manager();
    let author = Uuid::now_v7();
    let post = mgr
        .posts()
        .create_post(post_input(Uuid::now_v7(), "rules", true))
        .await
        .unwrap();
    let comment = mgr
        .comments()
        .create_comment(CommentInput {
            post_id: post.id,
            parent_id: None,
            content: "  padded  ".to_string(),
            author_id: author,
        })
        .await
        .unwrap();
    assert_eq!(comment.content, "padded");
    assert_eq!(comment.created_at, comment.updated_at);

    let err = mgr
        .comments()
        .update_comment(
            comment.id,
            CommentUpdateInput {
                content: Some("hijacked".to_string()),
            },
            Uuid::now_v7(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let updated = mgr
        .comments()
        .update_comment(
            comment.id,
            CommentUpdateInput {
                content: Some("revised".to_string()),
            },
            author,
        )
        .await
        .unwrap();
    assert_eq!(updated.content, "revised");
    assert!(updated.updated_at >= updated.created_at);
    assert_eq!(updated.created_at, comment.created_at);

    // missing rows and nil ids
    let err = mgr
        .comments()
        .get_comment(Uuid::now_v7())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let err = mgr.comments().get_comment(Uuid::nil()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn toggling_comments_gates_new_comments() {
    let mgr = manager();
    let author = Uuid::now_v7();
    let post = mgr
        .posts()
        .create_post(post_input(author, "gated", true))
        .await
        .unwrap();

    mgr.comments()
        .create_comment(comment_input(post.id, None, "while open"))
        .await
        .unwrap();

    let toggled = mgr
        .posts()
        .toggle_comments(post.id, author, false)
        .await
        .unwrap();
    assert!(!toggled.comments_enabled);

    let err = mgr
        .comments()
        .create_comment(comment_input(post.id, None, "while closed"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CommentsDisabled);

    mgr.posts().toggle_comments(post.id, author, true).await.unwrap();
    mgr.comments()
        .create_comment(comment_input(post.id, None, "reopened"))
        .await
        .unwrap();
}
