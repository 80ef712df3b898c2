use std::sync::Arc;

use chrono::{Duration, Utc};
use feedstash::models::{ArticleInput, ArticleQuery};
use feedstash::search::LanguageDetector;
use feedstash::Repository;
use tempfile::TempDir;

const IMPORT: &str = r#"[
  {
    "id": "a1",
    "title": "AI Breakthrough",
    "link": "https://example.com/a1",
    "description": "Researchers report a new model",
    "content": "Researchers report a new model",
    "source": "Tech Wire",
    "publishedAt": "2025-01-07T09:00:00Z"
  },
  {
    "id": "a2",
    "title": "Market Update",
    "link": "https://example.com/a2",
    "description": "Stocks closed higher",
    "content": "Stocks closed higher",
    "source": "Tech Wire",
    "publishedAt": "2025-01-06T09:00:00Z"
  }
]"#;

async fn open_store() -> (TempDir, Repository) {
    let dir = tempfile::tempdir().unwrap();
    let repo = Repository::open(dir.path().join("feeds.db"), false, true)
        .await
        .unwrap();
    (dir, repo)
}

fn input(id: &str, title: &str) -> ArticleInput {
    ArticleInput {
        id: id.to_string(),
        title: title.to_string(),
        link: format!("https://example.com/{id}"),
        description: String::new(),
        content: format!("{title} in depth"),
        author: "Desk".to_string(),
        source: "Wire".to_string(),
        categories: Vec::new(),
        published_at: Utc::now(),
    }
}

#[tokio::test]
async fn imported_articles_are_searchable() {
    let (_dir, repo) = open_store().await;
    let articles: Vec<ArticleInput> = serde_json::from_str(IMPORT).unwrap();
    assert_eq!(repo.save_feed("tech", articles).await.unwrap(), 2);

    let loaded = repo.load_feed("tech").await.unwrap();
    let ids: Vec<&str> = loaded.iter().map(|a| a.article_id.as_str()).collect();
    assert_eq!(ids, vec!["a1", "a2"]);
    assert!(loaded.iter().all(|a| a.source == "Tech Wire"));

    // Both articles are older than the freshness window, so bodies were
    // compressed on ingest and must read back intact.
    assert_eq!(loaded[1].content, "Stocks closed higher");

    let query = ArticleQuery {
        search: vec!["AI".to_string()],
        ..Default::default()
    };
    let found = repo.get_topic_articles("tech", &query).await.unwrap();
    assert_eq!(found.total_count, 1);
    assert_eq!(found.articles[0].article_id, "a1");

    let query = ArticleQuery {
        search: vec!["stocks".to_string()],
        select: vec!["id".to_string(), "title".to_string()],
        ..Default::default()
    };
    let found = repo.get_all_articles(&query).await.unwrap();
    let projected = found.project(&query.select).unwrap();
    assert_eq!(
        projected,
        vec![serde_json::json!({ "id": "a2", "title": "Market Update" })]
    );
}

#[tokio::test]
async fn topics_share_articles_until_deleted() {
    let (_dir, repo) = open_store().await;
    repo.save_feed("science", vec![input("s1", "Comet sighted")])
        .await
        .unwrap();
    let outcome = repo
        .assign_articles_to_topic("space", vec!["s1".to_string(), "missing".to_string()])
        .await
        .unwrap();
    assert_eq!(outcome.succeeded, 1);
    assert_eq!(outcome.failed, 1);

    assert_eq!(repo.get_feed_info("space").await.unwrap().article_count, 1);
    assert_eq!(repo.list_topics().await.unwrap().len(), 2);

    repo.delete_topic("science").await.unwrap();
    assert!(repo.get_article("s1").await.unwrap_err().is_not_found());
    assert!(repo.load_feed("space").await.unwrap_err().is_not_found());

    let stats = repo.stats().await.unwrap();
    assert_eq!(stats.total_articles, 0);
    assert_eq!(stats.total_topics, 1);
}

struct AlwaysFrench;

impl LanguageDetector for AlwaysFrench {
    fn detect(&self, _text: &str) -> Option<String> {
        Some("fr".to_string())
    }
}

#[tokio::test]
async fn injected_detector_labels_articles() {
    let (_dir, repo) = open_store().await;
    let repo = repo.with_language_detector(Arc::new(AlwaysFrench));
    repo.save_articles(vec![input("f1", "Bonjour")]).await.unwrap();
    assert_eq!(repo.get_article("f1").await.unwrap().language, "fr");
}

#[test]
fn retention_sweep_from_sync_context() {
    tokio_test::block_on(async {
        let (_dir, repo) = open_store().await;
        let mut old = input("o1", "Archive");
        old.published_at = Utc::now() - Duration::days(120);
        repo.save_feed("archive", vec![old, input("n1", "Latest")])
            .await
            .unwrap();

        assert_eq!(repo.cleanup_old_articles(Duration::days(90)).await.unwrap(), 1);
        assert_eq!(repo.load_feed("archive").await.unwrap().len(), 1);
    });
}
