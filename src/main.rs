use std::path::PathBuf;

use feedstash::models::{Article, ArticleInput, ArticleQuery};
use feedstash::{AppError, Config, Repository, Result};

const USAGE: &str = "usage: feedstash <command>

commands:
  import <topic> <file>        replace a topic with the articles of a JSON file
  topics                       list topics
  show <topic>                 list the articles of a topic
  search <topic|--all> <terms> search articles by keyword
  stats                        print store statistics as JSON
  cleanup <days>               delete articles older than <days>
  dedupe                       delete articles sharing a link with an older one
  compact                      vacuum and analyze the database
  compress                     compress stale article bodies";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (only show warnings and errors by default)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{USAGE}");
        return Ok(());
    };

    let config = Config::load()?;
    let repo = Repository::new(&config).await?;

    match (command.as_str(), &args[1..]) {
        ("import", [topic, file]) => {
            let bytes = tokio::fs::read(PathBuf::from(file)).await?;
            let articles: Vec<ArticleInput> = serde_json::from_slice(&bytes)?;
            let saved = repo.save_feed(topic, articles).await?;
            println!("Imported {saved} articles into '{topic}'");
        }
        ("topics", []) => {
            for topic in repo.list_topics().await? {
                let info = repo.get_feed_info(&topic.name).await?;
                println!("{:<30} {:>6} articles", topic.name, info.article_count);
            }
        }
        ("show", [topic]) => {
            for article in repo.load_feed(topic).await? {
                print_article(&article);
            }
        }
        ("search", [scope, terms @ ..]) if !terms.is_empty() => {
            let query = ArticleQuery {
                search: terms.to_vec(),
                ..Default::default()
            };
            let result = if scope == "--all" {
                repo.get_all_articles(&query).await?
            } else {
                repo.get_topic_articles(scope, &query).await?
            };
            for article in &result.articles {
                print_article(article);
            }
            println!("{} matches", result.total_count);
        }
        ("stats", []) => {
            let stats = repo.stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        ("cleanup", [days]) => {
            let days: i64 = days
                .parse()
                .map_err(|_| AppError::InvalidInput(format!("not a number of days: {days}")))?;
            let removed = repo.cleanup_old_articles(chrono::Duration::days(days)).await?;
            println!("Removed {removed} articles older than {days} days");
        }
        ("dedupe", []) => {
            let removed = repo.remove_duplicates().await?;
            println!("Removed {removed} duplicate articles");
        }
        ("compact", []) => {
            repo.compact().await?;
            println!("Compacted {}", repo.path().display());
        }
        ("compress", []) => {
            let compressed = repo.compress_old_articles().await?;
            println!("Compressed {compressed} articles");
        }
        _ => {
            eprintln!("{USAGE}");
            std::process::exit(2);
        }
    }

    Ok(())
}

fn print_article(article: &Article) {
    println!(
        "{}  {}  {}",
        article.published_at.format("%Y-%m-%d %H:%M"),
        article.title,
        article.link
    );
}
