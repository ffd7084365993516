use digest_reader::models::{ArticleFilter, HistoryItem};
use digest_reader::{App, Config, Result, WriteAck};

const USAGE: &str = "Usage: digest-reader [COMMAND]

Commands:
  --refresh               Fetch all feeds and merge them into history (default)
  --list [unread|bookmarked|all]
                          List stored articles
  --show ID               Print one item in full
  --read ID               Mark an item read
  --unread ID             Mark an item unread
  --bookmark ID           Toggle an item's bookmark
  --insight ID            Summarize and tag an item with AI
  --digest [--force]      Show today's digest, generating it if needed
  --groups                Suggest groups for the subscribed feeds
  --help                  Show this message";

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

    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(String::as_str).unwrap_or("--refresh");
    let operand = args.get(2).map(String::as_str);

    if command == "--help" || command == "-h" {
        println!("{}", USAGE);
        return Ok(());
    }

    // Load configuration
    let config = Config::load()?;

    // Initialize app
    let app = App::new(&config).await?;

    match (command, operand) {
        ("--refresh", _) => {
            if app.feeds.is_empty() {
                println!(
                    "No feeds configured. Add some to {}",
                    Config::config_path().display()
                );
                return Ok(());
            }
            let ack = app.refresh_feeds().await;
            warn_if_volatile(&ack);
            println!("{}", ack.value.report.status_line());
            println!("{} new or updated items", ack.value.changed);
        }
        ("--list", filter) => {
            let filter = match filter {
                Some(value) => ArticleFilter::parse(value).ok_or_else(|| {
                    anyhow::anyhow!(
                        "unknown filter {:?}, expected unread, bookmarked or all",
                        value
                    )
                })?,
                None => ArticleFilter::default(),
            };
            for item in app.articles(filter).await {
                println!("{}", list_line(&item));
            }
        }
        ("--show", Some(id)) => match app.load_history_item(id).await? {
            Some(item) => print_item(&app, &item).await,
            None => println!("No item {}", id),
        },
        ("--read", Some(id)) | ("--unread", Some(id)) => {
            let ack = app.mark_read(id, command == "--read").await;
            warn_if_volatile(&ack);
            report_missing(id, ack.value.as_ref());
        }
        ("--bookmark", Some(id)) => {
            let ack = app.toggle_bookmark(id).await;
            warn_if_volatile(&ack);
            match &ack.value {
                Some(item) if item.is_bookmarked => println!("Bookmarked {}", item.title),
                Some(item) => println!("Removed bookmark from {}", item.title),
                None => println!("No item {}", id),
            }
        }
        ("--insight", Some(id)) => {
            let ack = app.generate_insight(id).await?;
            warn_if_volatile(&ack);
            match &ack.value {
                Some(item) => {
                    println!("{}\n", item.ai_summary);
                    println!("Tags: {}", item.ai_tags.join(", "));
                }
                None => println!("No item {}", id),
            }
        }
        ("--digest", flag) => {
            let digest = app.build_daily(flag == Some("--force")).await?;
            let origin = if digest.used_cache { "cached" } else { "generated" };
            println!("Daily digest for {} ({})\n", digest.date_key, origin);
            for topic in &digest.items {
                println!("## {}", topic.title);
                println!("{}", topic.body);
                if !topic.ai_tags.is_empty() {
                    println!("Tags: {}", topic.ai_tags.join(", "));
                }
                for article in app.related(topic).await {
                    println!("  - {}", list_line(&article));
                }
                println!();
            }
        }
        ("--groups", _) => {
            for group in app.group_feeds().await? {
                println!("{}", group.name);
                for url in &group.feed_urls {
                    println!("  {}", url);
                }
            }
        }
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    }

    Ok(())
}

fn warn_if_volatile<T>(ack: &WriteAck<T>) {
    if let Err(e) = &ack.persisted {
        eprintln!("Warning: change was not saved ({}); it will be lost on restart", e);
    }
}

fn report_missing(id: &str, item: Option<&HistoryItem>) {
    if item.is_none() {
        println!("No item {}", id);
    }
}

fn list_line(item: &HistoryItem) -> String {
    let marker = match (item.is_read, item.is_bookmarked) {
        (_, true) => '*',
        (false, false) => '•',
        (true, false) => ' ',
    };
    let date = item
        .effective_date()
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default();
    format!("{} {}  {:10}  {} ({})", marker, item.id, date, item.title, item.origin_feed_title)
}

async fn print_item(app: &App, item: &HistoryItem) {
    println!("{}", item.title);
    if !item.origin_feed_title.is_empty() {
        println!("{}", item.origin_feed_title);
    }
    if !item.link.is_empty() {
        println!("{}", item.link);
    }
    println!();
    println!("{}", item.body);

    if !item.ai_summary.is_empty() {
        println!("\nAI summary:\n{}", item.ai_summary);
        println!("Tags: {}", item.ai_tags.join(", "));
    }

    if item.is_digest() {
        println!("\nArticles:");
        for article in app.related(item).await {
            println!("  - {}", list_line(&article));
        }
    }
}
