//! Strata Console - operator commands over the catalog store
//!
//! Every command opens one unit of work against the configured database,
//! runs, and disposes it before exiting.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::sync::Arc;
use strata_core::application::{catalog_registry, ArticleRepository, Row, UnitOfWork};
use strata_core::domain::capability::{DELETED_BY, DELETED_ON, IS_DELETED};
use strata_core::domain::{Article, Label, Value};
use strata_core::port::CurrentUser;
use strata_core::query::{FilterRequest, ReadOptions};
use strata_core::response::{BaseResponse, PaginatedResult};
use strata_infra_sqlite::{create_pool, run_migrations, SqliteStore, StoreConfig};
use tabled::{Table, Tabled};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_ACTOR: &str = "console";
const SEED_LABEL: &str = "general";

#[derive(Parser)]
#[command(name = "strata")]
#[command(about = "Strata catalog console", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Database URL (sqlite://path or sqlite::memory:)
    #[arg(long, env = "STRATA_DB_URL")]
    database_url: Option<String>,

    /// Identity stamped on audited writes; overrides --actor on commands
    #[arg(long, env = "STRATA_USER")]
    user: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending schema migrations
    Migrate,

    /// Insert sample articles under the "general" label
    Seed {
        /// Number of articles to insert
        #[arg(short, long, default_value = "10")]
        count: usize,

        /// Actor recorded as creator
        #[arg(long, default_value = DEFAULT_ACTOR)]
        actor: String,
    },

    /// List articles one page at a time
    List {
        /// Page number (0-based)
        #[arg(short, long, default_value = "0")]
        page: i32,

        /// Page length (1..=50, clamped)
        #[arg(short, long, default_value = "25")]
        length: i32,

        /// Ordering tokens, e.g. "title asc" (repeatable)
        #[arg(long = "order-by")]
        order_by: Vec<String>,

        /// Field names to return (repeatable)
        #[arg(long)]
        select: Vec<String>,

        /// Lower bound on modified_on (epoch seconds, 0 = none)
        #[arg(long, default_value = "0")]
        from_date: i64,

        /// Upper bound on modified_on (epoch seconds, 0 = none)
        #[arg(long, default_value = "0")]
        to_date: i64,

        /// Print a table instead of the JSON envelope
        #[arg(long)]
        table: bool,
    },

    /// Article counts per label
    Stats,

    /// Soft-delete one article
    Delete {
        /// Article ID
        id: i64,

        #[arg(long, default_value = DEFAULT_ACTOR)]
        actor: String,
    },

    /// Soft-delete several articles with one set-based update
    Purge {
        /// Article IDs
        #[arg(required = true, num_args = 1..)]
        ids: Vec<i64>,

        #[arg(long, default_value = DEFAULT_ACTOR)]
        actor: String,
    },

    /// Undo a soft delete
    Restore {
        /// Article ID
        id: i64,
    },
}

/// Identity taken from `--user` / `STRATA_USER`
struct ConsoleUser(Option<String>);

impl CurrentUser for ConsoleUser {
    fn name(&self) -> Option<String> {
        self.0.clone()
    }
}

#[derive(Tabled)]
struct ArticleRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "Label")]
    label: String,
    #[tabled(rename = "Created By")]
    created_by: String,
    #[tabled(rename = "Modified On")]
    modified_on: String,
}

impl From<&Article> for ArticleRow {
    fn from(article: &Article) -> Self {
        Self {
            id: article.id,
            title: article.title.clone(),
            label: article
                .label_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "-".to_string()),
            created_by: article.audit.created_by.clone(),
            modified_on: article
                .audit
                .modified_on
                .map(|secs| secs.to_string())
                .unwrap_or_else(|| "-".to_string()),
        }
    }
}

fn init_logging() {
    let log_format = std::env::var("STRATA_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("strata=info"))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty().with_writer(std::io::stderr))
                .init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let mut config = StoreConfig::from_env();
    if let Some(url) = cli.database_url.clone() {
        config.database_url = url;
    }

    let pool = create_pool(&config)
        .await
        .with_context(|| format!("Failed to open database {}", config.database_url))?;
    run_migrations(&pool)
        .await
        .context("Failed to run migrations")?;

    let uow = UnitOfWork::new(SqliteStore::boxed(pool), catalog_registry())
        .with_current_user(Arc::new(ConsoleUser(cli.user.clone())));
    let cancel = CancellationToken::new();

    let outcome = run(&uow, cli.command, &cancel).await;
    uow.dispose().await.context("Failed to release the store")?;
    outcome
}

async fn run(uow: &UnitOfWork, command: Commands, cancel: &CancellationToken) -> Result<()> {
    match command {
        Commands::Migrate => {
            println!("{} Schema is up to date", "✓".green());
        }

        Commands::Seed { count, actor } => {
            let labels = uow.repo::<Label>()?;
            let existing = labels
                .get_single(
                    labels.query().filter(Label::NAME.eq(SEED_LABEL)),
                    ReadOptions::default(),
                )
                .await?;
            let label_id = match existing {
                Some(label) => label.id,
                None => {
                    let entry = labels.insert(Label::new(SEED_LABEL)).await?;
                    uow.save(&actor, cancel).await?;
                    entry.id()
                }
            };

            let articles = uow.repository::<ArticleRepository>()?;
            let batch = (1..=count)
                .map(|n| {
                    Article::new(format!("Article {}", n), Some(format!("Seeded body {}", n)))
                        .with_label(label_id)
                })
                .collect();
            articles.insert_many(batch).await?;
            let saved = uow.save(&actor, cancel).await?;

            info!(count = count, label_id = label_id, "Catalog seeded");
            println!("{} {} articles inserted", "✓".green(), saved);
        }

        Commands::List {
            page,
            length,
            order_by,
            select,
            from_date,
            to_date,
            table,
        } => {
            let request = FilterRequest::new(page, length)
                .order_by(order_by)
                .select(select)
                .between(from_date, to_date);
            let articles = uow.repository::<ArticleRepository>()?;

            match articles.filter_data(&request, None).await {
                Ok(filtered) if table => {
                    let rows: Vec<ArticleRow> = filtered
                        .rows
                        .iter()
                        .filter_map(|row| match row {
                            Row::Item(article) => Some(ArticleRow::from(article)),
                            Row::Projected(_) => None,
                        })
                        .collect();
                    if rows.is_empty() && !filtered.rows.is_empty() {
                        println!("{}", "Tables need full rows; drop --select".yellow());
                    } else if rows.is_empty() {
                        println!("{}", "No articles found".yellow());
                    } else {
                        println!("{}", Table::new(rows));
                    }
                    println!(
                        "  {} {} / page {} ({} per page){}",
                        "Total:".bold(),
                        filtered.total_count,
                        filtered.page,
                        filtered.length,
                        if filtered.has_next_page { ", more" } else { "" }
                    );
                }
                Ok(filtered) => {
                    let envelope = PaginatedResult::success(
                        filtered.rows,
                        filtered.total_count,
                        filtered.page,
                        filtered.length,
                        None,
                    );
                    println!("{}", serde_json::to_string_pretty(&envelope)?);
                }
                Err(e) => {
                    let window = request.window();
                    let envelope: PaginatedResult<Article> =
                        PaginatedResult::from_error(&e, window.page, window.length);
                    println!("{}", serde_json::to_string_pretty(&envelope)?);
                }
            }
        }

        Commands::Stats => {
            let articles = uow.repository::<ArticleRepository>()?;
            println!("{}", "Articles per label".cyan().bold());
            for (label_id, count) in articles.count_by_label().await? {
                let label = label_id
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "(none)".to_string());
                println!("  {} {}", format!("{}:", label).bold(), count);
            }
        }

        Commands::Delete { id, actor } => {
            let articles = uow.repository::<ArticleRepository>()?;
            let response: BaseResponse<()> = match articles.get(id).await? {
                Some(article) => {
                    articles.delete(article).await?;
                    match uow.save(&actor, cancel).await {
                        Ok(_) => BaseResponse::deleted(),
                        Err(e) => BaseResponse::from_error(&e),
                    }
                }
                None => BaseResponse::not_found(Some(format!("Article {} not found", id))),
            };
            println!("{}", serde_json::to_string_pretty(&response)?);
        }

        Commands::Purge { ids, actor } => {
            let affected = uow
                .soft_delete_range::<Article>(&ids, &actor, cancel)
                .await?;
            println!(
                "{} {} of {} articles soft-deleted",
                "✓".green(),
                affected,
                ids.len()
            );
        }

        Commands::Restore { id } => {
            let articles = uow.repository::<ArticleRepository>()?;
            let query = articles
                .query()
                .ignore_default_filters()
                .filter(Article::ID.eq(id))
                .filter(IS_DELETED.eq(true));
            let assignments = vec![
                IS_DELETED.set(false),
                DELETED_BY.set(Value::Null),
                DELETED_ON.set(Value::Null),
            ];
            let affected = articles.update_where(query, assignments, cancel).await?;
            if affected == 0 {
                println!("{} Article {} is not deleted", "○".yellow(), id);
            } else {
                println!("{} Article {} restored", "✓".green(), id);
            }
        }
    }

    Ok(())
}
