use std::sync::Arc;

use studypick::{
    config::Config,
    db::SqliteStore,
    models::{LearningLog, Level, Topic},
    services::{
        sources::{
            bilibili::BilibiliSource, ddg_videos::DdgVideosSource, ddg_web::DdgWebSource,
            kan360::Kan360Source, sogou::SogouSource, VideoSource,
        },
        CandidateAggregator, ChatCompletionsClient, Recommender,
    },
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "studypick=info".into()),
        )
        .init();

    let config = Config::from_env()?;

    let mut args = std::env::args().skip(1);
    let Some(title) = args.next() else {
        eprintln!("usage: studypick <topic> [level] [last-feedback]");
        std::process::exit(2);
    };
    let level = args
        .next()
        .and_then(|s| Level::parse(&s))
        .unwrap_or(Level::Beginner);
    let last_log = args.next().map(|feedback| LearningLog {
        feedback,
        created_at: chrono::Utc::now(),
    });

    let topic = Topic {
        title,
        level,
        description: String::new(),
    };

    let store = Arc::new(SqliteStore::connect(&config.database_path).await?);

    // Priority order: most structured providers first.
    let sources: Vec<Arc<dyn VideoSource>> = vec![
        Arc::new(BilibiliSource::new()),
        Arc::new(DdgVideosSource::new()),
        Arc::new(SogouSource::new()),
        Arc::new(Kan360Source::new()),
        Arc::new(DdgWebSource::new()),
    ];
    let aggregator = CandidateAggregator::new(
        sources,
        studypick::services::aggregator::DEFAULT_THRESHOLD,
    );
    let oracle = Arc::new(ChatCompletionsClient::from_config(&config));

    let recommender = Recommender::new(store, aggregator, oracle);

    match recommender.recommend(&topic, last_log.as_ref()).await {
        Some(rec) => {
            println!("标题: {}", rec.title);
            println!("链接: {}", rec.url);
            if let Some(duration) = &rec.duration {
                println!("时长: {}", duration);
            }
            println!("理由: {}", rec.reason);
        }
        None => {
            println!("没有找到合适的推荐。");
        }
    }

    Ok(())
}
