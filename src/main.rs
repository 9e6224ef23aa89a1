use anyhow::Result;
use chrono::Duration;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use adaptive_quiz::{
    api::{create_router, AppState},
    assembler::QuizAssembler,
    config::{Config, LoggingConfig},
    database::{BankCollection, Database, SqliteBankStore},
    generators::{GeneratorRegistry, LlmQuestionGenerator, QuestionGenerator},
    llm_providers::LLMProvider,
    log_system_event,
    mastery::{MasteryModel, MasteryParams},
    question_cache::ClassQuestionCache,
    quiz_service::QuizService,
    source_fetcher::SourceFetcher,
};

const LLM_GRADES: std::ops::RangeInclusive<u8> = 1..=12;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    let _guard = setup_logging(&config.logging)?;
    config.validate()?;

    log_system_event!(startup, component = "server", "Starting adaptive quiz server");

    let db = Database::new(&config.database.url).await?;
    info!("Database initialized successfully");

    let cache = ClassQuestionCache::new(
        config.assembly.class_cache_max_entries,
        Duration::seconds(config.assembly.class_cache_ttl_secs as i64),
    );
    spawn_cache_sweeper(cache.clone(), config.assembly.class_cache_ttl_secs);
    let fetcher = SourceFetcher::new(
        Arc::new(SqliteBankStore::new(db.clone(), BankCollection::Class)),
        Arc::new(SqliteBankStore::new(db.clone(), BankCollection::Personal)),
        Arc::new(SqliteBankStore::new(db.clone(), BankCollection::Shared)),
        cache,
    );

    let mut generators = GeneratorRegistry::with_builtin_generators();
    if let Some(llm) = &config.llm {
        let provider = LLMProvider::new(llm.provider, llm.api_key.clone(), llm.base_url.clone(), llm.model.clone());
        for topic in &llm.topics {
            for grade in LLM_GRADES {
                let generator: Arc<dyn QuestionGenerator> =
                    Arc::new(LlmQuestionGenerator::new(provider.clone(), topic, grade));
                generators.register_shared(grade, topic, generator);
            }
        }
        info!(
            provider = provider.provider_name(),
            model = provider.model_name(),
            topics = ?llm.topics,
            "Registered LLM question generators"
        );
    }
    info!(generator_count = generators.len(), "Generator registry populated");

    let mastery = MasteryModel::with_params(MasteryParams {
        target_step: config.assembly.target_step,
        target_window: config.assembly.target_window,
        ..MasteryParams::default()
    });

    let assembler = QuizAssembler::new(fetcher, generators, mastery);
    let store = Arc::new(db.clone());
    let quiz_service = QuizService::new(
        assembler,
        store.clone(),
        store,
        config.assembly.default_bank_probability,
    );

    let state = AppState { quiz_service, db };

    let app = create_router(state).layer(ServiceBuilder::new().layer(CorsLayer::permissive()));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    log_system_event!(shutdown, component = "server", "Server stopped");
    Ok(())
}

/// Drops expired class-cache entries once per TTL period.
fn spawn_cache_sweeper(cache: ClassQuestionCache, ttl_secs: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(ttl_secs.max(1)));
        loop {
            interval.tick().await;
            cache.cleanup().await;
            let stats = cache.stats().await;
            debug!(active_entries = stats.active_entries, "Class question cache swept");
        }
    });
}

fn setup_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    use std::fs;
    use tracing_subscriber::fmt;

    let env_filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info,adaptive_quiz=debug"));

    let console_layer = config.console_enabled.then(|| {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(true)
    });

    let mut guard = None;
    let file_layer = if config.file_enabled {
        fs::create_dir_all(&config.log_directory).unwrap_or_else(|e| {
            eprintln!("Warning: Could not create logs directory: {}", e);
        });

        // Set up file appender with daily rotation
        let file_appender = tracing_appender::rolling::daily(&config.log_directory, "adaptive-quiz.log");
        let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);
        guard = Some(file_guard);

        Some(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_ansi(false)
                .with_writer(non_blocking_file),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!(
        log_directory = %config.log_directory,
        file_enabled = config.file_enabled,
        console_enabled = config.console_enabled,
        "Logging initialized"
    );

    Ok(guard)
}
