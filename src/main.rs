use course_progress_engine::{app_state::AppState, config::Config};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = Config::from_env();
    config.validate()?;

    let state = AppState::new(config).await?;
    state.db.health_check().await?;

    log::info!(
        "Course progress engine ready on database '{}' (timeout {}ms, {} conflict retries)",
        state.db.db_name(),
        state.config.operation_timeout_ms,
        state.config.max_conflict_retries
    );

    let statistics = state.progress_service.certification_statistics().await?;
    log::info!(
        "Certifications: {} total, {} pending, {} issued, {} revoked",
        statistics.total,
        statistics.pending,
        statistics.issued,
        statistics.revoked
    );

    Ok(())
}
