use salonbook::{
    config::AppConfig,
    db, providers,
    users::{services, Role},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter =
        std::env::var("RUST_LOG").unwrap_or_else(|_| "salonbook=debug,sqlx=warn".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let config = AppConfig::from_env()?;
    let pool = db::connect(&config).await?;
    db::migrate(&pool).await?;
    tracing::info!("schema up to date");

    let state = AppState::init(config, pool).await?;
    providers::seed_defaults(&state).await?;

    for role in [Role::User, Role::Client, Role::Stylist] {
        let count = services::count_by_role(&state, role).await?;
        tracing::info!(%role, count, "users");
    }

    Ok(())
}
