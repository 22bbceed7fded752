use tracing_subscriber::EnvFilter;
use xcion::{app_state::AppState, config::Config, data_seeder::seed_sample_data};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    println!("🚀 Generating sample data into {}", config.database.url);
    config.prepare_local_dirs()?;

    let state = AppState::new(config).await?;
    let summary = seed_sample_data(&state).await?;

    println!("✅ Sample data generated");
    println!("   users:     {}", summary.users);
    println!("   posts:     {}", summary.posts);
    println!("   replies:   {}", summary.replies);
    println!("   likes:     {}", summary.likes);
    println!("   follows:   {}", summary.follows);
    println!("   bookmarks: {}", summary.bookmarks);
    println!("🔑 Every account signs in with password '{}'", xcion::data_seeder::SAMPLE_PASSWORD);

    Ok(())
}
