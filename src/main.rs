use anyhow::Context;
use webui_config_store::{AppContext, Settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    let settings = Settings::from_env().context("invalid settings")?;

    let ctx = AppContext::init(settings)
        .await
        .context("failed to initialize the configuration store")?;

    let config = ctx.config();
    let rendered = serde_json::to_string_pretty(&*config)?;
    println!("{}", rendered);
    Ok(())
}
