#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().init();
    let config = trackit_server::config::Config::from_env()?;
    trackit_server::web::start_web_server(config).await
}
