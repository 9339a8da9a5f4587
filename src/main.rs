use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use linkstore::config::Settings;
use linkstore::dispatch::Dispatcher;
use linkstore::server;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // an optional config file may be given as the first argument
    let settings = Settings::load(std::env::args().nth(1).as_deref())?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let address = settings.listen_address();
    info!(
        database = settings.database.as_deref().unwrap_or(":memory:"),
        vhosts = settings.vhosts,
        stream = settings.stream,
        "starting linkstore"
    );
    let dispatcher = Arc::new(Dispatcher::new(settings)?);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!(%address, "listening");
    axum::serve(listener, server::router(dispatcher)).await?;
    Ok(())
}
