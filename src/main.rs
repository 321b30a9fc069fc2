use loki_relay::app;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    app::main().await
}
