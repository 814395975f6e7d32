// Seguimiento — Entry Point

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    seguimiento_lib::run().await
}
