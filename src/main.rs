#[tokio::main]
async fn main() -> anyhow::Result<()> {
    wastewatch_lib::run().await
}
