#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    masterclass_site::run().await
}
