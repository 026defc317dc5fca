#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = examforge_rust::run().await {
        eprintln!("examforge-rust fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
