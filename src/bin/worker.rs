#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = examforge_rust::run_worker().await {
        eprintln!("examforge-worker fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
