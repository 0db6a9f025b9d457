#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = essay_grader::run().await {
        eprintln!("essay-grader fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
