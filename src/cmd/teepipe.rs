use teepipe::cli;

#[tokio::main]
async fn main() {
    if let Err(e) = cli::init_tracing() {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = cli::run().await {
        tracing::error!("{:#}", e);
        std::process::exit(1);
    }
}
