use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    posture_monitor_lib::run(posture_monitor_lib::Cli::parse()).await
}
