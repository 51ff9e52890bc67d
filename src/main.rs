use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use nanorss::app::AppContext;
use nanorss::cli::{commands, Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let ctx = Arc::new(AppContext::load(cli.config.as_deref())?);

    let result = match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => commands::serve(ctx.clone()).await,
        Commands::Refresh => commands::refresh(&ctx).await,
        Commands::Gc => commands::gc(&ctx),
        Commands::Backup { output } => commands::backup(&ctx, output.as_deref()),
        Commands::Restore { file } => commands::restore(&ctx, &file),
        Commands::SetPassword { username, password } => {
            commands::set_password(&ctx, &username, &password)
        }
    };

    let closed = ctx.store.close();
    result?;
    closed?;
    Ok(())
}
