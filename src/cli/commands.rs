use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::app::{AppContext, Result};
use crate::domain::User;
use crate::server;
use crate::worker::Worker;

/// Runs the worker and the HTTP server until Ctrl-C.
pub async fn serve(ctx: Arc<AppContext>) -> Result<()> {
    let worker = Arc::new(Worker::new(ctx.clone()));
    let running = worker.clone();
    let handle = tokio::spawn(async move { running.run().await });

    let address = ctx.config.listen_address.clone();
    let result = server::serve(ctx, &address, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
        }
    })
    .await;

    worker.stop();
    if let Err(e) = handle.await {
        tracing::error!("Worker task failed: {}", e);
    }
    result
}

pub async fn refresh(ctx: &AppContext) -> Result<()> {
    let report = ctx.parallel_fetcher.refresh(ctx.store_handle()).await?;
    println!(
        "Refresh complete: {} succeeded, {} failed, {} pages changed",
        report.succeeded, report.failed, report.changed_pages
    );
    Ok(())
}

pub fn gc(ctx: &AppContext) -> Result<()> {
    let report = ctx.store.gc()?;
    println!(
        "GC complete: {} expired items, {} stale fetch statuses, {} stale read statuses",
        report.expired_items, report.stale_fetch_statuses, report.stale_read_statuses
    );
    Ok(())
}

pub fn backup(ctx: &AppContext, output: Option<&Path>) -> Result<()> {
    let json = ctx.store.backup_json()?;
    match output {
        Some(path) => {
            fs::write(path, json)?;
            eprintln!("Backup written to {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

pub fn restore(ctx: &AppContext, path: &Path) -> Result<()> {
    ctx.store.restore_json(&fs::read_to_string(path)?)?;
    println!("Restored {}", path.display());
    Ok(())
}

pub fn set_password(ctx: &AppContext, username: &str, password: &str) -> Result<()> {
    let mut user = match ctx.store.get_user(username)? {
        Some(user) => user,
        None => {
            println!("Creating user {}", username.trim());
            User::new(username)?
        }
    };
    user.set_password(password)?;
    ctx.store.save_user(&mut user)?;
    println!("Password set for {}", user.username);
    Ok(())
}
