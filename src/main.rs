use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use bytes::Bytes;
use hoist::{Config, FileCandidate, HttpStorageGateway, HttpTransferEngine, SessionEvent, UploadSession};

fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hoist=debug".into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let file_path = PathBuf::from(args.next().context("usage: hoist <file> [config.toml]")?);
    let config_path = PathBuf::from(args.next().unwrap_or_else(|| "config.toml".to_string()));

    let config = Config::load(&config_path)?;

    let mut gateway = HttpStorageGateway::new(
        &config.client.upload_endpoint,
        &config.client.delete_endpoint,
    );
    if let Some(token) = &config.client.auth_token {
        gateway = gateway.with_auth_token(token);
    }

    let session = UploadSession::new(
        Arc::new(gateway),
        Arc::new(HttpTransferEngine::new()),
        config.accept.clone(),
    );

    let mut events = session.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                SessionEvent::Progress { percent } => println!("progress: {percent}%"),
                SessionEvent::Uploaded { key } => println!("uploaded as {key}"),
                SessionEvent::Failed { error, .. } => eprintln!("failed: {error}"),
                _ => {}
            }
        }
    });

    let file_name = file_path
        .file_name()
        .and_then(|name| name.to_str())
        .context("file path has no usable file name")?
        .to_string();
    let content_type = content_type_for(&file_path);
    let bytes = tokio::fs::read(&file_path)
        .await
        .with_context(|| format!("failed to read {}", file_path.display()))?;

    session
        .select_file(FileCandidate::new(file_name, content_type, Bytes::from(bytes)))
        .await?;

    let snapshot = session.snapshot();
    println!("phase: {:?}, key: {:?}", snapshot.phase, snapshot.key);

    Ok(())
}
