use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use rust_blog_storage::infrastructure::storage;
use rust_blog_storage::models::UploadRequest;
use rust_blog_storage::services::progress::TracingPublisher;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Issue a write credential and print the upload target
    Target {
        /// Client-side file name
        filename: String,

        /// Object path (generated under the default prefix when omitted)
        #[arg(short, long)]
        path: Option<String>,
    },

    /// Upload a local file
    Upload {
        file: PathBuf,

        #[arg(short, long)]
        path: Option<String>,

        #[arg(short, long)]
        content_type: Option<String>,

        /// Stage the file and log progress events while reading it
        #[arg(long)]
        progress: bool,

        /// User whose progress topic receives the events
        #[arg(short, long, default_value = "cli")]
        user: String,
    },

    /// Delete one object
    Delete { path: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rust_blog_storage=info,upload_progress=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting Rust Blog Storage...");
    let gateway = storage::setup_gateway()?;

    match args.command {
        Command::Target { filename, path } => {
            let target = gateway
                .issue_upload_target(path.as_deref(), &filename)
                .await?;
            println!("{}", serde_json::to_string_pretty(&target)?);
        }
        Command::Upload {
            file,
            path,
            content_type,
            progress,
            user,
        } => {
            let filename = file
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .context("upload source has no file name")?;
            let mut request = UploadRequest::new(filename.clone());
            if let Some(path) = path {
                request = request.with_path(path);
            }
            if let Some(content_type) = content_type {
                request = request.with_content_type(content_type);
            }

            let result = if progress {
                let source = tokio::fs::File::open(&file)
                    .await
                    .with_context(|| format!("opening {}", file.display()))?;
                let mut reporter = gateway
                    .start_progress(Arc::new(TracingPublisher), &filename, &user)
                    .await;
                gateway
                    .upload_with_progress(source, request, &mut reporter)
                    .await?
            } else {
                let data = tokio::fs::read(&file)
                    .await
                    .with_context(|| format!("reading {}", file.display()))?;
                gateway.upload(data, request).await?
            };

            info!("✅ Uploaded {} -> {}", result.path, result.url);
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Delete { path } => {
            let outcome = gateway.delete(&path).await?;
            if outcome.is_clean() {
                info!("🗑️  Delete of {} completed", path);
            } else {
                warn!(
                    "⚠️  Delete of {} completed with {} per-object error(s)",
                    path,
                    outcome.errors.len()
                );
            }
        }
    }

    Ok(())
}
