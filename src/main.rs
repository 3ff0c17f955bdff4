use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser, Subcommand, ValueHint};
use futures::StreamExt;
use iocraft::prelude::*;
use slug::slugify;
use std::{
    io::{self, Write},
    path::PathBuf,
    time::{Duration, SystemTime},
};
use tokio::sync::watch;
use uplift::{
    DEFAULT_CHUNK_SIZE, PresignRequest, S3Signer, UploadClient, UploadEvent, UploadSource,
};
use url::Url;

mod config;
mod ui;

#[derive(Parser)]
#[command(name = "uplift")]
#[command(version)]
#[command(about = "Upload files directly to S3-compatible storage with presigned URLs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure uplift interactively
    Config,
    /// Store the S3 secret access key in the OS keyring
    SetSecretKey { secret_key: String },
    /// Upload one or more files
    Upload {
        #[arg(value_hint = ValueHint::AnyPath, num_args = 1..)]
        files: Vec<PathBuf>,
        /// Destination object key (single file only; defaults to a slug of the file name)
        #[arg(short, long)]
        key: Option<String>,
        /// Override the detected content type
        #[arg(short = 't', long)]
        content_type: Option<String>,
        /// Part size for multipart uploads, in bytes
        #[arg(long)]
        chunk_size: Option<u64>,
        /// Upload small files through a presigned POST form instead of a presigned PUT
        #[arg(long)]
        post: bool,
    },
    /// Mint a presigned URL without uploading anything
    Presign {
        #[command(subcommand)]
        mode: PresignMode,
    },
}

#[derive(Subcommand)]
enum PresignMode {
    /// Presigned PUT URL for a single-shot upload
    Put {
        key: String,
        #[arg(short = 't', long)]
        content_type: String,
        /// Declared file size in bytes, checked against the policy maximum
        #[arg(short, long)]
        size: Option<u64>,
        /// Validity window, e.g. "5m" or "300s"
        #[arg(short, long, value_parser = humantime::parse_duration)]
        expires: Option<Duration>,
    },
    /// Presigned POST URL and form fields
    Post {
        key: String,
        #[arg(short = 't', long)]
        content_type: String,
        /// Declared file size in bytes
        #[arg(short, long)]
        size: u64,
        /// Validity window, e.g. "5m" or "300s"
        #[arg(short, long, value_parser = humantime::parse_duration)]
        expires: Option<Duration>,
    },
}

fn main() -> Result<()> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap();
    let _rt_guard = rt.enter();
    clap_complete::CompleteEnv::with_factory(Cli::command).complete();
    let cli = Cli::parse();

    rt.block_on(async {
        match cli.command {
            Commands::Config => interactive_config(),
            Commands::SetSecretKey { secret_key } => config::set_secret_key_keyring(secret_key),
            requires_policy => {
                let policy = config::read_config()?;
                let signer = S3Signer::new(&policy)?;
                let client = UploadClient::new();

                match requires_policy {
                    Commands::Upload {
                        files,
                        key,
                        content_type,
                        chunk_size,
                        post,
                    } => {
                        upload_files(
                            &client,
                            &signer,
                            files,
                            key,
                            content_type,
                            chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE),
                            post,
                        )
                        .await
                    }
                    Commands::Presign { mode } => presign(&signer, mode).await,
                    Commands::Config => panic!("This state should be unreachable"),
                    Commands::SetSecretKey { secret_key: _ } => {
                        panic!("This state should be unreachable")
                    }
                }
            }
        }
    })
}

/// Object keys default to a slug of the file name plus a timestamp, so
/// repeated uploads of the same file do not overwrite each other.
fn default_key(name: &str) -> String {
    let now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .expect("SystemTime before UNIX EPOCH");

    match name.rsplit_once('.') {
        Some((stem, extension)) => {
            format!("{}-{}.{}", slugify(stem), now.as_secs(), extension.to_ascii_lowercase())
        }
        None => format!("{}-{}", slugify(name), now.as_secs()),
    }
}

async fn upload_files(
    client: &UploadClient,
    signer: &S3Signer,
    files: Vec<PathBuf>,
    key_override: Option<String>,
    content_type: Option<String>,
    chunk_size: u64,
    post: bool,
) -> Result<()> {
    if files.len() > 1 && key_override.is_some() {
        bail!("--key can only be used when uploading a single file");
    }

    let mut uploaded: Vec<String> = Vec::new();

    for path in &files {
        let mut source = UploadSource::from_path(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if let Some(content_type) = &content_type {
            source = source.with_content_type(content_type.clone());
        }
        let key = key_override
            .clone()
            .unwrap_or_else(|| default_key(&source.name));

        let outcome = if source.size > chunk_size {
            upload_multipart_file(client, signer, &source, &key, chunk_size).await
        } else {
            upload_single_shot(client, signer, &source, &key, post).await
        };

        if let Err(err) = outcome {
            element!(ui::ErrorMessage(message: err.to_string())).print();
            return Err(err);
        }

        uploaded.push(source.name.clone());
    }

    element!(ui::SuccessMessage(
        message: format!("Uploaded {} file(s): {}", uploaded.len(), uploaded.join(", "))
    ))
    .print();

    Ok(())
}

async fn upload_single_shot(
    client: &UploadClient,
    signer: &S3Signer,
    source: &UploadSource,
    key: &str,
    post: bool,
) -> Result<()> {
    let request = PresignRequest {
        filename: key.to_string(),
        content_type: source.content_type.clone(),
        size: Some(source.size),
    };

    if post {
        let presigned = signer.presign_post(&request).await?;
        client.post_file(source, &presigned).await?;
    } else {
        let url = signer.presign_put(&request).await?;
        client.put_file(source, &url, None).await?;
    }

    Ok(())
}

async fn upload_multipart_file(
    client: &UploadClient,
    signer: &S3Signer,
    source: &UploadSource,
    key: &str,
    chunk_size: u64,
) -> Result<()> {
    let part_signer = signer.multipart_signer(key, &source.content_type, source.size)?;
    let mut stream = client.multipart_upload(source, &part_signer, chunk_size)?;

    let (tx, rx) = watch::channel(ui::UploadState::default());

    let process_stream = async {
        let mut completed = None;
        while let Some(event) = stream.next().await {
            match event? {
                UploadEvent::Progress(progress) => {
                    let percent =
                        (progress.bytes_uploaded as f32 / progress.total_bytes as f32) * 100.0;
                    let _ = tx.send(ui::UploadState {
                        uploading: true,
                        progress: percent,
                    });
                }
                UploadEvent::Completed(parts) => {
                    let _ = tx.send(ui::UploadState {
                        uploading: false,
                        progress: 100.0,
                    });
                    completed = Some(parts);
                    break;
                }
            }
        }
        Ok::<_, anyhow::Error>(completed.expect("Stream ended without a completion event"))
    };

    let mut progress_bar = element!(ui::ProgressBar(
        title: format!("Uploading {}", source.name),
        progress: Some(rx)
    ));

    let parts = tokio::select! {
        result = process_stream => result?,
        _ = progress_bar.render_loop() => {
            unreachable!("render_loop should not terminate")
        }
    };

    println!("Uploaded {} as {} in {} part(s)", source.name, key, parts.len());

    Ok(())
}

async fn presign(signer: &S3Signer, mode: PresignMode) -> Result<()> {
    match mode {
        PresignMode::Put {
            key,
            content_type,
            size,
            expires,
        } => {
            let signer = match expires {
                Some(expires) => signer.clone().with_expires_in(expires.as_secs() as u32),
                None => signer.clone(),
            };
            let url = signer
                .presign_put(&PresignRequest {
                    filename: key,
                    content_type,
                    size,
                })
                .await?;
            println!("{url}");
        }
        PresignMode::Post {
            key,
            content_type,
            size,
            expires,
        } => {
            let signer = match expires {
                Some(expires) => signer.clone().with_expires_in(expires.as_secs() as u32),
                None => signer.clone(),
            };
            let post = signer
                .presign_post(&PresignRequest {
                    filename: key,
                    content_type,
                    size: Some(size),
                })
                .await?;
            println!("{}", serde_json::to_string_pretty(&post)?);
        }
    }

    Ok(())
}

fn read_input(prompt: &str, default: Option<&str>, description: Option<&str>) -> Result<String> {
    element! {
        ui::InputPrompt(
            prompt: prompt.to_string(),
            default: default.map(|s| s.to_string()),
            description: description.map(|s| s.to_string())
        )
    }
    .print();

    print!("> ");
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let input = input.trim().to_string();

    if input.is_empty() {
        if let Some(def) = default {
            Ok(def.to_string())
        } else {
            Ok(input)
        }
    } else {
        Ok(input)
    }
}

fn interactive_config() -> Result<()> {
    element!(ui::ConfigHeader()).print();

    let endpoint = loop {
        let endpoint_str = read_input(
            "S3 endpoint URL",
            None,
            Some("The HTTPS endpoint of your S3-compatible store"),
        )?;

        match Url::parse(&endpoint_str) {
            Ok(url) => break url,
            Err(e) => {
                element!(ui::ErrorMessage(message: format!("Invalid URL: {}", e))).print();
                println!();
            }
        }
    };

    let bucket = loop {
        let bucket = read_input("Bucket", None, Some("The destination bucket for uploads"))?;
        if bucket.is_empty() {
            element!(ui::ErrorMessage(message: "Bucket cannot be empty".to_string())).print();
            println!();
        } else {
            break bucket;
        }
    };

    let region = read_input("Region", Some("us-east-1"), None)?;

    let access_key = loop {
        let access_key = read_input("Access key ID", None, None)?;
        if access_key.is_empty() {
            element!(ui::ErrorMessage(message: "Access key cannot be empty".to_string())).print();
            println!();
        } else {
            break access_key;
        }
    };

    let secret_key = loop {
        let secret_key = read_input(
            "Secret access key",
            None,
            Some("Stored securely in the OS keyring"),
        )?;
        if secret_key.is_empty() {
            element!(ui::ErrorMessage(message: "Secret key cannot be empty".to_string())).print();
            println!();
        } else {
            break secret_key;
        }
    };

    let max_file_size = read_input(
        "Max file size (bytes)",
        None,
        Some("Optional: reject uploads declared larger than this"),
    )?;

    let allowed_types = read_input(
        "Allowed content types",
        None,
        Some("Optional: comma-separated allow-list, e.g. image/png,image/jpeg"),
    )?;

    config::set_secret_key_keyring(secret_key)?;

    let config_file = config::ConfigFile {
        bucket: Some(bucket),
        region: Some(region),
        endpoint: Some(endpoint),
        access_key: Some(access_key),
        max_file_size: if max_file_size.is_empty() {
            None
        } else {
            Some(
                max_file_size
                    .parse()
                    .context("Max file size must be a number of bytes")?,
            )
        },
        allowed_types: if allowed_types.is_empty() {
            None
        } else {
            Some(
                allowed_types
                    .split(',')
                    .map(|t| t.trim().to_string())
                    .collect(),
            )
        },
        expires_in_seconds: None,
    };

    config::write_config(config_file)?;

    element!(ui::SuccessMessage(message: "Configuration complete!".to_string())).print();

    Ok(())
}
