//! Download command - fetch an extension package

use console::style;
use extgallery_client::{GalleryClient, GetExtensionsOptions, InstallOperation};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

use super::{QUERY_SOURCE, parse_extension, target_platform};
use crate::display::spinner;
use crate::error::{CliError, Result};

pub struct DownloadOptions<'a> {
    pub pre_release: bool,
    pub platform: Option<&'a str>,
    pub output: Option<&'a Path>,
    pub signature: bool,
    pub update: bool,
}

/// Resolve the newest compatible version and save its package
pub async fn run(
    client: &GalleryClient,
    reference: &str,
    options: DownloadOptions<'_>,
    token: &CancellationToken,
) -> Result<()> {
    let info = parse_extension(reference)?.with_pre_release(options.pre_release);
    let query_options = GetExtensionsOptions {
        compatible: true,
        target_platform: Some(target_platform(options.platform)),
        source: Some(QUERY_SOURCE.to_string()),
        ..Default::default()
    };

    let extension = client
        .get_extension(&info, &query_options, token)
        .await?
        .ok_or_else(|| {
            CliError::not_found(
                format!("No compatible version of '{}'", reference),
                "Try --pre-release, or another --platform",
            )
        })?;

    let destination = options.output.map(Path::to_path_buf).unwrap_or_else(|| {
        PathBuf::from(format!(
            "{}-{}.vsix",
            extension.identifier.id, extension.version
        ))
    });
    let operation = if options.update {
        InstallOperation::Update
    } else {
        InstallOperation::Install
    };

    let progress = spinner(format!(
        "Downloading {}@{}",
        extension.identifier.id, extension.version
    ));
    let downloaded = client
        .download(&extension, &destination, operation, token)
        .await;
    progress.finish_and_clear();
    let written = downloaded?;

    println!(
        "{} {}@{} ({} bytes) to {}",
        style("Saved").green().bold(),
        extension.identifier.id,
        extension.version,
        written,
        destination.display()
    );

    if options.signature {
        if extension.assets.signature.is_none() {
            println!("No signature published for this version");
            return Ok(());
        }
        let signature_path = destination.with_extension("sigzip");
        client
            .download_signature_archive(&extension, &signature_path, token)
            .await?;
        println!("Signature saved to {}", signature_path.display());
    }

    Ok(())
}
