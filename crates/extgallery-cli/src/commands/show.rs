//! Show command - display extension details

use extgallery_client::{GalleryClient, GetExtensionsOptions};
use tokio_util::sync::CancellationToken;

use super::{QUERY_SOURCE, parse_extension, target_platform};
use crate::display::print_extension_details;
use crate::error::{CliError, Result};

pub struct ShowOptions<'a> {
    pub pre_release: bool,
    pub platform: Option<&'a str>,
    pub compatible: bool,
    pub readme: bool,
    pub changelog: bool,
    pub json: bool,
}

/// Show one extension
pub async fn run(
    client: &GalleryClient,
    reference: &str,
    options: ShowOptions<'_>,
    token: &CancellationToken,
) -> Result<()> {
    let info = parse_extension(reference)?.with_pre_release(options.pre_release);
    let query_options = GetExtensionsOptions {
        compatible: options.compatible,
        target_platform: Some(target_platform(options.platform)),
        source: Some(QUERY_SOURCE.to_string()),
        ..Default::default()
    };

    let extension = client
        .get_extension(&info, &query_options, token)
        .await?
        .ok_or_else(|| {
            CliError::not_found(
                format!("Extension '{}' not found", reference),
                "Check the id, or retry with --pre-release",
            )
        })?;

    if options.json {
        println!("{}", serde_json::to_string_pretty(&extension)?);
        return Ok(());
    }

    print_extension_details(&extension);

    if options.readme {
        let readme = client.get_readme(&extension, token).await?;
        println!();
        if readme.is_empty() {
            println!("No readme published");
        } else {
            println!("{}", readme);
        }
    }

    if options.changelog {
        let changelog = client.get_changelog(&extension, token).await?;
        println!();
        if changelog.is_empty() {
            println!("No changelog published");
        } else {
            println!("{}", changelog);
        }
    }

    Ok(())
}
