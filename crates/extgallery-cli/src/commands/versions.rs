//! Versions command

use extgallery_client::GalleryClient;
use tokio_util::sync::CancellationToken;

use super::{parse_extension, target_platform};
use crate::display::print_versions;
use crate::error::{CliError, Result};

/// List the compatible versions of an extension, newest first
pub async fn run(
    client: &GalleryClient,
    reference: &str,
    pre_release: bool,
    platform: Option<&str>,
    json_output: bool,
    token: &CancellationToken,
) -> Result<()> {
    let info = parse_extension(reference)?;
    if info.version.is_some() {
        return Err(CliError::input_with_help(
            format!("'{}' names a single version", reference),
            "Pass the extension id without @version",
        ));
    }

    let versions = client
        .get_all_compatible_versions(
            &info.identifier(),
            pre_release,
            &target_platform(platform),
            token,
        )
        .await?;

    if versions.is_empty() {
        return Err(CliError::not_found(
            format!("No compatible versions of '{}'", reference),
            "The extension may not exist, or may not support this platform",
        ));
    }

    if json_output {
        println!("{}", serde_json::to_string_pretty(&versions)?);
    } else {
        print_versions(&versions);
    }

    Ok(())
}
