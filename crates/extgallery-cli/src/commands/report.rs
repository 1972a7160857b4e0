//! Report command - install statistics

use extgallery_client::{GalleryClient, StatisticType};

use super::parse_extension;
use crate::error::{CliError, Result};

pub async fn run(client: &GalleryClient, reference: &str, uninstall: bool) -> Result<()> {
    let info = parse_extension(reference)?;
    let identifier = info.identifier();
    let (Some((publisher, name)), Some(version)) =
        (identifier.publisher_and_name(), info.version.as_deref())
    else {
        return Err(CliError::input_with_help(
            format!("'{}' has no version", reference),
            "Use publisher.name@version",
        ));
    };

    let statistic = if uninstall {
        StatisticType::Uninstall
    } else {
        StatisticType::Install
    };
    client
        .report_statistic(publisher, name, version, statistic)
        .await;

    println!("Queued {} report for {}", statistic, reference);
    Ok(())
}
