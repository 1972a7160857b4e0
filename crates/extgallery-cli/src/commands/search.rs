//! Search command

use extgallery_client::{GalleryClient, SearchOptions};
use extgallery_core::SortBy;
use tokio_util::sync::CancellationToken;

use super::QUERY_SOURCE;
use crate::display::print_extension_table;
use crate::error::{CliError, Result};

/// Search the gallery and print one page of results
#[allow(clippy::too_many_arguments)]
pub async fn run(
    client: &GalleryClient,
    text: &[String],
    page: u32,
    page_size: u32,
    sort_by: Option<SortBy>,
    pre_release: bool,
    json_output: bool,
    token: &CancellationToken,
) -> Result<()> {
    if page == 0 || page_size == 0 {
        return Err(CliError::input("--page and --page-size start at 1"));
    }

    let options = SearchOptions {
        text: (!text.is_empty()).then(|| text.join(" ")),
        page_size,
        sort_by,
        source: Some(QUERY_SOURCE.to_string()),
        include_pre_release: pre_release,
        ..Default::default()
    };
    let pager = client.search(&options, token).await?;

    let extensions = if page == 1 {
        pager.first_page().to_vec()
    } else {
        pager.get_page(page - 1, token).await?
    };

    if json_output {
        let json = serde_json::json!({
            "total": pager.total(),
            "page": page,
            "pageCount": pager.page_count(),
            "extensions": extensions,
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }

    if extensions.is_empty() {
        println!("No extensions found");
        return Ok(());
    }

    print_extension_table(&extensions);
    println!();
    println!(
        "Page {} of {} ({} results)",
        page,
        pager.page_count().max(1),
        pager.total()
    );

    Ok(())
}
