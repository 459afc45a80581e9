//! Transfer command - download an Intel-HEX image

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use uds_client::uds::DataFormatIdentifier;
use uds_client::UdsClient;

use crate::output::{OutputContext, TransferRow};

/// Flash `file_path` with RequestDownload / TransferData / RequestTransferExit
pub async fn transfer(
    client: &UdsClient,
    file_path: &Path,
    chunk_size: Option<usize>,
    compression: u8,
    encryption: u8,
    ctx: &OutputContext,
) -> Result<()> {
    ctx.info(&format!("Transferring {}...", file_path.display()));

    let pb = if ctx.quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new_spinner()
    };
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg} [{elapsed}]")
            .context("Invalid progress template")?,
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message("Downloading...");

    let result = client
        .transfer_file(
            Some(file_path),
            chunk_size,
            Some(DataFormatIdentifier::new(compression, encryption)),
        )
        .await;

    let record = match result {
        Ok(record) => {
            pb.finish_with_message("Transfer complete");
            record
        }
        Err(e) => {
            pb.finish_with_message("Transfer failed!");
            return Err(anyhow::Error::new(e).context("Transfer failed"));
        }
    };

    if let Some(image) = client.ihex_file() {
        ctx.print_one(&TransferRow {
            file: file_path.display().to_string(),
            address: format!("0x{:08X}", image.transmit_address()),
            length: image.transmit_length(),
            chunk_size: image.transmit_chunk_size(),
            exit_record: hex::encode_upper(&record),
        });
    }
    ctx.success("Transfer finished");
    Ok(())
}
