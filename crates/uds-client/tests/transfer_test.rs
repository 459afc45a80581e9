//! Flash download against the mock transport

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use uds_client::config::{MockConfig, TransferConfig};
use uds_client::transport::MockTransportAdapter;
use uds_client::uds::DataFormatIdentifier;
use uds_client::{
    NegativeResponseCode, TransactionEngine, TransferError, UdsClient, UdsError,
};

// =============================================================================
// Helpers
// =============================================================================

fn record(address: u16, kind: u8, data: &[u8]) -> String {
    let mut bytes = vec![data.len() as u8, (address >> 8) as u8, address as u8, kind];
    bytes.extend_from_slice(data);
    let checksum = bytes
        .iter()
        .fold(0u8, |acc, b| acc.wrapping_add(*b))
        .wrapping_neg();
    bytes.push(checksum);
    format!(":{}\n", hex::encode_upper(bytes))
}

/// Intel-HEX text for `data` at `address`, 16 bytes per record
fn intel_hex(address: u32, data: &[u8]) -> String {
    let mut text = record(0, 0x04, &((address >> 16) as u16).to_be_bytes());
    for (i, chunk) in data.chunks(16).enumerate() {
        text.push_str(&record((address as u16).wrapping_add(i as u16 * 16), 0x00, chunk));
    }
    text.push_str(&record(0, 0x01, &[]));
    text
}

fn write_image(dir: &Path, name: &str, address: u32, data: &[u8]) -> std::path::PathBuf {
    let path = dir.join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(intel_hex(address, data).as_bytes()).unwrap();
    path
}

fn client() -> (UdsClient, Arc<MockTransportAdapter>) {
    let mock = Arc::new(MockTransportAdapter::new(&MockConfig::default()));
    let engine = Arc::new(TransactionEngine::new(mock.clone()));
    (UdsClient::new(engine), mock)
}

fn sent(mock: &MockTransportAdapter) -> Vec<Vec<u8>> {
    mock.sent().into_iter().map(|m| m.data).collect()
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn test_download_triad_request_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let data: Vec<u8> = (0u8..10).collect();
    let path = write_image(dir.path(), "app.hex", 0x0800_0000, &data);
    let (client, mock) = client();

    client
        .transfer_file(Some(&path), Some(4), None)
        .await
        .unwrap();

    assert_eq!(
        sent(&mock),
        vec![
            vec![0x34, 0x00, 0x44, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x0A],
            vec![0x36, 0x01, 0x00, 0x01, 0x02, 0x03],
            vec![0x36, 0x02, 0x04, 0x05, 0x06, 0x07],
            vec![0x36, 0x03, 0x08, 0x09],
            vec![0x37],
        ]
    );
    assert_eq!(client.ihex_file().unwrap().transmit_chunk_size(), 4);
}

#[tokio::test]
async fn test_block_counter_wraps_to_zero() {
    let dir = tempfile::tempdir().unwrap();
    let data = vec![0x5A; 300];
    let path = write_image(dir.path(), "big.ihex", 0x0001_0000, &data);
    let (client, mock) = client();

    client
        .transfer_file(Some(&path), Some(1), None)
        .await
        .unwrap();

    let counters: Vec<u8> = sent(&mock)
        .iter()
        .filter(|req| req[0] == 0x36)
        .map(|req| req[1])
        .collect();
    let expected: Vec<u8> = (1..=255u8).chain(0..=44u8).collect();
    assert_eq!(counters, expected);
}

#[tokio::test]
async fn test_block_counter_start_and_wrap_are_configurable() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_image(dir.path(), "app.hex", 0x0001_0000, &[0x11; 258]);
    let (client, mock) = client();
    let client = client.with_transfer_config(TransferConfig {
        block_counter_start: 0,
        block_counter_wrap: 1,
        ..Default::default()
    });

    client
        .transfer_file(Some(&path), Some(1), None)
        .await
        .unwrap();

    let counters: Vec<u8> = sent(&mock)
        .iter()
        .filter(|req| req[0] == 0x36)
        .map(|req| req[1])
        .collect();
    let expected: Vec<u8> = (0..=255u8).chain(1..=2u8).collect();
    assert_eq!(counters, expected);
}

#[tokio::test]
async fn test_loaded_image_is_reused_with_compression() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_image(dir.path(), "app.HEX", 0x0000_8000, &[0xAB; 8]);
    let (client, mock) = client();
    client.set_ihex_file(&path).unwrap();

    client
        .transfer_file(None, None, Some(DataFormatIdentifier::new(0x1, 0x0)))
        .await
        .unwrap();

    let requests = sent(&mock);
    assert_eq!(requests[0][..3], [0x34, 0x10, 0x44]);
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[1].len(), 2 + 8);
}

#[tokio::test]
async fn test_pending_transfer_data_is_absorbed() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_image(dir.path(), "app.hex", 0x0000_8000, &[0x01, 0x02]);
    let (client, mock) = client();
    mock.add_pending_response(vec![0x36, 0x01], 3, vec![0x76, 0x01]);
    mock.add_response(vec![0x37], vec![0x77, 0x12, 0x34]);

    let record = client.transfer_file(Some(&path), None, None).await.unwrap();

    assert_eq!(record, vec![0x12, 0x34]);
}

#[tokio::test]
async fn test_negative_transfer_data_stops_download() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_image(dir.path(), "app.hex", 0x0000_8000, &[0u8; 8]);
    let (client, mock) = client();
    mock.add_response(vec![0x36, 0x02], vec![0x7F, 0x36, 0x73]);

    let err = client
        .transfer_file(Some(&path), Some(4), None)
        .await
        .unwrap_err();

    assert_eq!(
        err,
        TransferError::Uds(UdsError::NegativeResponse {
            service_id: 0x36,
            nrc: NegativeResponseCode::WrongBlockSequenceCounter,
        })
    );
    assert!(!sent(&mock).iter().any(|req| req[0] == 0x37));
}

#[tokio::test]
async fn test_rejections_happen_before_transmission() {
    let dir = tempfile::tempdir().unwrap();
    let (client, mock) = client();

    let err = client
        .transfer_file(Some(Path::new("image.bin")), None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::UnsupportedFileType { .. }));

    assert_eq!(
        client.transfer_file(None, None, None).await.unwrap_err(),
        TransferError::NoFileSpecified
    );

    let missing = dir.path().join("missing.hex");
    assert!(matches!(
        client.transfer_file(Some(&missing), None, None).await,
        Err(TransferError::Io { .. })
    ));

    let broken = dir.path().join("broken.hex");
    std::fs::write(&broken, ":0400000000010203F7\n").unwrap();
    assert!(matches!(
        client.transfer_file(Some(&broken), None, None).await,
        Err(TransferError::Image(_))
    ));

    assert!(mock.sent().is_empty());
    assert!(client.ihex_file().is_none());
}
