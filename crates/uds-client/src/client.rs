//! High-level UDS client
//!
//! Ties the transaction engine to the DID descriptor registry, the loaded
//! flash image and the keep-alive task.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::config::{KeepaliveConfig, TransferConfig, UdsConfig};
use crate::error::ClientError;
use crate::keepalive::KeepAlive;
use crate::transfer::{self, IntelHexImage, TransferError};
use crate::transport::{create_transport, TransportError};
use crate::uds::response::decode_did_blocks;
use crate::uds::{
    DataFormatIdentifier, EngineTiming, Parameter, PositiveResponseDescriptor,
    TransactionEngine, UdsError, UdsService,
};

/// Diagnostic client for one ECU
pub struct UdsClient {
    engine: Arc<TransactionEngine>,
    service: UdsService,
    /// DID → response layout
    descriptors: Mutex<HashMap<u16, PositiveResponseDescriptor>>,
    image: RwLock<Option<IntelHexImage>>,
    transfer_config: TransferConfig,
    keepalive_config: KeepaliveConfig,
}

impl UdsClient {
    pub fn new(engine: Arc<TransactionEngine>) -> Self {
        Self {
            service: UdsService::new(engine.clone()),
            engine,
            descriptors: Mutex::new(HashMap::new()),
            image: RwLock::new(None),
            transfer_config: TransferConfig::default(),
            keepalive_config: KeepaliveConfig::default(),
        }
    }

    /// Build the transport and engine described by `config`
    pub async fn from_config(config: &UdsConfig) -> Result<Self, ClientError> {
        let transport = create_transport(&config.transport).await?;
        let address = transport.address_info();
        debug!(
            tx_id = %format!("0x{:X}", address.tx_id),
            rx_id = %format!("0x{:X}", address.rx_id),
            "Transport ready"
        );

        let engine = Arc::new(TransactionEngine::with_timing(
            transport,
            EngineTiming::from(&config.timing),
        ));
        Ok(Self::new(engine)
            .with_transfer_config(config.transfer.clone())
            .with_keepalive_config(config.keepalive.clone()))
    }

    pub fn with_transfer_config(mut self, config: TransferConfig) -> Self {
        self.transfer_config = config;
        self
    }

    pub fn with_keepalive_config(mut self, config: KeepaliveConfig) -> Self {
        self.keepalive_config = config;
        self
    }

    pub fn engine(&self) -> &Arc<TransactionEngine> {
        &self.engine
    }

    pub fn service(&self) -> &UdsService {
        &self.service
    }

    /// Reconnect the transport if it reports itself disconnected
    pub async fn ensure_connected(&self) -> Result<(), TransportError> {
        let transport = self.engine.transport();
        if transport.is_connected().await {
            return Ok(());
        }
        warn!("Transport disconnected, reconnecting");
        transport.reconnect().await?;
        info!("Transport reconnected");
        Ok(())
    }

    /// Send a raw request with the engine's default pacing
    pub async fn send(
        &self,
        request: &[u8],
        response_required: bool,
        functional: bool,
    ) -> Result<Option<Vec<u8>>, UdsError> {
        self.engine
            .send(
                request,
                response_required,
                functional,
                self.engine.timing().tp_wait,
            )
            .await
    }

    // =========================================================================
    // ReadDataByIdentifier
    // =========================================================================

    /// Register the response layout of `did`, replacing any previous one
    pub fn register_did(
        &self,
        did: u16,
        params: Vec<Box<dyn Parameter>>,
    ) -> Option<PositiveResponseDescriptor> {
        self.descriptors.lock().insert(
            did,
            PositiveResponseDescriptor::read_data_by_identifier(did, params),
        )
    }

    pub fn is_registered(&self, did: u16) -> bool {
        self.descriptors.lock().contains_key(&did)
    }

    /// Read and decode one or more DIDs
    ///
    /// Every DID must have been registered; nothing is sent otherwise.
    /// Results come back in request order.
    pub async fn read_data_by_identifier(
        &self,
        dids: &[u16],
    ) -> Result<Vec<(u16, Map<String, Value>)>, UdsError> {
        if dids.is_empty() {
            return Ok(Vec::new());
        }
        {
            let descriptors = self.descriptors.lock();
            if let Some(unknown) = dids.iter().find(|did| !descriptors.contains_key(did)) {
                return Err(UdsError::UnknownDid(*unknown));
            }
        }

        let response = self.service.read_data_by_id(dids).await?;

        let mut descriptors = self.descriptors.lock();
        let first = descriptors
            .get(&dids[0])
            .ok_or(UdsError::UnknownDid(dids[0]))?;
        first.check_sid_in_response(&response)?;
        let sid_length = first.sid_length();

        let decoded = decode_did_blocks(&response, sid_length, dids.len(), |index, tail| {
            descriptors
                .get_mut(&dids[index])
                .ok_or(UdsError::UnknownDid(dids[index]))?
                .parse_and_decode(tail)
        })?;
        Ok(dids.iter().copied().zip(decoded).collect())
    }

    // =========================================================================
    // File transfer
    // =========================================================================

    /// Currently loaded flash image
    pub fn ihex_file(&self) -> Option<IntelHexImage> {
        self.image.read().clone()
    }

    /// Parse `path` now and replace the loaded image
    pub fn set_ihex_file(&self, path: impl AsRef<Path>) -> Result<(), TransferError> {
        let image = IntelHexImage::from_file(path)?;
        *self.image.write() = Some(image);
        Ok(())
    }

    /// Download a file, or the loaded image when `file_name` is `None`
    ///
    /// Only Intel-HEX (`.hex`, `.ihex`) is supported. Returns the
    /// RequestTransferExit response parameter record.
    pub async fn transfer_file(
        &self,
        file_name: Option<&Path>,
        chunk_size: Option<usize>,
        data_format: Option<DataFormatIdentifier>,
    ) -> Result<Vec<u8>, TransferError> {
        let loaded = self.image.read().is_some();
        match file_name {
            None if !loaded => return Err(TransferError::NoFileSpecified),
            None => {}
            Some(path) => {
                transfer::check_file_type(path)?;
                self.set_ihex_file(path)?;
            }
        }
        self.transfer_ihex_file(chunk_size, data_format).await
    }

    /// Download the loaded image
    ///
    /// A `chunk_size` is stored on the image and used for later transfers too.
    pub async fn transfer_ihex_file(
        &self,
        chunk_size: Option<usize>,
        data_format: Option<DataFormatIdentifier>,
    ) -> Result<Vec<u8>, TransferError> {
        let image = {
            let mut guard = self.image.write();
            let image = guard.as_mut().ok_or(TransferError::NoFileSpecified)?;
            if let Some(chunk_size) = chunk_size {
                image.set_chunk_size(chunk_size)?;
            }
            image.clone()
        };

        transfer::download_image(
            &self.service,
            &image,
            data_format.unwrap_or_default(),
            &self.transfer_config,
        )
        .await
    }

    // =========================================================================
    // Keep-alive
    // =========================================================================

    /// Start tester present in the background, unless disabled by config
    pub fn start_keepalive(&self) -> Option<KeepAlive> {
        if !self.keepalive_config.enabled {
            info!("Keepalive disabled by configuration");
            return None;
        }
        Some(KeepAlive::start(self.engine.clone(), &self.keepalive_config))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::config::MockConfig;
    use crate::transport::MockTransportAdapter;
    use crate::uds::CodedParameter;

    fn client() -> (UdsClient, Arc<MockTransportAdapter>) {
        let mock = Arc::new(MockTransportAdapter::new(&MockConfig::default()));
        let engine = Arc::new(TransactionEngine::new(mock.clone()));
        (UdsClient::new(engine), mock)
    }

    #[tokio::test]
    async fn test_read_registered_did() {
        let (client, _mock) = client();
        client.register_did(0xF190, vec![Box::new(CodedParameter::ascii("vin", 17))]);

        let decoded = client.read_data_by_identifier(&[0xF190]).await.unwrap();

        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].0, 0xF190);
        assert_eq!(decoded[0].1["vin"], json!("1HGCM82633A123456"));
    }

    #[tokio::test]
    async fn test_read_multiple_dids_in_request_order() {
        let (client, mock) = client();
        client.register_did(0x0101, vec![Box::new(CodedParameter::unsigned("rpm", 2))]);
        client.register_did(0x0102, vec![Box::new(CodedParameter::unsigned("speed", 1))]);
        mock.add_response(
            vec![0x22, 0x01, 0x02, 0x01, 0x01],
            vec![0x62, 0x01, 0x02, 0x50, 0x01, 0x01, 0x0B, 0xB8],
        );

        let decoded = client.read_data_by_identifier(&[0x0102, 0x0101]).await.unwrap();

        assert_eq!(decoded[0], (0x0102, json!({"speed": 80}).as_object().cloned().unwrap()));
        assert_eq!(decoded[1], (0x0101, json!({"rpm": 3000}).as_object().cloned().unwrap()));
    }

    #[tokio::test]
    async fn test_read_with_trailing_bytes_is_malformed() {
        let (client, mock) = client();
        client.register_did(0x0102, vec![Box::new(CodedParameter::unsigned("speed", 1))]);
        mock.add_response(vec![0x22, 0x01, 0x02], vec![0x62, 0x01, 0x02, 0x50, 0xEE]);

        let err = client.read_data_by_identifier(&[0x0102]).await.unwrap_err();

        assert!(matches!(err, UdsError::MalformedResponse(msg) if msg.contains("trailing")));
    }

    #[tokio::test]
    async fn test_unknown_did_sends_nothing() {
        let (client, mock) = client();

        let err = client.read_data_by_identifier(&[0x1234]).await.unwrap_err();

        assert_eq!(err, UdsError::UnknownDid(0x1234));
        assert!(mock.sent().is_empty());
    }

    #[tokio::test]
    async fn test_negative_read_is_rejected() {
        let (client, mock) = client();
        client.register_did(0x1234, vec![Box::new(CodedParameter::unsigned("value", 2))]);
        mock.add_response(vec![0x22, 0x12, 0x34], vec![0x7F, 0x22, 0x31]);

        let err = client.read_data_by_identifier(&[0x1234]).await.unwrap_err();

        assert!(matches!(err, UdsError::NegativeResponse { service_id: 0x22, .. }));
    }

    #[tokio::test]
    async fn test_transfer_file_rejections_send_nothing() {
        let (client, mock) = client();

        let err = client
            .transfer_file(Some(Path::new("image.bin")), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::UnsupportedFileType { .. }));

        let err = client.transfer_file(None, None, None).await.unwrap_err();
        assert_eq!(err, TransferError::NoFileSpecified);

        let err = client.transfer_ihex_file(None, None).await.unwrap_err();
        assert_eq!(err, TransferError::NoFileSpecified);

        assert!(mock.sent().is_empty());
    }

    #[tokio::test]
    async fn test_ensure_connected_reconnects() {
        let (client, mock) = client();
        mock.set_connected(false);
        assert!(client.send(&[0x10, 0x01], true, false).await.is_err());

        client.ensure_connected().await.unwrap();

        let response = client.send(&[0x10, 0x01], true, false).await.unwrap();
        assert_eq!(response.map(|r| r[0]), Some(0x50));
    }

    #[tokio::test]
    async fn test_keepalive_respects_config() {
        let (client, _mock) = client();
        let client = client.with_keepalive_config(KeepaliveConfig {
            enabled: false,
            ..Default::default()
        });
        assert!(client.start_keepalive().is_none());
    }
}
