//! Intel-HEX images for download
//!
//! All data records are merged into one contiguous buffer starting at the
//! lowest address; gaps between records are filled with `0xFF` (erased
//! flash).

use std::path::Path;

use tracing::debug;

use super::TransferError;

/// Default TransferData payload per request
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Largest span an image may cover, gaps included
const MAX_IMAGE_SPAN: u64 = 16 * 1024 * 1024;

const FILL_BYTE: u8 = 0xFF;

/// Parsed Intel-HEX file ready for RequestDownload/TransferData
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntelHexImage {
    transmit_address: u32,
    data: Vec<u8>,
    transmit_chunk_size: usize,
}

impl IntelHexImage {
    /// Read and parse an Intel-HEX file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, TransferError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| TransferError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let image = Self::parse(&content)?;
        debug!(
            path = %path.display(),
            address = %format!("0x{:08X}", image.transmit_address),
            length = image.data.len(),
            "Loaded Intel-HEX image"
        );
        Ok(image)
    }

    /// Parse Intel-HEX text
    pub fn parse(content: &str) -> Result<Self, TransferError> {
        let mut base: u32 = 0;
        let mut segments: Vec<(u32, Vec<u8>)> = Vec::new();

        for record in ihex::Reader::new(content) {
            match record.map_err(|e| TransferError::Image(e.to_string()))? {
                ihex::Record::ExtendedLinearAddress(upper) => base = (upper as u32) << 16,
                ihex::Record::ExtendedSegmentAddress(segment) => base = (segment as u32) << 4,
                ihex::Record::Data { offset, value } => {
                    segments.push((base.wrapping_add(offset as u32), value))
                }
                ihex::Record::EndOfFile => break,
                // Start address records carry no payload
                _ => {}
            }
        }

        let start = segments
            .iter()
            .map(|(addr, _)| *addr as u64)
            .min()
            .ok_or_else(|| TransferError::Image("no data records".to_string()))?;
        let end = segments
            .iter()
            .map(|(addr, value)| *addr as u64 + value.len() as u64)
            .max()
            .unwrap_or(start);

        if end - start > MAX_IMAGE_SPAN {
            return Err(TransferError::Image(format!(
                "image spans 0x{:X} bytes, limit is 0x{:X}",
                end - start,
                MAX_IMAGE_SPAN
            )));
        }

        let mut data = vec![FILL_BYTE; (end - start) as usize];
        for (addr, value) in &segments {
            let at = (*addr as u64 - start) as usize;
            data[at..at + value.len()].copy_from_slice(value);
        }

        Ok(Self {
            transmit_address: start as u32,
            data,
            transmit_chunk_size: DEFAULT_CHUNK_SIZE,
        })
    }

    /// First address covered by the image
    pub fn transmit_address(&self) -> u32 {
        self.transmit_address
    }

    /// Number of bytes to download, gaps included
    pub fn transmit_length(&self) -> u32 {
        self.data.len() as u32
    }

    pub fn transmit_chunk_size(&self) -> usize {
        self.transmit_chunk_size
    }

    pub fn set_chunk_size(&mut self, chunk_size: usize) -> Result<(), TransferError> {
        if chunk_size == 0 {
            return Err(TransferError::InvalidChunkSize(chunk_size));
        }
        self.transmit_chunk_size = chunk_size;
        Ok(())
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consecutive slices of at most `transmit_chunk_size` bytes
    pub fn chunks(&self) -> std::slice::Chunks<'_, u8> {
        self.data.chunks(self.transmit_chunk_size)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use pretty_assertions::assert_eq;

    use super::*;

    // 0x0800_0000: 00 01 02 03, 0x0800_0008: AA BB
    const IMAGE: &str = ":020000040800F2\n\
                         :0400000000010203F6\n\
                         :02000800AABB91\n\
                         :00000001FF\n";

    #[test]
    fn test_parse_merges_records_and_fills_gaps() {
        let image = IntelHexImage::parse(IMAGE).unwrap();

        assert_eq!(image.transmit_address(), 0x0800_0000);
        assert_eq!(image.transmit_length(), 10);
        assert_eq!(
            image.data(),
            &[0x00, 0x01, 0x02, 0x03, 0xFF, 0xFF, 0xFF, 0xFF, 0xAA, 0xBB]
        );
        assert_eq!(image.transmit_chunk_size(), DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn test_chunks_respect_chunk_size() {
        let mut image = IntelHexImage::parse(IMAGE).unwrap();
        image.set_chunk_size(4).unwrap();

        let chunks: Vec<&[u8]> = image.chunks().collect();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2], &[0xAA, 0xBB]);
        assert!(matches!(
            image.set_chunk_size(0),
            Err(TransferError::InvalidChunkSize(0))
        ));
    }

    #[test]
    fn test_parse_rejects_bad_checksum_and_empty_images() {
        assert!(matches!(
            IntelHexImage::parse(":0400000000010203F7\n:00000001FF\n"),
            Err(TransferError::Image(_))
        ));
        assert!(matches!(
            IntelHexImage::parse(":00000001FF\n"),
            Err(TransferError::Image(msg)) if msg.contains("no data")
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::Builder::new().suffix(".hex").tempfile().unwrap();
        file.write_all(IMAGE.as_bytes()).unwrap();

        let image = IntelHexImage::from_file(file.path()).unwrap();
        assert_eq!(image.transmit_length(), 10);

        assert!(matches!(
            IntelHexImage::from_file("/nonexistent/image.hex"),
            Err(TransferError::Io { .. })
        ));
    }
}
