use std::io::Read;

use flate2::read::ZlibDecoder;
use tracing::debug;

const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

pub fn is_zstd(data: &[u8]) -> bool {
    data.len() >= 4 && data[..4] == ZSTD_MAGIC
}

/// Newer exports compress the manifest and collection with zstd, older ones
/// may use zlib, legacy ones store them plain. Undecodable input is returned as-is.
pub fn decompress(data: &[u8]) -> Vec<u8> {
    if is_zstd(data) {
        match zstd::stream::decode_all(data) {
            Ok(decoded) => {
                debug!("Decompressed {} zstd bytes into {}", data.len(), decoded.len());
                return decoded;
            }
            Err(e) => debug!("zstd decompression failed: {}", e),
        }
    }

    let mut decoded = Vec::new();
    match ZlibDecoder::new(data).read_to_end(&mut decoded) {
        Ok(_) => {
            debug!("Decompressed {} zlib bytes into {}", data.len(), decoded.len());
            decoded
        }
        Err(_) => {
            debug!("Data not compressed, using {} bytes as-is", data.len());
            data.to_vec()
        }
    }
}

/// Media blobs are only ever zstd-framed; audio and images never go through zlib sniffing.
pub fn decompress_media(data: Vec<u8>) -> Vec<u8> {
    if !is_zstd(&data) {
        return data;
    }

    match zstd::stream::decode_all(data.as_slice()) {
        Ok(decoded) => decoded,
        Err(e) => {
            debug!("zstd media decompression failed, keeping raw bytes: {}", e);
            data
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::{
        write::ZlibEncoder,
        Compression,
    };

    use super::*;

    #[test]
    fn test_zstd_matches_explicit_codec() {
        let plain = "SQLite format 3\0".repeat(64).into_bytes();
        let compressed = zstd::stream::encode_all(plain.as_slice(), 3).unwrap();

        assert!(is_zstd(&compressed));
        let explicit = zstd::stream::decode_all(compressed.as_slice()).unwrap();
        assert_eq!(decompress(&compressed), explicit);
        assert_eq!(decompress(&compressed), plain);
    }

    #[test]
    fn test_zlib_is_decoded() {
        let plain = br#"{"0": "a.mp3", "1": "b.jpg"}"#.to_vec();
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&plain).unwrap();
        let compressed = encoder.finish().unwrap();

        assert_eq!(decompress(&compressed), plain);
    }

    #[test]
    fn test_plain_input_passes_through() {
        let inputs: [&[u8]; 4] =
            [b"", b"abc", br#"{"17": "word123.mp3"}"#, &[0x28, 0xB5, 0x2F, 0xFD, 0x00, 0x01]];
        for input in inputs {
            assert_eq!(decompress(input), input.to_vec());
        }
    }

    #[test]
    fn test_media_only_unwraps_zstd() {
        let jpeg = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];
        assert_eq!(decompress_media(jpeg.clone()), jpeg);

        let compressed = zstd::stream::encode_all(jpeg.as_slice(), 0).unwrap();
        assert_eq!(decompress_media(compressed), jpeg);
    }
}
