//! Invocation parameter codec
//!
//! Wire form: MessagePack array `[positional..., {keyword}]`, zlib-compressed,
//! then base64 so it can sit inside a text body. The keyword map is always
//! appended (even when empty), so decoding can split on the trailing map
//! without ambiguity.

use crate::domain::Arguments;
use crate::error::{AppError, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde_json::Value;
use std::io::{Read, Write};

/// Largest encoded parameter string (broker body limit is 256 KiB)
pub const MAX_ENCODED_PARAMS_BYTES: usize = 256 * 1024;

/// Cap on the decompressed size accepted when decoding
pub const MAX_DECODED_PARAMS_BYTES: usize = 4 * 1024 * 1024;

/// Encode positional + keyword arguments
pub fn encode_params(args: &Arguments) -> Result<String> {
    let mut list = args.positional.clone();
    list.push(Value::Object(args.keyword.clone()));

    let packed = rmp_serde::to_vec(&list)
        .map_err(|e| AppError::Codec(format!("parameter encoding failed: {}", e)))?;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&packed)
        .map_err(|e| AppError::Codec(format!("parameter compression failed: {}", e)))?;
    let compressed = encoder
        .finish()
        .map_err(|e| AppError::Codec(format!("parameter compression failed: {}", e)))?;

    let encoded = STANDARD.encode(compressed);
    if encoded.len() > MAX_ENCODED_PARAMS_BYTES {
        return Err(AppError::Codec(format!(
            "encoded parameters too large: {} bytes (max {})",
            encoded.len(),
            MAX_ENCODED_PARAMS_BYTES
        )));
    }
    Ok(encoded)
}

/// Decode arguments produced by [`encode_params`]
///
/// If the last element is a map it becomes the keyword arguments and the rest
/// are positional; otherwise everything is positional.
pub fn decode_params(encoded: &str) -> Result<Arguments> {
    if encoded.len() > MAX_ENCODED_PARAMS_BYTES {
        return Err(AppError::Codec(format!(
            "encoded parameters too large: {} bytes",
            encoded.len()
        )));
    }

    // Tolerate line-wrapped base64
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let compressed = STANDARD
        .decode(compact)
        .map_err(|e| AppError::Codec(format!("invalid base64 parameters: {}", e)))?;

    let mut packed = Vec::new();
    ZlibDecoder::new(compressed.as_slice())
        .take(MAX_DECODED_PARAMS_BYTES as u64 + 1)
        .read_to_end(&mut packed)
        .map_err(|e| AppError::Codec(format!("parameter decompression failed: {}", e)))?;
    if packed.len() > MAX_DECODED_PARAMS_BYTES {
        return Err(AppError::Codec("decoded parameters too large".to_string()));
    }

    let mut list: Vec<Value> = rmp_serde::from_slice(&packed)
        .map_err(|e| AppError::Codec(format!("parameter decoding failed: {}", e)))?;

    let keyword = match list.pop() {
        Some(Value::Object(map)) => map,
        Some(other) => {
            list.push(other);
            serde_json::Map::new()
        }
        None => serde_json::Map::new(),
    };

    Ok(Arguments {
        positional: list,
        keyword,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_round_trip_empty_keywords() {
        let args = Arguments::positional(vec![json!(1), json!("a")]);
        let decoded = decode_params(&encode_params(&args).unwrap()).unwrap();
        assert_eq!(decoded.positional, vec![json!(1), json!("a")]);
        assert!(decoded.keyword.is_empty());
    }

    #[test]
    fn test_round_trip_with_keywords() {
        let args = Arguments::new()
            .arg(json!({"nested": [1, 2, 3]}))
            .kwarg("arg", 123)
            .kwarg("arg1", json!(null));
        let decoded = decode_params(&encode_params(&args).unwrap()).unwrap();
        assert_eq!(decoded, args);
    }

    #[test]
    fn test_round_trip_no_arguments() {
        let decoded = decode_params(&encode_params(&Arguments::new()).unwrap()).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_trailing_positional_map_survives() {
        // A map in the last positional slot is not mistaken for keywords
        let args = Arguments::new().arg("value").arg(json!({"k": "v"}));
        let decoded = decode_params(&encode_params(&args).unwrap()).unwrap();
        assert_eq!(decoded.positional.len(), 2);
        assert!(decoded.keyword.is_empty());
    }

    #[test]
    fn test_list_without_trailing_map_is_all_positional() {
        let packed = rmp_serde::to_vec(&vec![json!(1), json!(2)]).unwrap();
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&packed).unwrap();
        let encoded = STANDARD.encode(encoder.finish().unwrap());

        let decoded = decode_params(&encoded).unwrap();
        assert_eq!(decoded.positional, vec![json!(1), json!(2)]);
        assert!(decoded.keyword.is_empty());
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(decode_params("%%%"), Err(AppError::Codec(_))));
        assert!(matches!(
            decode_params(&STANDARD.encode(b"not zlib")),
            Err(AppError::Codec(_))
        ));
    }

    #[test]
    fn test_rejects_oversized_payload() {
        // Pseudo-random text defeats compression
        let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
        let noise: String = (0..400_000)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                char::from(b'!' + (state % 90) as u8)
            })
            .collect();
        let args = Arguments::new().arg(noise);
        assert!(matches!(encode_params(&args), Err(AppError::Codec(_))));
    }
}
