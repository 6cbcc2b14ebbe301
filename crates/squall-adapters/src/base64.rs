//! Base64 body transport codec
//!
//! Minimal implementation without external dependencies. Platforms flag
//! binary reply bodies with an is-base64 boolean and deliver binary event
//! bodies the same way.

use squall_core::{Error, Result};

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// Encode bytes to a Base64 string
pub fn encode(input: &[u8]) -> String {
    let mut output = String::with_capacity((input.len() + 2) / 3 * 4);

    for chunk in input.chunks(3) {
        let mut triple: u32 = 0;
        for (i, &b) in chunk.iter().enumerate() {
            triple |= (b as u32) << (16 - 8 * i);
        }

        // a chunk of n bytes yields n + 1 sextets, the rest is padding
        for i in 0..4 {
            if i <= chunk.len() {
                let index = (triple >> (18 - 6 * i)) & 0x3F;
                output.push(ALPHABET[index as usize] as char);
            } else {
                output.push('=');
            }
        }
    }

    output
}

fn sextet(byte: u8) -> Result<u32> {
    let value = match byte {
        b'A'..=b'Z' => byte - b'A',
        b'a'..=b'z' => byte - b'a' + 26,
        b'0'..=b'9' => byte - b'0' + 52,
        b'+' => 62,
        b'/' => 63,
        _ => {
            return Err(Error::Parse(format!(
                "invalid base64 character: {:#04x}",
                byte
            )))
        }
    };
    Ok(value as u32)
}

/// Decode a Base64 string to bytes. Whitespace is not tolerated; padding
/// is required for partial final groups.
pub fn decode(input: &str) -> Result<Vec<u8>> {
    let bytes = input.as_bytes();
    if bytes.len() % 4 != 0 {
        return Err(Error::Parse("base64 length not a multiple of 4".to_string()));
    }

    let mut output = Vec::with_capacity(bytes.len() / 4 * 3);
    for group in bytes.chunks(4) {
        let pad = group.iter().rev().take_while(|&&b| b == b'=').count();
        if pad > 2 || group[..4 - pad].contains(&b'=') {
            return Err(Error::Parse("misplaced base64 padding".to_string()));
        }

        let mut triple: u32 = 0;
        for &b in &group[..4 - pad] {
            triple = (triple << 6) | sextet(b)?;
        }
        triple <<= 6 * pad as u32;

        output.push((triple >> 16) as u8);
        if pad < 2 {
            output.push((triple >> 8) as u8);
        }
        if pad < 1 {
            output.push(triple as u8);
        }
    }

    Ok(output)
}
