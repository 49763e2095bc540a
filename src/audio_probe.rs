//! Local-file audio duration probe (spec.md §4.1 step 10: "fill audio
//! durationSec by probing the local file if missing"). Reads just the RIFF/
//! WAVE header rather than pulling in a decoding crate — every `local`-driver
//! upload already lands on disk before a message can reference it, so this
//! is a few hundred bytes of header, not the whole attachment.
//!
//! Non-WAV attachments (mp3, ogg, remote URLs) have no header this module
//! understands and fall back to `None`, the same as before probing existed.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

pub fn wav_duration_secs(path: &Path) -> Option<i64> {
    let mut file = File::open(path).ok()?;
    let mut riff_header = [0u8; 12];
    file.read_exact(&mut riff_header).ok()?;
    if &riff_header[0..4] != b"RIFF" || &riff_header[8..12] != b"WAVE" {
        return None;
    }

    let mut byte_rate: Option<u32> = None;
    let mut data_size: Option<u32> = None;

    loop {
        let mut chunk_header = [0u8; 8];
        if file.read_exact(&mut chunk_header).is_err() {
            break;
        }
        let chunk_id = &chunk_header[0..4];
        let chunk_size = u32::from_le_bytes(chunk_header[4..8].try_into().unwrap());

        if chunk_id == b"fmt " && chunk_size >= 16 {
            let mut fmt = [0u8; 16];
            if file.read_exact(&mut fmt).is_err() {
                break;
            }
            byte_rate = Some(u32::from_le_bytes(fmt[8..12].try_into().unwrap()));
            if chunk_size > 16 {
                file.seek(SeekFrom::Current((chunk_size - 16) as i64)).ok()?;
            }
        } else if chunk_id == b"data" {
            data_size = Some(chunk_size);
            break;
        } else {
            file.seek(SeekFrom::Current(chunk_size as i64)).ok()?;
        }
        // Chunks are padded to even length.
        if chunk_size % 2 == 1 {
            file.seek(SeekFrom::Current(1)).ok()?;
        }
    }

    let byte_rate = byte_rate.filter(|&r| r > 0)?;
    let data_size = data_size?;
    Some((data_size as i64) / (byte_rate as i64))
}
