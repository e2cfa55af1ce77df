//! Decoding of the segmenter's label masks.
//!
//! Cellpose writes its masks as single-plane integer TIFFs whose bit depth
//! depends on the object count. All depths are widened to `u32`.

use std::fs::File;
#[cfg(feature = "fuzzing")]
use std::io::Cursor;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use tiff::decoder::{Decoder, DecodingResult, Limits};

use crate::error::QuantError;
use crate::raster::LabelImage;

/// Reads a label mask TIFF.
///
/// # Errors
/// Returns [`QuantError::MissingOutput`] if the file is absent and
/// [`QuantError::LabelDecode`] if it is not an integer TIFF.
pub fn read_label_mask(path: &Path) -> Result<LabelImage, QuantError> {
    if !path.is_file() {
        return Err(QuantError::MissingOutput {
            path: path.to_path_buf(),
        });
    }

    let reader = BufReader::new(File::open(path)?);
    decode_label_mask(reader, path, Limits::unlimited())
}

fn decode_label_mask<R: Read + Seek>(
    reader: R,
    path: &Path,
    limits: Limits,
) -> Result<LabelImage, QuantError> {
    let decode_err = |message: String| QuantError::LabelDecode {
        path: path.to_path_buf(),
        message,
    };

    let mut decoder = Decoder::new(reader)
        .map_err(|e| decode_err(e.to_string()))?
        .with_limits(limits);
    let (width, height) = decoder.dimensions().map_err(|e| decode_err(e.to_string()))?;
    let data = decoder.read_image().map_err(|e| decode_err(e.to_string()))?;

    let labels: Vec<u32> = match data {
        DecodingResult::U8(data) => data.into_iter().map(u32::from).collect(),
        DecodingResult::U16(data) => data.into_iter().map(u32::from).collect(),
        DecodingResult::U32(data) => data,
        _ => {
            return Err(decode_err(
                "only 8, 16 and 32-bit unsigned label masks are supported".into(),
            ))
        }
    };

    LabelImage::from_raw(width, height, labels).ok_or_else(|| {
        decode_err(format!(
            "pixel data does not match {}x{} single-channel layout",
            width, height
        ))
    })
}

/// Fuzz-only entrypoint for label mask decoding from memory.
///
/// Uses the decoder's default memory limits so hostile headers cannot
/// request unbounded buffers.
#[cfg(feature = "fuzzing")]
pub fn fuzz_decode_label_mask(bytes: &[u8]) -> Result<(), QuantError> {
    let _ = decode_label_mask(Cursor::new(bytes), Path::new("<fuzz>"), Limits::default())?;
    Ok(())
}
