//! Readers for the big-endian IDX files MNIST-style datasets are distributed in.

use std::{fs, path::Path};

use ndarray::Array4;

use crate::error::{DatasetErr, Result};

pub const IMAGES_MAGIC: u32 = 0x0000_0803;
pub const LABELS_MAGIC: u32 = 0x0000_0801;

/// Reads the next big-endian `u32` of the header and advances `offset`.
fn read_be_u32(data: &[u8], offset: &mut usize, path: &Path) -> Result<u32> {
    let bytes = data
        .get(*offset..*offset + 4)
        .ok_or_else(|| DatasetErr::Truncated {
            path: path.to_path_buf(),
        })?;

    *offset += 4;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn check_magic(data: &[u8], offset: &mut usize, path: &Path, expected: u32) -> Result<()> {
    let got = read_be_u32(data, offset, path)?;
    if got != expected {
        return Err(DatasetErr::BadMagic {
            path: path.to_path_buf(),
            got,
            expected,
        }
        .into());
    }

    Ok(())
}

/// Parses an IDX images file into a `(count, rows, cols, 1)` array of pixels scaled to `[0, 1]`.
pub fn parse_images(data: &[u8], path: &Path) -> Result<Array4<f32>> {
    let mut offset = 0;
    check_magic(data, &mut offset, path, IMAGES_MAGIC)?;

    let count = read_be_u32(data, &mut offset, path)? as usize;
    let rows = read_be_u32(data, &mut offset, path)? as usize;
    let cols = read_be_u32(data, &mut offset, path)? as usize;

    let total = count * rows * cols;
    let pixels = data
        .get(offset..offset + total)
        .ok_or_else(|| DatasetErr::Truncated {
            path: path.to_path_buf(),
        })?;

    let scaled = pixels.iter().map(|&px| px as f32 / 255.).collect();
    Ok(Array4::from_shape_vec((count, rows, cols, 1), scaled)?)
}

/// Parses an IDX labels file.
pub fn parse_labels(data: &[u8], path: &Path) -> Result<Vec<usize>> {
    let mut offset = 0;
    check_magic(data, &mut offset, path, LABELS_MAGIC)?;

    let count = read_be_u32(data, &mut offset, path)? as usize;
    let labels = data
        .get(offset..offset + count)
        .ok_or_else(|| DatasetErr::Truncated {
            path: path.to_path_buf(),
        })?;

    Ok(labels.iter().map(|&label| label as usize).collect())
}

pub fn read_images(path: &Path) -> Result<Array4<f32>> {
    let data = fs::read(path)?;
    parse_images(&data, path)
}

pub fn read_labels(path: &Path) -> Result<Vec<usize>> {
    let data = fs::read(path)?;
    parse_labels(&data, path)
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TeacherErr;

    fn path() -> &'static Path {
        Path::new("fixture")
    }

    #[test]
    fn images_are_scaled_and_shaped() {
        let data = encode::images(&[0, 255, 51, 102, 0, 0, 255, 255], 2, 2, 2);

        let images = parse_images(&data, path()).unwrap();

        assert_eq!(images.dim(), (2, 2, 2, 1));
        assert_eq!(images[[0, 0, 1, 0]], 1.);
        assert_eq!(images[[0, 1, 0, 0]], 0.2);
        assert_eq!(images[[1, 1, 1, 0]], 1.);
    }

    #[test]
    fn labels_are_read_in_order() {
        let data = encode::labels(&[7, 2, 1, 0]);

        assert_eq!(parse_labels(&data, path()).unwrap(), [7, 2, 1, 0]);
    }

    #[test]
    fn swapped_files_are_rejected() {
        let data = encode::labels(&[1]);

        assert!(matches!(
            parse_images(&data, path()),
            Err(TeacherErr::Dataset(DatasetErr::BadMagic {
                got: LABELS_MAGIC,
                expected: IMAGES_MAGIC,
                ..
            }))
        ));
    }

    #[test]
    fn truncated_files_are_rejected() {
        let mut data = encode::images(&[0; 8], 2, 2, 2);
        data.pop();
        assert!(matches!(
            parse_images(&data, path()),
            Err(TeacherErr::Dataset(DatasetErr::Truncated { .. }))
        ));

        assert!(matches!(
            parse_labels(&[0, 0, 8], path()),
            Err(TeacherErr::Dataset(DatasetErr::Truncated { .. }))
        ));
    }
}
