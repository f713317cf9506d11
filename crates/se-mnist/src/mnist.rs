// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralEvo — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! MNIST IDX reader.
//!
//! Reads the classic `-images.idx3-ubyte` / `-labels.idx1-ubyte` pair into
//! [`Sample`]s: pixels normalised to [0, 1] in an `R x 1` column, labels
//! one-hot in a `K x 1` column. The format is big-endian with a magic word
//! per file; both files must agree on the record count.

use std::fs;

use anyhow::{bail, Context, Result};
use se_nn::Sample;
use se_tensor::Matrix;

const IMAGES_MAGIC: u32 = 0x0000_0803;
const LABELS_MAGIC: u32 = 0x0000_0801;

fn read_be_u32(bytes: &[u8], offset: usize, what: &str) -> Result<u32> {
    let end = offset + 4;
    if bytes.len() < end {
        bail!("truncated IDX header reading {what}");
    }
    let mut word = [0u8; 4];
    word.copy_from_slice(&bytes[offset..end]);
    Ok(u32::from_be_bytes(word))
}

/// Reads `<prefix>-images.idx3-ubyte` and `<prefix>-labels.idx1-ubyte` into
/// labelled samples.
pub fn read_samples(prefix: &str) -> Result<Vec<Sample>> {
    let images_path = format!("{prefix}-images.idx3-ubyte");
    let labels_path = format!("{prefix}-labels.idx1-ubyte");

    let images = fs::read(&images_path).with_context(|| format!("opening '{images_path}'"))?;
    let labels = fs::read(&labels_path).with_context(|| format!("opening '{labels_path}'"))?;

    let images_magic = read_be_u32(&images, 0, "images magic")?;
    if images_magic != IMAGES_MAGIC {
        bail!("invalid images magic {images_magic:#010x} (expecting {IMAGES_MAGIC:#010x})");
    }
    let image_count = read_be_u32(&images, 4, "image count")? as usize;
    let height = read_be_u32(&images, 8, "image height")? as usize;
    let width = read_be_u32(&images, 12, "image width")? as usize;

    let labels_magic = read_be_u32(&labels, 0, "labels magic")?;
    if labels_magic != LABELS_MAGIC {
        bail!("invalid labels magic {labels_magic:#010x} (expecting {LABELS_MAGIC:#010x})");
    }
    let label_count = read_be_u32(&labels, 4, "label count")? as usize;

    if image_count != label_count {
        bail!("images and labels count mismatch ({image_count}, {label_count})");
    }

    let pixels = &images[16..];
    let stride = height * width;
    if pixels.len() < image_count * stride {
        bail!("images payload truncated: {} < {}", pixels.len(), image_count * stride);
    }
    let label_bytes = &labels[8..];
    if label_bytes.len() < label_count {
        bail!("labels payload truncated");
    }

    let classes = label_bytes[..label_count]
        .iter()
        .copied()
        .max()
        .map(|m| m as usize + 1)
        .unwrap_or(0);

    let mut samples = Vec::with_capacity(image_count);
    for i in 0..image_count {
        let mut input = Matrix::new(stride, 1)?;
        let image = &pixels[i * stride..(i + 1) * stride];
        for (value, &pixel) in input.as_mut_slice().iter_mut().zip(image) {
            *value = f32::from(pixel) / 255.0;
        }

        let mut target = Matrix::new(classes, 1)?;
        target.set(label_bytes[i] as usize, 0, 1.0);

        samples.push(Sample::new(input, target)?);
    }

    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn write_idx_pair(dir: &Path, prefix: &str, images: &[[u8; 4]], labels: &[u8]) {
        let mut image_file = Vec::new();
        image_file.extend_from_slice(&IMAGES_MAGIC.to_be_bytes());
        image_file.extend_from_slice(&(images.len() as u32).to_be_bytes());
        image_file.extend_from_slice(&2u32.to_be_bytes());
        image_file.extend_from_slice(&2u32.to_be_bytes());
        for image in images {
            image_file.extend_from_slice(image);
        }

        let mut label_file = Vec::new();
        label_file.extend_from_slice(&LABELS_MAGIC.to_be_bytes());
        label_file.extend_from_slice(&(labels.len() as u32).to_be_bytes());
        label_file.extend_from_slice(labels);

        fs::write(dir.join(format!("{prefix}-images.idx3-ubyte")), image_file).unwrap();
        fs::write(dir.join(format!("{prefix}-labels.idx1-ubyte")), label_file).unwrap();
    }

    #[test]
    fn reads_and_normalises_a_tiny_set() {
        let dir = std::env::temp_dir().join("se-mnist-reader-ok");
        fs::create_dir_all(&dir).unwrap();
        write_idx_pair(
            &dir,
            "tiny",
            &[[0, 128, 255, 64], [255, 0, 0, 0]],
            &[2, 0],
        );

        let samples =
            read_samples(dir.join("tiny").to_str().unwrap()).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].input().shape(), (4, 1));
        assert_eq!(samples[0].input().get(2, 0), 1.0);
        assert!((samples[0].input().get(1, 0) - 128.0 / 255.0).abs() < 1e-6);
        // Labels 0..=2 give three classes; sample 0 is hot at row 2.
        assert_eq!(samples[0].target().shape(), (3, 1));
        assert_eq!(samples[0].target().get(2, 0), 1.0);
        assert_eq!(samples[0].target().get(0, 0), 0.0);
        assert_eq!(samples[1].target().get(0, 0), 1.0);
    }

    #[test]
    fn rejects_a_bad_magic() {
        let dir = std::env::temp_dir().join("se-mnist-reader-magic");
        fs::create_dir_all(&dir).unwrap();
        write_idx_pair(&dir, "bad", &[[0, 0, 0, 0]], &[0]);
        // Corrupt the images magic.
        let path = dir.join("bad-images.idx3-ubyte");
        let mut bytes = fs::read(&path).unwrap();
        bytes[3] = 0x99;
        fs::write(&path, bytes).unwrap();

        assert!(read_samples(dir.join("bad").to_str().unwrap()).is_err());
    }

    #[test]
    fn rejects_count_mismatch() {
        let dir = std::env::temp_dir().join("se-mnist-reader-count");
        fs::create_dir_all(&dir).unwrap();
        write_idx_pair(&dir, "mismatch", &[[0, 0, 0, 0], [0, 0, 0, 0]], &[1]);
        assert!(read_samples(dir.join("mismatch").to_str().unwrap()).is_err());
    }

    #[test]
    fn missing_files_surface_io_context() {
        let err = read_samples("/nonexistent/se-mnist").unwrap_err();
        assert!(err.to_string().contains("opening"));
    }
}
