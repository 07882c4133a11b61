//! MNIST in the IDX format from <http://yann.lecun.com/exdb/mnist/>.
//!
//! The four files are expected in one directory, either raw or gzipped
//! (`train-images-idx3-ubyte` or `train-images-idx3-ubyte.gz`, ...).

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use nalgebra::DMatrix;
use tracing::info;

use super::Dataset;
use crate::util::{MlError, Result};

const TRAIN_IMAGES: &str = "train-images-idx3-ubyte";
const TRAIN_LABELS: &str = "train-labels-idx1-ubyte";
const TEST_IMAGES: &str = "t10k-images-idx3-ubyte";
const TEST_LABELS: &str = "t10k-labels-idx1-ubyte";

const IMAGES_MAGIC: u32 = 2051;
const LABELS_MAGIC: u32 = 2049;

pub const WIDTH: usize = 28;
pub const HEIGHT: usize = 28;
pub const NUM_CLASSES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Test,
}

impl Split {
    fn files(self) -> (&'static str, &'static str) {
        match self {
            Split::Train => (TRAIN_IMAGES, TRAIN_LABELS),
            Split::Test => (TEST_IMAGES, TEST_LABELS),
        }
    }
}

/// Load one split. Pixels are scaled to `[0, 1]`.
pub fn load(dir: &Path, split: Split) -> Result<Dataset> {
    let (images_name, labels_name) = split.files();
    let images = parse_images(&read_file(dir, images_name)?)?;
    let labels = parse_labels(&read_file(dir, labels_name)?)?;

    if images.nrows() != labels.len() {
        Err(MlError::MalformedIdx(format!(
            "{} images but {} labels",
            images.nrows(),
            labels.len()
        )))?
    }
    info!(?split, examples = labels.len(), "loaded mnist");

    Dataset::new(images, labels, NUM_CLASSES)
}

fn read_file(dir: &Path, name: &str) -> Result<Vec<u8>> {
    let raw = dir.join(name);
    let gz = PathBuf::from(format!("{}.gz", raw.display()));

    let mut content = Vec::new();
    if raw.exists() {
        File::open(&raw)?.read_to_end(&mut content)?;
    } else {
        GzDecoder::new(File::open(&gz)?).read_to_end(&mut content)?;
    }
    Ok(content)
}

fn read_u32(bytes: &[u8], offset: usize) -> Result<u32> {
    let word = bytes
        .get(offset..offset + 4)
        .ok_or_else(|| MlError::MalformedIdx("truncated header".to_owned()))?;
    Ok(u32::from_be_bytes([word[0], word[1], word[2], word[3]]))
}

/// Parse an idx3 image file into an `n x 784` matrix of pixels in `[0, 1]`.
pub fn parse_images(bytes: &[u8]) -> Result<DMatrix<f64>> {
    let magic = read_u32(bytes, 0)?;
    if magic != IMAGES_MAGIC {
        Err(MlError::MalformedIdx(format!("bad image magic number {magic}")))?
    }
    let n = read_u32(bytes, 4)? as usize;
    let rows = read_u32(bytes, 8)? as usize;
    let cols = read_u32(bytes, 12)? as usize;
    if rows != HEIGHT || cols != WIDTH {
        Err(MlError::MalformedIdx(format!("expected {HEIGHT}x{WIDTH} images, found {rows}x{cols}")))?
    }

    let pixels = bytes
        .get(16..16 + n * rows * cols)
        .ok_or_else(|| MlError::MalformedIdx(format!("expected {n} images")))?;

    Ok(DMatrix::from_row_iterator(
        n,
        rows * cols,
        pixels.iter().map(|&p| p as f64 / 255.0),
    ))
}

pub fn parse_labels(bytes: &[u8]) -> Result<Vec<usize>> {
    let magic = read_u32(bytes, 0)?;
    if magic != LABELS_MAGIC {
        Err(MlError::MalformedIdx(format!("bad label magic number {magic}")))?
    }
    let n = read_u32(bytes, 4)? as usize;

    let labels = bytes
        .get(8..8 + n)
        .ok_or_else(|| MlError::MalformedIdx(format!("expected {n} labels")))?;
    Ok(labels.iter().map(|&l| l as usize).collect())
}
