use log::info;
use std::path::{Path, PathBuf};

use crate::data::idx;
use crate::error::{FerError, Result};
use crate::math::volume::Volume;
use crate::network::emotion::Emotion;

/// One `(image, label)` pair borrowed from a [`Dataset`].
#[derive(Debug, Clone, Copy)]
pub struct Sample<'a> {
    pub image: &'a Volume,
    pub label: usize,
}

/// Immutable, ordered collection of labelled images backed by two parallel
/// arrays of equal length.
#[derive(Debug, Clone)]
pub struct Dataset {
    images: Vec<Volume>,
    labels: Vec<usize>,
}

/// File locations of one split.
#[derive(Debug, Clone)]
pub struct SplitPaths {
    pub images: PathBuf,
    pub labels: PathBuf,
}

impl SplitPaths {
    /// `<dir>/<split>-images.idx3-ubyte` and `<dir>/<split>-labels.idx1-ubyte`.
    pub fn in_dir(dir: &Path, split: &str) -> SplitPaths {
        SplitPaths {
            images: dir.join(format!("{split}-images.idx3-ubyte")),
            labels: dir.join(format!("{split}-labels.idx1-ubyte")),
        }
    }
}

impl Dataset {
    pub fn new(images: Vec<Volume>, labels: Vec<usize>) -> Result<Dataset> {
        if images.len() != labels.len() {
            return Err(FerError::load(
                "dataset",
                format!("{} images but {} labels", images.len(), labels.len()),
            ));
        }
        if let Some(first) = images.first() {
            if let Some(i) = images.iter().position(|v| v.dims() != first.dims()) {
                return Err(FerError::load(
                    "dataset",
                    format!("image {} has shape {:?}, expected {:?}", i, images[i].dims(), first.dims()),
                ));
            }
        }
        Ok(Dataset { images, labels })
    }

    /// Loads a split from an IDX3 image file and an IDX1 label file.
    /// Labels outside the known emotion classes are rejected.
    pub fn load(paths: &SplitPaths) -> Result<Dataset> {
        let images = idx::read_images(&paths.images)?;
        let labels = idx::read_labels(&paths.labels)?;
        if images.len() != labels.len() {
            return Err(FerError::load(
                &paths.labels,
                format!("{} labels for {} images in {}", labels.len(), images.len(), paths.images.display()),
            ));
        }
        if let Some((i, &bad)) = labels.iter().enumerate().find(|(_, l)| Emotion::from_label(**l).is_none()) {
            return Err(FerError::load(
                &paths.labels,
                format!("label {} at index {} is not one of {} classes", bad, i, Emotion::ALL.len()),
            ));
        }
        let dataset = Dataset::new(images, labels)?;
        info!(
            "loaded {} samples from {} ({})",
            dataset.len(),
            paths.images.display(),
            dataset.class_summary()
        );
        Ok(dataset)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<Sample<'_>> {
        match (self.images.get(index), self.labels.get(index)) {
            (Some(image), Some(&label)) => Ok(Sample { image, label }),
            _ => Err(FerError::IndexOutOfRange { index, len: self.len() }),
        }
    }

    /// Shape shared by every image, `None` when empty.
    pub fn image_dims(&self) -> Option<(usize, usize, usize)> {
        self.images.first().map(Volume::dims)
    }

    /// Gathers the samples at `indices` into owned batch buffers.
    pub fn gather(&self, indices: &[usize]) -> Result<(Vec<Volume>, Vec<usize>)> {
        let mut images = Vec::with_capacity(indices.len());
        let mut labels = Vec::with_capacity(indices.len());
        for &i in indices {
            let sample = self.get(i)?;
            images.push(sample.image.clone());
            labels.push(sample.label);
        }
        Ok((images, labels))
    }

    fn class_summary(&self) -> String {
        Emotion::ALL
            .iter()
            .map(|e| {
                let n = self.labels.iter().filter(|&&l| l == e.label()).count();
                format!("{e}: {n}")
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}
