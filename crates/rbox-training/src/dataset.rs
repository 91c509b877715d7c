//! Dataset index: split ID lists plus per-image rotated-box annotations.

use crate::batch::{RotatedBox, Sample};
use crate::error::{TrainingError, TrainingResult};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const TRAIN_WITH_TARGET_FILE: &str = "train_non_empty_img_id.json";
pub const TRAIN_WITHOUT_TARGET_FILE: &str = "train_empty_img_id.json";
pub const VAL_WITH_TARGET_FILE: &str = "val_non_empty_img_id.json";
pub const VAL_WITHOUT_TARGET_FILE: &str = "val_empty_img_id.json";
pub const ANNOTATIONS_FILE: &str = "train_ship_segmentations_bbox.csv";

/// Ordered image IDs of one split, partitioned by whether the image carries
/// at least one annotated target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatasetSplit {
    pub with_target: Vec<String>,
    pub without_target: Vec<String>,
}

impl DatasetSplit {
    #[must_use]
    pub fn len(&self) -> usize {
        self.with_target.len() + self.without_target.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All IDs, targets first, in file order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.with_target.iter().chain(&self.without_target).map(String::as_str)
    }
}

/// Rotated-box annotations keyed by image ID.
#[derive(Debug, Clone, Default)]
pub struct Annotations {
    boxes: HashMap<String, Vec<RotatedBox>>,
}

impl Annotations {
    #[must_use]
    pub fn boxes_for(&self, image_id: &str) -> &[RotatedBox] {
        self.boxes.get(image_id).map(Vec::as_slice).unwrap_or_default()
    }

    #[must_use]
    pub fn sample(&self, image_id: &str) -> Sample {
        Sample { image_id: image_id.to_string(), boxes: self.boxes_for(image_id).to_vec() }
    }

    pub fn insert(&mut self, image_id: impl Into<String>, bbox: RotatedBox) {
        self.boxes.entry(image_id.into()).or_default().push(bbox);
    }

    #[must_use]
    pub fn image_count(&self) -> usize {
        self.boxes.len()
    }
}

#[derive(Debug, Deserialize)]
struct AnnotationRow {
    #[serde(rename = "ImageId")]
    image_id: String,
    x: Option<f32>,
    y: Option<f32>,
    width: Option<f32>,
    height: Option<f32>,
    angle: Option<f32>,
}

impl AnnotationRow {
    fn into_box(self) -> Result<(String, Option<RotatedBox>), String> {
        match (self.x, self.y, self.width, self.height, self.angle) {
            (None, None, None, None, None) => Ok((self.image_id, None)),
            (Some(x), Some(y), Some(width), Some(height), Some(angle)) => {
                Ok((self.image_id, Some(RotatedBox { x, y, width, height, angle })))
            }
            _ => Err(format!("image {} has a partially specified box", self.image_id)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatasetIndex {
    pub train: DatasetSplit,
    pub val: DatasetSplit,
    pub annotations: Annotations,
}

impl DatasetIndex {
    /// Load split lists and annotations from `input_dir`. Every file is
    /// required; the loaded indices are used as-is.
    pub fn load(input_dir: &Path) -> TrainingResult<Self> {
        let train = DatasetSplit {
            with_target: read_id_list(&input_dir.join(TRAIN_WITH_TARGET_FILE))?,
            without_target: read_id_list(&input_dir.join(TRAIN_WITHOUT_TARGET_FILE))?,
        };
        let val = DatasetSplit {
            with_target: read_id_list(&input_dir.join(VAL_WITH_TARGET_FILE))?,
            without_target: read_id_list(&input_dir.join(VAL_WITHOUT_TARGET_FILE))?,
        };
        let annotations = read_annotations(&input_dir.join(ANNOTATIONS_FILE))?;

        tracing::info!(
            train_with_target = train.with_target.len(),
            train_without_target = train.without_target.len(),
            val_with_target = val.with_target.len(),
            val_without_target = val.without_target.len(),
            annotated_images = annotations.image_count(),
            "dataset index loaded"
        );

        Ok(Self { train, val, annotations })
    }

    /// Stable content hash over both splits, in order.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for (tag, split) in [("train", &self.train), ("val", &self.val)] {
            hasher.update(tag.as_bytes());
            for id in split.ids() {
                hasher.update(id.as_bytes());
                hasher.update(b"\n");
            }
        }
        hex::encode(hasher.finalize())
    }
}

pub fn read_id_list(path: &Path) -> TrainingResult<Vec<String>> {
    let bytes = std::fs::read(path).map_err(|e| TrainingError::dataset(path, e.to_string()))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| {
            TrainingError::dataset(path, format!("expected a JSON array of image ids: {e}"))
        })
}

pub fn read_annotations(path: &Path) -> TrainingResult<Annotations> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| csv_error(path, &e))?;
    let mut annotations = Annotations::default();

    for (idx, row) in reader.deserialize::<AnnotationRow>().enumerate() {
        let row = row.map_err(|e| csv_error(path, &e))?;
        let (image_id, bbox) = row
            .into_box()
            .map_err(|reason| TrainingError::dataset(path, format!("row {}: {reason}", idx + 1)))?;
        if let Some(bbox) = bbox {
            annotations.insert(image_id, bbox);
        }
    }

    Ok(annotations)
}

fn csv_error(path: &Path, err: &csv::Error) -> TrainingError {
    TrainingError::dataset(PathBuf::from(path), err.to_string())
}
