//! 数据集工具

use crate::api::models::ApiError;
use crate::core::dataset::{remap_labels, split_dataset, DatasetLayout, SourceDataset};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct SplitResult {
    pub total: u32,
    pub moved_images: u32,
    pub moved_labels: u32,
}

/// 按来源数据集重映射标签类别（underwater_bot / corrosion_pipeline / marine_debris）
#[flutter_rust_bridge::frb]
pub fn remap_label_dir(labels_dir: String, dataset: String) -> Result<u32, ApiError> {
    let source: SourceDataset = dataset.parse()?;
    let count = remap_labels(Path::new(&labels_dir), &source.class_map())?;
    Ok(count as u32)
}

/// 训练集按比例拆分出验证集（默认 0.8）
#[flutter_rust_bridge::frb]
pub fn split_dataset_dir(root: String, train_ratio: Option<f64>) -> Result<SplitResult, ApiError> {
    let layout = DatasetLayout::new(Path::new(&root));
    let summary = split_dataset(&layout, train_ratio.unwrap_or(0.8), &mut StdRng::from_entropy())?;
    Ok(SplitResult {
        total: summary.total as u32,
        moved_images: summary.moved_images as u32,
        moved_labels: summary.moved_labels as u32,
    })
}
