//! 数据集工具 - YOLO label remapping and train/val split

use super::error::InspectionError;
use log::{info, warn};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Source datasets merged into the unified taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceDataset {
    /// Abrasion, Algae, Anode, Crack, Defects, Pipe, Turbine, pipe
    UnderwaterBot,
    /// medium / mild / no / severe corrosion
    CorrosionPipeline,
    /// can, foam, plastic, plastic bottle, unknown
    MarineDebris,
}

impl SourceDataset {
    pub fn class_map(&self) -> HashMap<u32, u32> {
        let pairs: &[(u32, u32)] = match self {
            SourceDataset::UnderwaterBot => &[(0, 3), (1, 1), (2, 6), (3, 3), (4, 3), (5, 5), (6, 4), (7, 5)],
            SourceDataset::CorrosionPipeline => &[(0, 0), (1, 0), (2, 5), (3, 0)],
            SourceDataset::MarineDebris => &[(0, 2), (1, 2), (2, 2), (3, 2), (4, 2)],
        };
        pairs.iter().copied().collect()
    }
}

impl std::str::FromStr for SourceDataset {
    type Err = InspectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "underwater_bot" => Ok(SourceDataset::UnderwaterBot),
            "corrosion_pipeline" | "pipeline" => Ok(SourceDataset::CorrosionPipeline),
            "marine_debris" | "debris" => Ok(SourceDataset::MarineDebris),
            other => Err(InspectionError::InvalidInput(format!("unknown dataset '{}'", other))),
        }
    }
}

/// Rewrites the class id of every line in one label file's contents.
pub fn remap_label_text(text: &str, map: &HashMap<u32, u32>) -> Result<String, InspectionError> {
    let mut lines = Vec::new();
    for (n, line) in text.lines().enumerate() {
        let mut parts = line.split_whitespace();
        let Some(first) = parts.next() else {
            continue;
        };
        let class_id: u32 = first.parse().map_err(|_| {
            InspectionError::InvalidInput(format!("line {}: bad class id '{}'", n + 1, first))
        })?;
        let mapped = map.get(&class_id).copied().unwrap_or(class_id);

        let mut out = vec![mapped.to_string()];
        out.extend(parts.map(str::to_string));
        lines.push(out.join(" "));
    }
    Ok(lines.join("\n"))
}

/// Remaps every `*.txt` label file in `dir`; returns the number of files.
pub fn remap_labels(dir: &Path, map: &HashMap<u32, u32>) -> Result<usize, InspectionError> {
    let files = list_files(dir, |ext| ext == "txt")?;
    info!("🔁 Remapping {} label files in {:?}", files.len(), dir);

    for path in &files {
        let text = fs::read_to_string(path)?;
        let remapped = remap_label_text(&text, map).map_err(|e| match e {
            InspectionError::InvalidInput(msg) => {
                InspectionError::InvalidInput(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })?;
        fs::write(path, remapped)?;
    }

    info!("✅ Done remapping {} files", files.len());
    Ok(files.len())
}

/// `dataset/images/{train,val}` and `dataset/labels/{train,val}`
#[derive(Debug, Clone)]
pub struct DatasetLayout {
    pub train_images: PathBuf,
    pub val_images: PathBuf,
    pub train_labels: PathBuf,
    pub val_labels: PathBuf,
}

impl DatasetLayout {
    pub fn new(root: &Path) -> Self {
        Self {
            train_images: root.join("images").join("train"),
            val_images: root.join("images").join("val"),
            train_labels: root.join("labels").join("train"),
            val_labels: root.join("labels").join("val"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitSummary {
    pub total: usize,
    pub moved_images: usize,
    pub moved_labels: usize,
}

/// Shuffles the training images and moves everything past `train_ratio`
/// (with matching label files) to the validation folders.
pub fn split_dataset<R: Rng + ?Sized>(
    layout: &DatasetLayout,
    train_ratio: f64,
    rng: &mut R,
) -> Result<SplitSummary, InspectionError> {
    if !(0.0..=1.0).contains(&train_ratio) {
        return Err(InspectionError::InvalidInput(format!(
            "train ratio {} outside [0, 1]",
            train_ratio
        )));
    }

    let mut images = list_files(&layout.train_images, |ext| IMAGE_EXTENSIONS.contains(&ext))?;
    images.shuffle(rng);

    let split_point = (images.len() as f64 * train_ratio) as usize;
    let val = &images[split_point..];
    info!("📦 {} images, moving {} to val", images.len(), val.len());

    fs::create_dir_all(&layout.val_images)?;
    fs::create_dir_all(&layout.val_labels)?;

    let mut moved_labels = 0;
    for image in val {
        let Some(name) = image.file_name() else {
            continue;
        };
        fs::rename(image, layout.val_images.join(name))?;

        let label_name = Path::new(name).with_extension("txt");
        let label_src = layout.train_labels.join(&label_name);
        if label_src.is_file() {
            fs::rename(&label_src, layout.val_labels.join(&label_name))?;
            moved_labels += 1;
        } else {
            warn!("⚠️ no label for {:?}", name);
        }
    }

    Ok(SplitSummary {
        total: images.len(),
        moved_images: val.len(),
        moved_labels,
    })
}

/// Files in `dir` whose lowercase extension passes `keep`, sorted by name.
fn list_files(dir: &Path, keep: impl Fn(&str) -> bool) -> Result<Vec<PathBuf>, InspectionError> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        if path.is_file() && ext.as_deref().is_some_and(&keep) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_remap_label_text() {
        let map = SourceDataset::UnderwaterBot.class_map();
        let text = "0 0.5 0.5 0.1 0.1\n\n6 0.2 0.3 0.4 0.5\n9 0.1 0.1 0.1 0.1\n";
        let out = remap_label_text(text, &map).unwrap();
        assert_eq!(out, "3 0.5 0.5 0.1 0.1\n4 0.2 0.3 0.4 0.5\n9 0.1 0.1 0.1 0.1");
    }

    #[test]
    fn test_remap_rejects_bad_class_id() {
        let map = SourceDataset::MarineDebris.class_map();
        assert!(remap_label_text("x 0.5 0.5 0.1 0.1", &map).is_err());
    }

    #[test]
    fn test_builtin_maps() {
        assert_eq!(SourceDataset::CorrosionPipeline.class_map()[&2], 5);
        assert!(SourceDataset::MarineDebris.class_map().values().all(|&v| v == 2));
        assert_eq!("pipeline".parse::<SourceDataset>().unwrap(), SourceDataset::CorrosionPipeline);
        assert_eq!("underwater-bot".parse::<SourceDataset>().unwrap(), SourceDataset::UnderwaterBot);
    }

    #[test]
    fn test_remap_labels_dir() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("a.txt"), "1 0.1 0.1 0.1 0.1\n").unwrap();
        fs::write(tmp.path().join("b.txt"), "3 0.1 0.1 0.1 0.1").unwrap();
        fs::write(tmp.path().join("notes.md"), "0 keep").unwrap();

        let count = remap_labels(tmp.path(), &SourceDataset::CorrosionPipeline.class_map()).unwrap();
        assert_eq!(count, 2);
        assert_eq!(fs::read_to_string(tmp.path().join("a.txt")).unwrap(), "0 0.1 0.1 0.1 0.1");
        assert_eq!(fs::read_to_string(tmp.path().join("notes.md")).unwrap(), "0 keep");
    }

    #[test]
    fn test_split_dataset() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = DatasetLayout::new(tmp.path());
        fs::create_dir_all(&layout.train_images).unwrap();
        fs::create_dir_all(&layout.train_labels).unwrap();
        for i in 0..10 {
            fs::write(layout.train_images.join(format!("img{}.jpg", i)), b"jpg").unwrap();
            if i != 0 {
                fs::write(layout.train_labels.join(format!("img{}.txt", i)), "2 0.5 0.5 0.1 0.1").unwrap();
            }
        }

        let summary = split_dataset(&layout, 0.8, &mut StdRng::seed_from_u64(5)).unwrap();
        assert_eq!(summary.total, 10);
        assert_eq!(summary.moved_images, 2);

        let val_images = fs::read_dir(&layout.val_images).unwrap().count();
        let train_images = fs::read_dir(&layout.train_images).unwrap().count();
        let val_labels = fs::read_dir(&layout.val_labels).unwrap().count();
        assert_eq!((train_images, val_images), (8, 2));
        assert_eq!(val_labels, summary.moved_labels);

        for entry in fs::read_dir(&layout.val_labels).unwrap() {
            let label = entry.unwrap().path();
            let stem = label.file_stem().unwrap().to_owned();
            assert!(layout.val_images.join(Path::new(&stem).with_extension("jpg")).is_file());
        }
    }

    #[test]
    fn test_split_rejects_bad_ratio() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = DatasetLayout::new(tmp.path());
        assert!(split_dataset(&layout, 1.5, &mut StdRng::seed_from_u64(0)).is_err());
    }
}
