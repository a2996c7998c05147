use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct TrainingConfig {
    #[serde(default)]
    pub log_level: LogLevel,
    pub dataset: DatasetConfig,
    #[serde(default)]
    pub preprocessing: PreprocessingConfig,
    #[serde(default)]
    pub balancing: Balancing,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub augmentation: AugmentationConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatasetConfig {
    pub root: PathBuf,
    #[serde(default = "default_train_dir")]
    pub train_dir: String,
    #[serde(default = "default_val_dir")]
    pub val_dir: String,
    #[serde(default = "default_test_dir")]
    pub test_dir: String,
    /// Report corrupt images without deleting them.
    #[serde(default)]
    pub dry_run: bool,
}

fn default_train_dir() -> String {
    "train".into()
}

fn default_val_dir() -> String {
    "val".into()
}

fn default_test_dir() -> String {
    "test".into()
}

impl DatasetConfig {
    pub fn train_path(&self) -> PathBuf {
        self.root.join(&self.train_dir)
    }

    pub fn val_path(&self) -> PathBuf {
        self.root.join(&self.val_dir)
    }

    pub fn test_path(&self) -> PathBuf {
        self.root.join(&self.test_dir)
    }
}

/// Same vocabulary as the serving configuration, so the manifest values can
/// be copied over verbatim.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    #[default]
    Nhwc,
    Nchw,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum Normalization {
    #[default]
    #[serde(rename = "efficientnet")]
    EfficientNet,
    #[serde(rename = "unit_scale")]
    UnitScale,
    #[serde(rename = "imagenet")]
    ImageNet,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct PreprocessingConfig {
    pub input_size: u32,
    #[serde(default)]
    pub layout: TensorLayout,
    #[serde(default)]
    pub normalization: Normalization,
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            input_size: 224,
            layout: TensorLayout::default(),
            normalization: Normalization::default(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum Balancing {
    #[default]
    ClassWeights,
    Oversample { seed: u64 },
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ScheduleConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub initial_learning_rate: f64,
    pub decay_factor: f64,
    pub decay_every: usize,
    pub patience: usize,
    pub label_smoothing: f32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            epochs: 10,
            batch_size: 32,
            initial_learning_rate: 0.001,
            decay_factor: 0.7,
            decay_every: 5,
            patience: 10,
            label_smoothing: 0.1,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct NetworkConfig {
    pub backbone: String,
    pub trainable_backbone_layers: usize,
    pub se_reduction: usize,
    pub se_dropout: f32,
    pub dense_units: usize,
    pub l2_regularization: f32,
    pub head_dropout: f32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            backbone: "EfficientNetB0".into(),
            trainable_backbone_layers: 30,
            se_reduction: 16,
            se_dropout: 0.3,
            dense_units: 256,
            l2_regularization: 0.001,
            head_dropout: 0.5,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AugmentationConfig {
    pub rotation_degrees: f32,
    pub width_shift: f32,
    pub height_shift: f32,
    pub zoom: f32,
    pub shear: f32,
    pub brightness: (f32, f32),
    pub horizontal_flip: bool,
    pub fill_mode: String,
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self {
            rotation_degrees: 25.0,
            width_shift: 0.25,
            height_shift: 0.25,
            zoom: 0.15,
            shear: 0.2,
            brightness: (0.8, 1.2),
            horizontal_flip: true,
            fill_mode: "nearest".into(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    pub results_dir: PathBuf,
    #[serde(default = "default_manifest_file")]
    pub manifest_file: String,
    #[serde(default = "default_labels_file")]
    pub labels_file: String,
    #[serde(default = "default_evaluation_file")]
    pub evaluation_file: String,
    /// Artifact written by the external converter, relative to `results_dir`.
    pub exported_model: String,
    pub serving_dir: PathBuf,
    pub serving_model_file: String,
}

fn default_manifest_file() -> String {
    "training_manifest.json".into()
}

fn default_labels_file() -> String {
    "labels.txt".into()
}

fn default_evaluation_file() -> String {
    "evaluation_report.json".into()
}

impl OutputConfig {
    pub fn manifest_path(&self) -> PathBuf {
        self.results_dir.join(&self.manifest_file)
    }

    pub fn labels_path(&self) -> PathBuf {
        self.results_dir.join(&self.labels_file)
    }

    pub fn evaluation_path(&self) -> PathBuf {
        self.results_dir.join(&self.evaluation_file)
    }

    pub fn exported_model_path(&self) -> PathBuf {
        self.results_dir.join(&self.exported_model)
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
        }
    }
}

pub fn get_configuration() -> Result<TrainingConfig, config::ConfigError> {
    let base_path = std::env::current_dir()
        .map_err(|e| config::ConfigError::Message(format!("no current directory: {}", e)))?;
    let configuration_directory = base_path.join("configuration");

    let settings = config::Config::builder()
        .add_source(config::File::from(
            configuration_directory.join("training.yaml"),
        ))
        .add_source(
            config::Environment::with_prefix("TRAIN")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    settings.try_deserialize::<TrainingConfig>()
}
