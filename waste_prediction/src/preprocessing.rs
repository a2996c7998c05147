use crate::config::PreprocessingConfig;
use image::imageops::{self, FilterType};
use ndarray::Array4;
use serde::Deserialize;
use thiserror::Error;

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("Error reading image: {0}")]
    Read(#[from] std::io::Error),
    #[error("Error decoding image: {0}")]
    Decode(#[from] image::ImageError),
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    #[default]
    Nhwc,
    Nchw,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum Normalization {
    /// EfficientNet rescales inside the graph; pixels stay in 0..=255.
    #[default]
    #[serde(rename = "efficientnet")]
    EfficientNet,
    #[serde(rename = "unit_scale")]
    UnitScale,
    #[serde(rename = "imagenet")]
    ImageNet,
}

impl Normalization {
    pub fn apply(&self, channel: usize, value: u8) -> f32 {
        let value = value as f32;
        match self {
            Normalization::EfficientNet => value,
            Normalization::UnitScale => value / 255.,
            Normalization::ImageNet => (value / 255. - IMAGENET_MEAN[channel]) / IMAGENET_STD[channel],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Preprocessor {
    size: u32,
    layout: TensorLayout,
    normalization: Normalization,
}

impl Preprocessor {
    pub fn new(config: &PreprocessingConfig) -> Self {
        Self {
            size: config.input_size,
            layout: config.layout,
            normalization: config.normalization,
        }
    }

    pub fn input_shape(&self) -> [usize; 4] {
        let size = self.size as usize;
        match self.layout {
            TensorLayout::Nhwc => [1, size, size, 3],
            TensorLayout::Nchw => [1, 3, size, size],
        }
    }

    /// Decodes raw image bytes into a single-sample batch.
    pub fn transform(&self, image_data: &[u8]) -> Result<Array4<f32>, PreprocessError> {
        let image_reader =
            image::ImageReader::new(std::io::Cursor::new(image_data)).with_guessed_format()?;
        let original_img = image_reader.decode()?;

        let rgb = original_img.to_rgb8();
        let img = imageops::resize(&rgb, self.size, self.size, FilterType::CatmullRom);

        let mut input = Array4::zeros(self.input_shape());
        for (x, y, pixel) in img.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            for (channel, &value) in pixel.0.iter().enumerate() {
                let value = self.normalization.apply(channel, value);
                match self.layout {
                    TensorLayout::Nhwc => input[[0, y, x, channel]] = value,
                    TensorLayout::Nchw => input[[0, channel, y, x]] = value,
                }
            }
        }

        Ok(input)
    }
}
