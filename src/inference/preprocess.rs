use image::imageops::{self, FilterType};
use image::GrayImage;

use super::{FaceBox, FaceTensor};

/// Crop `region`, resize it to `input_size` squared and scale pixels to [0, 1]
///
/// The region must lie inside the image (see `FaceBox::clamp_to`).
pub fn preprocess(gray: &GrayImage, region: FaceBox, input_size: u32) -> FaceTensor {
    let face = imageops::crop_imm(gray, region.x, region.y, region.width, region.height).to_image();
    let resized = imageops::resize(&face, input_size, input_size, FilterType::Triangle);

    FaceTensor {
        size: input_size,
        data: resized.as_raw().iter().map(|&p| p as f32 / 255.0).collect(),
    }
}
