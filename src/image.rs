use crate::{DenseSlice, VolumeError};

use image::{GenericImageView, GrayImage, ImageBuffer, Pixel};
use num_traits::ToPrimitive;

impl From<&DenseSlice> for GrayImage {
    /// Samples are rounded and clamped into `0..=255`.
    fn from(slice: &DenseSlice) -> Self {
        let [height, width] = slice.dims();

        ImageBuffer::from_raw(width as u32, height as u32, slice.to_u8())
            .unwrap_or_else(|| ImageBuffer::new(width as u32, height as u32))
    }
}

impl DenseSlice {
    /// Reads the first channel of every pixel of `image`.
    pub fn from_image<Im>(image: &Im) -> Result<Self, VolumeError>
    where
        Im: GenericImageView,
        <Im::Pixel as Pixel>::Subpixel: ToPrimitive,
    {
        let (width, height) = image.dimensions();
        let mut slice = DenseSlice::try_zeros([height as usize, width as usize])?;
        for (x, y, pixel) in image.pixels() {
            let v = pixel.channels()[0].to_f32().unwrap_or(0.0);
            slice.set(y as usize, x as usize, v);
        }

        Ok(slice)
    }
}
