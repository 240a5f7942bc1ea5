use embedded_graphics::{
    pixelcolor::Rgb565,
    prelude::*,
    primitives::Rectangle,
};

/// The display bus as seen by the renderer.
pub trait Screen {
    /// Physical resolution in pixels.
    fn size(&self) -> Size;

    /// Blocking transfer of one whole frame.
    ///
    /// `pixels` holds `(size.width / pixel_size) * (size.height / pixel_size)`
    /// colours in row-major order; each is shown as a `pixel_size`-wide square.
    fn send_screen_buffer(&mut self, pixels: &[Rgb565], pixel_size: u8);
}

/// Any `embedded-graphics` target (the ST7789 driver included) can present frames.
impl<D> Screen for D
where
    D: DrawTarget<Color = Rgb565> + OriginDimensions,
{
    fn size(&self) -> Size {
        OriginDimensions::size(self)
    }

    fn send_screen_buffer(&mut self, pixels: &[Rgb565], pixel_size: u8) {
        let scale = u32::from(pixel_size.max(1));
        let full = OriginDimensions::size(self);
        let width = full.width / scale;
        let height = full.height / scale;
        if pixels.len() < (width * height) as usize {
            error!("frame of {} pixels is too small for the screen", pixels.len());
            return;
        }

        let area = Rectangle::new(Point::zero(), Size::new(width * scale, height * scale));
        let upscaled = (0..height * scale).flat_map(move |y| {
            let row = ((y / scale) * width) as usize;
            (0..width * scale).map(move |x| pixels[row + (x / scale) as usize])
        });

        if self.fill_contiguous(&area, upscaled).is_err() {
            error!("screen transfer failed");
        }
    }
}
