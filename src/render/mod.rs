//! Double-buffered software renderer.
//!
//! A [`Renderer`] owns up to three frame buffers at a (possibly downscaled)
//! resolution. [`Renderer::split`] hands out the two sides of the pipeline:
//!
//! - [`Painter`] draws into the *next* buffer and [`submit`](Painter::submit)s it.
//! - [`Presenter`] waits for a submitted frame and pushes it to a [`Screen`]
//!   with [`update`](Presenter::update).
//!
//! Two binary fences pace the sides against each other: the painter is never
//! more than one frame ahead and never writes the buffer being transmitted.
//!
//! ```rust,ignore
//! let renderer = mk_static!(Renderer, Renderer::new(&display, RenderConfig::default())?);
//! let (mut painter, mut presenter) = renderer.split();
//!
//! // render task
//! loop { presenter.update(&mut display).await; }
//!
//! // game task
//! painter.fill_screen_vertical_gradient([Rgb565::CSS_SKY_BLUE, Rgb565::BLUE]);
//! painter.submit().await;
//! ```

pub mod draw;
mod pool;
mod screen;

use embassy_sync::{
    blocking_mutex::raw::CriticalSectionRawMutex,
    signal::Signal,
};
use embedded_graphics::{
    mono_font::{
        MonoTextStyle,
        ascii::FONT_6X10,
    },
    pixelcolor::Rgb565,
    prelude::*,
    primitives::Rectangle,
    text::{
        Baseline,
        Text,
    },
};
use pool::FramePool;
pub use screen::Screen;

pub const MIN_BUFFER_COUNT: u8 = 1;
pub const MAX_BUFFER_COUNT: u8 = 3;
pub const DEFAULT_BUFFER_COUNT: u8 = 2;
pub const DEFAULT_PIXEL_SIZE: u8 = 4;

/// Why a [`Renderer`] could not be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum InitError {
    /// Buffer count outside `1..=3`, zero pixel size, or an empty resolution.
    InvalidArguments,
    /// The frame buffers do not fit into the free heap.
    NotEnoughMemory,
}

impl core::fmt::Display for InitError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidArguments => f.write_str("invalid renderer arguments"),
            Self::NotEnoughMemory => f.write_str("not enough memory for frame buffers"),
        }
    }
}

impl core::error::Error for InitError {}

/// Renderer settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub struct RenderConfig {
    buffer_count: u8,
    pixel_size: u8,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            buffer_count: DEFAULT_BUFFER_COUNT,
            pixel_size: DEFAULT_PIXEL_SIZE,
        }
    }
}

impl RenderConfig {
    /// Number of frame buffers, `1..=3`. One buffer serializes drawing with
    /// the transfer to the screen.
    #[must_use]
    pub const fn with_buffer_count(mut self, buffer_count: u8) -> Self {
        self.buffer_count = buffer_count;
        self
    }

    /// Downscale factor: each frame buffer pixel covers `pixel_size²` screen pixels.
    #[must_use]
    pub const fn with_pixel_size(mut self, pixel_size: u8) -> Self {
        self.pixel_size = pixel_size;
        self
    }

    pub const fn buffer_count(&self) -> u8 {
        self.buffer_count
    }

    pub const fn pixel_size(&self) -> u8 {
        self.pixel_size
    }
}

type Fence = Signal<CriticalSectionRawMutex, ()>;

/// Frame buffers plus the two fences that hand them between painter and presenter.
pub struct Renderer {
    pool: FramePool,
    resolution: Size,
    pixel_size: u8,
    /// Signalled by the painter when a frame is ready.
    render_fence: Fence,
    /// Signalled by the presenter when the screen transfer finished.
    update_fence: Fence,
}

impl Renderer {
    /// Allocate frame buffers for `screen`, checking against the free heap.
    pub fn new<S: Screen + ?Sized>(screen: &S, config: RenderConfig) -> Result<Self, InitError> {
        Self::with_memory_limit(screen, config, crate::free_heap())
    }

    /// Like [`new`](Self::new) with an explicit byte limit instead of the free heap.
    pub fn with_memory_limit<S: Screen + ?Sized>(
        screen: &S,
        config: RenderConfig,
        memory_limit: usize,
    ) -> Result<Self, InitError> {
        if !(MIN_BUFFER_COUNT..=MAX_BUFFER_COUNT).contains(&config.buffer_count)
            || config.pixel_size == 0
        {
            return Err(InitError::InvalidArguments);
        }

        let screen_size = screen.size();
        let scale = u32::from(config.pixel_size);
        let resolution = Size::new(screen_size.width / scale, screen_size.height / scale);
        if resolution.width == 0 || resolution.height == 0 {
            return Err(InitError::InvalidArguments);
        }

        let buffer_length = resolution.width as usize * resolution.height as usize;
        let pool = FramePool::new(config.buffer_count, buffer_length, memory_limit)?;

        let update_fence = Fence::new();
        update_fence.signal(());

        info!(
            "renderer ready: {}x{} x{} buffers, pixel size {}",
            resolution.width,
            resolution.height,
            config.buffer_count,
            config.pixel_size
        );

        Ok(Self {
            pool,
            resolution,
            pixel_size: config.pixel_size,
            render_fence: Fence::new(),
            update_fence,
        })
    }

    /// Frame buffer resolution (screen size divided by the pixel size).
    pub const fn resolution(&self) -> Size {
        self.resolution
    }

    pub const fn pixel_size(&self) -> u8 {
        self.pixel_size
    }

    pub const fn buffer_count(&self) -> u8 {
        self.pool.buffer_count()
    }

    /// Split into the producing and the presenting side.
    ///
    /// The fences start over: nothing submitted, screen idle.
    pub fn split(&mut self) -> (Painter<'_>, Presenter<'_>) {
        self.render_fence.reset();
        self.update_fence.signal(());
        let renderer = &*self;
        (Painter { renderer }, Presenter { renderer })
    }
}

/// Producer side: draws into the next buffer and submits it.
pub struct Painter<'r> {
    renderer: &'r Renderer,
}

impl Painter<'_> {
    pub const fn resolution(&self) -> Size {
        self.renderer.resolution
    }

    /// Index of the buffer currently being drawn into.
    pub fn next_buffer_index(&self) -> u8 {
        self.renderer.pool.next_index()
    }

    /// The buffer being drawn into.
    pub fn buffer(&mut self) -> &mut [Rgb565] {
        let pool = &self.renderer.pool;
        // SAFETY: between submits the next buffer belongs to the painter alone.
        // With several buffers the presenter only reads `current`, which is a
        // different buffer; with one buffer `submit` returns only after the
        // transfer is done. `&mut self` keeps this the only live view.
        unsafe { pool.buffer_mut(pool.next_index()) }
    }

    /// Hand the drawn frame to the presenter.
    ///
    /// Waits until the previous frame has been transferred, so the painter is
    /// at most one frame ahead of the screen.
    pub async fn submit(&mut self) {
        let renderer = self.renderer;
        renderer.update_fence.wait().await;
        let presented = renderer.pool.advance();
        trace!("submitted buffer {}", presented);
        renderer.render_fence.signal(());

        if renderer.pool.buffer_count() == 1 {
            // The only buffer is on its way to the screen; wait before drawing again.
            renderer.update_fence.wait().await;
            renderer.update_fence.signal(());
        }
    }

    pub fn draw_rectangle(&mut self, pos: Point, size: Size, color: Rgb565) {
        let resolution = self.resolution();
        draw::draw_rectangle(self.buffer(), resolution, pos, size, color);
    }

    pub fn draw_grid_pattern(&mut self, pos: Point, size: Size, colors: [Rgb565; 2]) {
        let resolution = self.resolution();
        draw::draw_grid_pattern(self.buffer(), resolution, pos, size, colors);
    }

    pub fn draw_vertical_gradient(&mut self, pos: Point, size: Size, colors: [Rgb565; 2]) {
        let resolution = self.resolution();
        draw::draw_vertical_gradient(self.buffer(), resolution, pos, size, colors);
    }

    pub fn fill_screen(&mut self, color: Rgb565) {
        self.buffer().fill(color);
    }

    pub fn fill_screen_grid_pattern(&mut self, colors: [Rgb565; 2]) {
        self.draw_grid_pattern(Point::zero(), self.resolution(), colors);
    }

    pub fn fill_screen_vertical_gradient(&mut self, colors: [Rgb565; 2]) {
        self.draw_vertical_gradient(Point::zero(), self.resolution(), colors);
    }

    /// Debug frame rate counter on a black box.
    pub fn draw_fps(&mut self, pos: Point, fps: u8) {
        let mut digits = [0u8; 3];
        let mut first = digits.len();
        let mut n = fps;
        loop {
            first -= 1;
            digits[first] = b'0' + n % 10;
            n /= 10;
            if n == 0 {
                break;
            }
        }
        let text = core::str::from_utf8(&digits[first..]).unwrap_or("?");

        let glyph = FONT_6X10.character_size;
        let width = glyph.width * text.len() as u32;
        self.draw_rectangle(
            pos - Point::new(1, 1),
            Size::new(width + 2, glyph.height + 2),
            Rgb565::BLACK,
        );

        let style = MonoTextStyle::new(&FONT_6X10, fps_color(fps));
        // Drawing into the frame buffer cannot fail.
        let _ = Text::with_baseline(text, pos, style, Baseline::Top).draw(self);
    }
}

/// Green at 30 fps and up, yellow from 15, red below.
pub const fn fps_color(fps: u8) -> Rgb565 {
    if fps >= 30 {
        Rgb565::GREEN
    } else if fps >= 15 {
        Rgb565::YELLOW
    } else {
        Rgb565::RED
    }
}

impl OriginDimensions for Painter<'_> {
    fn size(&self) -> Size {
        self.renderer.resolution
    }
}

/// Draw any `embedded-graphics` drawable into the back buffer.
impl DrawTarget for Painter<'_> {
    type Color = Rgb565;
    type Error = core::convert::Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let resolution = self.renderer.resolution;
        let stride = resolution.width as usize;
        let buffer = self.buffer();
        for Pixel(point, color) in pixels {
            if let Ok((x, y)) = <(u32, u32)>::try_from(point)
                && x < resolution.width
                && y < resolution.height
            {
                buffer[y as usize * stride + x as usize] = color;
            }
        }
        Ok(())
    }

    fn fill_solid(&mut self, area: &Rectangle, color: Self::Color) -> Result<(), Self::Error> {
        self.draw_rectangle(area.top_left, area.size, color);
        Ok(())
    }
}

/// Consumer side: pushes submitted frames to the screen.
pub struct Presenter<'r> {
    renderer: &'r Renderer,
}

impl Presenter<'_> {
    /// Index of the buffer owned by the display path.
    pub fn current_buffer_index(&self) -> u8 {
        self.renderer.pool.current_index()
    }

    /// Wait for a submitted frame and transmit it. Call this in the render loop.
    pub async fn update<S: Screen + ?Sized>(&mut self, screen: &mut S) {
        let renderer = self.renderer;
        renderer.render_fence.wait().await;

        let current = renderer.pool.current_index();
        // SAFETY: the painter advanced `current` before signalling and draws
        // only into the other buffers until `update_fence` is signalled again.
        let pixels = unsafe { renderer.pool.buffer(current) };
        screen.send_screen_buffer(pixels, renderer.pixel_size);

        renderer.update_fence.signal(());
    }
}
