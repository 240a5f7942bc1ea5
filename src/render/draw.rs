//! Rasterizers for the back buffer.
//!
//! Every function clips to `[0, resolution)` and silently does nothing when
//! the clipped area is empty.

use core::ops::Range;

use embedded_graphics::{
    pixelcolor::Rgb565,
    prelude::*,
};

/// Fractional bits of the per-row gradient step.
const GRADIENT_FRACTION_BITS: u32 = 16;

/// Clip `pos..pos + size` against the screen. `None` when nothing is left.
pub fn clip(pos: Point, size: Size, resolution: Size) -> Option<(Range<usize>, Range<usize>)> {
    let span = |start: i32, len: u32, bound: u32| {
        let begin = i64::from(start).max(0);
        let end = (i64::from(start) + i64::from(len)).min(i64::from(bound));
        (begin < end).then(|| begin as usize..end as usize)
    };

    let columns = span(pos.x, size.width, resolution.width)?;
    let rows = span(pos.y, size.height, resolution.height)?;
    Some((columns, rows))
}

fn fill_rows(
    buffer: &mut [Rgb565],
    resolution: Size,
    columns: &Range<usize>,
    rows: Range<usize>,
    mut color_at: impl FnMut(usize, &mut [Rgb565]),
) {
    let stride = resolution.width as usize;
    for y in rows {
        let offset = y * stride;
        if let Some(row) = buffer.get_mut(offset + columns.start..offset + columns.end) {
            color_at(y, row);
        }
    }
}

pub fn draw_rectangle(
    buffer: &mut [Rgb565],
    resolution: Size,
    pos: Point,
    size: Size,
    color: Rgb565,
) {
    let Some((columns, rows)) = clip(pos, size, resolution) else {
        return;
    };
    fill_rows(buffer, resolution, &columns, rows, |_, row| row.fill(color));
}

/// Checkerboard of single pixels; the colour of `(x, y)` is `colors[(x + y) & 1]`.
pub fn draw_grid_pattern(
    buffer: &mut [Rgb565],
    resolution: Size,
    pos: Point,
    size: Size,
    colors: [Rgb565; 2],
) {
    let Some((columns, rows)) = clip(pos, size, resolution) else {
        return;
    };
    let first_column = columns.start;
    fill_rows(buffer, resolution, &columns, rows, |y, row| {
        for (i, pixel) in row.iter_mut().enumerate() {
            *pixel = colors[(first_column + i + y) & 1];
        }
    });
}

/// Linear top-to-bottom blend from `colors[0]` to `colors[1]`.
///
/// The interpolation always spans the full requested height, so a gradient
/// partially off screen keeps its slope. Row `pos.y` is exactly `colors[0]`;
/// the last row is within one quantization step of `colors[1]`.
pub fn draw_vertical_gradient(
    buffer: &mut [Rgb565],
    resolution: Size,
    pos: Point,
    size: Size,
    colors: [Rgb565; 2],
) {
    let Some((columns, rows)) = clip(pos, size, resolution) else {
        return;
    };

    let start = channels(colors[0]);
    let end = channels(colors[1]);
    let span = i64::from(size.height.saturating_sub(1).max(1));
    let step = [0usize, 1, 2].map(|i| ((end[i] - start[i]) << GRADIENT_FRACTION_BITS) / span);

    fill_rows(buffer, resolution, &columns, rows, |y, row| {
        let t = y as i64 - i64::from(pos.y);
        let [r, g, b] = [0usize, 1, 2].map(|i| {
            let acc = (start[i] << GRADIENT_FRACTION_BITS) + step[i] * t;
            let rounded = (acc + (1 << (GRADIENT_FRACTION_BITS - 1))) >> GRADIENT_FRACTION_BITS;
            rounded.clamp(0, i64::from(u8::MAX)) as u8
        });
        row.fill(Rgb565::new(
            r.min(Rgb565::MAX_R),
            g.min(Rgb565::MAX_G),
            b.min(Rgb565::MAX_B),
        ));
    });
}

fn channels(color: Rgb565) -> [i64; 3] {
    [
        i64::from(color.r()),
        i64::from(color.g()),
        i64::from(color.b()),
    ]
}

#[cfg(test)]
mod tests {
    use embedded_graphics::pixelcolor::IntoStorage;

    use super::*;

    const RES: Size = Size::new(8, 6);

    fn screen() -> Vec<Rgb565> {
        vec![Rgb565::BLACK; (RES.width * RES.height) as usize]
    }

    fn checksum(buffer: &[Rgb565]) -> u64 {
        buffer
            .iter()
            .enumerate()
            .map(|(i, c)| (i as u64 + 1) * u64::from(c.into_storage()))
            .sum()
    }

    fn pixel(buffer: &[Rgb565], x: usize, y: usize) -> Rgb565 {
        buffer[y * RES.width as usize + x]
    }

    #[test]
    fn rectangle_is_clipped_to_the_screen() {
        let mut buf = screen();
        draw_rectangle(&mut buf, RES, Point::new(6, 4), Size::new(10, 10), Rgb565::RED);

        let red = buf.iter().filter(|&&c| c == Rgb565::RED).count();
        assert_eq!(red, 2 * 2);
        assert_eq!(pixel(&buf, 7, 5), Rgb565::RED);
        assert_eq!(pixel(&buf, 5, 5), Rgb565::BLACK);
    }

    #[test]
    fn rectangle_outside_the_screen_leaves_buffer_untouched() {
        let mut buf = screen();
        draw_grid_pattern(&mut buf, RES, Point::zero(), RES, [Rgb565::WHITE, Rgb565::BLUE]);
        let before = checksum(&buf);

        draw_rectangle(&mut buf, RES, Point::new(8, 0), Size::new(3, 3), Rgb565::RED);
        draw_rectangle(&mut buf, RES, Point::new(0, 6), Size::new(3, 3), Rgb565::RED);
        draw_rectangle(&mut buf, RES, Point::new(100, 100), Size::new(3, 3), Rgb565::RED);
        draw_rectangle(&mut buf, RES, Point::new(2, 2), Size::zero(), Rgb565::RED);

        assert_eq!(checksum(&buf), before);
    }

    #[test]
    fn negative_origin_is_clipped_from_the_top_left() {
        let mut buf = screen();
        draw_rectangle(&mut buf, RES, Point::new(-2, -2), Size::new(3, 3), Rgb565::GREEN);
        assert_eq!(pixel(&buf, 0, 0), Rgb565::GREEN);
        assert_eq!(pixel(&buf, 1, 0), Rgb565::BLACK);
        assert_eq!(pixel(&buf, 0, 1), Rgb565::BLACK);
    }

    #[test]
    fn grid_pattern_alternates_in_screen_coordinates() {
        let mut buf = screen();
        let colors = [Rgb565::WHITE, Rgb565::BLUE];
        draw_grid_pattern(&mut buf, RES, Point::new(1, 1), Size::new(3, 2), colors);

        assert_eq!(pixel(&buf, 1, 1), colors[0]);
        assert_eq!(pixel(&buf, 2, 1), colors[1]);
        assert_eq!(pixel(&buf, 1, 2), colors[1]);
        assert_eq!(pixel(&buf, 2, 2), colors[0]);
        assert_eq!(pixel(&buf, 0, 0), Rgb565::BLACK);
    }

    #[test]
    fn gradient_hits_both_endpoints() {
        let res = Size::new(4, 64);
        let mut buf = vec![Rgb565::BLACK; (res.width * res.height) as usize];
        let top = Rgb565::new(3, 60, 31);
        let bottom = Rgb565::new(29, 1, 0);

        draw_vertical_gradient(&mut buf, res, Point::new(0, 5), Size::new(4, 50), [top, bottom]);

        let row = |y: usize| buf[y * res.width as usize];
        assert_eq!(row(5), top);

        let last = row(54);
        assert!(last.r().abs_diff(bottom.r()) <= 1);
        assert!(last.g().abs_diff(bottom.g()) <= 1);
        assert!(last.b().abs_diff(bottom.b()) <= 1);
        assert_eq!(row(4), Rgb565::BLACK);
        assert_eq!(row(55), Rgb565::BLACK);
    }

    #[test]
    fn gradient_is_monotonic_per_channel() {
        let res = Size::new(1, 40);
        let mut buf = vec![Rgb565::BLACK; 40];
        draw_vertical_gradient(
            &mut buf,
            res,
            Point::zero(),
            res,
            [Rgb565::new(0, 63, 0), Rgb565::new(31, 0, 31)],
        );

        for pair in buf.windows(2) {
            assert!(pair[1].r() >= pair[0].r());
            assert!(pair[1].g() <= pair[0].g());
            assert!(pair[1].b() >= pair[0].b());
        }
    }

    #[test]
    fn one_row_gradient_uses_the_first_colour() {
        let mut buf = screen();
        draw_vertical_gradient(
            &mut buf,
            RES,
            Point::new(0, 3),
            Size::new(8, 1),
            [Rgb565::CYAN, Rgb565::RED],
        );
        assert!((0..8).all(|x| pixel(&buf, x, 3) == Rgb565::CYAN));
    }
}
