use std::error::Error;
use std::path::Path;

use image::{GrayImage, Luma};
use nalgebra::DMatrix;
use plotters::prelude::*;

use crate::density::DensityGrid;
use crate::training::TrainingLog;
use crate::util::{MlError, Result};

/// One 3D surface per grid, side by side in a single figure.
pub fn plot_density_surfaces(path: &Path, grids: &[(String, DensityGrid)]) -> std::result::Result<(), Box<dyn Error>> {
    let root = BitMapBackend::new(path, (540 * grids.len().max(1) as u32, 520)).into_drawing_area();
    root.fill(&WHITE)?;

    let areas = root.split_evenly((1, grids.len().max(1)));
    let colors = [BLUE, GREEN, RED, MAGENTA, CYAN];

    for (i, ((label, grid), area)) in grids.iter().zip(areas.iter()).enumerate() {
        let (x0, x1) = (grid.xs[0], grid.xs[grid.xs.len() - 1]);
        let (y0, y1) = (grid.ys[0], grid.ys[grid.ys.len() - 1]);
        let top = grid.max() * 1.05;

        // plotters' 3d coordinates are (x, vertical, depth)
        let mut chart = ChartBuilder::on(area)
            .caption(label, ("sans-serif", 18).into_font())
            .margin(10)
            .build_cartesian_3d(x0..x1, 0.0..top, y0..y1)?;

        chart.with_projection(|mut pb| {
            pb.yaw = 0.6;
            pb.pitch = 0.4;
            pb.scale = 0.85;
            pb.into_matrix()
        });

        chart
            .configure_axes()
            .light_grid_style(BLACK.mix(0.1))
            .max_light_lines(3)
            .draw()?;

        let color = colors[i % colors.len()];
        chart.draw_series(
            SurfaceSeries::xoz(
                grid.xs.iter().copied(),
                grid.ys.iter().copied(),
                |x, y| grid.value_near(x, y),
            )
            .style(color.mix(0.4).filled()),
        )?;
    }

    root.present()?;
    Ok(())
}

/// Per-step loss on top, per-epoch accuracies below.
pub fn plot_training_log(path: &Path, log: &TrainingLog) -> std::result::Result<(), Box<dyn Error>> {
    let root = BitMapBackend::new(path, (1080, 720)).into_drawing_area();
    root.fill(&WHITE)?;
    let (upper, lower) = root.split_vertically(360);

    let max_loss = log.losses.iter().copied().filter(|l| l.is_finite()).fold(0.0, f64::max);
    let mut chart = ChartBuilder::on(&upper)
        .caption("Training Loss", ("sans-serif", 20).into_font())
        .margin(3)
        .x_label_area_size(30)
        .y_label_area_size(50)
        .build_cartesian_2d(0f32..log.losses.len().max(1) as f32, 0f32..(max_loss as f32 * 1.05).max(1e-3))?;

    chart.configure_mesh().x_desc("Step").y_desc("Cross-Entropy").draw()?;
    chart.draw_series(LineSeries::new(
        log.losses.iter().enumerate().map(|(i, &l)| (i as f32, l as f32)),
        RED.stroke_width(1),
    ))?;

    let epochs = log.train_accuracy.len();
    let mut chart = ChartBuilder::on(&lower)
        .caption("Accuracy", ("sans-serif", 20).into_font())
        .margin(3)
        .x_label_area_size(30)
        .y_label_area_size(50)
        .build_cartesian_2d(1f32..epochs.max(2) as f32, 0f32..1f32)?;

    chart.configure_mesh().x_desc("Epoch").y_desc("Accuracy").draw()?;

    let series = [("train", &log.train_accuracy, GREEN.filled()), ("test", &log.test_accuracy, BLUE.filled())];
    for (label, values, color) in series {
        chart
            .draw_series(LineSeries::new(
                values.iter().enumerate().map(|(i, &a)| ((i + 1) as f32, a as f32)),
                color.stroke_width(2),
            ))?
            .label(label)
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], color));
    }
    chart.configure_series_labels().border_style(BLACK).draw()?;

    root.present()?;
    Ok(())
}

/// Tile the first `count` rows of `images` (each `width * height` pixels)
/// into a grayscale sheet with `columns` tiles per row. Pixel values are
/// rescaled to the full 0..255 range of the sheet.
pub fn save_digit_grid(
    path: &Path,
    images: &DMatrix<f64>,
    count: usize,
    width: usize,
    height: usize,
    columns: usize,
) -> Result<()> {
    let count = count.min(images.nrows());
    if count == 0 {
        Err(MlError::EmptyDataset)?
    }
    let columns = columns.max(1);
    let rows = count.div_ceil(columns).max(1);

    let shown = images.rows(0, count);
    let min = shown.min();
    let range = (shown.max() - min).max(f64::EPSILON);

    let mut sheet = GrayImage::new((columns * width) as u32, (rows * height) as u32);
    for (n, image) in shown.row_iter().enumerate() {
        let (ox, oy) = ((n % columns) * width, (n / columns) * height);
        for (i, &v) in image.iter().enumerate() {
            let pixel = ((v - min) / range * 255.0).round() as u8;
            sheet.put_pixel((ox + i % width) as u32, (oy + i / width) as u32, Luma([pixel]));
        }
    }

    sheet.save(path)?;
    Ok(())
}
