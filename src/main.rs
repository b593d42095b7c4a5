//! Headless driver for native builds.
//!
//! Renders the three orthogonal views of a synthetic volume to PNG, paints
//! a label disc, undoes and redoes it and writes the undo log next to the
//! images.
//!
//! Usage: `voxlab-native [OUT_DIR]`

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use ndarray::Array5;
use thiserror::Error;

use voxlab::config::ViewerConfig;
use voxlab::geometry::PointF;
use voxlab::history::PersistError;
use voxlab::interaction::LogSink;
use voxlab::scene::ImageScene2D;
use voxlab::source::{ColorTable, GrayscaleSource, LabelSource, StackedImageSources};
use voxlab::surface::ImageSurface;
use voxlab::tile::{Pen, ProviderError};
use voxlab::volume::{
    SlicePosition, SliceCoord, Volume, VolumeError, VolumeUpdate, plane_shape,
};
use voxlab::VolumeEditor;

const VOLUME_SHAPE: [usize; 5] = [1, 96, 80, 64, 1];
const RENDER_TIMEOUT: Duration = Duration::from_secs(30);
const LABEL: u8 = 1;

#[derive(Error, Debug)]
enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to write image: {0}")]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Volume(#[from] VolumeError),

    #[error("failed to save history: {0}")]
    Persist(#[from] PersistError),

    #[error("tiles of view {0} did not finish in time")]
    RenderTimeout(usize),
}

/// Concentric shells of intensity around the volume centre.
fn synthetic_raw() -> Volume {
    let [_, nx, ny, nz, _] = VOLUME_SHAPE;
    let centre = [nx as f32 / 2.0, ny as f32 / 2.0, nz as f32 / 2.0];
    let data = Array5::from_shape_fn(VOLUME_SHAPE, |(_, x, y, z, _)| {
        let d = ((x as f32 - centre[0]).powi(2)
            + (y as f32 - centre[1]).powi(2)
            + (z as f32 - centre[2]).powi(2))
        .sqrt();
        (128.0 + 100.0 * (d / 6.0).sin()) as u8
    });
    Volume::from_array(data)
}

/// Filled disc of `label` on z slice `z`, centred at (`cx`, `cy`).
fn disc(cx: usize, cy: usize, z: usize, radius: usize, label: u8) -> VolumeUpdate {
    let size = 2 * radius + 1;
    let data = Array5::from_shape_fn([1, size, size, 1, 1], |(_, u, v, _, _)| {
        let du = u as i64 - radius as i64;
        let dv = v as i64 - radius as i64;
        if du * du + dv * dv <= (radius * radius) as i64 {
            label
        } else {
            0
        }
    });
    VolumeUpdate::new([0, cx - radius, cy - radius, z, 0], data, false)
}

fn render_views(editor: &mut VolumeEditor, out_dir: &Path, tag: &str) -> Result<(), AppError> {
    for index in 0..editor.scenes().len() {
        let Some(scene) = editor.scene_mut(index) else {
            continue;
        };
        let rect = scene.scene_rect();
        let (w, h) = (rect.width as u32, rect.height as u32);

        // First pass queues every tile, the second paints them finished.
        scene.draw_background(&mut ImageSurface::new(w, h), &rect);
        if !scene.wait_for_idle(RENDER_TIMEOUT) {
            return Err(AppError::RenderTimeout(index));
        }
        let mut surface = ImageSurface::new(w, h);
        scene.render(&mut surface, &rect);

        let slice = scene.slice();
        let path = out_dir.join(format!(
            "{}-axis{}-slice{}.png",
            tag, slice.axis, slice.index
        ));
        surface.into_image().save(&path)?;
        log::info!("🖼️ Wrote {:?}", path);
    }
    Ok(())
}

fn run(config: &ViewerConfig, out_dir: &Path) -> Result<(), AppError> {
    std::fs::create_dir_all(out_dir)?;

    let raw = synthetic_raw().into_shared();
    let labels = Volume::zeros(VOLUME_SHAPE).into_shared();
    let interactions = Arc::new(LogSink);
    let mut editor = VolumeEditor::new(
        labels.clone(),
        config.editing.history_size,
        interactions.clone(),
    );

    let settings = config.scene_settings();
    for axis in 0..3 {
        let mut sources = StackedImageSources::new();
        sources.push(Arc::new(GrayscaleSource::new("raw", raw.clone())));
        sources.push_with_opacity(
            Arc::new(LabelSource::new("labels", labels.clone(), ColorTable::default())),
            0.6,
        );
        let mut scene = ImageScene2D::new(
            sources,
            SliceCoord::new(axis, 0, 0, 0),
            &settings,
            interactions.clone(),
        )?;
        scene.set_scene_shape(scene.scene_shape_for(plane_shape(axis, VOLUME_SHAPE)));
        editor.add_scene(scene);
    }
    render_views(&mut editor, out_dir, "0-initial")?;

    let [_, nx, ny, _, _] = VOLUME_SHAPE;
    let z = editor.selectors().current_slice(2);
    let (cx, cy, radius) = (nx / 2, ny / 2, 12);
    if let Some(scene) = editor.scene_mut(2) {
        // Display axes are transposed: display x is data y.
        let from = PointF::new((cy - radius) as f32, cx as f32);
        let to = PointF::new((cy + radius) as f32, cx as f32);
        scene.draw_line(from, to, &Pen::default());
    }
    editor.paint(&disc(cx, cy, z, radius, LABEL), 2, z, LABEL)?;
    render_views(&mut editor, out_dir, "1-painted")?;

    editor.undo()?;
    render_views(&mut editor, out_dir, "2-undone")?;
    editor.redo()?;
    render_views(&mut editor, out_dir, "3-redone")?;

    let path = out_dir.join("history.zip");
    editor.save_history(File::create(&path)?, &config.editing.history_group)?;
    log::info!(
        "💾 Wrote {} history entries to {:?}",
        editor.history().len(),
        path
    );
    Ok(())
}

fn main() {
    let config = ViewerConfig::load_from_default_path().unwrap_or_default();
    env_logger::Builder::new()
        .filter_level(config.log_level.to_level_filter())
        .parse_default_env()
        .init();

    let out_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("voxlab-out"));
    log::info!("🚀 voxlab-native writing to {:?}", out_dir);

    if let Err(e) = run(&config, &out_dir) {
        log::error!("{}", e);
        eprintln!("voxlab-native: {}", e);
        std::process::exit(1);
    }
}
