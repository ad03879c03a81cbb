//! Vector → raster: render each downloaded SVG to a PNG beside it.
//!
//! ## Why spawn_blocking?
//!
//! Parsing and rendering an SVG is pure CPU work, and a score page with
//! dense engraving can take tens of milliseconds. Running it on the Tokio
//! worker threads would stall every in-flight download and poll of the
//! other jobs, so each render is moved onto the blocking pool.
//!
//! ## Fonts
//!
//! Text in the SVG (titles, lyrics, tempo marks) is shaped against the
//! system font database. Loading it scans the font directories, so it is
//! done once per process and shared by every render.

use crate::config::AssemblyConfig;
use crate::error::Sheet2PdfError;
use crate::output::Stage;
use crate::pipeline::batch::{run_batch, ResourceOutcome, StageReport};
use crate::resource::{Artifact, ArtifactKind};
use once_cell::sync::Lazy;
use resvg::tiny_skia;
use resvg::usvg;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

static FONTS: Lazy<Arc<usvg::fontdb::Database>> = Lazy::new(|| {
    let mut db = usvg::fontdb::Database::new();
    db.load_system_fonts();
    debug!("Loaded {} font faces", db.len());
    Arc::new(db)
});

/// Render SVG bytes to PNG bytes at `scale` × the intrinsic size.
pub fn render_svg(svg: &[u8], scale: f32) -> Result<Vec<u8>, String> {
    let options = usvg::Options {
        fontdb: Arc::clone(&FONTS),
        ..Default::default()
    };
    let tree = usvg::Tree::from_data(svg, &options).map_err(|e| format!("Failed to parse SVG: {e}"))?;

    let size = tree.size();
    let width = (size.width() * scale).ceil() as u32;
    let height = (size.height() * scale).ceil() as u32;
    let mut pixmap = tiny_skia::Pixmap::new(width, height)
        .ok_or_else(|| format!("Cannot allocate a {width}x{height} canvas"))?;

    resvg::render(&tree, tiny_skia::Transform::from_scale(scale, scale), &mut pixmap.as_mut());

    pixmap
        .encode_png()
        .map_err(|e| format!("PNG encoding failed: {e}"))
}

/// Turn one artifact into a raster, deleting the SVG once the PNG exists.
///
/// Rasters and documents pass through untouched.
pub async fn rasterize_file(artifact: &Artifact, scale: f32) -> Result<PathBuf, Sheet2PdfError> {
    let source = artifact.path.clone();
    let bytes = tokio::fs::read(&source)
        .await
        .map_err(|e| Sheet2PdfError::fs(&source, e))?;

    match ArtifactKind::detect(&source, &bytes) {
        ArtifactKind::Vector => {}
        ArtifactKind::Raster | ArtifactKind::Document => return Ok(source),
        ArtifactKind::Unknown => {
            return Err(Sheet2PdfError::Conversion {
                path: source,
                detail: "not an SVG, PNG or JPEG image".into(),
            })
        }
    }

    let png = tokio::task::spawn_blocking(move || render_svg(&bytes, scale))
        .await
        .map_err(|e| Sheet2PdfError::Internal(format!("Rasterize task panicked: {}", e)))?
        .map_err(|detail| Sheet2PdfError::Conversion {
            path: source.clone(),
            detail,
        })?;

    let target = artifact.successor_path("png");
    tokio::fs::write(&target, &png)
        .await
        .map_err(|e| Sheet2PdfError::fs(&target, e))?;
    remove_consumed(&source).await?;

    debug!("Resource #{} rasterised → {}", artifact.ordinal, target.display());
    Ok(target)
}

/// Rasterise every artifact concurrently.
pub async fn rasterize_all(artifacts: Vec<Artifact>, config: &AssemblyConfig) -> StageReport {
    info!("Rasterising {} resources", artifacts.len());
    let scale = config.raster_scale;
    run_batch(Stage::Rasterize, artifacts, config.concurrency, |artifact| async move {
        ResourceOutcome::new(
            artifact.ordinal,
            Stage::Rasterize,
            rasterize_file(&artifact, scale).await,
        )
    })
    .await
}

pub(crate) async fn remove_consumed(path: &Path) -> Result<(), Sheet2PdfError> {
    tokio::fs::remove_file(path)
        .await
        .map_err(|e| Sheet2PdfError::fs(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SQUARE: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="40" height="20">
        <rect x="0" y="0" width="40" height="20" fill="#336699"/>
    </svg>"##;

    #[test]
    fn renders_at_intrinsic_size() {
        let png = render_svg(SQUARE.as_bytes(), 1.0).unwrap();
        let img = image::load_from_memory(&png).unwrap();
        assert_eq!((img.width(), img.height()), (40, 20));
    }

    #[test]
    fn scale_multiplies_size() {
        let png = render_svg(SQUARE.as_bytes(), 2.0).unwrap();
        let img = image::load_from_memory(&png).unwrap();
        assert_eq!((img.width(), img.height()), (80, 40));
    }

    #[test]
    fn rejects_malformed_svg() {
        assert!(render_svg(b"<svg", 1.0).is_err());
    }

    #[tokio::test]
    async fn svg_becomes_png_and_source_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let svg = dir.path().join("000-score_0.svg");
        std::fs::write(&svg, SQUARE).unwrap();

        let png = rasterize_file(&Artifact::new(0, &svg), 1.0).await.unwrap();
        assert_eq!(png, dir.path().join("000-score_0.png"));
        assert!(png.exists());
        assert!(!svg.exists());
    }

    #[tokio::test]
    async fn raster_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("000-page.png");
        image::RgbImage::new(4, 4).save(&path).unwrap();

        let out = rasterize_file(&Artifact::new(0, &path), 1.0).await.unwrap();
        assert_eq!(out, path);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn unknown_content_is_a_conversion_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("000-page");
        std::fs::write(&path, b"<html>not found</html>").unwrap();

        let err = rasterize_file(&Artifact::new(0, &path), 1.0).await.unwrap_err();
        assert!(matches!(err, Sheet2PdfError::Conversion { .. }));
        assert!(path.exists());
    }

    #[tokio::test]
    async fn one_bad_svg_leaves_siblings_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut artifacts = Vec::new();
        for i in 0..5 {
            let path = dir.path().join(format!("{i:03}-score_{i}.svg"));
            let body = if i == 3 { "<svg xmlns=\"http://www.w3.org/2000/svg\"" } else { SQUARE };
            std::fs::write(&path, body).unwrap();
            artifacts.push(Artifact::new(i, path));
        }

        let report = rasterize_all(artifacts, &AssemblyConfig::default()).await;
        assert_eq!(report.failed(), 1);
        assert_eq!(report.errors().next().unwrap().ordinal, 3);

        let pngs = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|x| x == "png"))
            .count();
        assert_eq!(pngs, 4);
        assert!(report.into_artifacts().is_err());
    }
}
