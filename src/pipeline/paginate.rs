//! Raster → document: wrap each image in a one-page PDF.
//!
//! Every page has the configured geometry. The image is scaled to fit
//! (preserving its aspect ratio, upscaling if it is smaller than the page)
//! and centred, so pages of different source sizes line up when merged.

use crate::config::{AssemblyConfig, PageSize};
use crate::error::Sheet2PdfError;
use crate::output::Stage;
use crate::pipeline::batch::{run_batch, ResourceOutcome, StageReport};
use crate::pipeline::rasterize::remove_consumed;
use crate::resource::{Artifact, ArtifactKind};
use image::GenericImageView;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::path::PathBuf;
use tracing::{debug, info};

/// Where an image lands on its page, in PDF points from the bottom-left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Scale a `width` × `height` image to fit `page` and centre it.
pub fn fit_within(width: u32, height: u32, page: PageSize) -> Placement {
    let (w, h) = (width.max(1) as f32, height.max(1) as f32);
    let scale = (page.width / w).min(page.height / h);
    let (sw, sh) = (w * scale, h * scale);
    Placement {
        x: (page.width - sw) / 2.0,
        y: (page.height - sh) / 2.0,
        width: sw,
        height: sh,
    }
}

/// Build the bytes of a one-page PDF showing `raster`.
pub fn build_page(raster: &[u8], page: PageSize) -> Result<Vec<u8>, String> {
    let img = image::load_from_memory(raster).map_err(|e| format!("Failed to decode image: {e}"))?;
    let (width, height) = img.dimensions();

    let mut doc = Document::with_version("1.5");

    let mut image_dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => Object::Integer(width as i64),
        "Height" => Object::Integer(height as i64),
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => 8,
    };
    if img.color().has_alpha() {
        let alpha: Vec<u8> = img.to_rgba8().pixels().map(|p| p.0[3]).collect();
        let smask = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => Object::Integer(width as i64),
                "Height" => Object::Integer(height as i64),
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            alpha,
        );
        image_dict.set("SMask", doc.add_object(smask));
    }
    let image_id = doc.add_object(Stream::new(image_dict, img.to_rgb8().into_raw()));

    let at = fit_within(width, height, page);
    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    at.width.into(),
                    0.into(),
                    0.into(),
                    at.height.into(),
                    at.x.into(),
                    at.y.into(),
                ],
            ),
            Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(
        dictionary! {},
        content.encode().map_err(|e| format!("Failed to encode page content: {e}"))?,
    ));

    let pages_id = doc.new_object_id();
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), page.width.into(), page.height.into()],
        "Contents" => content_id,
        "Resources" => dictionary! {
            "XObject" => dictionary! { "Im0" => image_id },
        },
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|e| format!("Failed to serialise page: {e}"))?;
    Ok(bytes)
}

/// Wrap one raster artifact in a PDF page, deleting the raster afterwards.
///
/// Documents pass through untouched.
pub async fn paginate_file(artifact: &Artifact, page: PageSize) -> Result<PathBuf, Sheet2PdfError> {
    let source = artifact.path.clone();
    let bytes = tokio::fs::read(&source)
        .await
        .map_err(|e| Sheet2PdfError::fs(&source, e))?;

    match ArtifactKind::detect(&source, &bytes) {
        ArtifactKind::Raster => {}
        ArtifactKind::Document => return Ok(source),
        kind => {
            return Err(Sheet2PdfError::Conversion {
                path: source,
                detail: format!("expected a raster image, found {kind:?}"),
            })
        }
    }

    let pdf = tokio::task::spawn_blocking(move || build_page(&bytes, page))
        .await
        .map_err(|e| Sheet2PdfError::Internal(format!("Paginate task panicked: {}", e)))?
        .map_err(|detail| Sheet2PdfError::Conversion {
            path: source.clone(),
            detail,
        })?;

    let target = artifact.successor_path("pdf");
    tokio::fs::write(&target, &pdf)
        .await
        .map_err(|e| Sheet2PdfError::fs(&target, e))?;
    remove_consumed(&source).await?;

    debug!("Resource #{} paginated → {}", artifact.ordinal, target.display());
    Ok(target)
}

/// Paginate every artifact concurrently.
pub async fn paginate_all(artifacts: Vec<Artifact>, config: &AssemblyConfig) -> StageReport {
    info!("Paginating {} resources", artifacts.len());
    let page = config.page_size;
    run_batch(Stage::Paginate, artifacts, config.concurrency, |artifact| async move {
        ResourceOutcome::new(
            artifact.ordinal,
            Stage::Paginate,
            paginate_file(&artifact, page).await,
        )
    })
    .await
}
