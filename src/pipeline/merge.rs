//! Document merge: concatenate single-page PDFs in ordinal order.
//!
//! ## How
//!
//! Each input is loaded and its object ids shifted past everything already
//! collected, so ids never clash. Page objects are copied over and
//! re-parented under one fresh page tree; the inputs' own catalogs and page
//! trees are dropped. Attributes a page inherits from its old tree
//! (`MediaBox`, `Resources`) are copied onto the page first, otherwise they
//! would be lost with that tree.
//!
//! ## Cleanup
//!
//! The result is written to a temp file and renamed into place. Inputs are
//! deleted only after that rename succeeds; any earlier failure leaves them
//! untouched. A failed deletion is a warning, not a merge failure.

use crate::error::Sheet2PdfError;
use lopdf::{dictionary, Document, Object, ObjectId};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const INHERITABLE: [&[u8]; 2] = [b"MediaBox", b"Resources"];

/// Merge `inputs` (already in page order) into `destination`.
///
/// Returns the number of pages written. Once the merged document is in
/// place the merge counts as done: an input that cannot be deleted is
/// logged and left behind.
pub async fn merge_documents(inputs: &[PathBuf], destination: &Path) -> Result<usize, Sheet2PdfError> {
    let paths = inputs.to_vec();
    let dest = destination.to_path_buf();
    let (bytes, pages) = tokio::task::spawn_blocking(move || merge_blocking(&paths, &dest))
        .await
        .map_err(|e| Sheet2PdfError::Internal(format!("Merge task panicked: {}", e)))??;

    // Atomic write: write to temp, then rename
    let tmp_path = destination.with_extension("pdf.tmp");
    tokio::fs::write(&tmp_path, &bytes)
        .await
        .map_err(|e| Sheet2PdfError::fs(&tmp_path, e))?;
    tokio::fs::rename(&tmp_path, destination)
        .await
        .map_err(|e| Sheet2PdfError::fs(destination, e))?;
    info!("Wrote {} pages to {}", pages, destination.display());

    for input in inputs {
        if input.as_path() == destination {
            continue;
        }
        if let Err(e) = tokio::fs::remove_file(input).await {
            warn!("Could not remove {}: {}", input.display(), e);
        }
    }
    Ok(pages)
}

fn merge_blocking(inputs: &[PathBuf], destination: &Path) -> Result<(Vec<u8>, usize), Sheet2PdfError> {
    let merge_error = |detail: String| Sheet2PdfError::Merge {
        path: destination.to_path_buf(),
        detail,
    };
    if inputs.is_empty() {
        return Err(merge_error("no documents to merge".into()));
    }

    let mut max_id = 1;
    let mut pages: Vec<(ObjectId, Object)> = Vec::new();
    let mut objects: BTreeMap<ObjectId, Object> = BTreeMap::new();

    for input in inputs {
        let mut doc = Document::load(input)
            .map_err(|e| merge_error(format!("cannot load '{}': {e}", input.display())))?;
        doc.renumber_objects_with(max_id);
        max_id = doc.max_id + 1;

        let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
        for &page_id in &page_ids {
            let mut page = doc
                .get_dictionary(page_id)
                .map_err(|e| merge_error(format!("'{}': {e}", input.display())))?
                .clone();
            for key in INHERITABLE {
                if page.get(key).is_err() {
                    if let Some(value) = inherited(&doc, &page, key) {
                        page.set(key, value);
                    }
                }
            }
            pages.push((page_id, Object::Dictionary(page)));
        }

        for (id, object) in doc.objects {
            if page_ids.contains(&id) {
                continue;
            }
            match object_type(&object) {
                Some(b"Catalog") | Some(b"Pages") | Some(b"Outlines") | Some(b"Outline") => {}
                _ => {
                    objects.insert(id, object);
                }
            }
        }
        debug!("Merged {}", input.display());
    }

    let mut document = Document::with_version("1.5");
    document.max_id = max_id;
    document.objects = objects;
    let pages_id = document.new_object_id();

    let mut kids = Vec::with_capacity(pages.len());
    for (id, object) in pages {
        if let Object::Dictionary(mut page) = object {
            page.set("Parent", pages_id);
            document.objects.insert(id, Object::Dictionary(page));
            kids.push(Object::Reference(id));
        }
    }
    let count = kids.len();
    document.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => Object::Integer(count as i64),
        }),
    );
    let catalog_id = document.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    document.trailer.set("Root", catalog_id);
    document.compress();

    let mut bytes = Vec::new();
    document
        .save_to(&mut bytes)
        .map_err(|e| merge_error(format!("cannot serialise: {e}")))?;
    Ok((bytes, count))
}

/// Walk up the `Parent` chain looking for `key`.
fn inherited(doc: &Document, page: &lopdf::Dictionary, key: &[u8]) -> Option<Object> {
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    // Bounded against malformed cyclic trees.
    for _ in 0..32 {
        let node = doc.get_dictionary(parent?).ok()?;
        if let Ok(value) = node.get(key) {
            return Some(value.clone());
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }
    None
}

fn object_type(object: &Object) -> Option<&[u8]> {
    let dict = match object {
        Object::Dictionary(d) => d,
        Object::Stream(s) => &s.dict,
        _ => return None,
    };
    dict.get(b"Type").and_then(Object::as_name).ok()
}

/// Number of pages in the document at `path`.
pub fn page_count(path: &Path) -> Result<usize, Sheet2PdfError> {
    let doc = Document::load(path).map_err(|e| Sheet2PdfError::Merge {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    Ok(doc.get_pages().len())
}
