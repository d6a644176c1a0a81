//! Structural PDF operations: page-for-page copy and merge.
//!
//! Both operations move whole page objects between documents with lopdf and
//! never decode or re-encode page content. Copying a document through
//! [`structural_copy`] therefore leaves every content stream byte-identical,
//! which is what the lowest pipeline tier relies on.
//!
//! ## Inherited page attributes
//!
//! `MediaBox`, `CropBox`, `Resources` and `Rotate` may live on an ancestor
//! `Pages` node instead of the page itself. The source page tree is dropped
//! when pages move into the new document, so those attributes are copied down
//! onto each page first.

use crate::error::ToneError;
use crate::output::{write_atomic, MergeSummary};
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const INHERITABLE_KEYS: [&[u8]; 4] = [b"MediaBox", b"CropBox", b"Resources", b"Rotate"];

/// Guard against cyclic `Parent` chains in malformed files.
const MAX_TREE_DEPTH: usize = 64;

/// Parse a PDF with lopdf, mapping failures to [`ToneError::CorruptPdf`].
pub fn load_pdf(path: &Path) -> Result<Document, ToneError> {
    if !path.exists() {
        return Err(ToneError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    Document::load(path).map_err(|e| ToneError::CorruptPdf {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}

/// Number of pages in the PDF at `path`.
pub fn page_count(path: &Path) -> Result<usize, ToneError> {
    Ok(load_pdf(path)?.get_pages().len())
}

/// Copy every page of `source` into a new document written to `dest`.
///
/// No pixel transform is applied. Returns the number of pages copied.
pub fn structural_copy(source: &Path, dest: &Path) -> Result<usize, ToneError> {
    let doc = load_pdf(source)?;
    let mut copy = concatenate(vec![doc]).map_err(|e| ToneError::Composition(e.to_string()))?;
    let pages = copy.get_pages().len();

    let bytes = save_to_vec(&mut copy)?;
    write_atomic(dest, &bytes)?;
    debug!(
        "Structural copy {} → {} ({} pages)",
        source.display(),
        dest.display(),
        pages
    );
    Ok(pages)
}

/// Concatenate the pages of `paths`, in the given order, into `dest`.
///
/// A single input is copied through. The merged document is built fully in
/// memory and written atomically, so a failed merge leaves no output.
pub fn merge_pdfs(paths: &[PathBuf], dest: &Path) -> Result<MergeSummary, ToneError> {
    merge_pdfs_with_progress(paths, dest, |_, _| {})
}

/// [`merge_pdfs`], calling `on_input(index, path)` before each input is read.
pub fn merge_pdfs_with_progress(
    paths: &[PathBuf],
    dest: &Path,
    mut on_input: impl FnMut(usize, &Path),
) -> Result<MergeSummary, ToneError> {
    if paths.is_empty() {
        return Err(ToneError::Validation("no PDF files to merge".into()));
    }

    let mut documents = Vec::with_capacity(paths.len());
    for (index, path) in paths.iter().enumerate() {
        on_input(index, path);
        if !path.exists() {
            return Err(ToneError::Merge {
                path: path.clone(),
                detail: "file not found".into(),
            });
        }
        let doc = Document::load(path).map_err(|e| ToneError::Merge {
            path: path.clone(),
            detail: e.to_string(),
        })?;
        debug!("Loaded {} ({} pages)", path.display(), doc.get_pages().len());
        documents.push(doc);
    }

    let mut merged = concatenate(documents).map_err(|e| ToneError::Composition(e.to_string()))?;
    merged.compress();
    let total_pages = merged.get_pages().len();

    let bytes = save_to_vec(&mut merged)?;
    write_atomic(dest, &bytes)?;
    info!(
        "Merged {} files ({} pages) → {}",
        paths.len(),
        total_pages,
        dest.display()
    );

    Ok(MergeSummary {
        output: dest.to_path_buf(),
        input_files: paths.len(),
        total_pages,
    })
}

/// Serialize a document into memory.
pub(crate) fn save_to_vec(doc: &mut Document) -> Result<Vec<u8>, ToneError> {
    let mut out = Vec::new();
    doc.save_to(&mut out)
        .map_err(|e| ToneError::Composition(format!("failed to serialize PDF: {e}")))?;
    Ok(out)
}

// ── Page-tree surgery ─────────────────────────────────────────────────────

/// Build one document holding every page of `documents`, in order.
fn concatenate(documents: Vec<Document>) -> lopdf::Result<Document> {
    let version = documents
        .first()
        .map(|d| d.version.clone())
        .unwrap_or_else(|| "1.5".to_string());

    let mut max_id = 1;
    let mut pages: Vec<(ObjectId, Dictionary)> = Vec::new();
    let mut objects: BTreeMap<ObjectId, Object> = BTreeMap::new();

    for mut doc in documents {
        doc.renumber_objects_with(max_id);
        max_id = doc.max_id + 1;

        // get_pages is keyed by page number, so values come in page order.
        for page_id in doc.get_pages().into_values() {
            let mut page = doc.get_dictionary(page_id)?.clone();
            for key in INHERITABLE_KEYS {
                if page.has(key) {
                    continue;
                }
                if let Some(value) = inherited_attribute(&doc, &page, key) {
                    page.set(key, value);
                }
            }
            pages.push((page_id, page));
        }

        for (id, object) in doc.objects {
            match object.type_name().unwrap_or("") {
                "Catalog" | "Pages" | "Page" | "Outlines" | "Outline" => {}
                _ => {
                    objects.insert(id, object);
                }
            }
        }
    }

    let mut document = Document::with_version(version);
    document.objects = objects;
    document.max_id = max_id;

    let pages_id = document.new_object_id();
    let mut kids = Vec::with_capacity(pages.len());
    for (page_id, mut page) in pages {
        page.set("Parent", Object::Reference(pages_id));
        document.objects.insert(page_id, Object::Dictionary(page));
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    document.objects.insert(
        pages_id,
        Object::Dictionary(Dictionary::from_iter([
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Kids", Object::Array(kids)),
            ("Count", Object::Integer(count)),
        ])),
    );

    let catalog_id = document.add_object(Dictionary::from_iter([
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]));
    document.trailer.set("Root", Object::Reference(catalog_id));

    document.renumber_objects();
    Ok(document)
}

/// Look up `key` on the ancestors of `page`.
fn inherited_attribute(doc: &Document, page: &Dictionary, key: &[u8]) -> Option<Object> {
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    let mut depth = 0;
    while let Some(id) = parent {
        depth += 1;
        if depth > MAX_TREE_DEPTH {
            break;
        }
        let node = doc.get_dictionary(id).ok()?;
        if let Ok(value) = node.get(key) {
            return Some(value.clone());
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::Stream;

    /// One page per label, each page drawing its label as text. With
    /// `inherit_media_box` the MediaBox sits on the page tree root only.
    fn fixture(labels: &[&str], inherit_media_box: bool) -> Document {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(Dictionary::from_iter([
            ("Type", Object::Name(b"Font".to_vec())),
            ("Subtype", Object::Name(b"Type1".to_vec())),
            ("BaseFont", Object::Name(b"Helvetica".to_vec())),
        ]));
        let resources_id = doc.add_object(Dictionary::from_iter([(
            "Font",
            Object::Dictionary(Dictionary::from_iter([("F1", Object::Reference(font_id))])),
        )]));

        let mut kids = Vec::new();
        for label in labels {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 24.into()]),
                    Operation::new("Td", vec![72.into(), 700.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*label)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(Dictionary::new(), content.encode().unwrap()));
            let mut page = Dictionary::from_iter([
                ("Type", Object::Name(b"Page".to_vec())),
                ("Parent", Object::Reference(pages_id)),
                ("Contents", Object::Reference(content_id)),
                ("Resources", Object::Reference(resources_id)),
            ]);
            if !inherit_media_box {
                page.set(
                    "MediaBox",
                    Object::Array(vec![0.into(), 0.into(), 612.into(), 792.into()]),
                );
            }
            kids.push(Object::Reference(doc.add_object(page)));
        }

        let mut tree = Dictionary::from_iter([
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Count", Object::Integer(kids.len() as i64)),
            ("Kids", Object::Array(kids)),
        ]);
        if inherit_media_box {
            tree.set(
                "MediaBox",
                Object::Array(vec![0.into(), 0.into(), 300.into(), 400.into()]),
            );
        }
        doc.objects.insert(pages_id, Object::Dictionary(tree));
        let catalog_id = doc.add_object(Dictionary::from_iter([
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(pages_id)),
        ]));
        doc.trailer.set("Root", Object::Reference(catalog_id));
        doc
    }

    fn write_fixture(dir: &Path, name: &str, labels: &[&str]) -> PathBuf {
        let path = dir.join(name);
        fixture(labels, false).save(&path).unwrap();
        path
    }

    fn page_texts(path: &Path) -> Vec<String> {
        let doc = Document::load(path).unwrap();
        doc.get_pages()
            .into_values()
            .map(|id| String::from_utf8_lossy(&doc.get_page_content(id).unwrap()).into_owned())
            .collect()
    }

    #[test]
    fn page_count_reads_tree() {
        let dir = tempfile::tempdir().unwrap();
        let p = write_fixture(dir.path(), "three.pdf", &["p1", "p2", "p3"]);
        assert_eq!(page_count(&p).unwrap(), 3);
    }

    #[test]
    fn load_rejects_non_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("fake.pdf");
        std::fs::write(&p, b"hello").unwrap();
        assert!(matches!(load_pdf(&p), Err(ToneError::CorruptPdf { .. })));
    }

    #[test]
    fn structural_copy_keeps_content_streams() {
        let dir = tempfile::tempdir().unwrap();
        let src = write_fixture(dir.path(), "in.pdf", &["alpha", "beta"]);
        let dest = dir.path().join("out.pdf");

        assert_eq!(structural_copy(&src, &dest).unwrap(), 2);

        let before = Document::load(&src).unwrap();
        let after = Document::load(&dest).unwrap();
        let raw = |doc: &Document| -> Vec<Vec<u8>> {
            doc.get_pages()
                .into_values()
                .flat_map(|id| doc.get_page_contents(id))
                .map(|cid| doc.get_object(cid).unwrap().as_stream().unwrap().content.clone())
                .collect()
        };
        assert_eq!(raw(&before), raw(&after));
    }

    #[test]
    fn merge_appends_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_fixture(dir.path(), "a.pdf", &["a1", "a2"]);
        let b = write_fixture(dir.path(), "b.pdf", &["b1"]);
        let c = write_fixture(dir.path(), "c.pdf", &["c1", "c2", "c3"]);
        let dest = dir.path().join("merged.pdf");

        let summary = merge_pdfs(&[b.clone(), a, c], &dest).unwrap();
        assert_eq!(summary.total_pages, 6);
        assert_eq!(summary.input_files, 3);

        let texts = page_texts(&dest);
        let expected = ["b1", "a1", "a2", "c1", "c2", "c3"];
        assert_eq!(texts.len(), expected.len());
        for (text, label) in texts.iter().zip(expected) {
            assert!(text.contains(label), "expected {label} in {text}");
        }
    }

    #[test]
    fn merge_rebuilds_a_single_catalog_and_page_tree() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_fixture(dir.path(), "a.pdf", &["a1"]);
        let b = write_fixture(dir.path(), "b.pdf", &["b1", "b2"]);
        let dest = dir.path().join("merged.pdf");
        merge_pdfs(&[a, b], &dest).unwrap();

        let doc = Document::load(&dest).unwrap();
        let count = |kind: &str| {
            doc.objects
                .values()
                .filter(|o| o.type_name().ok() == Some(kind))
                .count()
        };
        assert_eq!(count("Catalog"), 1);
        assert_eq!(count("Pages"), 1);
        assert_eq!(count("Page"), 3);

        let root = doc.trailer.get(b"Root").and_then(Object::as_reference).unwrap();
        let pages_id = doc
            .get_dictionary(root)
            .and_then(|c| c.get(b"Pages"))
            .and_then(Object::as_reference)
            .unwrap();
        let kids = doc.get_dictionary(pages_id).unwrap().get(b"Kids").unwrap();
        assert_eq!(kids.as_array().unwrap().len(), 3);
    }

    #[test]
    fn merge_single_file_copies_through() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_fixture(dir.path(), "a.pdf", &["only"]);
        let dest = dir.path().join("merged.pdf");
        let summary = merge_pdfs(&[a], &dest).unwrap();
        assert_eq!(summary.total_pages, 1);
        assert!(page_texts(&dest)[0].contains("only"));
    }

    #[test]
    fn merge_copies_inherited_media_box() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("inherit.pdf");
        fixture(&["x"], true).save(&a).unwrap();
        let b = write_fixture(dir.path(), "b.pdf", &["y"]);
        let dest = dir.path().join("merged.pdf");
        merge_pdfs(&[a, b], &dest).unwrap();

        let doc = Document::load(&dest).unwrap();
        let first = *doc.get_pages().get(&1).unwrap();
        let media_box = doc
            .get_dictionary(first)
            .unwrap()
            .get(b"MediaBox")
            .unwrap()
            .as_array()
            .unwrap()
            .clone();
        assert_eq!(media_box[3].as_i64().unwrap(), 400);
    }

    #[test]
    fn merge_failure_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_fixture(dir.path(), "a.pdf", &["a1"]);
        let bad = dir.path().join("bad.pdf");
        std::fs::write(&bad, b"%PDF-1.4 garbage").unwrap();
        let dest = dir.path().join("merged.pdf");

        let err = merge_pdfs(&[a, bad.clone()], &dest).unwrap_err();
        match err {
            ToneError::Merge { path, .. } => assert_eq!(path, bad),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!dest.exists());
    }

    #[test]
    fn merge_missing_input_is_merge_error() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("merged.pdf");
        let err = merge_pdfs(&[dir.path().join("nope.pdf")], &dest).unwrap_err();
        assert!(matches!(err, ToneError::Merge { .. }));
    }

    #[test]
    fn merge_nothing_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = merge_pdfs(&[], &dir.path().join("m.pdf")).unwrap_err();
        assert!(matches!(err, ToneError::Validation(_)));
    }
}
