//! Page composer: build PDFs whose pages each show one raster image.
//!
//! Used for rasters that come from outside pdfium (the `pdftoppm` tier) and
//! for wrapping standalone images as PDFs. Each raster becomes an image
//! XObject (`DeviceGray` for single-channel input, `DeviceRGB` otherwise,
//! Flate-compressed) drawn by a `q … cm /Im0 Do Q` content stream.

use crate::config::PageFormat;
use crate::error::ToneError;
use crate::pipeline::structure::save_to_vec;
use image::DynamicImage;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use tracing::debug;

/// Resolution assumed when an image is wrapped as a PDF on its own.
pub const IMAGE_PAGE_DPI: f32 = 100.0;

/// Placement of an image on a page, in points from the bottom-left corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Largest rectangle with the image's aspect ratio that fits inside the page
/// minus `margin` on every side, centered both ways.
pub fn fit_centered(
    image_width: u32,
    image_height: u32,
    page_width: f32,
    page_height: f32,
    margin: f32,
) -> Rect {
    let avail_w = (page_width - 2.0 * margin).max(0.0);
    let avail_h = (page_height - 2.0 * margin).max(0.0);
    let (iw, ih) = (image_width.max(1) as f32, image_height.max(1) as f32);

    let scale = (avail_w / iw).min(avail_h / ih);
    let width = iw * scale;
    let height = ih * scale;
    Rect {
        x: (page_width - width) / 2.0,
        y: (page_height - height) / 2.0,
        width,
        height,
    }
}

/// Incrementally built document of image pages.
pub struct PageComposer {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<Object>,
}

impl Default for PageComposer {
    fn default() -> Self {
        Self::new()
    }
}

impl PageComposer {
    pub fn new() -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            kids: Vec::new(),
        }
    }

    pub fn page_count(&self) -> usize {
        self.kids.len()
    }

    /// Append a `page_width` × `page_height` page showing `image` at `rect`.
    pub fn add_image_page(
        &mut self,
        image: &DynamicImage,
        page_width: f32,
        page_height: f32,
        rect: Rect,
    ) -> Result<(), ToneError> {
        let image_id = self.doc.add_object(image_xobject(image)?);

        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        rect.width.into(),
                        0.into(),
                        0.into(),
                        rect.height.into(),
                        rect.x.into(),
                        rect.y.into(),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let bytes = content
            .encode()
            .map_err(|e| ToneError::Composition(format!("content stream: {e}")))?;
        let content_id = self.doc.add_object(Stream::new(Dictionary::new(), bytes));

        let resources = Dictionary::from_iter([(
            "XObject",
            Object::Dictionary(Dictionary::from_iter([("Im0", Object::Reference(image_id))])),
        )]);
        let page_id = self.doc.add_object(Dictionary::from_iter([
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(self.pages_id)),
            (
                "MediaBox",
                Object::Array(vec![0.into(), 0.into(), page_width.into(), page_height.into()]),
            ),
            ("Contents", Object::Reference(content_id)),
            ("Resources", Object::Dictionary(resources)),
        ]));
        self.kids.push(Object::Reference(page_id));
        Ok(())
    }

    /// Close the page tree and serialize the document.
    pub fn finish(mut self) -> Result<Vec<u8>, ToneError> {
        if self.kids.is_empty() {
            return Err(ToneError::Composition("document has no pages".into()));
        }
        let count = self.kids.len() as i64;
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(Dictionary::from_iter([
                ("Type", Object::Name(b"Pages".to_vec())),
                ("Kids", Object::Array(self.kids)),
                ("Count", Object::Integer(count)),
            ])),
        );
        let catalog_id = self.doc.add_object(Dictionary::from_iter([
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(self.pages_id)),
        ]));
        self.doc.trailer.set("Root", Object::Reference(catalog_id));
        save_to_vec(&mut self.doc)
    }
}

/// Flate-compressed image XObject for `image`.
fn image_xobject(image: &DynamicImage) -> Result<Stream, ToneError> {
    let (width, height) = (image.width(), image.height());
    let (color_space, data): (&[u8], Vec<u8>) = match image {
        DynamicImage::ImageLuma8(gray) => (b"DeviceGray", gray.as_raw().clone()),
        other => (b"DeviceRGB", other.to_rgb8().into_raw()),
    };

    let dict = Dictionary::from_iter([
        ("Type", Object::Name(b"XObject".to_vec())),
        ("Subtype", Object::Name(b"Image".to_vec())),
        ("Width", Object::Integer(width as i64)),
        ("Height", Object::Integer(height as i64)),
        ("ColorSpace", Object::Name(color_space.to_vec())),
        ("BitsPerComponent", Object::Integer(8)),
    ]);
    let mut stream = Stream::new(dict, data);
    stream
        .compress()
        .map_err(|e| ToneError::Composition(format!("image compression: {e}")))?;
    Ok(stream)
}

/// Compose one fixed-format page per raster, each fitted inside `margin` and
/// centered. Pages keep the order of `rasters`.
pub fn compose_rasters(
    rasters: &[DynamicImage],
    format: PageFormat,
    margin: f32,
) -> Result<Vec<u8>, ToneError> {
    let (page_w, page_h) = format.dimensions();
    let mut composer = PageComposer::new();
    for (i, raster) in rasters.iter().enumerate() {
        let rect = fit_centered(raster.width(), raster.height(), page_w, page_h, margin);
        debug!(
            "Page {}: {}x{} px → {:.1}x{:.1} pt at ({:.1}, {:.1})",
            i + 1,
            raster.width(),
            raster.height(),
            rect.width,
            rect.height,
            rect.x,
            rect.y
        );
        composer.add_image_page(raster, page_w, page_h, rect)?;
    }
    composer.finish()
}

/// Wrap one image as a single-page PDF whose page matches the image size at
/// `dpi`.
pub fn image_to_pdf(image: &DynamicImage, dpi: f32) -> Result<Vec<u8>, ToneError> {
    let page_w = image.width() as f32 * 72.0 / dpi;
    let page_h = image.height() as f32 * 72.0 / dpi;
    let rect = Rect {
        x: 0.0,
        y: 0.0,
        width: page_w,
        height: page_h,
    };
    let mut composer = PageComposer::new();
    composer.add_image_page(image, page_w, page_h, rect)?;
    composer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage};

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 0.01
    }

    #[test]
    fn fit_portrait_raster_on_letter() {
        // 200 DPI letter scan: 1700x2200 px.
        let r = fit_centered(1700, 2200, 612.0, 792.0, 20.0);
        let scale = (572.0f32 / 1700.0).min(752.0 / 2200.0);
        assert!(approx(r.width, 1700.0 * scale));
        assert!(approx(r.height, 2200.0 * scale));
        assert!(approx(r.x, (612.0 - r.width) / 2.0));
        assert!(approx(r.y, (792.0 - r.height) / 2.0));
        assert!(r.x >= 20.0 - 0.01 && r.y >= 20.0 - 0.01);
    }

    #[test]
    fn fit_landscape_is_width_bound() {
        let r = fit_centered(2000, 1000, 612.0, 792.0, 20.0);
        assert!(approx(r.width, 572.0));
        assert!(approx(r.height, 286.0));
        assert!(approx(r.x, 20.0));
        assert!(approx(r.y, (792.0 - 286.0) / 2.0));
    }

    #[test]
    fn compose_emits_one_page_per_raster() {
        let rasters = vec![
            DynamicImage::ImageLuma8(GrayImage::from_pixel(10, 20, Luma([128]))),
            DynamicImage::ImageRgb8(RgbImage::from_pixel(30, 10, Rgb([200, 150, 100]))),
        ];
        let bytes = compose_rasters(&rasters, PageFormat::Letter, 20.0).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        let pages = doc.get_pages();
        assert_eq!(pages.len(), 2);

        for page_id in pages.values() {
            let page = doc.get_dictionary(*page_id).unwrap();
            let mb = page.get(b"MediaBox").unwrap().as_array().unwrap();
            assert_eq!(mb[2].as_float().unwrap(), 612.0);
            assert_eq!(mb[3].as_float().unwrap(), 792.0);
        }

        assert_eq!(image_color_space(&doc, pages[&1]), b"DeviceGray");
        assert_eq!(image_color_space(&doc, pages[&2]), b"DeviceRGB");
    }

    fn image_color_space(doc: &Document, page_id: ObjectId) -> Vec<u8> {
        let page = doc.get_dictionary(page_id).unwrap();
        let xobjects = page
            .get(b"Resources")
            .and_then(Object::as_dict)
            .and_then(|r| r.get(b"XObject"))
            .and_then(Object::as_dict)
            .unwrap();
        let image_id = xobjects.get(b"Im0").and_then(Object::as_reference).unwrap();
        let stream = doc.get_object(image_id).and_then(Object::as_stream).unwrap();
        stream
            .dict
            .get(b"ColorSpace")
            .and_then(Object::as_name)
            .unwrap()
            .to_vec()
    }

    #[test]
    fn image_page_uses_hundred_dpi() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(850, 1100));
        let bytes = image_to_pdf(&img, IMAGE_PAGE_DPI).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        let page_id = doc.get_pages()[&1];
        let mb = doc
            .get_dictionary(page_id)
            .unwrap()
            .get(b"MediaBox")
            .unwrap()
            .as_array()
            .unwrap()
            .clone();
        assert!(approx(mb[2].as_float().unwrap(), 612.0));
        assert!(approx(mb[3].as_float().unwrap(), 792.0));
    }

    #[test]
    fn empty_document_is_rejected() {
        assert!(matches!(
            PageComposer::new().finish(),
            Err(ToneError::Composition(_))
        ));
    }
}
