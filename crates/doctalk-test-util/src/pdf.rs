use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};

/// Points between two text lines on a generated page.
const LINE_HEIGHT: i64 = 16;

/// Build a PDF with one page per entry in `pages`.
///
/// Each page entry is split on `\n` and every line is drawn with Helvetica
/// 12pt, top to bottom. An empty entry produces a page with no text at all,
/// which is how scanned or image-only documents look to a text extractor.
pub fn build_pdf(pages: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for page_text in pages {
        let content = page_content(page_text);
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("encode page content"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let page_count = i64::try_from(kids.len()).expect("page count fits in i64");
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("serialize pdf");
    bytes
}

fn page_content(text: &str) -> Content {
    let mut operations = Vec::new();
    if text.is_empty() {
        return Content { operations };
    }

    operations.push(Operation::new("BT", vec![]));
    operations.push(Operation::new("Tf", vec!["F1".into(), 12.into()]));
    operations.push(Operation::new("TL", vec![LINE_HEIGHT.into()]));
    operations.push(Operation::new("Td", vec![50.into(), 780.into()]));
    for (i, line) in text.lines().enumerate() {
        if i > 0 {
            operations.push(Operation::new("T*", vec![]));
        }
        operations.push(Operation::new("Tj", vec![Object::string_literal(line)]));
    }
    operations.push(Operation::new("ET", vec![]));
    Content { operations }
}
