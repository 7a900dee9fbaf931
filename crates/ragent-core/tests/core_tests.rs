use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

use ragent_core::config::{Config, ProviderKind};
use ragent_core::loader::{list_source_files, load_document, DocumentFormat};
use ragent_core::Error;

fn write_pdf(path: &Path, pages: &[&str]) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });
    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![72.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let stream = Stream::new(dictionary! {}, content.encode().expect("encode"));
        let content_id = doc.add_object(stream);
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }
    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).expect("save pdf");
}

#[test]
fn text_file_is_one_fragment() {
    let tmp = TempDir::new().expect("tempdir");
    let file_path = tmp.path().join("a.txt");
    let mut f = fs::File::create(&file_path).expect("create");
    writeln!(f, "Short text\n\nSecond paragraph").expect("write");

    let fragments = load_document(&file_path, "a.txt").expect("load");
    assert_eq!(fragments.len(), 1, "text files are not pre-split");
    assert_eq!(fragments[0].metadata.source, "a.txt");
    assert_eq!(fragments[0].metadata.page, None);
    assert!(fragments[0].content.contains("Second paragraph"));
}

#[test]
fn markdown_with_invalid_utf8_is_read_lossily() {
    let tmp = TempDir::new().expect("tempdir");
    let file_path = tmp.path().join("notes.MD");
    fs::write(&file_path, b"# Title\n\xff\xfe body").expect("write");

    let fragments = load_document(&file_path, "notes.MD").expect("load");
    assert!(fragments[0].content.starts_with("# Title"));
    assert!(fragments[0].content.ends_with("body"));
}

#[test]
fn unsupported_extension_is_rejected_before_io() {
    let err = load_document(Path::new("/does/not/exist/report.docx"), "report.docx").unwrap_err();
    assert!(matches!(err, Error::UnsupportedFormat(_)));
    assert!(!DocumentFormat::is_supported(Path::new("archive.zip")));
    let format = DocumentFormat::from_path(Path::new("x.PDF")).expect("known format");
    assert_eq!(format, DocumentFormat::Pdf);
}

#[test]
fn pdf_is_split_per_page() {
    let tmp = TempDir::new().expect("tempdir");
    let file_path = tmp.path().join("manual.pdf");
    write_pdf(&file_path, &["Page one text", "Page two text"]);

    let fragments = load_document(&file_path, "manual.pdf").expect("load pdf");
    let pages: Vec<Option<u32>> = fragments.iter().map(|f| f.metadata.page).collect();
    assert_eq!(pages, vec![Some(1), Some(2)]);
    assert!(fragments.iter().all(|f| f.metadata.source == "manual.pdf"));
}

#[test]
fn corrupt_pdf_names_the_file() {
    let tmp = TempDir::new().expect("tempdir");
    let file_path = tmp.path().join("broken.pdf");
    fs::write(&file_path, b"this is not a pdf").expect("write");

    match load_document(&file_path, "broken.pdf") {
        Err(Error::DocumentLoad { file, .. }) => assert_eq!(file, "broken.pdf"),
        other => panic!("expected DocumentLoad, got {other:?}"),
    }
}

#[test]
fn source_listing_skips_unsupported_nested_and_excluded_files() {
    let tmp = TempDir::new().expect("tempdir");
    let dir = tmp.path();
    fs::write(dir.join("b.md"), "bravo").expect("write");
    fs::write(dir.join("a.txt"), "alpha").expect("write");
    fs::write(dir.join("image.png"), "png").expect("write");
    fs::write(dir.join("corpus.json"), "[]").expect("write");
    fs::create_dir(dir.join("nested")).expect("mkdir");
    fs::write(dir.join("nested/c.txt"), "charlie").expect("write");

    let files = list_source_files(dir, &[dir.join("corpus.json")]);
    let names: Vec<String> = files
        .iter()
        .map(|p| p.file_name().expect("file name").to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["a.txt", "b.md"]);

    assert!(list_source_files(&dir.join("missing"), &[]).is_empty());
}

#[test]
fn config_layers_over_defaults() {
    use figment::providers::{Format, Toml};
    let figment = figment::Figment::from(Toml::string(
        r#"
        [chunking]
        max_chars = 800

        [embedding]
        provider = "openai"
        api_key = "sk-test"
        "#,
    ));
    let settings = Config::from_figment(figment).expect("config").settings().expect("settings");
    assert_eq!(settings.chunking.max_chars, 800);
    assert_eq!(settings.chunking.overlap, 50);
    assert_eq!(settings.embedding.provider, ProviderKind::OpenAi);
    assert_eq!(settings.embedding.api_key.as_deref(), Some("sk-test"));
    assert_eq!(settings.retrieval.top_k, 3);
}

#[test]
fn config_rejects_overlap_larger_than_chunk() {
    use figment::providers::{Format, Toml};
    let toml = Toml::string("[chunking]\nmax_chars = 40\noverlap = 40\n");
    let figment = figment::Figment::from(toml);
    assert!(Config::from_figment(figment).is_err());
}

#[test]
fn config_rejects_zero_weather_timeout() {
    use figment::providers::{Format, Toml};
    let figment = figment::Figment::from(Toml::string("[plugins]\nweather_timeout_secs = 0\n"));
    assert!(Config::from_figment(figment).is_err());
}
