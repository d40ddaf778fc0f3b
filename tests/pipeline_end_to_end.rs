//! End-to-end pipeline tests driven through the public crate API, using
//! minimally constructed PDFs rather than fixture files on disk.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Object, StringFormat};
use secure_doc_ai::models::JobStatus;
use secure_doc_ai::{Pipeline, PipelineConfig};

fn config(dir: &std::path::Path) -> PipelineConfig {
    PipelineConfig {
        processing_dir: dir.join("processing"),
        processed_dir: dir.join("processed"),
        signed_dir: dir.join("signed"),
        error_dir: dir.join("error"),
        keys_dir: dir.join("keys"),
        audit_db_path: dir.join("audit.db"),
        max_size_mb: 50,
        ner_enabled: false,
        processing_timeout_seconds: 30,
    }
}

fn pdf_with_two_spans(path: &std::path::Path, first: &str, second: &str, second_tx: f64) {
    let mut doc = lopdf::Document::with_version("1.5");
    let content = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), 10.into()]),
            Operation::new(
                "Tm",
                vec![1.into(), 0.into(), 0.into(), 1.into(), 72.into(), 700.into()],
            ),
            Operation::new(
                "Tj",
                vec![Object::String(first.as_bytes().to_vec(), StringFormat::Literal)],
            ),
            Operation::new("Td", vec![second_tx.into(), 0.into()]),
            Operation::new(
                "Tj",
                vec![Object::String(second.as_bytes().to_vec(), StringFormat::Literal)],
            ),
            Operation::new("ET", vec![]),
        ],
    };
    let stream_data = content.encode().unwrap();
    let content_id = doc.add_object(lopdf::Stream::new(dictionary! {}, stream_data));
    let pages_id = doc.new_object_id();
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![page_id.into()],
        "Count" => 1,
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).unwrap();
}

#[tokio::test]
async fn multi_span_email_resolves_to_unioned_bbox() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(config(dir.path()), None).unwrap();

    let input = dir.path().join("input.pdf");
    // "alice.long.name@exam" is 20 chars at font size 10 with the
    // extractor's fixed-width approximation (10 * 0.5 per char), so a Td
    // of exactly 100 continues the line with no horizontal gap: the two
    // spans join with no inserted separator, matching one contiguous word.
    pdf_with_two_spans(&input, "alice.long.name@exam", "ple.com", 100.0);

    let job_id = Pipeline::new_job_id();
    let result = pipeline.run(&job_id, &input, "input.pdf").await;

    assert_eq!(result.status, JobStatus::Completed);
    let email = result
        .entities
        .iter()
        .find(|e| e.entity_type == "EMAIL")
        .expect("email entity detected");
    assert_eq!(email.text, "alice.long.name@example.com");
    let bbox = email.bbox.expect("bbox resolved");
    assert!(bbox[2] > bbox[0], "unioned width should be positive");
}

#[tokio::test]
async fn encrypted_pdf_is_quarantined_and_recorded_as_failed() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(config(dir.path()), None).unwrap();

    let mut doc = lopdf::Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
    });
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![page_id.into()],
        "Count" => 1,
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set(
        "Encrypt",
        dictionary! {
            "Filter" => "Standard",
        },
    );

    let input = dir.path().join("input.pdf");
    doc.save(&input).unwrap();

    let job_id = Pipeline::new_job_id();
    let result = pipeline.run(&job_id, &input, "input.pdf").await;

    assert_eq!(result.status, JobStatus::Failed);
    assert!(result.error.as_ref().unwrap().contains("encrypted"));

    let quarantined: Vec<_> = std::fs::read_dir(dir.path().join("error"))
        .unwrap()
        .filter_map(|e| e.ok())
        .collect();
    assert_eq!(quarantined.len(), 1);

    let stats = pipeline.stats().unwrap();
    assert_eq!(stats.total_jobs, 1);
    assert_eq!(stats.failed_jobs, 1);
}
