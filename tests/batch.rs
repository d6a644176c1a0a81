//! Batch runner integration tests.
//!
//! Every test builds its registry explicitly, so no system pdfium or
//! pdftoppm is needed: PDFs go through the structural copy tier.

mod common;

use common::{corrupt_file, labelled_pdf, page_labels, solid_image};
use pdftone::{
    BackendRegistry, BatchJob, BatchOutcome, BatchRunner, ConversionConfig, PipelineTier,
    RunnerState, Tone, ToneError,
};
use std::sync::Arc;

fn runner() -> BatchRunner {
    common::init_tracing();
    BatchRunner::new(Arc::new(BackendRegistry::structural_only()))
}

#[tokio::test]
async fn corrupt_file_does_not_stop_the_batch() {
    let input = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let p = input.path();
    let files = vec![
        solid_image(&p.join("one.png"), [200, 10, 10]),
        labelled_pdf(&p.join("two.pdf"), &["two-1", "two-2"]),
        corrupt_file(&p.join("three.jpg")),
        solid_image(&p.join("four.jpg"), [10, 200, 10]),
        labelled_pdf(&p.join("five.pdf"), &["five-1"]),
    ];
    let config = ConversionConfig::builder()
        .output_dir(out.path())
        .build()
        .unwrap();

    let mut percents = Vec::new();
    let report = runner()
        .submit(BatchJob::Convert { files }, config)
        .unwrap()
        .wait_with(|ev| percents.push(ev.percent))
        .await;

    assert_eq!(report.total, 5);
    assert_eq!(report.successful, 4);
    assert_eq!(report.failed_files.len(), 1);
    assert!(report.failed_files[0].starts_with("three.jpg:"), "{:?}", report.failed_files);
    assert_eq!(report.outcome(), BatchOutcome::PartialSuccess);

    assert!(out.path().join("one_bw.png").exists());
    assert!(out.path().join("four_bw.jpg").exists());
    assert!(!out.path().join("three_bw.jpg").exists());
    assert_eq!(
        page_labels(&out.path().join("two_bw.pdf")),
        vec!["two-1", "two-2"]
    );
    assert_eq!(page_labels(&out.path().join("five_bw.pdf")), vec!["five-1"]);
    image::open(out.path().join("one_bw.png")).unwrap();

    assert!(percents.windows(2).all(|w| w[0] <= w[1]), "{percents:?}");
    assert_eq!(percents.last().copied(), Some(100.0));
}

#[tokio::test]
async fn all_failures_report_failed_outcome() {
    let input = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let files = vec![
        corrupt_file(&input.path().join("a.png")),
        corrupt_file(&input.path().join("b.pdf")),
    ];
    let config = ConversionConfig::builder()
        .output_dir(out.path())
        .build()
        .unwrap();

    let report = runner()
        .submit(BatchJob::Convert { files }, config)
        .unwrap()
        .wait()
        .await;
    assert_eq!(report.successful, 0);
    assert_eq!(report.failed_files.len(), 2);
    assert_eq!(report.outcome(), BatchOutcome::Failed);
}

#[tokio::test]
async fn busy_while_a_batch_is_running() {
    let input = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let files: Vec<_> = (0..3)
        .map(|i| solid_image(&input.path().join(format!("img{i}.png")), [9, 9, 9]))
        .collect();
    let config = ConversionConfig::builder()
        .output_dir(out.path())
        .progress_capacity(1)
        .build()
        .unwrap();

    let runner = runner();
    let handle = runner
        .submit(BatchJob::Convert { files: files.clone() }, config.clone())
        .unwrap();
    assert_eq!(runner.state(), RunnerState::Running);

    let err = runner
        .submit(BatchJob::Convert { files }, config)
        .unwrap_err();
    assert!(matches!(err, ToneError::Busy));

    let report = handle.wait().await;
    assert_eq!(report.successful, 3);
    assert_eq!(runner.state(), RunnerState::Idle);
}

#[test]
fn sepia_pdf_without_rasteriser_is_copied_and_says_so() {
    let input = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let pdf = labelled_pdf(&input.path().join("letter.pdf"), &["a", "b", "c"]);
    let config = ConversionConfig::builder()
        .tone(Tone::Sepia)
        .output_dir(out.path())
        .build()
        .unwrap();

    let registry = BackendRegistry::structural_only();
    assert_eq!(registry.tier(), PipelineTier::StructuralCopy);
    let result = pdftone::convert_file(&pdf, &config, &registry);

    assert!(result.success);
    assert!(result.message.contains("without color conversion"), "{}", result.message);
    let dest = out.path().join("letter_sepia.pdf");
    assert_eq!(result.output.as_deref(), Some(dest.as_path()));
    assert_eq!(page_labels(&dest), vec!["a", "b", "c"]);
}

#[tokio::test]
async fn convert_then_merge_orders_pages_by_selection() {
    let input = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let files = vec![
        labelled_pdf(&input.path().join("b.pdf"), &["b1"]),
        solid_image(&input.path().join("cover.png"), [120, 80, 40]),
        labelled_pdf(&input.path().join("a.pdf"), &["a1", "a2"]),
    ];
    let config = ConversionConfig::builder()
        .output_dir(out.path())
        .merge_output_name("bundle.pdf")
        .build()
        .unwrap();

    let report = runner()
        .submit(BatchJob::ConvertAndMerge { files }, config)
        .unwrap()
        .wait()
        .await;

    assert_eq!(report.successful, 3, "{:?}", report.failed_files);
    let merged = report.merged_output.expect("merged output");
    assert_eq!(merged, out.path().join("bundle.pdf"));

    let labels = page_labels(&merged);
    assert_eq!(labels.len(), 4);
    assert_eq!(labels[0], "b1");
    assert_eq!(&labels[2..], ["a1", "a2"]);
    assert!(report.intermediates_dir.is_none());
}
