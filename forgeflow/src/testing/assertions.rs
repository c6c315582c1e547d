//! Assertions over reports, images, and event streams.

use crate::core::PipelineReport;
use crate::events::CollectingEventSink;
use crate::image::OutputImage;
use std::path::PathBuf;

/// Asserts every stage of the report sealed successfully.
///
/// # Panics
///
/// Panics with the failing stage names when any stage did not seal.
pub fn assert_report_sealed(report: &PipelineReport) {
    let unsealed: Vec<&str> = report
        .stages
        .iter()
        .filter(|s| s.status != crate::core::StageStatus::Sealed)
        .map(|s| s.stage.as_str())
        .collect();

    assert!(
        unsealed.is_empty(),
        "expected all stages sealed, but these were not: {unsealed:?}"
    );
}

/// Asserts the image's working directory lists exactly the given file
/// names, each with non-zero size.
///
/// # Panics
///
/// Panics when the listing differs or a file is empty.
pub fn assert_image_workdir_lists(image: &OutputImage, expected: &[&str]) {
    let listing = image.workdir_listing().expect("walk image workdir");
    let paths: Vec<PathBuf> = listing.iter().map(|e| e.path.clone()).collect();
    let expected_paths: Vec<PathBuf> = expected.iter().copied().map(PathBuf::from).collect();

    assert_eq!(
        paths, expected_paths,
        "image workdir listing mismatch (got {paths:?})"
    );

    for entry in &listing {
        assert!(
            entry.size_bytes > 0,
            "expected non-empty file at {:?}",
            entry.path
        );
    }
}

/// Asserts at least one event of the given type was emitted.
///
/// # Panics
///
/// Panics listing the observed event types when none match.
pub fn assert_event_emitted(sink: &CollectingEventSink, event_type: &str) {
    let events = sink.events();
    assert!(
        events.iter().any(|e| e.event_type == event_type),
        "expected event '{event_type}', saw: {:?}",
        events.iter().map(|e| e.event_type.clone()).collect::<Vec<_>>()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ScratchRoot;
    use crate::core::BuildEvent;
    use crate::events::EventSink;
    use crate::snapshot::StageWorkspace;

    #[test]
    fn test_assert_event_emitted() {
        let sink = CollectingEventSink::new();
        sink.try_emit(BuildEvent::pipeline_started("engine"));
        assert_event_emitted(&sink, "pipeline.started");
    }

    #[test]
    #[should_panic(expected = "expected event")]
    fn test_assert_event_emitted_panics_when_absent() {
        let sink = CollectingEventSink::new();
        assert_event_emitted(&sink, "pipeline.completed");
    }

    #[test]
    fn test_assert_image_workdir_lists() {
        let dir = tempfile::tempdir().unwrap();
        let mut ws = StageWorkspace::create("assembler", dir.path()).unwrap();
        ws.set_workdir("/opt/engine").unwrap();
        let lib = ws.resolve("libengine.so").unwrap();
        std::fs::create_dir_all(lib.parent().unwrap()).unwrap();
        std::fs::write(&lib, b"bytes").unwrap();

        let snapshot = ws.seal();
        let image = OutputImage::from_snapshot(
            &snapshot,
            ScratchRoot::External(dir.path().to_path_buf()),
        );

        assert_image_workdir_lists(&image, &["libengine.so"]);
    }
}
