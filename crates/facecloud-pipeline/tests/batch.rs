use std::path::Path;

use facecloud_3d::io::xyz::{read_xyz, write_xyz};
use facecloud_3d::pointcloud::PointCloud;
use facecloud_landmark::PlaneFitLocator;
use facecloud_pipeline::{BatchRunner, CancelToken, FileStatus, Pipeline, PipelineConfig};

/// A smooth cap with its apex at `apex`.
fn cap(apex: [f64; 3], tilt: f64) -> PointCloud {
    let mut points = vec![];
    for i in -25..=25 {
        for j in -35..=35 {
            let (x, y) = (i as f64, j as f64);
            let z = -x * x / 50.0 - y * y / 80.0 + tilt * x;
            points.push([apex[0] + x, apex[1] + y, apex[2] + z]);
        }
    }
    PointCloud::new(points)
}

fn write_dataset(dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    write_xyz(dir.join("subject_01.xyz"), &cap([0.0, 0.0, 0.0], 0.0))?;
    write_xyz(dir.join("subject_02.xyz"), &cap([10.0, -4.0, 3.0], 0.2))?;
    std::fs::write(dir.join("subject_03.xyz"), "1.0 2.0 3.0\n4.0 5.0\n")?;
    write_xyz(dir.join("subject_04.xyz"), &cap([-7.0, 2.0, 50.0], -0.1))?;
    std::fs::write(dir.join("README.txt"), "not a cloud")?;
    Ok(())
}

fn runner(num_threads: usize) -> BatchRunner {
    let pipeline = Pipeline::new(PipelineConfig::default()).with_locator(PlaneFitLocator);
    BatchRunner::new(pipeline).with_num_threads(num_threads)
}

#[test]
fn batch_skips_malformed_files() -> Result<(), Box<dyn std::error::Error>> {
    let input = tempfile::tempdir()?;
    let output = tempfile::tempdir()?;
    write_dataset(input.path())?;

    let summary = runner(4).run(input.path(), output.path(), &CancelToken::new())?;

    let names = summary
        .reports
        .iter()
        .filter_map(|r| r.input.file_name()?.to_str())
        .collect::<Vec<_>>();
    assert_eq!(
        names,
        vec!["subject_01.xyz", "subject_02.xyz", "subject_03.xyz", "subject_04.xyz"]
    );
    assert_eq!(summary.succeeded(), 3);
    assert_eq!(summary.skipped(), 1);
    assert_eq!(summary.cancelled(), 0);

    match &summary.reports[2].status {
        FileStatus::Skipped { reason } => assert!(reason.contains("line 2"), "{reason}"),
        other => panic!("expected the malformed file to be skipped, got {other:?}"),
    }
    assert!(!output.path().join("subject_03.xyz").exists());

    for report in summary.reports.iter().filter(|r| r.status != FileStatus::Cancelled) {
        if let FileStatus::Success(file_report) = &report.status {
            let cloud = read_xyz(&report.output)?;
            assert_eq!(cloud.len(), file_report.output_points);
        }
    }
    Ok(())
}

#[test]
fn batch_output_does_not_depend_on_threads() -> Result<(), Box<dyn std::error::Error>> {
    let input = tempfile::tempdir()?;
    write_dataset(input.path())?;

    let single = tempfile::tempdir()?;
    let multi = tempfile::tempdir()?;
    runner(1).run(input.path(), single.path(), &CancelToken::new())?;
    runner(4).run(input.path(), multi.path(), &CancelToken::new())?;

    for name in ["subject_01.xyz", "subject_02.xyz", "subject_04.xyz"] {
        assert_eq!(
            std::fs::read(single.path().join(name))?,
            std::fs::read(multi.path().join(name))?,
            "{name}"
        );
    }
    Ok(())
}

#[test]
fn cancelled_batch_writes_nothing() -> Result<(), Box<dyn std::error::Error>> {
    let input = tempfile::tempdir()?;
    let output = tempfile::tempdir()?;
    write_dataset(input.path())?;

    let cancel = CancelToken::new();
    cancel.cancel();
    let summary = runner(2).run(input.path(), output.path(), &cancel)?;

    assert_eq!(summary.cancelled(), 4);
    assert_eq!(std::fs::read_dir(output.path())?.count(), 0);
    Ok(())
}
