use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::pipeline::{CancelToken, Pipeline, PipelineError, PipelineReport};

/// Extension of the point cloud files picked up by the batch runner.
pub const XYZ_EXTENSION: &str = "xyz";

/// Error types that abort a whole batch.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    /// The directories could not be read or created
    #[error("Batch I/O error")]
    Io(#[from] std::io::Error),

    /// The input directory could not be listed
    #[error("Failed to list the input directory")]
    WalkDir(#[from] walkdir::Error),

    /// The worker pool could not be created
    #[error("Failed to build the thread pool")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// The outputs would overwrite the inputs
    #[error("The output directory {0} is the input directory")]
    SameDirectory(PathBuf),
}

/// Outcome of a single file.
#[derive(Debug, Clone, PartialEq)]
pub enum FileStatus {
    /// The canonicalized cloud was written.
    Success(Box<PipelineReport>),
    /// The file was skipped because of an error.
    Skipped {
        /// Description of the error.
        reason: String,
    },
    /// The batch was cancelled before the file was done.
    Cancelled,
}

/// Report of a single file of a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct FileReport {
    /// The input file.
    pub input: PathBuf,
    /// The output file, written only on success.
    pub output: PathBuf,
    /// What happened to the file.
    pub status: FileStatus,
}

/// Reports of all the files of a batch, in the order of the sorted input paths.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchSummary {
    /// Per file reports.
    pub reports: Vec<FileReport>,
}

impl BatchSummary {
    /// Number of files written.
    pub fn succeeded(&self) -> usize {
        self.count(|s| matches!(s, FileStatus::Success(_)))
    }

    /// Number of files skipped because of an error.
    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, FileStatus::Skipped { .. }))
    }

    /// Number of files not processed because of a cancellation.
    pub fn cancelled(&self) -> usize {
        self.count(|s| matches!(s, FileStatus::Cancelled))
    }

    fn count(&self, f: impl Fn(&FileStatus) -> bool) -> usize {
        self.reports.iter().filter(|r| f(&r.status)).count()
    }
}

/// Runs the pipeline on every point cloud file of a directory.
///
/// Files are processed in parallel on a dedicated thread pool. Errors of a single file are
/// reported in the summary and do not stop the batch.
#[derive(Debug)]
pub struct BatchRunner {
    pipeline: Pipeline,
    num_threads: usize,
}

impl BatchRunner {
    /// Create a runner using one thread per available core.
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline,
            num_threads: 0,
        }
    }

    /// Set the number of worker threads, `0` meaning one per available core.
    pub fn with_num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }

    /// Get the pipeline run on every file.
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Canonicalize every `.xyz` file of `input_dir` into a file of the same name in
    /// `output_dir`.
    ///
    /// Subdirectories are not visited. The output directory is created if needed.
    pub fn run(
        &self,
        input_dir: impl AsRef<Path>,
        output_dir: impl AsRef<Path>,
        cancel: &CancelToken,
    ) -> Result<BatchSummary, BatchError> {
        let input_dir = input_dir.as_ref();
        let output_dir = output_dir.as_ref();

        std::fs::create_dir_all(output_dir)?;
        if input_dir.canonicalize()? == output_dir.canonicalize()? {
            return Err(BatchError::SameDirectory(output_dir.to_path_buf()));
        }

        let inputs = collect_inputs(input_dir)?;
        log::info!(
            "found {} point clouds in {}",
            inputs.len(),
            input_dir.display()
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.num_threads)
            .build()?;

        let reports = pool.install(|| {
            inputs
                .par_iter()
                .map(|input| self.process(input, output_dir, cancel))
                .collect::<Vec<_>>()
        });

        let summary = BatchSummary { reports };
        log::info!(
            "batch done: {} succeeded, {} skipped, {} cancelled",
            summary.succeeded(),
            summary.skipped(),
            summary.cancelled()
        );

        Ok(summary)
    }

    fn process(&self, input: &Path, output_dir: &Path, cancel: &CancelToken) -> FileReport {
        let output = match input.file_name() {
            Some(name) => output_dir.join(name),
            None => output_dir.to_path_buf(),
        };

        let status = if cancel.is_cancelled() {
            FileStatus::Cancelled
        } else {
            match self.pipeline.run_file(input, &output, cancel) {
                Ok(report) => {
                    log::info!(
                        "{}: {} -> {} points",
                        input.display(),
                        report.input_points,
                        report.output_points
                    );
                    FileStatus::Success(Box::new(report))
                }
                Err(PipelineError::Cancelled) => FileStatus::Cancelled,
                Err(e) => {
                    let reason = error_chain(&e);
                    log::warn!("skipping {}: {reason}", input.display());
                    FileStatus::Skipped { reason }
                }
            }
        };

        FileReport {
            input: input.to_path_buf(),
            output,
            status,
        }
    }
}

/// List the point cloud files directly inside `dir`, sorted by path.
pub fn collect_inputs(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>, BatchError> {
    let mut paths = Vec::new();
    for entry in walkdir::WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry?;
        let is_xyz = entry
            .path()
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case(XYZ_EXTENSION))
            .unwrap_or(false);
        if entry.file_type().is_file() && is_xyz {
            paths.push(entry.into_path());
        }
    }
    paths.sort();
    Ok(paths)
}

/// Format an error and all its sources on one line.
fn error_chain(e: &dyn std::error::Error) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(s) = source {
        message.push_str(": ");
        message.push_str(&s.to_string());
        source = s.source();
    }
    message
}
