use std::path::PathBuf;
use std::time::Duration;

use argh::FromArgs;

use facecloud::landmark::{ExternalLocator, PlaneFitLocator};
use facecloud::pipeline::{BatchRunner, CancelToken, FileStatus, Pipeline, PipelineConfig};

#[derive(FromArgs, Debug)]
/// Canonicalize a directory of face scans stored as XYZ files.
struct Args {
    /// path to the directory containing the scans
    #[argh(option, short = 'i')]
    input_dir: PathBuf,

    /// path to the directory receiving the canonicalized scans
    #[argh(option, short = 'o')]
    output_dir: PathBuf,

    /// path to a JSON pipeline configuration
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// number of threads to use, 0 for one per core
    #[argh(option, short = 'n', default = "0")]
    num_threads: usize,

    /// program printing the nose tip of the XYZ file passed as last argument
    #[argh(option)]
    locator: Option<PathBuf>,

    /// timeout of the locator program in milliseconds
    #[argh(option, default = "30000")]
    locator_timeout_ms: u64,

    /// locate the nose tip with the built-in plane fit
    #[argh(switch)]
    native_locator: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };
    log::info!("pipeline configuration: {config:?}");

    let pipeline = Pipeline::new(config);
    let pipeline = match (&args.locator, args.native_locator) {
        (Some(_), true) => {
            return Err("--locator and --native-locator are mutually exclusive".into());
        }
        (Some(program), false) => pipeline.with_locator(
            ExternalLocator::new(program)
                .with_timeout(Duration::from_millis(args.locator_timeout_ms)),
        ),
        (None, true) => pipeline.with_locator(PlaneFitLocator),
        (None, false) => pipeline,
    };

    // create a cancel token to stop the batch
    let cancel = CancelToken::new();
    ctrlc::set_handler({
        let cancel = cancel.clone();
        move || {
            println!("Received Ctrl-C signal. Finishing the running scans !!");
            cancel.cancel();
        }
    })?;

    let runner = BatchRunner::new(pipeline).with_num_threads(args.num_threads);
    let summary = runner.run(&args.input_dir, &args.output_dir, &cancel)?;

    for report in summary.reports.iter() {
        if let FileStatus::Skipped { reason } = &report.status {
            println!("skipped {}: {}", report.input.display(), reason);
        }
    }

    println!(
        "Done: {} written, {} skipped, {} cancelled",
        summary.succeeded(),
        summary.skipped(),
        summary.cancelled()
    );

    Ok(())
}
