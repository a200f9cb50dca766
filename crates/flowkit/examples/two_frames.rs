use argh::FromArgs;
use flowkit::{
    image::{Image, ImageSize},
    imgproc::parallel::ExecutionStrategy,
    tracking::{DirectionScheme, MotionConfig, MotionPipeline},
};
use std::path::PathBuf;

/// Estimates the dominant motion between two images
#[derive(FromArgs)]
struct Args {
    /// path to the first image
    #[argh(positional)]
    first: PathBuf,

    /// path to the second image
    #[argh(positional)]
    second: PathBuf,

    /// optional JSON file with the pipeline configuration
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// direction labels: legacy, four_way or eight_way
    #[argh(option, short = 'd', from_str_fn(to_direction_scheme))]
    direction_scheme: Option<DirectionScheme>,

    /// number of threads used to track the points, 0 runs serially
    #[argh(option, short = 't')]
    threads: Option<usize>,

    /// print the full output as JSON
    #[argh(switch, short = 'j')]
    json: bool,
}

fn to_direction_scheme(value: &str) -> Result<DirectionScheme, String> {
    match value {
        "legacy" => Ok(DirectionScheme::Legacy),
        "four_way" => Ok(DirectionScheme::FourWay),
        "eight_way" => Ok(DirectionScheme::EightWay),
        _ => Err(format!("Unsupported direction scheme: {value}")),
    }
}

fn read_gray(path: &PathBuf) -> Result<Image<u8, 1>, Box<dyn std::error::Error>> {
    let luma = image::open(path)?.into_luma8();
    let size = ImageSize {
        width: luma.width() as usize,
        height: luma.height() as usize,
    };
    Ok(Image::new(size, luma.into_raw())?)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args: Args = argh::from_env();

    let mut config = match &args.config {
        Some(path) => MotionConfig::from_json_str(&std::fs::read_to_string(path)?)?,
        None => MotionConfig::default(),
    };

    if let Some(scheme) = args.direction_scheme {
        config = config.with_direction_scheme(scheme);
    }

    match args.threads {
        Some(0) => config = config.with_execution(ExecutionStrategy::Serial),
        Some(n) => config = config.with_execution(ExecutionStrategy::Fixed(n)),
        None => {}
    }

    let frame1 = read_gray(&args.first)?;
    let frame2 = read_gray(&args.second)?;
    log::info!("loaded frames of size {}", frame1.size());

    let pipeline = MotionPipeline::new(config)?;
    let output = pipeline.estimate(&frame1, &frame2)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!(
        "Tracked {} of {} points",
        output.valid_tracks().count(),
        output.candidates.len()
    );

    match output.estimate {
        Some(estimate) => {
            println!(
                "Average vector: dx = {:.2}, dy = {:.2}",
                estimate.mean_dx, estimate.mean_dy
            );
            println!("Average direction: {:.2} degrees", estimate.angle_degrees);
            println!("Vector magnitude: {:.2}", estimate.magnitude);
            println!("=> {}", estimate.direction);
        }
        None => println!("No motion estimate"),
    }

    Ok(())
}
