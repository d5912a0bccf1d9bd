use anyhow::{Context, Result};
use lightmap::{load_kernel, Kernel, MaskProjector, MaskRefiner, SegmapFilter, DEFAULT_THRESHOLD};
use std::env;
use std::process;

fn print_usage(program: &str) {
    eprintln!("Binary mask reprojection and segmentation-map selection");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  {} drizzle <source.fits> <dest.fits> <output.fits> [OPTIONS]", program);
    eprintln!("  {} segmap <segmap.fits> <output.fits> --ids <ID,...> [OPTIONS]", program);
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  drizzle              Map the mask in <source> onto the pixel grid of <dest>");
    eprintln!("  segmap               Keep the listed region identifiers of a segmentation map");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --ids <ID,...>       Region identifiers to keep (segmap only)");
    eprintln!("  --kernel <K.fits>    Refine the mask with a kernel read from a FITS image");
    eprintln!("  --boxcar <N>         Refine with an N x N uniform kernel");
    eprintln!("  --gaussian <N,S>     Refine with an N x N Gaussian kernel of sigma S pixels");
    eprintln!(
        "  --threshold <T>      Refinement threshold in [0, 1] (default: {})",
        DEFAULT_THRESHOLD
    );
    eprintln!("  --persist-refined    Write the refined mask instead of the strict selection (segmap only)");
    eprintln!("  --log                Show progress information (RUST_LOG overrides)");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  {} drizzle hst_mask.fits irac_ch1.fits irac_mask.fits", program);
    eprintln!("  {} drizzle mask.fits target.fits out.fits --gaussian 5,1.5 --threshold 0.2", program);
    eprintln!("  {} segmap seg.fits sel.fits --ids 12,40,41 --boxcar 3", program);
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

#[derive(Default)]
struct Options {
    positional: Vec<String>,
    ids: Option<Vec<i64>>,
    kernel: Option<Kernel>,
    threshold: Option<f64>,
    persist_refined: bool,
    log_enabled: bool,
    help: bool,
}

impl Options {
    fn refiner(&mut self) -> Result<Option<MaskRefiner>> {
        match (self.kernel.take(), self.threshold) {
            (Some(kernel), threshold) => {
                let refiner = MaskRefiner::new(kernel)
                    .with_threshold(threshold.unwrap_or(DEFAULT_THRESHOLD))
                    .context("Invalid threshold")?;
                Ok(Some(refiner))
            }
            (None, Some(_)) => Err(anyhow::anyhow!("--threshold requires a kernel option")),
            (None, None) => Ok(None),
        }
    }
}

fn value<'a>(args: &'a [String], i: usize, flag: &str) -> Result<&'a str> {
    args.get(i + 1)
        .map(String::as_str)
        .ok_or_else(|| anyhow::anyhow!("{} requires a value", flag))
}

fn set_kernel(opts: &mut Options, kernel: Kernel) -> Result<()> {
    if opts.kernel.is_some() {
        return Err(anyhow::anyhow!(
            "Only one of --kernel, --boxcar, --gaussian may be given"
        ));
    }
    opts.kernel = Some(kernel);
    Ok(())
}

fn parse_options(args: &[String]) -> Result<Options> {
    let mut opts = Options::default();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--ids" => {
                let ids = value(args, i, "--ids")?
                    .split(',')
                    .filter(|s| !s.trim().is_empty())
                    .map(|s| s.trim().parse::<i64>())
                    .collect::<Result<Vec<_>, _>>()
                    .context("Invalid region identifier")?;
                opts.ids = Some(ids);
                i += 2;
            }
            "--kernel" => {
                let kernel = load_kernel(value(args, i, "--kernel")?)?;
                set_kernel(&mut opts, kernel)?;
                i += 2;
            }
            "--boxcar" => {
                let size = value(args, i, "--boxcar")?
                    .parse::<usize>()
                    .context("Invalid boxcar size")?;
                set_kernel(&mut opts, Kernel::boxcar(size)?)?;
                i += 2;
            }
            "--gaussian" => {
                let arg = value(args, i, "--gaussian")?;
                let (size, sigma) = match arg.split_once(',') {
                    Some((n, s)) => (
                        n.parse::<usize>().context("Invalid Gaussian size")?,
                        s.parse::<f64>().context("Invalid Gaussian sigma")?,
                    ),
                    None => {
                        let n = arg.parse::<usize>().context("Invalid Gaussian size")?;
                        (n, n as f64 / 4.0)
                    }
                };
                set_kernel(&mut opts, Kernel::gaussian(size, sigma)?)?;
                i += 2;
            }
            "--threshold" => {
                let threshold = value(args, i, "--threshold")?
                    .parse::<f64>()
                    .context("Invalid threshold value")?;
                opts.threshold = Some(threshold);
                i += 2;
            }
            "--persist-refined" => {
                opts.persist_refined = true;
                i += 1;
            }
            "--log" => {
                opts.log_enabled = true;
                i += 1;
            }
            "--help" | "-h" => {
                opts.help = true;
                i += 1;
            }
            arg if arg.starts_with("--") => {
                return Err(anyhow::anyhow!("Unknown option: {}", arg));
            }
            arg => {
                opts.positional.push(arg.to_string());
                i += 1;
            }
        }
    }

    Ok(opts)
}

fn init_logging(enabled: bool) {
    let default = if enabled { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .init();
}

fn run() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("lightmap");

    if args.len() < 2 {
        print_usage(program);
        return Err(anyhow::anyhow!("Missing command"));
    }

    let command = args[1].as_str();
    if command == "--help" || command == "-h" {
        print_usage(program);
        return Ok(());
    }

    let mut opts = parse_options(&args[2..])?;
    if opts.help {
        print_usage(program);
        return Ok(());
    }
    init_logging(opts.log_enabled);

    match command {
        "drizzle" => {
            if opts.positional.len() != 3 {
                print_usage(program);
                return Err(anyhow::anyhow!(
                    "drizzle takes <source> <dest> <output>"
                ));
            }
            if opts.ids.is_some() || opts.persist_refined {
                return Err(anyhow::anyhow!(
                    "--ids and --persist-refined only apply to segmap"
                ));
            }

            let mut projector = MaskProjector::new();
            if let Some(refiner) = opts.refiner()? {
                projector = projector.with_refiner(refiner);
            }

            let projected = projector.project_to_file(
                &opts.positional[0],
                &opts.positional[1],
                &opts.positional[2],
            )?;

            if opts.log_enabled {
                let stats = projected.stats;
                println!("Drizzle complete");
                println!("  Source pixels:  {}", stats.source_pixels);
                println!("  Kept:           {}", stats.kept);
                println!("  Landed:         {}", stats.landed);
                println!("  Out of bounds:  {}", stats.out_of_bounds);
                println!("  Collisions:     {}", stats.collisions);
                println!(
                    "  Mask pixels:    {}",
                    projected.mask.iter().filter(|&&v| v == 1).count()
                );
            }
        }
        "segmap" => {
            if opts.positional.len() != 2 {
                print_usage(program);
                return Err(anyhow::anyhow!("segmap takes <segmap> <output>"));
            }
            let ids = opts
                .ids
                .take()
                .ok_or_else(|| anyhow::anyhow!("segmap requires --ids"))?;

            let mut filter = SegmapFilter::new(ids).persist_refined(opts.persist_refined);
            if let Some(refiner) = opts.refiner()? {
                filter = filter.with_refiner(refiner);
            }

            let selection = filter.filter(&opts.positional[0], &opts.positional[1])?;

            if opts.log_enabled {
                println!("Segmap selection complete");
                println!(
                    "  Selected pixels: {}",
                    selection.mask.iter().filter(|&&v| v == 1).count()
                );
                if let Some(refined) = &selection.refined {
                    println!(
                        "  Refined pixels:  {}{}",
                        refined.iter().filter(|&&v| v == 1).count(),
                        if opts.persist_refined { " (written)" } else { " (not written)" }
                    );
                }
            }
        }
        other => {
            print_usage(program);
            return Err(anyhow::anyhow!("Unknown command: {}", other));
        }
    }

    Ok(())
}
