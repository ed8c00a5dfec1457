mod parse;
mod scrape;

#[derive(clap::Parser)]
struct Args {
    #[arg(value_name = "sheet")]
    input: std::path::PathBuf,
    #[arg(short, long, default_value = "results.csv")]
    output: std::path::PathBuf,
    #[arg(long, env = "TESSERACT_LANG", default_value = "eng")]
    lang: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use clap::Parser;

    pretty_env_logger::init_timed();

    let args = Args::parse();

    cscr::ocr::preflight().await?;

    let serials = cscr::sheet::load_serial_numbers(&args.input)?;
    anyhow::ensure!(
        !serials.is_empty(),
        "no serial numbers found in {}",
        args.input.display(),
    );
    tracing::info!(
        target: "main",
        "loaded {} serial numbers from {}",
        serials.len(),
        args.input.display(),
    );

    let mut sheet = cscr::sheet::SheetWriter::open(&args.output, &parse::HEADERS)?;

    let ctx = scrape::Context {
        client: cscr::scrape::basic()?,
        lang: args.lang,
    };

    let total = serials.len();
    for (i, serial) in serials.iter().enumerate() {
        tracing::info!(target: "main", "\x1b[33m[{}/{total}]\x1b[0m processing serial number {serial} ...", i + 1);
        let Some(row) = scrape::work(serial, &ctx).await else {
            tracing::warn!(target: "main", "\x1b[31m[{}/{total}]\x1b[0m skipped {serial}", i + 1);
            continue;
        };
        tracing::info!(target: "main", "\x1b[36m[{}/{total}]\x1b[0m {serial}: {}", i + 1, row.status);
        sheet.append(&row)?;
    }

    tracing::info!(target: "main", "\x1b[32mresults have been saved to {}\x1b[0m", args.output.display());
    Ok(())
}
