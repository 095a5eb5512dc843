use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use env_logger::Env;
use log::info;

use pac_gen_r::{Balance, FeedSource, Generator, GeneratorOptions, Result, DEFAULT_FEED_URL};

#[derive(Parser, Debug)]
#[command(author, version, about = "Generate proxy auto-config rules for region IP ranges")]
struct Args {
    /// Proxy server directives, multiple values rotate under balancing,
    /// e.g. -x 'SOCKS 127.0.0.1:8964' 'SOCKS5 127.0.0.1:1984'
    #[arg(
        short = 'x',
        long = "proxy",
        num_args = 1..,
        default_values_t = [String::from("SOCKS 127.0.0.1:8964")]
    )]
    proxy: Vec<String>,

    /// Step size of mask fragment for network alignment
    #[arg(short = 'm', long = "mask-step", default_value_t = 2)]
    mask_step: u8,

    /// Size of the address hash table; larger values improve matching speed
    /// but increase file size
    #[arg(short = 's', long = "hash-base", default_value_t = 3011)]
    hash_base: u32,

    /// Proxy balancing policy: no, local_ip, or host
    #[arg(short = 'b', long, default_value = "no")]
    balance: String,

    /// Networks/hosts to bypass the proxy, supports CIDR notation
    #[arg(
        short = 'n',
        long = "no-proxy",
        num_args = 0..,
        default_values_t = [String::from("192.168.0.0/24")]
    )]
    no_proxy: Vec<String>,

    /// Output PAC filename
    #[arg(short = 'o', long, default_value = "proxy.pac")]
    output: PathBuf,

    /// Delegation feed URL
    #[arg(long, default_value = DEFAULT_FEED_URL)]
    feed_url: String,

    /// Country code to select from the feed
    #[arg(long, default_value = "cn")]
    country: String,

    /// Also write the raw lookup table as JSON to this path
    #[arg(long)]
    json: Option<PathBuf>,
}

fn run(args: Args) -> Result<()> {
    let balance: Balance = args.balance.parse()?;

    let options = GeneratorOptions::new()
        .with_proxies(args.proxy)
        .with_balance(balance)
        .with_no_proxy(args.no_proxy)
        .with_bucket_count(args.hash_base)
        .with_step(args.mask_step);

    let feed = FeedSource::new()
        .with_url(args.feed_url)
        .with_country(args.country);

    let generator = Generator::new(options)?.with_feed(feed);

    let table = generator.build_table(generator.fetch()?)?;
    let artifact = generator.render(&table)?;
    std::fs::write(&args.output, &artifact)?;
    info!("wrote PAC artifact to {}", args.output.display());

    if let Some(json_path) = args.json {
        std::fs::write(&json_path, table.to_json()?)?;
        info!("wrote lookup table JSON to {}", json_path.display());
    }

    println!(
        "Use {} as your browser's automatic proxy configuration (.pac) file.",
        args.output.display()
    );
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
