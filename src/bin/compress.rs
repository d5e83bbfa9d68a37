//! Command-line front-end: `--demo`, `--encode`, `--decode` over a file.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context};
use clap::Parser;

use stagecomp::bitstream::BitStream;
use stagecomp::config::{DEF_PROBABILITY_THRESHOLD, DEF_SLICE_COUNT, DEF_SYMBOL_SIZE};
use stagecomp::huffman::HuffmanTransducer;
use stagecomp::markov::MarkovEncoder;
use stagecomp::sliced;
use stagecomp::stage::Stage;

#[derive(Parser, Debug)]
#[command(name = "compress", about = "Composable lossless binary compressor", rename_all = "kebab-case")]
struct Cli {
    /// Print entropy/compression statistics for `input-path`, with and
    /// without Markov pre-compression, instead of writing output.
    #[arg(long)]
    demo: bool,

    /// Compress `input-path` into `output-path`.
    #[arg(long)]
    encode: bool,

    /// Decompress `input-path` into `output-path`.
    #[arg(long)]
    decode: bool,

    /// compress --demo <input-path> / compress --encode|--decode <input-path> <output-path>
    input_path: Option<PathBuf>,

    output_path: Option<PathBuf>,

    #[arg(long, default_value_t = DEF_SYMBOL_SIZE)]
    symbol_size: usize,

    #[arg(long, default_value_t = DEF_PROBABILITY_THRESHOLD)]
    threshold: f64,

    #[arg(long, default_value_t = DEF_SLICE_COUNT)]
    slices: usize,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match (cli.demo, cli.encode, cli.decode) {
        (true, false, false) => run_demo(&cli),
        (false, true, false) => run_encode(&cli),
        (false, false, true) => run_decode(&cli),
        _ => bail!("exactly one of --demo, --encode, --decode is required"),
    }
}

fn read_input(cli: &Cli) -> anyhow::Result<BitStream> {
    let path = cli.input_path.as_ref().context("<input-path> is required")?;
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(BitStream::from_bytes(&bytes))
}

fn write_output(cli: &Cli, bits: &BitStream) -> anyhow::Result<()> {
    let path = cli.output_path.as_ref().context("<output-path> is required")?;
    std::fs::write(path, bits.to_bytes()).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

fn run_encode(cli: &Cli) -> anyhow::Result<()> {
    let bits = read_input(cli)?;
    let compressed = sliced::compress_with(&bits, cli.symbol_size, cli.threshold, cli.slices)?;
    write_output(cli, &compressed)?;
    log::info!("encoded {} bits into {} bits", bits.len(), compressed.len());
    Ok(())
}

fn run_decode(cli: &Cli) -> anyhow::Result<()> {
    let bits = read_input(cli)?;
    let decompressed = sliced::decompress(&bits)?;
    write_output(cli, &decompressed)?;
    log::info!("decoded {} bits into {} bits", bits.len(), decompressed.len());
    Ok(())
}

/// Reproduces the original tool's demo report: entropy, average code
/// length, table size, and compression ratio, both for a plain Huffman
/// pass over the raw input and for Huffman run after Markov
/// pre-compression.
fn run_demo(cli: &Cli) -> anyhow::Result<()> {
    let bits = read_input(cli)?;
    let symbol_size = cli.symbol_size;

    let start = Instant::now();
    let mut huffman_raw = HuffmanTransducer::new(symbol_size);
    huffman_raw.setup(&bits);
    let raw_encoded = huffman_raw.encode(&bits);
    let raw_elapsed = start.elapsed();
    print_report("Huffman only", &huffman_raw, bits.len(), raw_encoded.len(), raw_elapsed);

    println!();

    let start = Instant::now();
    let mut markov = MarkovEncoder::new(symbol_size, cli.threshold);
    markov.setup(&bits);
    let markov_encoded = markov.encode(&bits);
    let mut huffman_pre = HuffmanTransducer::new(symbol_size);
    huffman_pre.setup(&markov_encoded);
    let pre_encoded = huffman_pre.encode(&markov_encoded);
    let pre_elapsed = start.elapsed();
    print_report("Markov + Huffman", &huffman_pre, bits.len(), pre_encoded.len(), pre_elapsed);

    Ok(())
}

fn print_report(label: &str, huffman: &HuffmanTransducer, input_bits: usize, encoded_bits: usize, elapsed: std::time::Duration) {
    let ratio = if encoded_bits == 0 { 0.0 } else { input_bits as f64 / encoded_bits as f64 };
    println!("-- {label} --");
    println!("entropy:           {:.4} bits/symbol", huffman.entropy());
    println!("avg code length:   {:.4} bits/symbol", huffman.avg_code_length());
    println!("table size:        {} symbols", huffman.table_size());
    println!("input size:        {input_bits} bits");
    println!("encoded size:      {encoded_bits} bits");
    println!("compression ratio: {ratio:.4}");
    println!("elapsed:           {elapsed:?}");
}
