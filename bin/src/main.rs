use anyhow::{bail, Context};
use cbor_codec::{diagnose_first, ByteStringBase, DiagOptions};
use clap::Parser;
use std::{
    fs::File,
    io::{stdin, stdout, Read, Write},
};

/// Render CBOR items in extended diagnostic notation, one per line.
#[derive(Parser, Debug)]
struct Args {
    /// Input file to process; use "-" for stdin
    #[clap(short, long, default_value = "-")]
    input: String,

    /// Output file to write; use "-" for stdout
    #[clap(short, long, default_value = "-")]
    output: String,

    /// Base for byte strings: 16, 32, 32hex or 64url
    #[clap(short, long, default_value = "16")]
    base: String,

    /// Render byte strings holding valid UTF-8 as text
    #[clap(short, long)]
    text: bool,

    /// Render byte strings holding well-formed CBOR as embedded items
    #[clap(short, long)]
    embedded: bool,

    /// Suffix floats with their encoded precision
    #[clap(short, long)]
    precision: bool,

    /// Do not print the item count to stderr
    #[clap(short, long)]
    quiet: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut input = if args.input == "-" {
        Box::new(stdin()) as Box<dyn Read>
    } else {
        Box::new(
            File::open(&args.input)
                .context(format!("opening input file `{}`", args.input))?,
        )
    };
    let mut output = if args.output == "-" {
        Box::new(stdout()) as Box<dyn Write>
    } else {
        Box::new(
            File::create(&args.output)
                .context(format!("opening output file `{}`", args.output))?,
        )
    };

    let opts = DiagOptions {
        byte_string_base: match args.base.as_str() {
            "16" => ByteStringBase::Base16,
            "32" => ByteStringBase::Base32,
            "32hex" => ByteStringBase::Base32Hex,
            "64url" => ByteStringBase::Base64Url,
            other => bail!("unknown byte string base `{}`", other),
        },
        bytes_as_text: args.text,
        embedded_cbor: args.embedded,
        float_precision: args.precision,
        ..DiagOptions::default()
    };

    let mut data = Vec::new();
    input.read_to_end(&mut data).context("reading input")?;

    let mut rest = data.as_slice();
    let mut count = 0usize;
    while !rest.is_empty() {
        let (text, r) = diagnose_first(rest, &opts)
            .with_context(|| format!("item {} at byte {}", count, data.len() - rest.len()))?;
        writeln!(&mut output, "{}", text)?;
        rest = r;
        count += 1;
    }

    if !args.quiet {
        eprintln!("Processed {} items", count);
    }
    Ok(())
}
