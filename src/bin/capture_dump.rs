use anyhow::{Context, Result, bail};
use clap::Parser;
use gnss_replay::capture::{CaptureFrame, CaptureReader, CapturedPayload};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(about = "Inspect a parser_cli capture, or compare two of them")]
struct Args {
    /// Capture file to read
    #[arg(long, short = 'i')]
    input: PathBuf,

    /// Print every payload as hex
    #[arg(long, default_value_t = false)]
    dump: bool,

    /// Maximum bytes of each payload to print when dumping
    #[arg(long, default_value_t = 64)]
    width: usize,

    /// Second capture to compare payload by payload
    #[arg(long)]
    against: Option<PathBuf>,
}

fn hex(bytes: &[u8], width: usize) -> String {
    let mut s: String = bytes.iter().take(width).map(|b| format!("{b:02x}")).collect();
    if bytes.len() > width {
        s.push_str("..");
    }
    s
}

/// Payloads of a capture, in order; the header is printed and dropped.
fn payloads(path: &PathBuf, verbose: bool) -> Result<impl Iterator<Item = Result<CapturedPayload>>> {
    let reader = CaptureReader::open(path).with_context(|| format!("open {:?}", path))?;
    Ok(reader.filter_map(move |frame| match frame {
        Ok(CaptureFrame::Header(h)) => {
            if verbose {
                eprintln!("Header: v{} {} ({}) created={}ns", h.version, h.source, h.format, h.created_unix_ns);
            }
            None
        }
        Ok(CaptureFrame::Payload(p)) => Some(Ok(p)),
        Err(e) => Some(Err(e.into())),
    }))
}

fn main() -> Result<()> {
    let args = Args::parse();

    let Some(other) = &args.against else {
        let mut count = 0u64;
        let mut bytes = 0u64;
        let mut hasher = crc32fast::Hasher::new();
        for p in payloads(&args.input, true)? {
            let p = p?;
            if args.dump {
                println!("seq={} len={} {}", p.seq, p.bytes.len(), hex(&p.bytes, args.width));
            }
            count += 1;
            bytes += p.bytes.len() as u64;
            hasher.update(&p.bytes);
        }
        eprintln!("Read {} payloads, {} bytes. Stream crc32={:#010x}", count, bytes, hasher.finalize());
        return Ok(());
    };

    let mut left = payloads(&args.input, false)?;
    let mut right = payloads(other, false)?;
    let mut index = 0u64;
    loop {
        match (left.next().transpose()?, right.next().transpose()?) {
            (None, None) => break,
            (Some(a), Some(b)) if a.bytes == b.bytes => index += 1,
            (Some(a), Some(b)) => bail!(
                "payload {} differs: {} bytes {} vs {} bytes {}",
                index,
                a.bytes.len(),
                hex(&a.bytes, args.width),
                b.bytes.len(),
                hex(&b.bytes, args.width)
            ),
            (Some(_), None) => bail!("{:?} has more payloads than {:?} (first extra at {})", args.input, other, index),
            (None, Some(_)) => bail!("{:?} has more payloads than {:?} (first extra at {})", other, args.input, index),
        }
    }
    eprintln!("Captures match: {} payloads", index);
    Ok(())
}
