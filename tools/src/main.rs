// Dump the boot diagnostic log out of a raw memory image
//
// Usage: bootlog-dump <image> [offset] [--base ADDR]
//
// Without an offset the image is scanned for a valid descriptor. --base is
// the physical address of the first image byte; it is only needed to check
// absolute (v4) descriptors, otherwise the address is taken from the
// descriptor itself.

use std::fs;
use std::io::{self, Write};

use bootlog_core::{
    BootPhase, DebugLevel, EntryIter, InfoSnapshot, LayoutKind, LOGGER_INFO_SIZE,
};

struct Args {
    image: String,
    offset: Option<usize>,
    base: Option<u64>,
}

fn parse_number(text: &str) -> Option<u64> {
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

fn usage(program: &str) -> ! {
    eprintln!("Usage: {} <image> [offset] [--base ADDR]", program);
    std::process::exit(1);
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("bootlog-dump");

    let mut image = None;
    let mut offset = None;
    let mut base = None;
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--base" => {
                i += 1;
                let value = args.get(i).and_then(|a| parse_number(a));
                base = Some(value.unwrap_or_else(|| usage(program)));
            }
            arg if image.is_none() => image = Some(arg.to_string()),
            arg if offset.is_none() => {
                offset = Some(parse_number(arg).unwrap_or_else(|| usage(program)) as usize)
            }
            _ => usage(program),
        }
        i += 1;
    }

    match image {
        Some(image) => Args { image, offset, base },
        None => usage(program),
    }
}

/// Address the descriptor at `offset` lived at when the image was taken.
fn descriptor_address(snapshot: &InfoSnapshot, offset: usize, base: Option<u64>) -> Option<u64> {
    match (base, snapshot.layout()?) {
        (Some(base), _) => Some(base + offset as u64),
        // Offsets are position independent, any address will do
        (None, LayoutKind::Offset) => Some(offset as u64),
        (None, LayoutKind::Absolute) => snapshot.log_buffer.checked_sub(LOGGER_INFO_SIZE as u64),
    }
}

/// Descriptor at `offset` and its used byte count, if self-consistent.
fn probe(data: &[u8], offset: usize, base: Option<u64>) -> Option<(InfoSnapshot, usize)> {
    let snapshot = InfoSnapshot::parse(data.get(offset..)?)?;
    let address = descriptor_address(&snapshot, offset, base)?;
    let used = snapshot.used(address)? as usize;
    let end = offset.checked_add(LOGGER_INFO_SIZE)?.checked_add(used)?;
    (end <= data.len()).then_some((snapshot, used))
}

/// First self-consistent descriptor at an 8-aligned image offset.
fn scan(data: &[u8], base: Option<u64>) -> Option<(usize, InfoSnapshot, usize)> {
    (0..data.len())
        .step_by(8)
        .take_while(|&off| off + LOGGER_INFO_SIZE <= data.len())
        .filter(|&off| &data[off..off + 4] == b"ALOG")
        .find_map(|off| probe(data, off, base).map(|(s, used)| (off, s, used)))
}

fn main() -> io::Result<()> {
    let args = parse_args();
    let data = fs::read(&args.image)?;

    let found = match args.offset {
        Some(off) => probe(&data, off, args.base).map(|(s, used)| (off, s, used)),
        None => scan(&data, args.base),
    };
    let Some((offset, snapshot, used)) = found else {
        eprintln!("ERROR: no valid boot log descriptor in {}", args.image);
        std::process::exit(1);
    };

    println!("Descriptor at image offset 0x{:X}", offset);
    println!(
        "  version {}  capacity {} bytes  used {} bytes  discarded {} bytes",
        snapshot.version, snapshot.log_buffer_size, used, snapshot.discarded_size
    );
    println!(
        "  permanent={} runtime={} virtual={} timer={} Hz",
        snapshot.in_permanent_ram,
        snapshot.at_runtime,
        snapshot.gone_virtual,
        snapshot.timer_frequency
    );

    let start = offset + LOGGER_INFO_SIZE;
    let mut entries = EntryIter::new(&data[start..start + used]);
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut count = 0usize;
    for entry in entries.by_ref() {
        let phase = BootPhase::from_u16(entry.phase()).map(BootPhase::name).unwrap_or("?");
        let ticks = entry.time_stamp().saturating_sub(snapshot.ticks_at_time);
        let ns = snapshot.elapsed_nanoseconds(ticks);
        write!(
            out,
            "[{:>6}.{:06}] {:<8} {:<7} ",
            ns / 1_000_000_000,
            (ns / 1_000) % 1_000_000,
            phase,
            DebugLevel::name(entry.level()),
        )?;
        out.write_all(entry.message())?;
        if !entry.message().ends_with(b"\n") {
            writeln!(out)?;
        }
        count += 1;
    }

    if entries.position() < used {
        eprintln!(
            "WARNING: stopped at offset 0x{:X} of 0x{:X} (unstamped or corrupt entry)",
            entries.position(),
            used
        );
    }
    eprintln!("{} entries", count);
    Ok(())
}
