use anyhow::{Context, Result, bail};
use sfcodex_lib::prelude::*;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let paths: Vec<String> = std::env::args().skip(1).collect();
    if paths.is_empty() {
        bail!("usage: SFcodex <soundfile> [...]");
    }

    let registry = FormatRegistry::with_defaults();
    for path in &paths {
        let mut sf = SoundFile::open_read(path, &registry)
            .with_context(|| format!("cannot open {path}"))?;

        let format = sf.format().map(|t| t.name()).unwrap_or("?");
        let frames = sf.frames_remaining().unwrap_or(0);
        let seconds = frames as f64 / sf.samplerate() as f64;
        println!(
            "{path}: {format}, {} Hz, {} ch, {} bit, {} endian, {frames} frames ({seconds:.2}s)",
            sf.samplerate(),
            sf.nchannels(),
            sf.bytespersample() * 8,
            if sf.bigendian() { "big" } else { "little" },
        );
        sf.close()?;
    }
    Ok(())
}
