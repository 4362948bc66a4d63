//! RTP stream conversion between capture files, live UDP sessions,
//! raw payload streams and readable traces.

pub mod config;
pub mod convert;
pub mod pacer;
pub mod session;

use std::time::Duration;

use anyhow::{Result, bail};

use crate::{
    config::{Config, Format},
    convert::Pipeline,
    pacer::{MediaClock, Pacer, WallClock},
    session::NetConfig,
};

/// Open both endpoints, pick the converter and stream until the input
/// ends.
///
/// Returns whether the run was clean; a caller turning this into an
/// exit status should fail on `Ok(false)` too.
pub fn run(config: Config) -> Result<bool> {
    let net = NetConfig::detect(config.remote, config.timeout.map(Duration::from_secs))?;

    let input = session::open_input(&config.input, config.input_format, &net)?;
    let output = session::open_output(&config.output, config.output_format, &net)?;

    let Some(pipeline) = Pipeline::select(input.format, output.format) else {
        if matches!(input.format, Format::Raw | Format::Text) {
            bail!("{} is an output-only format", input.format);
        }

        if output.format == Format::Dump && input.format == Format::Dump {
            bail!("dump to dump conversion is a copy, not a conversion");
        }

        bail!("no converter from {} to {}", input.format, output.format);
    };

    log::info!(
        "converting: input={}, output={}, from={}, to={}",
        config.input,
        config.output,
        input.format,
        output.format,
    );

    let pacer = if config.dump_time {
        Pacer::Wall(WallClock::start())
    } else {
        Pacer::Media(MediaClock::default())
    };

    pipeline.run(input, output, pacer)
}
