use anyhow::Result;
use clap::Parser;
use mimalloc::MiMalloc;
use rtpflow::config::Config;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() -> Result<()> {
    let config = Config::parse();
    simple_logger::init_with_level(config.log_level())?;

    if !rtpflow::run(config)? {
        std::process::exit(1);
    }

    Ok(())
}
