use camino::Utf8PathBuf;
use clap::Parser;
use library_aggregator::Result;
use library_aggregator::config::Config;

#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Output configuration file path
    #[arg(value_name = "PATH", default_value = "aggregate.yml")]
    pub output: Utf8PathBuf,
}

pub fn init_config(args: &InitArgs) -> Result<()> {
    Config::save_default_with_comments(&args.output)?;
    println!("Generated default configuration file: {}", args.output);
    Ok(())
}
