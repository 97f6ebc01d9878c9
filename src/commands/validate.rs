use super::common::{Common, CommonArgs};
use clap::Parser;
use library_aggregator::Result;
use library_aggregator::pipeline::{self, FailurePolicy};

#[derive(Parser, Debug)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

/// Check every source document, reporting all problems rather than stopping at the first.
pub fn validate_sources(args: &ValidateArgs) -> Result<()> {
    let common = Common::new(&args.common)?;

    match pipeline::validate_sources(&common.data_dir, FailurePolicy::CollectErrors) {
        Ok(sources) => {
            println!("✓ {} library record(s) in {} are valid", sources.len(), common.data_dir);
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Validation failed: {e}");
            std::process::exit(1);
        }
    }
}
