use clap::Parser;
use insulin_trial_cleaning::{assess::Assessment, TrialData};
use qu::ick_use::*;

#[derive(Debug, Parser)]
struct Opt {
    /// How many rows of each listing to print.
    #[clap(long, short, default_value_t = 10)]
    max_rows: usize,
}

#[qu::ick]
pub fn main(opt: Opt) -> Result {
    let data = TrialData::load()?;
    Assessment::new(&data).print(opt.max_rows);
    Ok(())
}
