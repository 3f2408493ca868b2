use clap::Parser;
use insulin_trial_cleaning::{
    clean::patients::BMI_TOLERANCE, header, output_path, pipeline, ResultExt, TrialData,
};
use qu::ick_use::*;

#[derive(Parser)]
struct Opt {
    /// Replace cleaned files left by a previous run.
    #[clap(long, short)]
    overwrite: bool,
}

#[qu::ick]
pub fn main(opt: Opt) -> Result {
    let data = TrialData::load()?;

    header("Before cleaning");
    println!("total patients: {}", data.patients.len());
    println!(
        "total treatments: {} (+ {} cut)",
        data.treatments.len(),
        data.treatments_cut.len()
    );
    println!("total adverse reactions: {}", data.adverse_reactions.len());

    let clean = pipeline::run(data)?;

    header("After cleaning");
    println!("total patients: {}", clean.patients.len());
    println!("total treatments: {}", clean.treatments.len());
    println!(
        "treatments with an adverse reaction: {}",
        clean
            .treatments
            .iter_ref()
            .filter(|t| t.adverse_reaction.is_some())
            .count()
    );

    // Not an error: the recorded BMI is kept as delivered.
    for pat in clean.bmi_outliers(BMI_TOLERANCE) {
        event!(
            Level::WARN,
            "patient {}: recorded BMI is {} but weight and height give {:.1}",
            pat.patient_id,
            pat.bmi,
            pat.computed_bmi()
        );
    }

    clean
        .check()
        .print_error()
        .context("refusing to write cleaned data")?;

    // write out clean data
    clean.save(output_path(""), opt.overwrite)?;
    Ok(())
}
