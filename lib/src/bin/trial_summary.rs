use chrono::Utc;
use insulin_trial_cleaning::{header, output_path, CleanData, RangeSet};
use noisy_float::prelude::*;
use qu::ick_use::*;
use term_data_table::{Cell, Row, Table};

#[qu::ick]
pub fn main() -> Result {
    let CleanData {
        patients,
        treatments,
    } = CleanData::load(output_path(""))?;
    let patients_len = patients.len();

    header("Data stats");
    println!("total patients: {}", patients_len);
    println!("total treatments: {}", treatments.len());
    println!(
        "patients with no treatment: {}",
        patients
            .iter_ref()
            .filter(|pat| treatments.for_patient(pat.patient_id).next().is_none())
            .count()
    );

    header("Sexes");
    let mut table = Table::new().with_row(
        Row::new()
            .with_cell(Cell::from("Sex"))
            .with_cell(Cell::from("Count"))
            .with_cell(Cell::from("Percentage")),
    );
    for (label, count) in patients.count_sexes() {
        table.add_row(
            Row::new()
                .with_cell(Cell::from(label.to_string()))
                .with_cell(Cell::from(count.to_string()))
                .with_cell(Cell::from(format!(
                    "{:.1}%",
                    count as f64 / patients_len as f64 * 100.
                ))),
        );
    }
    println!("{}", table);

    header("States");
    let mut table = Table::new().with_row(
        Row::new()
            .with_cell(Cell::from("State"))
            .with_cell(Cell::from("Count"))
            .with_cell(Cell::from("Percentage")),
    );
    for (state, count) in patients.count_states() {
        let label = match state {
            Some(state) => state.to_string(),
            None => "missing data".into(),
        };
        table.add_row(
            Row::new()
                .with_cell(Cell::from(label))
                .with_cell(Cell::from(count.to_string()))
                .with_cell(Cell::from(format!(
                    "{:.1}%",
                    count as f64 / patients_len as f64 * 100.
                ))),
        );
    }
    println!("{}", table);

    header("Ages");
    let age_buckets = RangeSet::from_bounds([0u32, 18, 35, 50, 65, 80]);
    let mut table = Table::new().with_row(
        Row::new()
            .with_cell(Cell::from("Age range"))
            .with_cell(Cell::from("Count"))
            .with_cell(Cell::from("Percentage")),
    );
    let today = Utc::now().naive_utc().date();
    for (label, count) in patients.bucket_ages(&age_buckets, today).iter() {
        table.add_row(
            Row::new()
                .with_cell(Cell::from(label.to_string()))
                .with_cell(Cell::from(count.to_string()))
                .with_cell(Cell::from(format!(
                    "{:.1}%",
                    count as f64 / patients_len as f64 * 100.
                ))),
        );
    }
    println!("{}", table);

    header("BMI");
    let bmi_buckets = RangeSet::from_bounds([r64(0.), r64(18.5), r64(25.), r64(30.)]);
    let mut table = Table::new().with_row(
        Row::new()
            .with_cell(Cell::from("BMI range"))
            .with_cell(Cell::from("Count"))
            .with_cell(Cell::from("Percentage")),
    );
    for (label, count) in patients.bucket_bmis(&bmi_buckets).for_display() {
        table.add_row(
            Row::new()
                .with_cell(Cell::from(label.to_string()))
                .with_cell(Cell::from(count.to_string()))
                .with_cell(Cell::from(format!(
                    "{:.1}%",
                    count as f64 / patients_len as f64 * 100.
                ))),
        );
    }
    println!("{}", table);

    header("Treatments");
    let mut table = Table::new().with_row(
        Row::new()
            .with_cell(Cell::from("Treatment"))
            .with_cell(Cell::from("Count"))
            .with_cell(Cell::from("Mean dose change (u)"))
            .with_cell(Cell::from("Mean HbA1c change")),
    );
    for (drug, count) in treatments.count_by_drug() {
        let fmt_mean = |mean: Option<f64>| match mean {
            Some(mean) => format!("{:.2}", mean),
            None => "-".to_string(),
        };
        table.add_row(
            Row::new()
                .with_cell(Cell::from(drug.label()))
                .with_cell(Cell::from(count.to_string()))
                .with_cell(Cell::from(fmt_mean(treatments.mean_dose_change(drug))))
                .with_cell(Cell::from(fmt_mean(treatments.mean_hba1c_change(drug)))),
        );
    }
    println!("{}", table);

    header("Adverse reactions");
    let mut table = Table::new().with_row(
        Row::new()
            .with_cell(Cell::from("Treatment"))
            .with_cell(Cell::from("Reaction"))
            .with_cell(Cell::from("Count"))
            .with_cell(Cell::from("Percentage of treatment")),
    );
    let drug_counts = treatments.count_by_drug();
    for ((drug, reaction), count) in treatments.count_adverse_reactions() {
        let drug_count = drug_counts.get(&drug).copied().unwrap_or(0);
        table.add_row(
            Row::new()
                .with_cell(Cell::from(drug.label()))
                .with_cell(Cell::from(reaction.to_string()))
                .with_cell(Cell::from(count.to_string()))
                .with_cell(Cell::from(format!(
                    "{:.1}%",
                    count as f64 / drug_count as f64 * 100.
                ))),
        );
    }
    println!("{}", table);

    Ok(())
}
