//! Quality and tidiness problems in the raw extract.
//!
//! Nothing here changes the data. The reports are how the cleaning rules were found, and they are
//! kept so the extract can be re-checked when a new delivery arrives.
use crate::{
    clean::patients::{KG_TO_LB, KG_WEIGHT_SURNAME, STATE_CODES},
    header, merge::NO_DOSE, patients, treatments, ArcStr, Drug, PatientId, RawPatient,
    RawTreatment, State, TrialData,
};
use noisy_float::prelude::*;
use std::collections::{BTreeMap, HashMap, HashSet};
use term_data_table::{Cell, Row, Table};

/// Recorded and recalculated HbA1c changes further apart than this are counted as wrong.
const HBA1C_TOLERANCE: f64 = 1e-6;

/// Everything we look at before cleaning.
#[derive(Debug, Clone)]
pub struct Assessment {
    pub patient_rows: usize,
    pub treatment_rows: usize,
    pub cut_treatment_rows: usize,
    pub adverse_reaction_rows: usize,
    /// Column names used by more than one table.
    pub duplicated_columns: Vec<&'static str>,
    pub missing_address: Vec<PatientId>,
    /// Most common first.
    pub surname_counts: Vec<(ArcStr, usize)>,
    /// Every patient whose (non-missing) address was already used by an earlier patient.
    pub duplicate_addresses: Vec<(PatientId, ArcStr)>,
    /// Lightest first.
    pub weights: Vec<(PatientId, ArcStr, f64)>,
    pub kg_weight_checks: Vec<KgWeightCheck>,
    pub dose_gaps: BTreeMap<Drug, DoseGaps>,
    pub zip_codes_not_5_digits: usize,
    pub full_state_names: usize,
    pub missing_hba1c_changes: usize,
    pub wrong_hba1c_changes: usize,
    pub stats: Vec<ColumnStats>,
}

impl Assessment {
    pub fn new(data: &TrialData) -> Self {
        let patients = &data.patients;
        let treatments = &data.treatments;
        Assessment {
            patient_rows: patients.len(),
            treatment_rows: treatments.len(),
            cut_treatment_rows: data.treatments_cut.len(),
            adverse_reaction_rows: data.adverse_reactions.len(),
            duplicated_columns: duplicated_columns(&[
                patients::RAW_COLUMNS,
                treatments::RAW_COLUMNS,
                treatments::ADVERSE_REACTION_COLUMNS,
            ]),
            missing_address: patients
                .iter()
                .filter(|pat| pat.address.is_none())
                .map(|pat| pat.patient_id)
                .collect(),
            surname_counts: surname_counts(patients),
            duplicate_addresses: duplicate_addresses(patients),
            weights: weights(patients),
            kg_weight_checks: patients
                .iter()
                .filter(|pat| &*pat.surname == KG_WEIGHT_SURNAME)
                .map(KgWeightCheck::new)
                .collect(),
            dose_gaps: Drug::ALL
                .iter()
                .map(|drug| (*drug, DoseGaps::count(treatments, *drug)))
                .collect(),
            zip_codes_not_5_digits: patients
                .iter()
                .filter_map(|pat| pat.zip_code.as_deref())
                .filter(|zip| zip.len() != 5 || !zip.bytes().all(|b| b.is_ascii_digit()))
                .count(),
            full_state_names: patients
                .iter()
                .filter(|pat| matches!(&pat.state, Some(State::Name(name)) if is_known_state(name)))
                .count(),
            missing_hba1c_changes: treatments
                .iter()
                .filter(|t| t.hba1c_change.is_none())
                .count(),
            wrong_hba1c_changes: treatments
                .iter()
                .filter(|t| match t.hba1c_change {
                    Some(change) => (change - (t.hba1c_start - t.hba1c_end)).abs() > HBA1C_TOLERANCE,
                    None => false,
                })
                .count(),
            stats: column_stats(patients, treatments),
        }
    }

    /// Print every report, showing at most `max_rows` rows of each listing.
    pub fn print(&self, max_rows: usize) {
        header("Extract");
        println!("patients: {} rows", self.patient_rows);
        println!(
            "treatments: {} rows (+ {} cut rows)",
            self.treatment_rows, self.cut_treatment_rows
        );
        println!("adverse reactions: {} rows", self.adverse_reaction_rows);

        header("Columns in more than one table");
        println!("{}", self.duplicated_columns.join(", "));

        header("Descriptive statistics");
        let mut table = Table::new().with_row(
            Row::new()
                .with_cell(Cell::from("Table"))
                .with_cell(Cell::from("Column"))
                .with_cell(Cell::from("Count"))
                .with_cell(Cell::from("Mean"))
                .with_cell(Cell::from("Min"))
                .with_cell(Cell::from("Max")),
        );
        for stats in &self.stats {
            table.add_row(
                Row::new()
                    .with_cell(Cell::from(stats.table))
                    .with_cell(Cell::from(stats.column))
                    .with_cell(Cell::from(stats.count.to_string()))
                    .with_cell(Cell::from(format_opt(stats.mean)))
                    .with_cell(Cell::from(format_opt(stats.min)))
                    .with_cell(Cell::from(format_opt(stats.max))),
            );
        }
        println!("{}", table);

        header("Patients with no address");
        println!("{:?}", self.missing_address);

        header("Surnames");
        let mut table = Table::new().with_row(
            Row::new()
                .with_cell(Cell::from("Surname"))
                .with_cell(Cell::from("Count")),
        );
        for (surname, count) in self.surname_counts.iter().take(max_rows) {
            table.add_row(
                Row::new()
                    .with_cell(Cell::from(surname.to_string()))
                    .with_cell(Cell::from(count.to_string())),
            );
        }
        println!("{}", table);

        header("Duplicated addresses");
        let mut table = Table::new().with_row(
            Row::new()
                .with_cell(Cell::from("Patient"))
                .with_cell(Cell::from("Address")),
        );
        for (id, address) in self.duplicate_addresses.iter().take(max_rows) {
            table.add_row(
                Row::new()
                    .with_cell(Cell::from(id.to_string()))
                    .with_cell(Cell::from(address.to_string())),
            );
        }
        println!("{}", table);

        header("Lowest weights");
        let mut table = Table::new().with_row(
            Row::new()
                .with_cell(Cell::from("Patient"))
                .with_cell(Cell::from("Surname"))
                .with_cell(Cell::from("Weight")),
        );
        for (id, surname, weight) in self.weights.iter().take(max_rows) {
            table.add_row(
                Row::new()
                    .with_cell(Cell::from(id.to_string()))
                    .with_cell(Cell::from(surname.to_string()))
                    .with_cell(Cell::from(weight.to_string())),
            );
        }
        println!("{}", table);

        header(&format!("{} weight unit", KG_WEIGHT_SURNAME));
        let mut table = Table::new().with_row(
            Row::new()
                .with_cell(Cell::from("Patient"))
                .with_cell(Cell::from("Weight"))
                .with_cell(Cell::from("Recorded BMI"))
                .with_cell(Cell::from("BMI (lb)"))
                .with_cell(Cell::from("BMI (kg)")),
        );
        for check in &self.kg_weight_checks {
            table.add_row(
                Row::new()
                    .with_cell(Cell::from(check.patient_id.to_string()))
                    .with_cell(Cell::from(check.weight.to_string()))
                    .with_cell(Cell::from(check.recorded_bmi.to_string()))
                    .with_cell(Cell::from(format!("{:.1}", check.bmi_as_lb)))
                    .with_cell(Cell::from(format!("{:.1}", check.bmi_as_kg))),
            );
        }
        println!("{}", table);

        header("Doses");
        let mut table = Table::new().with_row(
            Row::new()
                .with_cell(Cell::from("Drug"))
                .with_cell(Cell::from("Empty"))
                .with_cell(Cell::from(format!("\"{}\"", NO_DOSE))),
        );
        for (drug, gaps) in &self.dose_gaps {
            table.add_row(
                Row::new()
                    .with_cell(Cell::from(drug.label()))
                    .with_cell(Cell::from(gaps.empty.to_string()))
                    .with_cell(Cell::from(gaps.sentinel.to_string())),
            );
        }
        println!("{}", table);

        header("Other problems");
        println!("zip codes that aren't 5 digits: {}", self.zip_codes_not_5_digits);
        println!("full state names: {}", self.full_state_names);
        println!("missing HbA1c changes: {}", self.missing_hba1c_changes);
        println!("wrong HbA1c changes: {}", self.wrong_hba1c_changes);
    }
}

/// BMI for a patient's weight taken as pounds and as kilograms, next to the recorded BMI.
#[derive(Debug, Clone, PartialEq)]
pub struct KgWeightCheck {
    pub patient_id: PatientId,
    pub weight: f64,
    pub recorded_bmi: f64,
    pub bmi_as_lb: f64,
    pub bmi_as_kg: f64,
}

impl KgWeightCheck {
    fn new(pat: &RawPatient) -> Self {
        KgWeightCheck {
            patient_id: pat.patient_id,
            weight: pat.weight,
            recorded_bmi: pat.bmi,
            bmi_as_lb: crate::bmi(pat.weight, pat.height),
            bmi_as_kg: crate::bmi(pat.weight * KG_TO_LB, pat.height),
        }
    }
}

/// Rows without a dose for one drug.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct DoseGaps {
    /// Empty cell.
    pub empty: usize,
    /// [`NO_DOSE`].
    pub sentinel: usize,
}

impl DoseGaps {
    fn count(treatments: &[RawTreatment], drug: Drug) -> Self {
        let mut gaps = DoseGaps::default();
        for treatment in treatments {
            match treatment.dose(drug).map(|dose| &**dose) {
                None => gaps.empty += 1,
                Some(NO_DOSE) => gaps.sentinel += 1,
                Some(_) => (),
            }
        }
        gaps
    }
}

/// Count, mean and range of a numeric column, ignoring missing values.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnStats {
    pub table: &'static str,
    pub column: &'static str,
    pub count: usize,
    pub mean: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl ColumnStats {
    pub fn new(
        table: &'static str,
        column: &'static str,
        values: impl Iterator<Item = f64>,
    ) -> Self {
        let values: Vec<R64> = values.filter_map(R64::try_new).collect();
        let count = values.len();
        let mean = if count == 0 {
            None
        } else {
            Some(values.iter().map(|v| v.raw()).sum::<f64>() / count as f64)
        };
        ColumnStats {
            table,
            column,
            count,
            mean,
            min: values.iter().min().map(|v| v.raw()),
            max: values.iter().max().map(|v| v.raw()),
        }
    }
}

/// Column names that appear in more than one of `tables`, in order of their second appearance.
pub fn duplicated_columns<'a>(tables: &[&[&'a str]]) -> Vec<&'a str> {
    let mut seen = HashSet::new();
    let mut duplicated = Vec::new();
    for column in tables.iter().flat_map(|table| table.iter()) {
        if !seen.insert(*column) && !duplicated.contains(column) {
            duplicated.push(*column);
        }
    }
    duplicated
}

fn surname_counts(patients: &[RawPatient]) -> Vec<(ArcStr, usize)> {
    let mut counts: HashMap<ArcStr, usize> = HashMap::new();
    for pat in patients {
        *counts.entry(pat.surname.clone()).or_insert(0) += 1;
    }
    let mut counts: Vec<_> = counts.into_iter().collect();
    counts.sort_by(|(name1, count1), (name2, count2)| {
        count2.cmp(count1).then_with(|| name1.cmp(name2))
    });
    counts
}

fn duplicate_addresses(patients: &[RawPatient]) -> Vec<(PatientId, ArcStr)> {
    let mut seen = HashSet::new();
    patients
        .iter()
        .filter_map(|pat| {
            let address = pat.address.as_ref()?;
            if seen.insert(address.clone()) {
                None
            } else {
                Some((pat.patient_id, address.clone()))
            }
        })
        .collect()
}

fn weights(patients: &[RawPatient]) -> Vec<(PatientId, ArcStr, f64)> {
    let mut weights: Vec<_> = patients
        .iter()
        .filter_map(|pat| Some((pat.patient_id, pat.surname.clone(), R64::try_new(pat.weight)?)))
        .collect();
    weights.sort_by_key(|(_, _, weight)| *weight);
    weights
        .into_iter()
        .map(|(id, surname, weight)| (id, surname, weight.raw()))
        .collect()
}

fn column_stats(patients: &[RawPatient], treatments: &[RawTreatment]) -> Vec<ColumnStats> {
    vec![
        ColumnStats::new("patients", "weight", patients.iter().map(|p| p.weight)),
        ColumnStats::new("patients", "height", patients.iter().map(|p| p.height)),
        ColumnStats::new("patients", "bmi", patients.iter().map(|p| p.bmi)),
        ColumnStats::new(
            "treatments",
            "hba1c_start",
            treatments.iter().map(|t| t.hba1c_start),
        ),
        ColumnStats::new(
            "treatments",
            "hba1c_end",
            treatments.iter().map(|t| t.hba1c_end),
        ),
        ColumnStats::new(
            "treatments",
            "hba1c_change",
            treatments.iter().filter_map(|t| t.hba1c_change),
        ),
    ]
}

fn is_known_state(name: &str) -> bool {
    STATE_CODES.iter().any(|(full, _)| *full == name)
}

fn format_opt(value: Option<f64>) -> String {
    match value {
        Some(value) => format!("{:.2}", value),
        None => "-".into(),
    }
}

#[cfg(test)]
mod test {
    use super::{duplicated_columns, Assessment, ColumnStats, DoseGaps};
    use crate::{Drug, TrialData};
    use std::io::Cursor;

    fn sample() -> Assessment {
        let data = TrialData::from_readers(
            Cursor::new(include_str!("../../data/trial/patients.csv")),
            Cursor::new(include_str!("../../data/trial/treatments.csv")),
            Cursor::new(include_str!("../../data/trial/treatments_cut.csv")),
            Cursor::new(include_str!("../../data/trial/adverse_reactions.csv")),
        )
        .unwrap();
        Assessment::new(&data)
    }

    #[test]
    fn columns() {
        let tables: [&[&str]; 3] = [&["a", "b", "c"], &["b", "d"], &["b", "c"]];
        assert_eq!(duplicated_columns(&tables), vec!["b", "c"]);
    }

    #[test]
    fn stats() {
        let stats = ColumnStats::new("t", "c", [1., f64::NAN, 3.].into_iter());
        assert_eq!(stats.count, 2);
        assert_eq!(stats.mean, Some(2.));
        assert_eq!((stats.min, stats.max), (Some(1.), Some(3.)));
        assert_eq!(ColumnStats::new("t", "c", std::iter::empty()).mean, None);
    }

    #[test]
    fn sample_extract() {
        let assessment = sample();
        assert_eq!(assessment.patient_rows, 15);
        assert_eq!(assessment.cut_treatment_rows, 4);
        assert_eq!(assessment.duplicated_columns, vec!["given_name", "surname"]);
        assert_eq!(assessment.missing_address, vec![14]);

        let top: Vec<_> = assessment.surname_counts[..3]
            .iter()
            .map(|(name, count)| (&**name, *count))
            .collect();
        assert_eq!(top, vec![("Doe", 2), ("Jakobsen", 2), ("Taylor", 2)]);

        let dup_ids: Vec<_> = assessment.duplicate_addresses.iter().map(|(id, _)| *id).collect();
        assert_eq!(dup_ids, vec![9, 11, 13]);

        assert_eq!(assessment.weights[0].0, 6);
        let check = &assessment.kg_weight_checks[0];
        assert!((check.bmi_as_kg - check.recorded_bmi).abs() < 0.1);
        assert!((check.bmi_as_lb - check.recorded_bmi).abs() > 5.);

        assert_eq!(
            assessment.dose_gaps[&Drug::Auralin],
            DoseGaps {
                empty: 0,
                sentinel: 4
            }
        );
        assert_eq!(assessment.zip_codes_not_5_digits, 14);
        assert_eq!(assessment.full_state_names, 6);
        assert_eq!(assessment.missing_hba1c_changes, 2);
        assert_eq!(assessment.wrong_hba1c_changes, 1);
    }
}
