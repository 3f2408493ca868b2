//! The cleaning rules in the order they run, and the cleaned tables they produce.
use crate::{
    clean::{self, patients::STATE_CODES},
    merge, Drug, Patient, PatientId, Patients, Treatments, TrialData, PATIENTS_CLEAN_FILE,
    TREATMENTS_CLEAN_FILE,
};
use once_cell::sync::Lazy;
use qu::ick_use::*;
use regex::Regex;
use std::{collections::HashSet, path::Path};

static ZIP_CODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{5}$").unwrap());
static PHONE_NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{11}$").unwrap());

/// Run every rule over the raw extract.
///
/// Treatments are matched to patients by name only once the patients table is fully clean: the
/// name typo has to be fixed and the duplicate patients removed first, otherwise treatments end up
/// unmatched or matched twice.
pub fn run(data: TrialData) -> Result<CleanData> {
    let TrialData {
        patients,
        treatments,
        treatments_cut,
        adverse_reactions,
    } = data;

    let treatments = clean::treatments::append_missing(treatments, treatments_cut);
    let treatments = clean::treatments::recompute_hba1c_change(treatments);
    let patients = clean::patients::split_contact(patients);
    let doses = merge::reshape_doses(treatments).context("while reshaping doses")?;
    let doses = merge::attach_adverse_reactions(doses, &adverse_reactions);
    let patients = normalize_patients(patients);
    let patients = clean::patients::fix_weight_unit(patients);
    let doses = merge::resolve_patient_ids(doses, &patients);
    let treatments = merge::coerce_doses(doses).context("while converting doses to units")?;

    event!(
        Level::INFO,
        "cleaned data has {} patients and {} treatments",
        patients.len(),
        treatments.len()
    );
    Ok(CleanData {
        patients,
        treatments,
    })
}

/// The rules that take a patients table to a patients table, in order, apart from the weight
/// unit fix which only runs once.
pub fn normalize_patients(patients: Patients) -> Patients {
    use clean::patients::*;

    let patients = normalize_zip_codes(patients);
    let patients = fix_height_outlier(patients);
    let patients = abbreviate_states(patients);
    let patients = fix_given_name_typo(patients);
    let patients = normalize_phone_numbers(patients);
    let patients = remove_placeholder_records(patients);
    dedupe_addresses(patients)
}

/// The cleaned `patients` and `treatments` tables.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanData {
    pub patients: Patients,
    pub treatments: Treatments,
}

impl CleanData {
    /// Load tables previously written by [`CleanData::save`].
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        Ok(CleanData {
            patients: Patients::load_clean(dir.join(PATIENTS_CLEAN_FILE))?,
            treatments: Treatments::load_clean(dir.join(TREATMENTS_CLEAN_FILE))?,
        })
    }

    /// Write `patients_clean.csv` and `treatments_clean.csv` into `dir`.
    pub fn save(&self, dir: impl AsRef<Path>, overwrite: bool) -> Result {
        let dir = dir.as_ref();
        self.patients
            .save(dir.join(PATIENTS_CLEAN_FILE), overwrite)?;
        self.treatments
            .save(dir.join(TREATMENTS_CLEAN_FILE), overwrite)?;
        Ok(())
    }

    /// Run the rules that apply to already cleaned tables again, except the weight unit fix.
    /// Clean data comes back unchanged.
    pub fn renormalize(self) -> Self {
        CleanData {
            patients: normalize_patients(self.patients),
            treatments: clean::treatments::recompute_clean_hba1c_change(self.treatments),
        }
    }

    /// Patients whose recorded BMI is more than `tolerance` away from the BMI calculated from
    /// their weight and height.
    pub fn bmi_outliers(&self, tolerance: f64) -> impl Iterator<Item = &Patient> + '_ {
        self.patients
            .iter_ref()
            .filter(move |pat| !pat.bmi_consistent(tolerance))
    }

    /// Check the properties the cleaned tables should have, listing every violation in the error.
    ///
    /// BMI agreement is not checked here; see [`CleanData::bmi_outliers`].
    pub fn check(&self) -> Result {
        let mut problems = Vec::new();
        self.check_patients(&mut problems);
        self.check_treatments(&mut problems);
        if problems.is_empty() {
            return Ok(());
        }
        for problem in &problems {
            event!(Level::ERROR, "{}", problem);
        }
        bail!(
            "cleaned data has {} problem(s):\n  {}",
            problems.len(),
            problems.join("\n  ")
        )
    }

    fn check_patients(&self, problems: &mut Vec<String>) {
        let mut addresses = HashSet::new();
        for pat in self.patients.iter_ref() {
            let id = pat.patient_id;
            if let Some(zip) = &pat.zip_code {
                if !ZIP_CODE_RE.is_match(zip) {
                    problems.push(format!("patient {}: zip code \"{}\" is not 5 digits", id, zip));
                }
            }
            if let Some(phone) = &pat.phone_number {
                if !PHONE_NUMBER_RE.is_match(phone) {
                    problems.push(format!(
                        "patient {}: phone number \"{}\" is not 11 digits",
                        id, phone
                    ));
                }
            }
            if &*pat.surname == clean::patients::PLACEHOLDER_SURNAME {
                problems.push(format!("patient {}: placeholder record", id));
            }
            if let Some(address) = &pat.address {
                if !addresses.insert(address.clone()) {
                    problems.push(format!(
                        "patient {}: address \"{}\" already used",
                        id, address
                    ));
                }
            }
            if let Some(state) = &pat.state {
                if state.code().is_none()
                    && STATE_CODES.iter().any(|(name, _)| *name == state.as_str())
                {
                    problems.push(format!("patient {}: state \"{}\" not abbreviated", id, state));
                }
            }
            if !(pat.height > 0.) {
                problems.push(format!("patient {}: height {} is not positive", id, pat.height));
            }
        }
    }

    fn check_treatments(&self, problems: &mut Vec<String>) {
        let mut seen: HashSet<(PatientId, Drug)> = HashSet::new();
        for treatment in self.treatments.iter_ref() {
            let id = treatment.patient_id;
            if treatment.hba1c_change != treatment.hba1c_start - treatment.hba1c_end {
                problems.push(format!(
                    "treatment for patient {}: HbA1c change {} is not {} - {}",
                    id, treatment.hba1c_change, treatment.hba1c_start, treatment.hba1c_end
                ));
            }
            if !self.patients.contains_id(id) {
                problems.push(format!("treatment for unknown patient {}", id));
            }
            if !seen.insert((id, treatment.treatment)) {
                problems.push(format!(
                    "patient {} has more than one {} treatment",
                    id, treatment.treatment
                ));
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::{run, CleanData};
    use crate::{
        clean::patients::KG_TO_LB, read_csv, write_csv, Drug, Patient, State, Treatment,
        TrialData,
    };
    use std::io::Cursor;

    fn sample() -> TrialData {
        TrialData::from_readers(
            Cursor::new(include_str!("../../data/trial/patients.csv")),
            Cursor::new(include_str!("../../data/trial/treatments.csv")),
            Cursor::new(include_str!("../../data/trial/treatments_cut.csv")),
            Cursor::new(include_str!("../../data/trial/adverse_reactions.csv")),
        )
        .unwrap()
    }

    #[test]
    fn sample_data() {
        let clean = run(sample()).unwrap();
        clean.check().unwrap();

        let ids: Vec<_> = clean.patients.iter_ref().map(|p| p.patient_id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5, 6, 7, 10, 12, 14, 15]);
        assert_eq!(clean.treatments.len(), 11);
        assert_eq!(clean.bmi_outliers(1.0).count(), 0);

        let zoe = clean.patients.find_by_id(1).unwrap();
        assert_eq!(zoe.zip_code.as_deref(), Some("92390"));
        assert_eq!(zoe.state.as_ref().map(State::as_str), Some("CA"));
        assert_eq!(zoe.phone_number.as_deref(), Some("19517199170"));
        assert_eq!(zoe.email.as_deref(), Some("ZoeWellish@superrito.com"));

        let liem = clean.patients.find_by_id(4).unwrap();
        assert_eq!(liem.zip_code.as_deref(), Some("07095"));
        assert_eq!(liem.phone_number.as_deref(), Some("17326368246"));

        assert_eq!(clean.patients.find_by_id(5).unwrap().height, 72.);
        assert_eq!(clean.patients.find_by_id(6).unwrap().weight, 48.8 * KG_TO_LB);
        assert_eq!(&*clean.patients.find_by_id(7).unwrap().given_name, "David");

        let anna = clean.patients.find_by_id(14).unwrap();
        assert_eq!(anna.address, None);
        assert_eq!(anna.zip_code, None);
        assert_eq!(anna.phone_number, None);

        let pamela: Vec<&Treatment> = clean.treatments.for_patient(2).collect();
        assert_eq!(pamela.len(), 1);
        assert_eq!(pamela[0].treatment, Drug::Auralin);
        assert_eq!((pamela[0].dose_start, pamela[0].dose_end), (41, 48));
        assert_eq!(pamela[0].adverse_reaction.as_deref(), Some("hypoglycemia"));

        // matched only once the typo is fixed
        assert_eq!(clean.treatments.for_patient(7).count(), 1);
        // the cut rows are there
        assert_eq!(clean.treatments.for_patient(12).count(), 1);
        assert_eq!(
            clean.treatments.for_patient(14).next().unwrap().adverse_reaction.as_deref(),
            Some("hypoglycemia")
        );
        assert_eq!(clean.treatments.for_patient(1).next().unwrap().adverse_reaction, None);
    }

    #[test]
    fn idempotent() {
        let clean = run(sample()).unwrap();
        assert_eq!(clean.clone().renormalize(), clean);
    }

    #[test]
    fn csv_round_trip() {
        let clean = run(sample()).unwrap();

        let mut buf = Vec::new();
        write_csv(&clean.patients, &mut buf).unwrap();
        let patients: Vec<Patient> =
            read_csv(Cursor::new(&buf), crate::patients::CLEAN_COLUMNS).unwrap();

        let mut buf = Vec::new();
        write_csv(&clean.treatments, &mut buf).unwrap();
        let treatments: Vec<Treatment> =
            read_csv(Cursor::new(&buf), crate::treatments::CLEAN_COLUMNS).unwrap();

        let reloaded = CleanData {
            patients: patients.into_iter().collect(),
            treatments: treatments.into_iter().collect(),
        };
        assert_eq!(reloaded, clean);
        reloaded.check().unwrap();
    }

    /// The `check` error after `corrupt` has been applied to the cleaned sample.
    fn problems(corrupt: impl FnOnce(&mut CleanData)) -> String {
        let mut clean = run(sample()).unwrap();
        corrupt(&mut clean);
        clean.check().unwrap_err().to_string()
    }

    #[test]
    fn check_patient_problems() {
        let err = problems(|clean| {
            let pats = &mut clean.patients;
            pats.find_by_id_mut(2).unwrap().surname = "Doe".into();
            let zoe_address = pats.find_by_id(1).unwrap().address.clone();
            pats.find_by_id_mut(3).unwrap().address = zoe_address;
            pats.find_by_id_mut(4).unwrap().state = Some(State::new("New York"));
            pats.find_by_id_mut(5).unwrap().phone_number = Some("5551234567".into());
            pats.find_by_id_mut(7).unwrap().height = 0.;
        });
        assert!(err.starts_with("cleaned data has 5 problem(s)"), "{}", err);
        assert!(err.contains("patient 2: placeholder record"));
        assert!(err.contains("patient 3: address"));
        assert!(err.contains("patient 4: state \"New York\" not abbreviated"));
        assert!(err.contains("patient 5: phone number \"5551234567\" is not 11 digits"));
        assert!(err.contains("patient 7: height 0 is not positive"));
    }

    #[test]
    fn check_treatment_problems() {
        let err = problems(|clean| {
            clean.treatments.update(|t| {
                if t.patient_id == 1 {
                    t.hba1c_change += 1.;
                }
            });
        });
        assert!(err.contains("treatment for patient 1: HbA1c change"), "{}", err);

        let err = problems(|clean| {
            let dup = clean.treatments.for_patient(2).next().unwrap().clone();
            clean.treatments = clean
                .treatments
                .iter_ref()
                .cloned()
                .chain(std::iter::once(dup))
                .collect();
        });
        assert!(err.contains("patient 2 has more than one auralin treatment"), "{}", err);
    }

    #[test]
    fn check_catches_problems() {
        let mut clean = run(sample()).unwrap();
        clean.patients.find_by_id_mut(1).unwrap().zip_code = Some("2110".into());
        clean.patients.retain(|p| p.patient_id != 5);
        let err = clean.check().unwrap_err().to_string();
        assert!(err.contains("patient 1: zip code"));
        assert!(err.contains("unknown patient 5"));
    }
}
