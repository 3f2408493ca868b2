//! Reshaping the treatments table into one row per administered drug, then joining in adverse
//! reactions and patient IDs.
//!
//! The treatments extract has no patient ID, so the only way to connect a treatment to a patient
//! is by name. Names are lower case in the treatments and adverse reactions files, and title case
//! in the patients file, so matching is done on lower-cased names. Once a row has its patient ID
//! the names are dropped.
use crate::{
    AdverseReaction, ArcStr, DoseRecord, Drug, IdentifiedDose, PatientId, Patients, RawTreatment,
    Treatment, Treatments,
};
use qu::ick_use::*;
use std::collections::{hash_map::Entry, HashMap};

/// Written in a dose column when the patient wasn't given that drug.
pub const NO_DOSE: &str = "-";

/// Separates the start and end dose, e.g. `"41u - 48u"`.
pub const DOSE_SEPARATOR: &str = " - ";

/// Turn the `auralin` and `novodra` columns into one row per (patient, drug given), with the
/// dose split into start and end.
///
/// Rows come out grouped by drug (all Auralin, then all Novodra), each group in input order.
/// `hba1c_change` must already have been recalculated.
pub fn reshape_doses(treatments: Vec<RawTreatment>) -> Result<Vec<DoseRecord>> {
    let mut out = Vec::with_capacity(treatments.len());
    for drug in Drug::ALL {
        for (idx, treatment) in treatments.iter().enumerate() {
            // an empty cell means the same as the sentinel
            let dose = match treatment.dose(drug) {
                Some(dose) if &**dose != NO_DOSE => dose,
                _ => continue,
            };
            let (dose_start, dose_end) = split_dose(dose).with_context(|| {
                format!(
                    "treatment row {} ({} {}): {} dose \"{}\" is not of the form \"<start> - <end>\"",
                    idx, treatment.given_name, treatment.surname, drug, dose
                )
            })?;
            let hba1c_change = treatment.hba1c_change.with_context(|| {
                format!(
                    "treatment row {} ({} {}): HbA1c change missing (it should be recalculated \
                     before reshaping)",
                    idx, treatment.given_name, treatment.surname
                )
            })?;
            out.push(DoseRecord {
                given_name: treatment.given_name.clone(),
                surname: treatment.surname.clone(),
                drug,
                dose_start,
                dose_end,
                hba1c_start: treatment.hba1c_start,
                hba1c_end: treatment.hba1c_end,
                hba1c_change,
                adverse_reaction: None,
            });
        }
    }
    event!(
        Level::DEBUG,
        "reshaped {} treatment rows into {} doses",
        treatments.len(),
        out.len()
    );
    Ok(out)
}

/// Split `"41u - 48u"` into `("41u", "48u")`.
pub fn split_dose(dose: &str) -> Option<(ArcStr, ArcStr)> {
    let (start, end) = dose.split_once(DOSE_SEPARATOR)?;
    Some((start.trim().into(), end.trim().into()))
}

/// Left join adverse reactions onto the doses by (given name, surname).
///
/// The number of doses doesn't change. If a name has more than one adverse reaction, the first
/// is used.
pub fn attach_adverse_reactions(
    mut doses: Vec<DoseRecord>,
    reactions: &[AdverseReaction],
) -> Vec<DoseRecord> {
    let mut by_name: HashMap<(ArcStr, ArcStr), ArcStr> = HashMap::new();
    for reaction in reactions {
        match by_name.entry((reaction.given_name.clone(), reaction.surname.clone())) {
            Entry::Vacant(entry) => {
                entry.insert(reaction.adverse_reaction.clone());
            }
            Entry::Occupied(_) => event!(
                Level::WARN,
                "more than one adverse reaction for {} {}, keeping the first",
                reaction.given_name,
                reaction.surname
            ),
        }
    }

    let mut matched = 0;
    for dose in doses.iter_mut() {
        dose.adverse_reaction = by_name
            .get(&(dose.given_name.clone(), dose.surname.clone()))
            .cloned();
        matched += dose.adverse_reaction.is_some() as usize;
    }
    event!(
        Level::DEBUG,
        "{} of {} doses have an adverse reaction",
        matched,
        doses.len()
    );
    doses
}

/// Swap names for patient IDs, matching lower-cased (given name, surname).
///
/// Doses with no matching patient are dropped. If two patients share a name, doses go to the
/// first of them.
pub fn resolve_patient_ids(doses: Vec<DoseRecord>, patients: &Patients) -> Vec<IdentifiedDose> {
    let mut by_name: HashMap<(String, String), PatientId> = HashMap::new();
    for pat in patients.iter_ref() {
        let key = (pat.given_name.to_lowercase(), pat.surname.to_lowercase());
        match by_name.entry(key) {
            Entry::Vacant(entry) => {
                entry.insert(pat.patient_id);
            }
            Entry::Occupied(entry) => event!(
                Level::WARN,
                "patients {} and {} are both called {} {}, treatments will go to {}",
                entry.get(),
                pat.patient_id,
                pat.given_name,
                pat.surname,
                entry.get()
            ),
        }
    }

    let total = doses.len();
    let out: Vec<IdentifiedDose> = doses
        .into_iter()
        .filter_map(|dose| {
            let key = (dose.given_name.to_lowercase(), dose.surname.to_lowercase());
            let Some(patient_id) = by_name.get(&key).copied() else {
                event!(
                    Level::WARN,
                    "no patient called {} {}, dropping their {} treatment",
                    dose.given_name,
                    dose.surname,
                    dose.drug
                );
                return None;
            };
            Some(IdentifiedDose {
                patient_id,
                drug: dose.drug,
                dose_start: dose.dose_start,
                dose_end: dose.dose_end,
                hba1c_start: dose.hba1c_start,
                hba1c_end: dose.hba1c_end,
                hba1c_change: dose.hba1c_change,
                adverse_reaction: dose.adverse_reaction,
            })
        })
        .collect();
    event!(
        Level::INFO,
        "matched {} of {} treatments to patients by name",
        out.len(),
        total
    );
    out
}

/// Parse doses into whole units, giving the final treatments table.
pub fn coerce_doses(doses: Vec<IdentifiedDose>) -> Result<Treatments> {
    doses
        .into_iter()
        .map(|dose| {
            let dose_start = parse_dose(&dose.dose_start).with_context(|| {
                format!("patient {}: {} start dose", dose.patient_id, dose.drug)
            })?;
            let dose_end = parse_dose(&dose.dose_end)
                .with_context(|| format!("patient {}: {} end dose", dose.patient_id, dose.drug))?;
            Ok(Treatment {
                patient_id: dose.patient_id,
                treatment: dose.drug,
                dose_start,
                dose_end,
                hba1c_start: dose.hba1c_start,
                hba1c_end: dose.hba1c_end,
                hba1c_change: dose.hba1c_change,
                adverse_reaction: dose.adverse_reaction,
            })
        })
        .collect()
}

/// `"41u"` -> `41`
pub fn parse_dose(dose: &str) -> Result<u32> {
    dose.trim()
        .trim_matches('u')
        .parse()
        .with_context(|| format!("\"{}\" is not a whole number of units", dose))
}
