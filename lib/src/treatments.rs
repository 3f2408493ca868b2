use crate::{load_csv, save_csv, util::optional_string, ArcStr, PatientId};
use itertools::Either;
use qu::ick_use::*;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt, iter,
    ops::Deref,
    path::Path,
    sync::Arc,
};

pub(crate) const RAW_COLUMNS: &[&str] = &[
    "given_name",
    "surname",
    "auralin",
    "novodra",
    "hba1c_start",
    "hba1c_end",
    "hba1c_change",
];

pub(crate) const ADVERSE_REACTION_COLUMNS: &[&str] =
    &["given_name", "surname", "adverse_reaction"];

pub(crate) const CLEAN_COLUMNS: &[&str] = &[
    "patient_id",
    "treatment",
    "dose_start",
    "dose_end",
    "hba1c_start",
    "hba1c_end",
    "hba1c_change",
    "adverse_reaction",
];

/// A row in `treatments.csv` (or `treatments_cut.csv`), as delivered.
///
/// Names are lower case, unlike in `patients.csv`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawTreatment {
    pub given_name: ArcStr,
    pub surname: ArcStr,
    /// `"<start>u - <end>u"`, or `"-"` when the patient wasn't given Auralin.
    #[serde(deserialize_with = "optional_string")]
    pub auralin: Option<ArcStr>,
    /// Same format as `auralin`.
    #[serde(deserialize_with = "optional_string")]
    pub novodra: Option<ArcStr>,
    pub hba1c_start: f64,
    pub hba1c_end: f64,
    /// Sometimes missing, sometimes wrong. Always recalculated.
    pub hba1c_change: Option<f64>,
}

impl RawTreatment {
    /// The dose column for `drug`, as written.
    pub fn dose(&self, drug: Drug) -> Option<&ArcStr> {
        match drug {
            Drug::Auralin => self.auralin.as_ref(),
            Drug::Novodra => self.novodra.as_ref(),
        }
    }
}

/// A row in `adverse_reactions.csv`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AdverseReaction {
    pub given_name: ArcStr,
    pub surname: ArcStr,
    pub adverse_reaction: ArcStr,
}

/// The insulin a patient was treated with.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Drug {
    /// Oral insulin under trial.
    Auralin,
    /// Injectable insulin, the comparator.
    Novodra,
}

impl Drug {
    pub const ALL: [Drug; 2] = [Drug::Auralin, Drug::Novodra];

    pub fn code(self) -> &'static str {
        match self {
            Drug::Auralin => "auralin",
            Drug::Novodra => "novodra",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Drug::Auralin => "Auralin (oral)",
            Drug::Novodra => "Novodra (injectable)",
        }
    }
}

impl fmt::Display for Drug {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One administered drug per row, still keyed by name and with doses as written (`"41u"`).
#[derive(Debug, Clone, PartialEq)]
pub struct DoseRecord {
    pub given_name: ArcStr,
    pub surname: ArcStr,
    pub drug: Drug,
    pub dose_start: ArcStr,
    pub dose_end: ArcStr,
    pub hba1c_start: f64,
    pub hba1c_end: f64,
    pub hba1c_change: f64,
    pub adverse_reaction: Option<ArcStr>,
}

/// A [`DoseRecord`] once the patient's name has been swapped for their ID.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentifiedDose {
    pub patient_id: PatientId,
    pub drug: Drug,
    pub dose_start: ArcStr,
    pub dose_end: ArcStr,
    pub hba1c_start: f64,
    pub hba1c_end: f64,
    pub hba1c_change: f64,
    pub adverse_reaction: Option<ArcStr>,
}

/// A row in the cleaned treatments table.
///
/// There is at most one row per (`patient_id`, `treatment`) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Treatment {
    pub patient_id: PatientId,
    pub treatment: Drug,
    /// Units.
    pub dose_start: u32,
    /// Units.
    pub dose_end: u32,
    pub hba1c_start: f64,
    pub hba1c_end: f64,
    /// `hba1c_start - hba1c_end`, exactly.
    pub hba1c_change: f64,
    #[serde(deserialize_with = "optional_string")]
    pub adverse_reaction: Option<ArcStr>,
}

impl Treatment {
    pub fn dose_change(&self) -> i64 {
        i64::from(self.dose_end) - i64::from(self.dose_start)
    }
}

/// The cleaned list of treatments, with a pre-built index for the `patient_id` field.
#[derive(Clone)]
pub struct Treatments {
    els: Arc<Vec<Treatment>>,
    id_idx: BTreeMap<PatientId, Vec<usize>>,
}

impl Treatments {
    /// Load a treatments table previously written by [`Treatments::save`].
    pub fn load_clean(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(load_csv(path, CLEAN_COLUMNS)?))
    }

    pub fn save(&self, path: impl AsRef<Path>, overwrite: bool) -> Result {
        save_csv(&self.els, path, overwrite)
    }

    pub fn for_patient(
        &self,
        patient_id: PatientId,
    ) -> impl Iterator<Item = &Treatment> + Clone + '_ {
        let idxs = match self.id_idx.get(&patient_id) {
            Some(idxs) => idxs,
            None => return Either::Left(iter::empty()),
        };
        Either::Right(idxs.iter().map(|idx| {
            self.els
                .get(*idx)
                .expect("inconsistent treatment patient_id index")
        }))
    }

    pub fn iter_ref(&self) -> impl Iterator<Item = &Treatment> + '_ {
        self.els.iter()
    }

    /// Apply `f` to every treatment in place.
    ///
    /// `f` must not change `patient_id`.
    pub fn update(&mut self, f: impl FnMut(&mut Treatment)) {
        Arc::make_mut(&mut self.els).iter_mut().for_each(f);
    }

    pub fn count_by_drug(&self) -> BTreeMap<Drug, usize> {
        let mut map = Drug::ALL.iter().map(|drug| (*drug, 0)).collect::<BTreeMap<_, _>>();
        for el in self.els.iter() {
            *map.entry(el.treatment).or_insert(0) += 1;
        }
        map
    }

    pub fn mean_hba1c_change(&self, drug: Drug) -> Option<f64> {
        mean(self.by_drug(drug).map(|el| el.hba1c_change))
    }

    pub fn mean_dose_change(&self, drug: Drug) -> Option<f64> {
        mean(self.by_drug(drug).map(|el| el.dose_change() as f64))
    }

    /// How often each adverse reaction was reported, per drug.
    pub fn count_adverse_reactions(&self) -> BTreeMap<(Drug, ArcStr), usize> {
        let mut map = BTreeMap::new();
        for el in self.els.iter() {
            if let Some(reaction) = &el.adverse_reaction {
                *map.entry((el.treatment, reaction.clone())).or_insert(0) += 1;
            }
        }
        map
    }

    fn by_drug(&self, drug: Drug) -> impl Iterator<Item = &Treatment> + '_ {
        self.els.iter().filter(move |el| el.treatment == drug)
    }

    fn new(els: Vec<Treatment>) -> Self {
        let mut this = Treatments {
            els: Arc::new(els),
            id_idx: BTreeMap::new(),
        };
        this.rebuild_id_map();
        this
    }

    fn rebuild_id_map(&mut self) {
        self.id_idx.clear();
        for (idx, el) in self.els.iter().enumerate() {
            self.id_idx
                .entry(el.patient_id)
                .or_insert_with(Vec::new)
                .push(idx);
        }
    }
}

impl Deref for Treatments {
    type Target = [Treatment];
    fn deref(&self) -> &Self::Target {
        &*self.els
    }
}

impl<'a> IntoIterator for &'a Treatments {
    type IntoIter = <&'a [Treatment] as IntoIterator>::IntoIter;
    type Item = &'a Treatment;
    fn into_iter(self) -> Self::IntoIter {
        self.els.iter()
    }
}

impl FromIterator<Treatment> for Treatments {
    fn from_iter<T>(iter: T) -> Self
    where
        T: IntoIterator<Item = Treatment>,
    {
        Self::new(iter.into_iter().collect())
    }
}

impl PartialEq for Treatments {
    fn eq(&self, other: &Self) -> bool {
        self.els == other.els
    }
}

impl fmt::Debug for Treatments {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Treatments")
            .field("els", &self.els)
            .finish()
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0., 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

#[cfg(test)]
mod test {
    use super::{Drug, Treatment, Treatments};

    fn treatment(patient_id: u32, drug: Drug, start: u32, end: u32) -> Treatment {
        Treatment {
            patient_id,
            treatment: drug,
            dose_start: start,
            dose_end: end,
            hba1c_start: 7.5,
            hba1c_end: 7.0,
            hba1c_change: 0.5,
            adverse_reaction: None,
        }
    }

    #[test]
    fn summaries() {
        let treatments: Treatments = vec![
            treatment(1, Drug::Auralin, 41, 48),
            treatment(2, Drug::Auralin, 30, 31),
            treatment(3, Drug::Novodra, 42, 39),
        ]
        .into_iter()
        .collect();
        let counts = treatments.count_by_drug();
        assert_eq!(counts[&Drug::Auralin], 2);
        assert_eq!(counts[&Drug::Novodra], 1);
        assert_eq!(treatments.mean_dose_change(Drug::Auralin), Some(4.));
        assert_eq!(treatments.mean_dose_change(Drug::Novodra), Some(-3.));
        assert_eq!(treatments.for_patient(3).count(), 1);
        assert_eq!(treatments.for_patient(4).count(), 0);
    }

    #[test]
    fn empty_mean() {
        let treatments: Treatments = vec![treatment(1, Drug::Auralin, 41, 48)]
            .into_iter()
            .collect();
        assert_eq!(treatments.mean_hba1c_change(Drug::Novodra), None);
    }
}
