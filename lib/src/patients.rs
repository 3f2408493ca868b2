use crate::{
    load_csv, save_csv,
    util::{optional_string, trial_date},
    ArcStr, PatientId, RangeSet, RangeSetCounts, RangeSetCountsWithMissing,
};
use chrono::{Datelike, NaiveDate};
use noisy_float::prelude::*;
use qu::ick_use::*;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, ops::Deref, path::Path, str, sync::Arc};

pub(crate) const RAW_COLUMNS: &[&str] = &[
    "patient_id",
    "assigned_sex",
    "given_name",
    "surname",
    "address",
    "city",
    "state",
    "zip_code",
    "country",
    "contact",
    "birthdate",
    "weight",
    "height",
    "bmi",
];

pub(crate) const CLEAN_COLUMNS: &[&str] = &[
    "patient_id",
    "assigned_sex",
    "given_name",
    "surname",
    "address",
    "city",
    "state",
    "zip_code",
    "country",
    "birthdate",
    "weight",
    "height",
    "bmi",
    "phone_number",
    "email",
];

/// A row in `patients.csv`, as delivered.
///
/// `contact` holds a phone number and/or an email address run together with no separator, and
/// `zip_code` is whatever text the extract contains (sometimes `"2110.0"`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawPatient {
    pub patient_id: PatientId,
    pub assigned_sex: Sex,
    pub given_name: ArcStr,
    pub surname: ArcStr,
    /// Street address.
    #[serde(deserialize_with = "optional_string")]
    pub address: Option<ArcStr>,
    #[serde(deserialize_with = "optional_string")]
    pub city: Option<ArcStr>,
    pub state: Option<State>,
    #[serde(deserialize_with = "optional_string")]
    pub zip_code: Option<ArcStr>,
    #[serde(deserialize_with = "optional_string")]
    pub country: Option<ArcStr>,
    #[serde(deserialize_with = "optional_string")]
    pub contact: Option<ArcStr>,
    #[serde(deserialize_with = "trial_date")]
    pub birthdate: NaiveDate,
    /// Pounds, apart from the odd entry recorded in kilograms.
    pub weight: f64,
    /// Inches.
    pub height: f64,
    pub bmi: f64,
}

/// A row in the cleaned patients table.
///
/// `patient_id` identifies the same patient here and in [`Treatment`](crate::Treatment).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub patient_id: PatientId,
    pub assigned_sex: Sex,
    pub given_name: ArcStr,
    pub surname: ArcStr,
    #[serde(deserialize_with = "optional_string")]
    pub address: Option<ArcStr>,
    #[serde(deserialize_with = "optional_string")]
    pub city: Option<ArcStr>,
    pub state: Option<State>,
    /// 5 digits, once cleaned.
    #[serde(deserialize_with = "optional_string")]
    pub zip_code: Option<ArcStr>,
    #[serde(deserialize_with = "optional_string")]
    pub country: Option<ArcStr>,
    #[serde(deserialize_with = "trial_date")]
    pub birthdate: NaiveDate,
    pub weight: f64,
    pub height: f64,
    pub bmi: f64,
    /// 11 digits including the country code, once cleaned.
    #[serde(deserialize_with = "optional_string")]
    pub phone_number: Option<ArcStr>,
    #[serde(deserialize_with = "optional_string")]
    pub email: Option<ArcStr>,
}

impl Patient {
    /// Age in whole years on `date`.
    pub fn age_at(&self, date: NaiveDate) -> i32 {
        let mut age = date.year() - self.birthdate.year();
        if (date.month(), date.day()) < (self.birthdate.month(), self.birthdate.day()) {
            age -= 1;
        }
        age
    }

    /// BMI calculated from the recorded weight and height.
    pub fn computed_bmi(&self) -> f64 {
        bmi(self.weight, self.height)
    }

    /// Whether the recorded BMI agrees with weight and height to within `tolerance`.
    pub fn bmi_consistent(&self, tolerance: f64) -> bool {
        (self.computed_bmi() - self.bmi).abs() <= tolerance
    }
}

/// BMI from imperial units.
pub fn bmi(weight_lb: f64, height_in: f64) -> f64 {
    703. * weight_lb / (height_in * height_in)
}

/// The cleaned list of patients, with a pre-built index for the `patient_id` field.
#[derive(Clone)]
pub struct Patients {
    els: Arc<Vec<Patient>>,
    id_idx: BTreeMap<PatientId, usize>,
}

impl Patients {
    /// Load a patients table previously written by [`Patients::save`].
    pub fn load_clean(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(load_csv(path, CLEAN_COLUMNS)?))
    }

    pub fn save(&self, path: impl AsRef<Path>, overwrite: bool) -> Result {
        save_csv(&self.els, path, overwrite)
    }

    pub fn find_by_id(&self, id: PatientId) -> Option<&Patient> {
        let idx = self.id_idx.get(&id)?;
        self.els.get(*idx)
    }

    /// Note this will clone the patients internally if they are shared. Other clones of `self`
    /// will not be updated
    pub fn find_by_id_mut(&mut self, id: PatientId) -> Option<&mut Patient> {
        let idx = self.id_idx.get(&id)?;
        Arc::make_mut(&mut self.els).get_mut(*idx)
    }

    pub fn find_by_surname<'a>(&'a self, surname: &'a str) -> impl Iterator<Item = &'a Patient> {
        self.els.iter().filter(move |pat| &*pat.surname == surname)
    }

    pub fn contains_id(&self, id: PatientId) -> bool {
        self.id_idx.contains_key(&id)
    }

    pub fn iter_ref(&self) -> impl Iterator<Item = &Patient> + '_ {
        self.els.iter()
    }

    pub fn retain(&mut self, f: impl FnMut(&Patient) -> bool) {
        Arc::make_mut(&mut self.els).retain(f);
        self.rebuild_index();
    }

    /// Apply `f` to every patient in place.
    ///
    /// `f` must not change `patient_id`.
    pub fn update(&mut self, f: impl FnMut(&mut Patient)) {
        Arc::make_mut(&mut self.els).iter_mut().for_each(f);
    }

    /// The lowest recorded weight, ignoring NaNs.
    pub fn min_weight(&self) -> Option<f64> {
        self.els
            .iter()
            .filter_map(|pat| R64::try_new(pat.weight))
            .min()
            .map(|w| w.raw())
    }

    pub fn count_sexes(&self) -> BTreeMap<Sex, usize> {
        // B Tree so we get a predictable ordering.
        let mut map = BTreeMap::new();
        // Manually insert to make sure all categories are included.
        map.insert(Sex::Male, 0);
        map.insert(Sex::Female, 0);
        for el in self.els.iter() {
            *map.entry(el.assigned_sex).or_insert(0) += 1;
        }
        map
    }

    /// Patients per state. Missing states are counted under `None`.
    pub fn count_states(&self) -> BTreeMap<Option<State>, usize> {
        let mut map = BTreeMap::new();
        for el in self.els.iter() {
            *map.entry(el.state.clone()).or_insert(0) += 1;
        }
        map
    }

    pub fn bucket_ages(&self, ranges: &RangeSet<u32>, on: NaiveDate) -> RangeSetCounts<u32> {
        ranges.clone().bucket_values(
            self.els
                .iter()
                .map(|pat| u32::try_from(pat.age_at(on)).unwrap_or(0)),
        )
    }

    /// Recorded BMIs. NaNs are counted as missing.
    pub fn bucket_bmis(&self, ranges: &RangeSet<R64>) -> RangeSetCountsWithMissing<R64> {
        ranges
            .clone()
            .bucket_values_with_missing(self.els.iter().map(|pat| R64::try_new(pat.bmi)))
    }

    fn new(els: Vec<Patient>) -> Self {
        let mut this = Patients {
            els: els.into(),
            id_idx: BTreeMap::new(),
        };
        this.rebuild_index();
        this
    }

    fn rebuild_index(&mut self) {
        self.id_idx.clear();
        for (idx, el) in self.els.iter().enumerate() {
            self.id_idx.insert(el.patient_id, idx);
        }
    }
}

impl Deref for Patients {
    type Target = [Patient];
    fn deref(&self) -> &Self::Target {
        &*self.els
    }
}

impl<'a> IntoIterator for &'a Patients {
    type IntoIter = <&'a [Patient] as IntoIterator>::IntoIter;
    type Item = &'a Patient;
    fn into_iter(self) -> Self::IntoIter {
        self.els.iter()
    }
}

impl FromIterator<Patient> for Patients {
    fn from_iter<T>(iter: T) -> Self
    where
        T: IntoIterator<Item = Patient>,
    {
        Self::new(iter.into_iter().collect())
    }
}

impl PartialEq for Patients {
    fn eq(&self, other: &Self) -> bool {
        self.els == other.els
    }
}

impl fmt::Debug for Patients {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Patients").field("els", &self.els).finish()
    }
}

// Sub-types

/// The extract only contains 'male' and 'female'. If another value is added in the future,
/// loading will fail, forcing us to handle the situation.
///
/// Ordering is arbitrary.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize, Hash, Ord, PartialOrd)]
pub enum Sex {
    #[serde(rename = "male", alias = "Male", alias = "M")]
    Male,
    #[serde(rename = "female", alias = "Female", alias = "F")]
    Female,
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Sex::Male => f.write_str("Male"),
            Sex::Female => f.write_str("Female"),
        }
    }
}

/// A two letter US postal code, e.g. `NY`.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct StateCode([u8; 2]);

impl StateCode {
    pub fn from_bytes(v: &[u8]) -> Result<Self> {
        ensure!(
            v.len() == 2,
            "expected a 2 character state code, found {} characters",
            v.len()
        );
        ensure!(
            v.iter().all(u8::is_ascii_uppercase),
            "state codes contain characters [A-Z]"
        );
        Ok(StateCode([v[0], v[1]]))
    }

    pub fn as_str(&self) -> &str {
        str::from_utf8(&self.0).expect("we know we are an ascii string")
    }
}

impl fmt::Debug for StateCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for StateCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl<'a> TryFrom<&'a str> for StateCode {
    type Error = Error;
    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::from_bytes(s.as_bytes())
    }
}

/// The state part of a patient's address, as a category.
///
/// The extract mixes postal codes with full names; anything that isn't a valid code is kept as
/// written.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum State {
    Code(StateCode),
    Name(ArcStr),
}

impl State {
    pub fn new(input: &str) -> Self {
        let input = input.trim();
        match StateCode::try_from(input) {
            Ok(code) => State::Code(code),
            Err(_) => State::Name(input.into()),
        }
    }

    pub fn code(&self) -> Option<StateCode> {
        match self {
            State::Code(code) => Some(*code),
            State::Name(_) => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            State::Code(code) => code.as_str(),
            State::Name(name) => &**name,
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for State {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        s.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for State {
    fn deserialize<D>(deserializer: D) -> Result<State, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s: String = Deserialize::deserialize(deserializer)?;
        Ok(State::new(&s))
    }
}

#[cfg(test)]
mod test {
    use super::{State, StateCode};
    use chrono::NaiveDate;

    #[test]
    fn state_codes() {
        assert_eq!(StateCode::try_from("NY").unwrap().as_str(), "NY");
        assert!(StateCode::try_from("ny").is_err());
        assert!(StateCode::try_from("NYC").is_err());
    }

    #[test]
    fn states() {
        assert_eq!(State::new(" CA ").code().map(|c| c.to_string()), Some("CA".into()));
        let name = State::new("New York");
        assert_eq!(name.code(), None);
        assert_eq!(name.to_string(), "New York");
    }

    #[test]
    fn age() {
        let pat = super::test_patient(1, "Zoe", "Wellish");
        // born 1976-07-10
        assert_eq!(pat.age_at(NaiveDate::from_ymd_opt(2017, 7, 9).unwrap()), 40);
        assert_eq!(pat.age_at(NaiveDate::from_ymd_opt(2017, 7, 10).unwrap()), 41);
    }

    #[test]
    fn retain_rebuilds_index() {
        let mut patients: super::Patients = vec![
            super::test_patient(1, "Zoe", "Wellish"),
            super::test_patient(2, "Pamela", "Hill"),
        ]
        .into_iter()
        .collect();
        patients.retain(|pat| pat.patient_id != 1);
        assert!(patients.find_by_id(1).is_none());
        assert_eq!(&*patients.find_by_id(2).unwrap().surname, "Hill");
    }
}

/// A plausible cleaned patient, for tests elsewhere in the crate.
#[cfg(test)]
pub(crate) fn test_patient(id: PatientId, given_name: &str, surname: &str) -> Patient {
    Patient {
        patient_id: id,
        assigned_sex: Sex::Female,
        given_name: given_name.into(),
        surname: surname.into(),
        address: Some(format!("{} Brown Bear Drive", id).into()),
        city: Some("Rancho California".into()),
        state: Some(State::new("CA")),
        zip_code: Some("92390".into()),
        country: Some("United States".into()),
        birthdate: NaiveDate::from_ymd_opt(1976, 7, 10).unwrap(),
        weight: 121.7,
        height: 66.,
        bmi: 19.6,
        phone_number: Some("19517199170".into()),
        email: Some("ZoeWellish@superrito.com".into()),
    }
}
