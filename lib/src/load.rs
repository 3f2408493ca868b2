//! Reading the raw trial extract.
use crate::{
    load_csv, orig_path, patients, read_csv, treatments, AdverseReaction, RawPatient,
    RawTreatment, ADVERSE_REACTIONS_FILE, PATIENTS_FILE, TREATMENTS_CUT_FILE, TREATMENTS_FILE,
};
use qu::ick_use::*;
use std::{io, path::Path};

/// The raw extract, loaded whole into memory.
#[derive(Debug, Clone)]
pub struct TrialData {
    pub patients: Vec<RawPatient>,
    pub treatments: Vec<RawTreatment>,
    /// Rows that should have been in `treatments`.
    pub treatments_cut: Vec<RawTreatment>,
    pub adverse_reactions: Vec<AdverseReaction>,
}

impl TrialData {
    /// Load the extract from its usual location.
    pub fn load() -> Result<Self> {
        Self::load_dir(orig_path(""))
    }

    /// Load the four extract files from `dir`. All of them must be present and parse completely.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let this = TrialData {
            patients: load_csv(dir.join(PATIENTS_FILE), patients::RAW_COLUMNS)?,
            treatments: load_csv(dir.join(TREATMENTS_FILE), treatments::RAW_COLUMNS)?,
            treatments_cut: load_csv(dir.join(TREATMENTS_CUT_FILE), treatments::RAW_COLUMNS)?,
            adverse_reactions: load_csv(
                dir.join(ADVERSE_REACTIONS_FILE),
                treatments::ADVERSE_REACTION_COLUMNS,
            )?,
        };
        this.log_sizes();
        Ok(this)
    }

    /// Load the extract from in-memory csv data.
    pub fn from_readers(
        patients: impl io::Read,
        treatments: impl io::Read,
        treatments_cut: impl io::Read,
        adverse_reactions: impl io::Read,
    ) -> Result<Self> {
        let this = TrialData {
            patients: read_csv(patients, patients::RAW_COLUMNS).context("while loading patients")?,
            treatments: read_csv(treatments, treatments::RAW_COLUMNS)
                .context("while loading treatments")?,
            treatments_cut: read_csv(treatments_cut, treatments::RAW_COLUMNS)
                .context("while loading cut treatments")?,
            adverse_reactions: read_csv(adverse_reactions, treatments::ADVERSE_REACTION_COLUMNS)
                .context("while loading adverse reactions")?,
        };
        this.log_sizes();
        Ok(this)
    }

    fn log_sizes(&self) {
        event!(
            Level::DEBUG,
            "loaded {} patients, {} + {} treatments, {} adverse reactions",
            self.patients.len(),
            self.treatments.len(),
            self.treatments_cut.len(),
            self.adverse_reactions.len()
        );
    }
}
