//! Cleaning for the oral insulin (Auralin vs. Novodra) phase II trial extract.
//!
//! The raw extract is three csv files (patients, treatments and adverse reactions) plus a
//! supplement of treatment rows that were cut from the main file. Cleaning is a fixed sequence of
//! rules, each a total function from one typed table to the next; see [`pipeline::run`] for the
//! declared order.
pub mod assess;
pub mod clean;
mod load;
pub mod merge;
mod patients;
pub mod pipeline;
mod range;
mod treatments;
mod util;

pub use anyhow::{Context, Error};
use qu::ick_use::*;
use serde::{de::DeserializeOwned, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

pub use crate::{
    load::TrialData,
    patients::{bmi, Patient, Patients, RawPatient, Sex, State, StateCode},
    pipeline::CleanData,
    range::{Range, RangeSet, RangeSetCounts, RangeSetCountsWithMissing},
    treatments::{
        AdverseReaction, DoseRecord, Drug, IdentifiedDose, RawTreatment, Treatment, Treatments,
    },
    util::{header, ResultExt},
};

pub type ArcStr = Arc<str>;
pub type Result<T = (), E = anyhow::Error> = std::result::Result<T, E>;
pub type PatientId = u32;

pub const PATIENTS_FILE: &str = "patients.csv";
pub const TREATMENTS_FILE: &str = "treatments.csv";
/// Treatment rows missing from `treatments.csv`, delivered separately.
pub const TREATMENTS_CUT_FILE: &str = "treatments_cut.csv";
pub const ADVERSE_REACTIONS_FILE: &str = "adverse_reactions.csv";
pub const PATIENTS_CLEAN_FILE: &str = "patients_clean.csv";
pub const TREATMENTS_CLEAN_FILE: &str = "treatments_clean.csv";

/// Parse csv rows, after checking the header row is exactly `columns`.
///
/// Rows with the wrong number of fields are an error (the reader is not flexible).
fn read_csv<T: DeserializeOwned>(reader: impl io::Read, columns: &[&str]) -> Result<Vec<T>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = reader.headers()?.clone();
    ensure!(
        headers.iter().eq(columns.iter().copied()),
        "expected columns {:?}, found {:?}",
        columns,
        headers.iter().collect::<Vec<_>>()
    );
    reader
        .into_deserialize()
        .collect::<Result<Vec<T>, _>>()
        .map_err(Into::into)
}

/// Load a whole csv file into memory.
fn load_csv<T: DeserializeOwned>(path: impl AsRef<Path>, columns: &[&str]) -> Result<Vec<T>> {
    fn inner<T: DeserializeOwned>(path: &Path, columns: &[&str]) -> Result<Vec<T>> {
        let reader = io::BufReader::new(fs::File::open(path)?);
        read_csv(reader, columns)
    }
    let path = path.as_ref();
    inner(path, columns).with_context(|| format!("while loading \"{}\"", path.display()))
}

fn write_csv<T: Serialize>(contents: &[T], writer: impl io::Write) -> Result {
    let mut writer = csv::Writer::from_writer(writer);
    for row in contents {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Save rows to a csv file, with a header row.
fn save_csv<T: Serialize>(contents: &[T], path: impl AsRef<Path>, overwrite: bool) -> Result {
    fn inner<T: Serialize>(contents: &[T], path: &Path, overwrite: bool) -> Result {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("could not create parent")?;
        }
        if util::path_exists(path)? {
            ensure!(overwrite, "file already exists");
            event!(
                Level::WARN,
                "overwriting existing file at \"{}\"",
                path.display()
            );
        }
        write_csv(contents, io::BufWriter::new(fs::File::create(path)?))
    }
    let path = path.as_ref();
    inner(contents, path, overwrite)
        .with_context(|| format!("unable to save data to \"{}\"", path.display()))
}

/// Where the raw trial extract lives.
///
/// Note: No protection from escaping the root directory.
pub fn orig_path(input: impl AsRef<Path>) -> PathBuf {
    Path::new("../data/trial").join(input)
}

/// Note: No protection from escaping the root directory.
pub fn output_path(input: impl AsRef<Path>) -> PathBuf {
    Path::new("../data/output").join(input)
}
