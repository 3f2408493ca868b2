//! Rules for the `patients` table.
//!
//! The corrections for individual patients (a height, a name, a weight) were found by inspecting
//! the extract by hand. They check for the exact problem they fix and do nothing otherwise.
use crate::{ArcStr, Patient, PatientId, Patients, RawPatient, State, StateCode};
use once_cell::sync::Lazy;
use qu::ick_use::*;
use regex::Regex;
use std::collections::HashSet;

/// Pounds per kilogram.
pub const KG_TO_LB: f64 = 2.20462;

/// How far apart recorded and calculated BMI can be before we treat them as disagreeing.
pub const BMI_TOLERANCE: f64 = 1.0;

/// Full state names seen in the extract, with their postal codes.
pub const STATE_CODES: &[(&str, &str)] = &[
    ("California", "CA"),
    ("New York", "NY"),
    ("Illinois", "IL"),
    ("Florida", "FL"),
    ("Nebraska", "NE"),
];

/// Tim Neudorf's height, with the digits swapped.
pub const MISRECORDED_HEIGHT: f64 = 27.;
pub const CORRECTED_HEIGHT: f64 = 72.;

pub const MISSPELLED_GIVEN_NAME: &str = "Dsvid";
pub const CORRECTED_GIVEN_NAME: &str = "David";

/// Surname of the unrecoverable default records (John Doe, 123 Main Street).
pub const PLACEHOLDER_SURNAME: &str = "Doe";

/// Surname of the patient whose weight was recorded in kilograms.
pub const KG_WEIGHT_SURNAME: &str = "Zaitseva";

/// Optional country code, area code, exchange, line number. Separators are optional.
static PHONE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\+\d{1,2}\s)?\(?\d{3}\)?[\s.-]?\d{3}[\s.-]?\d{4}").unwrap()
});

/// The local part must start with a letter, otherwise we pick up the tail of a phone number.
static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[a-zA-Z][a-zA-Z0-9_.+-]+@[a-zA-Z0-9-]+\.[a-zA-Z0-9.-][a-zA-Z]+").unwrap()
});

static NON_DIGIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\D+").unwrap());

/// Split `contact` into `phone_number` and `email`, dropping `contact`.
///
/// Either part is `None` if nothing in `contact` looks like it.
pub fn split_contact(patients: Vec<RawPatient>) -> Patients {
    let mut no_phone = 0;
    let mut no_email = 0;
    let patients: Patients = patients
        .into_iter()
        .map(|raw| {
            let contact = raw.contact.as_deref().unwrap_or("");
            let phone_number = extract_phone(contact);
            let email = extract_email(contact);
            no_phone += phone_number.is_none() as usize;
            no_email += email.is_none() as usize;
            Patient {
                patient_id: raw.patient_id,
                assigned_sex: raw.assigned_sex,
                given_name: raw.given_name,
                surname: raw.surname,
                address: raw.address,
                city: raw.city,
                state: raw.state,
                zip_code: raw.zip_code,
                country: raw.country,
                birthdate: raw.birthdate,
                weight: raw.weight,
                height: raw.height,
                bmi: raw.bmi,
                phone_number,
                email,
            }
        })
        .collect();
    event!(
        Level::DEBUG,
        "split contact details: {} without phone number, {} without email",
        no_phone,
        no_email
    );
    patients
}

/// The first phone number in `contact`, as written.
pub fn extract_phone(contact: &str) -> Option<ArcStr> {
    PHONE_RE.find(contact).map(|m| m.as_str().into())
}

/// The first email address in `contact`.
pub fn extract_email(contact: &str) -> Option<ArcStr> {
    EMAIL_RE.find(contact).map(|m| m.as_str().into())
}

/// Zip codes were stored as floats, so they may end in `.0` and have lost a leading zero.
pub fn normalize_zip_codes(mut patients: Patients) -> Patients {
    patients.update(|pat| pat.zip_code = pat.zip_code.as_deref().and_then(normalize_zip_code));
    patients
}

/// Strip a trailing `.0` and left-pad to 5 characters with `0`.
///
/// Missing values stay missing rather than becoming a padded placeholder.
pub fn normalize_zip_code(zip: &str) -> Option<ArcStr> {
    let zip = zip.trim();
    let zip = zip.strip_suffix(".0").unwrap_or(zip);
    if zip.is_empty() || zip.eq_ignore_ascii_case("nan") {
        return None;
    }
    Some(format!("{:0>5}", zip).into())
}

pub fn fix_height_outlier(mut patients: Patients) -> Patients {
    patients.update(|pat| {
        if pat.height == MISRECORDED_HEIGHT {
            event!(
                Level::DEBUG,
                "patient {}: height {} -> {}",
                pat.patient_id,
                MISRECORDED_HEIGHT,
                CORRECTED_HEIGHT
            );
            pat.height = CORRECTED_HEIGHT;
        }
    });
    patients
}

/// Replace the full state names in [`STATE_CODES`] with postal codes. Other values are left
/// alone.
pub fn abbreviate_states(mut patients: Patients) -> Patients {
    patients.update(|pat| pat.state = pat.state.take().map(abbreviate_state));
    patients
}

pub fn abbreviate_state(state: State) -> State {
    let code = match &state {
        State::Name(name) => state_code(name),
        State::Code(_) => None,
    };
    code.map(State::Code).unwrap_or(state)
}

fn state_code(name: &str) -> Option<StateCode> {
    STATE_CODES
        .iter()
        .find(|(full, _)| *full == name)
        .map(|(_, code)| StateCode::try_from(*code).expect("state code table is valid"))
}

pub fn fix_given_name_typo(mut patients: Patients) -> Patients {
    patients.update(|pat| {
        if &*pat.given_name == MISSPELLED_GIVEN_NAME {
            pat.given_name = CORRECTED_GIVEN_NAME.into();
        }
    });
    patients
}

/// Store phone numbers as bare digits, with the US country code.
pub fn normalize_phone_numbers(mut patients: Patients) -> Patients {
    patients.update(|pat| {
        pat.phone_number = pat
            .phone_number
            .as_deref()
            .and_then(normalize_phone_number)
    });
    patients
}

/// Strip everything but digits and left-pad to 11 digits with `1`.
pub fn normalize_phone_number(phone: &str) -> Option<ArcStr> {
    let digits = NON_DIGIT_RE.replace_all(phone, "");
    if digits.is_empty() {
        return None;
    }
    Some(format!("{:1>11}", digits).into())
}

/// Remove the default John Doe records. There is nothing in them to recover.
pub fn remove_placeholder_records(mut patients: Patients) -> Patients {
    let before = patients.len();
    patients.retain(|pat| &*pat.surname != PLACEHOLDER_SURNAME);
    event!(
        Level::DEBUG,
        "removed {} placeholder records",
        before - patients.len()
    );
    patients
}

/// Remove patients whose (non-missing) address has already been seen, keeping the first.
///
/// In the extract these are the same person entered again under a nickname (Jake Jakobsen, Pat
/// Gersten, Sandy Taylor), and the nicknames never appear in the treatments.
pub fn dedupe_addresses(mut patients: Patients) -> Patients {
    let before = patients.len();
    let mut seen = HashSet::new();
    patients.retain(|pat| match &pat.address {
        Some(address) => seen.insert(address.clone()),
        None => true,
    });
    event!(
        Level::DEBUG,
        "removed {} patients with duplicate addresses",
        before - patients.len()
    );
    patients
}

/// Convert the weight of the patient recorded in kilograms to pounds.
///
/// The patient is picked by surname, and converted only while their weight is the lowest in the
/// table. Not idempotent: if the converted weight is still the lowest, running again converts it
/// again.
pub fn fix_weight_unit(mut patients: Patients) -> Patients {
    let Some(min_weight) = patients.min_weight() else {
        return patients;
    };
    let ids: Vec<PatientId> = patients
        .find_by_surname(KG_WEIGHT_SURNAME)
        .filter(|pat| pat.weight == min_weight)
        .map(|pat| pat.patient_id)
        .collect();
    for id in ids {
        if let Some(pat) = patients.find_by_id_mut(id) {
            event!(
                Level::INFO,
                "patient {}: converting weight {}kg to pounds",
                id,
                pat.weight
            );
            pat.weight *= KG_TO_LB;
            if !pat.bmi_consistent(BMI_TOLERANCE) {
                event!(
                    Level::WARN,
                    "patient {}: recorded BMI {} still disagrees with weight {:.1}lb",
                    id,
                    pat.bmi,
                    pat.weight
                );
            }
        }
    }
    patients
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::patients::test_patient;

    fn patients(els: Vec<Patient>) -> Patients {
        els.into_iter().collect()
    }

    #[test]
    fn contact() {
        let contact = "555-123-4567 jdoe@example.com";
        let phone = extract_phone(contact).unwrap();
        assert_eq!(&*phone, "555-123-4567");
        assert_eq!(normalize_phone_number(&phone).as_deref(), Some("15551234567"));
        assert_eq!(extract_email(contact).as_deref(), Some("jdoe@example.com"));

        // run together, as they are in the extract
        let contact = "PamelaSHill@cuvox.de+1 (217) 569-3204";
        assert_eq!(extract_phone(contact).as_deref(), Some("+1 (217) 569-3204"));
        assert_eq!(extract_email(contact).as_deref(), Some("PamelaSHill@cuvox.de"));
        let contact = "951-719-9170ZoeWellish@superrito.com";
        assert_eq!(extract_phone(contact).as_deref(), Some("951-719-9170"));
        assert_eq!(extract_email(contact).as_deref(), Some("ZoeWellish@superrito.com"));
    }

    #[test]
    fn contact_no_match() {
        assert_eq!(extract_phone("call the office"), None);
        assert_eq!(extract_email("1jdoe@example.com"), Some("jdoe@example.com".into()));
        assert_eq!(extract_email("no email here"), None);
    }

    #[test]
    fn phone_numbers() {
        assert_eq!(normalize_phone_number("+1 (217) 569-3204").as_deref(), Some("12175693204"));
        assert_eq!(normalize_phone_number("402.363.6804").as_deref(), Some("14023636804"));
        assert_eq!(normalize_phone_number("12175693204").as_deref(), Some("12175693204"));
        assert_eq!(normalize_phone_number("()-"), None);
    }

    #[test]
    fn zip_codes() {
        assert_eq!(normalize_zip_code("92390.0").as_deref(), Some("92390"));
        assert_eq!(normalize_zip_code("7095.0").as_deref(), Some("07095"));
        assert_eq!(normalize_zip_code("2110").as_deref(), Some("02110"));
        assert_eq!(normalize_zip_code("02110").as_deref(), Some("02110"));
        assert_eq!(normalize_zip_code("nan"), None);
        assert_eq!(normalize_zip_code(""), None);
    }

    #[test]
    fn states() {
        assert_eq!(abbreviate_state(State::new("New York")), State::new("NY"));
        assert_eq!(abbreviate_state(State::new("NY")), State::new("NY"));
        assert_eq!(abbreviate_state(State::new("Texas")), State::new("Texas"));
    }

    #[test]
    fn height() {
        let mut tim = test_patient(5, "Tim", "Neudorf");
        tim.height = 27.;
        let fixed = fix_height_outlier(patients(vec![tim]));
        assert_eq!(fixed.find_by_id(5).unwrap().height, 72.);
    }

    #[test]
    fn given_name() {
        let fixed = fix_given_name_typo(patients(vec![test_patient(7, "Dsvid", "Gustafsson")]));
        assert_eq!(&*fixed.find_by_id(7).unwrap().given_name, "David");
    }

    #[test]
    fn placeholders_and_duplicates() {
        let mut doe = test_patient(8, "John", "Doe");
        doe.address = Some("123 Main Street".into());
        let mut doe2 = doe.clone();
        doe2.patient_id = 9;
        let sandra = test_patient(10, "Sandra", "Taylor");
        let mut sandy = sandra.clone();
        sandy.patient_id = 11;
        sandy.given_name = "Sandy".into();
        let mut no_address = test_patient(14, "Anna", "Nowak");
        no_address.address = None;
        let mut no_address2 = test_patient(16, "Elliot", "Richardson");
        no_address2.address = None;

        let cleaned = dedupe_addresses(remove_placeholder_records(patients(vec![
            doe,
            doe2,
            sandra,
            sandy,
            no_address,
            no_address2,
        ])));
        let ids: Vec<_> = cleaned.iter_ref().map(|pat| pat.patient_id).collect();
        assert_eq!(ids, vec![10, 14, 16]);
    }

    #[test]
    fn weight_unit() {
        let zoe = test_patient(1, "Zoe", "Wellish");
        let mut tanya = test_patient(6, "Tanya", "Zaitseva");
        tanya.weight = 48.8;
        tanya.height = 63.;
        tanya.bmi = 19.1;
        let mut anna = test_patient(14, "Anna", "Nowak");
        anna.weight = 102.1;
        anna.height = 62.;
        anna.bmi = 18.7;

        let fixed = fix_weight_unit(patients(vec![zoe, tanya, anna]));
        assert_eq!(fixed.find_by_id(6).unwrap().weight, 48.8 * KG_TO_LB);
        assert_eq!(fixed.min_weight(), Some(102.1));
        // no longer the lightest, so nothing more happens
        assert_eq!(fix_weight_unit(fixed.clone()), fixed);
    }

    #[test]
    fn weight_unit_bmi_disagrees() {
        let zoe = test_patient(1, "Zoe", "Wellish");
        let mut tanya = test_patient(6, "Tanya", "Zaitseva");
        // recorded BMI (19.6) matches neither pounds nor kilograms
        tanya.weight = 48.8;
        let fixed = fix_weight_unit(patients(vec![zoe, tanya]));
        assert_eq!(fixed.find_by_id(6).unwrap().weight, 48.8 * KG_TO_LB);
        assert_eq!(fixed.find_by_id(1).unwrap().weight, 121.7);
        // still the lightest, so a second run converts again
        let twice = fix_weight_unit(fixed);
        assert_eq!(twice.find_by_id(6).unwrap().weight, 48.8 * KG_TO_LB * KG_TO_LB);
    }

    #[test]
    fn weight_unit_other_patient() {
        // the lightest patient isn't the one recorded in kilograms
        let mut tanya = test_patient(6, "Tanya", "Zaitseva");
        tanya.weight = 130.;
        let mut anna = test_patient(14, "Anna", "Nowak");
        anna.weight = 48.8;
        anna.height = 63.;
        anna.bmi = 19.1;
        let before = patients(vec![tanya, anna]);
        assert_eq!(fix_weight_unit(before.clone()), before);
    }
}
