//! Rules for the raw `treatments` table.
use crate::{RawTreatment, Treatments};
use qu::ick_use::*;

/// Add the rows delivered separately in `treatments_cut.csv`.
///
/// Row order is `treatments` followed by `cut`.
pub fn append_missing(
    mut treatments: Vec<RawTreatment>,
    cut: Vec<RawTreatment>,
) -> Vec<RawTreatment> {
    event!(
        Level::DEBUG,
        "appending {} cut treatment rows to {}",
        cut.len(),
        treatments.len()
    );
    treatments.extend(cut);
    treatments
}

/// Recalculate `hba1c_change` as `hba1c_start - hba1c_end`.
///
/// The extract has missing changes, and some where a leading 4 was read as a 9.
pub fn recompute_hba1c_change(mut treatments: Vec<RawTreatment>) -> Vec<RawTreatment> {
    let mut changed = 0;
    for treatment in treatments.iter_mut() {
        let change = treatment.hba1c_start - treatment.hba1c_end;
        if treatment.hba1c_change != Some(change) {
            treatment.hba1c_change = Some(change);
            changed += 1;
        }
    }
    event!(Level::DEBUG, "recalculated {} HbA1c changes", changed);
    treatments
}

/// Same as [`recompute_hba1c_change`], for treatments that are already clean.
pub fn recompute_clean_hba1c_change(mut treatments: Treatments) -> Treatments {
    treatments.update(|treatment| {
        treatment.hba1c_change = treatment.hba1c_start - treatment.hba1c_end;
    });
    treatments
}

#[cfg(test)]
mod test {
    use super::{append_missing, recompute_hba1c_change};
    use crate::RawTreatment;

    fn raw(name: &str, start: f64, end: f64, change: Option<f64>) -> RawTreatment {
        RawTreatment {
            given_name: name.into(),
            surname: "hill".into(),
            auralin: Some("41u - 48u".into()),
            novodra: Some("-".into()),
            hba1c_start: start,
            hba1c_end: end,
            hba1c_change: change,
        }
    }

    #[test]
    fn append() {
        let treatments = vec![raw("pamela", 7.56, 7.09, None)];
        let cut = vec![raw("anna", 7.72, 7.33, None), raw("sofia", 7.59, 7.16, None)];
        let all = append_missing(treatments, cut);
        assert_eq!(all.len(), 3);
        assert_eq!(&*all[2].given_name, "sofia");
    }

    #[test]
    fn hba1c_change() {
        let treatments = vec![
            raw("pamela", 7.56, 7.09, None),
            // leading 4 read as 9
            raw("jae", 7.68, 7.25, Some(0.93)),
        ];
        let once = recompute_hba1c_change(treatments);
        for el in once.iter() {
            assert_eq!(el.hba1c_change, Some(el.hba1c_start - el.hba1c_end));
        }
        assert_eq!(recompute_hba1c_change(once.clone()), once);
    }
}
