// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Paper forms.
//
// The built-in table is fixed and read-only; user forms live in the
// configuration store.  Sizes are in thousandths of a millimetre and form
// names compare exactly.

use crate::error::{Result, SpoolError};
use crate::types::{FORM_BUILTIN, FormArea, FormInfo};

/// (name, width, height)
const BUILTIN_FORMS: &[(&str, u32, u32)] = &[
    ("Letter", 215_900, 279_400),
    ("Letter Small", 215_900, 279_400),
    ("Tabloid", 279_400, 431_800),
    ("Ledger", 431_800, 279_400),
    ("Legal", 215_900, 355_600),
    ("Statement", 139_700, 215_900),
    ("Executive", 184_150, 266_700),
    ("A3", 297_000, 420_000),
    ("A4", 210_000, 297_000),
    ("A4 Small", 210_000, 297_000),
    ("A5", 148_000, 210_000),
    ("B4 (JIS)", 257_000, 364_000),
    ("B5 (JIS)", 182_000, 257_000),
    ("Folio", 215_900, 330_200),
    ("Quarto", 215_000, 275_000),
    ("10x14", 254_000, 355_600),
    ("11x17", 279_400, 431_800),
    ("Note", 215_900, 279_400),
    ("Envelope #9", 98_425, 225_425),
    ("Envelope #10", 104_775, 241_300),
    ("Envelope #11", 114_300, 263_525),
    ("Envelope #12", 120_650, 279_400),
    ("Envelope #14", 127_000, 292_100),
    ("C size sheet", 431_800, 558_800),
    ("D size sheet", 558_800, 863_600),
    ("E size sheet", 863_600, 1_117_600),
    ("Envelope DL", 110_000, 220_000),
    ("Envelope C5", 162_000, 229_000),
    ("Envelope C3", 324_000, 458_000),
    ("Envelope C4", 229_000, 324_000),
    ("Envelope C6", 114_000, 162_000),
    ("Envelope C65", 114_000, 229_000),
    ("Envelope B4", 250_000, 353_000),
    ("Envelope B5", 176_000, 250_000),
    ("Envelope B6", 176_000, 125_000),
    ("Envelope", 110_000, 230_000),
    ("Envelope Monarch", 98_425, 190_500),
    ("6 3/4 Envelope", 92_075, 165_100),
    ("US Std Fanfold", 377_825, 279_400),
    ("German Std Fanfold", 215_900, 304_800),
    ("German Legal Fanfold", 215_900, 330_200),
    ("B4 (ISO)", 250_000, 353_000),
    ("Japanese Postcard", 100_000, 148_000),
    ("9x11", 228_600, 279_400),
    ("10x11", 254_000, 279_400),
    ("15x11", 381_000, 279_400),
    ("Envelope Invite", 220_000, 220_000),
    ("Letter Extra", 241_300, 304_800),
    ("Legal Extra", 241_300, 381_000),
    ("Tabloid Extra", 304_800, 457_200),
    ("A4 Extra", 235_458, 322_326),
    ("Letter Transverse", 215_900, 279_400),
    ("A4 Transverse", 210_000, 297_000),
    ("Letter Extra Transverse", 241_300, 304_800),
    ("Super A", 227_000, 356_000),
    ("Super B", 305_000, 487_000),
    ("Letter Plus", 215_900, 322_326),
    ("A4 Plus", 210_000, 330_000),
    ("A5 Transverse", 148_000, 210_000),
    ("B5 (JIS) Transverse", 182_000, 257_000),
    ("A3 Extra", 322_000, 445_000),
    ("A5 Extra", 174_000, 235_000),
    ("B5 (ISO) Extra", 201_000, 276_000),
    ("A2", 420_000, 594_000),
    ("A3 Transverse", 297_000, 420_000),
    ("A3 Extra Transverse", 322_000, 445_000),
    ("Japanese Double Postcard", 200_000, 148_000),
    ("A6", 105_000, 148_000),
    ("Japanese Envelope Kaku #2", 240_000, 332_000),
    ("Japanese Envelope Kaku #3", 216_000, 277_000),
    ("Japanese Envelope Chou #3", 120_000, 235_000),
    ("Japanese Envelope Chou #4", 90_000, 205_000),
    ("Letter Rotated", 279_400, 215_900),
    ("A3 Rotated", 420_000, 297_000),
    ("A4 Rotated", 297_000, 210_000),
    ("A5 Rotated", 210_000, 148_000),
    ("B4 (JIS) Rotated", 364_000, 257_000),
    ("B5 (JIS) Rotated", 257_000, 182_000),
    ("Japanese Postcard Rotated", 148_000, 100_000),
    ("Double Japan Postcard Rotated", 148_000, 200_000),
    ("A6 Rotated", 148_000, 105_000),
    ("Japan Envelope Kaku #2 Rotated", 332_000, 240_000),
    ("Japan Envelope Kaku #3 Rotated", 277_000, 216_000),
    ("Japan Envelope Chou #3 Rotated", 235_000, 120_000),
    ("Japan Envelope Chou #4 Rotated", 205_000, 90_000),
    ("B6 (JIS)", 128_000, 182_000),
    ("B6 (JIS) Rotated", 182_000, 128_000),
    ("12x11", 304_932, 279_521),
    ("Japan Envelope You #4", 105_000, 235_000),
    ("Japan Envelope You #4 Rotated", 235_000, 105_000),
    ("PRC 16K", 188_000, 260_000),
    ("PRC 32K", 130_000, 184_000),
    ("PRC 32K(Big)", 140_000, 203_000),
    ("PRC Envelope #1", 102_000, 165_000),
    ("PRC Envelope #2", 102_000, 176_000),
    ("PRC Envelope #3", 125_000, 176_000),
    ("PRC Envelope #4", 110_000, 208_000),
    ("PRC Envelope #5", 110_000, 220_000),
    ("PRC Envelope #6", 120_000, 230_000),
    ("PRC Envelope #7", 160_000, 230_000),
    ("PRC Envelope #8", 120_000, 309_000),
    ("PRC Envelope #9", 229_000, 324_000),
    ("PRC Envelope #10", 324_000, 458_000),
    ("PRC 16K Rotated", 260_000, 188_000),
    ("PRC 32K Rotated", 184_000, 130_000),
    ("PRC 32K(Big) Rotated", 203_000, 140_000),
    ("PRC Envelope #1 Rotated", 165_000, 102_000),
    ("PRC Envelope #2 Rotated", 176_000, 102_000),
    ("PRC Envelope #3 Rotated", 176_000, 125_000),
    ("PRC Envelope #4 Rotated", 208_000, 110_000),
    ("PRC Envelope #5 Rotated", 220_000, 110_000),
    ("PRC Envelope #6 Rotated", 230_000, 120_000),
    ("PRC Envelope #7 Rotated", 230_000, 160_000),
    ("PRC Envelope #8 Rotated", 309_000, 120_000),
    ("PRC Envelope #9 Rotated", 324_000, 229_000),
    ("PRC Envelope #10 Rotated", 458_000, 324_000),
];

fn builtin(&(name, width, height): &(&str, u32, u32)) -> FormInfo {
    FormInfo {
        flags: FORM_BUILTIN,
        ..FormInfo::new(name, width, height)
    }
}

/// Every built-in form, in table order.
pub fn builtin_forms() -> Vec<FormInfo> {
    BUILTIN_FORMS.iter().map(builtin).collect()
}

pub fn builtin_form(name: &str) -> Option<FormInfo> {
    BUILTIN_FORMS.iter().find(|(n, _, _)| *n == name).map(builtin)
}

pub fn is_builtin(name: &str) -> bool {
    BUILTIN_FORMS.iter().any(|(n, _, _)| *n == name)
}

/// Check a caller-supplied form: a non-empty name, a non-zero sheet and an
/// imageable area inside it.
pub fn validate(form: &FormInfo) -> Result<()> {
    if form.name.is_empty() {
        return Err(SpoolError::InvalidFormName(String::new()));
    }
    let FormArea {
        left,
        top,
        right,
        bottom,
    } = form.imageable;
    if form.width == 0
        || form.height == 0
        || left >= right
        || top >= bottom
        || right > form.width
        || bottom > form.height
    {
        return Err(SpoolError::InvalidFormSize(form.name.clone()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_lookup_is_exact() {
        let a4 = builtin_form("A4").expect("A4");
        assert_eq!((a4.width, a4.height), (210_000, 297_000));
        assert_eq!(a4.flags, FORM_BUILTIN);
        assert_eq!(a4.imageable.right, a4.width);
        assert!(builtin_form("a4").is_none());
        assert_eq!(builtin_forms().len(), BUILTIN_FORMS.len());
        assert_eq!(builtin_forms()[0].name, "Letter");
    }

    #[test]
    fn builtin_names_are_unique() {
        let mut names: Vec<&str> = BUILTIN_FORMS.iter().map(|(n, _, _)| *n).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), BUILTIN_FORMS.len());
    }

    #[test]
    fn imageable_area_must_fit_the_sheet() {
        validate(&FormInfo::new("Label", 100_000, 50_000)).expect("whole sheet");

        let mut form = FormInfo::new("Label", 100_000, 50_000);
        form.imageable.bottom = 60_000;
        assert!(matches!(validate(&form), Err(SpoolError::InvalidFormSize(_))));
        assert!(matches!(
            validate(&FormInfo::new("Flat", 100_000, 0)),
            Err(SpoolError::InvalidFormSize(_))
        ));
        assert!(matches!(
            validate(&FormInfo::new("", 1, 1)),
            Err(SpoolError::InvalidFormName(_))
        ));
    }
}
