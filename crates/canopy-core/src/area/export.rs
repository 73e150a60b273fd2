//! CSV rendering of the per-parcel report.
//!
//! Every field is quoted. Class and change cells are blank when the area is
//! zero (including areas suppressed as noise); the total area is always
//! written.

use std::io::Write;

use csv::{QuoteStyle, WriterBuilder};

use super::ParcelReport;
use crate::change::ChangeClass;
use crate::error::Result;
use crate::samples::ClassLabel;

/// `Lote, Area_Total_ha, <Class>_<tag>_ha ×7, FF_ha, AC_ha, CH_ha, DI_ha, FR_ha`
pub fn header(tag: &str) -> Vec<String> {
    let mut cols = vec!["Lote".to_string(), "Area_Total_ha".to_string()];
    cols.extend(ClassLabel::ALL.iter().map(|l| format!("{}_{tag}_ha", l.name())));
    cols.extend(ChangeClass::ALL.iter().map(|c| format!("{}_ha", c.abbreviation())));
    cols
}

/// Shortest decimal form, always with a fractional part (`3.0`, `12.35`).
fn format_ha(v: f64) -> String {
    let s = v.to_string();
    if s.contains('.') || s.contains('e') || !v.is_finite() {
        s
    } else {
        format!("{s}.0")
    }
}

fn cell(v: f64) -> String {
    if v > 0.0 {
        format_ha(v)
    } else {
        String::new()
    }
}

pub fn write_csv<W: Write>(writer: W, report: &ParcelReport, tag: &str) -> Result<()> {
    let mut out = WriterBuilder::new().quote_style(QuoteStyle::Always).from_writer(writer);
    out.write_record(header(tag))?;
    for row in &report.rows {
        let mut record = vec![row.name.clone(), format_ha(row.total_ha)];
        record.extend(ClassLabel::ALL.iter().map(|l| cell(row.class_ha.get(l).copied().unwrap_or(0.0))));
        record.extend(ChangeClass::ALL.iter().map(|c| cell(row.change_ha.get(c).copied().unwrap_or(0.0))));
        out.write_record(&record)?;
    }
    out.flush()?;
    Ok(())
}

pub fn to_csv_string(report: &ParcelReport, tag: &str) -> Result<String> {
    let mut buf = Vec::new();
    write_csv(&mut buf, report, tag)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::area::{suppress_noise, ParcelAreaReport};

    fn report(class_ha: f64, di_ha: f64) -> ParcelReport {
        ParcelReport {
            rows: vec![ParcelAreaReport {
                index: 0,
                name: "Lote_1".into(),
                total_ha: 25.0,
                class_ha: ClassLabel::ALL
                    .iter()
                    .map(|&l| (l, if l == ClassLabel::Forest { class_ha } else { 0.0 }))
                    .collect(),
                change_ha: ChangeClass::ALL
                    .iter()
                    .map(|&c| (c, if c == ChangeClass::Di { di_ha } else { 0.0 }))
                    .collect(),
            }],
            skipped: vec![],
            utm_epsg: 32720,
            failed_columns: vec![],
        }
    }

    #[test]
    fn header_columns() {
        let h = header("2008");
        assert_eq!(h.len(), 14);
        assert_eq!(h[0], "Lote");
        assert_eq!(h[2], "Floresta_2008_ha");
        assert_eq!(h[8], "Agricultura_2008_ha");
        assert_eq!(&h[9..], &["FF_ha", "AC_ha", "CH_ha", "DI_ha", "FR_ha"]);
    }

    #[test]
    fn noise_area_renders_blank() {
        let csv = to_csv_string(&report(12.5, suppress_noise(0.03)), "2008").unwrap();
        let line = csv.lines().nth(1).unwrap();
        assert_eq!(
            line,
            r#""Lote_1","25.0","12.5","","","","","","","","","","","""#
        );
    }

    #[test]
    fn every_field_quoted_and_tag_configurable() {
        let csv = to_csv_string(&report(0.0, 3.21), "1995").unwrap();
        let mut lines = csv.lines();
        assert!(lines.next().unwrap().starts_with(r#""Lote","Area_Total_ha","Floresta_1995_ha""#));
        assert!(lines.next().unwrap().ends_with(r#""3.21","""#));
    }

    #[test]
    fn format_keeps_a_fraction() {
        assert_eq!(format_ha(3.0), "3.0");
        assert_eq!(format_ha(12.35), "12.35");
    }
}
