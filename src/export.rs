//! Tabular CSV export, one row per line.
//!
//! Columns: id, start lat, start lng, end lat, end lng, distance (always two decimals), then
//! every configured metadata field in configuration order.

use serde_json::Value;

use crate::config::FieldSpec;
use crate::store::Line;

const FIXED_HEADERS: [&str; 6] = [
    "ID",
    "Start Lat",
    "Start Lng",
    "End Lat",
    "End Lng",
    "Distance (m)",
];

/// Writes the lines as CSV with a header row.
pub fn to_csv(lines: &[Line], fields: &[FieldSpec]) -> String {
    let mut out = String::new();

    let header = FIXED_HEADERS
        .iter()
        .map(|h| escape(h))
        .chain(fields.iter().map(|f| escape(&f.header)));
    push_row(&mut out, header);

    for line in lines {
        let fixed = [
            escape(&line.id),
            line.start.lat.to_string(),
            line.start.lng.to_string(),
            line.end.lat.to_string(),
            line.end.lng.to_string(),
            format!("{:.2}", line.distance_meters),
        ];
        let metadata = fields
            .iter()
            .map(|f| escape(&cell(line.metadata.get(&f.key))));
        push_row(&mut out, fixed.into_iter().chain(metadata));
    }

    out
}

fn push_row(out: &mut String, cells: impl Iterator<Item = String>) {
    let row: Vec<String> = cells.collect();
    out.push_str(&row.join(","));
    out.push_str("\r\n");
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Quotes a cell if it contains a separator, a quote or a line break.
fn escape(cell: &str) -> String {
    if cell.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExcavationSurveyConfig, SurveyConfig};
    use crate::geometry::GeoPoint;
    use crate::store::{LineStore, Metadata};
    use serde_json::json;

    fn pt(lat: f64, lng: f64) -> GeoPoint {
        GeoPoint {
            lat,
            lng,
            accuracy: None,
        }
    }

    #[test]
    fn csv_columns_and_distance_format() {
        let config = ExcavationSurveyConfig::default();
        let mut store = LineStore::from_config(&config);
        store.add_line(pt(1.0, 1.0), pt(1.0, 1.001), true);
        store.add_line(pt(2.0, 2.0), pt(2.0, 2.0), false);

        let mut patch = Metadata::new();
        patch.insert("depth".to_string(), json!(1.5));
        patch.insert("excavationType".to_string(), json!("trench"));
        store.update_metadata("A1", patch).unwrap();

        let csv = to_csv(store.lines(), config.metadata_fields());
        let rows: Vec<&str> = csv.split("\r\n").collect();

        assert_eq!(
            rows[0],
            "ID,Start Lat,Start Lng,End Lat,End Lng,Distance (m),Depth (m),Width (m),Excavation type,Road type,Notes"
        );
        assert_eq!(rows[1], "A1,1,1,1,1.001,111.18,1.5,0,trench,,");
        assert_eq!(rows[2], "A2,2,2,2,2,0.00,0,0,,,");
        assert_eq!(rows[3], "");
        assert_eq!(rows.len(), 4);
    }

    #[test]
    fn csv_quotes_special_characters() {
        assert_eq!(escape("plain"), "plain");
        assert_eq!(escape("a,b"), "\"a,b\"");
        assert_eq!(escape("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn csv_cells_from_values() {
        assert_eq!(cell(None), "");
        assert_eq!(cell(Some(&Value::Null)), "");
        assert_eq!(cell(Some(&json!(true))), "true");
        assert_eq!(cell(Some(&json!(2.25))), "2.25");
        assert_eq!(cell(Some(&json!("asphalt"))), "asphalt");
    }
}
