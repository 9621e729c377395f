#![cfg(feature = "web")]

use crate::error::{DashboardError, Result};
use crate::model::JoinedVisit;

const HEADERS: [&str; 10] = [
    "customer_id",
    "store_id",
    "visit_date",
    "order_total",
    "payment_method",
    "card_on_file",
    "is_member",
    "state",
    "latitude",
    "longitude",
];

fn row_cells(visit: &JoinedVisit) -> [String; 10] {
    let text = |v: &Option<String>| v.clone().unwrap_or_default();
    let number = |v: Option<f64>| v.map(|n| n.to_string()).unwrap_or_default();
    [
        text(&visit.customer_id),
        text(&visit.store_id),
        visit.visit_date.format("%Y-%m-%d %H:%M:%S").to_string(),
        visit.order_total.to_string(),
        text(&visit.payment_method),
        text(&visit.card_on_file),
        visit.is_member.map(|m| m.to_string()).unwrap_or_default(),
        text(&visit.state),
        number(visit.latitude),
        number(visit.longitude),
    ]
}

/// Convert joined visits to CSV format
///
/// Writes a header row followed by one line per visit. Missing customer or
/// store attributes become empty cells, and special characters (commas,
/// quotes, newlines) are escaped.
pub fn to_csv(visits: &[JoinedVisit]) -> String {
    let mut csv_content = HEADERS.join(",");
    csv_content.push('\n');

    for visit in visits {
        for (c, value) in row_cells(visit).iter().enumerate() {
            if c > 0 {
                csv_content.push(',');
            }
            // Handle value - escape commas, quotes, line breaks as needed
            if value.contains([',', '"', '\n', '\r']) {
                let escaped = value.replace('"', "\"\"");
                csv_content.push_str(&format!("\"{}\"", escaped));
            } else {
                csv_content.push_str(value);
            }
        }
        csv_content.push('\n');
    }

    csv_content
}

/// Convert joined visits to XLSX format
///
/// Uses rust_xlsxwriter; `order_total`, latitude and longitude are written as
/// numbers, everything else as text.
pub fn to_xlsx(visits: &[JoinedVisit]) -> Result<Vec<u8>> {
    use rust_xlsxwriter::{Workbook, Worksheet};

    let xlsx_err = |e: rust_xlsxwriter::XlsxError| DashboardError::Render(e.to_string());

    let mut workbook = Workbook::new();
    let mut worksheet = Worksheet::new();
    worksheet.set_name("visits").map_err(xlsx_err)?;

    for (c, header) in HEADERS.iter().enumerate() {
        worksheet.write_string(0, c as u16, *header).map_err(xlsx_err)?;
    }

    for (r, visit) in visits.iter().enumerate() {
        let row = (r + 1) as u32;
        for (c, value) in row_cells(visit).iter().enumerate() {
            let col = c as u16;
            let numeric = matches!(HEADERS[c], "order_total" | "latitude" | "longitude");
            match value.parse::<f64>() {
                Ok(n) if numeric => worksheet.write_number(row, col, n).map_err(xlsx_err)?,
                _ => worksheet.write_string(row, col, value).map_err(xlsx_err)?,
            };
        }
    }

    workbook.push_worksheet(worksheet);
    workbook.save_to_buffer().map_err(xlsx_err)
}
