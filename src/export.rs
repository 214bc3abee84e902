use chrono::NaiveDate;

use crate::models::Application;

pub const CSV_HEADER: [&str; 6] = ["Company", "Job Title", "Status", "Location", "Applied Date", "URL"];

/// One quoted row per application, in the order given. Absent optional
/// fields export as empty strings.
pub fn applications_to_csv(applications: &[Application]) -> String {
    let mut lines = Vec::with_capacity(applications.len() + 1);
    lines.push(CSV_HEADER.join(","));

    for app in applications {
        let applied = app
            .applied_date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        let row = [
            app.company_name.as_str(),
            app.job_title.as_str(),
            app.status.as_str(),
            app.location.as_deref().unwrap_or(""),
            applied.as_str(),
            app.job_url.as_deref().unwrap_or(""),
        ];
        lines.push(
            row.iter()
                .map(|cell| quote(cell))
                .collect::<Vec<_>>()
                .join(","),
        );
    }

    lines.join("\n")
}

pub fn export_filename(date: NaiveDate) -> String {
    format!("applications-{}.csv", date.format("%Y-%m-%d"))
}

fn quote(cell: &str) -> String {
    format!("\"{}\"", cell.replace('"', "\"\""))
}
