//! Plain-text rendering of a dashboard view

use riskboard_core::Table;
use riskboard_pipeline::DashboardView;
use std::fmt::Write;

/// Fixed-width table; an empty result prints `(no data)`
pub fn format_table(table: &Table) -> String {
    if table.columns().is_empty() || table.is_empty() {
        return "(no data)\n".to_string();
    }

    let cells: Vec<Vec<String>> = table
        .rows()
        .iter()
        .map(|row| row.iter().map(ToString::to_string).collect())
        .collect();

    let mut widths: Vec<usize> = table.columns().iter().map(|c| c.name.len()).collect();
    for row in &cells {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let mut out = String::new();
    let header: Vec<String> = table
        .columns()
        .iter()
        .zip(&widths)
        .map(|(c, w)| format!("{:<w$}", c.name, w = *w))
        .collect();
    let _ = writeln!(out, "{}", header.join("  ").trim_end());

    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    let _ = writeln!(out, "{}", rule.join("  "));

    for row in &cells {
        let line: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(cell, w)| format!("{:<w$}", cell, w = *w))
            .collect();
        let _ = writeln!(out, "{}", line.join("  ").trim_end());
    }
    out
}

fn selected(value: Option<i64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

pub fn format_view(view: &DashboardView) -> String {
    let mut out = String::new();

    for message in &view.messages {
        let _ = writeln!(out, "! {}", message);
    }
    if !view.messages.is_empty() {
        out.push('\n');
    }

    out.push_str("== Key metrics ==\n");
    match &view.kpi {
        Some(kpi) => {
            let _ = writeln!(out, "Total transactions: {}", kpi.total_txns);
            let _ = writeln!(out, "Total amount:       {}", kpi.formatted_amount());
            let _ = writeln!(out, "High risk:          {}", kpi.high_risk_txns);
            let _ = writeln!(out, "Medium risk:        {}", kpi.medium_risk_txns);
            let _ = writeln!(out, "Low risk:           {}", kpi.low_risk_txns);
        }
        None => out.push_str("(no data)\n"),
    }

    out.push_str("\n== Yearly trend ==\n");
    out.push_str(&format_table(&view.yearly));

    let _ = writeln!(
        out,
        "\n== Monthly distribution (year {}) ==",
        selected(view.monthly.year)
    );
    out.push_str(&format_table(&view.monthly.table));

    let _ = writeln!(
        out,
        "\n== Daily trend (year {}, month {}) ==",
        selected(view.daily.year),
        selected(view.daily.month)
    );
    out.push_str(&format_table(&view.daily.table));

    out.push_str("\n== Risk by location ==\n");
    out.push_str(&format_table(&view.location_risk));

    let drilldown = &view.drilldown;
    let _ = writeln!(
        out,
        "\n== Transactions (year {}, month {}, city {}, risk {}) ==",
        selected(drilldown.year),
        selected(drilldown.month),
        drilldown.city,
        drilldown.risk
    );
    if let Some(notice) = &drilldown.notice {
        let _ = writeln!(out, "note: {}", notice);
    }
    out.push_str(&format_table(&drilldown.table));

    out
}
