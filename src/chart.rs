use serde_json::json;

use crate::error::ChartError;
use crate::models::{DataTable, Series, Value};
use crate::response::StructuredRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartType {
    Bar,
    Line,
    Pie,
    Scatter,
    Area,
}

impl ChartType {
    /// Case-insensitive; anything unrecognised is a line chart.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "bar" => ChartType::Bar,
            "pie" => ChartType::Pie,
            "scatter" => ChartType::Scatter,
            "area" => ChartType::Area,
            _ => ChartType::Line,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChartType::Bar => "bar",
            ChartType::Line => "line",
            ChartType::Pie => "pie",
            ChartType::Scatter => "scatter",
            ChartType::Area => "area",
        }
    }
}

// Checked in order; the first group with a hit decides the chart.
const KEYWORD_GROUPS: &[(&[&str], ChartType)] = &[
    (&["trend", "growth", "over time"], ChartType::Line),
    (&["compare", "comparison", "difference"], ChartType::Bar),
    (&["distribution", "share", "ratio", "percentage"], ChartType::Pie),
    (&["relationship", "correlation", "scatter"], ChartType::Scatter),
    (&["area"], ChartType::Area),
];

/// Picks a chart family from the wording of the question.
pub fn chart_type_for_question(question: &str) -> Option<ChartType> {
    let question = question.to_lowercase();
    KEYWORD_GROUPS
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| question.contains(k)))
        .map(|(_, chart_type)| *chart_type)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChartSpec {
    pub chart_type: ChartType,
    pub title: String,
    /// Categories / x axis. Pie labels for pie charts.
    pub x: Series,
    /// Value series, all aligned with `x`.
    pub y: Vec<Series>,
}

impl ChartSpec {
    pub fn new(
        chart_type: ChartType,
        title: impl Into<String>,
        x: Series,
        y: Vec<Series>,
    ) -> Result<Self, ChartError> {
        if let Some(bad) = y.iter().find(|s| s.len() != x.len()) {
            return Err(ChartError::LengthMismatch {
                column: bad.name.clone(),
                expected: x.len(),
                found: bad.len(),
            });
        }

        Ok(Self {
            chart_type,
            title: title.into(),
            x,
            y,
        })
    }

    /// Builds a chart from the model's structured block.
    pub fn from_record(record: &StructuredRecord) -> Result<Self, ChartError> {
        let chart_type = ChartType::parse(&record.chart_type);

        let mut columns = record
            .columns
            .iter()
            .map(|(name, value)| match value {
                serde_json::Value::Array(items) => Ok(Series::new(
                    name.clone(),
                    items.iter().map(Value::from_json).collect(),
                )
                .coerce_mixed()),
                _ => Err(ChartError::NotASeries(name.clone())),
            })
            .collect::<Result<Vec<_>, _>>()?;

        if columns.len() < 2 {
            return Err(ChartError::NotEnoughColumns {
                chart: chart_type.as_str(),
                needed: 2,
                found: columns.len(),
            });
        }

        let x = columns.remove(0);
        match chart_type {
            ChartType::Pie => {
                columns.truncate(1);
                ChartSpec::new(chart_type, "Pie Chart", x, columns)
            }
            ChartType::Scatter => {
                columns.truncate(1);
                ChartSpec::new(chart_type, "Scatter Plot", x, columns)
            }
            ChartType::Bar => ChartSpec::new(chart_type, "Bar Chart", x, columns),
            ChartType::Area => ChartSpec::new(chart_type, "Area Chart", x, columns),
            ChartType::Line => ChartSpec::new(chart_type, "Line Chart", x, columns),
        }
    }

    /// Builds a chart straight from an uploaded table, guided by the question.
    pub fn from_table(table: &DataTable, question: &str) -> Result<Self, ChartError> {
        if table.headers.is_empty() {
            return Err(ChartError::NoNumericColumns);
        }

        let numeric = table.numeric_columns();
        if numeric.is_empty() {
            return Err(ChartError::NoNumericColumns);
        }

        // The first column is always x. When it is also the only numeric
        // column it doubles as the plotted values.
        let mut values: Vec<usize> = numeric.iter().copied().filter(|&i| i != 0).collect();
        if values.is_empty() {
            values.push(0);
        }

        let first = table.series(0);
        let value_series = || values.iter().map(|&i| table.series(i)).collect::<Vec<_>>();

        match chart_type_for_question(question) {
            Some(ChartType::Line) => {
                ChartSpec::new(ChartType::Line, "Trend / Growth Chart", first, value_series())
            }
            Some(ChartType::Bar) => {
                ChartSpec::new(ChartType::Bar, "Comparison Chart", first, value_series())
            }
            Some(ChartType::Pie) => ChartSpec::new(
                ChartType::Pie,
                "Distribution / Share Chart",
                first,
                vec![table.series(values[0])],
            ),
            Some(ChartType::Scatter) if numeric.len() >= 2 => ChartSpec::new(
                ChartType::Scatter,
                "Relationship / Scatter Plot",
                table.series(numeric[0]),
                vec![table.series(numeric[1])],
            ),
            Some(ChartType::Scatter) => ChartSpec::new(
                ChartType::Scatter,
                "Scatter Plot",
                first,
                vec![table.series(values[0])],
            ),
            Some(ChartType::Area) => {
                ChartSpec::new(ChartType::Area, "Area Chart", first, value_series())
            }
            None => ChartSpec::new(ChartType::Line, "Default Line Chart", first, value_series()),
        }
    }

    /// Plotly figure (`data` + `layout`) for the browser to draw.
    pub fn to_plotly(&self) -> serde_json::Value {
        let x: Vec<_> = self.x.values.iter().map(Value::to_json).collect();
        let values = |s: &Series| s.values.iter().map(Value::to_json).collect::<Vec<_>>();

        let data: Vec<serde_json::Value> = match self.chart_type {
            ChartType::Pie => self
                .y
                .iter()
                .take(1)
                .map(|s| {
                    json!({
                        "type": "pie",
                        "name": s.name,
                        "labels": x,
                        "values": values(s),
                    })
                })
                .collect(),
            ChartType::Bar => self
                .y
                .iter()
                .map(|s| json!({ "type": "bar", "name": s.name, "x": x, "y": values(s) }))
                .collect(),
            ChartType::Scatter => self
                .y
                .iter()
                .map(|s| {
                    json!({
                        "type": "scatter",
                        "mode": "markers",
                        "name": s.name,
                        "x": x,
                        "y": values(s),
                    })
                })
                .collect(),
            ChartType::Area => self
                .y
                .iter()
                .map(|s| {
                    json!({
                        "type": "scatter",
                        "mode": "lines",
                        "stackgroup": "one",
                        "name": s.name,
                        "x": x,
                        "y": values(s),
                    })
                })
                .collect(),
            ChartType::Line => self
                .y
                .iter()
                .map(|s| {
                    json!({
                        "type": "scatter",
                        "mode": "lines+markers",
                        "name": s.name,
                        "x": x,
                        "y": values(s),
                    })
                })
                .collect(),
        };

        let mut layout = json!({ "title": { "text": self.title } });
        if self.chart_type != ChartType::Pie {
            let y_title = match self.y.as_slice() {
                [only] => only.name.clone(),
                _ => "value".to_string(),
            };
            layout["xaxis"] = json!({ "title": { "text": self.x.name } });
            layout["yaxis"] = json!({ "title": { "text": y_title } });
        }
        if self.chart_type == ChartType::Bar {
            layout["barmode"] = json!("group");
        }

        json!({ "data": data, "layout": layout })
    }

    pub fn column_names(&self) -> Vec<String> {
        std::iter::once(self.x.name.clone())
            .chain(self.y.iter().map(|s| s.name.clone()))
            .collect()
    }

    /// Row-wise view of the plotted data, for showing it as a table.
    pub fn table_rows(&self) -> Vec<Vec<String>> {
        (0..self.x.len())
            .map(|row| {
                std::iter::once(&self.x)
                    .chain(self.y.iter())
                    .map(|s| s.values.get(row).map(|v| v.to_string()).unwrap_or_default())
                    .collect()
            })
            .collect()
    }
}
