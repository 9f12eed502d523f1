//! Report document rendering
//!
//! Every format is built from the same [`Section`] list: a summary block
//! and, when there were detections, a per-label table. CSV writes them one
//! after another, XLSX gives each its own sheet, PDF lays them out on A4
//! pages.

use chrono::{DateTime, Utc};
use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfLayerReference};
use rust_xlsxwriter::{Color, Format, FormatAlign, Workbook, Worksheet, XlsxError};

use crate::error::{PipelineError, PipelineResult};
use crate::inputs::ReportData;
use crate::models::{ReportFormat, ReportJob};

pub const REPORT_TITLE: &str = "AFASA Farm Health Report";

/// Render off the async workers.
pub async fn render(job: ReportJob, data: ReportData) -> PipelineResult<Vec<u8>> {
    tokio::task::spawn_blocking(move || render_document(&job, &data))
        .await
        .map_err(|e| PipelineError::Render(format!("render task failed: {}", e)))?
}

/// Render `data` in the job's format.
pub fn render_document(job: &ReportJob, data: &ReportData) -> PipelineResult<Vec<u8>> {
    let sections = sections(data);
    match job.format {
        ReportFormat::Csv => render_csv(job, data, &sections),
        ReportFormat::Xlsx => render_xlsx(job, data, &sections),
        ReportFormat::Pdf => render_pdf(job, data, &sections),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Text(String),
    Int(i64),
    /// A 0..1 ratio shown as a percentage
    Percent(f64),
}

impl Cell {
    fn display(&self) -> String {
        match self {
            Cell::Text(s) => s.clone(),
            Cell::Int(n) => n.to_string(),
            Cell::Percent(p) => format!("{:.1}%", p * 100.0),
        }
    }
}

#[derive(Debug, Clone)]
struct Section {
    title: &'static str,
    header: Vec<&'static str>,
    rows: Vec<Vec<Cell>>,
}

fn sections(data: &ReportData) -> Vec<Section> {
    let s = &data.summary;
    let mut sections = vec![Section {
        title: "Summary",
        header: vec!["Metric", "Value"],
        rows: [
            ("Total Snapshots", s.total_snapshots),
            ("Total Detections", s.total_detections),
            ("Assessments", s.total_assessments),
            ("Open Tasks", s.open_tasks),
            ("Completed Tasks", s.completed_tasks),
        ]
        .into_iter()
        .map(|(metric, value)| vec![Cell::Text(metric.to_string()), Cell::Int(value)])
        .collect(),
    }];

    if !data.detections.is_empty() {
        sections.push(Section {
            title: "Detections",
            header: vec!["Label", "Count", "Avg Confidence"],
            rows: data
                .detections
                .iter()
                .map(|stats| {
                    vec![
                        Cell::Text(stats.label.clone()),
                        Cell::Int(stats.count),
                        Cell::Percent(stats.avg_confidence),
                    ]
                })
                .collect(),
        });
    }
    sections
}

fn period(from: DateTime<Utc>, to: DateTime<Utc>) -> (String, String) {
    (
        from.format("%Y-%m-%d %H:%M").to_string(),
        to.format("%Y-%m-%d %H:%M").to_string(),
    )
}

// ============================================================================
// CSV
// ============================================================================

fn render_csv(job: &ReportJob, data: &ReportData, sections: &[Section]) -> PipelineResult<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(Vec::new());

    write_csv(&mut writer, job, data, sections).map_err(|e| PipelineError::Render(e.to_string()))?;

    writer
        .into_inner()
        .map_err(|e| PipelineError::Render(e.to_string()))
}

fn write_csv(
    writer: &mut csv::Writer<Vec<u8>>,
    job: &ReportJob,
    data: &ReportData,
    sections: &[Section],
) -> Result<(), csv::Error> {
    let (from, to) = period(job.range_from, job.range_to);
    writer.write_record([REPORT_TITLE])?;
    writer.write_record(["Tenant", data.tenant_name.as_str()])?;
    writer.write_record(["Period", from.as_str(), to.as_str()])?;
    writer.write_record(["Report", job.id.to_string().as_str()])?;

    for section in sections {
        writer.write_record(&section.header)?;
        for row in &section.rows {
            writer.write_record(row.iter().map(Cell::display))?;
        }
    }

    writer.flush()?;
    Ok(())
}

// ============================================================================
// XLSX
// ============================================================================

fn render_xlsx(job: &ReportJob, data: &ReportData, sections: &[Section]) -> PipelineResult<Vec<u8>> {
    build_workbook(job, data, sections)
        .and_then(|mut workbook| workbook.save_to_buffer())
        .map_err(|e| PipelineError::Render(format!("xlsx: {}", e)))
}

fn build_workbook(
    job: &ReportJob,
    data: &ReportData,
    sections: &[Section],
) -> Result<Workbook, XlsxError> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let header = Format::new()
        .set_bold()
        .set_font_color(Color::White)
        .set_background_color(Color::RGB(0x2E7D32))
        .set_align(FormatAlign::Center);
    let percent = Format::new().set_num_format("0.0%");

    for (i, section) in sections.iter().enumerate() {
        let sheet = workbook.add_worksheet();
        sheet.set_name(section.title)?;

        // The first sheet carries the report header above its table.
        let mut row = 0;
        if i == 0 {
            let (from, to) = period(job.range_from, job.range_to);
            sheet.write_string_with_format(0, 0, REPORT_TITLE, &bold)?;
            sheet.write_string(1, 0, "Tenant")?;
            sheet.write_string(1, 1, data.tenant_name.as_str())?;
            sheet.write_string(2, 0, "Period")?;
            sheet.write_string(2, 1, format!("{} to {}", from, to))?;
            sheet.write_string(3, 0, "Report")?;
            sheet.write_string(3, 1, job.id.to_string())?;
            row = 5;
        }
        write_section(sheet, row, section, &header, &percent)?;
    }

    Ok(workbook)
}

fn write_section(
    sheet: &mut Worksheet,
    first_row: u32,
    section: &Section,
    header: &Format,
    percent: &Format,
) -> Result<(), XlsxError> {
    for (col, title) in section.header.iter().enumerate() {
        sheet.write_string_with_format(first_row, col as u16, *title, header)?;
        sheet.set_column_width(col as u16, 20)?;
    }

    for (r, cells) in section.rows.iter().enumerate() {
        let row = first_row + 1 + r as u32;
        for (col, cell) in cells.iter().enumerate() {
            let col = col as u16;
            match cell {
                Cell::Text(s) => sheet.write_string(row, col, s.as_str())?,
                Cell::Int(n) => sheet.write_number(row, col, *n as f64)?,
                Cell::Percent(p) => sheet.write_number_with_format(row, col, *p, percent)?,
            };
        }
    }
    Ok(())
}

// ============================================================================
// PDF
// ============================================================================

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 20.0;
const LINE_HEIGHT: f32 = 7.0;
const COLUMN_WIDTH: f32 = 55.0;

/// Writes lines top-down, starting a new page when one fills up.
struct PdfCursor<'a> {
    doc: &'a printpdf::PdfDocumentReference,
    layer: PdfLayerReference,
    y: f32,
}

impl PdfCursor<'_> {
    fn line(&mut self, cells: &[String], size: f32, font: &IndirectFontRef) {
        if self.y < MARGIN {
            let (page, layer) = self.doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
            self.layer = self.doc.get_page(page).get_layer(layer);
            self.y = PAGE_HEIGHT - MARGIN;
        }
        for (i, text) in cells.iter().enumerate() {
            let x = MARGIN + COLUMN_WIDTH * i as f32;
            self.layer.use_text(text.as_str(), size, Mm(x), Mm(self.y), font);
        }
        self.y -= LINE_HEIGHT;
    }

    fn gap(&mut self) {
        self.y -= LINE_HEIGHT;
    }
}

fn render_pdf(job: &ReportJob, data: &ReportData, sections: &[Section]) -> PipelineResult<Vec<u8>> {
    let pdf_err = |e: printpdf::Error| PipelineError::Render(format!("pdf: {}", e));

    let (doc, page, layer) =
        PdfDocument::new(REPORT_TITLE, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
    let regular = doc.add_builtin_font(BuiltinFont::Helvetica).map_err(pdf_err)?;
    let bold = doc.add_builtin_font(BuiltinFont::HelveticaBold).map_err(pdf_err)?;

    let layer = doc.get_page(page).get_layer(layer);
    let mut cursor = PdfCursor {
        doc: &doc,
        layer,
        y: PAGE_HEIGHT - MARGIN,
    };

    let (from, to) = period(job.range_from, job.range_to);
    cursor.line(&[REPORT_TITLE.to_string()], 20.0, &bold);
    cursor.gap();
    cursor.line(&["Tenant:".into(), data.tenant_name.clone()], 11.0, &regular);
    cursor.line(&["Period:".into(), format!("{} to {}", from, to)], 11.0, &regular);
    cursor.line(&["Report:".into(), job.id.to_string()], 11.0, &regular);

    for section in sections {
        cursor.gap();
        cursor.line(&[section.title.to_string()], 14.0, &bold);
        let header: Vec<String> = section.header.iter().map(|h| h.to_string()).collect();
        cursor.line(&header, 11.0, &bold);
        for row in &section.rows {
            let cells: Vec<String> = row.iter().map(Cell::display).collect();
            cursor.line(&cells, 11.0, &regular);
        }
    }

    drop(cursor);
    doc.save_to_bytes().map_err(pdf_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inputs::{LabelStats, ReportSummary};
    use crate::models::{ReportKind, ReportRequest};
    use uuid::Uuid;

    fn job(format: ReportFormat) -> ReportJob {
        let request = ReportRequest {
            tenant_id: Uuid::new_v4(),
            kind: ReportKind::Weekly,
            format,
            range_from: None,
            range_to: None,
            correlation_id: None,
        };
        ReportJob::queued(&request, Utc::now()).unwrap()
    }

    fn green_acres() -> ReportData {
        ReportData {
            tenant_name: "Green Acres".into(),
            summary: ReportSummary {
                total_snapshots: 42,
                total_detections: 7,
                total_assessments: 3,
                open_tasks: 2,
                completed_tasks: 5,
            },
            detections: vec![LabelStats {
                label: "aphids".into(),
                count: 4,
                avg_confidence: 0.875,
            }],
        }
    }

    #[test]
    fn test_csv_contains_summary_and_label_stats() {
        let bytes = render_document(&job(ReportFormat::Csv), &green_acres()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("AFASA Farm Health Report\n"));
        assert!(text.contains("Tenant,Green Acres\n"));
        assert!(text.contains("Total Snapshots,42\n"));
        assert!(text.contains("Completed Tasks,5\n"));
        assert!(text.contains("aphids,4,87.5%\n"));
    }

    #[test]
    fn test_empty_detections_omit_label_table() {
        let bytes = render_document(&job(ReportFormat::Csv), &ReportData::default()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(!text.contains("Avg Confidence"));
        assert!(text.contains("Open Tasks,0\n"));
    }

    #[test]
    fn test_xlsx_is_a_zip_workbook() {
        let bytes = render_document(&job(ReportFormat::Xlsx), &green_acres()).unwrap();
        assert!(bytes.starts_with(b"PK\x03\x04"));
        assert!(!String::from_utf8_lossy(&bytes).contains("Tenant,Green Acres"));
    }

    #[test]
    fn test_pdf_is_a_pdf_document() {
        let bytes = render_document(&job(ReportFormat::Pdf), &green_acres()).unwrap();
        assert!(bytes.starts_with(b"%PDF-"));
        assert!(bytes.windows(5).any(|w| w == b"%%EOF"));
    }

    #[test]
    fn test_long_pdf_spills_onto_more_pages() {
        let mut data = green_acres();
        data.detections = (0..80)
            .map(|i| LabelStats {
                label: format!("label-{}", i),
                count: i,
                avg_confidence: 0.5,
            })
            .collect();
        let short = render_document(&job(ReportFormat::Pdf), &green_acres()).unwrap();
        let long = render_document(&job(ReportFormat::Pdf), &data).unwrap();
        assert!(long.starts_with(b"%PDF-"));
        assert!(long.len() > short.len());
    }

    #[tokio::test]
    async fn test_render_runs_on_blocking_pool() {
        let bytes = render(job(ReportFormat::Csv), ReportData::default()).await.unwrap();
        assert!(!bytes.is_empty());
    }
}
