// 📊 Report Renderer - boletos → tabular PDF
//
// Fixed layout: title, one bold header row, one row per boleto in the order
// given. Column widths are constants; nothing is measured from content.

use crate::db::Boleto;
use crate::error::ServiceResult;
use crate::pdf::{self, Face, TextRun};
use chrono::{DateTime, Utc};

pub const TITLE: &str = "Relatório de Boletos";

pub const HEADERS: [&str; 7] = [
    "ID",
    "Nome Sacado",
    "ID Lote",
    "Valor",
    "Linha Digitável",
    "Ativo",
    "Criado Em",
];

pub const COLUMN_WIDTHS: [i64; 7] = [35, 130, 50, 50, 120, 40, 110];

const MARGIN: i64 = 30;
const ROW_HEIGHT: i64 = 20;
const TITLE_SIZE: i64 = 12;
const BODY_SIZE: i64 = 10;

/// The seven display cells of one boleto, already localized
pub fn table_row(boleto: &Boleto) -> [String; 7] {
    [
        boleto.id.to_string(),
        boleto.subject_name.clone(),
        boleto.batch_id.map(|id| id.to_string()).unwrap_or_default(),
        format!("{:.2}", boleto.value),
        boleto.payment_line.clone(),
        if boleto.active { "Sim" } else { "Não" }.to_string(),
        format_timestamp(&boleto.created_at),
    ]
}

/// pt-BR date-time, e.g. 15/10/2026 14:03:22
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%d/%m/%Y %H:%M:%S").to_string()
}

pub fn render_table(boletos: &[Boleto]) -> ServiceResult<Vec<u8>> {
    pdf::render_pages(&layout(boletos))
}

/// Place every cell; rows that would cross the bottom margin open a new page
/// where the header row is repeated
fn layout(boletos: &[Boleto]) -> Vec<Vec<TextRun>> {
    let bottom = pdf::PAGE_HEIGHT - MARGIN;
    let title_width = (TITLE.chars().count() as i64) * TITLE_SIZE / 2;

    let mut pages = Vec::new();
    let mut current = vec![TextRun {
        text: TITLE.to_string(),
        x: (pdf::PAGE_WIDTH - title_width) / 2,
        y: MARGIN,
        width: pdf::PAGE_WIDTH - 2 * MARGIN,
        size: TITLE_SIZE,
        face: Face::Bold,
    }];

    let mut y = MARGIN + TITLE_SIZE + 20;
    y = push_row(&mut current, &HEADERS.map(String::from), y, Face::Bold);

    for boleto in boletos {
        if y + ROW_HEIGHT > bottom {
            pages.push(std::mem::take(&mut current));
            y = push_row(&mut current, &HEADERS.map(String::from), MARGIN, Face::Bold);
        }
        y = push_row(&mut current, &table_row(boleto), y, Face::Regular);
    }

    pages.push(current);
    pages
}

fn push_row(runs: &mut Vec<TextRun>, cells: &[String; 7], y: i64, face: Face) -> i64 {
    let mut x = MARGIN;
    for (cell, width) in cells.iter().zip(COLUMN_WIDTHS) {
        runs.push(TextRun {
            text: cell.clone(),
            x,
            y,
            width,
            size: BODY_SIZE,
            face,
        });
        x += width;
    }
    y + ROW_HEIGHT
}
