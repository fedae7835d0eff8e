// 📄 CSV Row Parser - boleto rows from an uploaded spreadsheet export
//
// Expected columns (header names, any order):
//   unidade | nome | valor | linha_digitavel
// English aliases: unit | name | value | payment_line
//
// Delimiter is sniffed from the header line: exports from Brazilian
// spreadsheets usually come with ';' because ',' is the decimal separator.

use crate::error::{ServiceError, ServiceResult};
use csv::{ReaderBuilder, Trim};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// One CSV row as written in the file
#[derive(Debug, Clone, Deserialize)]
struct CsvRow {
    #[serde(alias = "unit")]
    unidade: String,

    #[serde(alias = "name")]
    nome: String,

    #[serde(alias = "value")]
    valor: String,

    #[serde(alias = "payment_line", alias = "paymentLine")]
    linha_digitavel: String,
}

/// Parsed import row, ready for batch resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRow {
    pub subject_name: String,
    /// Batch name as written in the file (not yet canonicalized)
    pub batch_key: String,
    pub value: f64,
    pub payment_line: String,
}

/// Read every row of a CSV file, in file order
pub fn load_rows(csv_path: &Path) -> ServiceResult<Vec<ImportRow>> {
    let file = File::open(csv_path)
        .map_err(|e| ServiceError::io(format!("failed to open {}: {}", csv_path.display(), e)))?;
    parse_rows(BufReader::new(file))
}

pub fn parse_rows<R: Read>(reader: R) -> ServiceResult<Vec<ImportRow>> {
    let mut reader = BufReader::new(reader);
    let delimiter = sniff_delimiter(&mut reader)?;

    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .trim(Trim::All)
        .from_reader(reader);

    let mut rows = Vec::new();

    for (idx, result) in rdr.deserialize::<CsvRow>().enumerate() {
        // 1-indexed + header row
        let line = idx + 2;
        let raw = result
            .map_err(|e| ServiceError::validation(format!("line {}: malformed row: {}", line, e)))?;

        if raw.unidade.is_empty() {
            return Err(ServiceError::validation(format!(
                "line {}: \"unidade\" is required",
                line
            )));
        }

        let value = parse_value(&raw.valor).ok_or_else(|| {
            ServiceError::validation(format!("line {}: invalid value \"{}\"", line, raw.valor))
        })?;

        rows.push(ImportRow {
            subject_name: raw.nome,
            batch_key: raw.unidade,
            value,
            payment_line: raw.linha_digitavel,
        });
    }

    Ok(rows)
}

/// Peek at the header line without consuming it
fn sniff_delimiter<R: BufRead>(reader: &mut R) -> ServiceResult<u8> {
    let buffered = reader
        .fill_buf()
        .map_err(|e| ServiceError::io(format!("failed to read CSV: {}", e)))?;

    let header_end = buffered
        .iter()
        .position(|b| *b == b'\n')
        .unwrap_or(buffered.len());
    let header = &buffered[..header_end];

    let has_semicolon = header.contains(&b';');
    let has_comma = header.contains(&b',');

    Ok(if has_semicolon && !has_comma { b';' } else { b',' })
}

/// Accepts "123.45", "123,45", "1.234,56", "1,234.56" and an "R$" prefix
pub fn parse_value(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches("R$")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    if cleaned.is_empty() {
        return None;
    }

    let normalized = match (cleaned.rfind(','), cleaned.rfind('.')) {
        // Both present: whichever comes last is the decimal separator
        (Some(comma), Some(dot)) if comma > dot => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (Some(_), None) => cleaned.replace(',', "."),
        _ => cleaned,
    };

    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_comma_delimited() {
        let csv = "unidade,nome,valor,linha_digitavel\n\
                   7,MARCIA CARVALHO,150.75,23790.50400 41990.901234\n\
                   0012,JOSE DA SILVA,89.9,34191.09008 61207.727303\n";

        let rows = parse_rows(csv.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].batch_key, "7");
        assert_eq!(rows[0].subject_name, "MARCIA CARVALHO");
        assert_eq!(rows[0].value, 150.75);
        assert_eq!(rows[1].payment_line, "34191.09008 61207.727303");
    }

    #[test]
    fn test_parse_semicolon_delimited_with_decimal_comma() {
        let csv = "unidade;nome;valor;linha_digitavel\n\
                   3;MARCOS ROBERTO;1.234,56;00190.00009 02941.210001\n";

        let rows = parse_rows(csv.as_bytes()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value, 1234.56);
        assert_eq!(rows[0].batch_key, "3");
    }

    #[test]
    fn test_english_headers_any_order() {
        let csv = "name,unit,payment_line,value\nALICE,1,abc,10\n";
        let rows = parse_rows(csv.as_bytes()).unwrap();
        assert_eq!(rows[0].subject_name, "ALICE");
        assert_eq!(rows[0].batch_key, "1");
        assert_eq!(rows[0].payment_line, "abc");
    }

    #[test]
    fn test_fields_are_trimmed() {
        let csv = "unidade,nome,valor,linha_digitavel\n 5 , ANA ,  2.50 , 123 \n";
        let rows = parse_rows(csv.as_bytes()).unwrap();
        assert_eq!(rows[0].batch_key, "5");
        assert_eq!(rows[0].subject_name, "ANA");
        assert_eq!(rows[0].value, 2.5);
    }

    #[test]
    fn test_missing_unit_is_validation_error() {
        let csv = "unidade,nome,valor,linha_digitavel\n,ANA,1.00,x\n";
        let err = parse_rows(csv.as_bytes()).unwrap_err();
        assert_eq!(err.kind(), "validation_error");
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_bad_value_names_line() {
        let csv = "unidade,nome,valor,linha_digitavel\n1,A,1.00,x\n2,B,abc,y\n";
        let err = parse_rows(csv.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("line 3"));
    }

    #[test]
    fn test_parse_value_formats() {
        assert_eq!(parse_value("123.45"), Some(123.45));
        assert_eq!(parse_value("123,45"), Some(123.45));
        assert_eq!(parse_value("1.234,56"), Some(1234.56));
        assert_eq!(parse_value("1,234.56"), Some(1234.56));
        assert_eq!(parse_value("R$ 10,00"), Some(10.0));
        assert_eq!(parse_value(""), None);
        assert_eq!(parse_value("dez"), None);
    }

    #[test]
    fn test_load_rows_missing_file() {
        let err = load_rows(Path::new("/nonexistent/boletos.csv")).unwrap_err();
        assert_eq!(err.kind(), "io_failure");
    }
}
