//! Spreadsheet ingestion
//!
//! Uploaded files are decrypted when needed, parsed to a grid, matched to a
//! market template (or the standard form) and projected to staged orders.
//! A file that fails any step is reported and skipped; the rest still load.

pub mod decrypt;
pub mod workbook;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detect::detect_template;
use crate::domain::aggregates::{MarketTemplate, StagedOrder};
use crate::mapping::{map_rows, Grid};

pub use decrypt::{is_encrypted, AgileDecryptor, DecryptError, Decryptor};
pub use workbook::parse_grid;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("file is password protected")]
    PasswordRequired,

    #[error("incorrect password")]
    WrongPassword,

    #[error("sheet has no data")]
    EmptySheet,

    #[error("{0}")]
    Unreadable(String),
}

impl From<DecryptError> for IngestError {
    fn from(e: DecryptError) -> Self {
        match e {
            DecryptError::WrongPassword => Self::WrongPassword,
            other => Self::Unreadable(other.to_string()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct UploadedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadMode {
    /// Detect the marketplace per file.
    #[default]
    Market,
    /// Platform standard form; no detection.
    Standard,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    Integrated,
    Unrecognized,
    PasswordRequired,
    WrongPassword,
    Unreadable { detail: String },
}

#[derive(Clone, Debug, Serialize)]
pub struct FileReport {
    pub file_name: String,
    pub market_name: Option<String>,
    pub order_count: usize,
    #[serde(flatten)]
    pub outcome: FileOutcome,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct IngestResult {
    pub orders: Vec<StagedOrder>,
    pub files: Vec<FileReport>,
}

impl IngestResult {
    pub fn needs_password(&self) -> bool {
        self.files.iter().any(|f| matches!(f.outcome, FileOutcome::PasswordRequired | FileOutcome::WrongPassword))
    }

    pub fn integrated_files(&self) -> usize {
        self.files.iter().filter(|f| f.outcome == FileOutcome::Integrated).count()
    }
}

/// Reads one file's grid, decrypting it with `password` when it is protected.
pub fn read_grid(file: &UploadedFile, password: Option<&str>, decryptor: &dyn Decryptor) -> Result<Grid, IngestError> {
    if !is_encrypted(&file.bytes) {
        return parse_grid(&file.name, &file.bytes);
    }
    let password = password.filter(|p| !p.is_empty()).ok_or(IngestError::PasswordRequired)?;
    let plain = decryptor.decrypt(&file.bytes, password)?;
    parse_grid(&file.name, &plain)
}

/// Runs every file through parse → detect → map, sequentially and in upload order.
pub fn ingest_files(
    files: &[UploadedFile],
    password: Option<&str>,
    mode: UploadMode,
    templates: &[MarketTemplate],
    decryptor: &dyn Decryptor,
) -> IngestResult {
    let standard = MarketTemplate::standard();
    let mut result = IngestResult::default();

    for file in files {
        let mut report = FileReport { file_name: file.name.clone(), market_name: None, order_count: 0, outcome: FileOutcome::Integrated };

        let grid = match read_grid(file, password, decryptor) {
            Ok(grid) => grid,
            Err(e) => {
                tracing::warn!(file = %file.name, error = %e, "file skipped");
                report.outcome = match e {
                    IngestError::PasswordRequired => FileOutcome::PasswordRequired,
                    IngestError::WrongPassword => FileOutcome::WrongPassword,
                    other => FileOutcome::Unreadable { detail: other.to_string() },
                };
                result.files.push(report);
                continue;
            }
        };

        let template = match mode {
            UploadMode::Standard => Some(&standard),
            UploadMode::Market => {
                let header: &[String] = grid.first().map(Vec::as_slice).unwrap_or(&[]);
                detect_template(&file.name, header, templates).map(|d| d.template)
            }
        };
        let Some(template) = template else {
            report.outcome = FileOutcome::Unrecognized;
            result.files.push(report);
            continue;
        };

        let orders = map_rows(template, &grid);
        tracing::info!(file = %file.name, market = %template.market_name, orders = orders.len(), "file integrated");
        report.market_name = Some(template.market_name.clone());
        report.order_count = orders.len();
        result.orders.extend(orders);
        result.files.push(report);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{FieldMapping, InternalField};

    fn csv(name: &str, body: &str) -> UploadedFile {
        UploadedFile { name: name.into(), bytes: body.as_bytes().to_vec() }
    }

    fn coupang() -> MarketTemplate {
        MarketTemplate {
            market_name: "쿠팡".into(), initial: Some("C".into()), color_rgb: None,
            detect_string1: "coupang".into(), detect_string2: "묶음배송번호,등록옵션명".into(), header_row: 1,
            settlement_formula: None, display_order: 1,
            field_mappings: FieldMapping::new()
                .with(InternalField::OrderNumber, "주문번호")
                .with(InternalField::RecipientName, "수취인이름")
                .with(InternalField::OptionName, "등록옵션명")
                .with(InternalField::Quantity, "구매수(수량)"),
        }
    }

    #[test]
    fn test_mixed_upload_keeps_going() {
        let files = vec![
            csv("coupang_0101.csv", "묶음배송번호,주문번호,수취인이름,등록옵션명,구매수(수량)\n1,C-1,이영희,블랙-XL,2\n2,C-2,박민수,화이트-M,1\n"),
            csv("mystery.csv", "a,b,c\n1,2,3\n"),
            csv("broken.xlsx", "garbage"),
        ];
        let result = ingest_files(&files, None, UploadMode::Market, &[coupang()], &AgileDecryptor);
        assert_eq!(result.orders.len(), 2);
        assert_eq!(result.orders[0].market_name, "쿠팡");
        assert_eq!(result.orders[0].quantity.value(), 2);
        assert_eq!(result.files[0].order_count, 2);
        assert_eq!(result.files[1].outcome, FileOutcome::Unrecognized);
        assert!(matches!(result.files[2].outcome, FileOutcome::Unreadable { .. }));
        assert_eq!(result.integrated_files(), 1);
    }

    #[test]
    fn test_standard_mode_skips_detection() {
        let files = vec![csv("anything.csv", "주문번호,주문자,수령인,옵션명,수량\nS-1,김철수,이영희,블랙-XL,\n")];
        let result = ingest_files(&files, None, UploadMode::Standard, &[], &AgileDecryptor);
        assert_eq!(result.orders.len(), 1);
        assert_eq!(result.orders[0].market_name, MarketTemplate::STANDARD_MARKET);
        assert_eq!(result.orders[0].quantity.value(), 1);
    }

    #[test]
    fn test_encrypted_file_needs_password() {
        let body = "주문번호,수령인,옵션명\nS-1,이영희,블랙-XL\n";
        let files = vec![UploadedFile { name: "locked.csv".into(), bytes: decrypt::tests::encrypt_workbook(body.as_bytes(), "pw", 3) }];

        let missing = ingest_files(&files, None, UploadMode::Standard, &[], &AgileDecryptor);
        assert_eq!(missing.files[0].outcome, FileOutcome::PasswordRequired);
        assert!(missing.needs_password());

        let wrong = ingest_files(&files, Some("nope"), UploadMode::Standard, &[], &AgileDecryptor);
        assert_eq!(wrong.files[0].outcome, FileOutcome::WrongPassword);

        let ok = ingest_files(&files, Some("pw"), UploadMode::Standard, &[], &AgileDecryptor);
        assert_eq!(ok.orders.len(), 1);
        assert_eq!(ok.orders[0].option_name, "블랙-XL");
    }
}
