//! Market template detection.
//!
//! Each template is scored against the uploaded file: every filename token found
//! in the file name is worth [`FILENAME_POINTS`], every header token found in the
//! joined header row is worth [`HEADER_POINTS`]. Matching is case-insensitive
//! substring search. The highest score wins; ties go to the template listed first.

use serde::Serialize;

use crate::domain::aggregates::MarketTemplate;

pub const FILENAME_POINTS: u32 = 100;
pub const HEADER_POINTS: u32 = 10;

#[derive(Debug, Clone, Serialize)]
pub struct Detection<'a> {
    pub template: &'a MarketTemplate,
    pub score: u32,
    pub filename_hits: Vec<String>,
    pub header_hits: usize,
}

/// Scores one template. Zero means "not this market".
pub fn score_template(template: &MarketTemplate, file_name: &str, header_text: &str) -> (u32, Vec<String>, usize) {
    let file_name = file_name.to_lowercase();
    let filename_hits: Vec<String> = template.filename_tokens().into_iter().filter(|t| file_name.contains(t.as_str())).collect();
    let header_hits = template.header_tokens().iter().filter(|t| header_text.contains(t.as_str())).count();
    let score = FILENAME_POINTS * filename_hits.len() as u32 + HEADER_POINTS * header_hits as u32;
    (score, filename_hits, header_hits)
}

/// Picks the best-matching template, or `None` when nothing scores above zero.
pub fn detect_template<'a, S: AsRef<str>>(
    file_name: &str,
    header_row: &[S],
    templates: &'a [MarketTemplate],
) -> Option<Detection<'a>> {
    let header_text = header_row.iter().map(|c| c.as_ref().trim()).collect::<Vec<_>>().join(",").to_lowercase();

    let mut best: Option<Detection<'a>> = None;
    for template in templates {
        let (score, filename_hits, header_hits) = score_template(template, file_name, &header_text);
        if score == 0 { continue; }
        tracing::debug!(market = %template.market_name, score, header_hits, "template scored");
        if best.as_ref().map_or(true, |b| score > b.score) {
            best = Some(Detection { template, score, filename_hits, header_hits });
        }
    }

    match &best {
        Some(d) => tracing::info!(file = file_name, market = %d.template.market_name, score = d.score, "market detected"),
        None => tracing::warn!(file = file_name, "no market template matched"),
    }
    best
}
