// SPDX-License-Identifier: MIT

//! Prompt table keyed by (company code, sector code, report type).

use crate::error::EngineError;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct PromptRow {
    #[serde(rename = "CompanyCode")]
    pub company_code: String,
    #[serde(rename = "SectorCode")]
    pub sector_code: String,
    #[serde(rename = "ReportType")]
    pub report_type: String,
    #[serde(rename = "Prompt")]
    pub prompt: String,
}

/// Prompt lookup table loaded from a JSON file. Misses fall back to a
/// generic analyst prompt built from the request fields.
#[derive(Debug, Clone, Default)]
pub struct PromptLibrary {
    rows: Vec<PromptRow>,
}

impl PromptLibrary {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, EngineError> {
        let text = fs::read_to_string(path.as_ref())?;
        let rows: Vec<PromptRow> = serde_json::from_str(&text)?;
        log::info!(
            "Loaded {} prompt rows from {:?}",
            rows.len(),
            path.as_ref()
        );
        Ok(Self { rows })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn lookup(
        &self,
        company_code: &str,
        sector_code: &str,
        report_type: &str,
    ) -> Option<&str> {
        self.rows
            .iter()
            .find(|row| {
                row.company_code == company_code
                    && row.sector_code == sector_code
                    && row.report_type == report_type
            })
            .map(|row| row.prompt.as_str())
    }

    /// Prompt for the request, falling back to a generic one when no row
    /// matches.
    pub fn prompt_for(&self, company_code: &str, sector_code: &str, report_type: &str) -> String {
        match self.lookup(company_code, sector_code, report_type) {
            Some(prompt) => prompt.to_string(),
            None => {
                log::warn!(
                    "No prompt row for {}-{}-{}, using generic prompt",
                    company_code,
                    sector_code,
                    report_type
                );
                format!(
                    "You are an expert equity research analyst. Generate a comprehensive {} \
                     for {} in the {} sector. Provide professional analysis including company \
                     overview, financial performance, market position, risks, and investment \
                     recommendation.",
                    report_type, company_code, sector_code
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn library() -> PromptLibrary {
        let rows: Vec<PromptRow> = serde_json::from_str(
            r#"[
                {
                    "CompanyCode": "AAPL",
                    "SectorCode": "IT",
                    "ReportType": "FirstCutReport",
                    "Prompt": "Draft a first-cut report on Apple."
                }
            ]"#,
        )
        .unwrap();
        PromptLibrary { rows }
    }

    #[test]
    fn test_lookup_exact_match() {
        let lib = library();
        assert_eq!(
            lib.lookup("AAPL", "IT", "FirstCutReport"),
            Some("Draft a first-cut report on Apple.")
        );
    }

    #[test]
    fn test_lookup_requires_all_three_keys() {
        let lib = library();
        assert!(lib.lookup("AAPL", "IT", "BuyReport").is_none());
        assert!(lib.lookup("AAPL", "AUTO", "FirstCutReport").is_none());
    }

    #[test]
    fn test_prompt_for_falls_back_to_generic() {
        let lib = library();
        let prompt = lib.prompt_for("TSLA", "AUTO", "BuyReport");
        assert!(prompt.contains("TSLA"));
        assert!(prompt.contains("AUTO"));
        assert!(prompt.contains("BuyReport"));
    }
}
