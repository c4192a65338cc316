use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::foundation::error::{PinError, PinResult};
use crate::model::template::Template;

/// One spreadsheet row: column key -> cell value. Cell values are always
/// plain text; numeric-looking values get no special formatting.
pub type DataRow = BTreeMap<String, String>;

/// Template dynamic-field name -> data column key.
pub type FieldMapping = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    #[default]
    Pending,
    Processing,
    Paused,
    Completed,
    Failed,
}

impl CampaignStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// A run pairing one or more templates (round-robin over rows) with a data
/// table, producing one rendered pin per row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    pub templates: Vec<Template>,
    #[serde(default)]
    pub rows: Vec<DataRow>,
    #[serde(default)]
    pub mapping: FieldMapping,
    /// Total pin count; defaults to the row count when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(default)]
    pub status: CampaignStatus,
}

impl Campaign {
    pub fn total_pins(&self) -> u64 {
        self.total.unwrap_or(self.rows.len() as u64)
    }

    /// Round-robin template for a given row.
    pub fn template_for_row(&self, row_index: usize) -> &Template {
        &self.templates[row_index % self.templates.len()]
    }

    /// Missing required data is fatal for this campaign only.
    pub fn validate(&self) -> PinResult<()> {
        if self.id.is_empty() {
            return Err(PinError::config("campaign id must be non-empty"));
        }
        if self.templates.is_empty() {
            return Err(PinError::config(format!(
                "campaign '{}' has no templates",
                self.id
            )));
        }
        if self.rows.is_empty() {
            return Err(PinError::config(format!(
                "campaign '{}' has no data rows",
                self.id
            )));
        }
        for t in &self.templates {
            t.validate()?;
        }
        Ok(())
    }
}

/// Rendered pixels for one row. Premultiplied RGBA8, row-major.
#[derive(Clone, PartialEq, Eq)]
pub struct PinImage {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    pub premultiplied: bool,
}

impl std::fmt::Debug for PinImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .field("premultiplied", &self.premultiplied)
            .finish()
    }
}

/// One row's outcome, consumed immediately by the persistence collaborator.
#[derive(Debug, Clone)]
pub struct RenderResult {
    pub row_index: usize,
    pub outcome: RowOutcome,
}

#[derive(Debug, Clone)]
pub enum RowOutcome {
    Image(PinImage),
    Error(String),
}

impl RenderResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, RowOutcome::Image(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::color::ColorDef;

    fn tiny_template() -> Template {
        Template {
            width: 8,
            height: 8,
            background: ColorDef::white(),
            elements: vec![],
        }
    }

    #[test]
    fn total_defaults_to_row_count() {
        let c = Campaign {
            id: "c1".into(),
            templates: vec![tiny_template()],
            rows: vec![DataRow::new(), DataRow::new()],
            mapping: FieldMapping::new(),
            total: None,
            status: CampaignStatus::Pending,
        };
        assert_eq!(c.total_pins(), 2);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn templates_round_robin() {
        let mut t2 = tiny_template();
        t2.width = 16;
        let c = Campaign {
            id: "c1".into(),
            templates: vec![tiny_template(), t2],
            rows: vec![DataRow::new(); 3],
            mapping: FieldMapping::new(),
            total: None,
            status: CampaignStatus::Pending,
        };
        assert_eq!(c.template_for_row(0).width, 8);
        assert_eq!(c.template_for_row(1).width, 16);
        assert_eq!(c.template_for_row(2).width, 8);
    }

    #[test]
    fn missing_rows_is_a_config_error() {
        let c = Campaign {
            id: "c1".into(),
            templates: vec![tiny_template()],
            rows: vec![],
            mapping: FieldMapping::new(),
            total: None,
            status: CampaignStatus::Pending,
        };
        assert!(matches!(c.validate(), Err(PinError::Config(_))));
    }
}
