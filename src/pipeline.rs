//! Prospect cards on the sales pipeline board.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::board::BoardEntity;
use crate::error::DecodeError;
use crate::fields::*;
use crate::rows::{self, field, Fields, FromRow, Row};

/// A prospect moving through the sales pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineCard {
    pub id: RowId,
    pub name: String,
    pub status: PipelineStatus,
    pub expected_value: Option<f64>,
    pub next_action_date: Option<NaiveDate>,
}

impl PipelineCard {
    pub fn new(id: RowId, name: impl Into<String>, status: PipelineStatus) -> Self {
        PipelineCard { id, name: name.into(), status, expected_value: None, next_action_date: None }
    }

    /// Fields for a new prospect; new cards always enter at `New`.
    pub fn create_fields(name: &str, expected_value: Option<f64>) -> Fields {
        let mut f = Fields::new();
        f.insert(field::NAME.into(), Value::from(name));
        f.insert(field::STATUS.into(), Value::from(PipelineStatus::New.label()));
        if let Some(v) = expected_value {
            f.insert(field::EXPECTED_VALUE.into(), Value::from(v));
        }
        f
    }
}

impl FromRow for PipelineCard {
    fn from_row(row: &Row) -> Result<Self, DecodeError> {
        let id = rows::row_id(row)?;
        let status = match rows::select(row, field::STATUS) {
            None => PipelineStatus::New,
            Some(label) => PipelineStatus::from_label(&label).ok_or(DecodeError::InvalidValue {
                row: id,
                field: field::STATUS,
                value: label,
            })?,
        };
        Ok(PipelineCard {
            id,
            name: rows::text(row, field::NAME).unwrap_or_default(),
            status,
            expected_value: rows::number(row, field::EXPECTED_VALUE),
            next_action_date: rows::date(row, field::NEXT_ACTION_DATE),
        })
    }
}

impl BoardEntity for PipelineCard {
    type Status = PipelineStatus;

    fn id(&self) -> RowId {
        self.id
    }

    fn status(&self) -> PipelineStatus {
        self.status
    }

    fn set_status(&mut self, status: PipelineStatus) {
        self.status = status;
    }

    fn title(&self) -> &str {
        &self.name
    }
}
