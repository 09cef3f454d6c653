//! Opportunity record: pending deals linked to an account.

use super::{
    is_present, require, FieldDef, FieldKind, FieldReader, FieldValue, RecordDecodeError, RecordId,
    RecordValidationError, SObject, SObjectType,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

const FIELDS: &[FieldDef] = &[
    FieldDef::new("Name", "name", FieldKind::Text),
    FieldDef::new("StageName", "stage_name", FieldKind::Text),
    FieldDef::new("CloseDate", "close_date", FieldKind::Date),
    FieldDef::new("Amount", "amount", FieldKind::Number),
    FieldDef::new(
        "AccountId",
        "account_id",
        FieldKind::Reference(SObjectType::Account),
    ),
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Opportunity {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<RecordId>,
}

impl Opportunity {
    /// Builds an unsaved opportunity with the three required fields set.
    pub fn new(
        name: impl Into<String>,
        stage_name: impl Into<String>,
        close_date: NaiveDate,
    ) -> Self {
        Self {
            name: Some(name.into()),
            stage_name: Some(stage_name.into()),
            close_date: Some(close_date),
            ..Self::default()
        }
    }

    pub fn with_amount(mut self, amount: f64) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn with_account(mut self, account_id: RecordId) -> Self {
        self.account_id = Some(account_id);
        self
    }
}

impl SObject for Opportunity {
    const OBJECT: SObjectType = SObjectType::Opportunity;
    const FIELDS: &'static [FieldDef] = FIELDS;

    fn id(&self) -> Option<RecordId> {
        self.id
    }

    fn set_id(&mut self, id: RecordId) {
        self.id = Some(id);
    }

    fn validate(&self) -> Result<(), RecordValidationError> {
        require(Self::OBJECT, "Name", is_present(&self.name))?;
        require(Self::OBJECT, "StageName", is_present(&self.stage_name))?;
        require(Self::OBJECT, "CloseDate", self.close_date.is_some())?;
        match self.amount {
            Some(amount) if !amount.is_finite() => {
                Err(RecordValidationError::NonFiniteAmount(amount))
            }
            _ => Ok(()),
        }
    }

    fn to_values(&self) -> Vec<FieldValue> {
        vec![
            self.name.clone().into(),
            self.stage_name.clone().into(),
            self.close_date.into(),
            self.amount.into(),
            self.account_id.into(),
        ]
    }

    fn from_values(id: RecordId, values: Vec<FieldValue>) -> Result<Self, RecordDecodeError> {
        let mut reader = FieldReader::new(Self::OBJECT, values);
        Ok(Self {
            id: Some(id),
            name: reader.text()?,
            stage_name: reader.text()?,
            close_date: reader.date()?,
            amount: reader.number()?,
            account_id: reader.reference()?,
        })
    }
}
