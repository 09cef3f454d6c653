//! Case record: customer issues, optionally linked to an account.

use super::{
    FieldDef, FieldKind, FieldReader, FieldValue, RecordDecodeError, RecordId,
    RecordValidationError, SObject, SObjectType,
};
use serde::{Deserialize, Serialize};

const FIELDS: &[FieldDef] = &[
    FieldDef::new("Status", "status", FieldKind::Text),
    FieldDef::new("Origin", "origin", FieldKind::Text),
    FieldDef::new(
        "AccountId",
        "account_id",
        FieldKind::Reference(SObjectType::Account),
    ),
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Case {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<RecordId>,
}

impl Case {
    pub fn new(status: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            status: Some(status.into()),
            origin: Some(origin.into()),
            ..Self::default()
        }
    }

    pub fn with_account(mut self, account_id: RecordId) -> Self {
        self.account_id = Some(account_id);
        self
    }
}

impl SObject for Case {
    const OBJECT: SObjectType = SObjectType::Case;
    const FIELDS: &'static [FieldDef] = FIELDS;

    fn id(&self) -> Option<RecordId> {
        self.id
    }

    fn set_id(&mut self, id: RecordId) {
        self.id = Some(id);
    }

    // Cases carry no required fields.
    fn validate(&self) -> Result<(), RecordValidationError> {
        Ok(())
    }

    fn to_values(&self) -> Vec<FieldValue> {
        vec![
            self.status.clone().into(),
            self.origin.clone().into(),
            self.account_id.into(),
        ]
    }

    fn from_values(id: RecordId, values: Vec<FieldValue>) -> Result<Self, RecordDecodeError> {
        let mut reader = FieldReader::new(Self::OBJECT, values);
        Ok(Self {
            id: Some(id),
            status: reader.text()?,
            origin: reader.text()?,
            account_id: reader.reference()?,
        })
    }
}
