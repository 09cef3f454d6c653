//! Contact record: people, optionally linked to an account.

use super::{
    is_present, require, FieldDef, FieldKind, FieldReader, FieldValue, RecordDecodeError, RecordId,
    RecordValidationError, SObject, SObjectType,
};
use serde::{Deserialize, Serialize};

const FIELDS: &[FieldDef] = &[
    FieldDef::new("FirstName", "first_name", FieldKind::Text),
    FieldDef::new("LastName", "last_name", FieldKind::Text),
    FieldDef::new(
        "AccountId",
        "account_id",
        FieldKind::Reference(SObjectType::Account),
    ),
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Contact {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    /// Required on every write.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<RecordId>,
}

impl Contact {
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            first_name: Some(first_name.into()),
            last_name: Some(last_name.into()),
            ..Self::default()
        }
    }

    pub fn with_account(mut self, account_id: RecordId) -> Self {
        self.account_id = Some(account_id);
        self
    }
}

impl SObject for Contact {
    const OBJECT: SObjectType = SObjectType::Contact;
    const FIELDS: &'static [FieldDef] = FIELDS;

    fn id(&self) -> Option<RecordId> {
        self.id
    }

    fn set_id(&mut self, id: RecordId) {
        self.id = Some(id);
    }

    fn validate(&self) -> Result<(), RecordValidationError> {
        require(Self::OBJECT, "LastName", is_present(&self.last_name))
    }

    fn to_values(&self) -> Vec<FieldValue> {
        vec![
            self.first_name.clone().into(),
            self.last_name.clone().into(),
            self.account_id.into(),
        ]
    }

    fn from_values(id: RecordId, values: Vec<FieldValue>) -> Result<Self, RecordDecodeError> {
        let mut reader = FieldReader::new(Self::OBJECT, values);
        Ok(Self {
            id: Some(id),
            first_name: reader.text()?,
            last_name: reader.text()?,
            account_id: reader.reference()?,
        })
    }
}
