//! Lead record: prospects not yet converted.

use super::{
    is_present, require, FieldDef, FieldKind, FieldReader, FieldValue, RecordDecodeError, RecordId,
    RecordValidationError, SObject, SObjectType,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));

const FIELDS: &[FieldDef] = &[
    FieldDef::new("LastName", "last_name", FieldKind::Text),
    FieldDef::new("Company", "company", FieldKind::Text),
    FieldDef::new("Email", "email", FieldKind::Text),
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Lead {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Lead {
    pub fn new(last_name: impl Into<String>, company: impl Into<String>) -> Self {
        Self {
            last_name: Some(last_name.into()),
            company: Some(company.into()),
            ..Self::default()
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

impl SObject for Lead {
    const OBJECT: SObjectType = SObjectType::Lead;
    const FIELDS: &'static [FieldDef] = FIELDS;

    fn id(&self) -> Option<RecordId> {
        self.id
    }

    fn set_id(&mut self, id: RecordId) {
        self.id = Some(id);
    }

    fn validate(&self) -> Result<(), RecordValidationError> {
        require(Self::OBJECT, "LastName", is_present(&self.last_name))?;
        require(Self::OBJECT, "Company", is_present(&self.company))?;
        if let Some(email) = self.email.as_deref() {
            if !EMAIL_RE.is_match(email) {
                return Err(RecordValidationError::InvalidEmail(email.to_string()));
            }
        }
        Ok(())
    }

    fn to_values(&self) -> Vec<FieldValue> {
        vec![
            self.last_name.clone().into(),
            self.company.clone().into(),
            self.email.clone().into(),
        ]
    }

    fn from_values(id: RecordId, values: Vec<FieldValue>) -> Result<Self, RecordDecodeError> {
        let mut reader = FieldReader::new(Self::OBJECT, values);
        Ok(Self {
            id: Some(id),
            last_name: reader.text()?,
            company: reader.text()?,
            email: reader.text()?,
        })
    }
}
