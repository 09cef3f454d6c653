//! Account record: companies and organizations.

use super::{
    is_present, require, FieldDef, FieldKind, FieldReader, FieldValue, RecordDecodeError, RecordId,
    RecordValidationError, SObject, SObjectType,
};
use serde::{Deserialize, Serialize};

const FIELDS: &[FieldDef] = &[
    FieldDef::new("Name", "name", FieldKind::Text),
    FieldDef::new("Industry", "industry", FieldKind::Text),
    FieldDef::new("Rating", "rating", FieldKind::Text),
    FieldDef::new("Description", "description", FieldKind::Text),
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Account {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    /// Required on every write.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Account {
    /// Builds an unsaved account with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_industry(mut self, industry: impl Into<String>) -> Self {
        self.industry = Some(industry.into());
        self
    }

    pub fn with_rating(mut self, rating: impl Into<String>) -> Self {
        self.rating = Some(rating.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl SObject for Account {
    const OBJECT: SObjectType = SObjectType::Account;
    const FIELDS: &'static [FieldDef] = FIELDS;

    fn id(&self) -> Option<RecordId> {
        self.id
    }

    fn set_id(&mut self, id: RecordId) {
        self.id = Some(id);
    }

    fn validate(&self) -> Result<(), RecordValidationError> {
        require(Self::OBJECT, "Name", is_present(&self.name))
    }

    fn to_values(&self) -> Vec<FieldValue> {
        vec![
            self.name.clone().into(),
            self.industry.clone().into(),
            self.rating.clone().into(),
            self.description.clone().into(),
        ]
    }

    fn from_values(id: RecordId, values: Vec<FieldValue>) -> Result<Self, RecordDecodeError> {
        let mut reader = FieldReader::new(Self::OBJECT, values);
        Ok(Self {
            id: Some(id),
            name: reader.text()?,
            industry: reader.text()?,
            rating: reader.text()?,
            description: reader.text()?,
        })
    }
}
