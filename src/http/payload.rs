use serde::{Deserialize, Serialize};

use crate::contact::{Contact, ContactDraft};

use super::error::ApiError;

/// Body of `POST /api/contacts` and `PUT /api/contacts/{id}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContactPayload {
    /// Requested name.
    #[serde(default)]
    pub name: Option<String>,
    /// Requested number.
    #[serde(default)]
    pub number: Option<String>,
}

impl ContactPayload {
    /// Converts the payload into a draft. Absent and empty fields both count
    /// as missing.
    pub fn into_draft(self) -> Result<ContactDraft, ApiError> {
        match (self.name, self.number) {
            (Some(name), Some(number)) if !name.is_empty() && !number.is_empty() => {
                Ok(ContactDraft { name, number })
            }
            _ => Err(ApiError::MissingField),
        }
    }
}

/// JSON shape of a contact returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactResponse {
    /// Contact id, as a string.
    pub id: String,
    /// Contact name.
    pub name: String,
    /// Contact number.
    pub number: String,
}

impl From<Contact> for ContactResponse {
    fn from(contact: Contact) -> Self {
        Self {
            id: contact.id.to_string(),
            name: contact.name,
            number: contact.number,
        }
    }
}
