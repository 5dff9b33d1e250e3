use tracing::info;

use super::{Engine, LedgerError, RecipientError};
use crate::model::{NewRecipient, Recipient, RecipientId, RecipientUpdate, UserId};

impl Engine {
    /// Recipients of `user`, favorites first, then by name.
    pub fn recipients(&self, user: &UserId, favorites_only: bool) -> Vec<Recipient> {
        let mut list: Vec<_> = self
            .recipients
            .values()
            .filter(|r| &r.owner == user && (!favorites_only || r.is_favorite))
            .cloned()
            .collect();
        list.sort_by(|a, b| {
            b.is_favorite
                .cmp(&a.is_favorite)
                .then_with(|| a.name.cmp(&b.name))
        });
        list
    }

    pub fn recipient(&self, user: &UserId, id: &RecipientId) -> Result<Recipient, LedgerError> {
        self.owned_recipient(user, id).cloned()
    }

    pub fn add_recipient(
        &mut self,
        user: &UserId,
        form: NewRecipient,
    ) -> Result<Recipient, LedgerError> {
        require("name", &form.name)?;
        require("phone", &form.phone)?;
        require("account_number", &form.account_number)?;
        require("country", &form.country)?;

        let recipient = Recipient {
            id: Self::new_id(),
            owner: user.clone(),
            name: form.name.trim().to_string(),
            phone: form.phone.trim().to_string(),
            email: form.email.filter(|e| !e.trim().is_empty()),
            account_number: form.account_number.trim().to_string(),
            account_type: form.account_type,
            bank_name: form.bank_name.filter(|b| !b.trim().is_empty()),
            country: form.country.trim().to_string(),
            is_favorite: false,
        };
        self.recipients
            .insert(recipient.id.clone(), recipient.clone());
        info!(user = %user, recipient = %recipient.id, "recipient added");
        Ok(recipient)
    }

    pub fn update_recipient(
        &mut self,
        user: &UserId,
        id: &RecipientId,
        update: RecipientUpdate,
    ) -> Result<Recipient, LedgerError> {
        for (field, value) in [
            ("name", &update.name),
            ("phone", &update.phone),
            ("account_number", &update.account_number),
            ("country", &update.country),
        ] {
            if let Some(value) = value {
                require(field, value)?;
            }
        }

        self.owned_recipient(user, id)?;
        let recipient = self
            .recipients
            .get_mut(id)
            .ok_or_else(|| RecipientError::NotFound(id.clone()))?;

        if let Some(name) = update.name {
            recipient.name = name.trim().to_string();
        }
        if let Some(phone) = update.phone {
            recipient.phone = phone.trim().to_string();
        }
        if let Some(email) = update.email {
            recipient.email = Some(email).filter(|e| !e.trim().is_empty());
        }
        if let Some(account_number) = update.account_number {
            recipient.account_number = account_number.trim().to_string();
        }
        if let Some(account_type) = update.account_type {
            recipient.account_type = account_type;
        }
        if let Some(bank_name) = update.bank_name {
            recipient.bank_name = Some(bank_name).filter(|b| !b.trim().is_empty());
        }
        if let Some(country) = update.country {
            recipient.country = country.trim().to_string();
        }

        info!(user = %user, recipient = %id, "recipient updated");
        Ok(recipient.clone())
    }

    pub fn delete_recipient(&mut self, user: &UserId, id: &RecipientId) -> Result<(), LedgerError> {
        self.owned_recipient(user, id)?;
        self.recipients.remove(id);
        info!(user = %user, recipient = %id, "recipient deleted");
        Ok(())
    }

    pub fn toggle_favorite(
        &mut self,
        user: &UserId,
        id: &RecipientId,
    ) -> Result<Recipient, LedgerError> {
        self.owned_recipient(user, id)?;
        let recipient = self
            .recipients
            .get_mut(id)
            .ok_or_else(|| RecipientError::NotFound(id.clone()))?;
        recipient.is_favorite = !recipient.is_favorite;
        Ok(recipient.clone())
    }
}

impl Engine {
    fn owned_recipient(&self, user: &UserId, id: &RecipientId) -> Result<&Recipient, LedgerError> {
        self.recipients
            .get(id)
            .filter(|r| &r.owner == user)
            .ok_or_else(|| RecipientError::NotFound(id.clone()).into())
    }
}

fn require(field: &'static str, value: &str) -> Result<(), RecipientError> {
    if value.trim().is_empty() {
        Err(RecipientError::MissingField(field))
    } else {
        Ok(())
    }
}
