//! Record manipulation exercises over an injected record store.
//!
//! # Responsibility
//! - Provide one entry point per exercise (insert, update, upsert,
//!   reconcile, insert-then-delete).
//! - Delegate persistence, identity assignment and reference checks to the
//!   store.
//!
//! # Invariants
//! - Store failures propagate unchanged; nothing is retried or swallowed.
//! - Insert/upsert calls are skipped for empty batches; the delete half of
//!   the insert-then-delete exercises is always issued.
//! - After `link_contacts_to_accounts`, every contact with a last name points
//!   at an account whose name equals that last name.
//! - Records are fetched with every field before an update, because store
//!   updates overwrite the whole record.

use crate::model::account::Account;
use crate::model::case::Case;
use crate::model::contact::Contact;
use crate::model::lead::Lead;
use crate::model::opportunity::Opportunity;
use crate::model::{RecordId, SObject};
use crate::repo::record_store::{Filter, RecordQuery, RecordStore, StoreError, StoreResult};
use chrono::{Local, Months, NaiveDate};
use log::{debug, info};
use std::collections::{BTreeSet, HashMap, HashSet};

pub const BASIC_ACCOUNT_NAME: &str = "Acme Corporation";
pub const BASIC_ACCOUNT_INDUSTRY: &str = "Technology";
pub const BASIC_ACCOUNT_RATING: &str = "Hot";

pub const DEFAULT_CONTACT_FIRST_NAME: &str = "John";
pub const DEFAULT_CONTACT_LAST_NAME: &str = "Doe";

pub const NORMALIZED_STAGE: &str = "Qualification";
pub const NORMALIZED_AMOUNT: f64 = 50_000.0;
pub const NORMALIZED_CLOSE_MONTHS: u32 = 3;

pub const NEW_OPPORTUNITY_STAGE: &str = "Prospecting";
pub const NEW_OPPORTUNITY_CLOSE_MONTHS: u32 = 1;

pub const DESCRIPTION_UPDATED: &str = "Updated Account";
pub const DESCRIPTION_NEW: &str = "New Account";

pub const LEAD_COMPANY: &str = "Acme Corporation";
pub const LEAD_EMAIL_DOMAIN: &str = "example.com";

pub const CASE_STATUS: &str = "New";
pub const CASE_ORIGIN: &str = "Web";

/// Exercise service over any `RecordStore`.
pub struct DmlService<S: RecordStore> {
    store: S,
    clock: fn() -> NaiveDate,
}

impl<S: RecordStore> DmlService<S> {
    /// Creates a service whose dates are relative to the local calendar day.
    pub fn new(store: S) -> Self {
        Self::with_clock(store, local_today)
    }

    /// Creates a service with a caller-provided "today".
    pub fn with_clock(store: S, clock: fn() -> NaiveDate) -> Self {
        Self { store, clock }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn today(&self) -> NaiveDate {
        (self.clock)()
    }

    /// Creates the fixed sample account.
    ///
    /// Returns `None` when the store reported success but no id came back.
    pub fn create_basic_account(&self) -> StoreResult<Option<RecordId>> {
        let mut accounts = vec![Account::new(BASIC_ACCOUNT_NAME)
            .with_industry(BASIC_ACCOUNT_INDUSTRY)
            .with_rating(BASIC_ACCOUNT_RATING)];
        self.store.create(&mut accounts)?;

        let id = accounts.first().and_then(|account| account.id);
        info!(
            "event=create_basic_account module=service status=ok assigned={}",
            id.is_some()
        );
        Ok(id)
    }

    /// Creates one account with the given name and industry.
    pub fn create_account(&self, name: &str, industry: &str) -> StoreResult<()> {
        let mut accounts = vec![Account::new(name).with_industry(industry)];
        self.store.create(&mut accounts)?;
        info!("event=create_account module=service status=ok");
        Ok(())
    }

    /// Creates the default contact under `account_id`.
    pub fn create_contact_for_account(&self, account_id: RecordId) -> StoreResult<Option<RecordId>> {
        let mut contacts = vec![
            Contact::new(DEFAULT_CONTACT_FIRST_NAME, DEFAULT_CONTACT_LAST_NAME)
                .with_account(account_id),
        ];
        self.store.create(&mut contacts)?;
        Ok(contacts.first().and_then(|contact| contact.id))
    }

    /// Replaces a contact's last name. Fails with `NotFound` for unknown ids.
    pub fn update_contact_last_name(&self, contact_id: RecordId, last_name: &str) -> StoreResult<()> {
        let mut contact: Contact = self
            .store
            .get(contact_id)?
            .ok_or(StoreError::NotFound(contact_id))?;
        contact.last_name = Some(last_name.to_string());
        self.store.update(&[contact])
    }

    /// Moves an opportunity to `stage`. Fails with `NotFound` for unknown ids.
    pub fn update_opportunity_stage(&self, opportunity_id: RecordId, stage: &str) -> StoreResult<()> {
        let mut opportunity: Opportunity = self
            .store
            .get(opportunity_id)?
            .ok_or(StoreError::NotFound(opportunity_id))?;
        opportunity.stage_name = Some(stage.to_string());
        self.store.update(&[opportunity])
    }

    /// Sets name and industry on an account. Unknown ids are a no-op.
    pub fn update_account_fields(
        &self,
        account_id: RecordId,
        name: &str,
        industry: &str,
    ) -> StoreResult<()> {
        let mut accounts: Vec<Account> = self.store.read(&RecordQuery::by_id(account_id))?;
        if accounts.is_empty() {
            debug!("event=update_account_fields module=service status=skipped reason=not_found");
            return Ok(());
        }

        for account in &mut accounts {
            account.name = Some(name.to_string());
            account.industry = Some(industry.to_string());
        }
        self.store.update(&accounts)
    }

    /// Forces stage, amount and close date on every opportunity, then upserts
    /// the whole batch. Close date is `today + 3 months`.
    pub fn normalize_opportunities(&self, opportunities: &mut [Opportunity]) -> StoreResult<()> {
        self.normalize_opportunities_as_of(opportunities, self.today())
    }

    pub fn normalize_opportunities_as_of(
        &self,
        opportunities: &mut [Opportunity],
        today: NaiveDate,
    ) -> StoreResult<()> {
        let close_date = months_after(today, NORMALIZED_CLOSE_MONTHS);
        for opportunity in opportunities.iter_mut() {
            opportunity.stage_name = Some(NORMALIZED_STAGE.to_string());
            opportunity.close_date = Some(close_date);
            opportunity.amount = Some(NORMALIZED_AMOUNT);
        }

        if opportunities.is_empty() {
            return Ok(());
        }
        self.store.upsert(opportunities)?;
        info!(
            "event=normalize_opportunities module=service status=ok count={}",
            opportunities.len()
        );
        Ok(())
    }

    /// Upserts the named account, then creates one opportunity per name under
    /// it. Names already present on the account are created again.
    pub fn create_opportunities_for_account(
        &self,
        account_name: &str,
        opportunity_names: &[String],
    ) -> StoreResult<()> {
        let account_id = self.ensure_account_named(account_name)?;
        let mut opportunities = self.build_opportunities(account_id, opportunity_names.iter());
        if opportunities.is_empty() {
            return Ok(());
        }

        self.store.create(&mut opportunities)?;
        info!(
            "event=create_opportunities module=service status=ok count={}",
            opportunities.len()
        );
        Ok(())
    }

    /// Like `create_opportunities_for_account`, but skips names that already
    /// exist on the account or repeat within the input.
    ///
    /// Returns the number of opportunities created.
    pub fn create_missing_opportunities_for_account(
        &self,
        account_name: &str,
        opportunity_names: &[String],
    ) -> StoreResult<usize> {
        let account_id = self.ensure_account_named(account_name)?;
        if opportunity_names.is_empty() {
            return Ok(0);
        }

        let existing: Vec<Opportunity> = self.store.read(
            &RecordQuery::filtered(
                Filter::eq("AccountId", account_id)
                    .and(Filter::any_of("Name", opportunity_names.iter().cloned())),
            )
            .select(&["Id", "Name"]),
        )?;
        let mut seen: HashSet<&str> = existing
            .iter()
            .filter_map(|opportunity| opportunity.name.as_deref())
            .collect();
        let fresh: Vec<&String> = opportunity_names
            .iter()
            .filter(|name| seen.insert(name.as_str()))
            .collect();

        let mut opportunities = self.build_opportunities(account_id, fresh.into_iter());
        if !opportunities.is_empty() {
            self.store.create(&mut opportunities)?;
        }
        info!(
            "event=create_missing_opportunities module=service status=ok requested={} created={}",
            opportunity_names.len(),
            opportunities.len()
        );
        Ok(opportunities.len())
    }

    /// Marks an existing account named `name` as updated, or creates it.
    ///
    /// The first account with an exactly matching name receives
    /// `DESCRIPTION_UPDATED`; otherwise a new account named `name` is created
    /// with `DESCRIPTION_NEW`. Returns the stored record.
    pub fn upsert_account_by_name(&self, name: &str) -> StoreResult<Account> {
        let existing: Vec<Account> =
            self.store
                .read(&RecordQuery::filtered(Filter::eq("Name", name)).limit(1))?;

        let mut account = match existing.into_iter().next() {
            Some(mut account) => {
                account.description = Some(DESCRIPTION_UPDATED.to_string());
                account
            }
            None => Account::new(name).with_description(DESCRIPTION_NEW),
        };

        let matched = account.id.is_some();
        self.store.upsert(std::slice::from_mut(&mut account))?;
        info!("event=upsert_account_by_name module=service status=ok matched={matched}");
        Ok(account)
    }

    /// Links each contact to the account named after its last name, creating
    /// one account per last name that has none, then upserts the contacts.
    ///
    /// Contacts are validated up front; an invalid batch writes nothing.
    pub fn link_contacts_to_accounts(&self, contacts: &mut [Contact]) -> StoreResult<()> {
        if contacts.is_empty() {
            return Ok(());
        }
        for contact in contacts.iter() {
            contact.validate()?;
        }

        let last_names: BTreeSet<String> = contacts
            .iter()
            .filter_map(|contact| contact.last_name.as_deref())
            .filter(|name| !name.trim().is_empty())
            .map(str::to_string)
            .collect();

        let mut account_ids: HashMap<String, RecordId> = HashMap::new();
        if !last_names.is_empty() {
            let existing: Vec<Account> = self.store.read(
                &RecordQuery::filtered(Filter::any_of("Name", last_names.iter().cloned()))
                    .select(&["Id", "Name"]),
            )?;
            for account in existing {
                if let (Some(id), Some(name)) = (account.id, account.name) {
                    account_ids.entry(name).or_insert(id);
                }
            }
        }

        let mut staged: Vec<Account> = last_names
            .iter()
            .filter(|name| !account_ids.contains_key(*name))
            .map(|name| Account::new(name.clone()))
            .collect();
        if !staged.is_empty() {
            self.store.create(&mut staged)?;
        }
        let created = staged.len();
        for account in staged {
            if let (Some(id), Some(name)) = (account.id, account.name) {
                account_ids.insert(name, id);
            }
        }

        for contact in contacts.iter_mut() {
            let linked = contact
                .last_name
                .as_deref()
                .and_then(|name| account_ids.get(name));
            if let Some(account_id) = linked {
                contact.account_id = Some(*account_id);
            }
        }

        self.store.upsert(contacts)?;
        info!(
            "event=link_contacts_to_accounts module=service status=ok contacts={} accounts_created={created}",
            contacts.len()
        );
        Ok(())
    }

    /// Creates one lead per name, then deletes the same batch.
    pub fn create_and_delete_leads(&self, last_names: &[String]) -> StoreResult<()> {
        let mut leads: Vec<Lead> = last_names
            .iter()
            .map(|name| Lead::new(name.as_str(), LEAD_COMPANY).with_email(lead_email(name)))
            .collect();

        if !leads.is_empty() {
            self.store.create(&mut leads)?;
        }
        self.store.delete(&leads)?;
        info!(
            "event=create_and_delete_leads module=service status=ok count={}",
            leads.len()
        );
        Ok(())
    }

    /// Creates `count` cases under `account_id`, then deletes the same batch.
    pub fn create_and_delete_cases(&self, account_id: RecordId, count: usize) -> StoreResult<()> {
        let mut cases: Vec<Case> = (0..count)
            .map(|_| Case::new(CASE_STATUS, CASE_ORIGIN).with_account(account_id))
            .collect();

        if !cases.is_empty() {
            self.store.create(&mut cases)?;
        }
        self.store.delete(&cases)?;
        info!("event=create_and_delete_cases module=service status=ok count={count}");
        Ok(())
    }

    /// Create-or-update of the account named `account_name`.
    ///
    /// The first account with that name in insertion order is written back
    /// with its own field values; when several share the name the rest are
    /// ignored. Otherwise a new account is created.
    fn ensure_account_named(&self, account_name: &str) -> StoreResult<RecordId> {
        let existing: Vec<Account> = self
            .store
            .read(&RecordQuery::filtered(Filter::eq("Name", account_name)).limit(1))?;
        let mut account = existing
            .into_iter()
            .next()
            .unwrap_or_else(|| Account::new(account_name));
        self.store.upsert(std::slice::from_mut(&mut account))?;
        account
            .id
            .ok_or_else(|| StoreError::InvalidData("upserted account has no id".to_string()))
    }

    fn build_opportunities<'a>(
        &self,
        account_id: RecordId,
        names: impl Iterator<Item = &'a String>,
    ) -> Vec<Opportunity> {
        let close_date = months_after(self.today(), NEW_OPPORTUNITY_CLOSE_MONTHS);
        names
            .map(|name| {
                Opportunity::new(name.as_str(), NEW_OPPORTUNITY_STAGE, close_date)
                    .with_account(account_id)
            })
            .collect()
    }
}

fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

/// Calendar month arithmetic; day-of-month clamps to the target month's end.
pub fn months_after(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_add_months(Months::new(months))
        .unwrap_or(NaiveDate::MAX)
}

/// Builds `<name>@example.com` from the lowercase alphanumerics of `name`.
fn lead_email(name: &str) -> String {
    let local: String = name
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|ch| ch.to_ascii_lowercase())
        .collect();
    let local = if local.is_empty() { "lead".to_string() } else { local };
    format!("{local}@{LEAD_EMAIL_DOMAIN}")
}
