use chrono::NaiveDate;
use crm_dml_core::service::dml_service::{
    BASIC_ACCOUNT_INDUSTRY, BASIC_ACCOUNT_NAME, BASIC_ACCOUNT_RATING, CASE_ORIGIN, CASE_STATUS,
    DEFAULT_CONTACT_FIRST_NAME, DEFAULT_CONTACT_LAST_NAME, DESCRIPTION_NEW, DESCRIPTION_UPDATED,
    NEW_OPPORTUNITY_STAGE, NORMALIZED_AMOUNT, NORMALIZED_STAGE,
};
use crm_dml_core::{
    Account, Case, Contact, DmlService, Filter, Lead, Opportunity, RecordQuery, RecordStore,
    RecordValidationError, StoreError,
};
use std::collections::HashSet;
use uuid::Uuid;

macro_rules! on_both_stores {
    ($($check:ident),+ $(,)?) => {
        $(
            mod $check {
                #[test]
                fn sqlite() {
                    let conn = crm_dml_core::db::open_db_in_memory().unwrap();
                    let store = crm_dml_core::SqliteRecordStore::try_new(&conn).unwrap();
                    super::$check(&store);
                }

                #[test]
                fn memory() {
                    super::$check(&crm_dml_core::InMemoryRecordStore::new());
                }
            }
        )+
    };
}

on_both_stores!(
    basic_account_is_created_with_fixed_fields,
    named_account_is_stored_exactly_once,
    default_contact_is_linked_to_account,
    contact_rename_changes_only_last_name,
    opportunity_restage_requires_existing_record,
    account_field_update_skips_unknown_ids,
    normalization_forces_stage_amount_and_close_date,
    opportunities_are_created_under_one_account_without_dedup,
    missing_opportunities_skip_existing_names,
    upsert_by_name_marks_new_and_updated_accounts,
    contacts_are_linked_to_accounts_by_last_name,
    invalid_contact_batch_creates_no_accounts,
    opportunity_account_lookup_keeps_existing_fields,
    lead_batch_leaves_nothing_behind,
    case_batch_leaves_nothing_behind,
);

fn fixed_today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 11, 30).unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn service<S: RecordStore>(store: S) -> DmlService<S> {
    DmlService::with_clock(store, fixed_today)
}

fn names(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

fn accounts_named<S: RecordStore>(store: &S, name: &str) -> Vec<Account> {
    store
        .read(&RecordQuery::filtered(Filter::eq("Name", name)))
        .unwrap()
}

fn basic_account_is_created_with_fixed_fields<S: RecordStore>(store: &S) {
    let service = service(store);
    let id = service.create_basic_account().unwrap().unwrap();

    let account: Account = store.get(id).unwrap().unwrap();
    assert_eq!(account.name.as_deref(), Some(BASIC_ACCOUNT_NAME));
    assert_eq!(account.industry.as_deref(), Some(BASIC_ACCOUNT_INDUSTRY));
    assert_eq!(account.rating.as_deref(), Some(BASIC_ACCOUNT_RATING));
}

fn named_account_is_stored_exactly_once<S: RecordStore>(store: &S) {
    let service = service(store);
    service.create_account("Wayne Enterprises", "Defense").unwrap();

    let stored = accounts_named(store, "Wayne Enterprises");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].industry.as_deref(), Some("Defense"));

    let err = service.create_account("  ", "Defense").unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
}

fn default_contact_is_linked_to_account<S: RecordStore>(store: &S) {
    let service = service(store);
    let account_id = service.create_basic_account().unwrap().unwrap();
    let contact_id = service
        .create_contact_for_account(account_id)
        .unwrap()
        .unwrap();

    let contact: Contact = store.get(contact_id).unwrap().unwrap();
    assert_eq!(contact.first_name.as_deref(), Some(DEFAULT_CONTACT_FIRST_NAME));
    assert_eq!(contact.last_name.as_deref(), Some(DEFAULT_CONTACT_LAST_NAME));
    assert_eq!(contact.account_id, Some(account_id));

    let err = service
        .create_contact_for_account(Uuid::new_v4())
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidReference { .. }));
}

fn contact_rename_changes_only_last_name<S: RecordStore>(store: &S) {
    let service = service(store);
    let account_id = service.create_basic_account().unwrap().unwrap();
    let contact_id = service
        .create_contact_for_account(account_id)
        .unwrap()
        .unwrap();

    service
        .update_contact_last_name(contact_id, "Smith")
        .unwrap();
    let contact: Contact = store.get(contact_id).unwrap().unwrap();
    assert_eq!(contact.last_name.as_deref(), Some("Smith"));
    assert_eq!(contact.first_name.as_deref(), Some(DEFAULT_CONTACT_FIRST_NAME));
    assert_eq!(contact.account_id, Some(account_id));

    let missing = Uuid::new_v4();
    let err = service
        .update_contact_last_name(missing, "Smith")
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(id) if id == missing));
}

fn opportunity_restage_requires_existing_record<S: RecordStore>(store: &S) {
    let mut opportunities = vec![Opportunity::new("Deal", "Prospecting", fixed_today()).with_amount(10.0)];
    store.create(&mut opportunities).unwrap();
    let id = opportunities[0].id.unwrap();

    let service = service(store);
    service.update_opportunity_stage(id, "Closed Won").unwrap();
    let loaded: Opportunity = store.get(id).unwrap().unwrap();
    assert_eq!(loaded.stage_name.as_deref(), Some("Closed Won"));
    assert_eq!(loaded.amount, Some(10.0));

    let err = service
        .update_opportunity_stage(Uuid::new_v4(), "Closed Won")
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

fn account_field_update_skips_unknown_ids<S: RecordStore>(store: &S) {
    let service = service(store);
    let id = service.create_basic_account().unwrap().unwrap();

    service
        .update_account_fields(id, "Acme Holdings", "Finance")
        .unwrap();
    let account: Account = store.get(id).unwrap().unwrap();
    assert_eq!(account.name.as_deref(), Some("Acme Holdings"));
    assert_eq!(account.industry.as_deref(), Some("Finance"));
    assert_eq!(account.rating.as_deref(), Some(BASIC_ACCOUNT_RATING));

    service
        .update_account_fields(Uuid::new_v4(), "Nobody", "Nothing")
        .unwrap();
    assert!(accounts_named(store, "Nobody").is_empty());
}

fn normalization_forces_stage_amount_and_close_date<S: RecordStore>(store: &S) {
    let mut saved = vec![Opportunity::new("Saved", "Closed Lost", date(2020, 1, 1)).with_amount(1.0)];
    store.create(&mut saved).unwrap();

    let mut batch = vec![
        saved[0].clone(),
        Opportunity::new("Fresh", "Prospecting", date(2030, 5, 5)),
    ];
    let service = service(store);
    service.normalize_opportunities(&mut batch).unwrap();

    let expected_close = date(2025, 2, 28);
    for opportunity in &batch {
        assert_eq!(opportunity.stage_name.as_deref(), Some(NORMALIZED_STAGE));
        assert_eq!(opportunity.amount, Some(NORMALIZED_AMOUNT));
        assert_eq!(opportunity.close_date, Some(expected_close));
    }
    assert_eq!(batch[0].id, saved[0].id);
    assert!(batch[1].id.is_some());

    let stored: Vec<Opportunity> = store.read(&RecordQuery::all()).unwrap();
    assert_eq!(stored.len(), 2);
    assert!(stored
        .iter()
        .all(|opportunity| opportunity.close_date == Some(expected_close)));

    let mut empty: Vec<Opportunity> = Vec::new();
    service.normalize_opportunities(&mut empty).unwrap();
}

fn opportunities_are_created_under_one_account_without_dedup<S: RecordStore>(store: &S) {
    let service = service(store);
    service
        .create_opportunities_for_account("Stark Industries", &names(&["Repulsors", "Armor"]))
        .unwrap();
    service
        .create_opportunities_for_account("Stark Industries", &names(&["Armor"]))
        .unwrap();

    let accounts = accounts_named(store, "Stark Industries");
    assert_eq!(accounts.len(), 1);
    let account_id = accounts[0].id;

    let opportunities: Vec<Opportunity> = store.read(&RecordQuery::all()).unwrap();
    assert_eq!(opportunities.len(), 3);
    assert!(opportunities
        .iter()
        .all(|opportunity| opportunity.account_id == account_id));
    assert!(opportunities.iter().all(|opportunity| {
        opportunity.stage_name.as_deref() == Some(NEW_OPPORTUNITY_STAGE)
            && opportunity.close_date == Some(date(2024, 12, 30))
    }));
    let armor = opportunities
        .iter()
        .filter(|opportunity| opportunity.name.as_deref() == Some("Armor"))
        .count();
    assert_eq!(armor, 2);

    service
        .create_opportunities_for_account("Stark Industries", &[])
        .unwrap();
    assert_eq!(accounts_named(store, "Stark Industries").len(), 1);
}

fn missing_opportunities_skip_existing_names<S: RecordStore>(store: &S) {
    let service = service(store);
    let created = service
        .create_missing_opportunities_for_account("Oscorp", &names(&["Glider", "Serum", "Glider"]))
        .unwrap();
    assert_eq!(created, 2);

    let created = service
        .create_missing_opportunities_for_account("Oscorp", &names(&["Serum", "Tower"]))
        .unwrap();
    assert_eq!(created, 1);

    // Same name under another account is not a duplicate.
    let created = service
        .create_missing_opportunities_for_account("Daily Bugle", &names(&["Serum"]))
        .unwrap();
    assert_eq!(created, 1);

    let opportunities: Vec<Opportunity> = store.read(&RecordQuery::all()).unwrap();
    assert_eq!(opportunities.len(), 4);
}

fn upsert_by_name_marks_new_and_updated_accounts<S: RecordStore>(store: &S) {
    let service = service(store);

    let created = service.upsert_account_by_name("Cyberdyne").unwrap();
    assert!(created.id.is_some());
    assert_eq!(created.name.as_deref(), Some("Cyberdyne"));
    assert_eq!(created.description.as_deref(), Some(DESCRIPTION_NEW));

    let updated = service.upsert_account_by_name("Cyberdyne").unwrap();
    assert_eq!(updated.id, created.id);
    assert_eq!(updated.description.as_deref(), Some(DESCRIPTION_UPDATED));

    let stored = accounts_named(store, "Cyberdyne");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].description.as_deref(), Some(DESCRIPTION_UPDATED));
}

fn contacts_are_linked_to_accounts_by_last_name<S: RecordStore>(store: &S) {
    let mut existing = vec![Account::new("Smith").with_industry("Retail")];
    store.create(&mut existing).unwrap();

    let mut contacts = vec![
        Contact::new("Anna", "Smith"),
        Contact::new("Ben", "Jones"),
        Contact::new("Cara", "Jones"),
        Contact::new("Dan", "Brown"),
    ];
    let service = service(store);
    service.link_contacts_to_accounts(&mut contacts).unwrap();

    assert_eq!(contacts[0].account_id, existing[0].id);
    assert_eq!(contacts[1].account_id, contacts[2].account_id);
    assert!(contacts.iter().all(|contact| contact.id.is_some()));

    let accounts: Vec<Account> = store.read(&RecordQuery::all()).unwrap();
    assert_eq!(accounts.len(), 3);
    let distinct: HashSet<_> = accounts.iter().filter_map(|a| a.name.clone()).collect();
    assert_eq!(distinct.len(), 3);

    let stored: Vec<Contact> = store.read(&RecordQuery::all()).unwrap();
    assert_eq!(stored.len(), 4);
    for contact in &stored {
        let account: Account = store.get(contact.account_id.unwrap()).unwrap().unwrap();
        assert_eq!(account.name, contact.last_name);
    }

    // Re-running reuses the accounts created above.
    let mut more = vec![Contact::new("Eve", "Brown")];
    service.link_contacts_to_accounts(&mut more).unwrap();
    assert_eq!(more[0].account_id, contacts[3].account_id);
    assert_eq!(store.read::<Account>(&RecordQuery::all()).unwrap().len(), 3);

    service.link_contacts_to_accounts(&mut []).unwrap();
}

fn invalid_contact_batch_creates_no_accounts<S: RecordStore>(store: &S) {
    let service = service(store);
    let unnamed = Contact {
        first_name: Some("Nobody".to_string()),
        ..Contact::default()
    };
    let mut contacts = vec![Contact::new("Anna", "Smith"), unnamed];
    let err = service.link_contacts_to_accounts(&mut contacts).unwrap_err();
    assert!(matches!(
        err,
        StoreError::Validation(RecordValidationError::MissingRequiredField {
            field: "LastName",
            ..
        })
    ));

    let mut blank = vec![Contact::new("Ben", "Jones"), Contact::new("Cara", "  ")];
    assert!(service.link_contacts_to_accounts(&mut blank).is_err());

    assert!(store.read::<Account>(&RecordQuery::all()).unwrap().is_empty());
    assert!(store.read::<Contact>(&RecordQuery::all()).unwrap().is_empty());
    assert!(contacts.iter().all(|contact| contact.account_id.is_none()));
}

fn opportunity_account_lookup_keeps_existing_fields<S: RecordStore>(store: &S) {
    let mut existing = vec![
        Account::new("Wayne Enterprises").with_industry("Defense"),
        Account::new("Wayne Enterprises").with_industry("Shipping"),
    ];
    store.create(&mut existing).unwrap();

    let service = service(store);
    service
        .create_opportunities_for_account("Wayne Enterprises", &names(&["Batwing"]))
        .unwrap();

    let opportunities: Vec<Opportunity> = store.read(&RecordQuery::all()).unwrap();
    assert_eq!(opportunities.len(), 1);
    assert_eq!(opportunities[0].account_id, existing[0].id);

    let stored = accounts_named(store, "Wayne Enterprises");
    assert_eq!(stored, existing);
}

fn lead_batch_leaves_nothing_behind<S: RecordStore>(store: &S) {
    let service = service(store);
    service
        .create_and_delete_leads(&names(&["Parker", "Watson"]))
        .unwrap();
    assert!(store.read::<Lead>(&RecordQuery::all()).unwrap().is_empty());

    service.create_and_delete_leads(&[]).unwrap();
    assert!(store.read::<Lead>(&RecordQuery::all()).unwrap().is_empty());

    let err = service
        .create_and_delete_leads(&names(&["Parker", ""]))
        .unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
    assert!(store.read::<Lead>(&RecordQuery::all()).unwrap().is_empty());
}

fn case_batch_leaves_nothing_behind<S: RecordStore>(store: &S) {
    let service = service(store);
    let account_id = service.create_basic_account().unwrap().unwrap();

    service.create_and_delete_cases(account_id, 5).unwrap();
    assert!(store.read::<Case>(&RecordQuery::all()).unwrap().is_empty());

    service.create_and_delete_cases(account_id, 0).unwrap();

    let err = service
        .create_and_delete_cases(Uuid::new_v4(), 2)
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidReference { .. }));

    let mut kept = vec![Case::new(CASE_STATUS, CASE_ORIGIN).with_account(account_id)];
    store.create(&mut kept).unwrap();
    service.create_and_delete_cases(account_id, 3).unwrap();
    let remaining: Vec<Case> = store.read(&RecordQuery::all()).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, kept[0].id);
}
