use crm_dml_core::{
    Account, Case, Contact, Filter, Opportunity, RecordQuery, RecordStore, RecordValidationError,
    StoreError,
};
use chrono::NaiveDate;
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
    create_assigns_ids_and_get_reads_back,
    create_rejects_records_that_already_have_ids,
    failed_create_batch_writes_nothing,
    update_requires_existing_ids,
    upsert_updates_identified_and_creates_the_rest,
    upsert_on_key_matches_creates_and_rejects_duplicates,
    delete_removes_and_nulls_references,
    references_must_point_at_existing_records,
    read_filters_project_and_limit,
    read_rejects_unknown_fields_and_mismatched_values,
    id_lists_filter_like_single_ids,
    any_of_accepts_lists_past_the_sqlite_bind_limit,
);

fn close_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 31).unwrap()
}

fn all<T: crm_dml_core::SObject, S: RecordStore>(store: &S) -> Vec<T> {
    store.read::<T>(&RecordQuery::all()).unwrap()
}

fn create_assigns_ids_and_get_reads_back<S: RecordStore>(store: &S) {
    let mut accounts = vec![
        Account::new("Acme").with_industry("Energy").with_rating("Warm"),
        Account::new("Globex"),
    ];
    store.create(&mut accounts).unwrap();

    let first_id = accounts[0].id.unwrap();
    assert_ne!(Some(first_id), accounts[1].id);

    let loaded: Account = store.get(first_id).unwrap().unwrap();
    assert_eq!(loaded, accounts[0]);

    let opportunity_account = accounts[1].id.unwrap();
    let mut opportunities = vec![Opportunity::new("Deal", "Prospecting", close_date())
        .with_amount(1250.5)
        .with_account(opportunity_account)];
    store.create(&mut opportunities).unwrap();
    let loaded: Opportunity = store.get(opportunities[0].id.unwrap()).unwrap().unwrap();
    assert_eq!(loaded.close_date, Some(close_date()));
    assert_eq!(loaded.amount, Some(1250.5));
    assert_eq!(loaded.account_id, Some(opportunity_account));
}

fn create_rejects_records_that_already_have_ids<S: RecordStore>(store: &S) {
    let mut accounts = vec![Account::new("Acme")];
    store.create(&mut accounts).unwrap();

    let err = store.create(&mut accounts).unwrap_err();
    assert!(matches!(err, StoreError::IdAlreadySet(id) if Some(id) == accounts[0].id));
    assert_eq!(all::<Account, _>(store).len(), 1);
}

fn failed_create_batch_writes_nothing<S: RecordStore>(store: &S) {
    let mut contacts = vec![Contact::new("Ada", "Lovelace"), Contact::default()];
    let err = store.create(&mut contacts).unwrap_err();
    assert!(matches!(
        err,
        StoreError::Validation(RecordValidationError::MissingRequiredField {
            field: "LastName",
            ..
        })
    ));
    assert!(contacts[0].id.is_none());
    assert!(all::<Contact, _>(store).is_empty());

    let mut empty: Vec<Contact> = Vec::new();
    store.create(&mut empty).unwrap();
}

fn update_requires_existing_ids<S: RecordStore>(store: &S) {
    let err = store.update(&[Account::new("Unsaved")]).unwrap_err();
    assert!(matches!(err, StoreError::MissingId(_)));

    let mut ghost = Account::new("Ghost");
    let ghost_id = Uuid::new_v4();
    ghost.id = Some(ghost_id);
    let err = store.update(&[ghost]).unwrap_err();
    assert!(matches!(err, StoreError::NotFound(id) if id == ghost_id));

    let mut accounts = vec![Account::new("Acme").with_industry("Energy")];
    store.create(&mut accounts).unwrap();
    accounts[0].industry = Some("Media".to_string());
    store.update(&accounts).unwrap();
    let loaded: Account = store.get(accounts[0].id.unwrap()).unwrap().unwrap();
    assert_eq!(loaded.industry.as_deref(), Some("Media"));
}

fn upsert_updates_identified_and_creates_the_rest<S: RecordStore>(store: &S) {
    let mut existing = vec![Account::new("Acme")];
    store.create(&mut existing).unwrap();

    let mut batch = vec![
        existing[0].clone().with_description("changed"),
        Account::new("Initech"),
    ];
    store.upsert(&mut batch).unwrap();

    assert_eq!(batch[0].id, existing[0].id);
    assert!(batch[1].id.is_some());
    let stored = all::<Account, _>(store);
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].description.as_deref(), Some("changed"));
    assert_eq!(stored[1].name.as_deref(), Some("Initech"));
}

fn upsert_on_key_matches_creates_and_rejects_duplicates<S: RecordStore>(store: &S) {
    let mut existing = vec![Account::new("Acme")];
    store.create(&mut existing).unwrap();

    let mut batch = vec![
        Account::new("Acme").with_rating("Cold"),
        Account::new("Umbrella"),
    ];
    store.upsert_on(&mut batch, "Name").unwrap();
    assert_eq!(batch[0].id, existing[0].id);
    assert!(batch[1].id.is_some());
    assert_eq!(all::<Account, _>(store).len(), 2);

    let mut twin = vec![Account::new("Acme")];
    store.create(&mut twin).unwrap();
    let err = store
        .upsert_on(&mut [Account::new("Acme")], "Name")
        .unwrap_err();
    assert!(matches!(err, StoreError::DuplicateKey { matches: 2, .. }));

    let mut unnamed = [Account::default()];
    let err = store.upsert_on(&mut unnamed, "Rating").unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
    let err = store
        .upsert_on(&mut [Account::new("Hooli")], "Rating")
        .unwrap_err();
    assert!(matches!(err, StoreError::MissingKey { field: "Rating", .. }));
    let err = store
        .upsert_on(&mut [Account::new("Acme")], "Nope")
        .unwrap_err();
    assert!(matches!(err, StoreError::UnknownField { .. }));
}

fn delete_removes_and_nulls_references<S: RecordStore>(store: &S) {
    let mut accounts = vec![Account::new("Acme")];
    store.create(&mut accounts).unwrap();
    let account_id = accounts[0].id.unwrap();

    let mut contacts = vec![Contact::new("Ada", "Lovelace").with_account(account_id)];
    store.create(&mut contacts).unwrap();
    let mut cases = vec![Case::new("New", "Phone").with_account(account_id)];
    store.create(&mut cases).unwrap();

    store.delete(&accounts).unwrap();
    assert!(store.get::<Account>(account_id).unwrap().is_none());

    let contact: Contact = store.get(contacts[0].id.unwrap()).unwrap().unwrap();
    assert_eq!(contact.account_id, None);
    let case: Case = store.get(cases[0].id.unwrap()).unwrap().unwrap();
    assert_eq!(case.account_id, None);

    let err = store.delete(&accounts).unwrap_err();
    assert!(matches!(err, StoreError::NotFound(id) if id == account_id));
    let err = store.delete(&[Case::default()]).unwrap_err();
    assert!(matches!(err, StoreError::MissingId(_)));
    store.delete::<Case>(&[]).unwrap();
}

fn references_must_point_at_existing_records<S: RecordStore>(store: &S) {
    let dangling = Uuid::new_v4();
    let mut contacts = vec![Contact::new("Ada", "Lovelace").with_account(dangling)];
    let err = store.create(&mut contacts).unwrap_err();
    assert!(matches!(
        err,
        StoreError::InvalidReference { field: "AccountId", id } if id == dangling
    ));

    // A contact id is not an account id.
    let mut valid = vec![Contact::new("Grace", "Hopper")];
    store.create(&mut valid).unwrap();
    let wrong_type = valid[0].id.unwrap();
    let mut linked = vec![Contact::new("Alan", "Turing").with_account(wrong_type)];
    assert!(matches!(
        store.create(&mut linked).unwrap_err(),
        StoreError::InvalidReference { .. }
    ));
}

fn read_filters_project_and_limit<S: RecordStore>(store: &S) {
    let mut accounts = vec![
        Account::new("Acme").with_industry("Energy"),
        Account::new("Globex").with_industry("Energy"),
        Account::new("Initech").with_industry("Software"),
    ];
    store.create(&mut accounts).unwrap();

    let energy: Vec<Account> = store
        .read(&RecordQuery::filtered(Filter::eq("Industry", "Energy")))
        .unwrap();
    let names: Vec<_> = energy.iter().filter_map(|a| a.name.as_deref()).collect();
    assert_eq!(names, vec!["Acme", "Globex"]);

    let picked: Vec<Account> = store
        .read(
            &RecordQuery::filtered(
                Filter::any_of("Name", ["Initech", "Acme", "Missing"])
                    .and(Filter::eq("Industry", "Software")),
            )
            .select(&["Id", "Name"]),
        )
        .unwrap();
    assert_eq!(picked.len(), 1);
    assert_eq!(picked[0].id, accounts[2].id);
    assert_eq!(picked[0].name.as_deref(), Some("Initech"));
    assert_eq!(picked[0].industry, None);

    let limited: Vec<Account> = store.read(&RecordQuery::all().limit(2)).unwrap();
    assert_eq!(limited.len(), 2);
    assert_eq!(limited[0].id, accounts[0].id);

    let by_ids: Vec<Account> = store
        .read(&RecordQuery::filtered(Filter::Ids(vec![
            accounts[1].id.unwrap(),
            Uuid::new_v4(),
        ])))
        .unwrap();
    assert_eq!(by_ids.len(), 1);

    let none: Vec<Account> = store
        .read(&RecordQuery::filtered(Filter::eq("Rating", None::<String>)))
        .unwrap();
    assert!(none.is_empty());

    // Text matching is exact.
    let lower: Vec<Account> = store
        .read(&RecordQuery::filtered(Filter::eq("Name", "acme")))
        .unwrap();
    assert!(lower.is_empty());
}

fn read_rejects_unknown_fields_and_mismatched_values<S: RecordStore>(store: &S) {
    let err = store
        .read::<Contact>(&RecordQuery::all().select(&["Email"]))
        .unwrap_err();
    assert!(matches!(err, StoreError::UnknownField { field, .. } if field == "Email"));

    let err = store
        .read::<Opportunity>(&RecordQuery::filtered(Filter::eq("Amount", "lots")))
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidFilter(_)));
}

fn id_lists_filter_like_single_ids<S: RecordStore>(store: &S) {
    let mut accounts = vec![Account::new("Acme"), Account::new("Globex"), Account::new("Initech")];
    store.create(&mut accounts).unwrap();

    let picked: Vec<Account> = store
        .read(&RecordQuery::filtered(Filter::any_of(
            "Id",
            [accounts[2].id, None, accounts[0].id, Some(Uuid::new_v4())],
        )))
        .unwrap();
    let ids: Vec<_> = picked.iter().map(|account| account.id).collect();
    assert_eq!(ids, vec![accounts[0].id, accounts[2].id]);

    let none: Vec<Account> = store
        .read(&RecordQuery::filtered(Filter::any_of("Id", [None::<Uuid>])))
        .unwrap();
    assert!(none.is_empty());
}

fn any_of_accepts_lists_past_the_sqlite_bind_limit<S: RecordStore>(store: &S) {
    let mut accounts = vec![Account::new("name-7"), Account::new("name-39999")];
    store.create(&mut accounts).unwrap();

    let names: Vec<String> = (0..40_000).map(|n| format!("name-{n}")).collect();
    let matched: Vec<Account> = store
        .read(&RecordQuery::filtered(Filter::any_of("Name", names)))
        .unwrap();
    assert_eq!(matched, accounts);

    let ids: Vec<Uuid> = std::iter::repeat_with(Uuid::new_v4)
        .take(40_000)
        .chain(accounts[1].id)
        .collect();
    let by_id: Vec<Account> = store
        .read(&RecordQuery::filtered(Filter::Ids(ids)))
        .unwrap();
    assert_eq!(by_id, vec![accounts[1].clone()]);
}
