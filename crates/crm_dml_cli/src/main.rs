//! CLI walkthrough of the record exercises.
//!
//! # Responsibility
//! - Open a SQLite record store (file or in-memory) and run every exercise
//!   once against it.
//! - Print the surviving records as JSON so runs can be compared.
//!
//! Configuration comes from the environment (optionally via `.env`):
//! `CRM_DB_PATH`, `CRM_LOG_LEVEL`, `CRM_LOG_DIR`.

use crm_dml_core::db::{open_db, open_db_in_memory};
use crm_dml_core::{
    core_version, default_log_level, init_logging, Account, Contact, DmlService, Opportunity,
    RecordQuery, RecordStore, SqliteRecordStore,
};
use log::{error, info};
use std::error::Error;
use std::process::ExitCode;

/// Runtime settings resolved from the environment.
struct CliConfig {
    db_path: Option<String>,
    log_level: String,
    log_dir: Option<String>,
}

impl CliConfig {
    fn from_env() -> Self {
        let non_blank = |key: &str| {
            std::env::var(key)
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        Self {
            db_path: non_blank("CRM_DB_PATH"),
            log_level: non_blank("CRM_LOG_LEVEL").unwrap_or_else(|| default_log_level().to_string()),
            log_dir: non_blank("CRM_LOG_DIR"),
        }
    }
}

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let config = CliConfig::from_env();

    if let Some(log_dir) = config.log_dir.as_deref() {
        if let Err(err) = init_logging(&config.log_level, log_dir) {
            eprintln!("logging disabled: {err}");
        }
    }

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("event=cli_run module=cli status=error error={err}");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(config: &CliConfig) -> Result<(), Box<dyn Error>> {
    info!("event=cli_run module=cli status=start version={}", core_version());
    let conn = match config.db_path.as_deref() {
        Some(path) => open_db(path)?,
        None => open_db_in_memory()?,
    };
    let store = SqliteRecordStore::try_new(&conn)?;
    let service = DmlService::new(&store);

    let account_id = service
        .create_basic_account()?
        .ok_or("basic account was not assigned an id")?;
    service.create_account("Globex", "Manufacturing")?;
    if let Some(contact_id) = service.create_contact_for_account(account_id)? {
        service.update_contact_last_name(contact_id, "Doe-Smith")?;
    }
    service.update_account_fields(account_id, "Acme Holdings", "Finance")?;

    let names = vec!["Renewal".to_string(), "Expansion".to_string()];
    service.create_opportunities_for_account("Initech", &names)?;
    service.create_missing_opportunities_for_account("Initech", &names)?;

    let mut opportunities: Vec<Opportunity> = store.read(&RecordQuery::all())?;
    if let Some(first) = opportunities.first().and_then(|opportunity| opportunity.id) {
        service.update_opportunity_stage(first, "Negotiation")?;
        opportunities = store.read(&RecordQuery::all())?;
    }
    service.normalize_opportunities(&mut opportunities)?;

    service.upsert_account_by_name("Umbrella")?;
    service.upsert_account_by_name("Umbrella")?;

    let mut contacts = vec![
        Contact::new("Jane", "Lovelace"),
        Contact::new("Ada", "Lovelace"),
        Contact::new("Alan", "Turing"),
    ];
    service.link_contacts_to_accounts(&mut contacts)?;

    service.create_and_delete_leads(&["Parker".to_string(), "Watson".to_string()])?;
    service.create_and_delete_cases(account_id, 3)?;

    let accounts: Vec<Account> = store.read(&RecordQuery::all())?;
    let contacts: Vec<Contact> = store.read(&RecordQuery::all())?;
    let opportunities: Vec<Opportunity> = store.read(&RecordQuery::all())?;
    let summary = serde_json::json!({
        "version": core_version(),
        "accounts": accounts,
        "contacts": contacts,
        "opportunities": opportunities,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    info!(
        "event=cli_run module=cli status=ok accounts={} contacts={} opportunities={}",
        accounts.len(),
        contacts.len(),
        opportunities.len()
    );
    Ok(())
}
