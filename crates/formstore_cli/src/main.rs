//! Command-line probe for the form store.
//!
//! # Responsibility
//! - Wire config, logging and the SQLite store the way an embedding host
//!   would, and expose the repository reads/deletes for local checks.
//! - Keep output deterministic: JSON on stdout, errors on stderr.

use formstore_core::{
    core_version, init_from_config, open_db, FormDataProvider, FormItemId, Retryer,
    SqlFormDataProvider, SqliteDataApi, StoreConfig, Timestamp,
};
use log::info;
use std::process::ExitCode;
use uuid::Uuid;

const CONFIG_ENV_VAR: &str = "FORMSTORE_CONFIG";
const USAGE: &str = "usage: formstore <version | list <form_id> [start_ms] [end_ms] | delete <form_id>>";

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("formstore: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &[String]) -> Result<(), String> {
    match args.first().map(String::as_str) {
        None | Some("version") => {
            println!("formstore_core version={}", core_version());
            Ok(())
        }
        Some("list") => {
            let form_id = parse_form_id(args.get(1))?;
            let start = parse_timestamp(args.get(2))?;
            let end = parse_timestamp(args.get(3))?;
            with_provider(|provider| {
                let entries = provider
                    .get_entries(form_id, start, end)
                    .map_err(|err| err.to_string())?;
                let json = serde_json::to_string_pretty(&entries).map_err(|err| err.to_string())?;
                println!("{json}");
                Ok(())
            })
        }
        Some("delete") => {
            let form_id = parse_form_id(args.get(1))?;
            with_provider(|provider| {
                provider
                    .delete_entries(form_id)
                    .map_err(|err| err.to_string())?;
                info!("event=cli_delete module=cli status=ok form_id={form_id}");
                Ok(())
            })
        }
        Some(other) => Err(format!("unknown command `{other}`\n{USAGE}")),
    }
}

fn with_provider(
    action: impl FnOnce(&SqlFormDataProvider<SqliteDataApi<'_>>) -> Result<(), String>,
) -> Result<(), String> {
    let config = load_config()?;
    init_from_config(&config.logging).map_err(|err| err.to_string())?;

    let conn = open_db(&config.database.path).map_err(|err| err.to_string())?;
    let api = SqliteDataApi::try_new(&conn, config.database.dialect.dialect())
        .map_err(|err| err.to_string())?;
    let provider = SqlFormDataProvider::try_new(api, Retryer::new(config.retry.policy()))
        .map_err(|err| err.to_string())?;
    action(&provider)
}

fn load_config() -> Result<StoreConfig, String> {
    match std::env::var_os(CONFIG_ENV_VAR) {
        Some(path) => StoreConfig::load(path).map_err(|err| err.to_string()),
        None => Ok(StoreConfig::default()),
    }
}

fn parse_form_id(value: Option<&String>) -> Result<FormItemId, String> {
    let value = value.ok_or_else(|| format!("missing form_id\n{USAGE}"))?;
    Uuid::parse_str(value).map_err(|_| format!("invalid form_id `{value}`"))
}

fn parse_timestamp(value: Option<&String>) -> Result<Option<Timestamp>, String> {
    value
        .map(|text| {
            text.parse::<Timestamp>()
                .map_err(|_| format!("invalid epoch milliseconds `{text}`"))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::{parse_form_id, parse_timestamp, run};

    #[test]
    fn parse_timestamp_accepts_missing_and_numeric_values() {
        assert_eq!(parse_timestamp(None), Ok(None));
        assert_eq!(parse_timestamp(Some(&"-5".to_string())), Ok(Some(-5)));
        assert!(parse_timestamp(Some(&"yesterday".to_string())).is_err());
    }

    #[test]
    fn parse_form_id_requires_uuid() {
        assert!(parse_form_id(None).is_err());
        assert!(parse_form_id(Some(&"not-a-uuid".to_string())).is_err());
        assert!(parse_form_id(Some(&uuid::Uuid::new_v4().to_string())).is_ok());
    }

    #[test]
    fn unknown_command_is_rejected() {
        let err = run(&["frobnicate".to_string()]).unwrap_err();
        assert!(err.contains("unknown command"));
    }
}
