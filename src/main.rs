use anyhow::{bail, Context, Result};
use geo_language_switcher::config::Config;
use geo_language_switcher::i18n::{LanguageCatalog, LanguageCode};
use geo_language_switcher::location::{
    HttpLocationProvider, LocationInfo, LocationProvider, StaticLocationProvider,
};
use geo_language_switcher::navigation::{build_language_url, SiteAddress};
use geo_language_switcher::resolver::{detect_language_from_path, Provenance, ResolvedLanguage};
use geo_language_switcher::retry::AttemptPolicy;
use geo_language_switcher::session::{debug_snapshot, LanguageSession, VisitRequest};
use geo_language_switcher::storage::{FileStore, Preferences, StorageKeys};
use std::time::Duration;
use tracing::info;

const USAGE: &str = "Usage: geo-language-switcher [COMMAND]

Commands:
  resolve [PATH]   Resolve the language for a visit to PATH (default: /)
  snapshot         Show stored state without resolving
  switch CODE      Switch to CODE and print its URL
  accept           Accept the current recommendation
  decline          Never recommend a language again
  reset            Remove all stored preferences
  url CODE         Print the entry point URL for CODE";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Resolve(String),
    Snapshot,
    Switch(String),
    Accept,
    Decline,
    Reset,
    Url(String),
}

fn parse_command(args: &[String]) -> Result<Command> {
    let mut args = args.iter().map(String::as_str);
    let command = match (args.next(), args.next()) {
        (None, _) => Command::Resolve("/".to_string()),
        (Some("resolve"), path) => Command::Resolve(path.unwrap_or("/").to_string()),
        (Some("snapshot"), None) => Command::Snapshot,
        (Some("switch"), Some(code)) => Command::Switch(code.to_string()),
        (Some("accept"), None) => Command::Accept,
        (Some("decline"), None) => Command::Decline,
        (Some("reset"), None) => Command::Reset,
        (Some("url"), Some(code)) => Command::Url(code.to_string()),
        _ => bail!("{}", USAGE),
    };

    if args.next().is_some() {
        bail!("{}", USAGE);
    }
    Ok(command)
}

/// Look the visitor up, honoring a configured country override
async fn locate(config: &Config) -> LocationInfo {
    if let Some(country) = &config.country_override {
        info!("Using configured country {}", country);
        return StaticLocationProvider::new(LocationInfo::from_country(country))
            .locate()
            .await;
    }

    let policy = AttemptPolicy::new(
        Duration::from_millis(config.provider_timeout_ms),
        config.provider_max_attempts,
    );
    HttpLocationProvider::new(
        reqwest::Client::new(),
        config.geo_providers.clone(),
        config.ip_providers.clone(),
    )
    .with_policy(policy)
    .locate()
    .await
}

/// Language the page at `path` is rendered in before any redirect
fn shown_language(
    path: &str,
    catalog: &LanguageCatalog,
    default_language: LanguageCode,
) -> ResolvedLanguage {
    match detect_language_from_path(path, catalog) {
        Some(code) => ResolvedLanguage::new(code, Provenance::Path),
        None => ResolvedLanguage::new(default_language, Provenance::Default),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignored when absent)
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("geo_language_switcher=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = parse_command(&args)?;

    let config = Config::from_env()?;
    let catalog = LanguageCatalog::default();
    let store = FileStore::open(&config.storage_path)
        .with_context(|| format!("Failed to open preference store at {}", config.storage_path))?;
    let keys = StorageKeys::new(&config.storage_key_prefix);
    let default_language = LanguageCode::from_code(&catalog, &config.default_language)?;
    let fallback_language = LanguageCode::from_code(&catalog, &config.fallback_language)?;

    match command {
        Command::Resolve(path) => {
            let location = locate(&config).await;
            let visit = VisitRequest::new(path.clone())
                .with_client_language(config.client_language.clone());
            let session = LanguageSession::from_location(&config, catalog, store, location, visit)?;
            let resolved = session.resolved();

            println!("language:   {}", resolved.code);
            println!("provenance: {}", resolved.provenance);
            println!("country:    {}", session.location().country().unwrap_or("unknown"));

            let shown = shown_language(&path, session.catalog(), default_language);
            match session.recommendation_for(shown) {
                Some(payload) => {
                    let kind = if payload.is_unknown_region { "international" } else { "regional" };
                    println!(
                        "recommend:  {} {} ({} for {}, dismiss after {}s)",
                        payload.flag,
                        payload.display_name,
                        kind,
                        payload.country_code,
                        payload.auto_dismiss_after().as_secs()
                    );
                }
                None => println!("recommend:  none"),
            }
        }
        Command::Snapshot => {
            let preferences = Preferences::new(store, keys);
            let snapshot = debug_snapshot(
                &preferences,
                &catalog,
                default_language,
                fallback_language,
                config.client_language.clone(),
            )?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        Command::Switch(code) => {
            let location = Preferences::new(store.clone(), keys)
                .cached_location()?
                .unwrap_or_default();
            let visit = VisitRequest::new("/").with_client_language(config.client_language.clone());
            let session = LanguageSession::resume(&config, catalog, store, location, visit)?;
            let navigation = session.switch_language(&code)?;
            println!("{}", navigation.url);
        }
        Command::Accept => {
            let location = match Preferences::new(store.clone(), keys).cached_location()? {
                Some(location) => location,
                None => locate(&config).await,
            };
            let visit = VisitRequest::new("/").with_client_language(config.client_language.clone());
            let session = LanguageSession::resume(&config, catalog, store, location, visit)?;
            let shown = ResolvedLanguage::new(default_language, Provenance::Default);
            match session.shown_recommendation(shown) {
                Some(payload) => {
                    let navigation = session.accept_recommendation(&payload)?;
                    println!("{}", navigation.url);
                }
                None => println!("No recommendation for this visit"),
            }
        }
        Command::Decline => {
            let location = Preferences::new(store.clone(), keys)
                .cached_location()?
                .unwrap_or_default();
            let mut session =
                LanguageSession::resume(&config, catalog, store, location, VisitRequest::new("/"))?;
            session.decline_recommendation()?;
            println!("Language recommendation declined");
        }
        Command::Reset => {
            Preferences::new(store, keys).reset_all()?;
            println!("Language preferences reset");
        }
        Command::Url(code) => {
            let code = LanguageCode::from_code(&catalog, &code)?;
            let site = SiteAddress::new(&config.site_origin, &config.subpath_host_suffix)
                .with_hostname(config.site_hostname.clone());
            println!("{}", build_language_url(&site, "/", code, &catalog));
        }
    }

    Ok(())
}
